//! The device seam shared by both backends.

use std::ops::Range;

use super::{BufferId, FramebufferId, PipelineId, TextureFormat, TextureId};
use crate::backend::{BackendKind, Capabilities};
use crate::error::RenderResult;
use crate::pipeline::PipelineDescriptor;

/// How a buffer is bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Vertex,
    Index,
    Uniform,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BufferDesc {
    pub label: String,
    pub usage: BufferUsage,
    pub size: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextureDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

/// The attachments a framebuffer draws into.
///
/// Color slots are indexed by attachment location; a `None` slot is skipped.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FramebufferDesc {
    pub label: String,
    pub color: Vec<Option<TextureId>>,
    pub depth: Option<TextureId>,
}

/// A rectangle in pixels, origin at the top-left corner of the target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x < self.x.saturating_add(self.width) && y < self.y.saturating_add(self.height)
    }

    /// Intersection with another rectangle, `None` if they do not overlap.
    pub fn intersect(&self, other: &PixelRect) -> Option<PixelRect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.x.saturating_add(self.width).min(other.x.saturating_add(other.width));
        let y1 = self.y.saturating_add(self.height).min(other.y.saturating_add(other.height));
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(PixelRect::new(x0, y0, x1 - x0, y1 - y0))
    }
}

/// Load behaviour for one attachment at the start of a pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LoadOp<T> {
    Clear(T),
    Load,
}

/// Load operations for every attachment of the bound framebuffer.
///
/// Missing color entries default to [`LoadOp::Load`].
#[derive(Clone, Debug, PartialEq)]
pub struct PassLoad {
    pub color: Vec<LoadOp<[f32; 4]>>,
    pub depth: LoadOp<f32>,
}

impl PassLoad {
    pub fn load() -> Self {
        Self {
            color: Vec::new(),
            depth: LoadOp::Load,
        }
    }

    pub fn clear(colors: &[[f32; 4]], depth: f32) -> Self {
        Self {
            color: colors.iter().map(|c| LoadOp::Clear(*c)).collect(),
            depth: LoadOp::Clear(depth),
        }
    }

    pub fn color_op(&self, index: usize) -> LoadOp<[f32; 4]> {
        self.color.get(index).copied().unwrap_or(LoadOp::Load)
    }
}

/// One entry of a bind group, in binding order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Binding {
    Uniform(BufferId),
    Texture(TextureId),
    /// The device's shared nearest-filtering sampler.
    Sampler,
}

/// Pixels copied back from a texture.
#[derive(Clone, Debug, PartialEq)]
pub enum PixelData {
    /// Four bytes per pixel.
    Unorm8(Vec<u8>),
    /// Four channels per pixel.
    Uint32(Vec<u32>),
    /// One channel per pixel.
    Float32(Vec<f32>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Pixels {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub data: PixelData,
}

/// Live object and allocation counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub buffers: usize,
    pub textures: usize,
    pub framebuffers: usize,
    pub pipelines: usize,
    /// Total texture storage allocations, including reallocations on resize.
    pub texture_allocations: u64,
    pub draws: u64,
    pub submits: u64,
}

/// An object-safe GPU device.
///
/// Resource methods allocate and free device objects. The remaining methods form
/// a command stream that mirrors a global-state API: a framebuffer is bound,
/// a pass begun on it, then pipeline, bindings and buffers are set before each
/// draw. Immediate devices execute draws as they arrive; explicit devices record
/// them and encode on [`end_pass`](Device::end_pass).
///
/// Buffer writes become visible to every draw of the next submit.
pub trait Device {
    fn backend(&self) -> BackendKind;
    fn capabilities(&self) -> Capabilities;
    fn stats(&self) -> DeviceStats;

    fn create_buffer(&mut self, desc: &BufferDesc, contents: Option<&[u8]>) -> RenderResult<BufferId>;
    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> RenderResult<()>;
    fn destroy_buffer(&mut self, buffer: BufferId);

    fn create_texture(&mut self, desc: &TextureDesc) -> RenderResult<TextureId>;
    /// Reallocates storage under the same id. Contents are undefined afterwards.
    fn resize_texture(&mut self, texture: TextureId, width: u32, height: u32) -> RenderResult<()>;
    /// Uploads tightly packed texels covering the whole texture.
    fn write_texture(&mut self, texture: TextureId, data: &[u8]) -> RenderResult<()>;
    fn destroy_texture(&mut self, texture: TextureId);

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> RenderResult<FramebufferId>;
    fn update_framebuffer(&mut self, framebuffer: FramebufferId, desc: &FramebufferDesc) -> RenderResult<()>;
    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId);

    fn create_pipeline(&mut self, desc: &PipelineDescriptor) -> RenderResult<PipelineId>;
    fn destroy_pipeline(&mut self, pipeline: PipelineId);

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>);
    fn bound_framebuffer(&self) -> Option<FramebufferId>;
    fn begin_pass(&mut self, load: &PassLoad) -> RenderResult<()>;
    fn set_viewport(&mut self, rect: PixelRect) -> RenderResult<()>;
    fn set_pipeline(&mut self, pipeline: PipelineId) -> RenderResult<()>;
    fn set_bindings(&mut self, group: u32, bindings: &[Binding]) -> RenderResult<()>;
    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferId) -> RenderResult<()>;
    fn set_index_buffer(&mut self, buffer: BufferId) -> RenderResult<()>;
    fn draw(&mut self, vertices: Range<u32>) -> RenderResult<()>;
    fn draw_indexed(&mut self, indices: Range<u32>) -> RenderResult<()>;
    fn end_pass(&mut self) -> RenderResult<()>;
    fn submit(&mut self) -> RenderResult<()>;

    /// Copies a rectangle of a texture back to the host, blocking until done.
    fn read_pixels(&mut self, texture: TextureId, rect: PixelRect) -> RenderResult<Pixels>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_intersection() {
        let a = PixelRect::new(0, 0, 10, 10);
        let b = PixelRect::new(5, 5, 10, 10);
        assert_eq!(a.intersect(&b), Some(PixelRect::new(5, 5, 5, 5)));
        assert_eq!(a.intersect(&PixelRect::new(10, 0, 4, 4)), None);
        assert!(a.contains(9, 9));
        assert!(!a.contains(10, 0));
    }

    #[test]
    fn test_rect_at_the_edge_of_the_range_does_not_overflow() {
        let far = PixelRect::new(u32::MAX - 1, 0, u32::MAX, u32::MAX);
        assert!(far.contains(u32::MAX - 1, 7));
        assert_eq!(far.intersect(&PixelRect::from_size(16, 16)), None);
        let wide = PixelRect::new(4, 4, u32::MAX, u32::MAX);
        assert_eq!(wide.intersect(&PixelRect::from_size(16, 16)), Some(PixelRect::new(4, 4, 12, 12)));
    }

    #[test]
    fn test_missing_load_ops_default_to_load() {
        let load = PassLoad::clear(&[[0.0; 4]], 1.0);
        assert_eq!(load.color_op(0), LoadOp::Clear([0.0; 4]));
        assert_eq!(load.color_op(1), LoadOp::Load);
    }
}
