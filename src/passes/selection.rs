use super::{RenderEncoder, RenderPass};
use crate::error::RenderResult;
use crate::resource::{Device, Framebuffer, PassLoad, TextureFormat, TextureId};
use crate::view::{FrameContext, Operation, ViewTree};

/// Draws pickable props with their ids as color.
///
/// Each texel of the `Rgba32Uint` target holds `(prop id + 1, composite id,
/// 0, prop id + 1)`; zero means nothing was drawn there.
pub struct HardwareSelectionPass {
    framebuffer: Option<Framebuffer>,
}

impl HardwareSelectionPass {
    pub fn new() -> Self {
        Self { framebuffer: None }
    }

    pub fn ids_texture(&self) -> Option<TextureId> {
        self.framebuffer.as_ref()?.color_texture(0)
    }

    pub fn depth_texture(&self) -> Option<TextureId> {
        self.framebuffer.as_ref()?.depth_texture()
    }

    fn prepare(&mut self, ctx: &mut FrameContext<'_>) -> RenderResult<&mut Framebuffer> {
        let (width, height) = ctx.size;
        let fb = match self.framebuffer.take() {
            Some(mut fb) => {
                fb.resize(&mut *ctx.device, width, height)?;
                fb
            }
            None => {
                let mut fb =
                    Framebuffer::create(&mut *ctx.device, ctx.queue, "HardwareSelectionPass", width, height)?;
                fb.create_color(&mut *ctx.device, 0, TextureFormat::Rgba32Uint)?;
                fb.create_depth(&mut *ctx.device, TextureFormat::Depth32Float)?;
                fb
            }
        };
        Ok(self.framebuffer.insert(fb))
    }
}

impl Default for HardwareSelectionPass {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPass for HardwareSelectionPass {
    fn name(&self) -> &str {
        "HardwareSelectionPass"
    }

    fn traverse(&mut self, views: &mut ViewTree, ctx: &mut FrameContext<'_>) -> RenderResult<Option<TextureId>> {
        ctx.record("HardwareSelectionPass");
        views.traverse(Operation::Camera, ctx)?;

        let fb = self.prepare(ctx)?;
        fb.bind(&mut *ctx.device)?;
        ctx.device.begin_pass(&PassLoad::clear(&[[0.0; 4]], 1.0))?;
        ctx.encoder = Some(RenderEncoder::ids());
        let result = views.traverse(Operation::Select, ctx);
        ctx.encoder = None;
        ctx.device.end_pass()?;
        result?;
        Ok(self.ids_texture())
    }

    fn release(&mut self, device: &mut dyn Device) {
        if let Some(mut fb) = self.framebuffer.take() {
            fb.release(device);
        }
    }
}
