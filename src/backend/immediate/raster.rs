//! Scan conversion and per-pixel operations for the immediate device.
//!
//! Coordinates follow the explicit backend: clip-space depth in `[0, 1]`,
//! pixel origin at the top-left, samples at pixel centers. Triangles use the
//! top-left fill rule so a shared edge is covered exactly once.

use glam::{Vec2, Vec4};

use crate::pipeline::{BlendMode, Topology};
use crate::resource::{PixelRect, TextureFormat};

/// Number of interpolated vectors carried per vertex: normal, color, texture coordinate.
pub(crate) const VARYINGS: usize = 3;

#[derive(Clone, Copy, Debug)]
pub(crate) struct ClipVertex {
    pub position: Vec4,
    pub varyings: [Vec4; VARYINGS],
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Fragment {
    pub x: u32,
    pub y: u32,
    pub depth: f32,
    pub varyings: [Vec4; VARYINGS],
}

/// A value written to one color target.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Texel {
    Float([f32; 4]),
    Uint([u32; 4]),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Texels {
    Float(Vec<[f32; 4]>),
    Uint(Vec<[u32; 4]>),
}

/// Texture storage. Single-channel formats keep their value in the first lane.
#[derive(Clone, Debug)]
pub(crate) struct SoftTexture {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub texels: Texels,
}

impl SoftTexture {
    pub fn new(width: u32, height: u32, format: TextureFormat) -> Self {
        let len = (width as usize) * (height as usize);
        let texels = if format.is_uint() {
            Texels::Uint(vec![[0; 4]; len])
        } else {
            Texels::Float(vec![[0.0; 4]; len])
        };
        Self {
            width,
            height,
            format,
            texels,
        }
    }

    pub fn extent(&self) -> PixelRect {
        PixelRect::from_size(self.width, self.height)
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + x as usize
    }

    /// Float read with coordinates clamped to the edge.
    pub fn load(&self, x: i64, y: i64) -> [f32; 4] {
        let x = x.clamp(0, self.width as i64 - 1) as u32;
        let y = y.clamp(0, self.height as i64 - 1) as u32;
        let i = self.index(x, y);
        match &self.texels {
            Texels::Float(data) => data[i],
            Texels::Uint(data) => data[i].map(|v| v as f32),
        }
    }

    /// Nearest-neighbour sample at normalized coordinates.
    pub fn sample(&self, uv: Vec2) -> [f32; 4] {
        let x = (uv.x * self.width as f32).floor() as i64;
        let y = (uv.y * self.height as f32).floor() as i64;
        self.load(x, y)
    }

    pub fn depth_at(&self, x: u32, y: u32) -> f32 {
        match &self.texels {
            Texels::Float(data) => data[self.index(x, y)][0],
            Texels::Uint(_) => 1.0,
        }
    }

    pub fn set_depth(&mut self, x: u32, y: u32, depth: f32) {
        let i = self.index(x, y);
        if let Texels::Float(data) = &mut self.texels {
            data[i][0] = depth;
        }
    }

    pub fn fill(&mut self, value: [f32; 4]) {
        let format = self.format;
        match &mut self.texels {
            Texels::Float(data) => data.fill(store(format, value)),
            Texels::Uint(data) => data.fill(value.map(|v| v.max(0.0) as u32)),
        }
    }

    /// Blends `texel` into the pixel at `(x, y)`.
    pub fn write(&mut self, x: u32, y: u32, texel: Texel, blend: BlendMode) {
        let i = self.index(x, y);
        let format = self.format;
        match (&mut self.texels, texel) {
            (Texels::Float(data), Texel::Float(src)) => {
                data[i] = store(format, apply_blend(blend, src, data[i]));
            }
            (Texels::Uint(data), Texel::Uint(src)) => data[i] = src,
            // A float output into an unsigned target, or the reverse, writes nothing.
            _ => {}
        }
    }
}

/// Applies the storage precision and channel count of `format`.
fn store(format: TextureFormat, value: [f32; 4]) -> [f32; 4] {
    match format {
        TextureFormat::Rgba8Unorm => value.map(|v| (v.clamp(0.0, 1.0) * 255.0).round() / 255.0),
        TextureFormat::R16Float | TextureFormat::R32Float | TextureFormat::Depth32Float => {
            [value[0], 0.0, 0.0, 0.0]
        }
        _ => value,
    }
}

pub(crate) fn apply_blend(blend: BlendMode, src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
    match blend {
        BlendMode::Replace => src,
        BlendMode::Alpha => {
            let a = src[3];
            [
                src[0] * a + dst[0] * (1.0 - a),
                src[1] * a + dst[1] * (1.0 - a),
                src[2] * a + dst[2] * (1.0 - a),
                a + dst[3] * (1.0 - a),
            ]
        }
        BlendMode::Additive => [
            src[0] + dst[0],
            src[1] + dst[1],
            src[2] + dst[2],
            src[3] + dst[3],
        ],
        BlendMode::Reveal => [
            dst[0] * (1.0 - src[0]),
            dst[1] * (1.0 - src[1]),
            dst[2] * (1.0 - src[2]),
            dst[3] * (1.0 - src[3]),
        ],
    }
}

#[derive(Clone, Copy)]
struct ScreenVertex {
    p: Vec2,
    z: f32,
    inv_w: f32,
    varyings: [Vec4; VARYINGS],
}

fn to_screen(v: &ClipVertex, viewport: PixelRect) -> Option<ScreenVertex> {
    let w = v.position.w;
    if w <= 1e-6 {
        return None;
    }
    let ndc = v.position.truncate() / w;
    let x = viewport.x as f32 + (ndc.x * 0.5 + 0.5) * viewport.width as f32;
    let y = viewport.y as f32 + (0.5 - ndc.y * 0.5) * viewport.height as f32;
    Some(ScreenVertex {
        p: Vec2::new(x, y),
        z: ndc.z,
        inv_w: 1.0 / w,
        varyings: v.varyings,
    })
}

/// Emits every fragment covered by `vertices` interpreted as `topology`.
///
/// `clip` bounds the pixels considered (viewport intersected with the target).
pub(crate) fn rasterize(
    topology: Topology,
    vertices: &[ClipVertex],
    viewport: PixelRect,
    clip: PixelRect,
    emit: &mut dyn FnMut(Fragment),
) {
    match topology {
        Topology::TriangleList => {
            for tri in vertices.chunks_exact(3) {
                let screen: Option<Vec<ScreenVertex>> = tri.iter().map(|v| to_screen(v, viewport)).collect();
                if let Some(s) = screen {
                    triangle(&s[0], &s[1], &s[2], clip, emit);
                }
            }
        }
        Topology::LineList => {
            for line in vertices.chunks_exact(2) {
                if let (Some(a), Some(b)) = (to_screen(&line[0], viewport), to_screen(&line[1], viewport)) {
                    segment(&a, &b, clip, emit);
                }
            }
        }
        Topology::PointList => {
            for v in vertices {
                if let Some(s) = to_screen(v, viewport) {
                    if s.p.x < 0.0 || s.p.y < 0.0 {
                        continue;
                    }
                    let (x, y) = (s.p.x.floor() as u32, s.p.y.floor() as u32);
                    if clip.contains(x, y) {
                        emit(Fragment {
                            x,
                            y,
                            depth: s.z,
                            varyings: s.varyings,
                        });
                    }
                }
            }
        }
    }
}

fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (p.x - a.x) * (b.y - a.y) - (p.y - a.y) * (b.x - a.x)
}

fn is_top_left(a: Vec2, b: Vec2) -> bool {
    let d = b - a;
    (d.y == 0.0 && d.x < 0.0) || d.y > 0.0
}

fn covers(w: f32, top_left: bool) -> bool {
    w > 0.0 || (w == 0.0 && top_left)
}

fn triangle(v0: &ScreenVertex, v1: &ScreenVertex, v2: &ScreenVertex, clip: PixelRect, emit: &mut dyn FnMut(Fragment)) {
    let mut area = edge(v0.p, v1.p, v2.p);
    if area == 0.0 {
        return;
    }
    let (v1, v2) = if area < 0.0 {
        area = -area;
        (v2, v1)
    } else {
        (v1, v2)
    };

    let min = v0.p.min(v1.p).min(v2.p);
    let max = v0.p.max(v1.p).max(v2.p);
    let x0 = (min.x.floor().max(clip.x as f32)) as u32;
    let y0 = (min.y.floor().max(clip.y as f32)) as u32;
    let x1 = (max.x.ceil().min((clip.x + clip.width) as f32)).max(0.0) as u32;
    let y1 = (max.y.ceil().min((clip.y + clip.height) as f32)).max(0.0) as u32;

    let tl0 = is_top_left(v1.p, v2.p);
    let tl1 = is_top_left(v2.p, v0.p);
    let tl2 = is_top_left(v0.p, v1.p);

    for y in y0..y1 {
        for x in x0..x1 {
            let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
            let w0 = edge(v1.p, v2.p, p);
            let w1 = edge(v2.p, v0.p, p);
            let w2 = edge(v0.p, v1.p, p);
            if !(covers(w0, tl0) && covers(w1, tl1) && covers(w2, tl2)) {
                continue;
            }
            let (l0, l1, l2) = (w0 / area, w1 / area, w2 / area);
            let depth = l0 * v0.z + l1 * v1.z + l2 * v2.z;

            // Perspective-correct weights.
            let p0 = l0 * v0.inv_w;
            let p1 = l1 * v1.inv_w;
            let p2 = l2 * v2.inv_w;
            let sum = p0 + p1 + p2;
            let mut varyings = [Vec4::ZERO; VARYINGS];
            if sum != 0.0 {
                for (k, out) in varyings.iter_mut().enumerate() {
                    *out = (v0.varyings[k] * p0 + v1.varyings[k] * p1 + v2.varyings[k] * p2) / sum;
                }
            }
            emit(Fragment {
                x,
                y,
                depth,
                varyings,
            });
        }
    }
}

fn segment(a: &ScreenVertex, b: &ScreenVertex, clip: PixelRect, emit: &mut dyn FnMut(Fragment)) {
    let delta = b.p - a.p;
    let steps = delta.x.abs().max(delta.y.abs()).ceil().max(1.0) as u32;
    let mut last: Option<(u32, u32)> = None;
    for step in 0..=steps {
        let t = step as f32 / steps as f32;
        let p = a.p + delta * t;
        if p.x < 0.0 || p.y < 0.0 {
            continue;
        }
        let (x, y) = (p.x.floor() as u32, p.y.floor() as u32);
        if last == Some((x, y)) || !clip.contains(x, y) {
            continue;
        }
        last = Some((x, y));
        let mut varyings = [Vec4::ZERO; VARYINGS];
        for (k, out) in varyings.iter_mut().enumerate() {
            *out = a.varyings[k].lerp(b.varyings[k], t);
        }
        emit(Fragment {
            x,
            y,
            depth: a.z + (b.z - a.z) * t,
            varyings,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(x: f32, y: f32) -> ClipVertex {
        ClipVertex {
            position: Vec4::new(x, y, 0.5, 1.0),
            varyings: [Vec4::ZERO; VARYINGS],
        }
    }

    fn count(topology: Topology, vertices: &[ClipVertex], size: u32) -> Vec<(u32, u32)> {
        let rect = PixelRect::from_size(size, size);
        let mut hits = Vec::new();
        rasterize(topology, vertices, rect, rect, &mut |f| hits.push((f.x, f.y)));
        hits
    }

    #[test]
    fn test_full_screen_quad_covers_every_pixel_once() {
        let quad = [
            vertex(-1.0, -1.0),
            vertex(1.0, -1.0),
            vertex(1.0, 1.0),
            vertex(-1.0, -1.0),
            vertex(1.0, 1.0),
            vertex(-1.0, 1.0),
        ];
        let mut hits = count(Topology::TriangleList, &quad, 8);
        assert_eq!(hits.len(), 64);
        hits.sort();
        hits.dedup();
        assert_eq!(hits.len(), 64);
    }

    #[test]
    fn test_winding_does_not_matter() {
        let ccw = [vertex(-1.0, -1.0), vertex(1.0, -1.0), vertex(-1.0, 1.0)];
        let cw = [vertex(-1.0, -1.0), vertex(-1.0, 1.0), vertex(1.0, -1.0)];
        assert_eq!(count(Topology::TriangleList, &ccw, 8).len(), count(Topology::TriangleList, &cw, 8).len());
    }

    #[test]
    fn test_clip_limits_coverage() {
        let quad = [vertex(-1.0, -1.0), vertex(3.0, -1.0), vertex(-1.0, 3.0)];
        let viewport = PixelRect::from_size(8, 8);
        let clip = PixelRect::new(0, 0, 4, 4);
        let mut hits = 0;
        rasterize(Topology::TriangleList, &quad, viewport, clip, &mut |_| hits += 1);
        assert_eq!(hits, 16);
    }

    #[test]
    fn test_line_and_point() {
        let line = [vertex(-1.0, 0.0), vertex(1.0, 0.0)];
        let hits = count(Topology::LineList, &line, 8);
        assert_eq!(hits.len(), 8);
        assert!(hits.iter().all(|&(_, y)| y == 4));

        let point = [vertex(0.0, 0.0)];
        assert_eq!(count(Topology::PointList, &point, 8), [(4, 4)]);
    }

    #[test]
    fn test_blend_modes() {
        let src = [1.0, 0.0, 0.0, 0.25];
        let dst = [0.0, 0.0, 1.0, 1.0];
        assert_eq!(apply_blend(BlendMode::Replace, src, dst), src);
        assert_eq!(apply_blend(BlendMode::Alpha, src, dst), [0.25, 0.0, 0.75, 1.0]);
        assert_eq!(apply_blend(BlendMode::Additive, src, dst), [1.0, 0.0, 2.0, 1.25]);
        assert_eq!(apply_blend(BlendMode::Reveal, [0.25; 4], [1.0; 4]), [0.75; 4]);
    }

    #[test]
    fn test_unorm_storage_is_quantized() {
        let mut texture = SoftTexture::new(1, 1, TextureFormat::Rgba8Unorm);
        texture.write(0, 0, Texel::Float([0.5, 2.0, -1.0, 1.0]), BlendMode::Replace);
        let value = texture.load(0, 0);
        assert_eq!(value[0], 128.0 / 255.0);
        assert_eq!(value[1], 1.0);
        assert_eq!(value[2], 0.0);
    }
}
