//! Software device with global bound state.
//!
//! Every draw executes as soon as it is issued against whatever framebuffer,
//! pipeline, bindings and buffers are currently bound. Programs are not
//! compiled; each pipeline's [`FixedFunction`] description selects the
//! built-in stage that implements the same shading as the generated WGSL.

mod raster;

use std::ops::Range;
use std::rc::Rc;

use bytemuck::Pod;
use fxhash::FxHashMap;
use glam::{Mat4, Vec2, Vec3, Vec4};

use self::raster::{ClipVertex, Fragment, SoftTexture, Texel, Texels, VARYINGS};
use super::{BackendKind, Capabilities};
use crate::error::{RenderError, RenderResult};
use crate::pipeline::{FixedFunction, FullscreenOp, PipelineDescriptor, SurfaceOutput, SurfaceShading};
use crate::resource::{
    Binding, BufferDesc, BufferId, Device, DeviceStats, FramebufferDesc, FramebufferId, LoadOp,
    PassLoad, PipelineId, PixelData, PixelRect, Pixels, ResourceKind, TextureDesc, TextureFormat,
    TextureId,
};
use crate::shader::{MapperUniforms, RendererUniforms, VertexFormat, VertexSemantic};

const BACKEND: &str = "immediate";

struct SoftBuffer {
    desc: BufferDesc,
    data: Vec<u8>,
}

#[derive(Default)]
struct BoundState {
    framebuffer: Option<FramebufferId>,
    in_pass: bool,
    viewport: Option<PixelRect>,
    pipeline: Option<PipelineId>,
    bindings: FxHashMap<u32, Vec<Binding>>,
    vertex_buffers: FxHashMap<u32, BufferId>,
    index_buffer: Option<BufferId>,
}

/// Attachments removed from the texture table while a draw writes them.
struct Attachments {
    colors: Vec<Option<SoftTexture>>,
    depth: Option<SoftTexture>,
}

impl Attachments {
    fn extent(&self) -> Option<PixelRect> {
        self.colors
            .iter()
            .flatten()
            .chain(self.depth.iter())
            .next()
            .map(SoftTexture::extent)
    }
}

/// A headless device that rasterizes on the CPU.
pub struct ImmediateDevice {
    caps: Capabilities,
    next_id: u32,
    buffers: FxHashMap<u32, SoftBuffer>,
    textures: FxHashMap<u32, SoftTexture>,
    framebuffers: FxHashMap<u32, FramebufferDesc>,
    pipelines: FxHashMap<u32, Rc<PipelineDescriptor>>,
    state: BoundState,
    texture_allocations: u64,
    draws: u64,
    submits: u64,
}

impl ImmediateDevice {
    pub fn new() -> Self {
        Self::with_capabilities(Self::default_capabilities())
    }

    pub fn default_capabilities() -> Capabilities {
        Capabilities {
            geometry_stage: true,
            ..Capabilities::default()
        }
    }

    pub fn with_capabilities(caps: Capabilities) -> Self {
        Self {
            caps,
            next_id: 1,
            buffers: FxHashMap::default(),
            textures: FxHashMap::default(),
            framebuffers: FxHashMap::default(),
            pipelines: FxHashMap::default(),
            state: BoundState::default(),
            texture_allocations: 0,
            draws: 0,
            submits: 0,
        }
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn check_size(&self, width: u32, height: u32) -> RenderResult<()> {
        let max = self.caps.max_texture_size;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(RenderError::InvalidSize { width, height });
        }
        Ok(())
    }

    fn texture(&self, id: TextureId) -> RenderResult<&SoftTexture> {
        self.textures.get(&id.0).ok_or(RenderError::UnknownHandle {
            kind: ResourceKind::Texture,
            id: id.0,
        })
    }

    fn buffer(&self, id: BufferId) -> RenderResult<&SoftBuffer> {
        self.buffers.get(&id.0).ok_or(RenderError::UnknownHandle {
            kind: ResourceKind::Buffer,
            id: id.0,
        })
    }

    fn binding(&self, group: u32, index: usize) -> Option<Binding> {
        self.state.bindings.get(&group).and_then(|b| b.get(index)).copied()
    }

    fn uniform<T: Pod>(&self, group: u32) -> RenderResult<T> {
        let id = match self.binding(group, 0) {
            Some(Binding::Uniform(id)) => id,
            _ => return Err(RenderError::MissingContext("uniform buffer binding")),
        };
        let data = &self.buffer(id)?.data;
        let size = std::mem::size_of::<T>();
        if data.len() < size {
            return Err(RenderError::Device(format!(
                "uniform buffer {} holds {} bytes, block needs {}",
                id.0,
                data.len(),
                size
            )));
        }
        Ok(bytemuck::pod_read_unaligned(&data[..size]))
    }

    fn group_textures(&self, group: u32) -> RenderResult<Vec<&SoftTexture>> {
        let Some(bindings) = self.state.bindings.get(&group) else {
            return Err(RenderError::MissingContext("texture bindings"));
        };
        bindings
            .iter()
            .filter_map(|b| match b {
                Binding::Texture(id) => Some(self.texture(*id)),
                _ => None,
            })
            .collect()
    }

    fn attachment_format(&self, slot: Option<TextureId>) -> Option<TextureFormat> {
        slot.and_then(|id| self.textures.get(&id.0)).map(|t| t.format)
    }

    fn check_attachments(&self, fb: &FramebufferDesc, desc: &PipelineDescriptor) -> RenderResult<()> {
        let mismatch = |detail: String| RenderError::AttachmentMismatch {
            label: desc.label.clone(),
            detail,
        };
        if fb.color.len() != desc.color_targets.len() {
            return Err(mismatch(format!(
                "expected {} color attachments, framebuffer has {}",
                desc.color_targets.len(),
                fb.color.len()
            )));
        }
        for (index, (slot, target)) in fb.color.iter().zip(&desc.color_targets).enumerate() {
            let format = self.attachment_format(*slot);
            if format != Some(target.format) {
                return Err(mismatch(format!(
                    "color attachment {} is {:?}, pipeline expects {:?}",
                    index, format, target.format
                )));
            }
        }
        let depth = self.attachment_format(fb.depth);
        if depth != desc.depth.map(|d| d.format) {
            return Err(mismatch(format!(
                "depth attachment is {:?}, pipeline expects {:?}",
                depth,
                desc.depth.map(|d| d.format)
            )));
        }
        Ok(())
    }

    fn take_attachments(&mut self, fb: &FramebufferDesc) -> Attachments {
        Attachments {
            colors: fb
                .color
                .iter()
                .map(|slot| slot.and_then(|id| self.textures.remove(&id.0)))
                .collect(),
            depth: fb.depth.and_then(|id| self.textures.remove(&id.0)),
        }
    }

    fn restore_attachments(&mut self, fb: &FramebufferDesc, attachments: Attachments) {
        for (slot, texture) in fb.color.iter().zip(attachments.colors) {
            if let (Some(id), Some(texture)) = (slot, texture) {
                self.textures.insert(id.0, texture);
            }
        }
        if let (Some(id), Some(texture)) = (fb.depth, attachments.depth) {
            self.textures.insert(id.0, texture);
        }
    }

    fn bound_pass(&self) -> RenderResult<(FramebufferDesc, Rc<PipelineDescriptor>)> {
        if !self.state.in_pass {
            return Err(RenderError::MissingContext("an active pass"));
        }
        let fb_id = self
            .state
            .framebuffer
            .ok_or(RenderError::MissingContext("bound framebuffer"))?;
        let fb = self
            .framebuffers
            .get(&fb_id.0)
            .cloned()
            .ok_or(RenderError::UnknownHandle {
                kind: ResourceKind::Framebuffer,
                id: fb_id.0,
            })?;
        let pipeline_id = self
            .state
            .pipeline
            .ok_or(RenderError::MissingContext("bound pipeline"))?;
        let pipeline = self
            .pipelines
            .get(&pipeline_id.0)
            .cloned()
            .ok_or(RenderError::UnknownHandle {
                kind: ResourceKind::Pipeline,
                id: pipeline_id.0,
            })?;
        Ok((fb, pipeline))
    }

    fn execute(&mut self, elements: &[u32]) -> RenderResult<()> {
        let (fb, desc) = self.bound_pass()?;
        self.check_attachments(&fb, &desc)?;
        let mut attachments = self.take_attachments(&fb);
        let result = self.run(&desc, elements, &mut attachments);
        self.restore_attachments(&fb, attachments);
        self.draws += 1;
        result
    }

    fn run(&self, desc: &PipelineDescriptor, elements: &[u32], attachments: &mut Attachments) -> RenderResult<()> {
        let Some(extent) = attachments.extent() else {
            return Err(RenderError::MissingContext("framebuffer attachments"));
        };
        let viewport = self.state.viewport.unwrap_or(extent);
        let Some(clip) = viewport.intersect(&extent) else {
            return Ok(());
        };
        match &desc.fixed {
            FixedFunction::Fullscreen(op) => self.run_fullscreen(desc, op, clip, attachments),
            FixedFunction::Surface(shading) => {
                self.run_surface(desc, *shading, false, elements, viewport, clip, attachments)
            }
            FixedFunction::Sphere(shading) => {
                self.run_surface(desc, *shading, true, elements, viewport, clip, attachments)
            }
        }
    }

    fn run_fullscreen(
        &self,
        desc: &PipelineDescriptor,
        op: &FullscreenOp,
        clip: PixelRect,
        attachments: &mut Attachments,
    ) -> RenderResult<()> {
        let inputs = self.group_textures(0)?;
        let needed = match op {
            FullscreenOp::OitResolve => 2,
            _ => 1,
        };
        if inputs.len() < needed {
            return Err(RenderError::MissingContext("full-screen input textures"));
        }
        let Some(blend) = desc.color_targets.first().map(|target| target.blend) else {
            return Err(RenderError::MissingContext("full-screen color target"));
        };
        let Some(target) = attachments.colors.first_mut().and_then(Option::as_mut) else {
            return Ok(());
        };
        for y in clip.y..clip.y + clip.height {
            for x in clip.x..clip.x + clip.width {
                if let Some(value) = fullscreen_texel(op, &inputs, x as i64, y as i64) {
                    target.write(x, y, Texel::Float(value), blend);
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn run_surface(
        &self,
        desc: &PipelineDescriptor,
        shading: SurfaceShading,
        imposter: bool,
        elements: &[u32],
        viewport: PixelRect,
        clip: PixelRect,
        attachments: &mut Attachments,
    ) -> RenderResult<()> {
        let renderer: RendererUniforms = self.uniform(0)?;
        let mapper: MapperUniforms = self.uniform(1)?;
        let image = if shading.textured {
            self.group_textures(2)?.first().copied()
        } else {
            None
        };
        let vertices = self.fetch_vertices(desc, elements, &renderer, &mapper, imposter)?;
        let depth_state = desc.depth;
        let blends: Vec<_> = desc.color_targets.iter().map(|t| t.blend).collect();

        let mut emit = |mut fragment: Fragment| {
            if imposter && !intersect_sphere(&renderer, &mut fragment) {
                return;
            }
            if let (Some(state), Some(depth)) = (depth_state, attachments.depth.as_mut()) {
                if fragment.depth < 0.0 || fragment.depth > 1.0 {
                    return;
                }
                if !state.compare.passes(fragment.depth, depth.depth_at(fragment.x, fragment.y)) {
                    return;
                }
                if state.write {
                    depth.set_depth(fragment.x, fragment.y, fragment.depth);
                }
            }
            let outputs = shade_surface(&shading, &renderer, &mapper, image, &fragment);
            for (index, texel) in outputs.into_iter().enumerate() {
                if let (Some(texel), Some(Some(target))) = (texel, attachments.colors.get_mut(index)) {
                    target.write(fragment.x, fragment.y, texel, blends[index]);
                }
            }
        };
        raster::rasterize(desc.topology, &vertices, viewport, clip, &mut emit);
        Ok(())
    }

    fn fetch_vertices(
        &self,
        desc: &PipelineDescriptor,
        elements: &[u32],
        renderer: &RendererUniforms,
        mapper: &MapperUniforms,
        imposter: bool,
    ) -> RenderResult<Vec<ClipVertex>> {
        let mut streams = Vec::with_capacity(desc.vertex_attributes.len());
        for (slot, attribute) in desc.vertex_attributes.iter().enumerate() {
            let id = self
                .state
                .vertex_buffers
                .get(&(slot as u32))
                .copied()
                .ok_or(RenderError::MissingContext("vertex buffer"))?;
            streams.push((attribute.semantic, attribute.format, self.buffer(id)?.data.as_slice()));
        }

        let mcpc = renderer.wcpc_matrix() * mapper.mcwc_matrix();
        let normal_matrix = Mat4::from_cols_array_2d(&mapper.normal_matrix);
        let mut vertices = Vec::with_capacity(elements.len());
        let mcvc = renderer.wcvc_matrix() * mapper.mcwc_matrix();
        for &element in elements {
            let mut position = Vec4::W;
            let mut offset = Vec4::ZERO;
            let mut varyings = [Vec4::Z, Vec4::ONE, Vec4::ZERO];
            for (semantic, format, data) in &streams {
                let value = decode_vertex(*format, data, element)
                    .ok_or_else(|| RenderError::Device(format!("vertex {} is out of range", element)))?;
                match semantic {
                    VertexSemantic::Position => position = value.truncate().extend(1.0),
                    VertexSemantic::Normal => {
                        varyings[0] = (normal_matrix * value.truncate().extend(0.0)).truncate().extend(0.0)
                    }
                    VertexSemantic::Color => varyings[1] = value,
                    VertexSemantic::TCoord => varyings[2] = value,
                    VertexSemantic::Offset => offset = value,
                }
            }
            if imposter {
                let center = (mcvc * position).truncate();
                let corner = sphere_corner(renderer, center, offset);
                // Corner and radius in slot 0, center in slot 2.
                varyings[0] = corner.extend(offset.z);
                varyings[2] = center.extend(0.0);
                vertices.push(ClipVertex {
                    position: renderer.vcpc_matrix() * corner.extend(1.0),
                    varyings,
                });
                continue;
            }
            vertices.push(ClipVertex {
                position: mcpc * position,
                varyings,
            });
        }
        Ok(vertices)
    }
}

impl Default for ImmediateDevice {
    fn default() -> Self {
        Self::new()
    }
}

fn read_f32(data: &[u8], offset: usize) -> Option<f32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn decode_vertex(format: VertexFormat, data: &[u8], index: u32) -> Option<Vec4> {
    let base = index as usize * format.size() as usize;
    let mut out = Vec4::ZERO;
    match format {
        VertexFormat::Unorm8x4 => {
            let bytes = data.get(base..base + 4)?;
            out = Vec4::new(bytes[0] as f32, bytes[1] as f32, bytes[2] as f32, bytes[3] as f32) / 255.0;
        }
        _ => {
            let count = (format.size() / 4) as usize;
            for i in 0..count {
                out[i] = read_f32(data, base + i * 4)?;
            }
        }
    }
    Some(out)
}

fn f16_to_f32(bits: u16) -> f32 {
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exponent = ((bits >> 10) & 0x1f) as i32;
    let mantissa = (bits & 0x3ff) as f32;
    match exponent {
        0 => sign * mantissa * 2f32.powi(-24),
        0x1f if mantissa == 0.0 => sign * f32::INFINITY,
        0x1f => f32::NAN,
        _ => sign * (1.0 + mantissa / 1024.0) * 2f32.powi(exponent - 15),
    }
}

fn decode_texels(format: TextureFormat, data: &[u8]) -> Texels {
    match format {
        TextureFormat::Rgba8Unorm => Texels::Float(
            data.chunks_exact(4)
                .map(|c| [c[0], c[1], c[2], c[3]].map(|b| b as f32 / 255.0))
                .collect(),
        ),
        TextureFormat::Rgba16Float => Texels::Float(
            data.chunks_exact(8)
                .map(|c| {
                    let half = |i: usize| f16_to_f32(u16::from_le_bytes([c[i * 2], c[i * 2 + 1]]));
                    [half(0), half(1), half(2), half(3)]
                })
                .collect(),
        ),
        TextureFormat::R16Float => Texels::Float(
            data.chunks_exact(2)
                .map(|c| [f16_to_f32(u16::from_le_bytes([c[0], c[1]])), 0.0, 0.0, 0.0])
                .collect(),
        ),
        TextureFormat::R32Float | TextureFormat::Depth32Float => Texels::Float(
            data.chunks_exact(4)
                .map(|c| [f32::from_le_bytes([c[0], c[1], c[2], c[3]]), 0.0, 0.0, 0.0])
                .collect(),
        ),
        TextureFormat::Rgba32Uint => Texels::Uint(
            data.chunks_exact(16)
                .map(|c| {
                    let word = |i: usize| u32::from_le_bytes([c[i * 4], c[i * 4 + 1], c[i * 4 + 2], c[i * 4 + 3]]);
                    [word(0), word(1), word(2), word(3)]
                })
                .collect(),
        ),
    }
}

/// Evaluates a full-screen operation for the pixel at `(x, y)`.
///
/// `None` leaves the target untouched.
fn fullscreen_texel(op: &FullscreenOp, inputs: &[&SoftTexture], x: i64, y: i64) -> Option<[f32; 4]> {
    match op {
        FullscreenOp::Copy => Some(inputs[0].load(x, y)),
        FullscreenOp::OitResolve => {
            let reveal = inputs[1].load(x, y)[0];
            if reveal == 1.0 {
                return None;
            }
            let accum = inputs[0].load(x, y);
            let total = accum[3].max(0.01);
            Some([accum[0] / total, accum[1] / total, accum[2] / total, 1.0 - reveal])
        }
        FullscreenOp::Convolve(kernel) => {
            let mut sum = [0.0f32; 4];
            for (dx, dy, weight) in kernel.taps() {
                let texel = inputs[0].load(x + dx as i64, y + dy as i64);
                for c in 0..4 {
                    sum[c] += weight * texel[c];
                }
            }
            Some(sum)
        }
    }
}

/// View position of one imposter corner. `offset` holds the corner in `xy`
/// and the radius in `z`.
fn sphere_corner(renderer: &RendererUniforms, center: Vec3, offset: Vec4) -> Vec3 {
    let radius = offset.z;
    if renderer.is_parallel() {
        return Vec3::new(center.x + offset.x * radius, center.y + offset.y * radius, center.z);
    }
    let distance = center.length();
    let dir = -center / distance;
    let up = if dir.y.abs() < 0.99 { Vec3::Y } else { Vec3::X };
    let right = up.cross(dir).normalize();
    let top = dir.cross(right);
    let spread = radius * distance / (distance * distance - radius * radius).max(1e-6).sqrt();
    center + (offset.x * right + offset.y * top) * spread
}

/// Casts the view ray of an imposter fragment at its sphere. A hit replaces
/// the fragment's depth and normal; a miss returns `false`.
fn intersect_sphere(renderer: &RendererUniforms, fragment: &mut Fragment) -> bool {
    let corner = fragment.varyings[0].truncate();
    let radius = fragment.varyings[0].w;
    let center = fragment.varyings[2].truncate();
    if radius <= 0.0 {
        return false;
    }
    let (eye, dir) = if renderer.is_parallel() {
        (Vec3::new(corner.x, corner.y, corner.z + 3.0 * radius), Vec3::NEG_Z)
    } else {
        (Vec3::ZERO, corner.normalize_or_zero())
    };
    let eye = (eye - center) / radius;
    let b = 2.0 * eye.dot(dir);
    let c = eye.dot(eye) - 1.0;
    let d = b * b - 4.0 * c;
    if d < 0.0 {
        return false;
    }
    let t = (-b - d.sqrt()) * 0.5;
    let normal = (eye + t * dir).normalize_or_zero();
    let hit = renderer.vcpc_matrix() * (normal * radius + center).extend(1.0);
    fragment.depth = hit.z / hit.w;
    fragment.varyings[0] = normal.extend(0.0);
    true
}

/// The fragment stage of surface programs, output per color target.
fn shade_surface(
    shading: &SurfaceShading,
    renderer: &RendererUniforms,
    mapper: &MapperUniforms,
    image: Option<&SoftTexture>,
    fragment: &Fragment,
) -> [Option<Texel>; 2] {
    let ambient_color = Vec4::from_array(mapper.ambient_color);
    let mut diffuse_color = Vec4::from_array(mapper.diffuse_color);
    let mut opacity = mapper.opacity();
    let [normal_vc, vertex_color, tcoord]: [Vec4; VARYINGS] = fragment.varyings;
    if shading.vertex_colors {
        diffuse_color = vertex_color.truncate().extend(1.0);
        opacity *= vertex_color.w;
    }

    let mut normal = Vec3::Z;
    if shading.normals {
        normal = normal_vc.truncate().normalize_or_zero();
    }

    let mut color = if shading.lighting {
        if normal.z < 0.0 {
            normal = -normal;
        }
        let mut diffuse_light = Vec3::ZERO;
        let count = (renderer.light_count[0] as usize).min(renderer.lights.len());
        for light in &renderer.lights[..count] {
            let direction = Vec4::from_array(light.direction_vc).truncate();
            let light_color = Vec4::from_array(light.color).truncate();
            diffuse_light += normal.dot(-direction).max(0.0) * light_color;
        }
        let rgb = mapper.coefficients[0] * ambient_color.truncate()
            + mapper.coefficients[1] * diffuse_light * diffuse_color.truncate();
        rgb.extend(opacity)
    } else {
        diffuse_color.truncate().extend(opacity)
    };

    if let Some(image) = image {
        color *= Vec4::from_array(image.sample(Vec2::new(tcoord.x, tcoord.y)));
    }

    match shading.output {
        SurfaceOutput::Color => [Some(Texel::Float(color.to_array())), None],
        SurfaceOutput::OitAccumulate => {
            let alpha = color.w;
            let weight = 1.0 - fragment.depth * 0.9;
            let accum = (color.truncate() * alpha).extend(alpha) * weight;
            [
                Some(Texel::Float(accum.to_array())),
                Some(Texel::Float([alpha, 0.0, 0.0, 0.0])),
            ]
        }
        SurfaceOutput::Ids => {
            let [prop, composite, _, _] = mapper.ids;
            [Some(Texel::Uint([prop, composite, 0, prop])), None]
        }
    }
}

impl Device for ImmediateDevice {
    fn backend(&self) -> BackendKind {
        BackendKind::Immediate
    }

    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn stats(&self) -> DeviceStats {
        DeviceStats {
            buffers: self.buffers.len(),
            textures: self.textures.len(),
            framebuffers: self.framebuffers.len(),
            pipelines: self.pipelines.len(),
            texture_allocations: self.texture_allocations,
            draws: self.draws,
            submits: self.submits,
        }
    }

    fn create_buffer(&mut self, desc: &BufferDesc, contents: Option<&[u8]>) -> RenderResult<BufferId> {
        let mut data = vec![0u8; desc.size as usize];
        if let Some(contents) = contents {
            let len = contents.len().min(data.len());
            data[..len].copy_from_slice(&contents[..len]);
        }
        let id = self.allocate_id();
        self.buffers.insert(
            id,
            SoftBuffer {
                desc: desc.clone(),
                data,
            },
        );
        log::trace!("created buffer '{}' ({} bytes)", desc.label, desc.size);
        Ok(BufferId(id))
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> RenderResult<()> {
        let entry = self.buffers.get_mut(&buffer.0).ok_or(RenderError::UnknownHandle {
            kind: ResourceKind::Buffer,
            id: buffer.0,
        })?;
        let start = offset as usize;
        let end = start + data.len();
        if end > entry.data.len() {
            return Err(RenderError::Device(format!(
                "write of {} bytes at {} overflows buffer '{}'",
                data.len(),
                offset,
                entry.desc.label
            )));
        }
        entry.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer.0);
        self.state.vertex_buffers.retain(|_, b| *b != buffer);
        if self.state.index_buffer == Some(buffer) {
            self.state.index_buffer = None;
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> RenderResult<TextureId> {
        self.check_size(desc.width, desc.height)?;
        let id = self.allocate_id();
        self.textures
            .insert(id, SoftTexture::new(desc.width, desc.height, desc.format));
        self.texture_allocations += 1;
        log::trace!(
            "created texture '{}' {}x{} {:?}",
            desc.label,
            desc.width,
            desc.height,
            desc.format
        );
        Ok(TextureId(id))
    }

    fn resize_texture(&mut self, texture: TextureId, width: u32, height: u32) -> RenderResult<()> {
        self.check_size(width, height)?;
        let entry = self.textures.get_mut(&texture.0).ok_or(RenderError::UnknownHandle {
            kind: ResourceKind::Texture,
            id: texture.0,
        })?;
        *entry = SoftTexture::new(width, height, entry.format);
        self.texture_allocations += 1;
        Ok(())
    }

    fn write_texture(&mut self, texture: TextureId, data: &[u8]) -> RenderResult<()> {
        let entry = self.textures.get_mut(&texture.0).ok_or(RenderError::UnknownHandle {
            kind: ResourceKind::Texture,
            id: texture.0,
        })?;
        let expected = (entry.width * entry.height * entry.format.bytes_per_texel()) as usize;
        if data.len() != expected {
            return Err(RenderError::Device(format!(
                "texture upload of {} bytes, expected {}",
                data.len(),
                expected
            )));
        }
        entry.texels = decode_texels(entry.format, data);
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture.0);
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> RenderResult<FramebufferId> {
        let id = self.allocate_id();
        self.framebuffers.insert(id, desc.clone());
        Ok(FramebufferId(id))
    }

    fn update_framebuffer(&mut self, framebuffer: FramebufferId, desc: &FramebufferDesc) -> RenderResult<()> {
        let entry = self
            .framebuffers
            .get_mut(&framebuffer.0)
            .ok_or(RenderError::UnknownHandle {
                kind: ResourceKind::Framebuffer,
                id: framebuffer.0,
            })?;
        *entry = desc.clone();
        Ok(())
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.framebuffers.remove(&framebuffer.0);
        if self.state.framebuffer == Some(framebuffer) {
            self.state.framebuffer = None;
        }
    }

    fn create_pipeline(&mut self, desc: &PipelineDescriptor) -> RenderResult<PipelineId> {
        if desc.program.geometry.is_some() && !self.caps.geometry_stage {
            return Err(RenderError::Unsupported {
                backend: BACKEND,
                feature: "geometry stage",
            });
        }
        if !self.caps.supports_attachments(desc.color_targets.len()) {
            return Err(RenderError::Unsupported {
                backend: BACKEND,
                feature: "multiple render targets",
            });
        }
        let id = self.allocate_id();
        self.pipelines.insert(id, Rc::new(desc.clone()));
        log::debug!("created pipeline '{}' ({})", desc.label, desc.key);
        Ok(PipelineId(id))
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineId) {
        self.pipelines.remove(&pipeline.0);
        if self.state.pipeline == Some(pipeline) {
            self.state.pipeline = None;
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.state.framebuffer = framebuffer;
    }

    fn bound_framebuffer(&self) -> Option<FramebufferId> {
        self.state.framebuffer
    }

    fn begin_pass(&mut self, load: &PassLoad) -> RenderResult<()> {
        let fb_id = self
            .state
            .framebuffer
            .ok_or(RenderError::MissingContext("bound framebuffer"))?;
        let fb = self
            .framebuffers
            .get(&fb_id.0)
            .cloned()
            .ok_or(RenderError::UnknownHandle {
                kind: ResourceKind::Framebuffer,
                id: fb_id.0,
            })?;
        for (index, slot) in fb.color.iter().enumerate() {
            if let (Some(id), LoadOp::Clear(color)) = (slot, load.color_op(index)) {
                if let Some(texture) = self.textures.get_mut(&id.0) {
                    texture.fill(color);
                }
            }
        }
        if let (Some(id), LoadOp::Clear(depth)) = (fb.depth, load.depth) {
            if let Some(texture) = self.textures.get_mut(&id.0) {
                texture.fill([depth, 0.0, 0.0, 0.0]);
            }
        }
        self.state.in_pass = true;
        self.state.viewport = None;
        Ok(())
    }

    fn set_viewport(&mut self, rect: PixelRect) -> RenderResult<()> {
        self.state.viewport = Some(rect);
        Ok(())
    }

    fn set_pipeline(&mut self, pipeline: PipelineId) -> RenderResult<()> {
        if !self.pipelines.contains_key(&pipeline.0) {
            return Err(RenderError::UnknownHandle {
                kind: ResourceKind::Pipeline,
                id: pipeline.0,
            });
        }
        self.state.pipeline = Some(pipeline);
        Ok(())
    }

    fn set_bindings(&mut self, group: u32, bindings: &[Binding]) -> RenderResult<()> {
        self.state.bindings.insert(group, bindings.to_vec());
        Ok(())
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferId) -> RenderResult<()> {
        self.buffer(buffer)?;
        self.state.vertex_buffers.insert(slot, buffer);
        Ok(())
    }

    fn set_index_buffer(&mut self, buffer: BufferId) -> RenderResult<()> {
        self.buffer(buffer)?;
        self.state.index_buffer = Some(buffer);
        Ok(())
    }

    fn draw(&mut self, vertices: Range<u32>) -> RenderResult<()> {
        let elements: Vec<u32> = vertices.collect();
        self.execute(&elements)
    }

    fn draw_indexed(&mut self, indices: Range<u32>) -> RenderResult<()> {
        let id = self
            .state
            .index_buffer
            .ok_or(RenderError::MissingContext("bound index buffer"))?;
        let data = &self.buffer(id)?.data;
        let elements = indices
            .map(|i| read_u32(data, i as usize * 4))
            .collect::<Option<Vec<u32>>>()
            .ok_or_else(|| RenderError::Device("index range exceeds the index buffer".to_string()))?;
        self.execute(&elements)
    }

    fn end_pass(&mut self) -> RenderResult<()> {
        if !self.state.in_pass {
            return Err(RenderError::MissingContext("an active pass"));
        }
        self.state.in_pass = false;
        Ok(())
    }

    fn submit(&mut self) -> RenderResult<()> {
        self.submits += 1;
        Ok(())
    }

    fn read_pixels(&mut self, texture: TextureId, rect: PixelRect) -> RenderResult<Pixels> {
        let source = self.texture(texture)?;
        if !source.format.is_readable() {
            return Err(RenderError::Unsupported {
                backend: BACKEND,
                feature: "read-back of this texture format",
            });
        }
        if source.extent().intersect(&rect) != Some(rect) {
            return Err(RenderError::Readback(format!(
                "{:?} lies outside the {}x{} texture",
                rect, source.width, source.height
            )));
        }
        let coords: Vec<(i64, i64)> = (rect.y..rect.y + rect.height)
            .flat_map(|y| (rect.x..rect.x + rect.width).map(move |x| (x as i64, y as i64)))
            .collect();
        let data = match source.format {
            TextureFormat::Rgba8Unorm => PixelData::Unorm8(
                coords
                    .iter()
                    .flat_map(|&(x, y)| source.load(x, y).map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8))
                    .collect(),
            ),
            TextureFormat::Rgba32Uint => match &source.texels {
                Texels::Uint(texels) => PixelData::Uint32(
                    coords
                        .iter()
                        .flat_map(|&(x, y)| texels[(y as usize) * source.width as usize + x as usize])
                        .collect(),
                ),
                Texels::Float(_) => return Err(RenderError::Readback("unsigned texture holds floats".into())),
            },
            _ => PixelData::Float32(coords.iter().map(|&(x, y)| source.load(x, y)[0]).collect()),
        };
        Ok(Pixels {
            width: rect.width,
            height: rect.height,
            format: source.format,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::fullscreen::quad_descriptor;
    use crate::pipeline::{BlendMode, ColorTargetState};
    use crate::resource::BufferUsage;

    fn target(device: &mut ImmediateDevice, format: TextureFormat) -> (TextureId, FramebufferId) {
        let texture = device
            .create_texture(&TextureDesc {
                label: "target".into(),
                width: 4,
                height: 4,
                format,
            })
            .unwrap();
        let fb = device
            .create_framebuffer(&FramebufferDesc {
                label: "fb".into(),
                color: vec![Some(texture)],
                depth: None,
            })
            .unwrap();
        (texture, fb)
    }

    #[test]
    fn test_resize_keeps_id_and_counts_allocations() {
        let mut device = ImmediateDevice::new();
        let (texture, _) = target(&mut device, TextureFormat::Rgba8Unorm);
        assert_eq!(device.stats().texture_allocations, 1);
        device.resize_texture(texture, 8, 2).unwrap();
        assert_eq!(device.stats().texture_allocations, 2);
        let pixels = device.read_pixels(texture, PixelRect::from_size(8, 2)).unwrap();
        assert_eq!(pixels.width, 8);
        assert!(device.read_pixels(texture, PixelRect::from_size(4, 4)).is_err());
    }

    #[test]
    fn test_clear_and_copy() {
        let mut device = ImmediateDevice::new();
        let (source, source_fb) = target(&mut device, TextureFormat::Rgba8Unorm);
        let (dest, dest_fb) = target(&mut device, TextureFormat::Rgba8Unorm);

        device.bind_framebuffer(Some(source_fb));
        device.begin_pass(&PassLoad::clear(&[[1.0, 0.0, 0.0, 1.0]], 1.0)).unwrap();
        device.end_pass().unwrap();

        let desc = quad_descriptor(
            FullscreenOp::Copy,
            ColorTargetState::new(TextureFormat::Rgba8Unorm, BlendMode::Replace),
        );
        let pipeline = device.create_pipeline(&desc).unwrap();
        device.bind_framebuffer(Some(dest_fb));
        device.begin_pass(&PassLoad::clear(&[[0.0; 4]], 1.0)).unwrap();
        device.set_pipeline(pipeline).unwrap();
        device.set_bindings(0, &[Binding::Texture(source)]).unwrap();
        device.draw(0..3).unwrap();
        device.end_pass().unwrap();
        device.submit().unwrap();

        let pixels = device.read_pixels(dest, PixelRect::new(1, 1, 1, 1)).unwrap();
        assert_eq!(pixels.data, PixelData::Unorm8(vec![255, 0, 0, 255]));
        assert_eq!(device.stats().draws, 1);
        assert_eq!(device.stats().submits, 1);
    }

    #[test]
    fn test_draw_requires_matching_attachments() {
        let mut device = ImmediateDevice::new();
        let (_, fb) = target(&mut device, TextureFormat::Rgba16Float);
        let (source, _) = target(&mut device, TextureFormat::Rgba8Unorm);
        let desc = quad_descriptor(
            FullscreenOp::Copy,
            ColorTargetState::new(TextureFormat::Rgba8Unorm, BlendMode::Replace),
        );
        let pipeline = device.create_pipeline(&desc).unwrap();
        device.bind_framebuffer(Some(fb));
        device.begin_pass(&PassLoad::load()).unwrap();
        device.set_pipeline(pipeline).unwrap();
        device.set_bindings(0, &[Binding::Texture(source)]).unwrap();
        let err = device.draw(0..3).unwrap_err();
        assert!(matches!(err, RenderError::AttachmentMismatch { .. }));
    }

    #[test]
    fn test_fullscreen_without_color_target_is_missing_context() {
        let mut device = ImmediateDevice::new();
        let (source, _) = target(&mut device, TextureFormat::Rgba8Unorm);
        let depth = device
            .create_texture(&TextureDesc {
                label: "depth".into(),
                width: 4,
                height: 4,
                format: TextureFormat::Depth32Float,
            })
            .unwrap();
        let fb = device
            .create_framebuffer(&FramebufferDesc {
                label: "depth only".into(),
                color: Vec::new(),
                depth: Some(depth),
            })
            .unwrap();
        let mut desc = quad_descriptor(
            FullscreenOp::Copy,
            ColorTargetState::new(TextureFormat::Rgba8Unorm, BlendMode::Replace),
        );
        desc.color_targets.clear();
        desc.depth = Some(crate::pipeline::DepthState::read_write(TextureFormat::Depth32Float));
        let pipeline = device.create_pipeline(&desc).unwrap();

        device.bind_framebuffer(Some(fb));
        device.begin_pass(&PassLoad::load()).unwrap();
        device.set_pipeline(pipeline).unwrap();
        device.set_bindings(0, &[Binding::Texture(source)]).unwrap();
        let err = device.draw(0..3).unwrap_err();
        assert!(matches!(err, RenderError::MissingContext("full-screen color target")));
        assert_eq!(err.category(), crate::ErrorCategory::Configuration);
        // The depth attachment went back into the texture table.
        assert!(device.read_pixels(depth, PixelRect::from_size(4, 4)).is_ok());
    }

    #[test]
    fn test_draw_outside_pass_is_missing_context() {
        let mut device = ImmediateDevice::new();
        assert!(matches!(
            device.draw(0..3),
            Err(RenderError::MissingContext(_))
        ));
        assert!(device.begin_pass(&PassLoad::load()).is_err());
    }

    #[test]
    fn test_buffer_bounds_and_uploads() {
        let mut device = ImmediateDevice::new();
        let desc = BufferDesc {
            label: "ubo".into(),
            usage: BufferUsage::Uniform,
            size: 8,
        };
        let buffer = device.create_buffer(&desc, Some(&[1, 2, 3])).unwrap();
        device.write_buffer(buffer, 4, &[9; 4]).unwrap();
        assert!(device.write_buffer(buffer, 6, &[0; 4]).is_err());
        device.destroy_buffer(buffer);
        assert!(device.write_buffer(buffer, 0, &[0]).is_err());
        assert_eq!(device.stats().buffers, 0);
    }

    #[test]
    fn test_half_float_decode() {
        assert_eq!(f16_to_f32(0x3c00), 1.0);
        assert_eq!(f16_to_f32(0xc000), -2.0);
        assert_eq!(f16_to_f32(0x3800), 0.5);
        assert_eq!(f16_to_f32(0), 0.0);
    }

    #[test]
    fn test_multi_target_pipeline_rejected_without_support() {
        let mut device = ImmediateDevice::with_capabilities(Capabilities {
            multi_render_target: false,
            ..ImmediateDevice::default_capabilities()
        });
        let mut desc = quad_descriptor(
            FullscreenOp::Copy,
            ColorTargetState::new(TextureFormat::Rgba8Unorm, BlendMode::Replace),
        );
        desc.color_targets.push(ColorTargetState::new(TextureFormat::R16Float, BlendMode::Reveal));
        assert!(matches!(
            device.create_pipeline(&desc),
            Err(RenderError::Unsupported { .. })
        ));
    }
}
