//! `wgpu` device.
//!
//! State calls between [`begin_pass`](Device::begin_pass) and
//! [`end_pass`](Device::end_pass) are recorded, then encoded into one render
//! pass on a frame-wide command encoder. Bind groups are created when
//! `set_bindings` is called, against the layout of the pipeline bound at that
//! point. Nothing reaches the queue until [`submit`](Device::submit).

mod convert;

use std::ops::Range;

use fxhash::FxHashMap;

use super::{BackendKind, Capabilities};
use crate::error::{RenderError, RenderResult};
use crate::pipeline::{AttachmentFormats, PipelineDescriptor};
use crate::resource::{
    Binding, BufferDesc, BufferId, BufferUsage, Device, DeviceStats, FramebufferDesc, FramebufferId,
    PassLoad, PipelineId, PixelData, PixelRect, Pixels, ResourceKind, TextureDesc, TextureFormat,
    TextureId,
};

const BACKEND: &str = "explicit";

struct GpuBuffer {
    buffer: wgpu::Buffer,
    desc: BufferDesc,
}

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    desc: TextureDesc,
}

struct GpuPipeline {
    pipeline: wgpu::RenderPipeline,
    bind_group_layouts: Vec<wgpu::BindGroupLayout>,
    attachments: AttachmentFormats,
    label: String,
}

enum Command {
    Viewport(PixelRect),
    Pipeline(PipelineId),
    BindGroup { group: u32, index: usize },
    VertexBuffer { slot: u32, buffer: BufferId },
    IndexBuffer(BufferId),
    Draw(Range<u32>),
    DrawIndexed(Range<u32>),
}

struct PassRecording {
    framebuffer: FramebufferId,
    load: PassLoad,
    pipeline: Option<PipelineId>,
    commands: Vec<Command>,
    bind_groups: Vec<wgpu::BindGroup>,
}

/// A headless `wgpu` device.
pub struct ExplicitDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    caps: Capabilities,
    sampler: wgpu::Sampler,
    next_id: u32,
    buffers: FxHashMap<u32, GpuBuffer>,
    textures: FxHashMap<u32, GpuTexture>,
    framebuffers: FxHashMap<u32, FramebufferDesc>,
    pipelines: FxHashMap<u32, GpuPipeline>,
    bound: Option<FramebufferId>,
    recording: Option<PassRecording>,
    encoder: Option<wgpu::CommandEncoder>,
    texture_allocations: u64,
    draws: u64,
    submits: u64,
}

impl ExplicitDevice {
    /// Requests an adapter without a surface and opens a device on it.
    pub fn new(label: &str) -> RenderResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: None,
            force_fallback_adapter: false,
        }))?;
        log::info!("using adapter {:?}", adapter.get_info().name);

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some(label),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
            experimental_features: Default::default(),
        }))?;

        let limits = device.limits();
        let caps = Capabilities {
            max_color_attachments: limits.max_color_attachments,
            multi_render_target: limits.max_color_attachments > 1,
            geometry_stage: false,
            max_texture_size: limits.max_texture_dimension_2d,
        };

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Nearest Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Ok(Self {
            device,
            queue,
            caps,
            sampler,
            next_id: 1,
            buffers: FxHashMap::default(),
            textures: FxHashMap::default(),
            framebuffers: FxHashMap::default(),
            pipelines: FxHashMap::default(),
            bound: None,
            recording: None,
            encoder: None,
            texture_allocations: 0,
            draws: 0,
            submits: 0,
        })
    }

    /// Pretends the adapter lacks (or has) multiple render targets.
    pub fn override_multi_target(&mut self, enabled: bool) {
        self.caps.multi_render_target = enabled && self.caps.max_color_attachments > 1;
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn allocate_texture(&self, desc: &TextureDesc) -> RenderResult<(wgpu::Texture, wgpu::TextureView)> {
        let max = self.caps.max_texture_size;
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(RenderError::InvalidSize {
                width: desc.width,
                height: desc.height,
            });
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: convert::texture_format(desc.format),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok((texture, view))
    }

    fn texture_entry(&self, id: TextureId) -> RenderResult<&GpuTexture> {
        self.textures.get(&id.0).ok_or(RenderError::UnknownHandle {
            kind: ResourceKind::Texture,
            id: id.0,
        })
    }

    fn buffer_entry(&self, id: BufferId) -> RenderResult<&GpuBuffer> {
        self.buffers.get(&id.0).ok_or(RenderError::UnknownHandle {
            kind: ResourceKind::Buffer,
            id: id.0,
        })
    }

    fn framebuffer_formats(&self, fb: &FramebufferDesc) -> Option<AttachmentFormats> {
        let color = fb
            .color
            .iter()
            .map(|slot| slot.and_then(|id| self.textures.get(&id.0)).map(|t| t.desc.format))
            .collect::<Option<Vec<_>>>()?;
        let depth = match fb.depth {
            Some(id) => Some(self.textures.get(&id.0)?.desc.format),
            None => None,
        };
        Some(AttachmentFormats { color, depth })
    }

    fn recording(&mut self) -> RenderResult<&mut PassRecording> {
        self.recording
            .as_mut()
            .ok_or(RenderError::MissingContext("an active pass"))
    }

    fn record_draw(&mut self, command: Command) -> RenderResult<()> {
        let Some(recording) = self.recording.as_ref() else {
            return Err(RenderError::MissingContext("an active pass"));
        };
        let pipeline_id = recording
            .pipeline
            .ok_or(RenderError::MissingContext("bound pipeline"))?;
        let pipeline = self.pipelines.get(&pipeline_id.0).ok_or(RenderError::UnknownHandle {
            kind: ResourceKind::Pipeline,
            id: pipeline_id.0,
        })?;
        let formats = self
            .framebuffers
            .get(&recording.framebuffer.0)
            .and_then(|fb| self.framebuffer_formats(fb));
        if formats.as_ref() != Some(&pipeline.attachments) {
            return Err(RenderError::AttachmentMismatch {
                label: pipeline.label.clone(),
                detail: format!(
                    "framebuffer provides {:?}, pipeline expects {:?}",
                    formats, pipeline.attachments
                ),
            });
        }
        self.recording()?.commands.push(command);
        self.draws += 1;
        Ok(())
    }

    /// Validation errors surface through an error scope instead of the
    /// device's uncaptured-error handler.
    fn build_pipeline(&self, desc: &PipelineDescriptor) -> RenderResult<GpuPipeline> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let vertex = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&desc.label),
            source: wgpu::ShaderSource::Wgsl(desc.program.vertex.as_str().into()),
        });
        let fragment = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&desc.label),
            source: wgpu::ShaderSource::Wgsl(desc.program.fragment.as_str().into()),
        });

        let bind_group_layouts: Vec<wgpu::BindGroupLayout> = desc
            .bind_groups
            .iter()
            .map(|group| {
                let entries: Vec<wgpu::BindGroupLayoutEntry> = group
                    .entries
                    .iter()
                    .enumerate()
                    .map(|(binding, ty)| wgpu::BindGroupLayoutEntry {
                        binding: binding as u32,
                        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                        ty: convert::binding_type(*ty),
                        count: None,
                    })
                    .collect();
                self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(group.label),
                    entries: &entries,
                })
            })
            .collect();
        let layout_refs: Vec<&wgpu::BindGroupLayout> = bind_group_layouts.iter().collect();
        let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&desc.label),
            bind_group_layouts: &layout_refs,
            push_constant_ranges: &[],
        });

        let attributes: Vec<[wgpu::VertexAttribute; 1]> = desc
            .vertex_attributes
            .iter()
            .enumerate()
            .map(|(location, attribute)| {
                [wgpu::VertexAttribute {
                    format: convert::vertex_format(attribute.format),
                    offset: 0,
                    shader_location: location as u32,
                }]
            })
            .collect();
        let buffers: Vec<wgpu::VertexBufferLayout> = desc
            .vertex_attributes
            .iter()
            .zip(&attributes)
            .map(|(attribute, attrs)| wgpu::VertexBufferLayout {
                array_stride: attribute.format.size(),
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: attrs,
            })
            .collect();

        let targets: Vec<Option<wgpu::ColorTargetState>> = desc
            .color_targets
            .iter()
            .map(|target| {
                Some(wgpu::ColorTargetState {
                    format: convert::texture_format(target.format),
                    blend: convert::blend_state(target.blend),
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        let depth_stencil = desc.depth.map(|depth| wgpu::DepthStencilState {
            format: convert::texture_format(depth.format),
            depth_write_enabled: depth.write,
            depth_compare: convert::compare(depth.compare),
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&desc.label),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &vertex,
                entry_point: Some("main"),
                buffers: &buffers,
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment,
                entry_point: Some("main"),
                targets: &targets,
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: convert::topology(desc.topology),
                ..Default::default()
            },
            depth_stencil,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            log::error!("pipeline '{}' failed validation: {}", desc.label, err);
            log::debug!("vertex source:\n{}", desc.program.vertex);
            log::debug!("fragment source:\n{}", desc.program.fragment);
            return Err(RenderError::Device(err.to_string()));
        }

        Ok(GpuPipeline {
            pipeline,
            bind_group_layouts,
            attachments: desc.attachment_formats(),
            label: desc.label.clone(),
        })
    }

    fn encode(&self, encoder: &mut wgpu::CommandEncoder, recording: &PassRecording) -> RenderResult<()> {
        let fb = self
            .framebuffers
            .get(&recording.framebuffer.0)
            .ok_or(RenderError::UnknownHandle {
                kind: ResourceKind::Framebuffer,
                id: recording.framebuffer.0,
            })?;

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = fb
            .color
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.and_then(|id| self.textures.get(&id.0))
                    .map(|texture| wgpu::RenderPassColorAttachment {
                        view: &texture.view,
                        depth_slice: None,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: convert::color_load(recording.load.color_op(index)),
                            store: wgpu::StoreOp::Store,
                        },
                    })
            })
            .collect();
        let depth_stencil_attachment = fb
            .depth
            .and_then(|id| self.textures.get(&id.0))
            .map(|texture| wgpu::RenderPassDepthStencilAttachment {
                view: &texture.view,
                depth_ops: Some(wgpu::Operations {
                    load: convert::depth_load(recording.load.depth),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&fb.label),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for command in &recording.commands {
            match command {
                Command::Viewport(rect) => {
                    pass.set_viewport(
                        rect.x as f32,
                        rect.y as f32,
                        rect.width as f32,
                        rect.height as f32,
                        0.0,
                        1.0,
                    );
                    pass.set_scissor_rect(rect.x, rect.y, rect.width, rect.height);
                }
                Command::Pipeline(id) => {
                    if let Some(pipeline) = self.pipelines.get(&id.0) {
                        pass.set_pipeline(&pipeline.pipeline);
                    }
                }
                Command::BindGroup { group, index } => {
                    pass.set_bind_group(*group, &recording.bind_groups[*index], &[]);
                }
                Command::VertexBuffer { slot, buffer } => {
                    if let Some(entry) = self.buffers.get(&buffer.0) {
                        pass.set_vertex_buffer(*slot, entry.buffer.slice(..));
                    }
                }
                Command::IndexBuffer(buffer) => {
                    if let Some(entry) = self.buffers.get(&buffer.0) {
                        pass.set_index_buffer(entry.buffer.slice(..), wgpu::IndexFormat::Uint32);
                    }
                }
                Command::Draw(range) => pass.draw(range.clone(), 0..1),
                Command::DrawIndexed(range) => pass.draw_indexed(range.clone(), 0, 0..1),
            }
        }
        Ok(())
    }

    fn flush(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }
}

impl Device for ExplicitDevice {
    fn backend(&self) -> BackendKind {
        BackendKind::Explicit
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
        let usage = match desc.usage {
            BufferUsage::Vertex => wgpu::BufferUsages::VERTEX,
            BufferUsage::Index => wgpu::BufferUsages::INDEX,
            BufferUsage::Uniform => wgpu::BufferUsages::UNIFORM,
        } | wgpu::BufferUsages::COPY_DST;
        // Buffer sizes must be a multiple of the copy alignment.
        let size = desc.size.max(4).div_ceil(wgpu::COPY_BUFFER_ALIGNMENT) * wgpu::COPY_BUFFER_ALIGNMENT;
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&desc.label),
            size,
            usage,
            mapped_at_creation: false,
        });
        if let Some(contents) = contents {
            let mut padded = contents[..contents.len().min(size as usize)].to_vec();
            padded.resize(padded.len().div_ceil(4) * 4, 0);
            self.queue.write_buffer(&buffer, 0, &padded);
        }
        let id = self.allocate_id();
        self.buffers.insert(
            id,
            GpuBuffer {
                buffer,
                desc: desc.clone(),
            },
        );
        Ok(BufferId(id))
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> RenderResult<()> {
        let entry = self.buffer_entry(buffer)?;
        if offset + data.len() as u64 > entry.desc.size {
            return Err(RenderError::Device(format!(
                "write of {} bytes at {} overflows buffer '{}'",
                data.len(),
                offset,
                entry.desc.label
            )));
        }
        self.queue.write_buffer(&entry.buffer, offset, data);
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        if let Some(entry) = self.buffers.remove(&buffer.0) {
            entry.buffer.destroy();
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> RenderResult<TextureId> {
        let (texture, view) = self.allocate_texture(desc)?;
        let id = self.allocate_id();
        self.textures.insert(
            id,
            GpuTexture {
                texture,
                view,
                desc: desc.clone(),
            },
        );
        self.texture_allocations += 1;
        Ok(TextureId(id))
    }

    fn resize_texture(&mut self, texture: TextureId, width: u32, height: u32) -> RenderResult<()> {
        let mut desc = self.texture_entry(texture)?.desc.clone();
        desc.width = width;
        desc.height = height;
        let (new_texture, view) = self.allocate_texture(&desc)?;
        if let Some(entry) = self.textures.get_mut(&texture.0) {
            entry.texture.destroy();
            *entry = GpuTexture {
                texture: new_texture,
                view,
                desc,
            };
        }
        self.texture_allocations += 1;
        Ok(())
    }

    fn write_texture(&mut self, texture: TextureId, data: &[u8]) -> RenderResult<()> {
        let entry = self.texture_entry(texture)?;
        let desc = &entry.desc;
        let bytes_per_row = desc.width * desc.format.bytes_per_texel();
        let expected = (bytes_per_row * desc.height) as usize;
        if data.len() != expected {
            return Err(RenderError::Device(format!(
                "texture upload of {} bytes, expected {}",
                data.len(),
                expected
            )));
        }
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &entry.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(desc.height),
            },
            wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if let Some(entry) = self.textures.remove(&texture.0) {
            entry.texture.destroy();
        }
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
        if self.bound == Some(framebuffer) {
            self.bound = None;
        }
    }

    fn create_pipeline(&mut self, desc: &PipelineDescriptor) -> RenderResult<PipelineId> {
        if desc.program.geometry.is_some() {
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
        let pipeline = self.build_pipeline(desc)?;
        let id = self.allocate_id();
        self.pipelines.insert(id, pipeline);
        log::debug!("created pipeline '{}' ({})", desc.label, desc.key);
        Ok(PipelineId(id))
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineId) {
        self.pipelines.remove(&pipeline.0);
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.bound = framebuffer;
    }

    fn bound_framebuffer(&self) -> Option<FramebufferId> {
        self.bound
    }

    fn begin_pass(&mut self, load: &PassLoad) -> RenderResult<()> {
        let framebuffer = self.bound.ok_or(RenderError::MissingContext("bound framebuffer"))?;
        if !self.framebuffers.contains_key(&framebuffer.0) {
            return Err(RenderError::UnknownHandle {
                kind: ResourceKind::Framebuffer,
                id: framebuffer.0,
            });
        }
        if self.recording.is_some() {
            return Err(RenderError::MissingContext("end_pass before the next begin_pass"));
        }
        self.recording = Some(PassRecording {
            framebuffer,
            load: load.clone(),
            pipeline: None,
            commands: Vec::new(),
            bind_groups: Vec::new(),
        });
        Ok(())
    }

    fn set_viewport(&mut self, rect: PixelRect) -> RenderResult<()> {
        let recording = self.recording.as_ref().ok_or(RenderError::MissingContext("an active pass"))?;
        let extent = self
            .framebuffers
            .get(&recording.framebuffer.0)
            .and_then(|fb| fb.color.iter().flatten().chain(fb.depth.iter()).next().copied())
            .and_then(|id| self.textures.get(&id.0))
            .map(|t| PixelRect::from_size(t.desc.width, t.desc.height))
            .ok_or(RenderError::MissingContext("framebuffer attachments"))?;
        // wgpu rejects viewports that leave the attachment.
        let Some(clipped) = rect.intersect(&extent) else {
            return Ok(());
        };
        self.recording()?.commands.push(Command::Viewport(clipped));
        Ok(())
    }

    fn set_pipeline(&mut self, pipeline: PipelineId) -> RenderResult<()> {
        if !self.pipelines.contains_key(&pipeline.0) {
            return Err(RenderError::UnknownHandle {
                kind: ResourceKind::Pipeline,
                id: pipeline.0,
            });
        }
        let recording = self.recording()?;
        recording.pipeline = Some(pipeline);
        recording.commands.push(Command::Pipeline(pipeline));
        Ok(())
    }

    fn set_bindings(&mut self, group: u32, bindings: &[Binding]) -> RenderResult<()> {
        let Some(recording) = self.recording.as_ref() else {
            return Err(RenderError::MissingContext("an active pass"));
        };
        let pipeline_id = recording
            .pipeline
            .ok_or(RenderError::MissingContext("pipeline bound before its bindings"))?;
        let pipeline = self.pipelines.get(&pipeline_id.0).ok_or(RenderError::UnknownHandle {
            kind: ResourceKind::Pipeline,
            id: pipeline_id.0,
        })?;
        let layout = pipeline
            .bind_group_layouts
            .get(group as usize)
            .ok_or(RenderError::MissingContext("bind group layout"))?;

        let mut entries = Vec::with_capacity(bindings.len());
        for (index, binding) in bindings.iter().enumerate() {
            let resource = match binding {
                Binding::Uniform(id) => self.buffer_entry(*id)?.buffer.as_entire_binding(),
                Binding::Texture(id) => wgpu::BindingResource::TextureView(&self.texture_entry(*id)?.view),
                Binding::Sampler => wgpu::BindingResource::Sampler(&self.sampler),
            };
            entries.push(wgpu::BindGroupEntry {
                binding: index as u32,
                resource,
            });
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&pipeline.label),
            layout,
            entries: &entries,
        });

        let recording = self.recording()?;
        recording.bind_groups.push(bind_group);
        let index = recording.bind_groups.len() - 1;
        recording.commands.push(Command::BindGroup { group, index });
        Ok(())
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferId) -> RenderResult<()> {
        self.buffer_entry(buffer)?;
        self.recording()?.commands.push(Command::VertexBuffer { slot, buffer });
        Ok(())
    }

    fn set_index_buffer(&mut self, buffer: BufferId) -> RenderResult<()> {
        self.buffer_entry(buffer)?;
        self.recording()?.commands.push(Command::IndexBuffer(buffer));
        Ok(())
    }

    fn draw(&mut self, vertices: Range<u32>) -> RenderResult<()> {
        self.record_draw(Command::Draw(vertices))
    }

    fn draw_indexed(&mut self, indices: Range<u32>) -> RenderResult<()> {
        self.record_draw(Command::DrawIndexed(indices))
    }

    fn end_pass(&mut self) -> RenderResult<()> {
        let recording = self
            .recording
            .take()
            .ok_or(RenderError::MissingContext("an active pass"))?;
        let mut encoder = match self.encoder.take() {
            Some(encoder) => encoder,
            None => self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            }),
        };
        let result = self.encode(&mut encoder, &recording);
        self.encoder = Some(encoder);
        result
    }

    fn submit(&mut self) -> RenderResult<()> {
        self.flush();
        self.submits += 1;
        Ok(())
    }

    fn read_pixels(&mut self, texture: TextureId, rect: PixelRect) -> RenderResult<Pixels> {
        self.flush();
        let entry = self.texture_entry(texture)?;
        let format = entry.desc.format;
        if !format.is_readable() {
            return Err(RenderError::Unsupported {
                backend: BACKEND,
                feature: "read-back of this texture format",
            });
        }
        let extent = PixelRect::from_size(entry.desc.width, entry.desc.height);
        if extent.intersect(&rect) != Some(rect) {
            return Err(RenderError::Readback(format!(
                "{:?} lies outside the {}x{} texture",
                rect, entry.desc.width, entry.desc.height
            )));
        }

        let padded = convert::padded_bytes_per_row(rect.width, format);
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: padded as u64 * rect.height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &entry.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: rect.x,
                    y: rect.y,
                    z: 0,
                },
                aspect: if format.is_depth() {
                    wgpu::TextureAspect::DepthOnly
                } else {
                    wgpu::TextureAspect::All
                },
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(rect.height),
                },
            },
            wgpu::Extent3d {
                width: rect.width,
                height: rect.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| RenderError::Readback(e.to_string()))?;
        rx.recv()
            .map_err(|_| RenderError::Readback("map callback dropped".to_string()))??;

        let row_bytes = (rect.width * format.bytes_per_texel()) as usize;
        let mut bytes = Vec::with_capacity(row_bytes * rect.height as usize);
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks(padded as usize).take(rect.height as usize) {
                bytes.extend_from_slice(&row[..row_bytes]);
            }
        }
        staging.unmap();

        let data = match format {
            TextureFormat::Rgba8Unorm => PixelData::Unorm8(bytes),
            TextureFormat::Rgba32Uint => PixelData::Uint32(
                bytes
                    .chunks_exact(4)
                    .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
            _ => PixelData::Float32(
                bytes
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
        };
        Ok(Pixels {
            width: rect.width,
            height: rect.height,
            format,
            data,
        })
    }
}
