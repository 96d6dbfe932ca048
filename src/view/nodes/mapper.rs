use glam::Vec2;

use super::strategy::{BlockDraw, MapperBackend, PrimitiveDraw};
use crate::error::{ErrorCategory, RenderError, RenderResult};
use crate::passes::RenderEncoder;
use crate::pipeline::{
    BindGroupLayoutDesc, BindingType, FixedFunction, PipelineCache, PipelineDescriptor, PipelineKey,
    SampleKind, SurfaceShading, Topology,
};
use crate::resource::{Binding, Buffer, BufferUsage, Device, PipelineId, ReleaseQueue, Texture, TextureFormat};
use crate::scene::{
    Entity, ImageMapper, PolyData, PolyMapper, RenderableClass, Scene, SphereMapper, VolumeMapper,
};
use crate::shader::sphere::{OFFSET_ATTRIBUTE, sphere_replacements};
use crate::shader::surface::{
    COLOR_ATTRIBUTE, NORMAL_ATTRIBUTE, POSITION_ATTRIBUTE, TCOORD_ATTRIBUTE, mapper_replacements,
    property_replacements,
};
use crate::shader::{
    MapperUniforms, SURFACE_FS, SURFACE_VS, ShaderAssembler, ShaderReplacements, ShaderTemplates,
    VertexFormat, VertexInput, VertexSemantic,
};
use crate::view::{FrameContext, Operation, Phase, PropFrame, RendererFrame, SyncContext, Traversal, ViewNode};

/// Which surface program a block is drawn with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(super) enum SurfaceProgram {
    Polygons,
    /// One imposter quad per point.
    Spheres,
}

impl SurfaceProgram {
    fn mapper_replacements(self, shading: SurfaceShading) -> ShaderReplacements {
        match self {
            SurfaceProgram::Polygons => mapper_replacements(shading),
            SurfaceProgram::Spheres => sphere_replacements(shading),
        }
    }

    fn fixed(self, shading: SurfaceShading) -> FixedFunction {
        match self {
            SurfaceProgram::Polygons => FixedFunction::Surface(shading),
            SurfaceProgram::Spheres => FixedFunction::Sphere(shading),
        }
    }
}

struct Primitive {
    topology: Topology,
    indices: Buffer,
    count: u32,
}

/// Device buffers of one block.
pub(super) struct BlockResources {
    composite: u32,
    vertex_input: VertexInput,
    /// One buffer per attribute of `vertex_input`.
    vertex_buffers: Vec<Buffer>,
    primitives: Vec<Primitive>,
    ubo: Buffer,
}

fn flatten<const N: usize>(values: impl Iterator<Item = [f32; N]>) -> Vec<f32> {
    values.flat_map(|v| v.into_iter()).collect()
}

impl BlockResources {
    /// Uploads `data`. `None` when the block has nothing to draw.
    fn upload(
        device: &mut dyn Device,
        queue: &ReleaseQueue,
        label: &str,
        composite: u32,
        data: &PolyData,
        colors: bool,
        tcoords: bool,
    ) -> RenderResult<Option<Self>> {
        if data.positions.is_empty() || data.is_empty() {
            log::debug!("{} block {} has nothing to draw", label, composite);
            return Ok(None);
        }
        let label = format!("{} block{}", label, composite);
        let mut vertex_input = VertexInput::new();
        let mut vertex_buffers = Vec::new();

        let positions = flatten(data.positions.iter().map(|p| p.to_array()));
        vertex_input.add_attribute(POSITION_ATTRIBUTE, VertexFormat::Float32x3, VertexSemantic::Position);
        vertex_buffers.push(Buffer::with_contents(
            device,
            queue,
            &format!("{} positions", label),
            BufferUsage::Vertex,
            bytemuck::cast_slice(&positions),
        )?);
        if data.has_normals() {
            let normals = flatten(data.normals.iter().map(|n| n.to_array()));
            vertex_input.add_attribute(NORMAL_ATTRIBUTE, VertexFormat::Float32x3, VertexSemantic::Normal);
            vertex_buffers.push(Buffer::with_contents(
                device,
                queue,
                &format!("{} normals", label),
                BufferUsage::Vertex,
                bytemuck::cast_slice(&normals),
            )?);
        }
        if colors && data.has_colors() {
            vertex_input.add_attribute(COLOR_ATTRIBUTE, VertexFormat::Unorm8x4, VertexSemantic::Color);
            vertex_buffers.push(Buffer::with_contents(
                device,
                queue,
                &format!("{} colors", label),
                BufferUsage::Vertex,
                bytemuck::cast_slice(&data.colors),
            )?);
        }
        if tcoords && data.has_tcoords() {
            let tcoords = flatten(data.tcoords.iter().map(|t| t.to_array()));
            vertex_input.add_attribute(TCOORD_ATTRIBUTE, VertexFormat::Float32x2, VertexSemantic::TCoord);
            vertex_buffers.push(Buffer::with_contents(
                device,
                queue,
                &format!("{} tcoords", label),
                BufferUsage::Vertex,
                bytemuck::cast_slice(&tcoords),
            )?);
        }

        let cells: [(Topology, Vec<u32>); 3] = [
            (Topology::PointList, data.verts.clone()),
            (Topology::LineList, data.lines.iter().flatten().copied().collect()),
            (Topology::TriangleList, data.triangles.iter().flatten().copied().collect()),
        ];
        let mut primitives = Vec::new();
        for (topology, indices) in cells {
            if indices.is_empty() {
                continue;
            }
            primitives.push(Primitive {
                topology,
                count: indices.len() as u32,
                indices: Buffer::with_contents(
                    device,
                    queue,
                    &format!("{} {:?} indices", label, topology),
                    BufferUsage::Index,
                    bytemuck::cast_slice(&indices),
                )?,
            });
        }

        let ubo = Buffer::create(
            device,
            queue,
            &format!("{} uniforms", label),
            BufferUsage::Uniform,
            std::mem::size_of::<MapperUniforms>() as u64,
        )?;
        Ok(Some(Self {
            composite,
            vertex_input,
            vertex_buffers,
            primitives,
            ubo,
        }))
    }

    /// Uploads four corners and two triangles per sphere. `None` without
    /// centers.
    pub(super) fn spheres(
        device: &mut dyn Device,
        queue: &ReleaseQueue,
        label: &str,
        mapper: &SphereMapper,
    ) -> RenderResult<Option<Self>> {
        if mapper.centers.is_empty() {
            log::debug!("{} has no centers to draw", label);
            return Ok(None);
        }
        const CORNERS: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];
        let label = format!("{} block0", label);
        let mut vertex_input = VertexInput::new();
        let mut vertex_buffers = Vec::new();

        let positions = flatten(
            mapper
                .centers
                .iter()
                .flat_map(|c| std::iter::repeat_n(c.to_array(), CORNERS.len())),
        );
        let offsets = flatten((0..mapper.centers.len()).flat_map(|i| {
            let radius = mapper.radius_of(i);
            CORNERS.map(|[x, y]| [x, y, radius])
        }));
        vertex_input.add_attribute(POSITION_ATTRIBUTE, VertexFormat::Float32x3, VertexSemantic::Position);
        vertex_input.add_attribute(OFFSET_ATTRIBUTE, VertexFormat::Float32x3, VertexSemantic::Offset);
        for (name, data) in [("positions", &positions), ("offsets", &offsets)] {
            vertex_buffers.push(Buffer::with_contents(
                device,
                queue,
                &format!("{} {}", label, name),
                BufferUsage::Vertex,
                bytemuck::cast_slice(data),
            )?);
        }
        if mapper.scalar_visibility && mapper.has_colors() {
            let colors: Vec<[u8; 4]> = mapper
                .colors
                .iter()
                .flat_map(|c| std::iter::repeat_n(*c, CORNERS.len()))
                .collect();
            vertex_input.add_attribute(COLOR_ATTRIBUTE, VertexFormat::Unorm8x4, VertexSemantic::Color);
            vertex_buffers.push(Buffer::with_contents(
                device,
                queue,
                &format!("{} colors", label),
                BufferUsage::Vertex,
                bytemuck::cast_slice(&colors),
            )?);
        }

        let indices: Vec<u32> = (0..mapper.centers.len() as u32)
            .flat_map(|i| [0, 1, 2, 0, 2, 3].map(|corner| i * 4 + corner))
            .collect();
        let primitives = vec![Primitive {
            topology: Topology::TriangleList,
            count: indices.len() as u32,
            indices: Buffer::with_contents(
                device,
                queue,
                &format!("{} imposter indices", label),
                BufferUsage::Index,
                bytemuck::cast_slice(&indices),
            )?,
        }];
        let ubo = Buffer::create(
            device,
            queue,
            &format!("{} uniforms", label),
            BufferUsage::Uniform,
            std::mem::size_of::<MapperUniforms>() as u64,
        )?;
        Ok(Some(Self {
            composite: 0,
            vertex_input,
            vertex_buffers,
            primitives,
            ubo,
        }))
    }

    fn has(&self, semantic: VertexSemantic) -> bool {
        self.vertex_input.has(semantic)
    }

    pub(super) fn release(&mut self, device: &mut dyn Device) {
        for buffer in &mut self.vertex_buffers {
            buffer.release(device);
        }
        for primitive in &mut self.primitives {
            primitive.indices.release(device);
        }
        self.ubo.release(device);
    }
}

/// Per-draw inputs shared by every block of a mapper.
struct DrawInputs<'a> {
    class: RenderableClass,
    renderer: RendererFrame,
    prop: PropFrame,
    encoder: &'a RenderEncoder,
    user_sets: Vec<&'a ShaderReplacements>,
    scalar_visibility: bool,
    program: SurfaceProgram,
}

/// Leaf node drawing polygonal blocks, image slices and volume boxes.
///
/// Every block owns its buffers and its own mapper uniform block, so blocks
/// drawn in one pass never share uniform storage. Pipelines come from the
/// frame's [`PipelineCache`], keyed by the mapper class, the active override
/// identities and the shading state.
pub struct MapperNode<B: MapperBackend> {
    entity: Entity,
    class: RenderableClass,
    blocks: Vec<BlockResources>,
    image: Option<Texture>,
    scalar_visibility: bool,
    backend: B,
}

impl<B: MapperBackend> MapperNode<B> {
    pub fn construct(entity: Entity, scene: &Scene) -> Box<dyn ViewNode> {
        let class = scene
            .renderable(entity)
            .map_or(RenderableClass::POLY_DATA_MAPPER, |r| r.class);
        Box::new(MapperNode {
            entity,
            class,
            blocks: Vec::new(),
            image: None,
            scalar_visibility: true,
            backend: B::default(),
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn release_blocks(&mut self, device: &mut dyn Device) {
        for mut block in self.blocks.drain(..) {
            block.release(device);
        }
    }

    fn upload(&mut self, ctx: &mut SyncContext<'_>) -> RenderResult<()> {
        self.release_blocks(&mut *ctx.device);
        let scene = ctx.scene;
        let label = self.class.class_name();

        if let Some(mapper) = scene.get::<PolyMapper>(self.entity) {
            self.scalar_visibility = mapper.scalar_visibility;
            for (index, data) in mapper.blocks.iter().enumerate() {
                let block = BlockResources::upload(
                    &mut *ctx.device,
                    ctx.queue,
                    label,
                    index as u32,
                    data,
                    mapper.scalar_visibility,
                    false,
                )?;
                self.blocks.extend(block);
            }
        } else if let Some(mapper) = scene.get::<ImageMapper>(self.entity) {
            let image = &mapper.image;
            let extent = Vec2::new(
                image.width as f32 * mapper.spacing[0],
                image.height as f32 * mapper.spacing[1],
            );
            let min = mapper.origin.truncate();
            let quad = PolyData::quad(min, min + extent, mapper.origin.z);
            let block = BlockResources::upload(&mut *ctx.device, ctx.queue, label, 0, &quad, false, true)?;
            self.blocks.extend(block);

            let reuse = self
                .image
                .as_ref()
                .is_some_and(|t| !t.is_released() && t.size() == (image.width, image.height));
            if !reuse {
                if let Some(mut old) = self.image.take() {
                    old.release(&mut *ctx.device);
                }
                self.image = Some(Texture::create(
                    &mut *ctx.device,
                    ctx.queue,
                    &format!("{} image", label),
                    image.width,
                    image.height,
                    TextureFormat::Rgba8Unorm,
                )?);
            }
            if let Some(texture) = self.image.as_ref() {
                texture.write(&mut *ctx.device, &image.pixels)?;
            }
        } else if let Some(mapper) = scene.get::<VolumeMapper>(self.entity) {
            let (min, max) = mapper.bounds;
            let cuboid = PolyData::cuboid(min, max);
            let block = BlockResources::upload(&mut *ctx.device, ctx.queue, label, 0, &cuboid, false, false)?;
            self.blocks.extend(block);
        } else {
            log::warn!("{} {:?} carries no mapper input", label, self.entity);
        }
        Ok(())
    }

    fn draw(&mut self, ctx: &mut FrameContext<'_>) -> RenderResult<()> {
        let image = self.image.as_ref();
        draw_blocks(
            &mut self.backend,
            ctx,
            self.entity,
            self.class,
            &self.blocks,
            image,
            self.scalar_visibility,
            SurfaceProgram::Polygons,
        )
    }
}

/// Draws every block of one mapper with the frame's encoder.
#[allow(clippy::too_many_arguments)]
pub(super) fn draw_blocks<B: MapperBackend>(
    backend: &mut B,
    ctx: &mut FrameContext<'_>,
    entity: Entity,
    class: RenderableClass,
    blocks: &[BlockResources],
    image: Option<&Texture>,
    scalar_visibility: bool,
    program: SurfaceProgram,
) -> RenderResult<()> {
    let (Some(renderer), Some(prop)) = (ctx.renderer, ctx.prop) else {
        log::debug!("{:?} drawn outside a renderer and prop, skipped", entity);
        return Ok(());
    };
    let Some(encoder) = ctx.encoder.as_ref() else {
        RenderError::MissingContext("render encoder").report();
        return Ok(());
    };
    let overrides = ctx.overrides;
    let inputs = DrawInputs {
        class,
        renderer,
        prop,
        encoder,
        user_sets: overrides.sets_for(&[class, prop.class]),
        scalar_visibility,
        program,
    };
    let image = image.map(Texture::bind).transpose()?;

    for block in blocks {
        let textured = image.is_some() && block.has(VertexSemantic::TCoord);
        let shading = SurfaceShading {
            lighting: prop.appearance.lighting,
            normals: program == SurfaceProgram::Spheres || block.has(VertexSemantic::Normal),
            vertex_colors: inputs.scalar_visibility && block.has(VertexSemantic::Color),
            textured,
            output: encoder.output(),
        };
        block
            .ubo
            .write(&mut *ctx.device, 0, bytemuck::bytes_of(&mapper_uniforms(&inputs, block.composite)))?;

        let layouts = bind_group_layouts(textured);
        let mut primitives = Vec::with_capacity(block.primitives.len());
        for primitive in &block.primitives {
            match pipeline_for(&mut *ctx.device, ctx.cache, &inputs, block, shading, primitive.topology, &layouts) {
                Ok(pipeline) => primitives.push(PrimitiveDraw {
                    pipeline,
                    index_buffer: primitive.indices.bind()?,
                    count: primitive.count,
                }),
                Err(err) if err.category() == ErrorCategory::Configuration => err.report(),
                Err(err) => return Err(err),
            }
        }
        if primitives.is_empty() {
            continue;
        }

        let mut groups = vec![
            (0, vec![Binding::Uniform(renderer.ubo)]),
            (1, vec![Binding::Uniform(block.ubo.bind()?)]),
        ];
        if let (true, Some(image)) = (textured, image) {
            groups.push((2, vec![Binding::Texture(image), Binding::Sampler]));
        }
        let vertex_buffers = block
            .vertex_buffers
            .iter()
            .map(Buffer::bind)
            .collect::<RenderResult<Vec<_>>>()?;
        backend.draw_block(
            &mut *ctx.device,
            &BlockDraw {
                groups: &groups,
                vertex_buffers: &vertex_buffers,
                primitives: &primitives,
            },
        )?;
    }
    Ok(())
}

fn mapper_uniforms(inputs: &DrawInputs<'_>, composite: u32) -> MapperUniforms {
    let appearance = inputs.prop.appearance;
    let model = inputs.prop.model;
    let model_view = inputs.renderer.view_matrix() * model;
    MapperUniforms {
        mcwc: model.to_cols_array_2d(),
        normal_matrix: model_view.inverse().transpose().to_cols_array_2d(),
        ambient_color: appearance.ambient_color.extend(1.0).to_array(),
        diffuse_color: appearance.diffuse_color.extend(1.0).to_array(),
        coefficients: [appearance.ambient, appearance.diffuse, appearance.opacity, 0.0],
        ids: [inputs.prop.prop_id + 1, composite, 0, 0],
    }
}

fn bind_group_layouts(textured: bool) -> Vec<BindGroupLayoutDesc> {
    let mut layouts = vec![
        BindGroupLayoutDesc::uniform("renderer"),
        BindGroupLayoutDesc::uniform("mapper"),
    ];
    if textured {
        layouts.push(BindGroupLayoutDesc::new(
            "image",
            vec![BindingType::Texture(SampleKind::Float), BindingType::Sampler],
        ));
    }
    layouts
}

/// Looks the pipeline up in the cache, assembling and compiling it on a miss.
fn pipeline_for(
    device: &mut dyn Device,
    cache: &mut PipelineCache,
    inputs: &DrawInputs<'_>,
    block: &BlockResources,
    shading: SurfaceShading,
    topology: Topology,
    layouts: &[BindGroupLayoutDesc],
) -> RenderResult<PipelineId> {
    let encoder = inputs.encoder;
    let templates = ShaderTemplates::new(SURFACE_VS, SURFACE_FS);
    let override_ids = ShaderAssembler::override_ids(&templates, &inputs.user_sets);
    let mut builder = PipelineKey::builder(inputs.class.class_name())
        .overrides(&override_ids)
        .tag(encoder.name())
        .flag("lighting", shading.lighting)
        .flag("normals", shading.normals)
        .flag("vertex_colors", shading.vertex_colors)
        .flag("textured", shading.textured)
        .state(&inputs.program)
        .state(&shading.output)
        .topology(topology)
        .depth(encoder.depth());
    for target in encoder.targets() {
        builder = builder.format(target.format).blend(target.blend);
    }
    let key = builder.finish();

    if let Some(cached) = cache.get(&key) {
        let pipeline = cached.bind()?;
        cache.check(&key, &encoder.attachment_formats(), layouts)?;
        return Ok(pipeline);
    }

    let mapper_set = inputs.program.mapper_replacements(shading);
    let property_set = property_replacements(shading.lighting);
    let mut assembler = ShaderAssembler::new(key.clone(), templates, &block.vertex_input)
        .with(&mapper_set)
        .with(&property_set)
        .with(encoder.replacements());
    for set in &inputs.user_sets {
        assembler = assembler.with(set);
    }
    let program = assembler.assemble();
    log::trace!(
        "assembled {} program for {} with overrides {:?}",
        encoder.name(),
        inputs.class.class_name(),
        override_ids
    );

    let desc = PipelineDescriptor {
        label: format!("{} {}", inputs.class.class_name(), encoder.name()),
        key,
        program: program.finalize(),
        vertex_attributes: block.vertex_input.attributes().to_vec(),
        topology,
        color_targets: encoder.targets().to_vec(),
        depth: encoder.depth(),
        bind_groups: layouts.to_vec(),
        fixed: inputs.program.fixed(shading),
    };
    cache.create(device, inputs.class.class_name(), &desc)?.bind()
}

impl<B: MapperBackend> ViewNode for MapperNode<B> {
    fn class_name(&self) -> &'static str {
        B::NAME
    }

    fn synchronize(&mut self, ctx: &mut SyncContext<'_>, changed: bool) -> RenderResult<()> {
        if changed {
            self.upload(ctx)?;
        }
        Ok(())
    }

    fn apply(&mut self, op: Operation, phase: Phase, ctx: &mut FrameContext<'_>) -> RenderResult<Traversal> {
        if phase == Phase::Pre && op.draws() {
            self.draw(ctx)?;
        }
        Ok(Traversal::SkipChildren)
    }

    fn release(&mut self, device: &mut dyn Device) {
        self.release_blocks(device);
        if let Some(mut image) = self.image.take() {
            image.release(device);
        }
    }
}
