use super::{
    AttachmentFormats, BindGroupLayoutDesc, ColorTargetState, DepthState, PipelineKey,
    PipelineLayoutDesc, Topology,
};
use crate::passes::Kernel;
use crate::shader::VertexAttribute;

/// Finalized shader source, one entry point `main` per stage.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProgramSource {
    pub vertex: String,
    pub fragment: String,
    pub geometry: Option<String>,
}

/// What a surface fragment writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SurfaceOutput {
    /// Shaded color into target 0.
    Color,
    /// Weighted color into target 0, revealage into target 1.
    OitAccumulate,
    /// Prop and composite ids into an unsigned target.
    Ids,
}

/// Surface shading switches a compiled program was generated with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceShading {
    pub lighting: bool,
    pub normals: bool,
    pub vertex_colors: bool,
    pub textured: bool,
    pub output: SurfaceOutput,
}

/// Full-screen operations over the input textures bound in group 0.
#[derive(Clone, Debug, PartialEq)]
pub enum FullscreenOp {
    Copy,
    OitResolve,
    Convolve(Kernel),
}

/// The program semantics in a form a fixed-function device can execute.
///
/// Explicit devices compile [`ProgramSource`]; the immediate device runs the
/// equivalent built-in stage described here.
#[derive(Clone, Debug, PartialEq)]
pub enum FixedFunction {
    Surface(SurfaceShading),
    /// Surface shading of ray-cast sphere imposters: each fragment of a
    /// point's quad intersects the sphere, or is discarded when it misses.
    Sphere(SurfaceShading),
    Fullscreen(FullscreenOp),
}

/// Everything a device needs to build a pipeline.
#[derive(Clone, Debug)]
pub struct PipelineDescriptor {
    pub label: String,
    pub key: PipelineKey,
    pub program: ProgramSource,
    /// One vertex buffer per attribute, slot `i` at `@location(i)`.
    pub vertex_attributes: Vec<VertexAttribute>,
    pub topology: Topology,
    pub color_targets: Vec<ColorTargetState>,
    pub depth: Option<DepthState>,
    pub bind_groups: Vec<BindGroupLayoutDesc>,
    pub fixed: FixedFunction,
}

impl PipelineDescriptor {
    pub fn attachment_formats(&self) -> AttachmentFormats {
        AttachmentFormats {
            color: self.color_targets.iter().map(|t| t.format).collect(),
            depth: self.depth.map(|d| d.format),
        }
    }

    pub fn layout(&self) -> PipelineLayoutDesc {
        PipelineLayoutDesc {
            attachments: self.attachment_formats(),
            bind_groups: self.bind_groups.clone(),
        }
    }
}
