//! Textual shader assembly.
//!
//! Programs start from WGSL templates containing `//TANDEM::Group::Kind`
//! markers. Mappers, properties, render passes and user overrides each
//! contribute replacement text for one or more marker groups; the
//! [`ShaderAssembler`] runs them in a fixed order and produces a
//! [`ProgramDescription`] whose stages finalize to complete source. The same
//! description records the stage inputs and outputs so the `IOStructs`
//! markers can be generated once everybody else is done.
//!
//! # Example
//!
//! ```ignore
//! let mut user = ShaderReplacements::new();
//! user.register_override("Normal::Impl", "halve-diffuse", |ctx| {
//!     ctx.fragment().substitute("Normal::Impl", &["diffuseColor *= 0.5;"], true);
//! });
//! ```

mod assembler;
mod description;
mod replacement;
pub mod sphere;
pub mod surface;
mod template;
mod templates;
mod uniforms;
mod vertex_input;

pub use assembler::{ShaderAssembler, ShaderTemplates};
pub use description::{BuiltinVariable, IoVariable, ShaderDescription, ShaderStage};
pub use replacement::{
    Contributor, ProgramDescription, ReplacementContext, ReplacementFn, ShaderOverride,
    ShaderReplacements,
};
pub use template::{MARKER_PREFIX, Marker, ShaderCode, Substitution, substitute};
pub use templates::{QUAD_FS, QUAD_VS, SURFACE_FS, SURFACE_VS};
pub use uniforms::{
    LightUniform, MAPPER_UBO_WGSL, MAX_LIGHTS, MapperUniforms, RENDERER_UBO_WGSL, RendererUniforms,
};
pub use vertex_input::{VertexAttribute, VertexFormat, VertexInput, VertexSemantic};
