//! Pipeline keys, descriptors and the pipeline cache.
//!
//! A pipeline is keyed by a hash of the renderable class name, the identities
//! of the active shader overrides and the backend state a draw needs (target
//! formats, blend and depth state, primitive topology, shading switches).
//! Shader-equivalent configurations share one cache entry.

mod cache;
mod descriptor;
mod key;
mod layout;
mod state;

pub use cache::{CacheStats, CachedPipeline, PipelineCache};
pub use descriptor::{
    FixedFunction, FullscreenOp, PipelineDescriptor, ProgramSource, SurfaceOutput, SurfaceShading,
};
pub use key::{PipelineKey, PipelineKeyBuilder};
pub use layout::{AttachmentFormats, BindGroupLayoutDesc, BindingType, PipelineLayoutDesc, SampleKind};
pub use state::{BlendMode, ColorTargetState, CompareFunction, DepthState, Topology};
