//! GPU resource handles, descriptors and explicit-lifetime wrappers.
//!
//! Every GPU object is created through the object-safe [`Device`] trait and
//! referenced by a typed id. The wrappers in this module ([`Buffer`],
//! [`Texture`], [`Framebuffer`], [`Pipeline`]) own exactly one id each:
//!
//! - `create` allocates the device object
//! - `bind` returns the live id, or [`RenderError::UseAfterRelease`] once released
//! - `resize` is a no-op when the size is unchanged and otherwise reallocates
//!   storage under the same id
//! - `release` destroys the device object; calling it twice is harmless
//!
//! Dropping a wrapper that was never released hands its id to the shared
//! [`ReleaseQueue`], which the render window drains into the device.
//!
//! [`RenderError::UseAfterRelease`]: crate::RenderError::UseAfterRelease

mod buffer;
mod device;
mod format;
mod framebuffer;
mod handle;
mod pipeline;
mod release;
mod texture;

pub use buffer::Buffer;
pub use device::{
    Binding, BufferDesc, BufferUsage, Device, DeviceStats, FramebufferDesc, LoadOp, PassLoad,
    PixelData, PixelRect, Pixels, TextureDesc,
};
pub use format::TextureFormat;
pub use framebuffer::{Attachment, Framebuffer};
pub use handle::{BufferId, FramebufferId, PipelineId, TextureId};
pub use pipeline::Pipeline;
pub use release::{ReleaseQueue, Retired};
pub use texture::Texture;

/// The kind of GPU object a handle refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    Texture,
    Framebuffer,
    Pipeline,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResourceKind::Buffer => "buffer",
            ResourceKind::Texture => "texture",
            ResourceKind::Framebuffer => "framebuffer",
            ResourceKind::Pipeline => "pipeline",
        };
        f.write_str(name)
    }
}

/// Builds the error returned by `bind()` on a released wrapper and logs it.
pub(crate) fn released(kind: ResourceKind, label: &str) -> crate::RenderError {
    let err = crate::RenderError::UseAfterRelease {
        kind,
        label: label.to_string(),
    };
    err.report();
    err
}
