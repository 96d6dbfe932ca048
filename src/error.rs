//! Error types shared by every layer of the renderer.
//!
//! Errors fall into four categories (see [`ErrorCategory`]). Configuration
//! errors are logged and the offending operation is skipped for the frame;
//! lifecycle errors are programmer mistakes and abort the current operation;
//! device errors are returned to whoever asked the device for something.
//! Shader assembly never fails: unresolved markers are simply dropped.

use crate::resource::ResourceKind;

/// Coarse classification of a [`RenderError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing context, unsupported feature, attachment mismatch.
    Configuration,
    /// Use of a released or unknown resource.
    Lifecycle,
    /// Adapter, device or read-back failure.
    Device,
}

/// Errors produced while building or executing a frame.
#[derive(Debug)]
pub enum RenderError {
    /// A node or pass ran without the context it depends on.
    MissingContext(&'static str),
    /// The active backend cannot provide the requested feature.
    Unsupported {
        backend: &'static str,
        feature: &'static str,
    },
    /// A cached pipeline was bound to a pass whose attachments or bind-group
    /// layouts differ from the ones the pipeline was compiled for.
    AttachmentMismatch { label: String, detail: String },
    /// A render pass was configured without the delegates it needs.
    EmptyPass(&'static str),
    /// A convolution kernel is not square with an odd side.
    InvalidKernel { size: u32, weights: usize },
    /// A convolution kernel weight is NaN or infinite.
    NonFiniteKernelWeight { index: usize },
    /// A resource was used after `release()`.
    UseAfterRelease { kind: ResourceKind, label: String },
    /// A handle did not refer to a live resource on the device.
    UnknownHandle { kind: ResourceKind, id: u32 },
    /// A size of zero or beyond the device limits was requested.
    InvalidSize { width: u32, height: u32 },
    /// Adapter or device creation failed.
    Device(String),
    /// Copying pixels back from the device failed.
    Readback(String),
    /// A frame stopped before all of its passes ran. Carries the message of
    /// the error that stopped it.
    FrameAborted(String),
}

impl RenderError {
    /// Returns the category used to decide how the error is reported.
    pub fn category(&self) -> ErrorCategory {
        match self {
            RenderError::MissingContext(_)
            | RenderError::Unsupported { .. }
            | RenderError::AttachmentMismatch { .. }
            | RenderError::EmptyPass(_)
            | RenderError::InvalidKernel { .. }
            | RenderError::NonFiniteKernelWeight { .. }
            | RenderError::InvalidSize { .. } => ErrorCategory::Configuration,
            RenderError::UseAfterRelease { .. } | RenderError::UnknownHandle { .. } => {
                ErrorCategory::Lifecycle
            }
            RenderError::Device(_) | RenderError::Readback(_) | RenderError::FrameAborted(_) => {
                ErrorCategory::Device
            }
        }
    }

    /// Logs the error at the level matching its category.
    pub fn report(&self) {
        match self.category() {
            ErrorCategory::Configuration => log::error!("configuration error: {}", self),
            ErrorCategory::Lifecycle => log::error!("resource lifecycle error: {}", self),
            ErrorCategory::Device => log::error!("device error: {}", self),
        }
    }
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::MissingContext(what) => write!(f, "missing context: {}", what),
            RenderError::Unsupported { backend, feature } => {
                write!(f, "{} backend does not support {}", backend, feature)
            }
            RenderError::AttachmentMismatch { label, detail } => {
                write!(f, "pipeline '{}' is incompatible with the pass: {}", label, detail)
            }
            RenderError::EmptyPass(pass) => write!(f, "{} has no delegate passes", pass),
            RenderError::InvalidKernel { size, weights } => {
                write!(f, "a {}x{} kernel cannot take {} weights", size, size, weights)
            }
            RenderError::NonFiniteKernelWeight { index } => {
                write!(f, "kernel weight {} is not finite", index)
            }
            RenderError::UseAfterRelease { kind, label } => {
                write!(f, "{} '{}' used after release", kind, label)
            }
            RenderError::UnknownHandle { kind, id } => write!(f, "unknown {} handle {}", kind, id),
            RenderError::InvalidSize { width, height } => {
                write!(f, "invalid size {}x{}", width, height)
            }
            RenderError::Device(msg) => write!(f, "device error: {}", msg),
            RenderError::Readback(msg) => write!(f, "read-back failed: {}", msg),
            RenderError::FrameAborted(msg) => write!(f, "frame aborted: {}", msg),
        }
    }
}

impl std::error::Error for RenderError {}

impl From<wgpu::RequestAdapterError> for RenderError {
    fn from(e: wgpu::RequestAdapterError) -> Self {
        RenderError::Device(e.to_string())
    }
}

impl From<wgpu::RequestDeviceError> for RenderError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        RenderError::Device(e.to_string())
    }
}

impl From<wgpu::BufferAsyncError> for RenderError {
    fn from(e: wgpu::BufferAsyncError) -> Self {
        RenderError::Readback(e.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type RenderResult<T> = Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            RenderError::MissingContext("renderer").category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            RenderError::UseAfterRelease {
                kind: ResourceKind::Texture,
                label: "color".into()
            }
            .category(),
            ErrorCategory::Lifecycle
        );
        assert_eq!(
            RenderError::Readback("lost".into()).category(),
            ErrorCategory::Device
        );
    }

    #[test]
    fn test_display_names_the_resource() {
        let err = RenderError::UseAfterRelease {
            kind: ResourceKind::Buffer,
            label: "vertices".into(),
        };
        assert_eq!(err.to_string(), "buffer 'vertices' used after release");
    }
}
