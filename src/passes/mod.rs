//! The render pass composer.
//!
//! A [`RenderPass`] drives the view tree through one or more operations and
//! returns the color texture it produced. Passes own their targets and
//! resize them in place each frame; the returned texture id is only
//! borrowed by whoever composites it next. Compound passes hold delegates
//! and decide when to run them, so
//!
//! ```text
//! Convolution2DPass -> Convolution2DPass -> ForwardPass
//! ```
//!
//! renders the scene first and then filters it twice.

mod convolution;
mod encoder;
mod forward;
pub mod fullscreen;
mod oit;
mod opaque;
mod selection;

pub use convolution::{Convolution2DPass, Kernel};
pub use encoder::RenderEncoder;
pub use forward::ForwardPass;
pub use fullscreen::FullscreenQuad;
pub use oit::OrderIndependentTranslucentPass;
pub use opaque::OpaquePass;
pub use selection::HardwareSelectionPass;

use crate::error::RenderResult;
use crate::resource::{Device, TextureId};
use crate::view::{FrameContext, ViewTree};

pub trait RenderPass {
    /// Name recorded in the frame trace when the pass executes.
    fn name(&self) -> &str;

    /// Renders the pass and returns its output color texture, or `None`
    /// when it produced nothing this frame.
    fn traverse(&mut self, views: &mut ViewTree, ctx: &mut FrameContext<'_>) -> RenderResult<Option<TextureId>>;

    /// Releases every target the pass owns, delegates included.
    fn release(&mut self, device: &mut dyn Device);
}
