use super::{OpaquePass, OrderIndependentTranslucentPass, RenderPass};
use crate::error::RenderResult;
use crate::resource::{Device, TextureId};
use crate::view::{FrameContext, Operation, PropCounts, ViewTree};

/// The standard scene pass.
///
/// Counts props, lets cameras and lights publish, draws the opaque props and
/// then, only when translucent props are visible, composites them over the
/// opaque result using the opaque depth buffer.
pub struct ForwardPass {
    opaque: OpaquePass,
    translucent: OrderIndependentTranslucentPass,
}

impl ForwardPass {
    pub fn new() -> Self {
        Self {
            opaque: OpaquePass::new(),
            translucent: OrderIndependentTranslucentPass::new(),
        }
    }

    pub fn opaque(&self) -> &OpaquePass {
        &self.opaque
    }

    pub fn translucent(&self) -> &OrderIndependentTranslucentPass {
        &self.translucent
    }
}

impl Default for ForwardPass {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPass for ForwardPass {
    fn name(&self) -> &str {
        "ForwardPass"
    }

    fn traverse(&mut self, views: &mut ViewTree, ctx: &mut FrameContext<'_>) -> RenderResult<Option<TextureId>> {
        ctx.record("ForwardPass");
        ctx.counts = PropCounts::default();
        views.traverse(Operation::Query, ctx)?;
        views.traverse(Operation::Camera, ctx)?;
        log::trace!(
            "forward pass: {} opaque, {} translucent",
            ctx.counts.opaque,
            ctx.counts.translucent
        );

        let color = self.opaque.traverse(views, ctx)?;
        if ctx.counts.translucent > 0 {
            self.translucent.traverse(views, ctx)?;
        }
        Ok(color)
    }

    fn release(&mut self, device: &mut dyn Device) {
        self.opaque.release(device);
        self.translucent.release(device);
    }
}
