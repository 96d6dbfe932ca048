use super::{RenderEncoder, RenderPass};
use crate::error::RenderResult;
use crate::resource::{Device, Framebuffer, PassLoad, TextureFormat, TextureId};
use crate::view::{FrameContext, OpaqueTargets, Operation, ViewTree};

/// Draws opaque props into its own color and depth targets.
pub struct OpaquePass {
    framebuffer: Option<Framebuffer>,
}

impl OpaquePass {
    pub fn new() -> Self {
        Self { framebuffer: None }
    }

    /// The targets of the last frame.
    pub fn targets(&self) -> Option<OpaqueTargets> {
        let fb = self.framebuffer.as_ref()?;
        Some(OpaqueTargets {
            color: fb.color_texture(0)?,
            depth: fb.depth_texture()?,
        })
    }

    fn prepare(&mut self, ctx: &mut FrameContext<'_>) -> RenderResult<&mut Framebuffer> {
        let (width, height) = ctx.size;
        let fb = match self.framebuffer.take() {
            Some(mut fb) => {
                fb.resize(&mut *ctx.device, width, height)?;
                fb
            }
            None => {
                let mut fb = Framebuffer::create(&mut *ctx.device, ctx.queue, "OpaquePass", width, height)?;
                fb.create_color(&mut *ctx.device, 0, TextureFormat::Rgba8Unorm)?;
                fb.create_depth(&mut *ctx.device, TextureFormat::Depth32Float)?;
                fb
            }
        };
        Ok(self.framebuffer.insert(fb))
    }
}

impl Default for OpaquePass {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPass for OpaquePass {
    fn name(&self) -> &str {
        "OpaquePass"
    }

    fn traverse(&mut self, views: &mut ViewTree, ctx: &mut FrameContext<'_>) -> RenderResult<Option<TextureId>> {
        ctx.record("OpaquePass");
        let background = ctx.background;
        let fb = self.prepare(ctx)?;
        fb.bind(&mut *ctx.device)?;
        ctx.device.begin_pass(&PassLoad::clear(&[background], 1.0))?;
        ctx.encoder = Some(RenderEncoder::color());
        let result = views.traverse(Operation::Opaque, ctx);
        ctx.encoder = None;
        ctx.device.end_pass()?;
        result?;

        ctx.opaque_targets = self.targets();
        Ok(ctx.opaque_targets.map(|t| t.color))
    }

    fn release(&mut self, device: &mut dyn Device) {
        if let Some(mut fb) = self.framebuffer.take() {
            fb.release(device);
        }
    }
}
