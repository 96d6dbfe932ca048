use super::fullscreen::FullscreenQuad;
use super::{RenderEncoder, RenderPass};
use crate::error::{RenderError, RenderResult};
use crate::pipeline::{AttachmentFormats, BlendMode, ColorTargetState, FullscreenOp};
use crate::resource::{Attachment, Device, Framebuffer, LoadOp, PassLoad, TextureFormat, TextureId};
use crate::view::{FrameContext, Operation, ViewTree};

/// Weighted blended order-independent translucency.
///
/// Translucent props accumulate into an `Rgba16Float` color target and an
/// `R16Float` revealage target, depth-tested against the opaque pass's depth
/// buffer. A full-screen resolve then blends the result over the opaque
/// color in place. Both steps borrow the opaque targets and never resize or
/// release them.
pub struct OrderIndependentTranslucentPass {
    accumulation: Option<Framebuffer>,
    composite: Option<Framebuffer>,
    resolve: FullscreenQuad,
    reported: bool,
}

const ACCUM_FORMAT: TextureFormat = TextureFormat::Rgba16Float;
const REVEAL_FORMAT: TextureFormat = TextureFormat::R16Float;

impl OrderIndependentTranslucentPass {
    pub fn new() -> Self {
        Self {
            accumulation: None,
            composite: None,
            resolve: FullscreenQuad::new(
                FullscreenOp::OitResolve,
                ColorTargetState::new(TextureFormat::Rgba8Unorm, BlendMode::Alpha),
            ),
            reported: false,
        }
    }

    /// Accumulation and revealage textures of the last frame.
    pub fn accumulation_textures(&self) -> Option<(TextureId, TextureId)> {
        let fb = self.accumulation.as_ref()?;
        Some((fb.color_texture(0)?, fb.color_texture(1)?))
    }

    fn accumulation_target(&mut self, ctx: &mut FrameContext<'_>, depth: TextureId) -> RenderResult<&mut Framebuffer> {
        let (width, height) = ctx.size;
        let mut fb = match self.accumulation.take() {
            Some(mut fb) => {
                fb.resize(&mut *ctx.device, width, height)?;
                fb
            }
            None => {
                let mut fb = Framebuffer::create(&mut *ctx.device, ctx.queue, "TranslucentPass", width, height)?;
                fb.create_color(&mut *ctx.device, 0, ACCUM_FORMAT)?;
                fb.create_color(&mut *ctx.device, 1, REVEAL_FORMAT)?;
                fb
            }
        };
        fb.borrow_depth(&mut *ctx.device, depth);
        Ok(self.accumulation.insert(fb))
    }

    fn composite_target(&mut self, ctx: &mut FrameContext<'_>, color: TextureId) -> RenderResult<&mut Framebuffer> {
        let (width, height) = ctx.size;
        let mut fb = match self.composite.take() {
            Some(mut fb) => {
                fb.resize(&mut *ctx.device, width, height)?;
                fb
            }
            None => Framebuffer::create(&mut *ctx.device, ctx.queue, "TranslucentComposite", width, height)?,
        };
        if fb.color_texture(0) != Some(color) {
            fb.attach_color(&mut *ctx.device, 0, Attachment::Borrowed(color));
        }
        Ok(self.composite.insert(fb))
    }
}

impl Default for OrderIndependentTranslucentPass {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPass for OrderIndependentTranslucentPass {
    fn name(&self) -> &str {
        "OrderIndependentTranslucentPass"
    }

    fn traverse(&mut self, views: &mut ViewTree, ctx: &mut FrameContext<'_>) -> RenderResult<Option<TextureId>> {
        if !ctx.device.capabilities().supports_attachments(2) {
            if !self.reported {
                RenderError::Unsupported {
                    backend: ctx.device.backend().name(),
                    feature: "multiple render targets for translucency",
                }
                .report();
                self.reported = true;
            }
            return Ok(None);
        }
        let Some(opaque) = ctx.opaque_targets else {
            RenderError::MissingContext("opaque targets for translucency").report();
            return Ok(None);
        };
        ctx.record("OrderIndependentTranslucentPass");

        let fb = self.accumulation_target(ctx, opaque.depth)?;
        fb.bind(&mut *ctx.device)?;
        // Depth comes from the opaque pass.
        ctx.device.begin_pass(&PassLoad {
            color: vec![LoadOp::Clear([0.0; 4]), LoadOp::Clear([1.0, 0.0, 0.0, 0.0])],
            depth: LoadOp::Load,
        })?;
        ctx.encoder = Some(RenderEncoder::oit_accumulate());
        let result = views.traverse(Operation::Translucent, ctx);
        ctx.encoder = None;
        ctx.device.end_pass()?;
        result?;

        let Some((accum, reveal)) = self.accumulation_textures() else {
            return Err(RenderError::MissingContext("translucent accumulation targets"));
        };
        let fb = self.composite_target(ctx, opaque.color)?;
        fb.bind(&mut *ctx.device)?;
        ctx.device.begin_pass(&PassLoad::load())?;
        let formats = AttachmentFormats {
            color: vec![TextureFormat::Rgba8Unorm],
            depth: None,
        };
        let drawn = self
            .resolve
            .draw(&mut *ctx.device, ctx.cache, &formats, &[accum, reveal]);
        ctx.device.end_pass()?;
        drawn?;
        Ok(Some(opaque.color))
    }

    fn release(&mut self, device: &mut dyn Device) {
        for mut fb in [self.accumulation.take(), self.composite.take()].into_iter().flatten() {
            fb.release(device);
        }
    }
}
