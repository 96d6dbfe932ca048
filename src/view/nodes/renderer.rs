use crate::error::{RenderError, RenderResult};
use crate::resource::{Buffer, BufferUsage, Device, PixelRect};
use crate::scene::{Entity, Light, Renderer, Scene};
use crate::shader::RendererUniforms;
use crate::view::{FrameContext, Operation, Phase, RendererFrame, SyncContext, Traversal, ViewNode};

/// Converts a normalized viewport with a bottom-left origin into pixels with
/// a top-left origin. `None` when the viewport covers no pixel.
pub(crate) fn viewport_pixels(viewport: [f32; 4], size: (u32, u32)) -> Option<PixelRect> {
    let (width, height) = (size.0 as f32, size.1 as f32);
    let [xmin, ymin, xmax, ymax] = viewport.map(|v| v.clamp(0.0, 1.0));
    let x0 = (xmin * width).round() as u32;
    let x1 = (xmax * width).round() as u32;
    let y0 = ((1.0 - ymax) * height).round() as u32;
    let y1 = ((1.0 - ymin) * height).round() as u32;
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(PixelRect::new(x0, y0, x1 - x0, y1 - y0))
}

/// Sets the viewport and renderer uniforms for its props.
///
/// During [`Operation::Camera`] the camera and light nodes below publish
/// their state; on the way back up the renderer computes its matrices and
/// uploads them. Draw operations then reuse that upload.
pub struct RendererNode {
    entity: Entity,
    renderer: Renderer,
    ubo: Option<Buffer>,
    frame: Option<RendererFrame>,
    warned_empty: bool,
}

impl RendererNode {
    pub fn construct(entity: Entity, _: &Scene) -> Box<dyn ViewNode> {
        Box::new(RendererNode {
            entity,
            renderer: Renderer::default(),
            ubo: None,
            frame: None,
            warned_empty: false,
        })
    }

    fn publish(&mut self, ctx: &mut FrameContext<'_>) -> RenderResult<()> {
        let Some(viewport) = viewport_pixels(self.renderer.viewport, ctx.size) else {
            if !self.warned_empty {
                log::warn!("renderer {:?} has an empty viewport", self.entity);
                self.warned_empty = true;
            }
            self.frame = None;
            return Ok(());
        };
        let Some(ubo) = self.ubo.as_ref() else {
            return Err(RenderError::MissingContext("renderer uniform buffer"));
        };

        let camera = ctx.view.camera.unwrap_or_default();
        let aspect = viewport.width as f32 / viewport.height as f32;
        let view = camera.view_matrix();
        let projection = camera.projection_matrix(aspect);
        let mut uniforms = RendererUniforms::new(
            view,
            projection,
            [
                viewport.x as f32,
                viewport.y as f32,
                viewport.width as f32,
                viewport.height as f32,
            ],
        );
        let mut lights = std::mem::take(&mut ctx.view.lights);
        if lights.is_empty() && self.renderer.automatic_light {
            lights.push(Light::headlight());
        }
        for light in &lights {
            if !uniforms.push_light(light.direction_vc(view), light.color * light.intensity) {
                log::debug!("renderer {:?} ignores lights beyond the first four", self.entity);
                break;
            }
        }

        ubo.write(&mut *ctx.device, 0, bytemuck::bytes_of(&uniforms))?;
        self.frame = Some(RendererFrame {
            entity: self.entity,
            viewport,
            uniforms,
            ubo: ubo.bind()?,
        });
        Ok(())
    }
}

impl ViewNode for RendererNode {
    fn class_name(&self) -> &'static str {
        "Renderer"
    }

    fn children(&self, scene: &Scene, entity: Entity) -> Vec<Entity> {
        let mut children = scene.children(entity);
        children.sort_by_key(|child| match scene.renderable(*child) {
            Some(r) if r.is_a("Camera") => 0,
            Some(r) if r.is_a("Light") => 1,
            _ => 2,
        });
        children
    }

    fn synchronize(&mut self, ctx: &mut SyncContext<'_>, changed: bool) -> RenderResult<()> {
        if self.ubo.is_none() {
            self.ubo = Some(Buffer::create(
                &mut *ctx.device,
                ctx.queue,
                "renderer uniforms",
                BufferUsage::Uniform,
                std::mem::size_of::<RendererUniforms>() as u64,
            )?);
        }
        if changed {
            if let Some(renderer) = ctx.scene.get::<Renderer>(self.entity) {
                self.renderer = *renderer;
            }
        }
        Ok(())
    }

    fn apply(&mut self, op: Operation, phase: Phase, ctx: &mut FrameContext<'_>) -> RenderResult<Traversal> {
        match (op, phase) {
            (Operation::Camera, Phase::Pre) => {
                ctx.view.camera = None;
                ctx.view.lights.clear();
            }
            (Operation::Camera, Phase::Post) => self.publish(ctx)?,
            (op, Phase::Pre) if op.draws() => {
                let Some(frame) = self.frame else {
                    return Ok(Traversal::SkipChildren);
                };
                ctx.device.set_viewport(frame.viewport)?;
                ctx.renderer = Some(frame);
            }
            (op, Phase::Post) if op.draws() => ctx.renderer = None,
            _ => {}
        }
        Ok(Traversal::Continue)
    }

    fn release(&mut self, device: &mut dyn Device) {
        if let Some(mut ubo) = self.ubo.take() {
            ubo.release(device);
        }
        self.frame = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewport_flips_to_top_left_origin() {
        let full = viewport_pixels([0.0, 0.0, 1.0, 1.0], (64, 32)).unwrap();
        assert_eq!(full, PixelRect::new(0, 0, 64, 32));
        // Lower-left quarter of the window.
        let quarter = viewport_pixels([0.0, 0.0, 0.5, 0.5], (64, 32)).unwrap();
        assert_eq!(quarter, PixelRect::new(0, 16, 32, 16));
        assert!(viewport_pixels([0.5, 0.5, 0.5, 1.0], (64, 32)).is_none());
    }
}
