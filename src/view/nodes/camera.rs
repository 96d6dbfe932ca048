use crate::error::RenderResult;
use crate::scene::{Camera, Entity, Light, Scene};
use crate::view::{FrameContext, Operation, Phase, Traversal, ViewNode};

/// Publishes its camera to the enclosing renderer. The first camera wins.
pub struct CameraNode {
    entity: Entity,
}

impl CameraNode {
    pub fn construct(entity: Entity, _: &Scene) -> Box<dyn ViewNode> {
        Box::new(CameraNode { entity })
    }
}

impl ViewNode for CameraNode {
    fn class_name(&self) -> &'static str {
        "Camera"
    }

    fn apply(&mut self, op: Operation, phase: Phase, ctx: &mut FrameContext<'_>) -> RenderResult<Traversal> {
        if op == Operation::Camera && phase == Phase::Pre && ctx.view.camera.is_none() {
            ctx.view.camera = ctx.scene.get::<Camera>(self.entity).map(|camera| *camera);
        }
        Ok(Traversal::SkipChildren)
    }
}

/// Publishes its light, when switched on, to the enclosing renderer.
pub struct LightNode {
    entity: Entity,
}

impl LightNode {
    pub fn construct(entity: Entity, _: &Scene) -> Box<dyn ViewNode> {
        Box::new(LightNode { entity })
    }
}

impl ViewNode for LightNode {
    fn class_name(&self) -> &'static str {
        "Light"
    }

    fn apply(&mut self, op: Operation, phase: Phase, ctx: &mut FrameContext<'_>) -> RenderResult<Traversal> {
        if op == Operation::Camera && phase == Phase::Pre {
            if let Some(light) = ctx.scene.get::<Light>(self.entity) {
                if light.switch {
                    ctx.view.lights.push(*light);
                }
            }
        }
        Ok(Traversal::SkipChildren)
    }
}
