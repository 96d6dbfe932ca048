use crate::error::RenderResult;
use crate::scene::{Entity, Prop, RenderableClass, Scene};
use crate::view::{Appearance, FrameContext, Operation, Phase, PropFrame, SyncContext, Traversal, ViewNode};

/// Actors, volumes and image slices.
///
/// Decides per operation whether its mapper draws: invisible props never do,
/// opaque and translucent props draw in their own operation, and only
/// pickable props draw for selection.
pub struct PropNode {
    entity: Entity,
    class: RenderableClass,
    prop_id: Option<u32>,
}

impl PropNode {
    pub fn construct(entity: Entity, scene: &Scene) -> Box<dyn ViewNode> {
        let class = scene
            .renderable(entity)
            .map_or(RenderableClass::ACTOR, |r| r.class);
        Box::new(PropNode {
            entity,
            class,
            prop_id: None,
        })
    }
}

impl ViewNode for PropNode {
    fn class_name(&self) -> &'static str {
        "Prop"
    }

    fn synchronize(&mut self, ctx: &mut SyncContext<'_>, _changed: bool) -> RenderResult<()> {
        if self.prop_id.is_none() {
            self.prop_id = Some(ctx.allocate_prop_id());
        }
        Ok(())
    }

    fn apply(&mut self, op: Operation, phase: Phase, ctx: &mut FrameContext<'_>) -> RenderResult<Traversal> {
        if phase == Phase::Post {
            if op.draws() {
                ctx.prop = None;
            }
            return Ok(Traversal::Continue);
        }

        let Some(prop) = ctx.scene.get::<Prop>(self.entity).map(|p| *p) else {
            return Ok(Traversal::SkipChildren);
        };
        let Some(prop_id) = self.prop_id else {
            return Ok(Traversal::SkipChildren);
        };
        if !prop.visible {
            return Ok(Traversal::SkipChildren);
        }
        let appearance = Appearance::of(ctx.scene, self.entity);
        let draws = match op {
            Operation::Query => {
                if appearance.is_translucent() {
                    ctx.counts.translucent += 1;
                } else {
                    ctx.counts.opaque += 1;
                }
                false
            }
            Operation::Camera => false,
            Operation::Opaque => !appearance.is_translucent(),
            Operation::Translucent => appearance.is_translucent(),
            Operation::Select => prop.pickable,
        };
        if !draws {
            return Ok(Traversal::SkipChildren);
        }
        if op == Operation::Select {
            ctx.pickables.insert(prop_id, self.entity);
        }
        ctx.prop = Some(PropFrame {
            entity: self.entity,
            class: self.class,
            prop_id,
            model: prop.transform.matrix(),
            appearance,
        });
        Ok(Traversal::Continue)
    }
}
