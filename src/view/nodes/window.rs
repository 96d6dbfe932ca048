use crate::error::RenderResult;
use crate::scene::{Entity, Scene};
use crate::view::{FrameContext, Operation, Phase, Traversal, ViewNode};

/// Root of the tree. Renderers are its children.
pub struct WindowNode;

impl WindowNode {
    pub fn construct(_: Entity, _: &Scene) -> Box<dyn ViewNode> {
        Box::new(WindowNode)
    }
}

impl ViewNode for WindowNode {
    fn class_name(&self) -> &'static str {
        "RenderWindow"
    }

    fn apply(&mut self, _: Operation, _: Phase, _: &mut FrameContext<'_>) -> RenderResult<Traversal> {
        Ok(Traversal::Continue)
    }
}
