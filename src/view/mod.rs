//! Backend view nodes mirroring the renderable tree.
//!
//! Every renderable in a [`Scene`] gets exactly one [`ViewNode`] per view.
//! The [`ViewTree`] builds the nodes lazily through a [`ViewNodeFactory`],
//! keeps their child lists in step with the scene and prunes nodes whose
//! renderable disappeared. Passes then traverse the tree once per
//! [`Operation`]; each node sees a pre phase before its children and a post
//! phase after them.
//!
//! Composite nodes (window, renderer, camera, light, prop) are the same on
//! every backend. Mapper nodes are generic over a
//! [`MapperBackend`](nodes::MapperBackend) that knows how the backend wants
//! its draw commands issued.

mod context;
mod factory;
pub mod nodes;
mod overrides;
mod tree;

pub use context::{
    Appearance, FrameContext, OpaqueTargets, PropCounts, PropFrame, RendererFrame, SyncContext,
    ViewSetup,
};
pub use factory::{NodeConstructor, ViewNodeFactory};
pub use overrides::ClassOverrides;
pub use tree::{NodeState, ViewId, ViewTree};

use crate::error::RenderResult;
use crate::resource::Device;
use crate::scene::{Entity, Scene};

/// What a traversal is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Count opaque and translucent props. Nothing is drawn.
    Query,
    /// Cameras and lights publish their state; renderers upload matrices.
    Camera,
    Opaque,
    Translucent,
    /// Draw pickable props with their ids as color.
    Select,
}

impl Operation {
    /// Whether the operation issues draws.
    pub fn draws(self) -> bool {
        matches!(self, Operation::Opaque | Operation::Translucent | Operation::Select)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Pre,
    Post,
}

/// Returned from the pre phase to decide whether children are visited.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Traversal {
    Continue,
    SkipChildren,
}

/// The backend counterpart of one renderable.
///
/// Nodes are built by a [`ViewNodeFactory`] constructor and owned by the
/// [`ViewTree`]. A node owns every GPU resource it creates and must release
/// them in [`release`](ViewNode::release); the tree calls it when the
/// renderable leaves the scene or changes class.
///
/// # Errors
///
/// Returning `Err` from [`apply`](ViewNode::apply) aborts the traversal and
/// should be reserved for lifecycle and device errors. Configuration problems
/// (no camera, unsupported pipeline) are logged and the draw skipped.
pub trait ViewNode {
    /// Name of the node type, used in logs and tests.
    fn class_name(&self) -> &'static str;

    /// The renderables to mirror as children, in traversal order.
    fn children(&self, scene: &Scene, entity: Entity) -> Vec<Entity> {
        scene.children(entity)
    }

    /// Brings GPU state up to date with the renderable.
    ///
    /// `changed` is true on the first call and whenever the renderable was
    /// modified after the previous successful synchronize.
    fn synchronize(&mut self, _ctx: &mut SyncContext<'_>, _changed: bool) -> RenderResult<()> {
        Ok(())
    }

    fn apply(&mut self, op: Operation, phase: Phase, ctx: &mut FrameContext<'_>) -> RenderResult<Traversal>;

    fn release(&mut self, _device: &mut dyn Device) {}
}
