use std::sync::atomic::{AtomicU32, Ordering};

use fxhash::{FxHashMap, FxHashSet};

use super::{FrameContext, Operation, Phase, SyncContext, Traversal, ViewNode, ViewNodeFactory};
use crate::error::RenderResult;
use crate::resource::{Device, ReleaseQueue};
use crate::scene::{Entity, MTime, RenderableClass, Scene};

static NEXT_VIEW: AtomicU32 = AtomicU32::new(1);

/// Identity of one output view (one render window).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ViewId(u32);

impl ViewId {
    pub fn next() -> ViewId {
        ViewId(NEXT_VIEW.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Lifecycle of a view node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    Unbuilt,
    Synchronized,
    Rendered,
}

struct ViewSlot {
    // Taken out while the node runs so children can be visited through `&mut self`.
    node: Option<Box<dyn ViewNode>>,
    class: RenderableClass,
    children: Vec<Entity>,
    state: NodeState,
    synced_at: MTime,
}

/// The view nodes of one view, keyed by renderable.
pub struct ViewTree {
    view: ViewId,
    slots: FxHashMap<Entity, ViewSlot>,
    root: Option<Entity>,
    next_prop_id: u32,
    unknown: FxHashSet<&'static str>,
}

impl ViewTree {
    pub fn new(view: ViewId) -> Self {
        Self {
            view,
            slots: FxHashMap::default(),
            root: None,
            next_prop_id: 0,
            unknown: FxHashSet::default(),
        }
    }

    pub fn view(&self) -> ViewId {
        self.view
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.slots.contains_key(&entity)
    }

    pub fn state(&self, entity: Entity) -> Option<NodeState> {
        self.slots.get(&entity).map(|slot| slot.state)
    }

    /// Name of the node built for `entity`.
    pub fn node_class(&self, entity: Entity) -> Option<&'static str> {
        self.slots
            .get(&entity)
            .and_then(|slot| slot.node.as_ref())
            .map(|node| node.class_name())
    }

    pub fn children(&self, entity: Entity) -> &[Entity] {
        self.slots
            .get(&entity)
            .map(|slot| slot.children.as_slice())
            .unwrap_or(&[])
    }

    /// Entities that currently have a node.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.slots.keys().copied()
    }

    /// Matches the tree to `scene`: builds nodes for new renderables, rebuilds
    /// those whose class changed, synchronizes every node and prunes nodes
    /// whose renderable is gone.
    ///
    /// A node that fails to synchronize is logged and retried next time.
    pub fn synchronize(
        &mut self,
        factory: &ViewNodeFactory,
        device: &mut dyn Device,
        scene: &Scene,
        queue: &ReleaseQueue,
    ) {
        let mut ctx = SyncContext {
            device,
            scene,
            queue,
            next_prop_id: self.next_prop_id,
        };
        let mut visited = FxHashSet::default();
        let root = scene.root();
        self.root = self.sync_node(factory, &mut ctx, root, &mut visited).then_some(root);
        self.next_prop_id = ctx.next_prop_id;

        let stale: Vec<Entity> = self
            .slots
            .keys()
            .filter(|entity| !visited.contains(*entity))
            .copied()
            .collect();
        for entity in stale {
            if let Some(slot) = self.slots.remove(&entity) {
                log::trace!("pruning view node for {:?}", entity);
                release_slot(slot, &mut *ctx.device);
            }
        }
    }

    fn sync_node(
        &mut self,
        factory: &ViewNodeFactory,
        ctx: &mut SyncContext<'_>,
        entity: Entity,
        visited: &mut FxHashSet<Entity>,
    ) -> bool {
        let Some(renderable) = ctx.scene.renderable(entity) else {
            return false;
        };
        let rebuild = self
            .slots
            .get(&entity)
            .is_none_or(|slot| slot.class != renderable.class);
        if rebuild {
            if let Some(old) = self.slots.remove(&entity) {
                release_slot(old, &mut *ctx.device);
            }
            let Some(node) = factory.create(renderable.class, entity, ctx.scene) else {
                if self.unknown.insert(renderable.class_name()) {
                    log::warn!("no view node for class '{}'; skipping its subtree", renderable.class_name());
                }
                return false;
            };
            self.slots.insert(
                entity,
                ViewSlot {
                    node: Some(node),
                    class: renderable.class,
                    children: Vec::new(),
                    state: NodeState::Unbuilt,
                    synced_at: MTime::ZERO,
                },
            );
        }
        visited.insert(entity);

        let Some(slot) = self.slots.get_mut(&entity) else {
            return false;
        };
        let Some(mut node) = slot.node.take() else {
            return false;
        };
        let changed = renderable.mtime > slot.synced_at || slot.state == NodeState::Unbuilt;
        let result = node.synchronize(ctx, changed);
        let children = node.children(ctx.scene, entity);
        if let Some(slot) = self.slots.get_mut(&entity) {
            slot.node = Some(node);
            match result {
                Ok(()) => {
                    slot.synced_at = renderable.mtime;
                    slot.state = NodeState::Synchronized;
                }
                Err(err) => err.report(),
            }
        }

        let kept: Vec<Entity> = children
            .into_iter()
            .filter(|child| self.sync_node(factory, ctx, *child, visited))
            .collect();
        if let Some(slot) = self.slots.get_mut(&entity) {
            slot.children = kept;
        }
        true
    }

    /// Visits every node in tree order for `op`.
    pub fn traverse(&mut self, op: Operation, ctx: &mut FrameContext<'_>) -> RenderResult<()> {
        match self.root {
            Some(root) => self.visit(root, op, ctx),
            None => Ok(()),
        }
    }

    fn visit(&mut self, entity: Entity, op: Operation, ctx: &mut FrameContext<'_>) -> RenderResult<()> {
        let Some(slot) = self.slots.get_mut(&entity) else {
            return Ok(());
        };
        let Some(mut node) = slot.node.take() else {
            return Ok(());
        };
        let children = slot.children.clone();
        let result = self.visit_node(node.as_mut(), &children, op, ctx);
        if let Some(slot) = self.slots.get_mut(&entity) {
            slot.node = Some(node);
            if result.is_ok() && slot.state != NodeState::Unbuilt {
                slot.state = NodeState::Rendered;
            }
        }
        result
    }

    fn visit_node(
        &mut self,
        node: &mut dyn ViewNode,
        children: &[Entity],
        op: Operation,
        ctx: &mut FrameContext<'_>,
    ) -> RenderResult<()> {
        if node.apply(op, Phase::Pre, ctx)? == Traversal::Continue {
            for child in children {
                self.visit(*child, op, ctx)?;
            }
        }
        node.apply(op, Phase::Post, ctx)?;
        Ok(())
    }

    /// Releases every node. The tree can be synchronized again afterwards.
    pub fn release(&mut self, device: &mut dyn Device) {
        for (_, slot) in self.slots.drain() {
            release_slot(slot, device);
        }
        self.root = None;
    }
}

fn release_slot(mut slot: ViewSlot, device: &mut dyn Device) {
    if let Some(mut node) = slot.node.take() {
        node.release(device);
    }
    slot.state = NodeState::Unbuilt;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendKind, ImmediateDevice};
    use crate::scene::{Light, PolyData, PolyMapper, Prop, Property, Renderer};
    use crate::view::nodes::WindowNode;
    use glam::{Vec2, Vec3};

    struct Fixture {
        device: ImmediateDevice,
        queue: ReleaseQueue,
        factory: ViewNodeFactory,
        tree: ViewTree,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                device: ImmediateDevice::new(),
                queue: ReleaseQueue::new(),
                factory: ViewNodeFactory::for_backend(BackendKind::Immediate),
                tree: ViewTree::new(ViewId::next()),
            }
        }

        fn sync(&mut self, scene: &Scene) {
            self.tree.synchronize(&self.factory, &mut self.device, scene, &self.queue);
        }
    }

    fn every_entity(scene: &Scene) -> Vec<Entity> {
        let mut out = Vec::new();
        let mut pending = vec![scene.root()];
        while let Some(entity) = pending.pop() {
            out.push(entity);
            pending.extend(scene.children(entity));
        }
        out
    }

    fn quad() -> PolyMapper {
        PolyMapper::new(PolyData::quad(Vec2::splat(-1.0), Vec2::splat(1.0), 0.0))
    }

    #[test]
    fn test_one_node_per_renderable_and_removal_prunes() {
        let mut scene = Scene::new();
        let renderer = scene.add_renderer(Renderer::default());
        scene.add_light(renderer, Light::directional(Vec3::NEG_Z)).unwrap();
        let a = scene
            .add_actor(renderer, quad(), Property::default(), Prop::default())
            .unwrap();
        let b = scene
            .add_actor(renderer, quad(), Property::default(), Prop::default())
            .unwrap();
        let mut fixture = Fixture::new();
        fixture.sync(&scene);

        let entities = every_entity(&scene);
        assert_eq!(fixture.tree.len(), entities.len());
        assert!(entities.iter().all(|e| fixture.tree.contains(*e)));
        assert!(entities
            .iter()
            .all(|e| fixture.tree.state(*e) == Some(NodeState::Synchronized)));

        // A second synchronize builds nothing new.
        fixture.sync(&scene);
        assert_eq!(fixture.tree.len(), entities.len());

        let mapper = scene.mapper_of(a).unwrap();
        let buffers_before = fixture.device.stats().buffers;
        scene.remove(a);
        fixture.sync(&scene);
        assert!(!fixture.tree.contains(a));
        assert!(!fixture.tree.contains(mapper));
        assert!(fixture.tree.contains(b));
        assert_eq!(fixture.tree.len(), every_entity(&scene).len());
        assert!(fixture.device.stats().buffers < buffers_before);
    }

    #[test]
    fn test_renderer_children_put_cameras_and_lights_first() {
        let mut scene = Scene::new();
        let renderer = scene.add_renderer(Renderer::default());
        let actor = scene
            .add_actor(renderer, quad(), Property::default(), Prop::default())
            .unwrap();
        let light = scene.add_light(renderer, Light::headlight()).unwrap();
        let mut fixture = Fixture::new();
        fixture.sync(&scene);
        assert_eq!(fixture.tree.children(renderer), &[light, actor]);
    }

    #[test]
    fn test_unknown_class_skips_subtree() {
        let mut scene = Scene::new();
        let renderer = scene.add_renderer(Renderer::default());
        let widget = scene
            .spawn_child(renderer, RenderableClass::new(&["Widget"]), (Prop::default(),))
            .unwrap();
        let inner = scene.add_light(widget, Light::headlight()).unwrap();
        let mut fixture = Fixture::new();
        fixture.sync(&scene);
        assert!(fixture.tree.contains(renderer));
        assert!(!fixture.tree.contains(widget));
        assert!(!fixture.tree.contains(inner));
        assert!(fixture.tree.children(renderer).is_empty());
    }

    #[test]
    fn test_class_change_rebuilds_node() {
        const PLAIN: RenderableClass = RenderableClass::new(&["Plain"]);
        let mut scene = Scene::new();
        let renderer = scene.add_renderer(Renderer::default());
        let light = scene.add_light(renderer, Light::headlight()).unwrap();
        let mut fixture = Fixture::new();
        fixture.sync(&scene);
        assert_eq!(fixture.tree.node_class(light), Some("Light"));

        fixture.factory.register("Plain", WindowNode::construct);
        scene.set_class(light, PLAIN);
        fixture.sync(&scene);
        assert_eq!(fixture.tree.node_class(light), Some("RenderWindow"));
    }

    #[test]
    fn test_release_unbuilds_everything() {
        let mut scene = Scene::new();
        let renderer = scene.add_renderer(Renderer::default());
        scene
            .add_actor(renderer, quad(), Property::default(), Prop::default())
            .unwrap();
        let mut fixture = Fixture::new();
        fixture.sync(&scene);
        assert!(fixture.device.stats().buffers > 0);
        fixture.tree.release(&mut fixture.device);
        assert!(fixture.tree.is_empty());
        assert_eq!(fixture.device.stats().buffers, 0);
    }
}
