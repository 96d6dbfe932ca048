use fxhash::FxHashMap;

use super::ViewNode;
use super::nodes::{
    CameraNode, ExplicitMapper, ImmediateMapper, LightNode, MapperBackend, MapperNode, PropNode,
    RendererNode, SphereMapperNode, WindowNode,
};
use crate::backend::BackendKind;
use crate::scene::{Entity, RenderableClass, Scene};

/// Builds the node for one renderable.
pub type NodeConstructor = fn(Entity, &Scene) -> Box<dyn ViewNode>;

/// Maps renderable classes to view node constructors.
///
/// Resolution walks the renderable's class chain from the most derived class
/// outwards, first through the override table and then through the
/// registered constructors. Overrides let an application pair a subclassed
/// renderable, or a whole family, with its own node type.
#[derive(Clone, Default)]
pub struct ViewNodeFactory {
    constructors: FxHashMap<&'static str, NodeConstructor>,
    overrides: FxHashMap<&'static str, NodeConstructor>,
}

impl ViewNodeFactory {
    /// An empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in nodes, with mappers issuing draws the way `backend` expects.
    pub fn for_backend(backend: BackendKind) -> Self {
        let mut factory = Self::new();
        factory.register("RenderWindow", WindowNode::construct);
        factory.register("Renderer", RendererNode::construct);
        factory.register("Camera", CameraNode::construct);
        factory.register("Light", LightNode::construct);
        factory.register("Prop", PropNode::construct);
        match backend {
            BackendKind::Immediate => factory.register_mappers::<ImmediateMapper>(),
            BackendKind::Explicit => factory.register_mappers::<ExplicitMapper>(),
        }
        factory
    }

    fn register_mappers<B: MapperBackend>(&mut self) {
        self.register("Mapper", MapperNode::<B>::construct);
        self.register("SphereMapper", SphereMapperNode::<B>::construct);
    }

    /// Registers the constructor for `class`, replacing any previous one.
    pub fn register(&mut self, class: &'static str, constructor: NodeConstructor) {
        self.constructors.insert(class, constructor);
    }

    /// Registers an override for `class`. Overrides are consulted before
    /// every regular constructor.
    pub fn register_override(&mut self, class: &'static str, constructor: NodeConstructor) {
        self.overrides.insert(class, constructor);
    }

    pub fn remove_override(&mut self, class: &str) -> bool {
        self.overrides.remove(class).is_some()
    }

    pub fn resolve(&self, class: RenderableClass) -> Option<NodeConstructor> {
        let chain = class.chain();
        chain
            .iter()
            .find_map(|name| self.overrides.get(name))
            .or_else(|| chain.iter().find_map(|name| self.constructors.get(name)))
            .copied()
    }

    pub fn create(&self, class: RenderableClass, entity: Entity, scene: &Scene) -> Option<Box<dyn ViewNode>> {
        self.resolve(class).map(|constructor| constructor(entity, scene))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderResult;
    use crate::view::{FrameContext, Operation, Phase, Traversal};

    struct Outline;

    impl ViewNode for Outline {
        fn class_name(&self) -> &'static str {
            "Outline"
        }

        fn apply(&mut self, _: Operation, _: Phase, _: &mut FrameContext<'_>) -> RenderResult<Traversal> {
            Ok(Traversal::Continue)
        }
    }

    fn outline(_: Entity, _: &Scene) -> Box<dyn ViewNode> {
        Box::new(Outline)
    }

    const OUTLINED_ACTOR: RenderableClass = RenderableClass::new(&["OutlinedActor", "Actor", "Prop"]);

    #[test]
    fn test_resolves_most_derived_registered_class() {
        let scene = Scene::new();
        let factory = ViewNodeFactory::for_backend(BackendKind::Immediate);
        let node = factory.create(RenderableClass::ACTOR, scene.root(), &scene).unwrap();
        assert_eq!(node.class_name(), "Prop");
        let node = factory.create(RenderableClass::POLY_DATA_MAPPER, scene.root(), &scene).unwrap();
        assert_eq!(node.class_name(), "ImmediateMapper");
        assert!(factory.resolve(RenderableClass::new(&["Widget"])).is_none());
    }

    #[test]
    fn test_override_pairs_subclass_with_custom_node() {
        let scene = Scene::new();
        let mut factory = ViewNodeFactory::for_backend(BackendKind::Explicit);
        factory.register_override("OutlinedActor", outline);
        let node = factory.create(OUTLINED_ACTOR, scene.root(), &scene).unwrap();
        assert_eq!(node.class_name(), "Outline");
        // Plain actors keep the built-in node.
        let node = factory.create(RenderableClass::ACTOR, scene.root(), &scene).unwrap();
        assert_eq!(node.class_name(), "Prop");

        assert!(factory.remove_override("OutlinedActor"));
        let node = factory.create(OUTLINED_ACTOR, scene.root(), &scene).unwrap();
        assert_eq!(node.class_name(), "Prop");
    }
}
