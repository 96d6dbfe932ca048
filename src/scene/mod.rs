//! The renderable tree.
//!
//! A [`Scene`] stores renderables as `hecs` entities linked by [`Node`]
//! components. The root entity stands for the render window; renderers are its
//! children and own cameras, lights and props, and each prop owns its mapper.
//!
//! Every entity carries a [`RenderableClass`] and a [`Modified`] timestamp.
//! Mutating a component through [`Scene::modify`] bumps the timestamp so the
//! view tree knows which nodes to resynchronize; adding or removing a child
//! bumps the parent.
//!
//! # Example
//!
//! ```
//! use tandem::scene::{Camera, PolyData, PolyMapper, Prop, Property, Renderer, Scene};
//! use glam::{Vec2, Vec3};
//!
//! let mut scene = Scene::new();
//! let renderer = scene.add_renderer(Renderer::default());
//! scene.add_camera(renderer, Camera::new().at(Vec3::new(0.0, 0.0, 4.0)));
//! let quad = PolyData::quad(Vec2::splat(-1.0), Vec2::splat(1.0), 0.0);
//! let actor = scene
//!     .add_actor(renderer, PolyMapper::new(quad), Property::default(), Prop::default())
//!     .unwrap();
//! scene.modify::<Property, _>(actor, |p| p.opacity = 0.5);
//! ```

mod class;
mod components;
mod data;
mod mtime;

pub use class::RenderableClass;
pub use components::{
    Camera, ImageMapper, ImageProperty, Light, Node, PolyMapper, Prop, Property, Renderer,
    SphereMapper, Transform, VolumeMapper, VolumeProperty,
};
pub use data::{ImageData, PolyData};
pub use hecs::Entity;
pub use mtime::{MTime, Modified};

use hecs::{Component, DynamicBundle, World};

/// Class and modification time of one entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Renderable {
    pub entity: Entity,
    pub class: RenderableClass,
    pub mtime: MTime,
}

impl Renderable {
    pub fn class_name(&self) -> &'static str {
        self.class.class_name()
    }

    pub fn is_a(&self, class: &str) -> bool {
        self.class.is_a(class)
    }

    pub fn mtime(&self) -> MTime {
        self.mtime
    }
}

pub struct Scene {
    world: World,
    root: Entity,
}

impl Scene {
    pub fn new() -> Self {
        let mut world = World::new();
        let root = world.spawn((RenderableClass::RENDER_WINDOW, Node::default(), Modified::now()));
        Self { world, root }
    }

    /// The entity standing for the render window.
    pub fn root(&self) -> Entity {
        self.root
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.world.contains(entity)
    }

    /// Spawns `components` as a child of `parent` with the given class.
    ///
    /// Returns `None` if `parent` is not in the scene.
    pub fn spawn_child(
        &mut self,
        parent: Entity,
        class: RenderableClass,
        components: impl DynamicBundle,
    ) -> Option<Entity> {
        if !self.world.contains(parent) {
            return None;
        }
        let entity = self.world.spawn(components);
        let node = Node {
            parent: Some(parent),
            children: Vec::new(),
        };
        self.world.insert(entity, (class, node, Modified::now())).ok()?;
        self.world.get::<&mut Node>(parent).ok()?.children.push(entity);
        self.touch(parent);
        Some(entity)
    }

    pub fn add_renderer(&mut self, renderer: Renderer) -> Entity {
        let entity = self.world.spawn((
            renderer,
            RenderableClass::RENDERER,
            Node {
                parent: Some(self.root),
                children: Vec::new(),
            },
            Modified::now(),
        ));
        if let Ok(mut node) = self.world.get::<&mut Node>(self.root) {
            node.children.push(entity);
        }
        self.touch(self.root);
        entity
    }

    pub fn add_camera(&mut self, renderer: Entity, camera: Camera) -> Option<Entity> {
        self.spawn_child(renderer, RenderableClass::CAMERA, (camera,))
    }

    pub fn add_light(&mut self, renderer: Entity, light: Light) -> Option<Entity> {
        self.spawn_child(renderer, RenderableClass::LIGHT, (light,))
    }

    pub fn add_actor(
        &mut self,
        renderer: Entity,
        mapper: PolyMapper,
        property: Property,
        prop: Prop,
    ) -> Option<Entity> {
        let actor = self.spawn_child(renderer, RenderableClass::ACTOR, (prop, property))?;
        self.spawn_child(actor, RenderableClass::POLY_DATA_MAPPER, (mapper,))?;
        Some(actor)
    }

    /// An actor whose mapper draws `mapper`'s points as spheres.
    pub fn add_spheres(
        &mut self,
        renderer: Entity,
        mapper: SphereMapper,
        property: Property,
        prop: Prop,
    ) -> Option<Entity> {
        let actor = self.spawn_child(renderer, RenderableClass::ACTOR, (prop, property))?;
        self.spawn_child(actor, RenderableClass::SPHERE_MAPPER, (mapper,))?;
        Some(actor)
    }

    pub fn add_volume(
        &mut self,
        renderer: Entity,
        mapper: VolumeMapper,
        property: VolumeProperty,
        prop: Prop,
    ) -> Option<Entity> {
        let volume = self.spawn_child(renderer, RenderableClass::VOLUME, (prop, property))?;
        self.spawn_child(volume, RenderableClass::VOLUME_MAPPER, (mapper,))?;
        Some(volume)
    }

    pub fn add_image_slice(
        &mut self,
        renderer: Entity,
        mapper: ImageMapper,
        property: ImageProperty,
        prop: Prop,
    ) -> Option<Entity> {
        let slice = self.spawn_child(renderer, RenderableClass::IMAGE_SLICE, (prop, property))?;
        self.spawn_child(slice, RenderableClass::IMAGE_MAPPER, (mapper,))?;
        Some(slice)
    }

    /// Removes `entity` and its subtree. The root cannot be removed.
    pub fn remove(&mut self, entity: Entity) -> bool {
        if entity == self.root || !self.world.contains(entity) {
            return false;
        }
        let parent = self.parent(entity);
        let mut pending = vec![entity];
        while let Some(next) = pending.pop() {
            pending.extend(self.children(next));
            let _ = self.world.despawn(next);
        }
        if let Some(parent) = parent {
            if let Ok(mut node) = self.world.get::<&mut Node>(parent) {
                node.children.retain(|c| *c != entity);
            }
            self.touch(parent);
        }
        true
    }

    pub fn children(&self, entity: Entity) -> Vec<Entity> {
        self.world
            .get::<&Node>(entity)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    pub fn parent(&self, entity: Entity) -> Option<Entity> {
        self.world.get::<&Node>(entity).ok().and_then(|node| node.parent)
    }

    pub fn renderable(&self, entity: Entity) -> Option<Renderable> {
        let class = *self.world.get::<&RenderableClass>(entity).ok()?;
        let Modified(mtime) = *self.world.get::<&Modified>(entity).ok()?;
        Some(Renderable {
            entity,
            class,
            mtime,
        })
    }

    pub fn get<T: Component>(&self, entity: Entity) -> Option<hecs::Ref<'_, T>> {
        self.world.get::<&T>(entity).ok()
    }

    /// Mutates one component and bumps the entity's modification time.
    pub fn modify<T: Component, R>(&mut self, entity: Entity, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let result = {
            let mut component = self.world.get::<&mut T>(entity).ok()?;
            f(&mut *component)
        };
        self.touch(entity);
        Some(result)
    }

    /// Changes the class of an entity, so a different view node is built for it.
    pub fn set_class(&mut self, entity: Entity, class: RenderableClass) -> bool {
        self.modify::<RenderableClass, _>(entity, |c| *c = class).is_some()
    }

    /// Bumps the modification time of `entity`.
    pub fn touch(&mut self, entity: Entity) {
        if let Ok(mut modified) = self.world.get::<&mut Modified>(entity) {
            *modified = Modified::now();
        }
    }

    /// The mapper child of a prop.
    pub fn mapper_of(&self, prop: Entity) -> Option<Entity> {
        self.children(prop)
            .into_iter()
            .find(|child| self.renderable(*child).is_some_and(|r| r.is_a("Mapper")))
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn scene_with_actor() -> (Scene, Entity, Entity) {
        let mut scene = Scene::new();
        let renderer = scene.add_renderer(Renderer::default());
        let data = PolyData::new(vec![Vec3::ZERO]).with_verts(vec![0]);
        let actor = scene
            .add_actor(renderer, PolyMapper::new(data), Property::default(), Prop::default())
            .unwrap();
        (scene, renderer, actor)
    }

    #[test]
    fn test_tree_links() {
        let (scene, renderer, actor) = scene_with_actor();
        assert_eq!(scene.children(scene.root()), vec![renderer]);
        assert_eq!(scene.parent(actor), Some(renderer));
        let mapper = scene.mapper_of(actor).unwrap();
        assert!(scene.renderable(mapper).unwrap().is_a("Mapper"));
        assert_eq!(scene.renderable(actor).unwrap().class_name(), "Actor");
    }

    #[test]
    fn test_modify_bumps_mtime() {
        let (mut scene, _, actor) = scene_with_actor();
        let before = scene.renderable(actor).unwrap().mtime();
        scene.modify::<Property, _>(actor, |p| p.opacity = 0.5).unwrap();
        assert!(scene.renderable(actor).unwrap().mtime() > before);
        assert_eq!(scene.get::<Property>(actor).unwrap().opacity, 0.5);
        assert!(scene.modify::<Camera, _>(actor, |_| ()).is_none());
    }

    #[test]
    fn test_remove_drops_subtree_and_touches_parent() {
        let (mut scene, renderer, actor) = scene_with_actor();
        let mapper = scene.mapper_of(actor).unwrap();
        let before = scene.renderable(renderer).unwrap().mtime();
        assert!(scene.remove(actor));
        assert!(!scene.contains(actor));
        assert!(!scene.contains(mapper));
        assert!(scene.children(renderer).is_empty());
        assert!(scene.renderable(renderer).unwrap().mtime() > before);
        assert!(!scene.remove(scene.root()));
    }

    #[test]
    fn test_spawn_under_missing_parent() {
        let (mut scene, _, actor) = scene_with_actor();
        scene.remove(actor);
        assert!(scene.add_light(actor, Light::default()).is_none());
    }
}
