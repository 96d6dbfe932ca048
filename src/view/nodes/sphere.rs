use super::mapper::{BlockResources, SurfaceProgram, draw_blocks};
use super::strategy::MapperBackend;
use crate::error::RenderResult;
use crate::resource::Device;
use crate::scene::{Entity, RenderableClass, Scene, SphereMapper};
use crate::view::{FrameContext, Operation, Phase, SyncContext, Traversal, ViewNode};

/// Leaf node drawing a [`SphereMapper`] as imposters.
///
/// Each center becomes one quad, so a sphere costs four vertices however
/// large it is on screen. The fragment stage clips the quad to the sphere's
/// silhouette and writes the true surface depth, so imposters intersect
/// regular geometry correctly.
pub struct SphereMapperNode<B: MapperBackend> {
    entity: Entity,
    class: RenderableClass,
    block: Option<BlockResources>,
    scalar_visibility: bool,
    backend: B,
}

impl<B: MapperBackend> SphereMapperNode<B> {
    pub fn construct(entity: Entity, scene: &Scene) -> Box<dyn ViewNode> {
        let class = scene
            .renderable(entity)
            .map_or(RenderableClass::SPHERE_MAPPER, |r| r.class);
        Box::new(SphereMapperNode {
            entity,
            class,
            block: None,
            scalar_visibility: true,
            backend: B::default(),
        })
    }

    fn release_block(&mut self, device: &mut dyn Device) {
        if let Some(mut block) = self.block.take() {
            block.release(device);
        }
    }

    fn upload(&mut self, ctx: &mut SyncContext<'_>) -> RenderResult<()> {
        self.release_block(&mut *ctx.device);
        let Some(mapper) = ctx.scene.get::<SphereMapper>(self.entity) else {
            log::warn!("{} {:?} carries no sphere input", self.class.class_name(), self.entity);
            return Ok(());
        };
        self.scalar_visibility = mapper.scalar_visibility;
        self.block = BlockResources::spheres(&mut *ctx.device, ctx.queue, self.class.class_name(), &mapper)?;
        Ok(())
    }
}

impl<B: MapperBackend> ViewNode for SphereMapperNode<B> {
    fn class_name(&self) -> &'static str {
        "SphereMapper"
    }

    fn synchronize(&mut self, ctx: &mut SyncContext<'_>, changed: bool) -> RenderResult<()> {
        if changed {
            self.upload(ctx)?;
        }
        Ok(())
    }

    fn apply(&mut self, op: Operation, phase: Phase, ctx: &mut FrameContext<'_>) -> RenderResult<Traversal> {
        if phase == Phase::Pre && op.draws() {
            draw_blocks(
                &mut self.backend,
                ctx,
                self.entity,
                self.class,
                self.block.as_slice(),
                None,
                self.scalar_visibility,
                SurfaceProgram::Spheres,
            )?;
        }
        Ok(Traversal::SkipChildren)
    }

    fn release(&mut self, device: &mut dyn Device) {
        self.release_block(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ImmediateDevice;
    use crate::resource::ReleaseQueue;
    use crate::scene::{Prop, Property, Renderer};
    use crate::testing;
    use crate::view::ViewNodeFactory;
    use crate::view::nodes::ImmediateMapper;
    use crate::{BackendKind, HardwareSelector};
    use glam::Vec3;

    fn sphere_scene(colors: bool) -> (Scene, Entity) {
        let mut scene = Scene::new();
        let renderer = scene.add_renderer(Renderer::default());
        scene.add_camera(renderer, testing::ortho_camera()).unwrap();
        let mut mapper = SphereMapper::new(vec![Vec3::ZERO], 0.5);
        if colors {
            mapper = mapper.colors(vec![[0, 0, 255, 255]]);
        }
        let property = Property::default().color(Vec3::new(1.0, 0.0, 0.0)).unlit();
        let actor = scene
            .add_spheres(renderer, mapper, property, Prop::default())
            .unwrap();
        (scene, actor)
    }

    fn is_red(pixel: Option<[u8; 4]>) -> bool {
        pixel.is_some_and(|p| p[0] > 200 && p[1] < 50 && p[2] < 50)
    }

    #[test]
    fn test_factory_resolves_sphere_mappers() {
        let (scene, actor) = sphere_scene(false);
        let mapper = scene.mapper_of(actor).unwrap();
        let factory = ViewNodeFactory::for_backend(BackendKind::Immediate);
        let node = factory.create(RenderableClass::SPHERE_MAPPER, mapper, &scene).unwrap();
        assert_eq!(node.class_name(), "SphereMapper");
    }

    #[test]
    fn test_sphere_block_uploads_and_releases_its_buffers() {
        let (scene, actor) = sphere_scene(true);
        let mapper = scene.mapper_of(actor).unwrap();
        let mut device = ImmediateDevice::new();
        let queue = ReleaseQueue::new();
        let mut node = SphereMapperNode::<ImmediateMapper>::construct(mapper, &scene);
        let mut ctx = SyncContext {
            device: &mut device,
            scene: &scene,
            queue: &queue,
            next_prop_id: 0,
        };
        node.synchronize(&mut ctx, true).unwrap();
        // positions, offsets, colors, indices, uniforms
        assert_eq!(device.stats().buffers, 5);
        node.release(&mut device);
        assert_eq!(device.stats().buffers, 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_sphere_covers_its_disc_only() {
        let (scene, _) = sphere_scene(false);
        let mut window = testing::window(32, 32);
        let capture = window.capture_next_frame();
        window.render(&scene).unwrap();
        let frame = pollster::block_on(capture).unwrap();

        let covered = (0..32)
            .flat_map(|y| (0..32).map(move |x| (x, y)))
            .filter(|&(x, y)| is_red(frame.pixel(x, y)))
            .count();
        // A radius of 0.5 spans 8 pixels on a 32 pixel, 2 unit tall view.
        let disc = std::f32::consts::PI * 8.0 * 8.0;
        assert!((covered as f32 - disc).abs() < 15.0, "covered {}", covered);
        assert!(is_red(frame.pixel(16, 16)));
        // Corners of the quad lie outside the silhouette.
        assert!(!is_red(frame.pixel(9, 9)));
        assert!(!is_red(frame.pixel(22, 22)));
    }

    #[test]
    fn test_sphere_writes_its_surface_depth() {
        let (scene, actor) = sphere_scene(false);
        let mut window = testing::window(32, 32);
        window.render(&scene).unwrap();

        let mut selector = HardwareSelector::new();
        let hit = selector.pick(&mut window, &scene, 16, 16, 0).unwrap().unwrap();
        assert_eq!(hit.prop, actor);
        // The front of the sphere sits 4.5 units from the eye, clipped to 1..10.
        let expected = (4.5 - 1.0) / 9.0;
        assert!((hit.depth - expected).abs() < 0.01, "depth {}", hit.depth);

        // Near the rim the surface falls back towards the center plane.
        let rim = selector.pick(&mut window, &scene, 16, 23, 0).unwrap().unwrap();
        assert!(rim.depth > hit.depth);
        assert!(rim.depth < 4.0 / 9.0 + 0.01);
    }

    #[test]
    fn test_sphere_program_is_cached_with_the_imposter_stage() {
        let (scene, _) = sphere_scene(true);
        let mut window = testing::window(32, 32);
        window.render(&scene).unwrap();
        let (_, cached) = window
            .pipeline_cache()
            .iter()
            .find(|(_, cached)| cached.class_name() == "SphereMapper")
            .unwrap();
        let program = cached.program();
        assert!(program.fragment.contains("discard"));
        assert!(program.fragment.contains("@builtin(frag_depth)"));
        assert!(program.vertex.contains("offsetMC"));
    }

    #[test]
    fn test_sphere_imposter_on_the_explicit_device() {
        let Some(mut window) = testing::explicit_window(32, 32) else {
            return;
        };
        let (scene, _) = sphere_scene(false);
        let capture = window.capture_next_frame();
        window.render(&scene).unwrap();
        let frame = pollster::block_on(capture).unwrap();
        assert!(is_red(frame.pixel(16, 16)));
        assert!(!is_red(frame.pixel(9, 9)));
    }
}
