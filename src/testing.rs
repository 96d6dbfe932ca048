//! Small scenes and windows shared by tests.

use glam::{Vec2, Vec3};

use crate::backend::BackendKind;
use crate::config::EngineConfig;
use crate::pipeline::ProgramSource;
use crate::logging::LoggingConfig;
use crate::scene::{Camera, Entity, PolyData, PolyMapper, Prop, Property, Renderer, Scene};
use crate::window::RenderWindow;

/// An immediate-device window that logs through the test harness.
pub(crate) fn window(width: u32, height: u32) -> RenderWindow {
    let config = EngineConfig::new()
        .label("test")
        .size(width, height)
        .logging(LoggingConfig::new().for_tests());
    RenderWindow::new(config).expect("immediate device")
}

/// A window on the `wgpu` device, or `None` when the host has no adapter.
pub(crate) fn explicit_window(width: u32, height: u32) -> Option<RenderWindow> {
    let config = EngineConfig::new()
        .backend(BackendKind::Explicit)
        .label("test")
        .size(width, height)
        .logging(LoggingConfig::new().for_tests());
    match RenderWindow::new(config) {
        Ok(window) => Some(window),
        Err(err) => {
            log::warn!("no explicit device, skipping: {}", err);
            None
        }
    }
}

/// Looks down -z at the origin, showing `[-1, 1]` on both axes.
pub(crate) fn ortho_camera() -> Camera {
    Camera::new()
        .at(Vec3::new(0.0, 0.0, 5.0))
        .looking_at(Vec3::ZERO)
        .clipping_range(1.0, 10.0)
        .parallel(1.0)
}

/// One renderer with `viewport`, one unlit quad spanning `min..max` at z = 0.
pub(crate) fn scene_with_quad(
    viewport: [f32; 4],
    min: Vec2,
    max: Vec2,
    color: Vec3,
    opacity: f32,
) -> (Scene, Entity, Entity) {
    let mut scene = Scene::new();
    let renderer = scene.add_renderer(Renderer::default().viewport(viewport));
    scene.add_camera(renderer, ortho_camera()).expect("renderer exists");
    let actor = scene
        .add_actor(
            renderer,
            PolyMapper::new(PolyData::quad(min, max, 0.0)),
            Property::default().color(color).opacity(opacity).unlit(),
            Prop::default(),
        )
        .expect("renderer exists");
    (scene, renderer, actor)
}

/// A full-window renderer whose quad is larger than the view.
pub(crate) fn quad_scene(color: Vec3, opacity: f32) -> (Scene, Entity, Entity) {
    scene_with_quad(
        [0.0, 0.0, 1.0, 1.0],
        Vec2::splat(-2.0),
        Vec2::splat(2.0),
        color,
        opacity,
    )
}

/// A red quad over the left half of the view, black elsewhere.
pub(crate) fn half_quad_scene() -> Scene {
    scene_with_quad(
        [0.0, 0.0, 1.0, 1.0],
        Vec2::new(-2.0, -2.0),
        Vec2::new(0.0, 2.0),
        Vec3::new(1.0, 0.0, 0.0),
        1.0,
    )
    .0
}

/// Parses and validates one WGSL module, panicking with the source on error.
pub(crate) fn validate_wgsl(stage: &str, source: &str) {
    let module = naga::front::wgsl::parse_str(source).unwrap_or_else(|e| {
        panic!("failed to parse {} stage: {}\n{}", stage, e, source);
    });
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .unwrap_or_else(|e| {
        panic!("{} stage failed validation: {}\n{}", stage, e, source);
    });
}

/// Validates the vertex and fragment modules of an assembled program.
pub(crate) fn validate_program(program: &ProgramSource) {
    validate_wgsl("vertex", &program.vertex);
    validate_wgsl("fragment", &program.fragment);
}
