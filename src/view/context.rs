//! State threaded through synchronization and traversal.

use fxhash::FxHashMap;
use glam::{Mat4, Vec3};

use super::ClassOverrides;
use crate::passes::RenderEncoder;
use crate::pipeline::PipelineCache;
use crate::resource::{BufferId, Device, PixelRect, ReleaseQueue, TextureId};
use crate::scene::{
    Camera, Entity, ImageProperty, Light, Property, RenderableClass, Scene, VolumeProperty,
};
use crate::shader::RendererUniforms;

/// Handed to [`ViewNode::synchronize`](super::ViewNode::synchronize).
pub struct SyncContext<'a> {
    pub device: &'a mut dyn Device,
    pub scene: &'a Scene,
    pub queue: &'a ReleaseQueue,
    pub(crate) next_prop_id: u32,
}

impl SyncContext<'_> {
    /// A prop id that is unique within the window.
    pub fn allocate_prop_id(&mut self) -> u32 {
        let id = self.next_prop_id;
        self.next_prop_id += 1;
        id
    }
}

/// Camera and lights published by a renderer's children during
/// [`Operation::Camera`](super::Operation::Camera).
#[derive(Clone, Debug, Default)]
pub struct ViewSetup {
    pub camera: Option<Camera>,
    pub lights: Vec<Light>,
}

/// The renderer currently being drawn.
#[derive(Clone, Copy, Debug)]
pub struct RendererFrame {
    pub entity: Entity,
    pub viewport: PixelRect,
    pub uniforms: RendererUniforms,
    pub ubo: BufferId,
}

impl RendererFrame {
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.uniforms.wcvc)
    }
}

/// Surface parameters a prop hands to its mapper.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Appearance {
    pub ambient: f32,
    pub diffuse: f32,
    pub ambient_color: Vec3,
    pub diffuse_color: Vec3,
    pub opacity: f32,
    pub lighting: bool,
}

impl Default for Appearance {
    fn default() -> Self {
        Appearance::from(&Property::default())
    }
}

impl Appearance {
    /// Reads whichever property component `entity` carries.
    pub fn of(scene: &Scene, entity: Entity) -> Appearance {
        if let Some(property) = scene.get::<Property>(entity) {
            return Appearance::from(&*property);
        }
        if let Some(property) = scene.get::<VolumeProperty>(entity) {
            return Appearance::unlit(property.color, property.opacity);
        }
        if let Some(property) = scene.get::<ImageProperty>(entity) {
            return Appearance::unlit(Vec3::ONE, property.opacity);
        }
        Appearance::default()
    }

    fn unlit(color: Vec3, opacity: f32) -> Appearance {
        Appearance {
            ambient: 0.0,
            diffuse: 1.0,
            ambient_color: color,
            diffuse_color: color,
            opacity,
            lighting: false,
        }
    }

    pub fn is_translucent(&self) -> bool {
        self.opacity < 1.0
    }
}

impl From<&Property> for Appearance {
    fn from(p: &Property) -> Self {
        Appearance {
            ambient: p.ambient,
            diffuse: p.diffuse,
            ambient_color: p.ambient_color,
            diffuse_color: p.diffuse_color,
            opacity: p.opacity,
            lighting: p.lighting,
        }
    }
}

/// The prop whose mapper is drawing.
#[derive(Clone, Copy, Debug)]
pub struct PropFrame {
    pub entity: Entity,
    pub class: RenderableClass,
    pub prop_id: u32,
    pub model: Mat4,
    pub appearance: Appearance,
}

/// Visible props found by [`Operation::Query`](super::Operation::Query).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PropCounts {
    pub opaque: usize,
    pub translucent: usize,
}

/// Targets of the opaque pass, borrowed by the translucent pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpaqueTargets {
    pub color: TextureId,
    pub depth: TextureId,
}

/// Everything passes and view nodes share while one frame is built.
///
/// Passes set the encoder and read targets; renderer and prop nodes set their
/// frames on the way down and clear them on the way back up, so a mapper sees
/// exactly the renderer and prop it belongs to.
pub struct FrameContext<'a> {
    pub device: &'a mut dyn Device,
    pub scene: &'a Scene,
    pub cache: &'a mut PipelineCache,
    pub queue: &'a ReleaseQueue,
    pub overrides: &'a ClassOverrides,
    /// Output size in pixels.
    pub size: (u32, u32),
    pub background: [f32; 4],
    pub encoder: Option<RenderEncoder>,
    pub view: ViewSetup,
    pub renderer: Option<RendererFrame>,
    pub prop: Option<PropFrame>,
    pub counts: PropCounts,
    pub opaque_targets: Option<OpaqueTargets>,
    /// Prop ids drawn by the selection operation, mapped back to their props.
    pub pickables: FxHashMap<u32, Entity>,
    trace: Vec<String>,
}

impl<'a> FrameContext<'a> {
    pub fn new(
        device: &'a mut dyn Device,
        scene: &'a Scene,
        cache: &'a mut PipelineCache,
        queue: &'a ReleaseQueue,
        overrides: &'a ClassOverrides,
        size: (u32, u32),
        background: [f32; 4],
    ) -> Self {
        Self {
            device,
            scene,
            cache,
            queue,
            overrides,
            size,
            background,
            encoder: None,
            view: ViewSetup::default(),
            renderer: None,
            prop: None,
            counts: PropCounts::default(),
            opaque_targets: None,
            pickables: FxHashMap::default(),
            trace: Vec::new(),
        }
    }

    /// Appends a pass to the frame trace.
    pub fn record(&mut self, pass: &str) {
        log::trace!("executing {}", pass);
        self.trace.push(pass.to_string());
    }

    pub fn trace(&self) -> &[String] {
        &self.trace
    }

    pub fn into_trace(self) -> Vec<String> {
        self.trace
    }
}
