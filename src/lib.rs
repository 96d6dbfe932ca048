//! # Tandem
//!
//! **One scene description, two GPU models.**
//!
//! Tandem renders a tree of renderers, props, mappers, cameras and lights
//! through either an immediate device (global bound state, draws executed as
//! they are issued) or an explicit device on `wgpu` (state baked into
//! pipelines and bind groups). The scene never knows which one it runs on.
//!
//! ## Quick Start
//!
//! ```no_run
//! use tandem::scene::{Camera, PolyData, PolyMapper, Prop, Property, Renderer, Scene};
//! use tandem::{EngineConfig, RenderWindow, Vec2, Vec3};
//!
//! fn main() -> Result<(), tandem::RenderError> {
//!     let mut scene = Scene::new();
//!     let renderer = scene.add_renderer(Renderer::default());
//!     scene.add_camera(renderer, Camera::new().at(Vec3::new(0.0, 0.0, 5.0)));
//!     scene.add_actor(
//!         renderer,
//!         PolyMapper::new(PolyData::quad(Vec2::splat(-1.0), Vec2::ONE, 0.0)),
//!         Property::default().color(Vec3::new(1.0, 0.5, 0.0)),
//!         Prop::default(),
//!     );
//!
//!     let mut window = RenderWindow::new(EngineConfig::new().size(640, 480))?;
//!     let capture = window.capture_next_frame();
//!     window.render(&scene)?;
//!     let frame = pollster::block_on(capture)?;
//!     println!("{}x{}", frame.width, frame.height);
//!     Ok(())
//! }
//! ```
//!
//! ## Layers
//!
//! - [`scene`]: the renderable tree and its modification clock.
//! - [`view`]: backend nodes mirroring the tree one to one.
//! - [`passes`]: forward, opaque, translucent, convolution and selection passes.
//! - [`shader`]: marker-based WGSL assembly with per-class overrides.
//! - [`pipeline`]: pipeline keys and the pipeline cache.
//! - [`resource`]: explicit-lifetime GPU resources and the [`Device`] trait.
//! - [`backend`]: the immediate and explicit devices.

pub mod backend;
mod config;
mod error;
mod logging;
pub mod passes;
mod picking;
pub mod pipeline;
pub mod resource;
pub mod scene;
pub mod shader;
pub mod view;
mod window;

#[cfg(test)]
mod testing;

pub use backend::{BackendKind, Capabilities, ExplicitDevice, ImmediateDevice, create_device};
pub use config::EngineConfig;
pub use error::{ErrorCategory, RenderError, RenderResult};
pub use logging::{LoggingConfig, init_logging};
pub use passes::{
    Convolution2DPass, ForwardPass, HardwareSelectionPass, Kernel, OpaquePass,
    OrderIndependentTranslucentPass, RenderPass,
};
pub use picking::{HardwareSelector, PickInfo, SelectionHit};
pub use resource::{Device, DeviceStats, PixelRect, TextureFormat, TextureId};
pub use window::{CapturedFrame, FrameCapture, RenderWindow};

// Re-export glam math types for convenience
pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};

// Renderables are hecs entities
pub use hecs::Entity;
