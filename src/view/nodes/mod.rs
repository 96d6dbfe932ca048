//! Built-in view nodes.

mod camera;
mod mapper;
mod prop;
mod renderer;
mod sphere;
mod strategy;
mod window;

pub use camera::{CameraNode, LightNode};
pub use mapper::MapperNode;
pub use prop::PropNode;
pub use renderer::RendererNode;
pub use sphere::SphereMapperNode;
pub use strategy::{BlockDraw, ExplicitMapper, ImmediateMapper, MapperBackend, PrimitiveDraw};
pub use window::WindowNode;
