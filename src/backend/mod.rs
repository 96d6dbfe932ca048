//! Device implementations.
//!
//! [`ImmediateDevice`] executes every draw against globally bound state on the
//! calling thread. [`ExplicitDevice`] bakes state into pipelines and bind
//! groups and records commands per pass on top of `wgpu`.

mod explicit;
mod immediate;

pub use explicit::ExplicitDevice;
pub use immediate::ImmediateDevice;

use crate::config::EngineConfig;
use crate::error::RenderResult;
use crate::resource::Device;

/// The two device models.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum BackendKind {
    /// Global bound state, draws execute as they are issued.
    #[default]
    Immediate,
    /// Pipelines and bind groups baked ahead of the draw.
    Explicit,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Immediate => "immediate",
            BackendKind::Explicit => "explicit",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Optional features a device may lack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    pub max_color_attachments: u32,
    /// More than one color target per pass.
    pub multi_render_target: bool,
    /// Programs may carry a geometry stage.
    pub geometry_stage: bool,
    pub max_texture_size: u32,
}

impl Capabilities {
    pub fn supports_attachments(&self, count: usize) -> bool {
        count as u32 <= self.max_color_attachments && (count <= 1 || self.multi_render_target)
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            max_color_attachments: 4,
            multi_render_target: true,
            geometry_stage: false,
            max_texture_size: 8192,
        }
    }
}

/// Creates the device selected by `config`.
pub fn create_device(config: &EngineConfig) -> RenderResult<Box<dyn Device>> {
    let device: Box<dyn Device> = match config.backend {
        BackendKind::Immediate => {
            let mut caps = ImmediateDevice::default_capabilities();
            if let Some(multi) = config.multi_target {
                caps.multi_render_target = multi;
            }
            Box::new(ImmediateDevice::with_capabilities(caps))
        }
        BackendKind::Explicit => {
            let mut device = ExplicitDevice::new(&config.label)?;
            if let Some(multi) = config.multi_target {
                device.override_multi_target(multi);
            }
            Box::new(device)
        }
    };
    log::info!("created {} device '{}'", config.backend, config.label);
    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_support() {
        let caps = Capabilities::default();
        assert!(caps.supports_attachments(2));
        assert!(!caps.supports_attachments(5));

        let single = Capabilities {
            multi_render_target: false,
            ..caps
        };
        assert!(single.supports_attachments(1));
        assert!(!single.supports_attachments(2));
    }

    #[test]
    fn test_create_immediate_with_override() {
        let config = EngineConfig::default().multi_target(false);
        let device = create_device(&config).unwrap();
        assert_eq!(device.backend(), BackendKind::Immediate);
        assert!(!device.capabilities().multi_render_target);
    }
}
