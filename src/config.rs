use crate::backend::BackendKind;
use crate::logging::LoggingConfig;

/// Settings for a [`RenderWindow`](crate::RenderWindow).
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub backend: BackendKind,
    /// Label given to the device and used in logs.
    pub label: String,
    pub width: u32,
    pub height: u32,
    /// Clear color of the window, straight RGBA.
    pub background: [f32; 4],
    /// Forces multi-render-target support on or off, overriding what the
    /// device reports.
    pub multi_target: Option<bool>,
    /// Installs a logger when the window is created.
    pub logging: Option<LoggingConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Immediate,
            label: "tandem".to_string(),
            width: 300,
            height: 300,
            background: [0.0, 0.0, 0.0, 1.0],
            multi_target: None,
            logging: None,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn background(mut self, background: [f32; 4]) -> Self {
        self.background = background;
        self
    }

    pub fn multi_target(mut self, enabled: bool) -> Self {
        self.multi_target = Some(enabled);
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }
}
