//! Fixed render state baked into a pipeline.

use crate::resource::TextureFormat;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topology {
    PointList,
    LineList,
    TriangleList,
}

/// Per-target blend equations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// `dst = src`
    Replace,
    /// Source-alpha over.
    Alpha,
    /// `dst = dst + src`
    Additive,
    /// `dst = dst * (1 - src)`, used for translucency revealage.
    Reveal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Less,
    LessEqual,
    Always,
}

impl CompareFunction {
    pub fn passes(self, incoming: f32, stored: f32) -> bool {
        match self {
            CompareFunction::Less => incoming < stored,
            CompareFunction::LessEqual => incoming <= stored,
            CompareFunction::Always => true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ColorTargetState {
    pub format: TextureFormat,
    pub blend: BlendMode,
}

impl ColorTargetState {
    pub fn new(format: TextureFormat, blend: BlendMode) -> Self {
        Self { format, blend }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DepthState {
    pub format: TextureFormat,
    pub write: bool,
    pub compare: CompareFunction,
}

impl DepthState {
    pub fn read_write(format: TextureFormat) -> Self {
        Self {
            format,
            write: true,
            compare: CompareFunction::Less,
        }
    }

    /// Depth tested against but never written.
    pub fn read_only(format: TextureFormat) -> Self {
        Self {
            format,
            write: false,
            compare: CompareFunction::Less,
        }
    }
}
