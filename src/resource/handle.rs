//! Typed device handles.
//!
//! These newtypes keep a texture id from being passed where a buffer id is
//! expected. The numeric values are allocated by the device and are never
//! reused within a device's lifetime.

/// Handle to a device buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub(crate) u32);

/// Handle to a device texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub(crate) u32);

/// Handle to a set of attachments (color slots plus optional depth).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FramebufferId(pub(crate) u32);

/// Handle to a compiled program or pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineId(pub(crate) u32);

impl BufferId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl TextureId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl FramebufferId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl PipelineId {
    pub fn raw(self) -> u32 {
        self.0
    }
}
