use std::cell::RefCell;
use std::rc::Rc;

use super::{BufferId, Device, FramebufferId, PipelineId, TextureId};

/// A device object whose owner went away without releasing it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Retired {
    Buffer(BufferId),
    Texture(TextureId),
    Framebuffer(FramebufferId),
    Pipeline(PipelineId),
}

/// Deferred deletion queue shared by every wrapper created for one window.
///
/// Wrappers push their id here from `Drop`; the window drains the queue at the
/// start of each frame and on release.
#[derive(Clone, Default)]
pub struct ReleaseQueue {
    entries: Rc<RefCell<Vec<Retired>>>,
}

impl ReleaseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: Retired) {
        self.entries.borrow_mut().push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Destroys every queued object. Returns how many were destroyed.
    pub fn drain(&self, device: &mut dyn Device) -> usize {
        let entries: Vec<Retired> = self.entries.borrow_mut().drain(..).collect();
        for entry in &entries {
            match *entry {
                Retired::Buffer(id) => device.destroy_buffer(id),
                Retired::Texture(id) => device.destroy_texture(id),
                Retired::Framebuffer(id) => device.destroy_framebuffer(id),
                Retired::Pipeline(id) => device.destroy_pipeline(id),
            }
        }
        if !entries.is_empty() {
            log::trace!("released {} dropped resources", entries.len());
        }
        entries.len()
    }
}
