use super::{
    Device, FramebufferDesc, FramebufferId, ReleaseQueue, ResourceKind, Retired, Texture,
    TextureFormat, TextureId,
};
use crate::error::{RenderError, RenderResult};

/// One attachment slot.
///
/// Borrowed attachments belong to another pass (the translucent pass reads the
/// opaque depth buffer, for example). They are never resized or released here.
pub enum Attachment {
    Owned(Texture),
    Borrowed(TextureId),
}

impl Attachment {
    fn id(&self) -> Option<TextureId> {
        match self {
            Attachment::Owned(texture) => texture.handle(),
            Attachment::Borrowed(id) => Some(*id),
        }
    }
}

/// A set of color attachments plus an optional depth attachment.
///
/// The slots are recorded as they are attached so size and per-slot texture
/// lookups never query the device.
pub struct Framebuffer {
    id: Option<FramebufferId>,
    label: String,
    colors: Vec<Option<Attachment>>,
    depth: Option<Attachment>,
    width: u32,
    height: u32,
    dirty: bool,
    queue: ReleaseQueue,
}

impl Framebuffer {
    /// Creates a framebuffer with no attachments.
    pub fn create(
        device: &mut dyn Device,
        queue: &ReleaseQueue,
        label: &str,
        width: u32,
        height: u32,
    ) -> RenderResult<Self> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidSize { width, height });
        }
        let id = device.create_framebuffer(&FramebufferDesc {
            label: label.to_string(),
            ..Default::default()
        })?;
        Ok(Self {
            id: Some(id),
            label: label.to_string(),
            colors: Vec::new(),
            depth: None,
            width,
            height,
            dirty: false,
            queue: queue.clone(),
        })
    }

    /// Allocates an owned color texture of the framebuffer's size in `index`.
    pub fn create_color(
        &mut self,
        device: &mut dyn Device,
        index: usize,
        format: TextureFormat,
    ) -> RenderResult<TextureId> {
        let label = format!("{} color{}", self.label, index);
        let texture = Texture::create(device, &self.queue, &label, self.width, self.height, format)?;
        let id = texture.bind()?;
        self.attach_color(device, index, Attachment::Owned(texture));
        Ok(id)
    }

    /// Allocates an owned depth texture of the framebuffer's size.
    pub fn create_depth(&mut self, device: &mut dyn Device, format: TextureFormat) -> RenderResult<TextureId> {
        let label = format!("{} depth", self.label);
        let texture = Texture::create(device, &self.queue, &label, self.width, self.height, format)?;
        let id = texture.bind()?;
        self.set_depth(device, Some(Attachment::Owned(texture)));
        Ok(id)
    }

    /// Puts `attachment` in color slot `index`, releasing an owned texture it replaces.
    pub fn attach_color(&mut self, device: &mut dyn Device, index: usize, attachment: Attachment) {
        if self.colors.len() <= index {
            self.colors.resize_with(index + 1, || None);
        }
        if let Some(Attachment::Owned(mut old)) = self.colors[index].take() {
            old.release(device);
        }
        self.colors[index] = Some(attachment);
        self.dirty = true;
    }

    pub fn set_depth(&mut self, device: &mut dyn Device, attachment: Option<Attachment>) {
        if let Some(Attachment::Owned(mut old)) = self.depth.take() {
            old.release(device);
        }
        self.depth = attachment;
        self.dirty = true;
    }

    /// Points the depth slot at another pass's depth texture. No-op when already attached.
    pub fn borrow_depth(&mut self, device: &mut dyn Device, texture: TextureId) {
        if self.depth_texture() != Some(texture) {
            self.set_depth(device, Some(Attachment::Borrowed(texture)));
        }
    }

    pub fn color_texture(&self, index: usize) -> Option<TextureId> {
        self.colors.get(index).and_then(|slot| slot.as_ref()).and_then(Attachment::id)
    }

    pub fn depth_texture(&self) -> Option<TextureId> {
        self.depth.as_ref().and_then(Attachment::id)
    }

    pub fn color_count(&self) -> usize {
        self.colors.len()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn handle(&self) -> Option<FramebufferId> {
        self.id
    }

    pub fn is_released(&self) -> bool {
        self.id.is_none()
    }

    /// Resizes every owned attachment in place. Borrowed attachments are left
    /// to their owner.
    pub fn resize(&mut self, device: &mut dyn Device, width: u32, height: u32) -> RenderResult<bool> {
        if self.id.is_none() {
            return Err(super::released(ResourceKind::Framebuffer, &self.label));
        }
        if self.width == width && self.height == height {
            return Ok(false);
        }
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidSize { width, height });
        }
        for slot in self.colors.iter_mut().flatten() {
            if let Attachment::Owned(texture) = slot {
                texture.resize(device, width, height)?;
            }
        }
        if let Some(Attachment::Owned(texture)) = self.depth.as_mut() {
            texture.resize(device, width, height)?;
        }
        self.width = width;
        self.height = height;
        Ok(true)
    }

    pub fn descriptor(&self) -> FramebufferDesc {
        FramebufferDesc {
            label: self.label.clone(),
            color: self
                .colors
                .iter()
                .map(|slot| slot.as_ref().and_then(Attachment::id))
                .collect(),
            depth: self.depth_texture(),
        }
    }

    /// Makes this the device's bound framebuffer, flushing attachment changes first.
    pub fn bind(&mut self, device: &mut dyn Device) -> RenderResult<FramebufferId> {
        let id = self
            .id
            .ok_or_else(|| super::released(ResourceKind::Framebuffer, &self.label))?;
        if self.dirty {
            device.update_framebuffer(id, &self.descriptor())?;
            self.dirty = false;
        }
        device.bind_framebuffer(Some(id));
        Ok(id)
    }

    pub fn release(&mut self, device: &mut dyn Device) {
        for slot in self.colors.iter_mut() {
            if let Some(Attachment::Owned(mut texture)) = slot.take() {
                texture.release(device);
            }
        }
        if let Some(Attachment::Owned(mut texture)) = self.depth.take() {
            texture.release(device);
        }
        if let Some(id) = self.id.take() {
            if device.bound_framebuffer() == Some(id) {
                device.bind_framebuffer(None);
            }
            device.destroy_framebuffer(id);
        }
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        // Owned textures queue themselves when the slots drop.
        if let Some(id) = self.id.take() {
            self.queue.push(Retired::Framebuffer(id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ImmediateDevice;

    fn framebuffer(device: &mut ImmediateDevice, queue: &ReleaseQueue) -> Framebuffer {
        let mut fb = Framebuffer::create(device, queue, "pass", 16, 8).unwrap();
        fb.create_color(device, 0, TextureFormat::Rgba8Unorm).unwrap();
        fb.create_depth(device, TextureFormat::Depth32Float).unwrap();
        fb
    }

    #[test]
    fn test_attachment_slots_are_recorded() {
        let mut device = ImmediateDevice::new();
        let queue = ReleaseQueue::new();
        let mut fb = framebuffer(&mut device, &queue);
        fb.create_color(&mut device, 2, TextureFormat::R16Float).unwrap();

        assert_eq!(fb.size(), (16, 8));
        assert_eq!(fb.color_count(), 3);
        assert!(fb.color_texture(0).is_some());
        assert!(fb.color_texture(1).is_none());
        assert!(fb.color_texture(2).is_some());
        assert!(fb.depth_texture().is_some());
    }

    #[test]
    fn test_resize_keeps_attachment_handles() {
        let mut device = ImmediateDevice::new();
        let queue = ReleaseQueue::new();
        let mut fb = framebuffer(&mut device, &queue);
        let color = fb.color_texture(0);
        let depth = fb.depth_texture();
        let allocations = device.stats().texture_allocations;

        assert!(!fb.resize(&mut device, 16, 8).unwrap());
        assert_eq!(device.stats().texture_allocations, allocations);

        assert!(fb.resize(&mut device, 32, 32).unwrap());
        assert_eq!(fb.color_texture(0), color);
        assert_eq!(fb.depth_texture(), depth);
        assert_eq!(fb.size(), (32, 32));
    }

    #[test]
    fn test_release_leaves_borrowed_depth_alone() {
        let mut device = ImmediateDevice::new();
        let queue = ReleaseQueue::new();
        let mut owner = framebuffer(&mut device, &queue);
        let shared_depth = owner.depth_texture().unwrap();

        let mut borrower = Framebuffer::create(&mut device, &queue, "borrower", 16, 8).unwrap();
        borrower.create_color(&mut device, 0, TextureFormat::Rgba16Float).unwrap();
        borrower.borrow_depth(&mut device, shared_depth);
        let before = device.stats().textures;

        borrower.release(&mut device);
        borrower.release(&mut device);
        assert_eq!(device.stats().textures, before - 1);
        assert!(borrower.bind(&mut device).is_err());
        assert_eq!(owner.depth_texture(), Some(shared_depth));
        owner.release(&mut device);
        assert_eq!(device.stats().textures, 0);
    }
}
