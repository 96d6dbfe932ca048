use super::{Device, ReleaseQueue, ResourceKind, Retired, TextureDesc, TextureFormat, TextureId};
use crate::error::{RenderError, RenderResult};

/// An explicitly released device texture.
///
/// Resizing keeps the same [`TextureId`], so framebuffers and passes holding the
/// id stay valid across window size changes.
pub struct Texture {
    id: Option<TextureId>,
    desc: TextureDesc,
    queue: ReleaseQueue,
}

impl Texture {
    pub fn create(
        device: &mut dyn Device,
        queue: &ReleaseQueue,
        label: &str,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> RenderResult<Self> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidSize { width, height });
        }
        let desc = TextureDesc {
            label: label.to_string(),
            width,
            height,
            format,
        };
        let id = device.create_texture(&desc)?;
        Ok(Self {
            id: Some(id),
            desc,
            queue: queue.clone(),
        })
    }

    pub fn bind(&self) -> RenderResult<TextureId> {
        self.id
            .ok_or_else(|| super::released(ResourceKind::Texture, &self.desc.label))
    }

    /// Resizes the storage. Returns `false` without touching the device when
    /// the size is unchanged.
    pub fn resize(&mut self, device: &mut dyn Device, width: u32, height: u32) -> RenderResult<bool> {
        let id = self.bind()?;
        if self.desc.width == width && self.desc.height == height {
            return Ok(false);
        }
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidSize { width, height });
        }
        device.resize_texture(id, width, height)?;
        self.desc.width = width;
        self.desc.height = height;
        Ok(true)
    }

    pub fn write(&self, device: &mut dyn Device, texels: &[u8]) -> RenderResult<()> {
        let id = self.bind()?;
        device.write_texture(id, texels)
    }

    pub fn size(&self) -> (u32, u32) {
        (self.desc.width, self.desc.height)
    }

    pub fn format(&self) -> TextureFormat {
        self.desc.format
    }

    pub fn label(&self) -> &str {
        &self.desc.label
    }

    pub fn handle(&self) -> Option<TextureId> {
        self.id
    }

    pub fn is_released(&self) -> bool {
        self.id.is_none()
    }

    pub fn release(&mut self, device: &mut dyn Device) {
        if let Some(id) = self.id.take() {
            device.destroy_texture(id);
        }
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.queue.push(Retired::Texture(id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ImmediateDevice;

    #[test]
    fn test_resize_to_same_size_is_a_no_op() {
        let mut device = ImmediateDevice::new();
        let queue = ReleaseQueue::new();
        let mut texture =
            Texture::create(&mut device, &queue, "color", 32, 16, TextureFormat::Rgba8Unorm).unwrap();
        let id = texture.bind().unwrap();
        let allocations = device.stats().texture_allocations;

        assert!(!texture.resize(&mut device, 32, 16).unwrap());
        assert_eq!(texture.bind().unwrap(), id);
        assert_eq!(device.stats().texture_allocations, allocations);

        assert!(texture.resize(&mut device, 64, 64).unwrap());
        assert_eq!(texture.bind().unwrap(), id);
        assert_eq!(texture.size(), (64, 64));
        assert_eq!(device.stats().texture_allocations, allocations + 1);
    }

    #[test]
    fn test_release_is_idempotent_and_bind_fails_after() {
        let mut device = ImmediateDevice::new();
        let queue = ReleaseQueue::new();
        let mut texture =
            Texture::create(&mut device, &queue, "depth", 8, 8, TextureFormat::Depth32Float).unwrap();
        assert_eq!(device.stats().textures, 1);

        texture.release(&mut device);
        texture.release(&mut device);
        assert_eq!(device.stats().textures, 0);
        assert!(texture.is_released());

        match texture.bind() {
            Err(RenderError::UseAfterRelease { kind, label }) => {
                assert_eq!(kind, ResourceKind::Texture);
                assert_eq!(label, "depth");
            }
            other => panic!("expected use-after-release, got {:?}", other),
        }
        assert!(texture.resize(&mut device, 4, 4).is_err());
    }

    #[test]
    fn test_drop_queues_unreleased_texture() {
        let mut device = ImmediateDevice::new();
        let queue = ReleaseQueue::new();
        {
            let _texture =
                Texture::create(&mut device, &queue, "scratch", 4, 4, TextureFormat::R16Float).unwrap();
        }
        assert_eq!(queue.len(), 1);
        assert_eq!(device.stats().textures, 1);
        assert_eq!(queue.drain(&mut device), 1);
        assert_eq!(device.stats().textures, 0);
    }

    #[test]
    fn test_zero_size_is_rejected() {
        let mut device = ImmediateDevice::new();
        let queue = ReleaseQueue::new();
        let result = Texture::create(&mut device, &queue, "empty", 0, 4, TextureFormat::Rgba8Unorm);
        assert!(matches!(result, Err(RenderError::InvalidSize { .. })));
    }
}
