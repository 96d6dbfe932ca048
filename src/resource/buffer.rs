use super::{BufferDesc, BufferId, BufferUsage, Device, ReleaseQueue, ResourceKind, Retired};
use crate::error::RenderResult;

/// An explicitly released device buffer.
pub struct Buffer {
    id: Option<BufferId>,
    desc: BufferDesc,
    queue: ReleaseQueue,
}

impl Buffer {
    /// Creates a buffer sized for `contents` and uploads them.
    pub fn with_contents(
        device: &mut dyn Device,
        queue: &ReleaseQueue,
        label: &str,
        usage: BufferUsage,
        contents: &[u8],
    ) -> RenderResult<Self> {
        let desc = BufferDesc {
            label: label.to_string(),
            usage,
            size: contents.len() as u64,
        };
        let id = device.create_buffer(&desc, Some(contents))?;
        Ok(Self {
            id: Some(id),
            desc,
            queue: queue.clone(),
        })
    }

    /// Creates a zero-initialized buffer.
    pub fn create(
        device: &mut dyn Device,
        queue: &ReleaseQueue,
        label: &str,
        usage: BufferUsage,
        size: u64,
    ) -> RenderResult<Self> {
        let desc = BufferDesc {
            label: label.to_string(),
            usage,
            size,
        };
        let id = device.create_buffer(&desc, None)?;
        Ok(Self {
            id: Some(id),
            desc,
            queue: queue.clone(),
        })
    }

    pub fn bind(&self) -> RenderResult<BufferId> {
        self.id
            .ok_or_else(|| super::released(ResourceKind::Buffer, &self.desc.label))
    }

    pub fn write(&self, device: &mut dyn Device, offset: u64, data: &[u8]) -> RenderResult<()> {
        let id = self.bind()?;
        device.write_buffer(id, offset, data)
    }

    pub fn size(&self) -> u64 {
        self.desc.size
    }

    pub fn label(&self) -> &str {
        &self.desc.label
    }

    pub fn is_released(&self) -> bool {
        self.id.is_none()
    }

    pub fn release(&mut self, device: &mut dyn Device) {
        if let Some(id) = self.id.take() {
            device.destroy_buffer(id);
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.queue.push(Retired::Buffer(id));
        }
    }
}
