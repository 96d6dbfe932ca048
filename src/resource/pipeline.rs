use super::{Device, PipelineId, ReleaseQueue, ResourceKind, Retired};
use crate::error::RenderResult;
use crate::pipeline::PipelineDescriptor;

/// An explicitly released compiled pipeline (a program plus its fixed state).
pub struct Pipeline {
    id: Option<PipelineId>,
    label: String,
    queue: ReleaseQueue,
}

impl Pipeline {
    pub fn create(
        device: &mut dyn Device,
        queue: &ReleaseQueue,
        desc: &PipelineDescriptor,
    ) -> RenderResult<Self> {
        let id = device.create_pipeline(desc)?;
        Ok(Self {
            id: Some(id),
            label: desc.label.clone(),
            queue: queue.clone(),
        })
    }

    pub fn bind(&self) -> RenderResult<PipelineId> {
        self.id
            .ok_or_else(|| super::released(ResourceKind::Pipeline, &self.label))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn release(&mut self, device: &mut dyn Device) {
        if let Some(id) = self.id.take() {
            device.destroy_pipeline(id);
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.queue.push(Retired::Pipeline(id));
        }
    }
}
