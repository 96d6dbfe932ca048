use fxhash::FxHashMap;

use super::{
    AttachmentFormats, BindGroupLayoutDesc, PipelineDescriptor, PipelineKey, PipelineLayoutDesc, ProgramSource,
};
use crate::error::{RenderError, RenderResult};
use crate::resource::{Device, Pipeline, PipelineId, ReleaseQueue};

/// A compiled pipeline plus the layout it was compiled against.
pub struct CachedPipeline {
    pipeline: Pipeline,
    layout: PipelineLayoutDesc,
    program: ProgramSource,
    class_name: String,
}

impl CachedPipeline {
    pub fn bind(&self) -> RenderResult<PipelineId> {
        self.pipeline.bind()
    }

    pub fn layout(&self) -> &PipelineLayoutDesc {
        &self.layout
    }

    pub fn label(&self) -> &str {
        self.pipeline.label()
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// The finalized source the pipeline was compiled from.
    pub fn program(&self) -> &ProgramSource {
        &self.program
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Pipelines shared across every draw whose configuration builds the same
/// [`PipelineKey`].
pub struct PipelineCache {
    pipelines: FxHashMap<PipelineKey, CachedPipeline>,
    queue: ReleaseQueue,
    hits: u64,
    misses: u64,
}

impl PipelineCache {
    pub fn new(queue: &ReleaseQueue) -> Self {
        Self {
            pipelines: FxHashMap::default(),
            queue: queue.clone(),
            hits: 0,
            misses: 0,
        }
    }

    /// Looks up a pipeline, counting the hit or miss.
    pub fn get(&mut self, key: &PipelineKey) -> Option<&CachedPipeline> {
        match self.pipelines.get(key) {
            Some(entry) => {
                self.hits += 1;
                Some(entry)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn contains(&self, key: &PipelineKey) -> bool {
        self.pipelines.contains_key(key)
    }

    /// Compiles `desc` and stores it under `desc.key`. An existing entry is
    /// returned unchanged.
    pub fn create(
        &mut self,
        device: &mut dyn Device,
        class_name: &str,
        desc: &PipelineDescriptor,
    ) -> RenderResult<&CachedPipeline> {
        if !self.pipelines.contains_key(&desc.key) {
            log::debug!("compiling pipeline '{}' ({})", desc.label, desc.key);
            let pipeline = Pipeline::create(device, &self.queue, desc)?;
            self.pipelines.insert(
                desc.key.clone(),
                CachedPipeline {
                    pipeline,
                    layout: desc.layout(),
                    program: desc.program.clone(),
                    class_name: class_name.to_string(),
                },
            );
        }
        self.pipelines
            .get(&desc.key)
            .ok_or(RenderError::MissingContext("pipeline cache entry"))
    }

    /// Verifies a cached pipeline can render into a pass with the given
    /// attachments and bind groups.
    pub fn check(
        &self,
        key: &PipelineKey,
        attachments: &AttachmentFormats,
        bind_groups: &[BindGroupLayoutDesc],
    ) -> RenderResult<()> {
        let entry = self
            .pipelines
            .get(key)
            .ok_or(RenderError::MissingContext("pipeline cache entry"))?;
        entry
            .layout
            .check(attachments, bind_groups)
            .map_err(|detail| RenderError::AttachmentMismatch {
                label: entry.label().to_string(),
                detail,
            })
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.pipelines.len(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PipelineKey, &CachedPipeline)> {
        self.pipelines.iter()
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Destroys every pipeline.
    pub fn release(&mut self, device: &mut dyn Device) {
        for (_, mut entry) in self.pipelines.drain() {
            entry.pipeline.release(device);
        }
    }
}
