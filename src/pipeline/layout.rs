//! Binding layout metadata stored next to every cached pipeline.
//!
//! A pipeline is only valid for passes whose attachments and bind groups match
//! the layout it was compiled for. [`PipelineLayoutDesc::check`] performs the
//! comparison when a cached entry is looked up from a different pass.

use crate::resource::TextureFormat;

/// How a texture binding is sampled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SampleKind {
    /// Filterable float texture, used with the shared sampler.
    Float,
    /// Float texture read with `textureLoad` only.
    UnfilterableFloat,
    Uint,
    Depth,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindingType {
    Uniform,
    Texture(SampleKind),
    Sampler,
}

/// Layout of one bind group; entry `i` is `@binding(i)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BindGroupLayoutDesc {
    pub label: &'static str,
    pub entries: Vec<BindingType>,
}

impl BindGroupLayoutDesc {
    pub fn new(label: &'static str, entries: Vec<BindingType>) -> Self {
        Self { label, entries }
    }

    pub fn uniform(label: &'static str) -> Self {
        Self::new(label, vec![BindingType::Uniform])
    }
}

/// Attachment formats of the pass a pipeline renders into.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct AttachmentFormats {
    pub color: Vec<TextureFormat>,
    pub depth: Option<TextureFormat>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PipelineLayoutDesc {
    pub attachments: AttachmentFormats,
    pub bind_groups: Vec<BindGroupLayoutDesc>,
}

impl PipelineLayoutDesc {
    /// Describes the first difference between `self` and the layout a pass
    /// expects, or `Ok(())` if they are compatible.
    pub fn check(&self, attachments: &AttachmentFormats, bind_groups: &[BindGroupLayoutDesc]) -> Result<(), String> {
        let ours = &self.attachments;
        if ours.color.len() != attachments.color.len() {
            return Err(format!(
                "expected {} color attachments, pass has {}",
                ours.color.len(),
                attachments.color.len()
            ));
        }
        for (index, (a, b)) in ours.color.iter().zip(&attachments.color).enumerate() {
            if a != b {
                return Err(format!("color attachment {} is {:?}, pass has {:?}", index, a, b));
            }
        }
        if ours.depth != attachments.depth {
            return Err(format!(
                "depth attachment is {:?}, pass has {:?}",
                ours.depth, attachments.depth
            ));
        }
        if self.bind_groups.len() != bind_groups.len() {
            return Err(format!(
                "expected {} bind groups, draw provides {}",
                self.bind_groups.len(),
                bind_groups.len()
            ));
        }
        for (index, (a, b)) in self.bind_groups.iter().zip(bind_groups).enumerate() {
            if a.entries != b.entries {
                return Err(format!("bind group {} ('{}') layout differs", index, a.label));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> PipelineLayoutDesc {
        PipelineLayoutDesc {
            attachments: AttachmentFormats {
                color: vec![TextureFormat::Rgba8Unorm],
                depth: Some(TextureFormat::Depth32Float),
            },
            bind_groups: vec![BindGroupLayoutDesc::uniform("renderer")],
        }
    }

    #[test]
    fn test_matching_layout_is_compatible() {
        let layout = layout();
        assert!(layout.check(&layout.attachments, &layout.bind_groups).is_ok());
    }

    #[test]
    fn test_mismatches_are_described() {
        let layout = layout();
        let fewer = AttachmentFormats {
            color: vec![],
            depth: Some(TextureFormat::Depth32Float),
        };
        assert!(layout.check(&fewer, &layout.bind_groups).unwrap_err().contains("color attachments"));

        let other_format = AttachmentFormats {
            color: vec![TextureFormat::Rgba32Uint],
            depth: Some(TextureFormat::Depth32Float),
        };
        assert!(layout.check(&other_format, &layout.bind_groups).unwrap_err().contains("Rgba32Uint"));

        let no_depth = AttachmentFormats {
            color: vec![TextureFormat::Rgba8Unorm],
            depth: None,
        };
        assert!(layout.check(&no_depth, &layout.bind_groups).unwrap_err().contains("depth"));

        let textured = [BindGroupLayoutDesc::new(
            "renderer",
            vec![BindingType::Texture(SampleKind::Float)],
        )];
        assert!(layout.check(&layout.attachments, &textured).unwrap_err().contains("bind group 0"));
    }
}
