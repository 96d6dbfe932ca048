use std::rc::Rc;

use super::{Marker, ShaderDescription, ShaderStage, VertexInput};
use crate::pipeline::{PipelineKey, ProgramSource};

/// The stages of one program under assembly.
#[derive(Clone, Debug)]
pub struct ProgramDescription {
    pub vertex: ShaderDescription,
    pub geometry: Option<ShaderDescription>,
    pub fragment: ShaderDescription,
}

impl ProgramDescription {
    pub fn stage(&self, stage: ShaderStage) -> Option<&ShaderDescription> {
        match stage {
            ShaderStage::Vertex => Some(&self.vertex),
            ShaderStage::Geometry => self.geometry.as_ref(),
            ShaderStage::Fragment => Some(&self.fragment),
        }
    }

    pub fn stage_mut(&mut self, stage: ShaderStage) -> Option<&mut ShaderDescription> {
        match stage {
            ShaderStage::Vertex => Some(&mut self.vertex),
            ShaderStage::Geometry => self.geometry.as_mut(),
            ShaderStage::Fragment => Some(&mut self.fragment),
        }
    }

    pub fn finalize(&self) -> ProgramSource {
        ProgramSource {
            vertex: self.vertex.finalize(),
            fragment: self.fragment.finalize(),
            geometry: self.geometry.as_ref().map(ShaderDescription::finalize),
        }
    }
}

/// What a replacement function is handed.
pub struct ReplacementContext<'a> {
    pub key: &'a PipelineKey,
    pub program: &'a mut ProgramDescription,
    pub vertex_input: &'a VertexInput,
}

impl ReplacementContext<'_> {
    pub fn vertex(&mut self) -> &mut ShaderDescription {
        &mut self.program.vertex
    }

    pub fn fragment(&mut self) -> &mut ShaderDescription {
        &mut self.program.fragment
    }
}

/// A contribution to one marker group.
pub type ReplacementFn = Rc<dyn Fn(&mut ReplacementContext<'_>)>;

/// Who owns a default replacement. Defaults for the same group run in this order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Contributor {
    Mapper,
    Property,
    Pass,
}

#[derive(Clone)]
struct DefaultReplacement {
    group: String,
    contributor: Contributor,
    f: ReplacementFn,
}

/// A user replacement for one specific marker, identified for pipeline keying.
#[derive(Clone)]
pub struct ShaderOverride {
    marker: Marker,
    id: String,
    f: ReplacementFn,
}

impl ShaderOverride {
    pub fn marker(&self) -> &Marker {
        &self.marker
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn call(&self, ctx: &mut ReplacementContext<'_>) {
        (*self.f)(ctx)
    }
}

/// Default replacements keyed by group plus user overrides keyed by marker.
#[derive(Clone, Default)]
pub struct ShaderReplacements {
    defaults: Vec<DefaultReplacement>,
    overrides: Vec<ShaderOverride>,
}

impl ShaderReplacements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default for `group` owned by `contributor`, replacing a
    /// previous one from the same owner.
    pub fn set_default<F>(&mut self, contributor: Contributor, group: &str, f: F)
    where
        F: Fn(&mut ReplacementContext<'_>) + 'static,
    {
        self.defaults
            .retain(|d| !(d.group == group && d.contributor == contributor));
        self.defaults.push(DefaultReplacement {
            group: group.to_string(),
            contributor,
            f: Rc::new(f),
        });
    }

    /// Registers a user override for `marker` (`Group::Kind`). A later
    /// registration for the same marker replaces the earlier one.
    ///
    /// Returns `false` if `marker` is not a valid marker name.
    pub fn register_override<F>(&mut self, marker: &str, id: &str, f: F) -> bool
    where
        F: Fn(&mut ReplacementContext<'_>) + 'static,
    {
        let Some(marker) = Marker::parse(marker) else {
            log::error!("cannot register shader override for invalid marker '{}'", marker);
            return false;
        };
        self.overrides.retain(|o| o.marker != marker);
        self.overrides.push(ShaderOverride {
            marker,
            id: id.to_string(),
            f: Rc::new(f),
        });
        true
    }

    pub fn remove_override(&mut self, marker: &str) -> bool {
        let Some(marker) = Marker::parse(marker) else {
            return false;
        };
        let before = self.overrides.len();
        self.overrides.retain(|o| o.marker != marker);
        before != self.overrides.len()
    }

    pub fn override_for(&self, marker: &Marker) -> Option<&ShaderOverride> {
        self.overrides.iter().find(|o| o.marker == *marker)
    }

    pub fn overrides(&self) -> &[ShaderOverride] {
        &self.overrides
    }

    pub(crate) fn defaults_for<'a>(
        &'a self,
        group: &'a str,
    ) -> impl Iterator<Item = (Contributor, &'a ReplacementFn)> + 'a {
        self.defaults
            .iter()
            .filter(move |d| d.group == group)
            .map(|d| (d.contributor, &d.f))
    }

    pub fn is_empty(&self) -> bool {
        self.defaults.is_empty() && self.overrides.is_empty()
    }
}
