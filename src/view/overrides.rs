use fxhash::FxHashMap;

use crate::scene::RenderableClass;
use crate::shader::{ReplacementContext, ShaderReplacements};

/// Shader overrides registered per renderable class.
///
/// A draw collects the sets of every class in its mapper's chain and then its
/// prop's chain, least derived first. Later sets win when two of them
/// override the same marker, so an override registered for `Actor` beats one
/// registered for `Mapper`, and one for a subclass beats its parent's.
#[derive(Clone, Default)]
pub struct ClassOverrides {
    sets: FxHashMap<String, ShaderReplacements>,
}

impl ClassOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, class: &str, marker: &str, id: &str, f: F) -> bool
    where
        F: Fn(&mut ReplacementContext<'_>) + 'static,
    {
        self.sets
            .entry(class.to_string())
            .or_default()
            .register_override(marker, id, f)
    }

    pub fn remove(&mut self, class: &str, marker: &str) -> bool {
        self.sets
            .get_mut(class)
            .is_some_and(|set| set.remove_override(marker))
    }

    pub fn for_class(&self, class: &str) -> Option<&ShaderReplacements> {
        self.sets.get(class)
    }

    /// Sets that apply to a draw by the given classes, lowest precedence first.
    pub fn sets_for(&self, classes: &[RenderableClass]) -> Vec<&ShaderReplacements> {
        classes
            .iter()
            .flat_map(|class| class.chain().iter().rev())
            .filter_map(|name| self.sets.get(*name))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.values().all(ShaderReplacements::is_empty)
    }
}
