use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use fxhash::FxHasher64;

use super::{BlendMode, DepthState, Topology};
use crate::resource::TextureFormat;

/// Cache key for a compiled pipeline.
///
/// Two draws share a pipeline exactly when they agree on the renderable class
/// name, the ordered list of active shader override identities and every
/// backend state input fed to the builder.
///
/// The key keeps the full byte stream it was hashed from. Equality compares
/// that stream, so two configurations whose hashes collide stay distinct.
#[derive(Clone, Debug)]
pub struct PipelineKey {
    hash: u64,
    material: Rc<[u8]>,
}

impl PipelineKey {
    pub fn builder(class_name: &str) -> PipelineKeyBuilder {
        PipelineKeyBuilder::new(class_name)
    }

    pub fn raw(&self) -> u64 {
        self.hash
    }

    /// The byte stream the key was built from.
    pub fn material(&self) -> &[u8] {
        &self.material
    }

    #[cfg(test)]
    pub(crate) fn from_parts(hash: u64, material: &[u8]) -> Self {
        Self {
            hash,
            material: material.into(),
        }
    }
}

impl PartialEq for PipelineKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.material == other.material
    }
}

impl Eq for PipelineKey {}

impl Hash for PipelineKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl PartialOrd for PipelineKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PipelineKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.hash
            .cmp(&other.hash)
            .then_with(|| self.material.cmp(&other.material))
    }
}

impl std::fmt::Display for PipelineKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.hash)
    }
}

/// Records every byte a value feeds to a hasher.
#[derive(Default)]
struct Material(Vec<u8>);

impl Hasher for Material {
    fn write(&mut self, bytes: &[u8]) {
        self.0.extend_from_slice(bytes);
    }

    fn finish(&self) -> u64 {
        let mut hasher = FxHasher64::default();
        hasher.write(&self.0);
        hasher.finish()
    }
}

// Section tags keep "override a" and "tag a" from colliding.
const CLASS: u8 = 1;
const OVERRIDE: u8 = 2;
const FLAG: u8 = 3;
const TAG: u8 = 4;
const FORMAT: u8 = 5;
const STATE: u8 = 6;

/// Incremental builder for a [`PipelineKey`].
pub struct PipelineKeyBuilder {
    material: Material,
}

impl PipelineKeyBuilder {
    fn new(class_name: &str) -> Self {
        let mut material = Material::default();
        CLASS.hash(&mut material);
        class_name.hash(&mut material);
        Self { material }
    }

    /// Adds the identities of the active overrides, in marker invocation order.
    pub fn overrides<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for id in ids {
            OVERRIDE.hash(&mut self.material);
            id.as_ref().hash(&mut self.material);
        }
        self
    }

    pub fn flag(mut self, name: &str, value: bool) -> Self {
        FLAG.hash(&mut self.material);
        name.hash(&mut self.material);
        value.hash(&mut self.material);
        self
    }

    /// Adds a free-form tag such as the render encoder's name.
    pub fn tag(mut self, tag: &str) -> Self {
        TAG.hash(&mut self.material);
        tag.hash(&mut self.material);
        self
    }

    pub fn format(mut self, format: TextureFormat) -> Self {
        FORMAT.hash(&mut self.material);
        format.hash(&mut self.material);
        self
    }

    pub fn topology(mut self, topology: Topology) -> Self {
        STATE.hash(&mut self.material);
        topology.hash(&mut self.material);
        self
    }

    pub fn blend(mut self, blend: BlendMode) -> Self {
        STATE.hash(&mut self.material);
        blend.hash(&mut self.material);
        self
    }

    pub fn depth(mut self, depth: Option<DepthState>) -> Self {
        STATE.hash(&mut self.material);
        depth.hash(&mut self.material);
        self
    }

    /// Adds any hashable state value.
    pub fn state<T: Hash>(mut self, value: &T) -> Self {
        STATE.hash(&mut self.material);
        value.hash(&mut self.material);
        self
    }

    pub fn finish(self) -> PipelineKey {
        PipelineKey {
            hash: self.material.finish(),
            material: self.material.0.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(class: &str, overrides: &[&str], lighting: bool) -> PipelineKey {
        PipelineKey::builder(class)
            .overrides(overrides)
            .tag("opaque")
            .format(TextureFormat::Rgba8Unorm)
            .flag("lighting", lighting)
            .finish()
    }

    #[test]
    fn test_equal_inputs_give_equal_keys() {
        assert_eq!(key("PolyDataMapper", &["halve"], true), key("PolyDataMapper", &["halve"], true));
    }

    #[test]
    fn test_any_difference_gives_a_distinct_key() {
        let base = key("PolyDataMapper", &["halve"], true);
        assert_ne!(base, key("ImageMapper", &["halve"], true));
        assert_ne!(base, key("PolyDataMapper", &[], true));
        assert_ne!(base, key("PolyDataMapper", &["halve"], false));
        assert_ne!(base, key("PolyDataMapper", &["halve", "tint"], true));
    }

    #[test]
    fn test_override_order_is_significant() {
        assert_ne!(
            key("PolyDataMapper", &["a", "b"], true),
            key("PolyDataMapper", &["b", "a"], true)
        );
    }

    #[test]
    fn test_sections_do_not_collide() {
        let as_override = PipelineKey::builder("X").overrides(["opaque"]).finish();
        let as_tag = PipelineKey::builder("X").tag("opaque").finish();
        assert_ne!(as_override, as_tag);
    }

    #[test]
    fn test_colliding_hashes_with_other_material_are_distinct() {
        let a = PipelineKey::from_parts(7, b"PolyDataMapper opaque");
        let b = PipelineKey::from_parts(7, b"ImageMapper opaque");
        assert_eq!(a.raw(), b.raw());
        assert_ne!(a, b);
        assert_eq!(a, PipelineKey::from_parts(7, b"PolyDataMapper opaque"));
    }

    #[test]
    fn test_key_keeps_its_material() {
        let key = key("PolyDataMapper", &["halve"], true);
        let again = key.clone();
        assert!(!key.material().is_empty());
        assert_eq!(key.material(), again.material());
        assert_eq!(key.to_string().len(), 16);
    }
}
