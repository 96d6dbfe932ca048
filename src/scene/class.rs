/// The class of a renderable: its own name followed by its ancestors.
///
/// Classes are plain static chains so a collaborator can introduce a
/// subclass without touching this crate:
///
/// ```
/// use tandem::scene::RenderableClass;
///
/// const OUTLINED_ACTOR: RenderableClass = RenderableClass::new(&["OutlinedActor", "Actor", "Prop"]);
/// assert!(OUTLINED_ACTOR.is_a("Actor"));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderableClass {
    chain: &'static [&'static str],
}

impl RenderableClass {
    pub const RENDER_WINDOW: RenderableClass = RenderableClass::new(&["RenderWindow"]);
    pub const RENDERER: RenderableClass = RenderableClass::new(&["Renderer", "Viewport"]);
    pub const CAMERA: RenderableClass = RenderableClass::new(&["Camera"]);
    pub const LIGHT: RenderableClass = RenderableClass::new(&["Light"]);
    pub const ACTOR: RenderableClass = RenderableClass::new(&["Actor", "Prop"]);
    pub const VOLUME: RenderableClass = RenderableClass::new(&["Volume", "Prop"]);
    pub const IMAGE_SLICE: RenderableClass = RenderableClass::new(&["ImageSlice", "Prop"]);
    pub const POLY_DATA_MAPPER: RenderableClass =
        RenderableClass::new(&["PolyDataMapper", "Mapper", "AbstractMapper"]);
    pub const SPHERE_MAPPER: RenderableClass =
        RenderableClass::new(&["SphereMapper", "PolyDataMapper", "Mapper", "AbstractMapper"]);
    pub const IMAGE_MAPPER: RenderableClass =
        RenderableClass::new(&["ImageMapper", "Mapper", "AbstractMapper"]);
    pub const VOLUME_MAPPER: RenderableClass =
        RenderableClass::new(&["VolumeMapper", "Mapper", "AbstractMapper"]);

    /// `chain[0]` is the class itself, followed by its ancestors, most derived first.
    pub const fn new(chain: &'static [&'static str]) -> Self {
        Self { chain }
    }

    pub fn class_name(&self) -> &'static str {
        self.chain.first().copied().unwrap_or("")
    }

    pub fn is_a(&self, class: &str) -> bool {
        self.chain.contains(&class)
    }

    /// Class names from most to least derived.
    pub fn chain(&self) -> &'static [&'static str] {
        self.chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_a_walks_ancestors() {
        let actor = RenderableClass::ACTOR;
        assert_eq!(actor.class_name(), "Actor");
        assert!(actor.is_a("Actor"));
        assert!(actor.is_a("Prop"));
        assert!(!actor.is_a("Volume"));
    }

    #[test]
    fn test_sphere_mapper_is_a_poly_data_mapper() {
        let spheres = RenderableClass::SPHERE_MAPPER;
        assert_eq!(spheres.class_name(), "SphereMapper");
        assert!(spheres.is_a("PolyDataMapper"));
        assert!(spheres.is_a("Mapper"));
    }
}
