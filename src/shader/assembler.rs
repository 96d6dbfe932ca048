//! Program assembly from templates and replacement sets.
//!
//! Contributor order is fixed:
//!
//! 1. Marker groups are visited in order of first appearance across the
//!    vertex, geometry and fragment templates. `IOStructs` is skipped here.
//! 2. Within a group, the user override registered for each marker of the
//!    group runs first, in marker order. An override that substitutes its
//!    marker consumes it, so the default finds nothing to replace there.
//! 3. The group's defaults then run in [`Contributor`] order: mapper,
//!    property, render pass.
//! 4. `IOStructs` is generated last, because every earlier contributor may
//!    declare stage inputs and outputs.

use super::{
    Contributor, Marker, ProgramDescription, ReplacementContext, ReplacementFn, ShaderDescription,
    ShaderOverride, ShaderReplacements, ShaderStage, VertexInput,
};
use crate::pipeline::PipelineKey;

const IO_STRUCTS: &str = "IOStructs";

/// Template sources for each stage.
#[derive(Clone, Copy, Debug)]
pub struct ShaderTemplates<'a> {
    pub vertex: &'a str,
    pub geometry: Option<&'a str>,
    pub fragment: &'a str,
}

impl<'a> ShaderTemplates<'a> {
    pub fn new(vertex: &'a str, fragment: &'a str) -> Self {
        Self {
            vertex,
            geometry: None,
            fragment,
        }
    }

    /// Unique markers in order of first appearance across all stages.
    pub fn markers(&self) -> Vec<Marker> {
        let mut markers: Vec<Marker> = Vec::new();
        let stages = [Some(self.vertex), self.geometry, Some(self.fragment)];
        for source in stages.into_iter().flatten() {
            for marker in super::ShaderCode::parse(source).markers() {
                if !markers.contains(marker) {
                    markers.push(marker.clone());
                }
            }
        }
        markers
    }
}

/// Runs every contributor over a set of templates.
pub struct ShaderAssembler<'a> {
    key: PipelineKey,
    templates: ShaderTemplates<'a>,
    vertex_input: &'a VertexInput,
    sets: Vec<&'a ShaderReplacements>,
}

impl<'a> ShaderAssembler<'a> {
    pub fn new(key: PipelineKey, templates: ShaderTemplates<'a>, vertex_input: &'a VertexInput) -> Self {
        Self {
            key,
            templates,
            vertex_input,
            sets: Vec::new(),
        }
    }

    /// Adds a replacement set. Overrides in later sets take precedence.
    pub fn with(mut self, set: &'a ShaderReplacements) -> Self {
        self.sets.push(set);
        self
    }

    /// Identities of the overrides that would run, in marker invocation order.
    pub fn override_ids(templates: &ShaderTemplates<'_>, sets: &[&ShaderReplacements]) -> Vec<String> {
        let markers = templates.markers();
        invocation_order(&markers)
            .into_iter()
            .filter_map(|marker| find_override(sets, marker))
            .map(|o| o.id().to_string())
            .collect()
    }

    pub fn assemble(&self) -> ProgramDescription {
        let mut program = ProgramDescription {
            vertex: ShaderDescription::new(ShaderStage::Vertex, self.key.clone(), self.templates.vertex),
            geometry: self
                .templates
                .geometry
                .map(|gs| ShaderDescription::new(ShaderStage::Geometry, self.key.clone(), gs)),
            fragment: ShaderDescription::new(ShaderStage::Fragment, self.key.clone(), self.templates.fragment),
        };

        let markers = self.templates.markers();
        for group in groups(&markers) {
            for marker in markers.iter().filter(|m| m.group() == group) {
                if let Some(user) = find_override(&self.sets, marker) {
                    log::trace!("shader override '{}' at {}", user.id(), marker.name());
                    let mut ctx = self.context(&mut program);
                    user.call(&mut ctx);
                }
            }

            let mut defaults: Vec<(Contributor, &ReplacementFn)> =
                self.sets.iter().flat_map(|set| set.defaults_for(group)).collect();
            defaults.sort_by_key(|(contributor, _)| *contributor);
            for (_, f) in defaults {
                let mut ctx = self.context(&mut program);
                (**f)(&mut ctx);
            }
        }

        let ProgramDescription {
            vertex,
            geometry,
            fragment,
        } = &mut program;
        vertex.replace_io_structs(Some(self.vertex_input), None);
        if let Some(geometry) = geometry.as_mut() {
            geometry.replace_io_structs(None, Some(&*vertex));
        }
        let previous: &ShaderDescription = match geometry.as_ref() {
            Some(geometry) => geometry,
            None => &*vertex,
        };
        fragment.replace_io_structs(None, Some(previous));

        program
    }

    fn context<'p>(&'p self, program: &'p mut ProgramDescription) -> ReplacementContext<'p> {
        ReplacementContext {
            key: &self.key,
            program,
            vertex_input: self.vertex_input,
        }
    }
}

/// Marker groups in first-appearance order, `IOStructs` excluded.
fn groups(markers: &[Marker]) -> Vec<&str> {
    let mut groups: Vec<&str> = Vec::new();
    for marker in markers {
        if marker.group() != IO_STRUCTS && !groups.contains(&marker.group()) {
            groups.push(marker.group());
        }
    }
    groups
}

/// Markers in the order their overrides are invoked: by group, then by
/// position within the templates.
fn invocation_order(markers: &[Marker]) -> Vec<&Marker> {
    groups(markers)
        .into_iter()
        .flat_map(|group| markers.iter().filter(move |m| m.group() == group))
        .collect()
}

fn find_override<'s>(sets: &[&'s ShaderReplacements], marker: &Marker) -> Option<&'s ShaderOverride> {
    sets.iter().rev().find_map(|set| set.override_for(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    const VS: &str = "//TANDEM::Color::Dec\n//TANDEM::IOStructs::Dec\nfn main(\n//TANDEM::IOStructs::Input\n)\n//TANDEM::IOStructs::Output\n{\n  //TANDEM::Normal::Impl\n}\n";
    const FS: &str = "//TANDEM::IOStructs::Dec\nfn main(\n//TANDEM::IOStructs::Input\n)\n//TANDEM::IOStructs::Output\n{\n  //TANDEM::Color::Impl\n  //TANDEM::Normal::Impl\n  //TANDEM::Light::Impl\n}\n";

    fn defaults(log: Rc<RefCell<Vec<String>>>) -> ShaderReplacements {
        let mut set = ShaderReplacements::new();
        for group in ["Color", "Normal", "Light"] {
            let log = log.clone();
            set.set_default(Contributor::Mapper, group, move |ctx| {
                log.borrow_mut().push(format!("mapper:{}", group));
                let impl_marker = format!("{}::Impl", group);
                ctx.vertex().substitute(&impl_marker, &[format!("// vs {}", group)], true);
                ctx.fragment().substitute(&impl_marker, &[format!("// default {}", group)], true);
            });
        }
        set
    }

    #[test]
    fn test_groups_run_in_template_order_with_io_last() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let set = defaults(log.clone());
        let mut pass = ShaderReplacements::new();
        let pass_log = log.clone();
        pass.set_default(Contributor::Pass, "Color", move |ctx| {
            pass_log.borrow_mut().push("pass:Color".into());
            ctx.fragment().add_output("vec4<f32>", "outColor");
        });
        let input = VertexInput::new();
        let key = PipelineKey::builder("Test").finish();
        let program = ShaderAssembler::new(key, ShaderTemplates::new(VS, FS), &input)
            .with(&pass)
            .with(&set)
            .assemble();

        assert_eq!(
            *log.borrow(),
            ["mapper:Color", "pass:Color", "mapper:Normal", "mapper:Light"]
        );
        // The pass-declared output made it into the generated struct.
        assert!(program.fragment.finalize().contains("@location(0) outColor : vec4<f32>,"));
    }

    #[test]
    fn test_override_consumes_its_marker() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let set = defaults(log);
        let mut user = ShaderReplacements::new();
        user.register_override("Normal::Impl", "halve-diffuse", |ctx| {
            ctx.fragment().substitute("Normal::Impl", &["diffuseColor *= 0.5;"], true);
        });
        let input = VertexInput::new();
        let templates = ShaderTemplates::new(VS, FS);
        let key = PipelineKey::builder("Test").finish();
        let program = ShaderAssembler::new(key, templates, &input)
            .with(&set)
            .with(&user)
            .assemble();

        let fs = program.fragment.finalize();
        assert!(fs.contains("diffuseColor *= 0.5;"));
        assert!(!fs.contains("// default Normal"));
        assert!(fs.contains("// default Color"));
        assert!(fs.contains("// default Light"));
        // The vertex stage marker was left to the default.
        assert!(program.vertex.finalize().contains("// vs Normal"));
        assert_eq!(ShaderAssembler::override_ids(&templates, &[&set, &user]), ["halve-diffuse"]);
    }

    #[test]
    fn test_override_ids_follow_marker_order_not_registration_order() {
        let mut user = ShaderReplacements::new();
        user.register_override("Light::Impl", "light", |_| {});
        user.register_override("Color::Impl", "color", |_| {});
        user.register_override("Missing::Impl", "missing", |_| {});
        let templates = ShaderTemplates::new(VS, FS);
        assert_eq!(ShaderAssembler::override_ids(&templates, &[&user]), ["color", "light"]);
    }

    #[test]
    fn test_override_ids_are_grouped_like_invocation() {
        // Normal::Impl appears before Color::Impl, but the Color group comes first.
        let mut user = ShaderReplacements::new();
        user.register_override("Normal::Impl", "normal", |_| {});
        user.register_override("Color::Impl", "color", |_| {});
        let templates = ShaderTemplates::new(VS, FS);
        assert_eq!(ShaderAssembler::override_ids(&templates, &[&user]), ["color", "normal"]);
    }

    #[test]
    fn test_latest_registration_wins() {
        let mut user = ShaderReplacements::new();
        user.register_override("Color::Impl", "first", |_| {});
        user.register_override("Color::Impl", "second", |_| {});
        assert_eq!(user.overrides().len(), 1);
        assert_eq!(user.overrides()[0].id(), "second");
        assert!(!user.register_override("nope", "bad", |_| {}));
    }

    #[test]
    fn test_unresolved_markers_are_dropped() {
        let input = VertexInput::new();
        let key = PipelineKey::builder("Test").finish();
        let program = ShaderAssembler::new(key, ShaderTemplates::new(VS, FS), &input).assemble();
        let source = program.finalize();
        assert!(!source.vertex.contains("TANDEM"));
        assert!(!source.fragment.contains("TANDEM"));
    }
}
