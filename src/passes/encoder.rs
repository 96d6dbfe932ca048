use crate::pipeline::{AttachmentFormats, BlendMode, ColorTargetState, DepthState, SurfaceOutput};
use crate::resource::TextureFormat;
use crate::shader::{Contributor, ShaderReplacements};

/// What a pass asks mappers to write, and into which targets.
///
/// The encoder contributes the `RenderEncoder` marker group of the surface
/// fragment template and fixes the color targets and depth state of every
/// pipeline its pass draws with. Its name is part of the pipeline key.
#[derive(Clone)]
pub struct RenderEncoder {
    name: &'static str,
    output: SurfaceOutput,
    targets: Vec<ColorTargetState>,
    depth: Option<DepthState>,
    replacements: ShaderReplacements,
}

impl RenderEncoder {
    /// Shaded color into one `Rgba8Unorm` target with a written depth buffer.
    pub fn color() -> Self {
        let mut replacements = ShaderReplacements::new();
        replacements.set_default(Contributor::Pass, "RenderEncoder", |ctx| {
            ctx.fragment().add_output("vec4<f32>", "outColor");
            ctx.fragment()
                .substitute("RenderEncoder::Impl", &["output.outColor = computedColor;"], true);
        });
        Self {
            name: "opaque",
            output: SurfaceOutput::Color,
            targets: vec![ColorTargetState::new(TextureFormat::Rgba8Unorm, BlendMode::Replace)],
            depth: Some(DepthState::read_write(TextureFormat::Depth32Float)),
            replacements,
        }
    }

    /// Weighted blended translucency: premultiplied color and coverage are
    /// accumulated additively, revealage multiplicatively. Depth is tested
    /// against the opaque buffer but not written.
    pub fn oit_accumulate() -> Self {
        let mut replacements = ShaderReplacements::new();
        replacements.set_default(Contributor::Pass, "RenderEncoder", |ctx| {
            let fs = ctx.fragment();
            fs.add_builtin_input("vec4<f32>", "fragPos", "position");
            fs.add_output("vec4<f32>", "accumColor");
            fs.add_output("f32", "revealage");
            fs.substitute(
                "RenderEncoder::Impl",
                &[
                    "let weight = 1.0 - input.fragPos.z * 0.9;",
                    "  output.accumColor = vec4<f32>(computedColor.rgb * computedColor.a, computedColor.a) * weight;",
                    "  output.revealage = computedColor.a;",
                ],
                true,
            );
        });
        Self {
            name: "translucent",
            output: SurfaceOutput::OitAccumulate,
            targets: vec![
                ColorTargetState::new(TextureFormat::Rgba16Float, BlendMode::Additive),
                ColorTargetState::new(TextureFormat::R16Float, BlendMode::Reveal),
            ],
            depth: Some(DepthState::read_only(TextureFormat::Depth32Float)),
            replacements,
        }
    }

    /// Prop and composite ids into an `Rgba32Uint` target.
    pub fn ids() -> Self {
        let mut replacements = ShaderReplacements::new();
        replacements.set_default(Contributor::Pass, "RenderEncoder", |ctx| {
            ctx.fragment().add_output("vec4<u32>", "outIds");
            ctx.fragment().substitute(
                "RenderEncoder::Impl",
                &["output.outIds = vec4<u32>(mapperUBO.PropID, mapperUBO.CompositeID, 0u, mapperUBO.PropID);"],
                true,
            );
        });
        Self {
            name: "selection",
            output: SurfaceOutput::Ids,
            targets: vec![ColorTargetState::new(TextureFormat::Rgba32Uint, BlendMode::Replace)],
            depth: Some(DepthState::read_write(TextureFormat::Depth32Float)),
            replacements,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn output(&self) -> SurfaceOutput {
        self.output
    }

    pub fn targets(&self) -> &[ColorTargetState] {
        &self.targets
    }

    pub fn depth(&self) -> Option<DepthState> {
        self.depth
    }

    pub fn replacements(&self) -> &ShaderReplacements {
        &self.replacements
    }

    /// Formats the pass's framebuffer must have.
    pub fn attachment_formats(&self) -> AttachmentFormats {
        AttachmentFormats {
            color: self.targets.iter().map(|t| t.format).collect(),
            depth: self.depth.map(|d| d.format),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PipelineKey, ProgramSource, SurfaceShading};
    use crate::shader::surface::{POSITION_ATTRIBUTE, mapper_replacements, property_replacements};
    use crate::shader::{SURFACE_FS, SURFACE_VS, ShaderAssembler, ShaderTemplates, VertexFormat, VertexInput, VertexSemantic};
    use crate::testing;

    fn program(encoder: &RenderEncoder) -> ProgramSource {
        let shading = SurfaceShading {
            lighting: false,
            normals: false,
            vertex_colors: false,
            textured: false,
            output: encoder.output(),
        };
        let mapper = mapper_replacements(shading);
        let property = property_replacements(false);
        let input = VertexInput::new().with_attribute(
            POSITION_ATTRIBUTE,
            VertexFormat::Float32x3,
            VertexSemantic::Position,
        );
        let key = PipelineKey::builder("PolyDataMapper").tag(encoder.name()).finish();
        ShaderAssembler::new(key, ShaderTemplates::new(SURFACE_VS, SURFACE_FS), &input)
            .with(&mapper)
            .with(&property)
            .with(encoder.replacements())
            .assemble()
            .finalize()
    }

    fn fragment(encoder: &RenderEncoder) -> String {
        program(encoder).fragment
    }

    #[test]
    fn test_translucent_encoder_writes_two_targets() {
        let encoder = RenderEncoder::oit_accumulate();
        let fs = fragment(&encoder);
        assert!(fs.contains("@location(0) accumColor : vec4<f32>,"));
        assert!(fs.contains("@location(1) revealage : f32,"));
        assert!(fs.contains("@builtin(position) fragPos : vec4<f32>,"));
        assert_eq!(encoder.attachment_formats().color.len(), 2);
        assert!(!encoder.depth().unwrap().write);
    }

    #[test]
    fn test_ids_encoder_writes_unsigned_ids() {
        let encoder = RenderEncoder::ids();
        let fs = fragment(&encoder);
        assert!(fs.contains("@location(0) outIds : vec4<u32>,"));
        assert!(fs.contains("mapperUBO.PropID"));
        assert!(!fs.contains("TANDEM"));
        assert_eq!(encoder.targets()[0].format, TextureFormat::Rgba32Uint);
    }

    #[test]
    fn test_every_encoder_program_validates() {
        for encoder in [RenderEncoder::color(), RenderEncoder::oit_accumulate(), RenderEncoder::ids()] {
            testing::validate_program(&program(&encoder));
        }
    }
}
