//! Default replacements for surface programs.
//!
//! The mapper owns every group except `Light`, which the actor's property
//! contributes, and `RenderEncoder`, which the active pass contributes.

use super::{Contributor, ShaderReplacements, MAPPER_UBO_WGSL, RENDERER_UBO_WGSL};
use crate::pipeline::SurfaceShading;

/// Vertex attribute names used by surface programs.
pub const POSITION_ATTRIBUTE: &str = "vertexMC";
pub const NORMAL_ATTRIBUTE: &str = "normalMC";
pub const COLOR_ATTRIBUTE: &str = "vertexColor";
pub const TCOORD_ATTRIBUTE: &str = "tcoord";

/// The statement that turns the interpolated view-space normal into `normal`.
pub const NORMAL_STATEMENT: &str = "normal = normalize(input.normalVC);";

/// Mapper-owned defaults for `Renderer`, `Mapper`, `Color`, `Normal`,
/// `TCoord` and `Position`.
pub fn mapper_replacements(shading: SurfaceShading) -> ShaderReplacements {
    let mut set = ShaderReplacements::new();

    set.set_default(Contributor::Mapper, "Renderer", |ctx| {
        ctx.vertex().substitute("Renderer::Dec", &[RENDERER_UBO_WGSL], true);
        ctx.fragment().substitute("Renderer::Dec", &[RENDERER_UBO_WGSL], true);
    });

    set.set_default(Contributor::Mapper, "Mapper", |ctx| {
        ctx.vertex().substitute("Mapper::Dec", &[MAPPER_UBO_WGSL], true);
        ctx.fragment().substitute("Mapper::Dec", &[MAPPER_UBO_WGSL], true);
    });

    set.set_default(Contributor::Mapper, "Color", move |ctx| {
        let mut fs = vec![
            "var ambientColor = mapperUBO.AmbientColor;".to_string(),
            "  var diffuseColor = mapperUBO.DiffuseColor;".to_string(),
            "  var opacity = mapperUBO.Opacity;".to_string(),
        ];
        if shading.vertex_colors {
            ctx.vertex().add_output("vec4<f32>", "vertexColorVS");
            ctx.vertex().substitute("Color::Impl", &["output.vertexColorVS = input.vertexColor;"], true);
            fs.push("  diffuseColor = vec4<f32>(input.vertexColorVS.rgb, 1.0);".to_string());
            fs.push("  opacity = opacity * input.vertexColorVS.a;".to_string());
        }
        ctx.fragment().substitute("Color::Impl", &fs, true);
    });

    set.set_default(Contributor::Mapper, "Normal", move |ctx| {
        ctx.fragment().substitute(
            "Normal::Dec",
            &["var<private> normal : vec3<f32> = vec3<f32>(0.0, 0.0, 1.0);"],
            true,
        );
        if shading.normals {
            ctx.vertex().add_output("vec3<f32>", "normalVC");
            ctx.vertex().substitute(
                "Normal::Impl",
                &["output.normalVC = (mapperUBO.normalMatrix * vec4<f32>(input.normalMC, 0.0)).xyz;"],
                true,
            );
            ctx.fragment().substitute("Normal::Impl", &[NORMAL_STATEMENT], true);
        }
    });

    set.set_default(Contributor::Mapper, "TCoord", move |ctx| {
        if !shading.textured {
            return;
        }
        ctx.vertex().add_output("vec2<f32>", "tcoordVS");
        ctx.vertex().substitute("TCoord::Impl", &["output.tcoordVS = input.tcoord;"], true);
        ctx.fragment().substitute(
            "TCoord::Dec",
            &[
                "@group(2) @binding(0) var imageTexture : texture_2d<f32>;",
                "@group(2) @binding(1) var imageSampler : sampler;",
            ],
            true,
        );
        ctx.fragment().substitute(
            "TCoord::Impl",
            &["computedColor = computedColor * textureSample(imageTexture, imageSampler, input.tcoordVS);"],
            true,
        );
    });

    set.set_default(Contributor::Mapper, "Position", |ctx| {
        ctx.vertex().add_builtin_output("vec4<f32>", "Position", "position");
        ctx.vertex().substitute(
            "Position::Impl",
            &["output.Position = rendererUBO.WCPCMatrix * mapperUBO.MCWCMatrix * vec4<f32>(input.vertexMC, 1.0);"],
            true,
        );
    });

    set
}

/// Property-owned default for `Light`.
pub fn property_replacements(lighting: bool) -> ShaderReplacements {
    let mut set = ShaderReplacements::new();
    set.set_default(Contributor::Property, "Light", move |ctx| {
        let lines: &[&str] = if lighting {
            &[
                "if (normal.z < 0.0) { normal = -normal; }",
                "  var diffuseLight = vec3<f32>(0.0, 0.0, 0.0);",
                "  for (var i = 0u; i < rendererUBO.lightCount.x; i = i + 1u) {",
                "    let lightInfo = rendererUBO.lights[i];",
                "    diffuseLight = diffuseLight + max(dot(normal, -lightInfo.directionVC.xyz), 0.0) * lightInfo.color.rgb;",
                "  }",
                "  var computedColor = vec4<f32>(mapperUBO.Ambient * ambientColor.rgb + mapperUBO.Diffuse * diffuseLight * diffuseColor.rgb, opacity);",
            ]
        } else {
            &["var computedColor = vec4<f32>(diffuseColor.rgb, opacity);"]
        };
        ctx.fragment().substitute("Light::Impl", lines, true);
    });
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PipelineKey, SurfaceOutput};
    use crate::shader::{
        SURFACE_FS, SURFACE_VS, ShaderAssembler, ShaderTemplates, VertexFormat, VertexInput,
        VertexSemantic,
    };
    use crate::testing;

    fn shading() -> SurfaceShading {
        SurfaceShading {
            lighting: true,
            normals: true,
            vertex_colors: false,
            textured: false,
            output: SurfaceOutput::Color,
        }
    }

    fn input() -> VertexInput {
        VertexInput::new()
            .with_attribute(POSITION_ATTRIBUTE, VertexFormat::Float32x3, VertexSemantic::Position)
            .with_attribute(NORMAL_ATTRIBUTE, VertexFormat::Float32x3, VertexSemantic::Normal)
    }

    #[test]
    fn test_surface_program_resolves_every_marker() {
        let mapper = mapper_replacements(shading());
        let property = property_replacements(true);
        let input = input();
        let key = PipelineKey::builder("PolyDataMapper").finish();
        let program = ShaderAssembler::new(key, ShaderTemplates::new(SURFACE_VS, SURFACE_FS), &input)
            .with(&mapper)
            .with(&property)
            .assemble();
        let source = program.finalize();

        assert!(source.vertex.contains("@location(1) normalMC : vec3<f32>,"));
        assert!(source.vertex.contains("output.Position = rendererUBO.WCPCMatrix"));
        assert!(source.fragment.contains(NORMAL_STATEMENT));
        assert!(source.fragment.contains("var<private> normal"));
        assert!(source.fragment.contains("diffuseLight"));
        assert!(!source.vertex.contains("TANDEM"));
        assert!(!source.fragment.contains("TANDEM"));
    }

    #[test]
    fn test_override_replaces_the_normal_statement_only() {
        let mapper = mapper_replacements(shading());
        let property = property_replacements(true);
        let mut user = ShaderReplacements::new();
        user.register_override("Normal::Impl", "halve-diffuse", |ctx| {
            ctx.fragment().substitute("Normal::Impl", &["diffuseColor *= 0.5;"], true);
        });
        let input = input();
        let key = PipelineKey::builder("PolyDataMapper").finish();
        let program = ShaderAssembler::new(key, ShaderTemplates::new(SURFACE_VS, SURFACE_FS), &input)
            .with(&mapper)
            .with(&property)
            .with(&user)
            .assemble();
        let fs = program.fragment.finalize();

        assert!(fs.contains("diffuseColor *= 0.5;"));
        assert!(!fs.contains(NORMAL_STATEMENT));
        // Other markers keep their defaults.
        assert!(fs.contains("var diffuseColor = mapperUBO.DiffuseColor;"));
        assert!(fs.contains("diffuseLight"));
        assert!(program.vertex.finalize().contains("output.normalVC"));
    }

    #[test]
    fn test_unlit_program_has_no_light_loop() {
        let mapper = mapper_replacements(SurfaceShading {
            lighting: false,
            normals: false,
            ..shading()
        });
        let property = property_replacements(false);
        let input = VertexInput::new().with_attribute(
            POSITION_ATTRIBUTE,
            VertexFormat::Float32x3,
            VertexSemantic::Position,
        );
        let key = PipelineKey::builder("PolyDataMapper").finish();
        let program = ShaderAssembler::new(key, ShaderTemplates::new(SURFACE_VS, SURFACE_FS), &input)
            .with(&mapper)
            .with(&property)
            .assemble();
        let fs = program.fragment.finalize();
        assert!(!fs.contains("diffuseLight"));
        assert!(fs.contains("var computedColor = vec4<f32>(diffuseColor.rgb, opacity);"));
        assert!(!fs.contains("fragmentInput"));
    }

    #[test]
    fn test_default_and_overridden_programs_validate() {
        let mut user = ShaderReplacements::new();
        user.register_override("Normal::Impl", "halve-diffuse", |ctx| {
            ctx.fragment().substitute("Normal::Impl", &["diffuseColor *= 0.5;"], true);
        });
        let no_user = ShaderReplacements::new();

        let variants = [
            shading(),
            SurfaceShading {
                lighting: false,
                normals: false,
                ..shading()
            },
            SurfaceShading {
                vertex_colors: true,
                ..shading()
            },
            SurfaceShading {
                textured: true,
                ..shading()
            },
        ];
        for shading in variants {
            let mut input = VertexInput::new()
                .with_attribute(POSITION_ATTRIBUTE, VertexFormat::Float32x3, VertexSemantic::Position);
            if shading.normals {
                input.add_attribute(NORMAL_ATTRIBUTE, VertexFormat::Float32x3, VertexSemantic::Normal);
            }
            if shading.vertex_colors {
                input.add_attribute(COLOR_ATTRIBUTE, VertexFormat::Unorm8x4, VertexSemantic::Color);
            }
            if shading.textured {
                input.add_attribute(TCOORD_ATTRIBUTE, VertexFormat::Float32x2, VertexSemantic::TCoord);
            }
            let mapper = mapper_replacements(shading);
            let property = property_replacements(shading.lighting);
            let encoder = crate::passes::RenderEncoder::color();
            for user in [&no_user, &user] {
                let key = PipelineKey::builder("PolyDataMapper").finish();
                let program = ShaderAssembler::new(key, ShaderTemplates::new(SURFACE_VS, SURFACE_FS), &input)
                    .with(&mapper)
                    .with(&property)
                    .with(encoder.replacements())
                    .with(user)
                    .assemble();
                testing::validate_program(&program.finalize());
            }
        }
    }
}
