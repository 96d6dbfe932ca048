//! Full-screen quads: one oversized triangle reading input textures from
//! group 0 with `textureLoad`.

use crate::error::RenderResult;
use crate::pipeline::{
    AttachmentFormats, BindGroupLayoutDesc, BindingType, ColorTargetState, FixedFunction,
    FullscreenOp, PipelineCache, PipelineDescriptor, PipelineKey, SampleKind, Topology,
};
use crate::resource::{Binding, Device, TextureId};
use crate::shader::{
    Contributor, QUAD_FS, QUAD_VS, ShaderAssembler, ShaderReplacements, ShaderTemplates, VertexInput,
};

/// Class name full-screen pipelines are keyed and cached under.
pub const FULLSCREEN_CLASS: &str = "FullScreenQuad";

fn input_count(op: &FullscreenOp) -> usize {
    match op {
        FullscreenOp::OitResolve => 2,
        FullscreenOp::Copy | FullscreenOp::Convolve(_) => 1,
    }
}

fn op_name(op: &FullscreenOp) -> &'static str {
    match op {
        FullscreenOp::Copy => "copy",
        FullscreenOp::OitResolve => "oit-resolve",
        FullscreenOp::Convolve(_) => "convolve",
    }
}

fn fragment_body(op: &FullscreenOp, scalar_target: bool) -> Vec<String> {
    let mut lines = vec!["let texel = vec2<i32>(input.fragPos.xy);".to_string()];
    let result = match op {
        FullscreenOp::Copy => "textureLoad(inputTexture0, texel, 0)".to_string(),
        FullscreenOp::OitResolve => {
            lines.push("  let reveal = textureLoad(inputTexture1, texel, 0).r;".to_string());
            lines.push("  if (reveal == 1.0) { discard; }".to_string());
            lines.push("  let accum = textureLoad(inputTexture0, texel, 0);".to_string());
            lines.push("  let total = max(accum.a, 0.01);".to_string());
            "vec4<f32>(accum.rgb / total, 1.0 - reveal)".to_string()
        }
        FullscreenOp::Convolve(kernel) => {
            lines.push(
                "  let maxTexel = vec2<i32>(textureDimensions(inputTexture0)) - vec2<i32>(1, 1);".to_string(),
            );
            lines.push("  var sum = vec4<f32>(0.0, 0.0, 0.0, 0.0);".to_string());
            for (dx, dy, weight) in kernel.taps() {
                lines.push(format!(
                    "  sum = sum + {:?} * textureLoad(inputTexture0, clamp(texel + vec2<i32>({}, {}), vec2<i32>(0, 0), maxTexel), 0);",
                    weight, dx, dy
                ));
            }
            "sum".to_string()
        }
    };
    let swizzle = if scalar_target { ".r" } else { "" };
    lines.push(format!("  output.outColor = ({}){};", result, swizzle));
    lines
}

fn quad_replacements(op: &FullscreenOp, target: ColorTargetState) -> ShaderReplacements {
    let inputs = input_count(op);
    let declarations: Vec<String> = (0..inputs)
        .map(|i| format!("@group(0) @binding({}) var inputTexture{} : texture_2d<f32>;", i, i))
        .collect();
    let body = fragment_body(op, target.format.components() == 1);
    let output_type = target.format.wgsl_output_type();

    let mut set = ShaderReplacements::new();
    set.set_default(Contributor::Pass, "FSQ", move |ctx| {
        ctx.vertex().add_builtin_input("u32", "vertexIndex", "vertex_index");
        ctx.vertex().add_builtin_output("vec4<f32>", "Position", "position");
        let fs = ctx.fragment();
        fs.add_builtin_input("vec4<f32>", "fragPos", "position");
        fs.add_output(output_type, "outColor");
        fs.substitute("FSQ::Dec", &declarations, true);
        fs.substitute("FSQ::Impl", &body, true);
    });
    set
}

/// The pipeline descriptor for `op` writing into `target`.
pub fn quad_descriptor(op: FullscreenOp, target: ColorTargetState) -> PipelineDescriptor {
    let mut builder = PipelineKey::builder(FULLSCREEN_CLASS)
        .tag(op_name(&op))
        .format(target.format)
        .blend(target.blend);
    if let FullscreenOp::Convolve(kernel) = &op {
        builder = builder.state(kernel);
    }
    let key = builder.finish();

    let replacements = quad_replacements(&op, target);
    let no_attributes = VertexInput::new();
    let program = ShaderAssembler::new(key.clone(), ShaderTemplates::new(QUAD_VS, QUAD_FS), &no_attributes)
        .with(&replacements)
        .assemble();
    let entries = vec![BindingType::Texture(SampleKind::UnfilterableFloat); input_count(&op)];

    PipelineDescriptor {
        label: format!("{} {}", FULLSCREEN_CLASS, op_name(&op)),
        key,
        program: program.finalize(),
        vertex_attributes: Vec::new(),
        topology: Topology::TriangleList,
        color_targets: vec![target],
        depth: None,
        bind_groups: vec![BindGroupLayoutDesc::new("inputs", entries)],
        fixed: FixedFunction::Fullscreen(op),
    }
}

/// A full-screen operation bound to one target layout.
pub struct FullscreenQuad {
    desc: PipelineDescriptor,
}

impl FullscreenQuad {
    pub fn new(op: FullscreenOp, target: ColorTargetState) -> Self {
        Self {
            desc: quad_descriptor(op, target),
        }
    }

    pub fn key(&self) -> &PipelineKey {
        &self.desc.key
    }

    /// Draws into the bound framebuffer, inside an active pass whose
    /// attachments are `pass`.
    pub fn draw(
        &self,
        device: &mut dyn Device,
        cache: &mut PipelineCache,
        pass: &AttachmentFormats,
        inputs: &[TextureId],
    ) -> RenderResult<()> {
        let key = &self.desc.key;
        let pipeline = match cache.get(key) {
            Some(cached) => cached.bind()?,
            None => cache.create(device, FULLSCREEN_CLASS, &self.desc)?.bind()?,
        };
        cache.check(key, pass, &self.desc.bind_groups)?;
        let bindings: Vec<Binding> = inputs.iter().map(|id| Binding::Texture(*id)).collect();
        device.set_pipeline(pipeline)?;
        device.set_bindings(0, &bindings)?;
        device.draw(0..3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::Kernel;
    use crate::pipeline::BlendMode;
    use crate::resource::TextureFormat;
    use crate::testing;

    #[test]
    fn test_copy_program_is_complete() {
        let desc = quad_descriptor(
            FullscreenOp::Copy,
            ColorTargetState::new(TextureFormat::Rgba8Unorm, BlendMode::Replace),
        );
        assert!(desc.program.vertex.contains("@builtin(vertex_index) vertexIndex : u32,"));
        assert!(desc.program.vertex.contains("@builtin(position) Position : vec4<f32>,"));
        assert!(desc.program.fragment.contains("var inputTexture0 : texture_2d<f32>;"));
        assert!(desc.program.fragment.contains("output.outColor = (textureLoad(inputTexture0, texel, 0));"));
        assert!(!desc.program.fragment.contains("TANDEM"));
        assert!(desc.depth.is_none());
    }

    #[test]
    fn test_kernels_key_distinct_pipelines() {
        let target = ColorTargetState::new(TextureFormat::Rgba8Unorm, BlendMode::Replace);
        let blur3 = quad_descriptor(FullscreenOp::Convolve(Kernel::box_blur(3)), target);
        let blur5 = quad_descriptor(FullscreenOp::Convolve(Kernel::box_blur(5)), target);
        let again = quad_descriptor(FullscreenOp::Convolve(Kernel::box_blur(3)), target);
        assert_ne!(blur3.key, blur5.key);
        assert_eq!(blur3.key, again.key);
        assert_eq!(blur3.program.fragment.matches("sum = sum +").count(), 9);
    }

    #[test]
    fn test_resolve_reads_two_inputs() {
        let desc = quad_descriptor(
            FullscreenOp::OitResolve,
            ColorTargetState::new(TextureFormat::Rgba8Unorm, BlendMode::Alpha),
        );
        assert_eq!(desc.bind_groups[0].entries.len(), 2);
        assert!(desc.program.fragment.contains("discard;"));
    }

    #[test]
    fn test_quad_programs_validate() {
        let rgba = ColorTargetState::new(TextureFormat::Rgba8Unorm, BlendMode::Replace);
        let scalar = ColorTargetState::new(TextureFormat::R16Float, BlendMode::Replace);
        let laplacian = Kernel::new(3, vec![0.0, -1.0, 0.0, -1.0, 4.0, -1.0, 0.0, -1.0, 0.0]).unwrap();
        let cases = [
            (FullscreenOp::Copy, rgba),
            (FullscreenOp::Copy, scalar),
            (FullscreenOp::OitResolve, ColorTargetState::new(TextureFormat::Rgba8Unorm, BlendMode::Alpha)),
            (FullscreenOp::Convolve(Kernel::box_blur(3)), rgba),
            (FullscreenOp::Convolve(Kernel::gaussian(5, 1.0)), rgba),
            (FullscreenOp::Convolve(laplacian), rgba),
        ];
        for (op, target) in cases {
            testing::validate_program(&quad_descriptor(op, target).program);
        }
    }
}
