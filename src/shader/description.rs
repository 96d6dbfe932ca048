use super::{ShaderCode, VertexInput};
use crate::pipeline::PipelineKey;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Geometry,
    Fragment,
}

impl ShaderStage {
    fn struct_prefix(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Geometry => "geometry",
            ShaderStage::Fragment => "fragment",
        }
    }
}

/// A user-defined stage input or output, assigned `@location`s in declaration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IoVariable {
    pub name: String,
    pub ty: String,
    pub interpolation: Option<&'static str>,
}

/// A `@builtin(...)` stage input or output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuiltinVariable {
    pub builtin: String,
    pub name: String,
    pub ty: String,
}

/// One stage of a program under assembly.
///
/// Holds the mutable code plus everything needed to generate the stage's
/// input and output structs once every contributor has run.
#[derive(Clone, Debug)]
pub struct ShaderDescription {
    stage: ShaderStage,
    hash: PipelineKey,
    code: ShaderCode,
    outputs: Vec<IoVariable>,
    builtin_inputs: Vec<BuiltinVariable>,
    builtin_outputs: Vec<BuiltinVariable>,
    inputs: Vec<IoVariable>,
}

impl ShaderDescription {
    pub fn new(stage: ShaderStage, hash: PipelineKey, template: &str) -> Self {
        Self {
            stage,
            hash,
            code: ShaderCode::parse(template),
            outputs: Vec::new(),
            builtin_inputs: Vec::new(),
            builtin_outputs: Vec::new(),
            inputs: Vec::new(),
        }
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn hash(&self) -> &PipelineKey {
        &self.hash
    }

    pub fn code(&self) -> &ShaderCode {
        &self.code
    }

    pub fn code_mut(&mut self) -> &mut ShaderCode {
        &mut self.code
    }

    /// Shorthand for `code_mut().substitute(..)`.
    pub fn substitute<S: AsRef<str>>(&mut self, marker: &str, lines: &[S], all: bool) -> bool {
        self.code.substitute(marker, lines, all)
    }

    pub fn add_output(&mut self, ty: &str, name: &str) {
        self.push_output(ty, name, None);
    }

    /// Adds an output that is not interpolated (integer varyings).
    pub fn add_flat_output(&mut self, ty: &str, name: &str) {
        self.push_output(ty, name, Some("flat"));
    }

    fn push_output(&mut self, ty: &str, name: &str, interpolation: Option<&'static str>) {
        if self.has_output(name) {
            return;
        }
        self.outputs.push(IoVariable {
            name: name.to_string(),
            ty: ty.to_string(),
            interpolation,
        });
    }

    pub fn add_builtin_input(&mut self, ty: &str, name: &str, builtin: &str) {
        if self.builtin_inputs.iter().any(|b| b.name == name) {
            return;
        }
        self.builtin_inputs.push(BuiltinVariable {
            builtin: builtin.to_string(),
            name: name.to_string(),
            ty: ty.to_string(),
        });
    }

    pub fn add_builtin_output(&mut self, ty: &str, name: &str, builtin: &str) {
        if self.builtin_outputs.iter().any(|b| b.name == name) {
            return;
        }
        self.builtin_outputs.push(BuiltinVariable {
            builtin: builtin.to_string(),
            name: name.to_string(),
            ty: ty.to_string(),
        });
    }

    pub fn has_output(&self, name: &str) -> bool {
        self.outputs.iter().any(|o| o.name == name) || self.builtin_outputs.iter().any(|o| o.name == name)
    }

    pub fn outputs(&self) -> &[IoVariable] {
        &self.outputs
    }

    /// Inputs received from the previous stage; filled in by
    /// [`replace_io_structs`](Self::replace_io_structs).
    pub fn inputs(&self) -> &[IoVariable] {
        &self.inputs
    }

    /// Generates the stage's input and output structs and substitutes the
    /// `IOStructs` markers.
    ///
    /// The vertex stage reads its inputs from `vertex_input`; later stages take
    /// the non-builtin outputs of `previous` as their inputs, in the same
    /// locations.
    pub fn replace_io_structs(&mut self, vertex_input: Option<&VertexInput>, previous: Option<&ShaderDescription>) {
        let prefix = self.stage.struct_prefix();
        let mut input_lines: Vec<String> = Vec::new();

        if self.stage == ShaderStage::Vertex {
            if let Some(vertex_input) = vertex_input {
                input_lines.extend(vertex_input.shader_inputs());
            }
        } else if let Some(previous) = previous {
            self.inputs = previous.outputs.clone();
            input_lines.extend(location_lines(&self.inputs));
        }
        input_lines.extend(builtin_lines(&self.builtin_inputs));

        let mut output_lines = builtin_lines(&self.builtin_outputs);
        output_lines.extend(location_lines(&self.outputs));

        let mut dec: Vec<String> = Vec::new();
        if !input_lines.is_empty() {
            dec.push(format!("struct {}Input {{", prefix));
            dec.extend(input_lines.iter().cloned());
            dec.push("};".to_string());
        }
        if !output_lines.is_empty() {
            dec.push(format!("struct {}Output {{", prefix));
            dec.extend(output_lines);
            dec.push("};".to_string());
        }
        self.code.substitute("IOStructs::Dec", &dec, true);

        let input: Vec<String> = if input_lines.is_empty() {
            Vec::new()
        } else {
            vec![format!("  input : {}Input", prefix)]
        };
        self.code.substitute("IOStructs::Input", &input, true);

        let output: Vec<String> = if self.outputs.is_empty() && self.builtin_outputs.is_empty() {
            Vec::new()
        } else {
            vec![format!("-> {}Output", prefix)]
        };
        self.code.substitute("IOStructs::Output", &output, true);
    }

    /// Final source for the stage.
    pub fn finalize(&self) -> String {
        self.code.finalize()
    }
}

fn location_lines(vars: &[IoVariable]) -> Vec<String> {
    vars.iter()
        .enumerate()
        .map(|(i, v)| match v.interpolation {
            Some(interp) => format!("  @location({}) @interpolate({}) {} : {},", i, interp, v.name, v.ty),
            None => format!("  @location({}) {} : {},", i, v.name, v.ty),
        })
        .collect()
}

fn builtin_lines(vars: &[BuiltinVariable]) -> Vec<String> {
    vars.iter()
        .map(|b| format!("  @builtin({}) {} : {},", b.builtin, b.name, b.ty))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::{VertexFormat, VertexSemantic};

    const TEMPLATE: &str = "//TANDEM::IOStructs::Dec\nfn main(\n//TANDEM::IOStructs::Input\n)\n//TANDEM::IOStructs::Output\n{}\n";

    fn key() -> PipelineKey {
        PipelineKey::builder("Test").finish()
    }

    #[test]
    fn test_vertex_structs_follow_vertex_input() {
        let input = VertexInput::new()
            .with_attribute("vertexMC", VertexFormat::Float32x3, VertexSemantic::Position)
            .with_attribute("normalMC", VertexFormat::Float32x3, VertexSemantic::Normal);
        let mut vs = ShaderDescription::new(ShaderStage::Vertex, key(), TEMPLATE);
        vs.add_builtin_output("vec4<f32>", "Position", "position");
        vs.add_output("vec3<f32>", "normalVC");
        vs.replace_io_structs(Some(&input), None);

        let src = vs.finalize();
        assert!(src.contains("struct vertexInput {"));
        assert!(src.contains("@location(0) vertexMC : vec3<f32>,"));
        assert!(src.contains("@location(1) normalMC : vec3<f32>,"));
        assert!(src.contains("@builtin(position) Position : vec4<f32>,"));
        assert!(src.contains("@location(0) normalVC : vec3<f32>,"));
        assert!(src.contains("input : vertexInput"));
        assert!(src.contains("-> vertexOutput"));
    }

    #[test]
    fn test_fragment_inputs_are_vertex_outputs() {
        let mut vs = ShaderDescription::new(ShaderStage::Vertex, key(), TEMPLATE);
        vs.add_builtin_output("vec4<f32>", "Position", "position");
        vs.add_output("vec2<f32>", "tcoordVS");

        let mut fs = ShaderDescription::new(ShaderStage::Fragment, key(), TEMPLATE);
        fs.add_builtin_input("vec4<f32>", "fragPos", "position");
        fs.add_output("vec4<f32>", "outColor");
        fs.replace_io_structs(None, Some(&vs));

        let src = fs.finalize();
        assert_eq!(fs.inputs().len(), 1);
        assert!(src.contains("@location(0) tcoordVS : vec2<f32>,"));
        assert!(src.contains("@builtin(position) fragPos : vec4<f32>,"));
        assert!(!src.contains("Position :"));
        assert!(src.contains("-> fragmentOutput"));
    }

    #[test]
    fn test_empty_input_struct_is_omitted() {
        let mut fs = ShaderDescription::new(ShaderStage::Fragment, key(), TEMPLATE);
        fs.add_output("vec4<f32>", "outColor");
        fs.replace_io_structs(None, None);
        let src = fs.finalize();
        assert!(!src.contains("fragmentInput"));
        assert!(src.contains("fn main(\n\n)"));
    }

    #[test]
    fn test_duplicate_outputs_are_ignored() {
        let mut vs = ShaderDescription::new(ShaderStage::Vertex, key(), TEMPLATE);
        vs.add_output("vec3<f32>", "normalVC");
        vs.add_output("vec3<f32>", "normalVC");
        assert_eq!(vs.outputs().len(), 1);
    }
}
