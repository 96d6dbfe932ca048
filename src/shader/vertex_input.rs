/// Vertex attribute formats a mapper can upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32x2,
    Float32x3,
    Float32x4,
    Unorm8x4,
}

impl VertexFormat {
    pub fn size(self) -> u64 {
        match self {
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
            VertexFormat::Unorm8x4 => 4,
        }
    }

    pub fn wgsl_type(self) -> &'static str {
        match self {
            VertexFormat::Float32x2 => "vec2<f32>",
            VertexFormat::Float32x3 => "vec3<f32>",
            VertexFormat::Float32x4 | VertexFormat::Unorm8x4 => "vec4<f32>",
        }
    }
}

/// What an attribute means to a fixed-function device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexSemantic {
    Position,
    Normal,
    Color,
    TCoord,
    /// Imposter corner `(x, y)` in `[-1, 1]` plus the radius in `z`.
    Offset,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub name: String,
    pub format: VertexFormat,
    pub semantic: VertexSemantic,
}

/// The vertex buffers a draw provides, one attribute per buffer.
///
/// Attribute `i` is read from vertex buffer slot `i` at `@location(i)`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct VertexInput {
    attributes: Vec<VertexAttribute>,
}

impl VertexInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_attribute(&mut self, name: &str, format: VertexFormat, semantic: VertexSemantic) -> u32 {
        self.attributes.push(VertexAttribute {
            name: name.to_string(),
            format,
            semantic,
        });
        (self.attributes.len() - 1) as u32
    }

    pub fn with_attribute(mut self, name: &str, format: VertexFormat, semantic: VertexSemantic) -> Self {
        self.add_attribute(name, format, semantic);
        self
    }

    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    pub fn location(&self, name: &str) -> Option<u32> {
        self.attributes.iter().position(|a| a.name == name).map(|i| i as u32)
    }

    pub fn has(&self, semantic: VertexSemantic) -> bool {
        self.attributes.iter().any(|a| a.semantic == semantic)
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// `@location(i) name : type` lines for the vertex input struct.
    pub fn shader_inputs(&self) -> Vec<String> {
        self.attributes
            .iter()
            .enumerate()
            .map(|(i, a)| format!("  @location({}) {} : {},", i, a.name, a.format.wgsl_type()))
            .collect()
    }
}
