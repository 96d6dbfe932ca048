/// Texel formats understood by both backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba16Float,
    R16Float,
    R32Float,
    Rgba32Uint,
    Depth32Float,
}

impl TextureFormat {
    pub fn is_depth(self) -> bool {
        matches!(self, TextureFormat::Depth32Float)
    }

    pub fn is_uint(self) -> bool {
        matches!(self, TextureFormat::Rgba32Uint)
    }

    /// Number of channels a shader sees when it reads this format.
    pub fn components(self) -> usize {
        match self {
            TextureFormat::R16Float | TextureFormat::R32Float | TextureFormat::Depth32Float => 1,
            _ => 4,
        }
    }

    pub fn bytes_per_texel(self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm => 4,
            TextureFormat::Rgba16Float => 8,
            TextureFormat::R16Float => 2,
            TextureFormat::R32Float | TextureFormat::Depth32Float => 4,
            TextureFormat::Rgba32Uint => 16,
        }
    }

    /// Whether [`Device::read_pixels`](super::Device::read_pixels) supports the format.
    pub fn is_readable(self) -> bool {
        matches!(
            self,
            TextureFormat::Rgba8Unorm
                | TextureFormat::Rgba32Uint
                | TextureFormat::R32Float
                | TextureFormat::Depth32Float
        )
    }

    /// The WGSL type produced by a fragment output targeting this format.
    pub fn wgsl_output_type(self) -> &'static str {
        match self {
            TextureFormat::Rgba32Uint => "vec4<u32>",
            TextureFormat::R16Float | TextureFormat::R32Float => "f32",
            _ => "vec4<f32>",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_and_uint_flags() {
        assert!(TextureFormat::Depth32Float.is_depth());
        assert!(!TextureFormat::Rgba8Unorm.is_depth());
        assert!(TextureFormat::Rgba32Uint.is_uint());
        assert_eq!(TextureFormat::R16Float.components(), 1);
        assert_eq!(TextureFormat::Rgba32Uint.wgsl_output_type(), "vec4<u32>");
    }
}
