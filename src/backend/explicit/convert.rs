//! Translation of crate-level state descriptions into `wgpu` types.

use crate::pipeline::{BindingType, BlendMode, CompareFunction, SampleKind, Topology};
use crate::resource::{LoadOp, TextureFormat};
use crate::shader::VertexFormat;

pub fn texture_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TextureFormat::R16Float => wgpu::TextureFormat::R16Float,
        TextureFormat::R32Float => wgpu::TextureFormat::R32Float,
        TextureFormat::Rgba32Uint => wgpu::TextureFormat::Rgba32Uint,
        TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
    }
}

pub fn vertex_format(format: VertexFormat) -> wgpu::VertexFormat {
    match format {
        VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
        VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
        VertexFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
        VertexFormat::Unorm8x4 => wgpu::VertexFormat::Unorm8x4,
    }
}

pub fn topology(topology: Topology) -> wgpu::PrimitiveTopology {
    match topology {
        Topology::PointList => wgpu::PrimitiveTopology::PointList,
        Topology::LineList => wgpu::PrimitiveTopology::LineList,
        Topology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
    }
}

pub fn compare(compare: CompareFunction) -> wgpu::CompareFunction {
    match compare {
        CompareFunction::Less => wgpu::CompareFunction::Less,
        CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunction::Always => wgpu::CompareFunction::Always,
    }
}

/// `None` disables blending, which unsigned targets require.
pub fn blend_state(blend: BlendMode) -> Option<wgpu::BlendState> {
    let component = |src_factor, dst_factor| wgpu::BlendComponent {
        src_factor,
        dst_factor,
        operation: wgpu::BlendOperation::Add,
    };
    match blend {
        BlendMode::Replace => None,
        BlendMode::Alpha => Some(wgpu::BlendState::ALPHA_BLENDING),
        BlendMode::Additive => {
            let add = component(wgpu::BlendFactor::One, wgpu::BlendFactor::One);
            Some(wgpu::BlendState {
                color: add,
                alpha: add,
            })
        }
        BlendMode::Reveal => {
            let reveal = component(wgpu::BlendFactor::Zero, wgpu::BlendFactor::OneMinusSrc);
            Some(wgpu::BlendState {
                color: reveal,
                alpha: reveal,
            })
        }
    }
}

pub fn binding_type(ty: BindingType) -> wgpu::BindingType {
    match ty {
        BindingType::Uniform => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        BindingType::Texture(kind) => wgpu::BindingType::Texture {
            sample_type: match kind {
                SampleKind::Float => wgpu::TextureSampleType::Float { filterable: true },
                SampleKind::UnfilterableFloat => wgpu::TextureSampleType::Float { filterable: false },
                SampleKind::Uint => wgpu::TextureSampleType::Uint,
                SampleKind::Depth => wgpu::TextureSampleType::Depth,
            },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        BindingType::Sampler => wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
    }
}

pub fn color_load(op: LoadOp<[f32; 4]>) -> wgpu::LoadOp<wgpu::Color> {
    match op {
        LoadOp::Clear([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
            r: r as f64,
            g: g as f64,
            b: b as f64,
            a: a as f64,
        }),
        LoadOp::Load => wgpu::LoadOp::Load,
    }
}

pub fn depth_load(op: LoadOp<f32>) -> wgpu::LoadOp<f32> {
    match op {
        LoadOp::Clear(depth) => wgpu::LoadOp::Clear(depth),
        LoadOp::Load => wgpu::LoadOp::Load,
    }
}

/// Row pitch of a texture-to-buffer copy, padded to the copy alignment.
pub fn padded_bytes_per_row(width: u32, format: TextureFormat) -> u32 {
    let unpadded = width * format.bytes_per_texel();
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_rows() {
        assert_eq!(padded_bytes_per_row(1, TextureFormat::Rgba8Unorm), 256);
        assert_eq!(padded_bytes_per_row(64, TextureFormat::Rgba8Unorm), 256);
        assert_eq!(padded_bytes_per_row(65, TextureFormat::Rgba8Unorm), 512);
        assert_eq!(padded_bytes_per_row(16, TextureFormat::Rgba32Uint), 256);
    }

    #[test]
    fn test_replace_disables_blending() {
        assert!(blend_state(BlendMode::Replace).is_none());
        assert_eq!(blend_state(BlendMode::Alpha), Some(wgpu::BlendState::ALPHA_BLENDING));
    }
}
