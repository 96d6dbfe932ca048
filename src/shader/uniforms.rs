//! Uniform blocks shared by mapper programs.
//!
//! Rust and WGSL layouts must match field for field. Every member is a
//! `vec4` or `mat4x4`, so the uniform address space adds no padding.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

pub const MAX_LIGHTS: usize = 4;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct LightUniform {
    /// Direction the light travels, in view coordinates.
    pub direction_vc: [f32; 4],
    pub color: [f32; 4],
}

/// Per-renderer block at `@group(0) @binding(0)`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct RendererUniforms {
    pub wcvc: [[f32; 4]; 4],
    pub vcpc: [[f32; 4]; 4],
    pub wcpc: [[f32; 4]; 4],
    /// x, y, width, height in pixels.
    pub viewport: [f32; 4],
    pub lights: [LightUniform; MAX_LIGHTS],
    pub light_count: [u32; 4],
}

impl RendererUniforms {
    pub fn new(view: Mat4, projection: Mat4, viewport: [f32; 4]) -> Self {
        Self {
            wcvc: view.to_cols_array_2d(),
            vcpc: projection.to_cols_array_2d(),
            wcpc: (projection * view).to_cols_array_2d(),
            viewport,
            lights: [LightUniform::default(); MAX_LIGHTS],
            light_count: [0; 4],
        }
    }

    /// Appends a light; lights beyond [`MAX_LIGHTS`] are ignored.
    pub fn push_light(&mut self, direction_vc: Vec3, color: Vec3) -> bool {
        let count = self.light_count[0] as usize;
        if count >= MAX_LIGHTS {
            return false;
        }
        self.lights[count] = LightUniform {
            direction_vc: direction_vc.normalize_or_zero().extend(0.0).to_array(),
            color: color.extend(1.0).to_array(),
        };
        self.light_count[0] += 1;
        true
    }

    pub fn wcpc_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.wcpc)
    }

    pub fn wcvc_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.wcvc)
    }

    pub fn vcpc_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.vcpc)
    }

    /// Parallel projections keep `w` at 1, perspective ones zero `vcpc[3][3]`.
    pub fn is_parallel(&self) -> bool {
        self.vcpc[3][3] != 0.0
    }
}

impl Default for RendererUniforms {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY, [0.0; 4])
    }
}

/// Per-draw block at `@group(1) @binding(0)`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MapperUniforms {
    pub mcwc: [[f32; 4]; 4],
    /// Transforms model-coordinate normals to view coordinates.
    pub normal_matrix: [[f32; 4]; 4],
    pub ambient_color: [f32; 4],
    pub diffuse_color: [f32; 4],
    /// ambient, diffuse, opacity, unused
    pub coefficients: [f32; 4],
    /// prop id, composite id, unused, unused
    pub ids: [u32; 4],
}

impl MapperUniforms {
    pub fn mcwc_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.mcwc)
    }

    pub fn opacity(&self) -> f32 {
        self.coefficients[2]
    }
}

impl Default for MapperUniforms {
    fn default() -> Self {
        Self {
            mcwc: Mat4::IDENTITY.to_cols_array_2d(),
            normal_matrix: Mat4::IDENTITY.to_cols_array_2d(),
            ambient_color: [1.0; 4],
            diffuse_color: [1.0; 4],
            coefficients: [0.0, 1.0, 1.0, 0.0],
            ids: [0; 4],
        }
    }
}

pub const RENDERER_UBO_WGSL: &str = "struct LightUniform {
  directionVC : vec4<f32>,
  color : vec4<f32>,
};
struct RendererUBO {
  WCVCMatrix : mat4x4<f32>,
  VCPCMatrix : mat4x4<f32>,
  WCPCMatrix : mat4x4<f32>,
  viewport : vec4<f32>,
  lights : array<LightUniform, 4>,
  lightCount : vec4<u32>,
};
@group(0) @binding(0) var<uniform> rendererUBO : RendererUBO;";

pub const MAPPER_UBO_WGSL: &str = "struct MapperUBO {
  MCWCMatrix : mat4x4<f32>,
  normalMatrix : mat4x4<f32>,
  AmbientColor : vec4<f32>,
  DiffuseColor : vec4<f32>,
  Ambient : f32,
  Diffuse : f32,
  Opacity : f32,
  pad0 : f32,
  PropID : u32,
  CompositeID : u32,
  pad1 : u32,
  pad2 : u32,
};
@group(1) @binding(0) var<uniform> mapperUBO : MapperUBO;";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_sizes_match_wgsl_layout() {
        assert_eq!(std::mem::size_of::<LightUniform>(), 32);
        assert_eq!(std::mem::size_of::<RendererUniforms>(), 64 * 3 + 16 + 32 * MAX_LIGHTS + 16);
        assert_eq!(std::mem::size_of::<MapperUniforms>(), 192);
    }

    #[test]
    fn test_push_light_caps_at_max() {
        let mut uniforms = RendererUniforms::default();
        for _ in 0..MAX_LIGHTS {
            assert!(uniforms.push_light(Vec3::NEG_Z, Vec3::ONE));
        }
        assert!(!uniforms.push_light(Vec3::NEG_Z, Vec3::ONE));
        assert_eq!(uniforms.light_count[0] as usize, MAX_LIGHTS);
        assert_eq!(uniforms.lights[0].direction_vc, [0.0, 0.0, -1.0, 0.0]);
    }
}
