//! Sphere imposter defaults.
//!
//! A sphere program draws one camera-facing quad per point. The vertex stage
//! spreads the four corners around the projected center; the fragment stage
//! casts a ray through each pixel, discards it when it misses the sphere and
//! otherwise writes the hit's normal and depth. Both go through the
//! mapper-owned `Normal` and `Position` groups on the surface templates.

use super::surface::mapper_replacements;
use super::{Contributor, ShaderReplacements};
use crate::pipeline::SurfaceShading;

/// Corner in `xy`, radius in `z`.
pub const OFFSET_ATTRIBUTE: &str = "offsetMC";

/// Corner placement in view coordinates. Perspective quads face the eye and
/// are widened to the silhouette cone.
const SPHERE_POSITION: &[&str] = &[
    "let centerVC = rendererUBO.WCVCMatrix * mapperUBO.MCWCMatrix * vec4<f32>(input.vertexMC, 1.0);",
    "  let radius = input.offsetMC.z;",
    "  var corner = vec3<f32>(centerVC.xy + input.offsetMC.xy * radius, centerVC.z);",
    "  if (rendererUBO.VCPCMatrix[3][3] == 0.0) {",
    "    let eyeDistance = length(centerVC.xyz);",
    "    let dir = -centerVC.xyz / eyeDistance;",
    "    let up = select(vec3<f32>(1.0, 0.0, 0.0), vec3<f32>(0.0, 1.0, 0.0), abs(dir.y) < 0.99);",
    "    let right = normalize(cross(up, dir));",
    "    let top = cross(dir, right);",
    "    let spread = radius * eyeDistance / sqrt(max(eyeDistance * eyeDistance - radius * radius, 0.000001));",
    "    corner = centerVC.xyz + (input.offsetMC.x * right + input.offsetMC.y * top) * spread;",
    "  }",
    "  output.vertexVC = corner;",
    "  output.centerVC = centerVC.xyz;",
    "  output.radiusVC = radius;",
    "  output.Position = rendererUBO.VCPCMatrix * vec4<f32>(corner, 1.0);",
];

/// Ray and unit sphere intersection; sets `normal` and the fragment depth.
const SPHERE_NORMAL: &[&str] = &[
    "var eyePos = vec3<f32>(0.0, 0.0, 0.0);",
    "  var eyeDir = normalize(input.vertexVC);",
    "  if (rendererUBO.VCPCMatrix[3][3] != 0.0) {",
    "    eyePos = vec3<f32>(input.vertexVC.xy, input.vertexVC.z + 3.0 * input.radiusVC);",
    "    eyeDir = vec3<f32>(0.0, 0.0, -1.0);",
    "  }",
    "  eyePos = (eyePos - input.centerVC) / input.radiusVC;",
    "  let b = 2.0 * dot(eyePos, eyeDir);",
    "  let c = dot(eyePos, eyePos) - 1.0;",
    "  let d = b * b - 4.0 * c;",
    "  if (d < 0.0) { discard; }",
    "  let t = (-b - sqrt(max(d, 0.0))) * 0.5;",
    "  normal = normalize(eyePos + t * eyeDir);",
    "  let hitPC = rendererUBO.VCPCMatrix * vec4<f32>(normal * input.radiusVC + input.centerVC, 1.0);",
    "  output.fragDepth = hitPC.z / hitPC.w;",
];

/// The surface mapper defaults with `Normal` and `Position` replaced by the
/// imposter stages.
pub fn sphere_replacements(shading: SurfaceShading) -> ShaderReplacements {
    let mut set = mapper_replacements(shading);

    set.set_default(Contributor::Mapper, "Normal", |ctx| {
        ctx.vertex().add_output("vec3<f32>", "vertexVC");
        ctx.vertex().add_output("vec3<f32>", "centerVC");
        ctx.vertex().add_output("f32", "radiusVC");
        ctx.fragment().add_builtin_output("f32", "fragDepth", "frag_depth");
        ctx.fragment().substitute(
            "Normal::Dec",
            &["var<private> normal : vec3<f32> = vec3<f32>(0.0, 0.0, 1.0);"],
            true,
        );
        ctx.fragment().substitute("Normal::Impl", SPHERE_NORMAL, true);
    });

    set.set_default(Contributor::Mapper, "Position", |ctx| {
        ctx.vertex().add_builtin_output("vec4<f32>", "Position", "position");
        ctx.vertex().substitute("Position::Impl", SPHERE_POSITION, true);
    });

    set
}
