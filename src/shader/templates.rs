//! Built-in WGSL templates.

/// Vertex template for surface mappers.
pub const SURFACE_VS: &str = "//TANDEM::Renderer::Dec

//TANDEM::Mapper::Dec

//TANDEM::IOStructs::Dec

@vertex
fn main(
//TANDEM::IOStructs::Input
)
//TANDEM::IOStructs::Output
{
  var output : vertexOutput;
  //TANDEM::Color::Impl
  //TANDEM::Normal::Impl
  //TANDEM::TCoord::Impl
  //TANDEM::Position::Impl
  return output;
}
";

/// Fragment template for surface mappers.
pub const SURFACE_FS: &str = "//TANDEM::Renderer::Dec

//TANDEM::Mapper::Dec

//TANDEM::Normal::Dec

//TANDEM::TCoord::Dec

//TANDEM::RenderEncoder::Dec

//TANDEM::IOStructs::Dec

@fragment
fn main(
//TANDEM::IOStructs::Input
)
//TANDEM::IOStructs::Output
{
  var output : fragmentOutput;
  //TANDEM::Color::Impl
  //TANDEM::Normal::Impl
  //TANDEM::Light::Impl
  //TANDEM::TCoord::Impl
  //TANDEM::RenderEncoder::Impl
  return output;
}
";

/// Vertex template for full-screen passes: one oversized triangle.
pub const QUAD_VS: &str = "//TANDEM::IOStructs::Dec

@vertex
fn main(
//TANDEM::IOStructs::Input
)
//TANDEM::IOStructs::Output
{
  var output : vertexOutput;
  var corners = array<vec2<f32>, 3>(
    vec2<f32>(-1.0, -1.0),
    vec2<f32>(3.0, -1.0),
    vec2<f32>(-1.0, 3.0),
  );
  output.Position = vec4<f32>(corners[input.vertexIndex], 0.0, 1.0);
  return output;
}
";

/// Fragment template for full-screen passes.
pub const QUAD_FS: &str = "//TANDEM::FSQ::Dec

//TANDEM::IOStructs::Dec

@fragment
fn main(
//TANDEM::IOStructs::Input
)
//TANDEM::IOStructs::Output
{
  var output : fragmentOutput;
  //TANDEM::FSQ::Impl
  return output;
}
";
