//! Components attached to renderable entities.

use glam::{Mat4, Quat, Vec3};

use super::{ImageData, PolyData};
use hecs::Entity;

/// Tree links. Every renderable except the root has a parent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Node {
    pub parent: Option<Entity>,
    pub children: Vec<Entity>,
}

/// Position, orientation and scale of a prop in world coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn uniform_scale(mut self, scale: f32) -> Self {
        self.scale = Vec3::splat(scale);
        self
    }

    /// Scale, then rotate, then translate.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

/// A rectangular region of the window drawn from one camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Renderer {
    /// Normalized `[xmin, ymin, xmax, ymax]`, origin at the bottom-left.
    pub viewport: [f32; 4],
    /// Add a headlight when the renderer has no lights of its own.
    pub automatic_light: bool,
}

impl Default for Renderer {
    fn default() -> Self {
        Self {
            viewport: [0.0, 0.0, 1.0, 1.0],
            automatic_light: true,
        }
    }
}

impl Renderer {
    pub fn viewport(mut self, viewport: [f32; 4]) -> Self {
        self.viewport = viewport;
        self
    }

    pub fn automatic_light(mut self, enabled: bool) -> Self {
        self.automatic_light = enabled;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub focal_point: Vec3,
    pub view_up: Vec3,
    /// Vertical field of view in degrees.
    pub view_angle: f32,
    /// Near and far clipping distances.
    pub clipping_range: [f32; 2],
    pub parallel_projection: bool,
    /// Half the viewport height in world units, for parallel projection.
    pub parallel_scale: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 1.0),
            focal_point: Vec3::ZERO,
            view_up: Vec3::Y,
            view_angle: 30.0,
            clipping_range: [0.01, 1000.01],
            parallel_projection: false,
            parallel_scale: 1.0,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn looking_at(mut self, focal_point: Vec3) -> Self {
        self.focal_point = focal_point;
        self
    }

    pub fn clipping_range(mut self, near: f32, far: f32) -> Self {
        self.clipping_range = [near, far];
        self
    }

    pub fn parallel(mut self, scale: f32) -> Self {
        self.parallel_projection = true;
        self.parallel_scale = scale;
        self
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.focal_point, self.view_up)
    }

    /// Projection into clip space with depth in `[0, 1]`.
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        let [near, far] = self.clipping_range;
        if self.parallel_projection {
            let h = self.parallel_scale;
            let w = h * aspect;
            Mat4::orthographic_rh(-w, w, -h, h, near, far)
        } else {
            Mat4::perspective_rh(self.view_angle.to_radians(), aspect, near, far)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Light {
    pub color: Vec3,
    pub intensity: f32,
    /// Direction the light travels, in world coordinates.
    pub direction: Vec3,
    /// A camera light always shines along the view direction.
    pub camera_light: bool,
    pub switch: bool,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            intensity: 1.0,
            direction: Vec3::NEG_Z,
            camera_light: false,
            switch: true,
        }
    }
}

impl Light {
    pub fn headlight() -> Self {
        Self {
            camera_light: true,
            ..Self::default()
        }
    }

    pub fn directional(direction: Vec3) -> Self {
        Self {
            direction,
            ..Self::default()
        }
    }

    /// Direction in view coordinates for a camera with `view` as its matrix.
    pub fn direction_vc(&self, view: Mat4) -> Vec3 {
        if self.camera_light {
            Vec3::NEG_Z
        } else {
            view.transform_vector3(self.direction)
        }
    }
}

/// State shared by actors, volumes and image slices.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Prop {
    pub visible: bool,
    pub pickable: bool,
    pub transform: Transform,
}

impl Default for Prop {
    fn default() -> Self {
        Self {
            visible: true,
            pickable: true,
            transform: Transform::default(),
        }
    }
}

impl Prop {
    pub fn with_transform(transform: Transform) -> Self {
        Self {
            transform,
            ..Self::default()
        }
    }
}

/// Surface appearance of an actor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Property {
    pub ambient: f32,
    pub diffuse: f32,
    pub ambient_color: Vec3,
    pub diffuse_color: Vec3,
    pub opacity: f32,
    pub lighting: bool,
}

impl Default for Property {
    fn default() -> Self {
        Self {
            ambient: 0.0,
            diffuse: 1.0,
            ambient_color: Vec3::ONE,
            diffuse_color: Vec3::ONE,
            opacity: 1.0,
            lighting: true,
        }
    }
}

impl Property {
    pub fn color(mut self, color: Vec3) -> Self {
        self.ambient_color = color;
        self.diffuse_color = color;
        self
    }

    pub fn opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn unlit(mut self) -> Self {
        self.lighting = false;
        self
    }

    pub fn is_translucent(&self) -> bool {
        self.opacity < 1.0
    }
}

/// Polygonal blocks drawn by one actor. A block's index is its composite id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PolyMapper {
    pub blocks: Vec<PolyData>,
    /// Color points by their RGBA array when present.
    pub scalar_visibility: bool,
}

impl PolyMapper {
    pub fn new(data: PolyData) -> Self {
        Self {
            blocks: vec![data],
            scalar_visibility: true,
        }
    }

    pub fn composite(blocks: Vec<PolyData>) -> Self {
        Self {
            blocks,
            scalar_visibility: true,
        }
    }

    /// Union of every block's bounds.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        self.blocks
            .iter()
            .filter_map(PolyData::bounds)
            .reduce(|(a0, a1), (b0, b1)| (a0.min(b0), a1.max(b1)))
    }
}

/// Points drawn as shaded spheres, one camera-facing quad per point.
///
/// Radii are in view units: the prop transform moves the centers but does
/// not scale the spheres.
#[derive(Clone, Debug, PartialEq)]
pub struct SphereMapper {
    pub centers: Vec<Vec3>,
    /// Radius of every point without an entry in `radii`.
    pub radius: f32,
    pub radii: Vec<f32>,
    /// One RGBA color per center, used while `scalar_visibility` is set.
    pub colors: Vec<[u8; 4]>,
    pub scalar_visibility: bool,
}

impl SphereMapper {
    pub fn new(centers: Vec<Vec3>, radius: f32) -> Self {
        Self {
            centers,
            radius,
            radii: Vec::new(),
            colors: Vec::new(),
            scalar_visibility: true,
        }
    }

    pub fn radii(mut self, radii: Vec<f32>) -> Self {
        self.radii = radii;
        self
    }

    pub fn colors(mut self, colors: Vec<[u8; 4]>) -> Self {
        self.colors = colors;
        self
    }

    /// Radius of point `index`.
    pub fn radius_of(&self, index: usize) -> f32 {
        self.radii.get(index).copied().unwrap_or(self.radius)
    }

    pub fn has_colors(&self) -> bool {
        !self.colors.is_empty() && self.colors.len() == self.centers.len()
    }

    /// Bounds of every sphere, radii included.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        self.centers
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let r = Vec3::splat(self.radius_of(i).abs());
                (*c - r, *c + r)
            })
            .reduce(|(a0, a1), (b0, b1)| (a0.min(b0), a1.max(b1)))
    }
}

/// Draws an image as a textured quad in the z = `origin.z` plane.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageMapper {
    pub image: ImageData,
    pub origin: Vec3,
    /// World size of one pixel along x and y.
    pub spacing: [f32; 2],
}

impl ImageMapper {
    pub fn new(image: ImageData) -> Self {
        Self {
            image,
            origin: Vec3::ZERO,
            spacing: [1.0, 1.0],
        }
    }

    pub fn origin(mut self, origin: Vec3) -> Self {
        self.origin = origin;
        self
    }

    pub fn spacing(mut self, spacing: [f32; 2]) -> Self {
        self.spacing = spacing;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImageProperty {
    pub opacity: f32,
}

impl Default for ImageProperty {
    fn default() -> Self {
        Self { opacity: 1.0 }
    }
}

/// A volume drawn as its translucent bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VolumeMapper {
    pub bounds: (Vec3, Vec3),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VolumeProperty {
    pub color: Vec3,
    pub opacity: f32,
}

impl Default for VolumeProperty {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            opacity: 0.3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_projects_focal_point_to_center() {
        let camera = Camera::new().at(Vec3::new(0.0, 0.0, 5.0)).clipping_range(1.0, 10.0);
        let clip = camera.projection_matrix(1.0) * camera.view_matrix() * Vec3::ZERO.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-6 && ndc.y.abs() < 1e-6);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn test_headlight_ignores_view() {
        let view = Mat4::from_rotation_y(1.0);
        assert_eq!(Light::headlight().direction_vc(view), Vec3::NEG_Z);
        let light = Light::directional(Vec3::NEG_Z);
        assert!((light.direction_vc(Mat4::IDENTITY) - Vec3::NEG_Z).length() < 1e-6);
    }

    #[test]
    fn test_mapper_bounds_cover_blocks() {
        let mapper = PolyMapper::composite(vec![
            PolyData::new(vec![Vec3::ZERO]),
            PolyData::new(vec![Vec3::new(2.0, -1.0, 3.0)]),
        ]);
        assert_eq!(mapper.bounds(), Some((Vec3::new(0.0, -1.0, 0.0), Vec3::new(2.0, 0.0, 3.0))));
    }
}
