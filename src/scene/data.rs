//! Data handed to mappers, ready for upload.

use glam::{Vec2, Vec3};

/// Points and cells of one polygonal block.
///
/// Cell arrays index into the point arrays. Optional point arrays must either
/// be empty or have one entry per position.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PolyData {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    /// RGBA8 per point.
    pub colors: Vec<[u8; 4]>,
    pub tcoords: Vec<Vec2>,
    pub verts: Vec<u32>,
    pub lines: Vec<[u32; 2]>,
    pub triangles: Vec<[u32; 3]>,
}

impl PolyData {
    pub fn new(positions: Vec<Vec3>) -> Self {
        Self {
            positions,
            ..Default::default()
        }
    }

    pub fn with_triangles(mut self, triangles: Vec<[u32; 3]>) -> Self {
        self.triangles = triangles;
        self
    }

    pub fn with_lines(mut self, lines: Vec<[u32; 2]>) -> Self {
        self.lines = lines;
        self
    }

    pub fn with_verts(mut self, verts: Vec<u32>) -> Self {
        self.verts = verts;
        self
    }

    pub fn with_normals(mut self, normals: Vec<Vec3>) -> Self {
        self.normals = normals;
        self
    }

    pub fn with_colors(mut self, colors: Vec<[u8; 4]>) -> Self {
        self.colors = colors;
        self
    }

    pub fn with_tcoords(mut self, tcoords: Vec<Vec2>) -> Self {
        self.tcoords = tcoords;
        self
    }

    /// An axis-aligned quad in the z = `z` plane with +Z normals and unit
    /// texture coordinates.
    pub fn quad(min: Vec2, max: Vec2, z: f32) -> Self {
        PolyData::new(vec![
            Vec3::new(min.x, min.y, z),
            Vec3::new(max.x, min.y, z),
            Vec3::new(max.x, max.y, z),
            Vec3::new(min.x, max.y, z),
        ])
        .with_normals(vec![Vec3::Z; 4])
        .with_tcoords(vec![
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 0.0),
        ])
        .with_triangles(vec![[0, 1, 2], [0, 2, 3]])
    }

    /// The twelve triangles of an axis-aligned box.
    pub fn cuboid(min: Vec3, max: Vec3) -> Self {
        let corners = (0..8)
            .map(|i| {
                Vec3::new(
                    if i & 1 == 0 { min.x } else { max.x },
                    if i & 2 == 0 { min.y } else { max.y },
                    if i & 4 == 0 { min.z } else { max.z },
                )
            })
            .collect();
        PolyData::new(corners).with_triangles(vec![
            [0, 2, 1],
            [1, 2, 3],
            [4, 5, 6],
            [5, 7, 6],
            [0, 1, 4],
            [1, 5, 4],
            [2, 6, 3],
            [3, 6, 7],
            [0, 4, 2],
            [2, 4, 6],
            [1, 3, 5],
            [3, 7, 5],
        ])
    }

    pub fn point_count(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verts.is_empty() && self.lines.is_empty() && self.triangles.is_empty()
    }

    pub fn has_normals(&self) -> bool {
        !self.normals.is_empty() && self.normals.len() == self.positions.len()
    }

    pub fn has_colors(&self) -> bool {
        !self.colors.is_empty() && self.colors.len() == self.positions.len()
    }

    pub fn has_tcoords(&self) -> bool {
        !self.tcoords.is_empty() && self.tcoords.len() == self.positions.len()
    }

    /// Axis-aligned bounds, `None` when there are no points.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.positions.first()?;
        Some(
            self.positions
                .iter()
                .fold((first, first), |(lo, hi), p| (lo.min(*p), hi.max(*p))),
        )
    }
}

/// RGBA8 pixels, rows top to bottom.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl ImageData {
    /// Returns `None` unless `pixels` holds exactly `width * height` texels.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        if pixels.len() != (width as usize) * (height as usize) * 4 {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba.repeat((width * height) as usize);
        Self {
            width,
            height,
            pixels,
        }
    }
}

impl From<image::RgbaImage> for ImageData {
    fn from(img: image::RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            pixels: img.into_raw(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_bounds_and_arrays() {
        let quad = PolyData::quad(Vec2::splat(-1.0), Vec2::splat(1.0), 0.5);
        assert_eq!(quad.point_count(), 4);
        assert!(quad.has_normals() && quad.has_tcoords());
        assert!(!quad.has_colors());
        assert_eq!(
            quad.bounds(),
            Some((Vec3::new(-1.0, -1.0, 0.5), Vec3::new(1.0, 1.0, 0.5)))
        );
    }

    #[test]
    fn test_image_size_checked() {
        assert!(ImageData::new(2, 2, vec![0; 16]).is_some());
        assert!(ImageData::new(2, 2, vec![0; 15]).is_none());
        let img = image::RgbaImage::from_pixel(3, 1, image::Rgba([1, 2, 3, 4]));
        let data = ImageData::from(img);
        assert_eq!(data.pixels.len(), 12);
        assert_eq!(&data.pixels[..4], &[1, 2, 3, 4]);
    }
}
