//! Hardware picking.
//!
//! The selector renders pickable props offscreen with their ids as color,
//! reads back the id and depth texels around the cursor and maps the nearest
//! hit back to its prop. Pixel coordinates have their origin at the top-left
//! of the window.

use fxhash::FxHashMap;

use crate::error::{RenderError, RenderResult};
use crate::passes::{HardwareSelectionPass, RenderPass};
use crate::resource::{PixelData, PixelRect};
use crate::scene::{Entity, Scene};
use crate::window::RenderWindow;

/// The prop under a picked pixel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PickInfo {
    pub prop: Entity,
    pub prop_id: u32,
    /// Block of a composite mapper, 0 for plain mappers.
    pub composite_id: u32,
    /// Window depth of the hit in `[0, 1]`.
    pub depth: f32,
    /// Pixel the hit was found at, which may differ from the requested one
    /// by up to the tolerance.
    pub position: (u32, u32),
}

/// One distinct prop and block seen in a selected area.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelectionHit {
    pub prop: Entity,
    pub prop_id: u32,
    pub composite_id: u32,
    pub pixel_count: usize,
}

/// Ids and depths read back for one area.
struct IdBuffer {
    area: PixelRect,
    // Four words per pixel: encoded prop id, composite id, 0, encoded prop id.
    ids: Vec<u32>,
    depth: Vec<f32>,
    pickables: FxHashMap<u32, Entity>,
}

impl IdBuffer {
    /// The hit at window pixel `(x, y)`, if a pickable prop covers it.
    fn hit(&self, x: u32, y: u32) -> Option<PickInfo> {
        if !self.area.contains(x, y) {
            return None;
        }
        let index = ((y - self.area.y) * self.area.width + (x - self.area.x)) as usize;
        let texel = self.ids.get(index * 4..index * 4 + 4)?;
        if texel[0] == 0 {
            return None;
        }
        let prop_id = texel[0] - 1;
        let prop = *self.pickables.get(&prop_id)?;
        Some(PickInfo {
            prop,
            prop_id,
            composite_id: texel[1],
            depth: self.depth.get(index).copied().unwrap_or(1.0),
            position: (x, y),
        })
    }

    /// Walks square rings around `(x, y)` outwards and returns the first hit.
    fn nearest(&self, x: u32, y: u32, tolerance: u32) -> Option<PickInfo> {
        if let Some(hit) = self.hit(x, y) {
            return Some(hit);
        }
        let (cx, cy) = (x as i64, y as i64);
        for ring in 1..=tolerance as i64 {
            let mut best: Option<PickInfo> = None;
            let mut consider = |px: i64, py: i64| {
                if px < 0 || py < 0 || px > u32::MAX as i64 || py > u32::MAX as i64 {
                    return;
                }
                // Closest to the camera wins within a ring.
                if let Some(hit) = self.hit(px as u32, py as u32) {
                    if best.is_none_or(|b| hit.depth < b.depth) {
                        best = Some(hit);
                    }
                }
            };
            for dx in -ring..=ring {
                consider(cx + dx, cy - ring);
                consider(cx + dx, cy + ring);
            }
            for dy in (-ring + 1)..ring {
                consider(cx - ring, cy + dy);
                consider(cx + ring, cy + dy);
            }
            if best.is_some() {
                return best;
            }
        }
        None
    }
}

/// Picks props of a [`RenderWindow`] by rendering their ids.
#[derive(Default)]
pub struct HardwareSelector {
    pass: HardwareSelectionPass,
}

impl HardwareSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds the prop drawn at `(x, y)`, or the nearest one within
    /// `tolerance` pixels. The window's bound framebuffer is the same
    /// before and after the call.
    pub fn pick(
        &mut self,
        window: &mut RenderWindow,
        scene: &Scene,
        x: u32,
        y: u32,
        tolerance: u32,
    ) -> RenderResult<Option<PickInfo>> {
        let (width, height) = window.size();
        if x >= width || y >= height {
            return Ok(None);
        }
        // No hit can lie further away than the window is wide.
        let tolerance = tolerance.min(width.max(height));
        let span = tolerance.saturating_mul(2).saturating_add(1);
        let area = PixelRect::new(x.saturating_sub(tolerance), y.saturating_sub(tolerance), span, span);
        let Some(buffer) = self.capture(window, scene, area)? else {
            return Ok(None);
        };
        Ok(buffer.nearest(x, y, tolerance))
    }

    /// Every distinct prop and composite block drawn inside `area`, ordered
    /// by prop id and block.
    pub fn select(
        &mut self,
        window: &mut RenderWindow,
        scene: &Scene,
        area: PixelRect,
    ) -> RenderResult<Vec<SelectionHit>> {
        let Some(buffer) = self.capture(window, scene, area)? else {
            return Ok(Vec::new());
        };
        let mut counts: FxHashMap<(u32, u32), usize> = FxHashMap::default();
        for texel in buffer.ids.chunks_exact(4) {
            if texel[0] != 0 {
                *counts.entry((texel[0] - 1, texel[1])).or_default() += 1;
            }
        }
        let mut hits: Vec<SelectionHit> = counts
            .into_iter()
            .filter_map(|((prop_id, composite_id), pixel_count)| {
                buffer.pickables.get(&prop_id).map(|prop| SelectionHit {
                    prop: *prop,
                    prop_id,
                    composite_id,
                    pixel_count,
                })
            })
            .collect();
        hits.sort_by_key(|hit| (hit.prop_id, hit.composite_id));
        Ok(hits)
    }

    /// Renders the selection pass and reads `area`, clipped to the window.
    fn capture(&mut self, window: &mut RenderWindow, scene: &Scene, area: PixelRect) -> RenderResult<Option<IdBuffer>> {
        let (width, height) = window.size();
        let Some(area) = area.intersect(&PixelRect::from_size(width, height)) else {
            return Ok(None);
        };
        let saved = window.device().bound_framebuffer();
        let result = self.read_ids(window, scene, area);
        window.device_mut().bind_framebuffer(saved);
        result
    }

    fn read_ids(&mut self, window: &mut RenderWindow, scene: &Scene, area: PixelRect) -> RenderResult<Option<IdBuffer>> {
        let (ids, pickables) = window.render_offscreen(scene, &mut self.pass)?;
        let (Some(ids), Some(depth)) = (ids, self.pass.depth_texture()) else {
            return Ok(None);
        };
        let device = window.device_mut();
        let ids = device.read_pixels(ids, area)?;
        let depth = device.read_pixels(depth, area)?;
        match (ids.data, depth.data) {
            (PixelData::Uint32(ids), PixelData::Float32(depth)) => Ok(Some(IdBuffer {
                area,
                ids,
                depth,
                pickables,
            })),
            _ => Err(RenderError::Readback("selection targets have unexpected formats".into())),
        }
    }

    /// Releases the selection targets. `window` must be the one picked from.
    pub fn release(&mut self, window: &mut RenderWindow) {
        self.pass.release(window.device_mut());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{PolyData, PolyMapper, Prop, Property};
    use crate::testing;
    use glam::{Vec2, Vec3};

    #[test]
    fn test_pick_center_of_full_view_quad() {
        let mut window = testing::window(32, 32);
        let (scene, _, actor) = testing::quad_scene(Vec3::ONE, 1.0);
        window.render(&scene).unwrap();
        let bound = window.device().bound_framebuffer();

        let mut selector = HardwareSelector::new();
        let hit = selector.pick(&mut window, &scene, 16, 16, 0).unwrap().unwrap();
        assert_eq!(hit.prop, actor);
        assert_eq!(hit.composite_id, 0);
        assert_eq!(hit.position, (16, 16));
        assert!(hit.depth > 0.0 && hit.depth < 1.0);
        assert_eq!(window.device().bound_framebuffer(), bound);

        assert!(selector.pick(&mut window, &scene, 40, 4, 2).unwrap().is_none());
        selector.release(&mut window);
    }

    #[test]
    fn test_no_pick_outside_the_renderer() {
        let mut window = testing::window(32, 32);
        let (scene, _, actor) = testing::scene_with_quad(
            [0.0, 0.0, 0.5, 1.0],
            Vec2::splat(-4.0),
            Vec2::splat(4.0),
            Vec3::ONE,
            1.0,
        );
        let mut selector = HardwareSelector::new();
        let inside = selector.pick(&mut window, &scene, 8, 16, 0).unwrap();
        assert_eq!(inside.map(|hit| hit.prop), Some(actor));
        assert!(selector.pick(&mut window, &scene, 24, 16, 0).unwrap().is_none());
    }

    #[test]
    fn test_tolerance_reaches_a_nearby_prop() {
        let mut window = testing::window(32, 32);
        // Left half of the view only.
        let (scene, _, actor) = testing::scene_with_quad(
            [0.0, 0.0, 1.0, 1.0],
            Vec2::new(-2.0, -2.0),
            Vec2::new(0.0, 2.0),
            Vec3::ONE,
            1.0,
        );
        let mut selector = HardwareSelector::new();
        assert!(selector.pick(&mut window, &scene, 20, 16, 0).unwrap().is_none());
        let hit = selector.pick(&mut window, &scene, 20, 16, 6).unwrap().unwrap();
        assert_eq!(hit.prop, actor);
        assert!(hit.position.0 < 16);
    }

    #[test]
    fn test_huge_tolerance_is_clamped_to_the_window() {
        let mut window = testing::window(16, 16);
        let (scene, _, actor) = testing::scene_with_quad(
            [0.0, 0.0, 1.0, 1.0],
            Vec2::new(-2.0, -2.0),
            Vec2::new(0.0, 2.0),
            Vec3::ONE,
            1.0,
        );
        let mut selector = HardwareSelector::new();
        let hit = selector.pick(&mut window, &scene, 15, 15, u32::MAX).unwrap().unwrap();
        assert_eq!(hit.prop, actor);
        assert!(hit.position.0 < 8);
    }

    #[test]
    fn test_unpickable_props_are_ignored() {
        let mut window = testing::window(16, 16);
        let (mut scene, _, actor) = testing::quad_scene(Vec3::ONE, 1.0);
        scene.modify::<Prop, _>(actor, |prop| prop.pickable = false);
        let mut selector = HardwareSelector::new();
        assert!(selector.pick(&mut window, &scene, 8, 8, 0).unwrap().is_none());
    }

    #[test]
    fn test_select_counts_composite_blocks() {
        let mut window = testing::window(16, 16);
        let mut scene = crate::scene::Scene::new();
        let renderer = scene.add_renderer(Default::default());
        scene.add_camera(renderer, testing::ortho_camera()).unwrap();
        let mapper = PolyMapper::composite(vec![
            PolyData::quad(Vec2::new(-2.0, -2.0), Vec2::new(0.0, 2.0), 0.0),
            PolyData::quad(Vec2::new(0.0, -2.0), Vec2::new(2.0, 2.0), 0.0),
        ]);
        let actor = scene
            .add_actor(renderer, mapper, Property::default().unlit(), Prop::default())
            .unwrap();

        let mut selector = HardwareSelector::new();
        let hits = selector
            .select(&mut window, &scene, PixelRect::from_size(16, 16))
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|hit| hit.prop == actor));
        assert_eq!(hits[0].composite_id, 0);
        assert_eq!(hits[1].composite_id, 1);
        assert_eq!(hits.iter().map(|hit| hit.pixel_count).sum::<usize>(), 256);
    }
}
