//! Screen-space label placement and text quad emission.
//!
//! Labels across all renderable tiles are sorted by priority, culled
//! against the viewport, and placed greedily against a boolean collision
//! grid. Winners emit two textured triangles per glyph into one vertex
//! buffer, drawn last under an orthographic pixel-space overlay.

use std::sync::Arc;

use log::debug;

use crate::rendering::atlas::{FontAtlas, GLYPH_HEIGHT};
use crate::rendering::backend::{uniforms, BufferId, GpuContext, PrimitiveKind};
use crate::rendering::camera::Camera;
use crate::tiles::TileData;

/// Collision grid resolution covering the viewport
const GRID_COLS: usize = 120;
const GRID_ROWS: usize = 100;
/// Labels may project slightly off-screen and still place
const VIEWPORT_APRON: f64 = 20.0;
/// Frame-time bound on label processing
const MAX_LABELS_PROCESSED: usize = 2000;

/// A label that won placement this frame, with its screen AABB.
/// Kept for hit-testing and debugging.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLabel {
    pub text: String,
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

/// What the previous frame was built from; placement reruns only when
/// this changes.
struct FrameKey {
    camera: Camera,
    tile_signature: Vec<usize>,
}

/// Priority-ordered, collision-free label renderer
pub struct LabelEngine {
    atlas: FontAtlas,
    grid: Vec<bool>,
    /// Interleaved (x, y, u, v) vertices, two triangles per glyph
    vertices: Vec<f32>,
    pub placed: Vec<PlacedLabel>,
    vertex_buffer: Option<BufferId>,
    max_labels: usize,
    last_frame: Option<FrameKey>,
    rebuild_count: usize,
}

impl LabelEngine {
    pub fn new() -> Self {
        Self::with_budget(MAX_LABELS_PROCESSED)
    }

    pub fn with_budget(max_labels: usize) -> Self {
        Self {
            atlas: FontAtlas::new(),
            grid: vec![false; GRID_COLS * GRID_ROWS],
            vertices: Vec::new(),
            placed: Vec::new(),
            vertex_buffer: None,
            max_labels,
            last_frame: None,
            rebuild_count: 0,
        }
    }

    /// How many times placement ran; stable frames reuse the buffer
    pub fn rebuild_count(&self) -> usize {
        self.rebuild_count
    }

    /// Places labels (reusing the previous frame's buffer when camera and
    /// tile set are unchanged) and draws the text overlay.
    pub fn render(&mut self, gpu: &mut dyn GpuContext, camera: &Camera, tiles: &[Arc<TileData>]) {
        let tile_signature: Vec<usize> = tiles.iter().map(|t| Arc::as_ptr(t) as usize).collect();
        let fresh = self
            .last_frame
            .as_ref()
            .is_some_and(|key| key.camera == *camera && key.tile_signature == tile_signature);

        if !fresh {
            self.rebuild(camera, tiles);
            self.last_frame = Some(FrameKey {
                camera: camera.clone(),
                tile_signature,
            });
        }

        if self.vertices.is_empty() {
            return;
        }

        let (width, height) = camera.viewport();
        gpu.set_uniform_mat4(uniforms::ORTHO, &ortho_pixel_matrix(width, height));
        let buffer = *self.vertex_buffer.get_or_insert_with(|| gpu.create_buffer());
        gpu.upload_vertices(buffer, &self.vertices);
        gpu.draw_arrays(PrimitiveKind::Triangles, buffer, self.vertices.len() / 4);
    }

    fn rebuild(&mut self, camera: &Camera, tiles: &[Arc<TileData>]) {
        self.rebuild_count += 1;
        self.grid.fill(false);
        self.vertices.clear();
        self.placed.clear();

        let mut candidates: Vec<&crate::tiles::LabelInfo> =
            tiles.iter().flat_map(|t| t.labels.iter()).collect();
        candidates.sort_by(|a, b| b.priority.total_cmp(&a.priority));

        let (width, height) = camera.viewport();
        let cell_w = width as f32 / GRID_COLS as f32;
        let cell_h = height as f32 / GRID_ROWS as f32;

        let mut processed = 0;
        for label in candidates {
            if processed >= self.max_labels {
                debug!("label budget exhausted at {processed}");
                break;
            }
            processed += 1;

            let Some((sx, sy)) = camera.world_to_screen(label.mx, label.my) else {
                continue;
            };
            if sx < -VIEWPORT_APRON
                || sx > width + VIEWPORT_APRON
                || sy < -VIEWPORT_APRON
                || sy > height + VIEWPORT_APRON
            {
                continue;
            }

            let text_w = self.atlas.measure(&label.text);
            let min_x = sx as f32 - text_w / 2.0;
            let max_x = sx as f32 + text_w / 2.0;
            let min_y = sy as f32 - GLYPH_HEIGHT / 2.0;
            let max_y = sy as f32 + GLYPH_HEIGHT / 2.0;

            let c0 = grid_index(min_x / cell_w, GRID_COLS);
            let c1 = grid_index(max_x / cell_w, GRID_COLS);
            let r0 = grid_index(min_y / cell_h, GRID_ROWS);
            let r1 = grid_index(max_y / cell_h, GRID_ROWS);

            let collides = (r0..=r1)
                .any(|row| (c0..=c1).any(|col| self.grid[row * GRID_COLS + col]));
            if collides {
                continue;
            }
            for row in r0..=r1 {
                for col in c0..=c1 {
                    self.grid[row * GRID_COLS + col] = true;
                }
            }

            self.emit_text(&label.text, min_x, min_y);
            self.placed.push(PlacedLabel {
                text: label.text.clone(),
                min_x,
                min_y,
                max_x,
                max_y,
            });
        }
    }

    /// Two triangles per glyph, interleaved position and UV
    fn emit_text(&mut self, text: &str, origin_x: f32, origin_y: f32) {
        let mut pen_x = origin_x;
        for c in text.chars() {
            let Some(glyph) = self.atlas.glyph(c) else {
                pen_x += self.atlas.measure(" ");
                continue;
            };
            let (x0, y0) = (pen_x, origin_y);
            let (x1, y1) = (pen_x + glyph.advance, origin_y + GLYPH_HEIGHT);

            let quad = [
                [x0, y0, glyph.u0, glyph.v0],
                [x1, y0, glyph.u1, glyph.v0],
                [x1, y1, glyph.u1, glyph.v1],
                [x0, y0, glyph.u0, glyph.v0],
                [x1, y1, glyph.u1, glyph.v1],
                [x0, y1, glyph.u0, glyph.v1],
            ];
            for vertex in quad {
                self.vertices.extend_from_slice(&vertex);
            }
            pen_x += glyph.advance;
        }
    }
}

impl Default for LabelEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn grid_index(value: f32, cells: usize) -> usize {
    (value.floor().max(0.0) as usize).min(cells - 1)
}

/// Orthographic pixel-space projection (0, W) x (H, 0), z in (-1, 1),
/// column-major
fn ortho_pixel_matrix(width: f64, height: f64) -> [[f32; 4]; 4] {
    let w = width as f32;
    let h = height as f32;
    [
        [2.0 / w, 0.0, 0.0, 0.0],
        [0.0, -2.0 / h, 0.0, 0.0],
        [0.0, 0.0, -1.0, 0.0],
        [-1.0, 1.0, 0.0, 1.0],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::TileCoord;
    use crate::rendering::backend::RecordingContext;
    use crate::tiles::LabelInfo;

    fn camera() -> Camera {
        Camera::new(0.0, 0.0, 4.0, 1200, 1000, 0.0, 20.0)
    }

    fn label(text: &str, mx: f64, my: f64, priority: f32) -> LabelInfo {
        LabelInfo {
            text: text.to_string(),
            mx,
            my,
            layer: "place".to_string(),
            priority,
        }
    }

    fn tile_with_labels(labels: Vec<LabelInfo>) -> Arc<TileData> {
        Arc::new(TileData::ready(TileCoord::new(0, 0, 0), Vec::new(), labels))
    }

    fn overlaps(a: &PlacedLabel, b: &PlacedLabel) -> bool {
        a.min_x < b.max_x && b.min_x < a.max_x && a.min_y < b.max_y && b.min_y < a.max_y
    }

    #[test]
    fn test_no_emitted_boxes_overlap() {
        let mut engine = LabelEngine::new();
        let mut gpu = RecordingContext::new();
        // A cluster of labels around the center, many forced to collide
        let labels: Vec<LabelInfo> = (0..30)
            .map(|i| label(&format!("Town {i}"), 0.5 + i as f64 * 1e-5, 0.5, i as f32))
            .collect();
        engine.render(&mut gpu, &camera(), &[tile_with_labels(labels)]);

        assert!(!engine.placed.is_empty());
        for (i, a) in engine.placed.iter().enumerate() {
            for b in engine.placed.iter().skip(i + 1) {
                assert!(!overlaps(a, b), "{a:?} overlaps {b:?}");
            }
        }
    }

    #[test]
    fn test_priority_wins_collisions() {
        let mut engine = LabelEngine::new();
        let mut gpu = RecordingContext::new();
        let labels = vec![
            label("minor", 0.5, 0.5, 1.0),
            label("major", 0.5, 0.5, 50.0),
        ];
        engine.render(&mut gpu, &camera(), &[tile_with_labels(labels)]);

        assert_eq!(engine.placed.len(), 1);
        assert_eq!(engine.placed[0].text, "major");
    }

    #[test]
    fn test_offscreen_labels_culled() {
        let mut engine = LabelEngine::new();
        let mut gpu = RecordingContext::new();
        // Far outside the viewport at this zoom
        let labels = vec![label("elsewhere", 0.9, 0.9, 10.0)];
        engine.render(&mut gpu, &camera(), &[tile_with_labels(labels)]);

        assert!(engine.placed.is_empty());
        assert!(gpu.draws.is_empty());
    }

    #[test]
    fn test_budget_bounds_processing() {
        let mut engine = LabelEngine::with_budget(5);
        let mut gpu = RecordingContext::new();
        let labels: Vec<LabelInfo> = (0..50)
            .map(|i| {
                // Spread out so none collide
                label(&format!("L{i}"), 0.5 + (i as f64 - 25.0) * 2e-4, 0.5, 1.0)
            })
            .collect();
        engine.render(&mut gpu, &camera(), &[tile_with_labels(labels)]);

        assert!(engine.placed.len() <= 5);
    }

    #[test]
    fn test_stable_frame_reuses_buffer() {
        let mut engine = LabelEngine::new();
        let mut gpu = RecordingContext::new();
        let cam = camera();
        let tiles = vec![tile_with_labels(vec![label("Berlin", 0.5, 0.5, 10.0)])];

        engine.render(&mut gpu, &cam, &tiles);
        engine.render(&mut gpu, &cam, &tiles);
        assert_eq!(engine.rebuild_count(), 1);

        // Camera change invalidates
        let mut moved = cam.clone();
        moved.pan(10.0, 0.0);
        engine.render(&mut gpu, &moved, &tiles);
        assert_eq!(engine.rebuild_count(), 2);

        // Tile set change invalidates
        let more = vec![
            tiles[0].clone(),
            tile_with_labels(vec![label("Potsdam", 0.49, 0.5, 5.0)]),
        ];
        engine.render(&mut gpu, &moved, &more);
        assert_eq!(engine.rebuild_count(), 3);
    }

    #[test]
    fn test_quads_are_two_triangles_per_glyph() {
        let mut engine = LabelEngine::new();
        let mut gpu = RecordingContext::new();
        let tiles = vec![tile_with_labels(vec![label("ab", 0.5, 0.5, 10.0)])];
        engine.render(&mut gpu, &camera(), &tiles);

        assert_eq!(gpu.draws.len(), 1);
        // 2 glyphs * 6 vertices
        assert_eq!(gpu.draws[0].count, 12);
        assert!(gpu.mat4_uniforms.contains_key(uniforms::ORTHO));
    }
}
