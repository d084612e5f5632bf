//! Cross-tile draw batching with a deterministic paint order.
//!
//! Feature sets from every renderable tile are concatenated into
//! per-(layer, kind) buckets each frame, indices re-offset past the
//! running vertex count, and submitted bottom-to-top in the global layer
//! order. There is no depth buffer; paint order is the z-order, with a
//! small per-layer `uDepth` offset available to overlays.

use std::sync::Arc;

use fxhash::FxHashMap;

use crate::core::config::Rgba;
use crate::rendering::backend::{uniforms, BufferId, GpuContext, PrimitiveKind};
use crate::rendering::camera::Camera;
use crate::tiles::{GeometryKind, TileData};

/// Paint order from bottom to top. Layers not listed draw after these,
/// in stable first-seen order.
pub const GLOBAL_LAYER_ORDER: [&str; 10] = [
    "background",
    "landcover",
    "park",
    "landuse",
    "water",
    "boundary",
    "transportation",
    "building",
    "housenumber",
    "label",
];

/// Depth increment between consecutive layers
const LAYER_DEPTH_STEP: f32 = 1.0 / 1024.0;

/// Within a layer, polygons render under lines under points so outlines
/// and markers stay visible over their fills.
const KIND_ORDER: [GeometryKind; 3] = [GeometryKind::Polygon, GeometryKind::Line, GeometryKind::Point];

#[derive(Default)]
struct Bucket {
    vertices: Vec<f32>,
    indices: Vec<u32>,
}

impl Bucket {
    fn append(&mut self, vertices: &[f32], indices: &[u32]) {
        let base = (self.vertices.len() / 2) as u32;
        self.vertices.extend_from_slice(vertices);
        self.indices.extend(indices.iter().map(|i| i + base));
    }
}

/// Aggregates tile feature sets into ordered draw submissions
pub struct LayerBatcher {
    vertex_buffer: Option<BufferId>,
    index_buffer: Option<BufferId>,
    /// Scratch buckets keyed by (layer, kind), reused across frames
    buckets: FxHashMap<(String, GeometryKind), Bucket>,
    layer_colors: FxHashMap<String, Rgba>,
    disabled: Vec<String>,
}

impl LayerBatcher {
    pub fn new(layer_colors: impl IntoIterator<Item = (String, Rgba)>) -> Self {
        Self {
            vertex_buffer: None,
            index_buffer: None,
            buckets: FxHashMap::default(),
            layer_colors: layer_colors.into_iter().collect(),
            disabled: Vec::new(),
        }
    }

    pub fn set_layer_color(&mut self, layer: &str, color: Rgba) {
        self.layer_colors.insert(layer.to_string(), color);
    }

    pub fn disable_layer(&mut self, layer: &str) {
        if !self.disabled.iter().any(|l| l == layer) {
            self.disabled.push(layer.to_string());
        }
    }

    /// Batches the frame's renderable tiles and submits one indexed draw
    /// per non-empty (layer, kind) bucket, in global layer order.
    ///
    /// Tile data is borrowed for this call only; nothing is retained.
    pub fn render(&mut self, gpu: &mut dyn GpuContext, camera: &Camera, tiles: &[Arc<TileData>]) {
        for bucket in self.buckets.values_mut() {
            bucket.vertices.clear();
            bucket.indices.clear();
        }

        // Stable insertion order across tiles decides where unknown
        // layers land, after the global list.
        let mut layer_order: Vec<String> = Vec::new();
        for tile in tiles {
            for set in &tile.features {
                if self.disabled.iter().any(|l| l == &set.layer) {
                    continue;
                }
                if !layer_order.iter().any(|l| l == &set.layer) {
                    layer_order.push(set.layer.clone());
                }
                self.buckets
                    .entry((set.layer.clone(), set.kind))
                    .or_default()
                    .append(&set.vertices, &set.indices);
            }
        }

        layer_order.sort_by_key(|layer| layer_rank(layer));

        gpu.set_uniform_mat4(uniforms::VIEW_PROJ, &camera.view_projection_array());

        let vertex_buffer = *self.vertex_buffer.get_or_insert_with(|| gpu.create_buffer());
        let index_buffer = *self.index_buffer.get_or_insert_with(|| gpu.create_buffer());

        for (layer_index, layer) in layer_order.iter().enumerate() {
            let color = self
                .layer_colors
                .get(layer)
                .copied()
                .unwrap_or_default();
            gpu.set_uniform_vec4(uniforms::FILL_COLOR, color.to_array());
            gpu.set_uniform_f32(uniforms::DEPTH, layer_index as f32 * LAYER_DEPTH_STEP);

            for kind in KIND_ORDER {
                let Some(bucket) = self.buckets.get(&(layer.clone(), kind)) else {
                    continue;
                };
                if bucket.vertices.is_empty() {
                    continue;
                }

                gpu.upload_vertices(vertex_buffer, &bucket.vertices);
                match kind {
                    GeometryKind::Polygon => {
                        gpu.upload_indices(index_buffer, &bucket.indices);
                        gpu.draw_indexed(
                            PrimitiveKind::Triangles,
                            vertex_buffer,
                            index_buffer,
                            bucket.indices.len(),
                        );
                    }
                    GeometryKind::Line => {
                        gpu.upload_indices(index_buffer, &bucket.indices);
                        gpu.draw_indexed(
                            PrimitiveKind::Lines,
                            vertex_buffer,
                            index_buffer,
                            bucket.indices.len(),
                        );
                    }
                    GeometryKind::Point => {
                        gpu.draw_arrays(
                            PrimitiveKind::Points,
                            vertex_buffer,
                            bucket.vertices.len() / 2,
                        );
                    }
                }
            }
        }
    }
}

/// Sort key: position in the global order, or after everything listed
fn layer_rank(layer: &str) -> usize {
    GLOBAL_LAYER_ORDER
        .iter()
        .position(|&name| name == layer)
        .unwrap_or(GLOBAL_LAYER_ORDER.len())
}
