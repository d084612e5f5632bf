//! Tile data model and the tile pipeline (source, loader, store).

pub mod loader;
pub mod source;
pub mod store;

use std::time::Instant;

use crate::core::geo::TileCoord;

/// Kind of geometry held by a feature set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Point,
    Line,
    Polygon,
}

/// Geometry for one (layer, kind) pair within a tile.
///
/// Vertices are interleaved (x, y) pairs of 32-bit floats in global
/// mercator. Polygons and lines carry an index list; points are drawn
/// unindexed. Immutable once the owning tile is `Ready`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    pub layer: String,
    pub kind: GeometryKind,
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
}

impl FeatureSet {
    pub fn new(layer: impl Into<String>, kind: GeometryKind) -> Self {
        Self {
            layer: layer.into(),
            kind,
            vertices: Vec::new(),
            indices: Vec::new(),
        }
    }

    /// Number of (x, y) vertex pairs
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Appends one feature's geometry, re-offsetting its indices past the
    /// vertices already present.
    pub fn append(&mut self, vertices: &[f32], indices: &[u32]) {
        let base = self.vertex_count() as u32;
        self.vertices.extend_from_slice(vertices);
        self.indices.extend(indices.iter().map(|i| i + base));
    }
}

/// A label candidate extracted during MVT parsing.
///
/// Lives and dies with the owning tile.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelInfo {
    pub text: String,
    /// Global mercator position
    pub mx: f64,
    pub my: f64,
    pub layer: String,
    pub priority: f32,
}

/// Lifecycle state of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    Loading,
    Ready,
    Failed,
}

/// Decoded contents of one tile
#[derive(Debug, Clone)]
pub struct TileData {
    pub coord: TileCoord,
    pub state: TileState,
    pub features: Vec<FeatureSet>,
    pub labels: Vec<LabelInfo>,
    /// Monotonic load timestamp, set when the entry is created or completed
    pub loaded_at: Instant,
}

impl TileData {
    pub fn loading(coord: TileCoord) -> Self {
        Self {
            coord,
            state: TileState::Loading,
            features: Vec::new(),
            labels: Vec::new(),
            loaded_at: Instant::now(),
        }
    }

    pub fn ready(coord: TileCoord, features: Vec<FeatureSet>, labels: Vec<LabelInfo>) -> Self {
        Self {
            coord,
            state: TileState::Ready,
            features,
            labels,
            loaded_at: Instant::now(),
        }
    }

    pub fn failed(coord: TileCoord) -> Self {
        Self {
            coord,
            state: TileState::Failed,
            features: Vec::new(),
            labels: Vec::new(),
            loaded_at: Instant::now(),
        }
    }
}
