//! Geometry conversion: ring cleaning, polygon tessellation, line and
//! point output.
//!
//! Rings arrive in tile-local [0, 1] coordinates. Tessellation runs in
//! that range (comfortably inside f32 precision) and only the finished
//! vertices are placed into global mercator, computed in f64.

use lyon::math::point;
use lyon::path::Path;
use lyon::tessellation::{
    BuffersBuilder, FillOptions, FillRule, FillTessellator, FillVertex, VertexBuffers,
};

use crate::core::geo::TileCoord;
use crate::{MapError, Result};

/// Points closer than this are duplicates
const EPSILON: f64 = 1e-9;

/// Places tile-local [0, 1] coordinates into global mercator
#[derive(Debug, Clone, Copy)]
pub struct TileTransform {
    origin_x: f64,
    origin_y: f64,
    inv_scale: f64,
}

impl TileTransform {
    pub fn apply(&self, u: f64, v: f64) -> (f64, f64) {
        (
            (self.origin_x + u) * self.inv_scale,
            (self.origin_y + v) * self.inv_scale,
        )
    }
}

impl From<TileCoord> for TileTransform {
    fn from(coord: TileCoord) -> Self {
        Self {
            origin_x: coord.x as f64,
            origin_y: coord.y as f64,
            inv_scale: 1.0 / 2_f64.powi(coord.z as i32),
        }
    }
}

/// Cleans one polygon ring.
///
/// Drops points duplicating their predecessor within epsilon, drops a
/// closing point that repeats the first, and rejects rings left with
/// fewer than three distinct points.
pub fn clean_ring(ring: &[[f64; 2]]) -> Option<Vec<[f64; 2]>> {
    let mut cleaned: Vec<[f64; 2]> = Vec::with_capacity(ring.len());
    for &p in ring {
        if cleaned.last().is_some_and(|last| same_point(*last, p)) {
            continue;
        }
        cleaned.push(p);
    }
    if cleaned.len() > 1 && same_point(cleaned[0], *cleaned.last().unwrap()) {
        cleaned.pop();
    }
    if cleaned.len() < 3 {
        return None;
    }
    Some(cleaned)
}

fn same_point(a: [f64; 2], b: [f64; 2]) -> bool {
    (a[0] - b[0]).abs() < EPSILON && (a[1] - b[1]).abs() < EPSILON
}

/// Tessellates a feature's rings into an indexed triangle mesh.
///
/// Even-odd winding, so holes and most self-intersections come out right
/// without caring about ring orientation; vertices synthesized at
/// intersections join the pool. Vertices are returned as interleaved
/// global-mercator f32 pairs.
pub fn tessellate_rings(
    rings: &[Vec<[f64; 2]>],
    transform: &TileTransform,
) -> Result<(Vec<f32>, Vec<u32>)> {
    let mut builder = Path::builder();
    let mut any_ring = false;
    for ring in rings {
        let Some(cleaned) = clean_ring(ring) else {
            continue;
        };
        any_ring = true;
        builder.begin(point(cleaned[0][0] as f32, cleaned[0][1] as f32));
        for p in &cleaned[1..] {
            builder.line_to(point(p[0] as f32, p[1] as f32));
        }
        builder.end(true);
    }
    if !any_ring {
        return Ok((Vec::new(), Vec::new()));
    }
    let path = builder.build();

    let mut buffers: VertexBuffers<[f32; 2], u32> = VertexBuffers::new();
    let options = FillOptions::default()
        .with_fill_rule(FillRule::EvenOdd)
        .with_tolerance(0.0001);
    let mut tessellator = FillTessellator::new();
    tessellator
        .tessellate_path(
            &path,
            &options,
            &mut BuffersBuilder::new(&mut buffers, |vertex: FillVertex| {
                let position = vertex.position();
                [position.x, position.y]
            }),
        )
        .map_err(|e| MapError::Tessellation(format!("{e:?}")))?;

    let mut vertices = Vec::with_capacity(buffers.vertices.len() * 2);
    for [u, v] in buffers.vertices {
        let (mx, my) = transform.apply(u as f64, v as f64);
        vertices.push(mx as f32);
        vertices.push(my as f32);
    }
    Ok((vertices, buffers.indices))
}

/// Converts a line path into vertices plus (i, i+1) segment index pairs
/// for a GL_LINES-style draw.
pub fn convert_line(path: &[[f64; 2]], transform: &TileTransform) -> (Vec<f32>, Vec<u32>) {
    let mut vertices: Vec<f32> = Vec::new();
    let mut last: Option<[f64; 2]> = None;
    for &p in path {
        if last.is_some_and(|prev| same_point(prev, p)) {
            continue;
        }
        let (mx, my) = transform.apply(p[0], p[1]);
        vertices.push(mx as f32);
        vertices.push(my as f32);
        last = Some(p);
    }

    let pairs = vertices.len() / 2;
    if pairs < 2 {
        return (Vec::new(), Vec::new());
    }
    let mut indices = Vec::with_capacity((pairs - 1) * 2);
    for i in 0..(pairs as u32 - 1) {
        indices.push(i);
        indices.push(i + 1);
    }
    (vertices, indices)
}

/// Converts point geometry; one (x, y) pair per point, no indices.
pub fn convert_points(path: &[[f64; 2]], transform: &TileTransform) -> Vec<f32> {
    let mut vertices = Vec::with_capacity(path.len() * 2);
    for &p in path {
        let (mx, my) = transform.apply(p[0], p[1]);
        vertices.push(mx as f32);
        vertices.push(my as f32);
    }
    vertices
}
