//! Mapbox Vector Tile parser.
//!
//! Decodes a tile payload into feature sets grouped by (layer, geometry
//! kind) plus the label candidates found along the way. Layers outside
//! the caller's allowlist are skipped without decoding their features.

use std::io::Read;

use flate2::read::GzDecoder;
use fxhash::FxHashSet;
use log::warn;

use crate::core::geo::TileCoord;
use crate::mvt::geometry::{self, TileTransform};
use crate::mvt::pbf::{decode_zigzag32, PbfReader, WireType};
use crate::tiles::{FeatureSet, GeometryKind, LabelInfo};
use crate::{MapError, Result};

const GEOM_MOVE_TO: u32 = 1;
const GEOM_LINE_TO: u32 = 2;
const GEOM_CLOSE_PATH: u32 = 7;

/// Layers whose point features carry map labels, with base priority.
/// A numeric `rank` attribute refines priority within the layer.
const LABEL_LAYERS: [(&str, f32); 2] = [("place", 100.0), ("housenumber", 10.0)];

/// Everything decoded from one tile payload
#[derive(Debug, Default)]
pub struct ParsedTile {
    pub features: Vec<FeatureSet>,
    pub labels: Vec<LabelInfo>,
}

/// Typed MVT attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Float(f32),
    Double(f64),
    Int(i64),
    Uint(u64),
    Sint(i64),
    Bool(bool),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            Value::Int(v) | Value::Sint(v) => Some(*v as f64),
            Value::Uint(v) => Some(*v as f64),
            _ => None,
        }
    }
}

/// Decodes an MVT payload, gunzipping first when the magic bytes lead.
///
/// Only layers named in `allowlist` are decoded. Errors abort the whole
/// tile (the caller marks it Failed); per-feature problems are skipped.
pub fn parse_tile(
    bytes: &[u8],
    coord: TileCoord,
    allowlist: &FxHashSet<String>,
) -> Result<ParsedTile> {
    let plain;
    let bytes = if bytes.starts_with(&[0x1F, 0x8B]) {
        let mut decoder = GzDecoder::new(bytes);
        let mut decoded = Vec::new();
        decoder
            .read_to_end(&mut decoded)
            .map_err(|e| MapError::Decompress(e.to_string()))?;
        plain = decoded;
        &plain[..]
    } else {
        bytes
    };

    let mut parsed = ParsedTile::default();
    let mut reader = PbfReader::new(bytes);
    while let Some((tag, wire)) = reader.next_field()? {
        match (tag, wire) {
            (3, WireType::LengthDelimited) => {
                let layer_bytes = reader.read_bytes()?;
                parse_layer(layer_bytes, coord, allowlist, &mut parsed)?;
            }
            _ => reader.skip(wire)?,
        }
    }
    Ok(parsed)
}

struct RawLayer<'a> {
    name: String,
    extent: u32,
    keys: Vec<String>,
    values: Vec<Value>,
    features: Vec<&'a [u8]>,
}

fn parse_layer(
    bytes: &[u8],
    coord: TileCoord,
    allowlist: &FxHashSet<String>,
    out: &mut ParsedTile,
) -> Result<()> {
    let mut layer = RawLayer {
        name: String::new(),
        extent: 4096,
        keys: Vec::new(),
        values: Vec::new(),
        features: Vec::new(),
    };

    // One cheap pass that only slices features; geometry stays undecoded
    // until the allowlist check passes.
    let mut reader = PbfReader::new(bytes);
    while let Some((tag, wire)) = reader.next_field()? {
        match (tag, wire) {
            (1, WireType::LengthDelimited) => layer.name = reader.read_string()?,
            (2, WireType::LengthDelimited) => layer.features.push(reader.read_bytes()?),
            (3, WireType::LengthDelimited) => layer.keys.push(reader.read_string()?),
            (4, WireType::LengthDelimited) => {
                let value_bytes = reader.read_bytes()?;
                layer.values.push(parse_value(value_bytes)?);
            }
            (5, WireType::Varint) => layer.extent = reader.read_varint()? as u32,
            (15, WireType::Varint) => {
                reader.read_varint()?;
            }
            _ => reader.skip(wire)?,
        }
    }

    if !allowlist.contains(&layer.name) {
        return Ok(());
    }
    if layer.extent == 0 {
        warn!("layer {} in {} has zero extent, skipping", layer.name, coord);
        return Ok(());
    }

    let transform = TileTransform::from(coord);
    let label_base = LABEL_LAYERS
        .iter()
        .find(|(name, _)| *name == layer.name)
        .map(|(_, base)| *base);

    let mut polygons: Option<FeatureSet> = None;
    let mut lines: Option<FeatureSet> = None;
    let mut points: Option<FeatureSet> = None;

    for feature_bytes in &layer.features {
        let feature = match parse_feature(feature_bytes) {
            Ok(f) => f,
            Err(e) => {
                warn!("skipping malformed feature in {}/{}: {e}", layer.name, coord);
                continue;
            }
        };

        let paths = decode_geometry(&feature.geometry, layer.extent);
        if paths.is_empty() {
            continue;
        }

        match feature.kind {
            Some(GeometryKind::Polygon) => {
                let set = polygons
                    .get_or_insert_with(|| FeatureSet::new(&layer.name, GeometryKind::Polygon));
                match geometry::tessellate_rings(&paths, &transform) {
                    Ok((vertices, indices)) => set.append(&vertices, &indices),
                    Err(e) => warn!("tessellation failed in {}/{}: {e}", layer.name, coord),
                }
            }
            Some(GeometryKind::Line) => {
                let set =
                    lines.get_or_insert_with(|| FeatureSet::new(&layer.name, GeometryKind::Line));
                for path in &paths {
                    let (vertices, indices) = geometry::convert_line(path, &transform);
                    set.append(&vertices, &indices);
                }
            }
            Some(GeometryKind::Point) => {
                let set =
                    points.get_or_insert_with(|| FeatureSet::new(&layer.name, GeometryKind::Point));
                for path in &paths {
                    let vertices = geometry::convert_points(path, &transform);
                    set.append(&vertices, &[]);
                }
                if let Some(base) = label_base {
                    if let Some(label) = extract_label(&layer, &feature, &paths, &transform, base) {
                        out.labels.push(label);
                    }
                }
            }
            None => {}
        }
    }

    out.features
        .extend([polygons, lines, points].into_iter().flatten().filter(|s| !s.is_empty()));
    Ok(())
}

struct RawFeature {
    kind: Option<GeometryKind>,
    tags: Vec<u32>,
    geometry: Vec<u32>,
}

fn parse_feature(bytes: &[u8]) -> Result<RawFeature> {
    let mut feature = RawFeature {
        kind: None,
        tags: Vec::new(),
        geometry: Vec::new(),
    };

    let mut reader = PbfReader::new(bytes);
    while let Some((tag, wire)) = reader.next_field()? {
        match (tag, wire) {
            (1, WireType::Varint) => {
                reader.read_varint()?;
            }
            (2, WireType::LengthDelimited) => reader.read_packed_varints(&mut feature.tags)?,
            (3, WireType::Varint) => {
                feature.kind = match reader.read_varint()? {
                    1 => Some(GeometryKind::Point),
                    2 => Some(GeometryKind::Line),
                    3 => Some(GeometryKind::Polygon),
                    _ => None,
                };
            }
            (4, WireType::LengthDelimited) => {
                reader.read_packed_varints(&mut feature.geometry)?
            }
            _ => reader.skip(wire)?,
        }
    }
    Ok(feature)
}

fn parse_value(bytes: &[u8]) -> Result<Value> {
    let mut value = Value::String(String::new());
    let mut reader = PbfReader::new(bytes);
    while let Some((tag, wire)) = reader.next_field()? {
        value = match (tag, wire) {
            (1, WireType::LengthDelimited) => Value::String(reader.read_string()?),
            (2, WireType::Fixed32) => Value::Float(reader.read_float()?),
            (3, WireType::Fixed64) => Value::Double(reader.read_double()?),
            (4, WireType::Varint) => Value::Int(reader.read_varint()? as i64),
            (5, WireType::Varint) => Value::Uint(reader.read_varint()?),
            (6, WireType::Varint) => Value::Sint(reader.read_zigzag()?),
            (7, WireType::Varint) => Value::Bool(reader.read_varint()? != 0),
            _ => {
                reader.skip(wire)?;
                continue;
            }
        };
    }
    Ok(value)
}

/// Walks the geometry command stream into per-path normalized coordinates.
///
/// The cursor accumulates zigzag deltas; every position is divided by the
/// layer extent, giving tile-local [0, 1] coordinates (geometry may
/// overhang slightly into the tile buffer, which is fine downstream).
fn decode_geometry(stream: &[u32], extent: u32) -> Vec<Vec<[f64; 2]>> {
    let inv_extent = 1.0 / extent as f64;
    let mut paths: Vec<Vec<[f64; 2]>> = Vec::new();
    let mut current: Vec<[f64; 2]> = Vec::new();
    let (mut cx, mut cy) = (0i64, 0i64);

    let mut i = 0;
    while i < stream.len() {
        let cmd_len = stream[i];
        i += 1;
        let cmd = cmd_len & 0x7;
        let count = (cmd_len >> 3) as usize;

        match cmd {
            GEOM_MOVE_TO | GEOM_LINE_TO => {
                if i + count * 2 > stream.len() {
                    break;
                }
                for _ in 0..count {
                    if cmd == GEOM_MOVE_TO && !current.is_empty() {
                        paths.push(std::mem::take(&mut current));
                    }
                    cx += decode_zigzag32(stream[i]) as i64;
                    cy += decode_zigzag32(stream[i + 1]) as i64;
                    i += 2;
                    current.push([cx as f64 * inv_extent, cy as f64 * inv_extent]);
                }
            }
            GEOM_CLOSE_PATH => {
                if let Some(&first) = current.first() {
                    current.push(first);
                    paths.push(std::mem::take(&mut current));
                }
            }
            _ => break,
        }
    }

    if !current.is_empty() {
        paths.push(current);
    }
    paths
}

fn extract_label(
    layer: &RawLayer<'_>,
    feature: &RawFeature,
    paths: &[Vec<[f64; 2]>],
    transform: &TileTransform,
    base_priority: f32,
) -> Option<LabelInfo> {
    let text = attribute(layer, feature, "name")
        .and_then(|v| v.as_str().map(str::to_owned))
        .or_else(|| {
            attribute(layer, feature, "housenumber").and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                other => other.as_f64().map(|n| format!("{n}")),
            })
        })?;

    let priority = match attribute(layer, feature, "rank").and_then(|v| v.as_f64()) {
        Some(rank) => base_priority - rank as f32,
        None => base_priority,
    };

    let first = paths.first()?.first()?;
    let (mx, my) = transform.apply(first[0], first[1]);
    Some(LabelInfo {
        text,
        mx,
        my,
        layer: layer.name.clone(),
        priority,
    })
}

fn attribute<'v>(layer: &'v RawLayer<'_>, feature: &RawFeature, key: &str) -> Option<&'v Value> {
    for pair in feature.tags.chunks(2) {
        let [k, v] = pair else { continue };
        if layer.keys.get(*k as usize).map(String::as_str) == Some(key) {
            return layer.values.get(*v as usize);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mvt::test_support::{varint, TileBuilder};

    fn allow(names: &[&str]) -> FxHashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_geometry_command_stream_trace() {
        // MoveTo(+2,+2), LineTo(+1,+1)(+2,+2): cursor (2,2) (3,3) (5,5)
        let stream = vec![9, 4, 4, 18, 2, 2, 4, 4];
        let paths = decode_geometry(&stream, 4096);
        assert_eq!(paths.len(), 1);
        let scaled: Vec<[f64; 2]> = paths[0]
            .iter()
            .map(|p| [p[0] * 4096.0, p[1] * 4096.0])
            .collect();
        assert_eq!(scaled, vec![[2.0, 2.0], [3.0, 3.0], [5.0, 5.0]]);
    }

    #[test]
    fn test_geometry_negative_deltas() {
        // MoveTo(-2,-3): zigzag(-2)=3, zigzag(-3)=5
        let stream = vec![9, 3, 5];
        let paths = decode_geometry(&stream, 1);
        assert_eq!(paths, vec![vec![[-2.0, -3.0]]]);
    }

    #[test]
    fn test_geometry_close_path_appends_first() {
        // MoveTo(0,0), LineTo(+4,0)(0,+4), ClosePath
        let stream = vec![9, 0, 0, 18, 8, 0, 0, 8, 15];
        let paths = decode_geometry(&stream, 1);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].first(), paths[0].last());
        assert_eq!(paths[0].len(), 4);
    }

    #[test]
    fn test_geometry_truncated_stream() {
        // LineTo claims 2 points but delivers half of one
        let stream = vec![9, 0, 0, 18, 8];
        let paths = decode_geometry(&stream, 1);
        assert_eq!(paths.len(), 1);
    }

    #[test]
    fn test_parse_tile_filters_by_allowlist() {
        let bytes = TileBuilder::new()
            .layer("water", |l| { l.polygon_feature(&[(0, 0), (64, 0), (64, 64)]); })
            .layer("ignored", |l| { l.polygon_feature(&[(0, 0), (64, 0), (64, 64)]); })
            .build();

        let parsed =
            parse_tile(&bytes, TileCoord::new(0, 0, 0), &allow(&["water"])).unwrap();
        assert_eq!(parsed.features.len(), 1);
        assert_eq!(parsed.features[0].layer, "water");
        assert_eq!(parsed.features[0].kind, GeometryKind::Polygon);
        assert!(!parsed.features[0].indices.is_empty());
    }

    #[test]
    fn test_parse_tile_gzip_roundtrip() {
        let plain = TileBuilder::new()
            .layer("water", |l| { l.polygon_feature(&[(0, 0), (64, 0), (64, 64)]); })
            .build();

        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        std::io::Write::write_all(&mut encoder, &plain).unwrap();
        let gzipped = encoder.finish().unwrap();
        assert!(gzipped.starts_with(&[0x1F, 0x8B]));

        let parsed =
            parse_tile(&gzipped, TileCoord::new(0, 0, 0), &allow(&["water"])).unwrap();
        assert_eq!(parsed.features.len(), 1);
    }

    #[test]
    fn test_parse_tile_extracts_labels() {
        let bytes = TileBuilder::new()
            .layer("place", |l| {
                l.point_feature_with_name(2048, 2048, "Berlin", Some(3));
            })
            .build();

        let parsed =
            parse_tile(&bytes, TileCoord::new(0, 0, 0), &allow(&["place"])).unwrap();
        assert_eq!(parsed.labels.len(), 1);
        let label = &parsed.labels[0];
        assert_eq!(label.text, "Berlin");
        assert_eq!(label.priority, 97.0);
        assert!((label.mx - 0.5).abs() < 1e-6);
        assert!((label.my - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_parse_tile_garbage_errors_not_panics() {
        let garbage = vec![0x1A, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        assert!(parse_tile(&garbage, TileCoord::new(0, 0, 0), &allow(&["water"])).is_err());
    }

    #[test]
    fn test_parse_value_union() {
        // string value
        let mut bytes = vec![0x0A, 0x02, b'h', b'i'];
        assert_eq!(parse_value(&bytes).unwrap(), Value::String("hi".into()));

        // bool value
        bytes = vec![0x38, 0x01];
        assert_eq!(parse_value(&bytes).unwrap(), Value::Bool(true));

        // sint value -5 (zigzag 9)
        bytes = vec![0x30, 0x09];
        assert_eq!(parse_value(&bytes).unwrap(), Value::Sint(-5));
    }

    #[test]
    fn test_varint_helper_matches_reader() {
        let bytes = varint(300);
        let mut reader = PbfReader::new(&bytes);
        assert_eq!(reader.read_varint().unwrap(), 300);
    }
}
