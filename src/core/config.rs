//! Map construction options.

use serde::{Deserialize, Serialize};

/// Straight-alpha RGBA color, components in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Self::new(0.5, 0.5, 0.5, 1.0)
    }
}

/// Configuration options for the map
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapOptions {
    /// Initial viewport width in pixels
    pub viewport_w: u32,
    /// Initial viewport height in pixels
    pub viewport_h: u32,
    /// Initial center longitude
    pub center_lng: f64,
    /// Initial center latitude
    pub center_lat: f64,
    /// Initial zoom level
    pub zoom: f64,
    /// Minimum zoom level
    pub min_zoom: f64,
    /// Maximum zoom level
    pub max_zoom: f64,
    /// Highest zoom level the tile server provides; deeper views overzoom
    pub max_tile_zoom: u8,
    /// Extra ring of tiles fetched around the visible span
    pub tile_buffer: u32,
    /// Tile URL template with `{z}`, `{x}`, `{y}` placeholders
    pub tile_url: String,
    /// Fill color per layer name
    pub layer_colors: Vec<(String, Rgba)>,
    /// Layers that are parsed but never drawn
    pub disabled_layers: Vec<String>,
    /// Layer names decoded from tiles; everything else is skipped unparsed
    pub layer_allowlist: Vec<String>,
    /// Seconds a tile outside the viewport survives before pruning
    pub tile_ttl_secs: u64,
    /// Maximum concurrent tile fetches
    pub max_concurrent_fetches: usize,
}

impl MapOptions {
    /// Looks up the configured fill color for a layer
    pub fn layer_color(&self, layer: &str) -> Rgba {
        self.layer_colors
            .iter()
            .find(|(name, _)| name == layer)
            .map(|(_, color)| *color)
            .unwrap_or_default()
    }
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            viewport_w: 800,
            viewport_h: 600,
            center_lng: 0.0,
            center_lat: 0.0,
            zoom: 2.0,
            min_zoom: 0.0,
            max_zoom: 20.0,
            max_tile_zoom: 14,
            tile_buffer: 1,
            tile_url: String::new(),
            layer_colors: vec![
                ("background".into(), Rgba::new(0.95, 0.94, 0.91, 1.0)),
                ("landcover".into(), Rgba::new(0.80, 0.88, 0.76, 1.0)),
                ("park".into(), Rgba::new(0.72, 0.87, 0.70, 1.0)),
                ("landuse".into(), Rgba::new(0.88, 0.87, 0.82, 1.0)),
                ("water".into(), Rgba::new(0.65, 0.80, 0.93, 1.0)),
                ("boundary".into(), Rgba::new(0.60, 0.55, 0.60, 1.0)),
                ("transportation".into(), Rgba::new(0.98, 0.93, 0.78, 1.0)),
                ("building".into(), Rgba::new(0.84, 0.81, 0.78, 1.0)),
                ("housenumber".into(), Rgba::new(0.45, 0.42, 0.40, 1.0)),
                ("label".into(), Rgba::new(0.20, 0.20, 0.25, 1.0)),
            ],
            disabled_layers: Vec::new(),
            layer_allowlist: vec![
                "landcover".into(),
                "park".into(),
                "landuse".into(),
                "water".into(),
                "boundary".into(),
                "transportation".into(),
                "building".into(),
                "housenumber".into(),
                "place".into(),
            ],
            tile_ttl_secs: 300,
            max_concurrent_fetches: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_color_lookup() {
        let options = MapOptions::default();
        let water = options.layer_color("water");
        assert!(water.b > water.r);
        assert_eq!(options.layer_color("no-such-layer"), Rgba::default());
    }

    #[test]
    fn test_options_serde_roundtrip() {
        let options = MapOptions {
            zoom: 7.5,
            tile_url: "https://host/{z}/{x}/{y}.pbf".into(),
            ..MapOptions::default()
        };
        let json = serde_json::to_string(&options).unwrap();
        let back: MapOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back.zoom, 7.5);
        assert_eq!(back.tile_url, options.tile_url);
    }
}
