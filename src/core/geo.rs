use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// Latitudes beyond this fold into the mercator singularity and are clipped.
pub const MAX_LATITUDE: f64 = 85.0511287798066;

/// Represents a geographical coordinate with longitude and latitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    /// Creates a new LngLat coordinate
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// Validates that the coordinates are within valid ranges
    pub fn is_valid(&self) -> bool {
        self.lat >= -90.0 && self.lat <= 90.0 && self.lng >= -180.0 && self.lng <= 180.0
    }

    /// Wraps longitude to [-180, 180] range
    pub fn wrap_lng(lng: f64) -> f64 {
        let wrapped = lng % 360.0;
        if wrapped > 180.0 {
            wrapped - 360.0
        } else if wrapped < -180.0 {
            wrapped + 360.0
        } else {
            wrapped
        }
    }

    /// Clamps latitude to the mercator-safe range
    pub fn clamp_lat(lat: f64) -> f64 {
        lat.clamp(-MAX_LATITUDE, MAX_LATITUDE)
    }
}

impl Default for LngLat {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Web-Mercator projection onto the unit square.
///
/// The origin is the north-west corner of the world; `my` increases
/// southward. All internal geometry lives in this space as 64-bit floats.
pub struct Mercator;

impl Mercator {
    /// Projects a longitude/latitude pair to unit-square mercator.
    pub fn from_lnglat(lng: f64, lat: f64) -> (f64, f64) {
        let lat = LngLat::clamp_lat(lat);
        let mx = (lng + 180.0) / 360.0;
        let my = (180.0 - (180.0 / PI) * ((PI / 4.0 + lat * PI / 360.0).tan()).ln()) / 360.0;
        (mx, my)
    }

    /// Inverse projection back to longitude/latitude.
    pub fn to_lnglat(mx: f64, my: f64) -> (f64, f64) {
        let lng = mx * 360.0 - 180.0;
        let lat = (360.0 / PI) * ((180.0 - my * 360.0) * PI / 180.0).exp().atan() - 90.0;
        (lng, lat)
    }
}

/// Represents a bounding box of geographical coordinates.
///
/// Antimeridian crossing is unsupported; construction clamps to one world.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LngLatBounds {
    pub min_lng: f64,
    pub min_lat: f64,
    pub max_lng: f64,
    pub max_lat: f64,
}

impl LngLatBounds {
    pub fn new(min_lng: f64, min_lat: f64, max_lng: f64, max_lat: f64) -> Self {
        Self {
            min_lng: min_lng.max(-180.0),
            min_lat: min_lat.max(-90.0),
            max_lng: max_lng.min(180.0),
            max_lat: max_lat.min(90.0),
        }
    }

    /// Empty bounds ready to be extended point by point
    pub fn empty() -> Self {
        Self {
            min_lng: f64::INFINITY,
            min_lat: f64::INFINITY,
            max_lng: f64::NEG_INFINITY,
            max_lat: f64::NEG_INFINITY,
        }
    }

    /// Checks if the bounds contain a point
    pub fn contains(&self, point: &LngLat) -> bool {
        point.lat >= self.min_lat
            && point.lat <= self.max_lat
            && point.lng >= self.min_lng
            && point.lng <= self.max_lng
    }

    /// Checks if the bounds intersect with another bounds
    pub fn intersects(&self, other: &LngLatBounds) -> bool {
        !(other.max_lat < self.min_lat
            || other.min_lat > self.max_lat
            || other.max_lng < self.min_lng
            || other.min_lng > self.max_lng)
    }

    /// Extends the bounds to include a point
    pub fn extend(&mut self, lng: f64, lat: f64) {
        self.min_lng = self.min_lng.min(lng);
        self.min_lat = self.min_lat.min(lat);
        self.max_lng = self.max_lng.max(lng);
        self.max_lat = self.max_lat.max(lat);
    }

    /// Pads each side by the given degree margins
    pub fn padded(&self, lng_margin: f64, lat_margin: f64) -> Self {
        Self::new(
            self.min_lng - lng_margin,
            self.min_lat - lat_margin,
            self.max_lng + lng_margin,
            self.max_lat + lat_margin,
        )
    }

    /// Gets the center point of the bounds
    pub fn center(&self) -> LngLat {
        LngLat::new(
            (self.min_lng + self.max_lng) / 2.0,
            (self.min_lat + self.max_lat) / 2.0,
        )
    }
}

/// Represents a tile coordinate in the slippy map tile system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TileCoord {
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Creates the tile coordinate containing a point at the given zoom
    pub fn from_lnglat(lng: f64, lat: f64, zoom: u8) -> Self {
        let lat_rad = LngLat::clamp_lat(lat).to_radians();
        let n = 2_f64.powi(zoom as i32);
        let max = (n as u32).saturating_sub(1);

        let x = ((lng + 180.0) / 360.0 * n).floor();
        let y = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n).floor();

        Self::new(
            (x.max(0.0) as u32).min(max),
            (y.max(0.0) as u32).min(max),
            zoom,
        )
    }

    /// North-west corner of the tile in longitude/latitude
    pub fn to_lnglat(&self) -> LngLat {
        let n = 2_f64.powi(self.z as i32);
        let lng = self.x as f64 / n * 360.0 - 180.0;
        let lat_rad = (PI * (1.0 - 2.0 * self.y as f64 / n)).sinh().atan();
        LngLat::new(lng, lat_rad.to_degrees())
    }

    /// Gets the lng/lat rectangle of the tile.
    ///
    /// maxLat comes from row `y` and minLat from row `y + 1` because
    /// mercator y increases southward.
    pub fn to_bbox(&self) -> LngLatBounds {
        let nw = self.to_lnglat();
        let se = TileCoord::new(self.x + 1, self.y + 1, self.z).to_lnglat();
        LngLatBounds::new(nw.lng, se.lat, se.lng, nw.lat)
    }

    /// Gets the parent tile at a lower zoom level
    pub fn parent(&self) -> Option<TileCoord> {
        if self.z == 0 {
            None
        } else {
            Some(TileCoord::new(self.x / 2, self.y / 2, self.z - 1))
        }
    }

    /// Gets the four child tiles at the next zoom level
    pub fn children(&self) -> [TileCoord; 4] {
        [
            TileCoord::new(self.x * 2, self.y * 2, self.z + 1),
            TileCoord::new(self.x * 2 + 1, self.y * 2, self.z + 1),
            TileCoord::new(self.x * 2, self.y * 2 + 1, self.z + 1),
            TileCoord::new(self.x * 2 + 1, self.y * 2 + 1, self.z + 1),
        ]
    }

    /// Checks that x and y fit inside the zoom level's grid
    pub fn is_valid(&self) -> bool {
        let max_coord = 1u32 << self.z.min(31);
        self.x < max_coord && self.y < max_coord
    }

    /// Cache key in `"x/y/z"` form
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.x, self.y, self.z)
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.x, self.y, self.z)
    }
}

impl FromStr for TileCoord {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        let x = parts.next().and_then(|p| p.parse().ok());
        let y = parts.next().and_then(|p| p.parse().ok());
        let z = parts.next().and_then(|p| p.parse().ok());
        match (x, y, z, parts.next()) {
            (Some(x), Some(y), Some(z), None) => Ok(TileCoord::new(x, y, z)),
            _ => Err(format!("invalid tile key: {s}")),
        }
    }
}
