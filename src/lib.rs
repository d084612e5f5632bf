//! # Tilecraft
//!
//! A real-time vector-tile map renderer core. Given a geographic viewport
//! (center, zoom, bearing, pitch) and a tile server emitting Mapbox Vector
//! Tile payloads, tilecraft fetches, parses, tessellates, batches, and
//! submits styled 2D map geometry at interactive frame rates.
//!
//! The crate deliberately stops at two seams:
//!
//! - **GPU**: all draw submission goes through the [`GpuContext`] trait;
//!   the host owns the device, shaders, and swapchain.
//! - **Windowing/input**: the host pumps its event loop and forwards
//!   [`InputEvent`]s to [`Map::on_input`].
//!
//! ## Usage
//!
//! ```no_run
//! use tilecraft::{Map, MapOptions};
//!
//! let mut map = Map::new(MapOptions {
//!     viewport_w: 1024,
//!     viewport_h: 768,
//!     center_lng: 13.404,
//!     center_lat: 52.520,
//!     zoom: 12.0,
//!     tile_url: "https://host/data/v3/{z}/{x}/{y}.pbf".into(),
//!     ..MapOptions::default()
//! });
//! ```

pub mod core;
pub mod input;
pub mod mvt;
pub mod prelude;
pub mod rendering;
pub mod runtime;
pub mod tiles;

// Re-export public API
pub use crate::core::{
    config::{MapOptions, Rgba},
    geo::{LngLat, LngLatBounds, Mercator, TileCoord},
    map::Map,
};

pub use input::events::{InputEvent, MouseButton};

pub use rendering::{
    backend::{GpuContext, PrimitiveKind},
    batcher::{LayerBatcher, GLOBAL_LAYER_ORDER},
    camera::Camera,
    labels::LabelEngine,
};

pub use tiles::{store::TileStore, FeatureSet, GeometryKind, LabelInfo, TileData, TileState};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Decompression error: {0}")]
    Decompress(String),

    #[error("Malformed tile: {0}")]
    MalformedTile(String),

    #[error("Tessellation error: {0}")]
    Tessellation(String),

    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error("Render error: {0}")]
    Render(String),
}

/// Error type alias for convenience
pub type Error = MapError;
