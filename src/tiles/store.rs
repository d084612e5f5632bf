//! The tile store: keyed cache, viewport-driven fetch planning, and
//! parent-fallback render selection.
//!
//! The map of entries sits behind a single mutex. Fetch workers commit
//! completed tiles under that mutex; the render thread takes it once per
//! frame to snapshot `Arc` handles. Entries are replaced wholesale on
//! state transitions, so a snapshotted Ready tile is immutable.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use fxhash::{FxHashMap, FxHashSet};
use log::debug;
use tokio::sync::Semaphore;

use crate::core::geo::{LngLatBounds, TileCoord};
use crate::runtime;
use crate::tiles::loader::{self, FetchOutcome};
use crate::tiles::source::TileSource;
use crate::tiles::{FeatureSet, LabelInfo, TileData, TileState};

/// Process-wide cache of decoded tiles plus the fetch planner
pub struct TileStore {
    tiles: Arc<Mutex<FxHashMap<String, Arc<TileData>>>>,
    source: Arc<dyn TileSource>,
    allowlist: Arc<FxHashSet<String>>,
    fetch_permits: Arc<Semaphore>,
    max_tile_zoom: u8,
    tile_buffer: u32,
    completed_tx: Sender<TileCoord>,
    completed_rx: Receiver<TileCoord>,
}

impl TileStore {
    pub fn new(
        source: Arc<dyn TileSource>,
        allowlist: FxHashSet<String>,
        max_tile_zoom: u8,
        tile_buffer: u32,
        max_concurrent_fetches: usize,
    ) -> Self {
        let (completed_tx, completed_rx) = unbounded();
        Self {
            tiles: Arc::new(Mutex::new(FxHashMap::default())),
            source,
            allowlist: Arc::new(allowlist),
            fetch_permits: Arc::new(Semaphore::new(max_concurrent_fetches.max(1))),
            max_tile_zoom,
            tile_buffer,
            completed_tx,
            completed_rx,
        }
    }

    /// Integer fetch zoom for a continuous camera zoom
    pub fn fetch_zoom(&self, camera_zoom: f64) -> u8 {
        (camera_zoom.floor().max(0.0) as i64).min(self.max_tile_zoom as i64) as u8
    }

    /// Enumerates the tile span covering `bounds` at the fetch zoom, plus
    /// the configured buffer ring.
    pub fn viewport_tiles(&self, bounds: &LngLatBounds, camera_zoom: f64) -> Vec<TileCoord> {
        let z = self.fetch_zoom(camera_zoom);
        let max_coord = (1u32 << z) - 1;

        // North-west and south-east corners; mercator y grows southward
        let nw = TileCoord::from_lnglat(bounds.min_lng, bounds.max_lat, z);
        let se = TileCoord::from_lnglat(bounds.max_lng, bounds.min_lat, z);

        let x0 = nw.x.saturating_sub(self.tile_buffer);
        let y0 = nw.y.saturating_sub(self.tile_buffer);
        let x1 = se.x.saturating_add(self.tile_buffer).min(max_coord);
        let y1 = se.y.saturating_add(self.tile_buffer).min(max_coord);

        let mut tiles = Vec::with_capacity(((x1 - x0 + 1) * (y1 - y0 + 1)) as usize);
        for y in y0..=y1 {
            for x in x0..=x1 {
                tiles.push(TileCoord::new(x, y, z));
            }
        }
        tiles
    }

    /// Plans fetches for the viewport: span + buffer ring, plus parent and
    /// grandparent of every tile as overzoom placeholders. Keys already in
    /// the store are left alone, which also guarantees at most one
    /// in-flight fetch per key.
    pub fn plan(&self, bounds: &LngLatBounds, camera_zoom: f64) {
        self.plan_with_dispatch(bounds, camera_zoom, |store, coord| store.dispatch_fetch(coord));
    }

    fn plan_with_dispatch(
        &self,
        bounds: &LngLatBounds,
        camera_zoom: f64,
        mut dispatch: impl FnMut(&Self, TileCoord),
    ) {
        let mut wanted: Vec<TileCoord> = Vec::new();
        let mut seen: FxHashSet<String> = FxHashSet::default();
        for tile in self.viewport_tiles(bounds, camera_zoom) {
            for candidate in [Some(tile), tile.parent(), tile.parent().and_then(|p| p.parent())]
                .into_iter()
                .flatten()
            {
                if candidate.is_valid() && seen.insert(candidate.key()) {
                    wanted.push(candidate);
                }
            }
        }

        let mut to_dispatch = Vec::new();
        if let Ok(mut tiles) = self.tiles.lock() {
            for coord in wanted {
                let key = coord.key();
                if !tiles.contains_key(&key) {
                    tiles.insert(key, Arc::new(TileData::loading(coord)));
                    to_dispatch.push(coord);
                }
            }
        }

        if !to_dispatch.is_empty() {
            debug!("planning {} tile fetches", to_dispatch.len());
        }
        for coord in to_dispatch {
            dispatch(self, coord);
        }
    }

    fn dispatch_fetch(&self, coord: TileCoord) {
        let url = self.source.url(coord);
        let tiles = Arc::clone(&self.tiles);
        let allowlist = Arc::clone(&self.allowlist);
        let permits = Arc::clone(&self.fetch_permits);
        let completed = self.completed_tx.clone();

        runtime::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            let outcome = loader::fetch_and_decode(&url, coord, &allowlist).await;
            if let Ok(mut tiles) = tiles.lock() {
                match outcome {
                    FetchOutcome::Ready { features, labels } => {
                        tiles.insert(
                            coord.key(),
                            Arc::new(TileData::ready(coord, features, labels)),
                        );
                    }
                    FetchOutcome::Failed => {
                        tiles.insert(coord.key(), Arc::new(TileData::failed(coord)));
                    }
                    FetchOutcome::Retry => {
                        tiles.remove(&coord.key());
                    }
                }
            }
            let _ = completed.send(coord);
        });
    }

    /// Commits a decoded tile; exposed for workers and tests.
    pub fn commit_ready(&self, coord: TileCoord, features: Vec<FeatureSet>, labels: Vec<LabelInfo>) {
        if let Ok(mut tiles) = self.tiles.lock() {
            tiles.insert(coord.key(), Arc::new(TileData::ready(coord, features, labels)));
        }
    }

    pub fn commit_failed(&self, coord: TileCoord) {
        if let Ok(mut tiles) = self.tiles.lock() {
            tiles.insert(coord.key(), Arc::new(TileData::failed(coord)));
        }
    }

    /// Selects, for each viewport tile, the first Ready tile on its
    /// ancestor chain (self, parent, ... up to z = 0), deduplicated so one
    /// coarse tile stands in for many descendants.
    pub fn renderable_tiles(&self, viewport_tiles: &[TileCoord]) -> Vec<Arc<TileData>> {
        let Ok(tiles) = self.tiles.lock() else {
            return Vec::new();
        };
        let mut picked: FxHashSet<String> = FxHashSet::default();
        let mut out = Vec::new();

        for &tile in viewport_tiles {
            let mut cursor = Some(tile);
            while let Some(coord) = cursor {
                let key = coord.key();
                if let Some(entry) = tiles.get(&key) {
                    if entry.state == TileState::Ready {
                        if picked.insert(key) {
                            out.push(Arc::clone(entry));
                        }
                        break;
                    }
                }
                cursor = coord.parent();
            }
        }
        out
    }

    /// Removes Ready entries older than `max_age` whose key is outside the
    /// current viewport set.
    pub fn prune(&self, max_age: Duration, viewport_keys: &FxHashSet<String>) {
        let Ok(mut tiles) = self.tiles.lock() else {
            return;
        };
        let before = tiles.len();
        tiles.retain(|key, entry| {
            entry.state != TileState::Ready
                || viewport_keys.contains(key)
                || entry.loaded_at.elapsed() <= max_age
        });
        let dropped = before - tiles.len();
        if dropped > 0 {
            debug!("pruned {dropped} stale tiles");
        }
    }

    /// True when fetches finished since the last drain; drives redraw
    pub fn has_completed(&self) -> bool {
        !self.completed_rx.is_empty()
    }

    /// Number of completed fetches since the last call; drives redraw
    pub fn drain_completed(&self) -> usize {
        let mut count = 0;
        while self.completed_rx.try_recv().is_ok() {
            count += 1;
        }
        count
    }

    pub fn len(&self) -> usize {
        self.tiles.lock().map(|tiles| tiles.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current state of an entry, if present
    pub fn state_of(&self, coord: &TileCoord) -> Option<TileState> {
        self.tiles.lock().ok()?.get(&coord.key()).map(|entry| entry.state)
    }
}
