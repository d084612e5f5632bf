//! Asynchronous tile fetching and decoding.
//!
//! One task per tile: download, optional gunzip, MVT parse, tessellation.
//! The store owns dispatch and commits; this module owns the HTTP client
//! and the fetch/decode policy.

use fxhash::FxHashSet;
use log::{debug, warn};
use once_cell::sync::Lazy;
use reqwest::StatusCode;

use crate::core::geo::TileCoord;
use crate::mvt::parser;
use crate::tiles::{FeatureSet, LabelInfo};

/// Shared async HTTP client optimized for tile fetching
pub(crate) static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent("tilecraft/0.1 (+https://github.com/example/tilecraft)")
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .expect("failed to build reqwest async client")
});

/// What the store should do with the cache entry after a fetch attempt
#[derive(Debug)]
pub enum FetchOutcome {
    /// Decoded payload (possibly empty for 404/410 tiles)
    Ready {
        features: Vec<FeatureSet>,
        labels: Vec<LabelInfo>,
    },
    /// Server or payload is broken; keep a Failed entry so the key is not
    /// hammered until the next prune
    Failed,
    /// Transport-level problem; drop the entry so the next planning pass
    /// can retry
    Retry,
}

/// Downloads and decodes one tile.
pub async fn fetch_and_decode(
    url: &str,
    coord: TileCoord,
    allowlist: &FxHashSet<String>,
) -> FetchOutcome {
    let response = match HTTP_CLIENT.get(url).send().await {
        Ok(response) => response,
        Err(e) => {
            warn!("tile {coord} request failed: {e}");
            return FetchOutcome::Retry;
        }
    };

    let status = response.status();
    if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
        debug!("tile {coord} is empty ({status})");
        return FetchOutcome::Ready {
            features: Vec::new(),
            labels: Vec::new(),
        };
    }
    if !status.is_success() {
        warn!("tile {coord} fetch returned {status}");
        return FetchOutcome::Failed;
    }

    match response.bytes().await {
        Ok(bytes) => decode_bytes(&bytes, coord, allowlist),
        Err(e) => {
            warn!("tile {coord} body read failed: {e}");
            FetchOutcome::Retry
        }
    }
}

/// Decodes downloaded bytes; split out so tests can exercise the decode
/// policy without a server.
pub fn decode_bytes(bytes: &[u8], coord: TileCoord, allowlist: &FxHashSet<String>) -> FetchOutcome {
    match parser::parse_tile(bytes, coord, allowlist) {
        Ok(parsed) => {
            debug!(
                "tile {coord} decoded: {} feature sets, {} labels",
                parsed.features.len(),
                parsed.labels.len()
            );
            FetchOutcome::Ready {
                features: parsed.features,
                labels: parsed.labels,
            }
        }
        Err(e) => {
            warn!("tile {coord} is corrupt: {e}");
            FetchOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mvt::test_support::TileBuilder;

    fn allow(names: &[&str]) -> FxHashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_decode_bytes_ready() {
        let bytes = TileBuilder::new()
            .layer("water", |l| { l.polygon_feature(&[(0, 0), (64, 0), (64, 64)]); })
            .build();
        match decode_bytes(&bytes, TileCoord::new(0, 0, 0), &allow(&["water"])) {
            FetchOutcome::Ready { features, .. } => assert_eq!(features.len(), 1),
            other => panic!("expected Ready, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_bytes_corrupt_is_failed() {
        let garbage = vec![0x1A, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        match decode_bytes(&garbage, TileCoord::new(0, 0, 0), &allow(&["water"])) {
            FetchOutcome::Failed => {}
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_empty_payload_is_ready() {
        match decode_bytes(&[], TileCoord::new(0, 0, 0), &allow(&["water"])) {
            FetchOutcome::Ready { features, labels } => {
                assert!(features.is_empty());
                assert!(labels.is_empty());
            }
            other => panic!("expected Ready, got {other:?}"),
        }
    }
}
