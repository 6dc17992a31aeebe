//! Location search: preset filter plus geocoding, merged and deduplicated.
//!
//! Keystroke-style query streams go through [`debounce`] so only the last
//! query of a burst reaches the network.

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use crate::geocode::ForwardGeocoder;
use crate::models::Location;
use crate::presets::search_presets;

/// Maximum number of merged results shown.
pub const MAX_RESULTS: usize = 10;

/// Quiet period before a query is issued.
pub const DEBOUNCE_DELAY: Duration = Duration::from_millis(300);

/// Queries shorter than this (after trimming) are not searched.
pub const MIN_QUERY_CHARS: usize = 3;

/// Which lookup paths a search uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    /// Built-in city list only
    Preset,
    /// Geocoding service only
    Real,
    /// Presets first, then geocoding
    #[default]
    Both,
}

impl std::str::FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "preset" => Ok(Self::Preset),
            "real" => Ok(Self::Real),
            "both" => Ok(Self::Both),
            _ => Err(format!("unknown search mode: {s} (expected: preset, real, both)")),
        }
    }
}

/// Key two results share when they sit on the same 4-decimal coordinate.
#[allow(clippy::cast_possible_truncation)]
fn coordinate_key(location: &Location) -> (i64, i64) {
    (
        (location.latitude * 10_000.0).round() as i64,
        (location.longitude * 10_000.0).round() as i64,
    )
}

/// Drop results whose rounded coordinates were already seen, keep
/// first-seen order, and cap the list at [`MAX_RESULTS`].
#[must_use]
pub fn merge_results<I>(results: I) -> Vec<Location>
where
    I: IntoIterator<Item = Location>,
{
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|location| seen.insert(coordinate_key(location)))
        .take(MAX_RESULTS)
        .collect()
}

/// Run a search over the selected lookup paths.
pub async fn search<G: ForwardGeocoder>(geocoder: &G, query: &str, mode: SearchMode) -> Vec<Location> {
    let presets = match mode {
        SearchMode::Preset | SearchMode::Both => search_presets(query),
        SearchMode::Real => Vec::new(),
    };

    let places = match mode {
        SearchMode::Real | SearchMode::Both if !query.trim().is_empty() => {
            geocoder.search(query.trim()).await
        }
        _ => Vec::new(),
    };

    debug!(
        "search '{}': {} presets, {} geocoded",
        query,
        presets.len(),
        places.len()
    );

    merge_results(presets.into_iter().chain(places))
}

/// Coalesce a stream of queries: each query is forwarded only after
/// `delay` passes without a newer one. Closing the input flushes the
/// pending query.
#[must_use]
pub fn debounce(mut input: mpsc::Receiver<String>, delay: Duration) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);

    tokio::spawn(async move {
        while let Some(mut pending) = input.recv().await {
            loop {
                tokio::select! {
                    next = input.recv() => match next {
                        Some(query) => pending = query,
                        None => {
                            let _ = tx.send(pending).await;
                            return;
                        }
                    },
                    () = tokio::time::sleep(delay) => {
                        if tx.send(pending).await.is_err() {
                            return;
                        }
                        break;
                    }
                }
            }
        }
    });

    rx
}
