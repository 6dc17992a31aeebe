//! OpenStreetMap Nominatim geocoding client.
//!
//! Forward search is scoped to one country; reverse lookup turns coordinates
//! into a display name. Both fail soft: callers get an empty list or `None`
//! and a warning in the log.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::errors::RiskwatchError;
use crate::models::{Location, coordinate_label};

/// Geocoding request timeout in seconds (shorter than the backend to fail fast).
const GEOCODE_TIMEOUT_SECS: u64 = 8;

/// Nominatim requires an identifying user agent.
const GEOCODE_USER_AGENT: &str = concat!("riskwatch/", env!("CARGO_PKG_VERSION"));

/// Public Nominatim instance.
const NOMINATIM_BASE_URL: &str = "https://nominatim.openstreetmap.org";

/// Maximum results requested from forward search.
pub const SEARCH_LIMIT: usize = 10;

/// Free-text place search.
pub trait ForwardGeocoder: Send + Sync {
    /// Places matching `query`, or an empty list on any failure.
    fn search(&self, query: &str) -> impl Future<Output = Vec<Location>> + Send;
}

/// Reverse geocoding, as the geolocation flow and map picks need it.
pub trait ReverseGeocoder: Send + Sync {
    /// Resolve coordinates to a named location, or `None` on any failure.
    fn reverse(&self, latitude: f64, longitude: f64) -> impl Future<Output = Option<Location>> + Send;
}

/// One forward-search hit as Nominatim returns it.
#[derive(Debug, Clone, Deserialize)]
struct SearchHit {
    display_name: String,
    /// Nominatim encodes coordinates as strings
    lat: String,
    lon: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    importance: Option<f64>,
    #[serde(default)]
    address: Option<Value>,
}

impl SearchHit {
    fn into_location(self) -> Option<Location> {
        let latitude = self.lat.trim().parse::<f64>().ok()?;
        let longitude = self.lon.trim().parse::<f64>().ok()?;

        let mut location = Location::new(self.display_name, latitude, longitude);
        location.kind = self.kind;
        location.importance = self.importance;
        location.address = self.address;
        Some(location)
    }
}

/// Reverse lookup response.
#[derive(Debug, Clone, Deserialize)]
struct ReverseHit {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    address: Option<Value>,
}

/// Client for the Nominatim search and reverse endpoints.
#[derive(Debug, Clone)]
pub struct NominatimClient {
    client: Client,
    base_url: String,
    country_code: String,
}

impl NominatimClient {
    /// Create a new geocoding client scoped to `country_code`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(country_code: &str) -> Result<Self, RiskwatchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(GEOCODE_TIMEOUT_SECS))
            .user_agent(GEOCODE_USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: NOMINATIM_BASE_URL.to_string(),
            country_code: country_code.to_string(),
        })
    }

    /// Search for places matching free text.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or response cannot be parsed.
    #[instrument(skip(self))]
    pub async fn try_search(&self, query: &str) -> Result<Vec<Location>, RiskwatchError> {
        let url = format!("{}/search", self.base_url);
        let limit = SEARCH_LIMIT.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("countrycodes", self.country_code.as_str()),
                ("limit", limit.as_str()),
                ("addressdetails", "1"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RiskwatchError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let hits: Vec<SearchHit> = response.json().await?;
        let locations: Vec<Location> = hits.into_iter().filter_map(SearchHit::into_location).collect();

        debug!("geocoding returned {} places", locations.len());
        Ok(locations)
    }

    /// Reverse-geocode coordinates.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, times out, or cannot be parsed.
    #[instrument(skip(self))]
    pub async fn try_reverse(&self, latitude: f64, longitude: f64) -> Result<Location, RiskwatchError> {
        let url = format!("{}/reverse", self.base_url);
        let lat = latitude.to_string();
        let lon = longitude.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("format", "json"),
                ("addressdetails", "1"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RiskwatchError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let hit: ReverseHit = response.json().await?;
        Ok(reverse_location(hit, latitude, longitude))
    }
}

impl ForwardGeocoder for NominatimClient {
    async fn search(&self, query: &str) -> Vec<Location> {
        match self.try_search(query).await {
            Ok(locations) => locations,
            Err(e) => {
                warn!("geocoding search failed: {}", e);
                Vec::new()
            }
        }
    }
}

impl ReverseGeocoder for NominatimClient {
    async fn reverse(&self, latitude: f64, longitude: f64) -> Option<Location> {
        match self.try_reverse(latitude, longitude).await {
            Ok(location) => Some(location),
            Err(RiskwatchError::Http(e)) if e.is_timeout() => {
                warn!("reverse geocoding timed out, using coordinates as fallback");
                None
            }
            Err(e) => {
                warn!("reverse geocoding failed: {}", e);
                None
            }
        }
    }
}

/// Name a reverse hit, falling back to the coordinate label.
fn reverse_location(hit: ReverseHit, latitude: f64, longitude: f64) -> Location {
    let name = hit
        .display_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| coordinate_label(latitude, longitude));

    let mut location = Location::new(name, latitude, longitude);
    location.address = hit.address;
    location
}
