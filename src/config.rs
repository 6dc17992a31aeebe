//! Runtime configuration.
//!
//! Values come from command-line flags with environment fallbacks (see
//! `cli::ConfigArgs`); this module validates them into a [`Config`].

use std::time::Duration;

use url::Url;

use crate::errors::RiskwatchError;
use crate::models::validate_coordinates;

/// Backend used when nothing is configured.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000";

/// Name for coordinates entered without one.
pub const DEFAULT_LOCATION_NAME: &str = "Detected location";

/// Re-prediction interval for the selected location.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 300_000;

/// Country the geocoding search is scoped to.
pub const DEFAULT_COUNTRY_CODE: &str = "in";

/// Validated configuration shared by every command.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: Url,
    pub default_location_name: String,
    pub poll_interval: Duration,
    pub auto_geolocation: bool,
    pub country_code: String,
    /// Fixed device position used by the geolocation flow
    pub device_position: Option<(f64, f64)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: Url::parse(DEFAULT_API_BASE_URL)
                .unwrap_or_else(|_| unreachable!("default base URL is valid")),
            default_location_name: DEFAULT_LOCATION_NAME.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            auto_geolocation: false,
            country_code: DEFAULT_COUNTRY_CODE.to_string(),
            device_position: None,
        }
    }
}

impl Config {
    /// Build a configuration from raw settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL does not parse, the poll interval is
    /// zero, or the device position is off the globe.
    pub fn from_parts(
        api_base_url: &str,
        default_location_name: &str,
        poll_interval_ms: u64,
        auto_geolocation: bool,
        country_code: &str,
        device_position: Option<&str>,
    ) -> Result<Self, RiskwatchError> {
        let api_base_url = Url::parse(api_base_url.trim())?;
        if !matches!(api_base_url.scheme(), "http" | "https") {
            return Err(RiskwatchError::Config(format!(
                "API base URL must be http or https, got {}",
                api_base_url.scheme()
            )));
        }

        if poll_interval_ms == 0 {
            return Err(RiskwatchError::Config(
                "poll interval must be positive".into(),
            ));
        }

        let country_code = country_code.trim().to_lowercase();
        if country_code.len() != 2 || !country_code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(RiskwatchError::Config(format!(
                "country code must be two letters, got '{country_code}'"
            )));
        }

        let device_position = device_position.map(parse_position).transpose()?;

        Ok(Self {
            api_base_url,
            default_location_name: default_location_name.to_string(),
            poll_interval: Duration::from_millis(poll_interval_ms),
            auto_geolocation,
            country_code,
            device_position,
        })
    }

    /// Append an API path to the base URL, keeping any path prefix the
    /// base carries (`https://host/backend` + `/api/x` is
    /// `https://host/backend/api/x`).
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL cannot take path segments.
    pub fn api_url(&self, path: &str) -> Result<Url, RiskwatchError> {
        let mut url = self.api_base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                RiskwatchError::Config(format!("{} cannot be used as a base URL", self.api_base_url))
            })?
            .pop_if_empty()
            .extend(path.split('/').filter(|segment| !segment.is_empty()));
        Ok(url)
    }

    /// WebSocket endpoint of the live alert channel on the same host.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL scheme cannot be switched.
    pub fn socket_url(&self) -> Result<Url, RiskwatchError> {
        // Socket.IO treats a base path as a namespace, so the endpoint is at the root
        let mut url = self.api_base_url.join("/socket.io/")?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|()| RiskwatchError::Config(format!("cannot use {scheme} for {url}")))?;
        url.set_query(Some("EIO=4&transport=websocket"));
        Ok(url)
    }
}

/// Parse `lat,lon`.
fn parse_position(s: &str) -> Result<(f64, f64), RiskwatchError> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 2 {
        return Err(RiskwatchError::Config(format!(
            "device position requires 2 values (lat,lon), got {}",
            parts.len()
        )));
    }

    let lat = parts[0]
        .trim()
        .parse::<f64>()
        .map_err(|e| RiskwatchError::Config(format!("invalid latitude: {e}")))?;
    let lon = parts[1]
        .trim()
        .parse::<f64>()
        .map_err(|e| RiskwatchError::Config(format!("invalid longitude: {e}")))?;

    validate_coordinates(lat, lon)?;
    Ok((lat, lon))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base: &str) -> Config {
        Config::from_parts(base, DEFAULT_LOCATION_NAME, 1000, false, "IN", None).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api_base_url.as_str(), "http://localhost:5000/");
        assert_eq!(config.poll_interval, Duration::from_secs(300));
        assert!(!config.auto_geolocation);
        assert_eq!(config.country_code, "in");
    }

    #[test]
    fn test_api_url_join() {
        let config = config("http://localhost:5000");
        assert_eq!(
            config.api_url("/api/predictions/history").unwrap().as_str(),
            "http://localhost:5000/api/predictions/history"
        );
    }

    #[test]
    fn test_api_url_keeps_base_path_prefix() {
        let expected = "https://example.org/backend/api/predictions";
        assert_eq!(
            config("https://example.org/backend").api_url("/api/predictions").unwrap().as_str(),
            expected
        );
        assert_eq!(
            config("https://example.org/backend/").api_url("/api/predictions").unwrap().as_str(),
            expected
        );
        assert_eq!(
            config("https://example.org/backend").socket_url().unwrap().as_str(),
            "wss://example.org/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn test_socket_url() {
        assert_eq!(
            config("http://localhost:5000").socket_url().unwrap().as_str(),
            "ws://localhost:5000/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            config("https://risk.example.org").socket_url().unwrap().as_str(),
            "wss://risk.example.org/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn test_rejects_bad_settings() {
        assert!(Config::from_parts("ftp://x", "n", 1000, false, "in", None).is_err());
        assert!(Config::from_parts("http://x", "n", 0, false, "in", None).is_err());
        assert!(Config::from_parts("http://x", "n", 1000, false, "ind", None).is_err());
        assert!(Config::from_parts("http://x", "n", 1000, false, "in", Some("95,10")).is_err());
    }

    #[test]
    fn test_device_position() {
        let config =
            Config::from_parts("http://x", "n", 1000, true, "in", Some("12.97, 77.59")).unwrap();
        assert_eq!(config.device_position, Some((12.97, 77.59)));
        assert_eq!(config.country_code, "in");
    }
}
