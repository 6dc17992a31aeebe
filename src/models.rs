//! Data models for the prediction backend and geocoding responses.
//!
//! Field names follow the backend's JSON: camelCase envelopes around a
//! snake_case model payload.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::RiskwatchError;

/// Categorical risk output of the prediction model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(format!("unknown risk level: {s} (expected: low, medium, high)")),
        }
    }
}

/// A named geographic point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Backend document ID (only for stored locations)
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub name: String,

    pub latitude: f64,

    pub longitude: f64,

    /// State or region (preset entries)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Place type, e.g. "city" or a Nominatim class
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Address breakdown from geocoding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Value>,

    /// Nominatim ranking hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<f64>,
}

impl Location {
    #[must_use]
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            id: None,
            name: name.into(),
            latitude,
            longitude,
            region: None,
            kind: None,
            address: None,
            importance: None,
        }
    }

    /// A location named only by its coordinates.
    #[must_use]
    pub fn from_coordinates(latitude: f64, longitude: f64) -> Self {
        Self::new(coordinate_label(latitude, longitude), latitude, longitude)
    }

    /// Validate coordinate ranges.
    pub fn validate(&self) -> Result<(), RiskwatchError> {
        validate_coordinates(self.latitude, self.longitude)
    }
}

/// Label used when no place name is known: `Location (lat, lon)`.
#[must_use]
pub fn coordinate_label(latitude: f64, longitude: f64) -> String {
    format!("Location ({latitude:.4}, {longitude:.4})")
}

/// Check that a coordinate pair is on the globe.
pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), RiskwatchError> {
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(RiskwatchError::Config(format!(
            "latitude {latitude} out of range [-90, 90]"
        )));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(RiskwatchError::Config(format!(
            "longitude {longitude} out of range [-180, 180]"
        )));
    }
    Ok(())
}

/// Raw sensor-like inputs the model was evaluated on.
///
/// Missing readings deserialize as `None`; unknown fields are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rainfall_1h_mm: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub river_level_m: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub river_rise_rate_cmphr: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seismic_magnitude: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ground_acceleration_g: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_from_fault_km: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soil_moisture_pct: Option<f64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Class probabilities, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Probabilities {
    #[serde(rename = "Low", default)]
    pub low: f64,

    #[serde(rename = "Medium", default)]
    pub medium: f64,

    #[serde(rename = "High", default)]
    pub high: f64,
}

/// Categorised model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub risk_level: RiskLevel,

    #[serde(default)]
    pub confidence: f64,

    #[serde(default)]
    pub probabilities: Option<Probabilities>,
}

/// Weather conditions captured alongside a prediction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    #[serde(rename = "pressurehPa", default, skip_serializing_if = "Option::is_none")]
    pub pressure_hpa: Option<f64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One model evaluation for a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub model_request: Option<ModelRequest>,

    #[serde(default)]
    pub model_response: Option<ModelResponse>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather_snapshot: Option<WeatherSnapshot>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub location: Option<LocationRef>,
}

impl Prediction {
    /// The model's categorical output, if any.
    #[must_use]
    pub fn risk_level(&self) -> Option<RiskLevel> {
        self.model_response.as_ref().map(|r| r.risk_level)
    }

    /// Model confidence in [0, 1]; zero when absent.
    #[must_use]
    pub fn confidence(&self) -> f64 {
        self.model_response.as_ref().map_or(0.0, |r| r.confidence)
    }
}

/// Location reference embedded in alerts and stored predictions.
///
/// The backend does not guarantee every field here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

/// A notification tied to a risk event at a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    #[serde(rename = "_id")]
    pub id: String,

    pub message: String,

    pub risk_level: RiskLevel,

    #[serde(default)]
    pub location: Option<LocationRef>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// Name of the alert's location, or a generic label.
    #[must_use]
    pub fn location_name(&self) -> &str {
        self.location
            .as_ref()
            .and_then(|l| l.name.as_deref())
            .unwrap_or("Location")
    }
}

/// Body of `POST /api/predictions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub location_name: String,
}

impl From<&Location> for PredictionRequest {
    fn from(location: &Location) -> Self {
        Self {
            latitude: location.latitude,
            longitude: location.longitude,
            location_name: location.name.clone(),
        }
    }
}

/// Response of `POST /api/predictions`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictionEnvelope {
    #[serde(default)]
    pub prediction: Option<Prediction>,

    #[serde(default)]
    pub alert: Option<Alert>,
}

/// Optional filters for `GET /api/alerts`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDate>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDate>,
}

/// Body of `POST /api/locations`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewLocation {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl From<&Location> for NewLocation {
    fn from(location: &Location) -> Self {
        Self {
            name: location.name.clone(),
            latitude: location.latitude,
            longitude: location.longitude,
        }
    }
}
