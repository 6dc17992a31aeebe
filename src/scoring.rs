//! Derived risk scores.
//!
//! Turns a prediction's raw model inputs and class probabilities into 0-100
//! sub-scores. Weights, normalisation maxima and bucket thresholds are fixed
//! for compatibility with the dashboard the backend was built against.
//!
//! A score is `None` when every contributing input is zero or missing. A
//! genuine all-zero reading looks the same, so `None` means "no usable data",
//! not "no risk".

use serde::Serialize;

use crate::models::{Prediction, Probabilities, RiskLevel};

/// Scores above this are High.
pub const HIGH_THRESHOLD: u8 = 70;

/// Scores above this (and not High) are Medium.
pub const MEDIUM_THRESHOLD: u8 = 40;

/// Label shown in place of a missing score or level.
pub const NOT_AVAILABLE: &str = "N/A";

/// Sea-level reference pressure for the landslide slope proxy.
const REFERENCE_PRESSURE_HPA: f64 = 1013.0;

#[allow(clippy::float_cmp)]
fn is_zero(x: f64) -> bool {
    x == 0.0
}

/// Round half toward positive infinity, then clamp into a score.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_score(raw: f64) -> u8 {
    (raw + 0.5).floor().clamp(0.0, 100.0) as u8
}

/// `value / max` as a percentage, capped at 100.
fn normalized(value: f64, max: f64) -> f64 {
    (value / max * 100.0).min(100.0)
}

/// Weighted model output: 0.6 High + 0.4 Medium + 0.2 Low, scaled to 100.
#[must_use]
pub fn overall_score(probabilities: Option<&Probabilities>) -> Option<u8> {
    let p = probabilities?;
    if is_zero(p.low) && is_zero(p.medium) && is_zero(p.high) {
        return None;
    }
    Some(to_score(100.0 * (p.high * 0.6 + p.medium * 0.4 + p.low * 0.2)))
}

/// Rainfall (max 50 mm/h) 50%, river level (max 10 m) 35%, rise rate
/// (max 50 cm/h) 15%.
#[must_use]
pub fn flood_score(prediction: Option<&Prediction>) -> Option<u8> {
    let request = prediction?.model_request.as_ref()?;
    let rain = request.rainfall_1h_mm.unwrap_or(0.0);
    let river = request.river_level_m.unwrap_or(0.0);
    let rise = request.river_rise_rate_cmphr.unwrap_or(0.0);

    if is_zero(rain) && is_zero(river) && is_zero(rise) {
        return None;
    }

    Some(to_score(
        normalized(rain, 50.0) * 0.5 + normalized(river, 10.0) * 0.35 + normalized(rise, 50.0) * 0.15,
    ))
}

/// Magnitude (max 9.0) 50%, ground acceleration (max 2 g) 30%, fault
/// proximity 20%. Proximity only counts when a distance was reported.
#[must_use]
pub fn earthquake_score(prediction: Option<&Prediction>) -> Option<u8> {
    let request = prediction?.model_request.as_ref()?;
    let magnitude = request.seismic_magnitude.unwrap_or(0.0);
    let acceleration = request.ground_acceleration_g.unwrap_or(0.0);
    let distance = request.distance_from_fault_km.unwrap_or(0.0);

    if is_zero(magnitude) && is_zero(acceleration) && is_zero(distance) {
        return None;
    }

    let distance_score = if distance > 0.0 {
        (100.0 - distance / 100.0 * 100.0).max(0.0)
    } else {
        0.0
    };

    Some(to_score(
        normalized(magnitude, 9.0) * 0.5 + normalized(acceleration, 2.0) * 0.3 + distance_score * 0.2,
    ))
}

/// Soil moisture (percent) 40%, rainfall (max 50 mm/h) 40%, slope 20%.
/// Slope is approximated from how far pressure sits below sea level.
#[must_use]
pub fn landslide_score(prediction: Option<&Prediction>) -> Option<u8> {
    let prediction = prediction?;
    let request = prediction.model_request.as_ref()?;
    let soil = request.soil_moisture_pct.unwrap_or(0.0);
    let rain = request.rainfall_1h_mm.unwrap_or(0.0);
    let pressure = prediction
        .weather_snapshot
        .as_ref()
        .and_then(|w| w.pressure_hpa)
        .filter(|p| !is_zero(*p));

    if is_zero(soil) && is_zero(rain) && pressure.is_none() {
        return None;
    }

    let slope_score = pressure.map_or(0.0, |p| ((REFERENCE_PRESSURE_HPA - p) / 10.0).clamp(0.0, 100.0));

    Some(to_score(soil.min(100.0) * 0.4 + normalized(rain, 50.0) * 0.4 + slope_score * 0.2))
}

/// Bucket a derived score: High above 70, Medium above 40, Low otherwise.
#[must_use]
pub fn bucket(score: Option<u8>) -> Option<RiskLevel> {
    score.map(|s| match s {
        s if s > HIGH_THRESHOLD => RiskLevel::High,
        s if s > MEDIUM_THRESHOLD => RiskLevel::Medium,
        _ => RiskLevel::Low,
    })
}

/// Display label for an optional level.
#[must_use]
pub fn level_label(level: Option<RiskLevel>) -> &'static str {
    level.map_or(NOT_AVAILABLE, RiskLevel::as_str)
}

/// A score with the level it is shown under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoreCard {
    pub score: Option<u8>,
    pub level: Option<RiskLevel>,
}

impl ScoreCard {
    fn derived(score: Option<u8>) -> Self {
        Self {
            score,
            level: bucket(score),
        }
    }
}

/// Every derived figure the dashboard shows for one prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskScores {
    /// Overall card uses the model's own level rather than bucketing
    pub overall: ScoreCard,
    pub flood: ScoreCard,
    pub earthquake: ScoreCard,
    pub landslide: ScoreCard,
    pub confidence_pct: u8,
    pub uncertainty_pct: u8,
}

impl RiskScores {
    /// Derive all scores; an absent prediction yields all `N/A`.
    #[must_use]
    pub fn from_prediction(prediction: Option<&Prediction>) -> Self {
        let response = prediction.and_then(|p| p.model_response.as_ref());

        let overall_value = overall_score(response.and_then(|r| r.probabilities.as_ref()));
        let overall = ScoreCard {
            score: overall_value,
            level: overall_value.and(response.map(|r| r.risk_level)),
        };

        let confidence_pct = response.map_or(0, |r| to_score(r.confidence * 100.0));

        Self {
            overall,
            flood: ScoreCard::derived(flood_score(prediction)),
            earthquake: ScoreCard::derived(earthquake_score(prediction)),
            landslide: ScoreCard::derived(landslide_score(prediction)),
            confidence_pct,
            uncertainty_pct: 100 - confidence_pct,
        }
    }
}
