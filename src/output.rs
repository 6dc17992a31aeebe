//! Output formatters.
//!
//! Supports human-readable (with colors), JSON, and NDJSON formats.

use std::io::{self, Write};

use serde::Serialize;

use crate::analytics::HistorySummary;
use crate::models::{Alert, Location, Prediction, RiskLevel};
use crate::scoring::{NOT_AVAILABLE, RiskScores, ScoreCard, level_label};

// ANSI color codes
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

// Risk-level colors
const RED: &str = "\x1b[91m";
const YELLOW: &str = "\x1b[93m";
const GREEN: &str = "\x1b[92m";
const CYAN: &str = "\x1b[96m";

// Level badges
const BADGE_HIGH: &str = "\x1b[41;97m";
const BADGE_MEDIUM: &str = "\x1b[43;30m";
const BADGE_LOW: &str = "\x1b[42;30m";

const ICON_FLOOD: &str = "💧";
const ICON_QUAKE: &str = "📈";
const ICON_LANDSLIDE: &str = "⛰️";
const ICON_SHIELD: &str = "🛡️";
const ICON_ALERT: &str = "⚠️";
const ICON_PIN: &str = "📍";

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Human-readable terminal output (default)
    #[default]
    Human,
    /// JSON document
    Json,
    /// Newline-delimited JSON (one object per line)
    Ndjson,
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            "ndjson" => Ok(Self::Ndjson),
            _ => Err(format!("unknown format: {s} (expected: human, json, ndjson)")),
        }
    }
}

fn level_color(level: Option<RiskLevel>) -> &'static str {
    match level {
        Some(RiskLevel::High) => RED,
        Some(RiskLevel::Medium) => YELLOW,
        Some(RiskLevel::Low) => GREEN,
        None => DIM,
    }
}

fn level_badge(level: RiskLevel) -> String {
    let color = match level {
        RiskLevel::High => BADGE_HIGH,
        RiskLevel::Medium => BADGE_MEDIUM,
        RiskLevel::Low => BADGE_LOW,
    };
    format!("{color} {:<6} {RESET}", level.as_str().to_uppercase())
}

fn score_text(card: ScoreCard) -> String {
    card.score
        .map_or_else(|| NOT_AVAILABLE.to_string(), |s| format!("{s:>3}"))
}

fn to_json<T: Serialize + ?Sized>(value: &T, pretty: bool) -> io::Result<String> {
    let result = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    result.map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Write a list as a JSON array or one object per line.
fn write_list<W: Write, T: Serialize>(writer: &mut W, items: &[T], format: Format) -> io::Result<()> {
    match format {
        Format::Ndjson => {
            for item in items {
                writeln!(writer, "{}", to_json(item, false)?)?;
            }
            Ok(())
        }
        _ => writeln!(writer, "{}", to_json(items, true)?),
    }
}

/// Prediction plus derived scores, as emitted in JSON.
#[derive(Debug, Serialize)]
pub struct PredictionReport<'a> {
    pub location: &'a Location,
    pub prediction: Option<&'a Prediction>,
    pub scores: RiskScores,
}

/// Write the risk dashboard for one location.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_prediction<W: Write>(
    writer: &mut W,
    location: &Location,
    prediction: Option<&Prediction>,
    format: Format,
) -> io::Result<()> {
    let scores = RiskScores::from_prediction(prediction);

    if format != Format::Human {
        let report = PredictionReport {
            location,
            prediction,
            scores,
        };
        return writeln!(writer, "{}", to_json(&report, format == Format::Json)?);
    }

    writeln!(
        writer,
        "{ICON_PIN} {BOLD}{}{RESET} {DIM}({:.4}, {:.4}){RESET}",
        location.name, location.latitude, location.longitude
    )?;

    let model_level = prediction
        .and_then(Prediction::risk_level)
        .map_or("Pending", RiskLevel::as_str);
    writeln!(
        writer,
        "   Model risk: {BOLD}{model_level}{RESET} │ confidence {}% │ uncertainty {}%",
        scores.confidence_pct, scores.uncertainty_pct
    )?;

    let cards = [
        (ICON_SHIELD, "Overall", scores.overall),
        (ICON_FLOOD, "Flood", scores.flood),
        (ICON_QUAKE, "Earthquake", scores.earthquake),
        (ICON_LANDSLIDE, "Landslide", scores.landslide),
    ];

    for (icon, title, card) in cards {
        let color = level_color(card.level);
        writeln!(
            writer,
            "   {icon} {title:<11}{color}{BOLD}{:>3}{RESET}{DIM}/100{RESET} │ {color}{}{RESET}",
            score_text(card),
            level_label(card.level)
        )?;
    }

    if let Some(created) = prediction.and_then(|p| p.created_at) {
        writeln!(
            writer,
            "   {DIM}predicted {} UTC{RESET}",
            created.format("%Y-%m-%d %H:%M:%S")
        )?;
    }
    Ok(())
}

/// Write alerts, newest first.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_alerts<W: Write>(writer: &mut W, alerts: &[Alert], format: Format) -> io::Result<()> {
    if format != Format::Human {
        return write_list(writer, alerts, format);
    }

    if alerts.is_empty() {
        return writeln!(writer, "{DIM}No alerts recorded yet.{RESET}");
    }

    for alert in alerts {
        let time = alert
            .created_at
            .map_or_else(|| "unknown".into(), |t| t.format("%d %b, %H:%M").to_string());
        writeln!(
            writer,
            "{ICON_ALERT} {} {BOLD}{}{RESET} │ {} │ {DIM}{time}{RESET}",
            level_badge(alert.risk_level),
            alert.message,
            alert.location_name()
        )?;
    }
    Ok(())
}

/// Write locations (search results or stored locations).
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_locations<W: Write>(writer: &mut W, locations: &[Location], format: Format) -> io::Result<()> {
    if format != Format::Human {
        return write_list(writer, locations, format);
    }

    if locations.is_empty() {
        return writeln!(writer, "{DIM}No matching locations{RESET}");
    }

    for location in locations {
        let region = location
            .region
            .as_deref()
            .map(|r| format!(" {DIM}{r}{RESET}"))
            .unwrap_or_default();
        let kind = location
            .kind
            .as_deref()
            .map(|k| format!(" {DIM}• {k}{RESET}"))
            .unwrap_or_default();
        writeln!(
            writer,
            "{ICON_PIN} {CYAN}{:>9.4}, {:>9.4}{RESET} │ {BOLD}{}{RESET}{region}{kind}",
            location.latitude, location.longitude, location.name
        )?;
    }
    Ok(())
}

/// History summary plus the listed entries, as emitted in JSON.
#[derive(Debug, Serialize)]
pub struct HistoryReport<'a> {
    pub summary: HistorySummary,
    pub entries: &'a [&'a Prediction],
}

/// Write history analytics and the filtered entries.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_history<W: Write>(
    writer: &mut W,
    summary: &HistorySummary,
    entries: &[&Prediction],
    format: Format,
) -> io::Result<()> {
    match format {
        Format::Json => {
            let report = HistoryReport {
                summary: *summary,
                entries,
            };
            return writeln!(writer, "{}", to_json(&report, true)?);
        }
        Format::Ndjson => return write_list(writer, entries, format),
        Format::Human => {}
    }

    writeln!(
        writer,
        "{BOLD}Predictions:{RESET} {} │ avg confidence {}%",
        summary.total, summary.avg_confidence_pct
    )?;
    for level in [RiskLevel::High, RiskLevel::Medium, RiskLevel::Low] {
        let count = match level {
            RiskLevel::High => summary.high,
            RiskLevel::Medium => summary.medium,
            RiskLevel::Low => summary.low,
        };
        let share = summary.share(level);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let bar = "█".repeat((share / 5.0).round() as usize);
        writeln!(
            writer,
            "   {}{:<6}{RESET} {count:>4} {DIM}{share:>5.1}%{RESET} {}{bar}{RESET}",
            level_color(Some(level)),
            level.as_str(),
            level_color(Some(level)),
        )?;
    }
    writeln!(writer, "{DIM}─────────────────────────────────────────────{RESET}")?;

    for entry in entries {
        let time = entry
            .created_at
            .map_or_else(|| "unknown".into(), |t| t.format("%Y-%m-%d %H:%M").to_string());
        let name = entry
            .location
            .as_ref()
            .and_then(|l| l.name.as_deref())
            .unwrap_or("Location");
        let level = entry.risk_level();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let confidence = (entry.confidence() * 100.0).round() as u32;
        writeln!(
            writer,
            "{DIM}{time}{RESET} │ {}{:<6}{RESET} │ {confidence:>3}% │ {name}",
            level_color(level),
            level_label(level),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelRequest, ModelResponse, Probabilities};

    fn sample_prediction() -> Prediction {
        Prediction {
            id: None,
            model_request: Some(ModelRequest {
                rainfall_1h_mm: Some(50.0),
                river_level_m: Some(10.0),
                river_rise_rate_cmphr: Some(50.0),
                ..Default::default()
            }),
            model_response: Some(ModelResponse {
                risk_level: RiskLevel::High,
                confidence: 0.91,
                probabilities: Some(Probabilities {
                    low: 0.0,
                    medium: 0.1,
                    high: 0.9,
                }),
            }),
            weather_snapshot: None,
            created_at: None,
            location: None,
        }
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("human".parse::<Format>().unwrap(), Format::Human);
        assert_eq!("json".parse::<Format>().unwrap(), Format::Json);
        assert_eq!("ndjson".parse::<Format>().unwrap(), Format::Ndjson);
        assert!("invalid".parse::<Format>().is_err());
    }

    #[test]
    fn test_human_prediction_shows_na_for_missing_scores() {
        let mut out = Vec::new();
        let location = Location::new("Patna", 25.59, 85.14);
        write_prediction(&mut out, &location, Some(&sample_prediction()), Format::Human).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Patna"));
        assert!(text.contains("100"));
        assert!(text.contains("N/A"));
        assert!(text.contains("confidence 91%"));
    }

    #[test]
    fn test_json_prediction_report() {
        let mut out = Vec::new();
        let location = Location::new("Patna", 25.59, 85.14);
        write_prediction(&mut out, &location, Some(&sample_prediction()), Format::Json).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["scores"]["flood"]["score"], 100);
        assert_eq!(value["scores"]["flood"]["level"], "High");
        assert!(value["scores"]["earthquake"]["score"].is_null());
        assert_eq!(value["location"]["name"], "Patna");
    }

    #[test]
    fn test_ndjson_locations_one_per_line() {
        let mut out = Vec::new();
        let locations = vec![Location::new("A", 1.0, 2.0), Location::new("B", 3.0, 4.0)];
        write_locations(&mut out, &locations, Format::Ndjson).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_empty_alerts_message() {
        let mut out = Vec::new();
        write_alerts(&mut out, &[], Format::Human).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("No alerts recorded yet."));
    }
}
