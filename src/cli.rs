//! Command-line interface definitions.
//!
//! Uses clap derive API for argument parsing. Backend settings can also come
//! from `RISKWATCH_*` environment variables.

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::analytics::LevelFilter;
use crate::client::DEFAULT_HISTORY_LIMIT;
use crate::config::{
    Config, DEFAULT_API_BASE_URL, DEFAULT_COUNTRY_CODE, DEFAULT_LOCATION_NAME,
    DEFAULT_POLL_INTERVAL_MS,
};
use crate::errors::RiskwatchError;
use crate::models::RiskLevel;
use crate::output::Format;
use crate::search::SearchMode;

/// Disaster risk monitoring from your terminal.
#[derive(Parser, Debug)]
#[command(name = "riskwatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Command to run
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose debug logging
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "human", value_parser = parse_format)]
    pub format: Format,

    #[command(flatten)]
    pub config: ConfigArgs,
}

/// Backend and environment settings shared by every command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Base URL of the prediction backend
    #[arg(long, global = true, env = "RISKWATCH_API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    pub api_url: String,

    /// Name used for manually entered coordinates
    #[arg(long, global = true, env = "RISKWATCH_DEFAULT_LOCATION_NAME", default_value = DEFAULT_LOCATION_NAME)]
    pub default_location_name: String,

    /// Re-prediction interval in milliseconds
    #[arg(long, global = true, env = "RISKWATCH_POLL_INTERVAL_MS", default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,

    /// Detect the device location on startup when nothing is selected
    #[arg(long, global = true, env = "RISKWATCH_AUTO_GEOLOCATION")]
    pub auto_geolocation: bool,

    /// Country filter for place search (ISO 3166-1 alpha-2)
    #[arg(long, global = true, env = "RISKWATCH_COUNTRY_CODE", default_value = DEFAULT_COUNTRY_CODE)]
    pub country_code: String,

    /// Device position for geolocation: lat,lon
    #[arg(long, global = true, env = "RISKWATCH_DEVICE_POSITION")]
    pub device_position: Option<String>,
}

impl ConfigArgs {
    /// Validate into a [`Config`].
    ///
    /// # Errors
    ///
    /// Returns an error if any setting is invalid.
    pub fn to_config(&self) -> Result<Config, RiskwatchError> {
        Config::from_parts(
            &self.api_url,
            &self.default_location_name,
            self.poll_interval_ms,
            self.auto_geolocation,
            &self.country_code,
            self.device_position.as_deref(),
        )
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Predict risk for coordinates or a named place
    Predict(PredictArgs),

    /// Detect the device location and predict for it
    Locate,

    /// Search preset cities and the geocoding service
    Search(SearchArgs),

    /// List alerts from the backend
    Alerts(AlertsArgs),

    /// Show prediction history with analytics
    History(HistoryArgs),

    /// Manage stored locations
    #[command(subcommand)]
    Locations(LocationsCommand),

    /// Stream live alerts and periodic predictions
    Watch,

    /// Start the local status server
    Serve(ServeArgs),
}

/// Arguments for the `predict` command.
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Latitude in degrees
    #[arg(long, requires = "lon", conflicts_with = "place", allow_hyphen_values = true)]
    pub lat: Option<f64>,

    /// Longitude in degrees
    #[arg(long, requires = "lat", conflicts_with = "place", allow_hyphen_values = true)]
    pub lon: Option<f64>,

    /// Display name for the coordinates
    #[arg(long, requires = "lat")]
    pub name: Option<String>,

    /// Place to search for; the best match is used
    #[arg(long, required_unless_present = "lat")]
    pub place: Option<String>,
}

/// Arguments for the `search` command.
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Search text (city, district, region)
    #[arg(required_unless_present = "follow")]
    pub query: Option<String>,

    /// Which sources to search
    #[arg(long, default_value = "both", value_parser = parse_search_mode)]
    pub mode: SearchMode,

    /// Read successive queries from stdin, debounced
    #[arg(long)]
    pub follow: bool,
}

/// Arguments for the `alerts` command.
#[derive(Args, Debug)]
pub struct AlertsArgs {
    /// Only alerts of this level
    #[arg(long, value_parser = parse_risk_level)]
    pub risk_level: Option<RiskLevel>,

    /// Earliest day (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub start: Option<NaiveDate>,

    /// Latest day (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub end: Option<NaiveDate>,
}

/// Arguments for the `history` command.
#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Maximum predictions to fetch
    #[arg(long, short = 'n', default_value_t = DEFAULT_HISTORY_LIMIT)]
    pub limit: usize,

    /// Only list predictions of this level (all, high, medium, low)
    #[arg(long, default_value = "all", value_parser = parse_level_filter)]
    pub level: LevelFilter,
}

/// Stored location commands.
#[derive(Subcommand, Debug)]
pub enum LocationsCommand {
    /// List stored locations
    List,

    /// Store a new location
    Add(AddLocationArgs),
}

/// Arguments for `locations add`.
#[derive(Args, Debug)]
pub struct AddLocationArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long, allow_hyphen_values = true)]
    pub lat: f64,

    #[arg(long, allow_hyphen_values = true)]
    pub lon: f64,
}

/// Arguments for the `serve` command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(long, short = 'p', default_value = "8080")]
    pub port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,
}

/// Parse an output format from string.
fn parse_format(s: &str) -> Result<Format, String> {
    s.parse()
}

fn parse_search_mode(s: &str) -> Result<SearchMode, String> {
    s.parse()
}

fn parse_risk_level(s: &str) -> Result<RiskLevel, String> {
    s.parse()
}

fn parse_level_filter(s: &str) -> Result<LevelFilter, String> {
    s.parse()
}

/// Parse a calendar day.
fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("invalid date {s}: {e} (expected YYYY-MM-DD)"))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_predict_coordinates() {
        let cli = Cli::try_parse_from(["riskwatch", "predict", "--lat", "-8.5", "--lon", "115.2"]).unwrap();
        match cli.command {
            Command::Predict(args) => {
                assert_eq!(args.lat, Some(-8.5));
                assert_eq!(args.lon, Some(115.2));
                assert!(args.place.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_predict_requires_a_target() {
        assert!(Cli::try_parse_from(["riskwatch", "predict"]).is_err());
        assert!(Cli::try_parse_from(["riskwatch", "predict", "--lat", "1.0"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "riskwatch",
            "history",
            "--level",
            "high",
            "--format",
            "json",
            "--api-url",
            "https://risk.example.org",
        ])
        .unwrap();

        assert_eq!(cli.format, Format::Json);
        assert_eq!(cli.config.api_url, "https://risk.example.org");
        match cli.command {
            Command::History(args) => {
                assert_eq!(args.level, LevelFilter::Only(RiskLevel::High));
                assert_eq!(args.limit, DEFAULT_HISTORY_LIMIT);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_alert_filters_parse() {
        let cli = Cli::try_parse_from([
            "riskwatch",
            "alerts",
            "--risk-level",
            "Medium",
            "--start",
            "2026-07-01",
        ])
        .unwrap();
        match cli.command {
            Command::Alerts(args) => {
                assert_eq!(args.risk_level, Some(RiskLevel::Medium));
                assert_eq!(args.start, NaiveDate::from_ymd_opt(2026, 7, 1));
                assert!(args.end.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }

        assert!(Cli::try_parse_from(["riskwatch", "alerts", "--start", "07/01/2026"]).is_err());
    }
}
