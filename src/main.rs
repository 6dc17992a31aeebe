//! riskwatch - Live disaster risk monitoring from your terminal.
//!
//! Talks to a prediction backend for flood, earthquake and landslide risk,
//! streams its alerts, and derives per-hazard scores for the selected
//! location.

use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

mod analytics;
mod cli;
mod client;
mod config;
mod errors;
mod geocode;
mod geolocation;
mod models;
mod monitor;
mod output;
mod presets;
mod scoring;
mod search;
mod server;
mod socket;
mod state;

use cli::{Cli, Command, LocationsCommand};
use client::{ApiClient, PredictionApi};
use config::Config;
use geocode::NominatimClient;
use geolocation::{FixedPosition, GeoOutcome, GeolocationFlow};
use models::{AlertQuery, Location, NewLocation};
use monitor::LiveMonitor;
use output::Format;
use search::{DEBOUNCE_DELAY, MIN_QUERY_CHARS, SearchMode};
use socket::AlertChannel;
use state::{AppState, StateEvent};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    let config = cli.config.to_config().context("invalid configuration")?;
    let format = cli.format;

    tokio::runtime::Runtime::new()
        .context("failed to create tokio runtime")?
        .block_on(dispatch(cli.command, config, format))
}

async fn dispatch(command: Command, config: Config, format: Format) -> Result<()> {
    match command {
        Command::Predict(args) => cmd_predict(args, &config, format).await,
        Command::Locate => cmd_locate(&config, format).await,
        Command::Search(args) => cmd_search(args, &config, format).await,
        Command::Alerts(args) => cmd_alerts(args, &config, format).await,
        Command::History(args) => cmd_history(args, &config, format).await,
        Command::Locations(command) => cmd_locations(command, &config, format).await,
        Command::Watch => cmd_watch(&config, format).await,
        Command::Serve(args) => cmd_serve(args, &config).await,
    }
}

/// Initialize tracing subscriber.
fn init_tracing(verbose: bool, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn api_client(config: &Config) -> Result<Arc<ApiClient>> {
    ApiClient::new(config)
        .map(Arc::new)
        .context("failed to create API client")
}

fn geocoder(config: &Config) -> Result<NominatimClient> {
    NominatimClient::new(&config.country_code).context("failed to create geocoding client")
}

fn live_monitor(config: &Config) -> Result<LiveMonitor<ApiClient>> {
    Ok(LiveMonitor::new(
        api_client(config)?,
        AppState::new(),
        config.poll_interval,
    ))
}

/// Execute the `predict` command - one prediction for a place or coordinates.
async fn cmd_predict(args: cli::PredictArgs, config: &Config, format: Format) -> Result<()> {
    let api = api_client(config)?;
    let monitor = LiveMonitor::new(Arc::clone(&api), AppState::new(), config.poll_interval);

    let location = match (args.lat, args.lon, args.place) {
        (Some(latitude), Some(longitude), _) => {
            let name = args
                .name
                .unwrap_or_else(|| config.default_location_name.clone());
            let location = Location::new(name, latitude, longitude);
            location.validate()?;

            // Manually entered coordinates are remembered by the backend
            if let Err(e) = api.create_location(&NewLocation::from(&location)).await {
                warn!("failed to store location: {}", e);
            }
            location
        }
        (_, _, Some(place)) => {
            let geocoder = geocoder(config)?;
            let mut matches = search::search(&geocoder, &place, SearchMode::Both).await;
            if matches.is_empty() {
                bail!("no location matches '{place}'");
            }
            matches.swap_remove(0)
        }
        _ => bail!("either --lat/--lon or --place is required"),
    };

    let prediction = monitor.trigger_prediction(location.clone()).await;
    if let (None, Some(message)) = (&prediction, monitor.state().error()) {
        bail!("prediction failed: {message}");
    }

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    output::write_prediction(&mut handle, &location, prediction.as_ref(), format)?;

    let alerts = monitor.state().alerts();
    if format == Format::Human && !alerts.is_empty() {
        output::write_alerts(&mut handle, &alerts, format)?;
    }
    Ok(())
}

/// Execute the `locate` command - detect the device position and predict.
async fn cmd_locate(config: &Config, format: Format) -> Result<()> {
    let monitor = live_monitor(config)?;
    let provider = FixedPosition::from_config(config.device_position);
    let geocoder = geocoder(config)?;

    match GeolocationFlow::new(&provider, &geocoder, &monitor).run().await {
        GeoOutcome::Located(location) => {
            let prediction = monitor.state().latest_prediction();
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            output::write_prediction(&mut handle, &location, prediction.as_ref(), format)?;
            if let Some(message) = monitor.state().error() {
                warn!("{}", message);
            }
            Ok(())
        }
        GeoOutcome::Failed(message) => bail!(message),
        GeoOutcome::Superseded => bail!("location detection was superseded"),
    }
}

/// Execute the `search` command - one query, or debounced queries from stdin.
async fn cmd_search(args: cli::SearchArgs, config: &Config, format: Format) -> Result<()> {
    let geocoder = geocoder(config)?;

    if !args.follow {
        let query = args.query.unwrap_or_default();
        let results = search::search(&geocoder, &query, args.mode).await;
        let stdout = io::stdout();
        return Ok(output::write_locations(&mut stdout.lock(), &results, format)?);
    }

    let (tx, rx) = mpsc::channel(16);
    if let Some(query) = args.query {
        tx.send(query).await.context("search input closed")?;
    }

    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("failed to read query: {}", e);
                    break;
                }
            }
        }
    });

    let mut queries = search::debounce(rx, DEBOUNCE_DELAY);
    while let Some(query) = queries.recv().await {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_CHARS {
            continue;
        }
        let results = search::search(&geocoder, query, args.mode).await;

        let stdout = io::stdout();
        let mut handle = stdout.lock();
        output::write_locations(&mut handle, &results, format)?;
        handle.flush()?;
    }
    Ok(())
}

/// Execute the `alerts` command - list alerts with optional filters.
async fn cmd_alerts(args: cli::AlertsArgs, config: &Config, format: Format) -> Result<()> {
    let api = api_client(config)?;
    let query = AlertQuery {
        risk_level: args.risk_level,
        start: args.start,
        end: args.end,
    };

    let alerts = api
        .fetch_alerts(&query)
        .await
        .context("failed to fetch alerts")?;

    let stdout = io::stdout();
    output::write_alerts(&mut stdout.lock(), &alerts, format)?;
    Ok(())
}

/// Execute the `history` command - recent predictions and their breakdown.
async fn cmd_history(args: cli::HistoryArgs, config: &Config, format: Format) -> Result<()> {
    let api = api_client(config)?;
    let history = api
        .fetch_history(args.limit)
        .await
        .context("failed to fetch prediction history")?;

    let summary = analytics::HistorySummary::from_history(&history);
    let entries = analytics::filter_history(&history, args.level);

    let stdout = io::stdout();
    output::write_history(&mut stdout.lock(), &summary, &entries, format)?;
    Ok(())
}

/// Execute the `locations` commands.
async fn cmd_locations(command: LocationsCommand, config: &Config, format: Format) -> Result<()> {
    let api = api_client(config)?;

    let locations = match command {
        LocationsCommand::List => api
            .fetch_locations()
            .await
            .context("failed to fetch locations")?,
        LocationsCommand::Add(args) => {
            let location = Location::new(args.name, args.lat, args.lon);
            location.validate()?;
            let stored = api
                .create_location(&NewLocation::from(&location))
                .await
                .context("failed to store location")?;
            info!("stored location {}", stored.name);
            vec![stored]
        }
    };

    let stdout = io::stdout();
    output::write_locations(&mut stdout.lock(), &locations, format)?;
    Ok(())
}

/// Start the background tasks shared by `watch` and `serve`.
///
/// Loads the alert list, then runs geolocation when enabled and nothing is
/// selected yet.
async fn start_monitoring(config: &Config, monitor: &LiveMonitor<ApiClient>) -> Result<AlertChannel> {
    monitor.load_alerts(&AlertQuery::default()).await;

    if config.auto_geolocation && monitor.state().selected_location().is_none() {
        let provider = FixedPosition::from_config(config.device_position);
        let geocoder = geocoder(config)?;
        let flow_monitor = monitor.clone();
        tokio::spawn(async move {
            match GeolocationFlow::new(&provider, &geocoder, &flow_monitor).run().await {
                GeoOutcome::Located(location) => info!("monitoring {}", location.name),
                GeoOutcome::Failed(message) => warn!("{}", message),
                GeoOutcome::Superseded => {}
            }
        });
    }

    let url = config.socket_url().context("invalid live channel URL")?;
    Ok(AlertChannel::new(url, monitor.state().clone()))
}

/// Execute the `watch` command - stream alerts and predictions.
async fn cmd_watch(config: &Config, format: Format) -> Result<()> {
    let monitor = live_monitor(config)?;
    let mut events = monitor.state().subscribe();
    let channel = start_monitoring(config, &monitor).await?;

    {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        if format == Format::Human {
            writeln!(handle, "\x1b[1m🛰️  riskwatch live\x1b[0m")?;
            writeln!(
                handle,
                "\x1b[2mBackend: {} | Poll: {}s | Press Ctrl+C to stop\x1b[0m",
                config.api_base_url,
                config.poll_interval.as_secs()
            )?;
            writeln!(handle, "\x1b[2m─────────────────────────────────────────────────────────────────────\x1b[0m")?;
        }
        output::write_alerts(&mut handle, &monitor.state().alerts(), format)?;
    }

    tokio::spawn(async move { channel.run().await });
    let poller = monitor.clone();
    tokio::spawn(async move { poller.run_polling().await });

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => print_event(&event, &monitor, format)?,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("display fell behind, skipped {} updates", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("stopping");
                return Ok(());
            }
        }
    }
}

fn print_event(event: &StateEvent, monitor: &LiveMonitor<ApiClient>, format: Format) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();

    match event {
        StateEvent::AlertReceived(alert) => {
            output::write_alerts(&mut handle, std::slice::from_ref(&**alert), format)?;
        }
        StateEvent::PredictionUpdated(prediction) => {
            if let Some(location) = monitor.state().selected_location() {
                output::write_prediction(&mut handle, &location, Some(&**prediction), format)?;
            }
        }
        StateEvent::ConnectionChanged(connected) => {
            info!("live channel {}", if *connected { "online" } else { "offline" });
        }
        StateEvent::ErrorChanged(Some(message)) => warn!("{}", message),
        StateEvent::LocationSelected(location) => info!("selected {}", location.name),
        StateEvent::AlertsReplaced(_) | StateEvent::LoadingChanged(_) | StateEvent::ErrorChanged(None) => {}
    }

    // Flush after each event for real-time output
    handle.flush()?;
    Ok(())
}

/// Execute the `serve` command - start the status server.
async fn cmd_serve(args: cli::ServeArgs, config: &Config) -> Result<()> {
    let monitor = live_monitor(config)?;
    let channel = start_monitoring(config, &monitor).await?;

    let server_config = server::ServerConfig {
        port: args.port,
        host: args.host.clone(),
    };

    println!("\x1b[1m🛰️  riskwatch status server\x1b[0m");
    println!("\x1b[2m───────────────────────────────────────\x1b[0m");
    println!("  Local:   \x1b[96mhttp://{}:{}\x1b[0m", args.host, args.port);
    println!("  Backend: {}", config.api_base_url);
    println!("  Poll:    {}s", config.poll_interval.as_secs());
    println!("\x1b[2m───────────────────────────────────────\x1b[0m");
    println!("\x1b[2mPress Ctrl+C to stop\x1b[0m\n");

    server::run_server(server_config, monitor, channel).await
}
