//! Local status server.
//!
//! Mirrors the shared dashboard state over HTTP:
//! - `/api/state` JSON snapshot with derived scores
//! - `/stream` SSE of alerts, predictions and connectivity (HTMX fragments)
//! - `/` a small HTMX page wired to the stream
//!
//! The live alert channel and the poll loop run as background tasks for the
//! lifetime of the server.

use std::convert::Infallible;

use axum::{
    Json, Router,
    extract::State,
    response::{
        Html,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use serde::Serialize;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use crate::client::PredictionApi;
use crate::models::{Alert, RiskLevel};
use crate::monitor::LiveMonitor;
use crate::scoring::{NOT_AVAILABLE, RiskScores, ScoreCard, level_label};
use crate::socket::AlertChannel;
use crate::state::{AppState, DashboardState, StateEvent};

/// Alerts rendered on first page load.
const RECENT_ALERTS: usize = 20;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// `/api/state` body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(flatten)]
    pub state: DashboardState,
    pub scores: RiskScores,
}

impl StatusResponse {
    #[must_use]
    pub fn from_state(state: DashboardState) -> Self {
        let scores = RiskScores::from_prediction(state.latest_prediction.as_ref());
        Self { state, scores }
    }
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/stream", get(sse_handler))
        .route("/api/state", get(state_handler))
        .route("/partials/alerts", get(alerts_partial_handler))
        .route("/partials/scores", get(scores_partial_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Start the server together with the live channel and the poll loop.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn run_server<A>(
    config: ServerConfig,
    monitor: LiveMonitor<A>,
    channel: AlertChannel,
) -> anyhow::Result<()>
where
    A: PredictionApi + 'static,
{
    tokio::spawn(async move { channel.run().await });

    let poller = monitor.clone();
    tokio::spawn(async move { poller.run_polling().await });

    let app = create_router(monitor.state().clone());

    let addr = format!("{}:{}", config.host, config.port);
    info!("riskwatch status server starting at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn level_class(level: Option<RiskLevel>) -> &'static str {
    match level {
        Some(RiskLevel::High) => "level-high",
        Some(RiskLevel::Medium) => "level-medium",
        Some(RiskLevel::Low) => "level-low",
        None => "level-none",
    }
}

/// Render one alert as an HTMX fragment.
fn format_alert_html(alert: &Alert) -> String {
    let time = alert
        .created_at
        .map_or_else(|| "Unknown".to_string(), |t| t.format("%d %b, %H:%M").to_string());

    format!(
        r#"<div class="alert {class}"><span class="badge">{level}</span><div class="alert-body"><p class="alert-message">{message}</p><p class="alert-meta">{location} · {time}</p></div></div>"#,
        class = level_class(Some(alert.risk_level)),
        level = alert.risk_level,
        message = escape_html(&alert.message),
        location = escape_html(alert.location_name()),
    )
}

fn format_alerts_html(alerts: &[Alert]) -> String {
    if alerts.is_empty() {
        return r#"<div class="empty-state">No alerts yet</div>"#.to_string();
    }
    alerts
        .iter()
        .take(RECENT_ALERTS)
        .map(format_alert_html)
        .collect()
}

fn format_card_html(title: &str, card: ScoreCard) -> String {
    let score = card
        .score
        .map_or_else(|| NOT_AVAILABLE.to_string(), |s| s.to_string());
    format!(
        r#"<div class="card {class}"><p class="card-title">{title}</p><p class="card-score">{score}</p><p class="card-level">{label}</p></div>"#,
        class = level_class(card.level),
        label = level_label(card.level),
    )
}

/// Render the score panel for the current state.
fn format_scores_html(state: &DashboardState) -> String {
    let scores = RiskScores::from_prediction(state.latest_prediction.as_ref());
    let location = state
        .selected_location
        .as_ref()
        .map_or_else(|| "No location selected".to_string(), |l| escape_html(&l.name));

    let mut html = format!(
        r#"<div class="scores-header"><h2>{location}</h2><p>Confidence {}% · Uncertainty {}%</p></div><div class="cards">"#,
        scores.confidence_pct, scores.uncertainty_pct
    );
    for (title, card) in [
        ("Overall", scores.overall),
        ("Flood", scores.flood),
        ("Earthquake", scores.earthquake),
        ("Landslide", scores.landslide),
    ] {
        html.push_str(&format_card_html(title, card));
    }
    html.push_str("</div>");
    html
}

fn format_connection_html(connected: bool) -> &'static str {
    if connected {
        r#"<span class="status-pill">Live</span>"#
    } else {
        r#"<span class="status-pill status-offline">Offline</span>"#
    }
}

/// Map a state transition to an SSE event name and HTML payload.
fn sse_payload(event: &StateEvent, state: &AppState) -> Option<(&'static str, String)> {
    match event {
        StateEvent::AlertReceived(alert) => Some(("alert", format_alert_html(alert))),
        StateEvent::PredictionUpdated(_) | StateEvent::LocationSelected(_) => {
            Some(("scores", format_scores_html(&state.snapshot())))
        }
        StateEvent::ConnectionChanged(connected) => {
            Some(("connection", format_connection_html(*connected).to_string()))
        }
        StateEvent::AlertsReplaced(_) => Some(("alerts", format_alerts_html(&state.alerts()))),
        StateEvent::LoadingChanged(_) | StateEvent::ErrorChanged(_) => None,
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// SSE stream of state transitions.
async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(event) => sse_payload(&event, &state).map(|(name, html)| Ok(Event::default().event(name).data(html))),
        Err(e) => {
            warn!("SSE subscriber lagging: {}", e);
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn state_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse::from_state(state.snapshot()))
}

async fn alerts_partial_handler(State(state): State<AppState>) -> Html<String> {
    Html(format_alerts_html(&state.alerts()))
}

async fn scores_partial_handler(State(state): State<AppState>) -> Html<String> {
    Html(format_scores_html(&state.snapshot()))
}

/// Health check endpoint.
async fn health_handler() -> &'static str {
    "OK"
}

// ============================================================================
// HTML Template (embedded for single-binary deployment)
// ============================================================================

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>riskwatch</title>
    <script src="https://unpkg.com/htmx.org@1.9.10"></script>
    <script src="https://unpkg.com/htmx.org@1.9.10/dist/ext/sse.js"></script>
    <style>
        :root { --bg: #0f1115; --surface: #181b22; --text: #e6e8ee; --muted: #8b90a0; }
        body { margin: 0; font-family: system-ui, sans-serif; background: var(--bg); color: var(--text); }
        header { display: flex; justify-content: space-between; align-items: center; padding: 1rem 2rem; background: var(--surface); }
        main { display: grid; grid-template-columns: 2fr 1fr; gap: 1.5rem; padding: 2rem; }
        .cards { display: grid; grid-template-columns: repeat(4, 1fr); gap: 1rem; }
        .card { background: var(--surface); border-radius: 12px; padding: 1rem; border-top: 4px solid var(--muted); }
        .card-score { font-size: 2rem; font-weight: 700; margin: 0.25rem 0; }
        .card-title, .card-level, .alert-meta { color: var(--muted); margin: 0; }
        .level-high { border-color: #ef4444; }
        .level-medium { border-color: #f59e0b; }
        .level-low { border-color: #22c55e; }
        .alert { display: flex; gap: 0.75rem; background: var(--surface); border-left: 4px solid var(--muted); border-radius: 8px; padding: 0.75rem; margin-bottom: 0.5rem; }
        .alert-message { margin: 0 0 0.25rem; font-weight: 600; }
        .badge { font-size: 0.75rem; font-weight: 700; text-transform: uppercase; }
        .status-pill { padding: 0.25rem 0.75rem; border-radius: 999px; background: #14532d; }
        .status-offline { background: #4b5563; }
        .empty-state { color: var(--muted); }
    </style>
</head>
<body hx-ext="sse" sse-connect="/stream">
    <header>
        <strong>riskwatch</strong>
        <div id="connection" sse-swap="connection"><span class="status-pill status-offline">Offline</span></div>
    </header>
    <main>
        <section id="scores" sse-swap="scores" hx-get="/partials/scores" hx-trigger="load">
            <div class="empty-state">Loading risk scores...</div>
        </section>
        <section>
            <h2>Alerts</h2>
            <div id="alert-feed" sse-swap="alert" hx-swap="afterbegin"></div>
            <div id="alert-history" sse-swap="alerts" hx-get="/partials/alerts" hx-trigger="load"></div>
        </section>
    </main>
</body>
</html>
"##;
