//! Device geolocation with a low-accuracy fallback.
//!
//! The flow is a small state machine. [`transition`] is the whole table:
//! it maps a state and an event to the next state plus the effects to run.
//! [`GeolocationFlow`] runs the effects against a position provider, a
//! reverse geocoder and the live monitor, feeding results back as events.
//!
//! ```text
//! Idle ──Start──▶ RequestingHighAccuracy ──fix──▶ ReverseGeocoding ──▶ Done
//!   │                     │ timeout                                    ▲
//!   │                     ▼                                            │
//!   │             RequestingLowAccuracy ──────────fix─────────────────┘
//!   └─Unsupported──▶ Failed ◀── denied / unavailable / retry failed
//! ```

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::client::PredictionApi;
use crate::geocode::ReverseGeocoder;
use crate::models::Location;
use crate::monitor::LiveMonitor;

/// How a position request should be served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    /// Oldest cached fix acceptable; zero forces a fresh one
    pub maximum_age: Duration,
}

/// First attempt: precise, fresh, 12 s.
pub const HIGH_ACCURACY: PositionOptions = PositionOptions {
    high_accuracy: true,
    timeout: Duration::from_secs(12),
    maximum_age: Duration::ZERO,
};

/// Retry after a timeout: coarse, cached up to a minute, 10 s.
pub const LOW_ACCURACY: PositionOptions = PositionOptions {
    high_accuracy: false,
    timeout: Duration::from_secs(10),
    maximum_age: Duration::from_secs(60),
};

pub const MSG_UNSUPPORTED: &str =
    "Geolocation is not available. Configure a device position (--device-position lat,lon).";
pub const MSG_DENIED: &str =
    "Location permission denied. Please allow location access and try again.";
pub const MSG_UNAVAILABLE: &str =
    "Location unavailable. Please check that GPS/location services are enabled.";
pub const MSG_RETRYING: &str = "Trying with lower accuracy...";
pub const MSG_DETECTION_FAILED: &str =
    "Location detection failed. Please enter coordinates manually or try again.";

/// A device fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

/// Why a position request failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PositionError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("position unavailable")]
    PositionUnavailable,

    #[error("timed out")]
    Timeout,

    #[error("{0}")]
    Other(String),
}

/// Source of device positions.
pub trait PositionProvider: Send + Sync {
    /// Whether this provider can produce positions at all.
    fn is_supported(&self) -> bool {
        true
    }

    /// Request the current position.
    fn current_position(
        &self,
        options: PositionOptions,
    ) -> impl Future<Output = Result<Position, PositionError>> + Send;
}

/// A provider that always reports one configured position.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedPosition(pub Option<Position>);

impl FixedPosition {
    #[must_use]
    pub fn from_config(position: Option<(f64, f64)>) -> Self {
        Self(position.map(|(latitude, longitude)| Position {
            latitude,
            longitude,
        }))
    }
}

impl PositionProvider for FixedPosition {
    fn is_supported(&self) -> bool {
        self.0.is_some()
    }

    async fn current_position(&self, _options: PositionOptions) -> Result<Position, PositionError> {
        self.0.ok_or(PositionError::PositionUnavailable)
    }
}

/// Flow states.
#[derive(Debug, Clone, PartialEq)]
pub enum GeoState {
    Idle,
    RequestingHighAccuracy,
    ReverseGeocoding { fallback: Location },
    RequestingLowAccuracy,
    Done(Location),
    Failed(String),
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum GeoEvent {
    Start,
    Unsupported,
    PositionAcquired(Position),
    PositionFailed(PositionError),
    /// Reverse geocoding finished; `None` on failure or timeout
    Geocoded(Option<Location>),
}

/// Work requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    RequestPosition(PositionOptions),
    ReverseGeocode(Position),
    SelectLocation(Location),
    Predict(Location),
    ShowMessage(String),
    ClearMessage,
}

/// The transition table. Events that make no sense in a state are ignored.
#[must_use]
pub fn transition(state: &GeoState, event: GeoEvent) -> (GeoState, Vec<Effect>) {
    use Effect::{ClearMessage, Predict, RequestPosition, ReverseGeocode, SelectLocation, ShowMessage};

    match (state, event) {
        (GeoState::Idle, GeoEvent::Start) => (
            GeoState::RequestingHighAccuracy,
            vec![ClearMessage, RequestPosition(HIGH_ACCURACY)],
        ),
        (GeoState::Idle, GeoEvent::Unsupported) => failed(MSG_UNSUPPORTED.to_string()),

        (GeoState::RequestingHighAccuracy, GeoEvent::PositionAcquired(position)) => {
            let fallback = Location::from_coordinates(position.latitude, position.longitude);
            (
                GeoState::ReverseGeocoding {
                    fallback: fallback.clone(),
                },
                vec![SelectLocation(fallback), ReverseGeocode(position)],
            )
        }
        (GeoState::RequestingHighAccuracy, GeoEvent::PositionFailed(error)) => match error {
            PositionError::PermissionDenied => failed(MSG_DENIED.to_string()),
            PositionError::PositionUnavailable => failed(MSG_UNAVAILABLE.to_string()),
            PositionError::Timeout => (
                GeoState::RequestingLowAccuracy,
                vec![ShowMessage(MSG_RETRYING.to_string()), RequestPosition(LOW_ACCURACY)],
            ),
            PositionError::Other(message) => failed(format!("Location error: {message}")),
        },

        (GeoState::ReverseGeocoding { fallback }, GeoEvent::Geocoded(named)) => match named {
            Some(location) => (
                GeoState::Done(location.clone()),
                vec![SelectLocation(location.clone()), ClearMessage, Predict(location)],
            ),
            None => (
                GeoState::Done(fallback.clone()),
                vec![ClearMessage, Predict(fallback.clone())],
            ),
        },

        (GeoState::RequestingLowAccuracy, GeoEvent::PositionAcquired(position)) => {
            let location = Location::from_coordinates(position.latitude, position.longitude);
            (
                GeoState::Done(location.clone()),
                vec![SelectLocation(location.clone()), ClearMessage, Predict(location)],
            )
        }
        (GeoState::RequestingLowAccuracy, GeoEvent::PositionFailed(_)) => {
            failed(MSG_DETECTION_FAILED.to_string())
        }

        (other, event) => {
            debug!("ignoring {:?} in state {:?}", event, other);
            (other.clone(), Vec::new())
        }
    }
}

fn failed(message: String) -> (GeoState, Vec<Effect>) {
    (
        GeoState::Failed(message.clone()),
        vec![Effect::ShowMessage(message)],
    )
}

/// How a flow ended.
#[derive(Debug, Clone, PartialEq)]
pub enum GeoOutcome {
    /// Location chosen and a prediction requested for it
    Located(Location),
    /// Terminal failure with the user-facing message
    Failed(String),
    /// Another selection happened while the flow was running
    Superseded,
}

/// Runs the state machine against real collaborators.
pub struct GeolocationFlow<'a, P, G, A> {
    provider: &'a P,
    geocoder: &'a G,
    monitor: &'a LiveMonitor<A>,
}

impl<'a, P, G, A> GeolocationFlow<'a, P, G, A>
where
    P: PositionProvider,
    G: ReverseGeocoder,
    A: PredictionApi,
{
    #[must_use]
    pub fn new(provider: &'a P, geocoder: &'a G, monitor: &'a LiveMonitor<A>) -> Self {
        Self {
            provider,
            geocoder,
            monitor,
        }
    }

    async fn request_position(&self, options: PositionOptions) -> GeoEvent {
        debug!(
            "requesting position (high accuracy: {}, timeout: {:?})",
            options.high_accuracy, options.timeout
        );
        let result = tokio::time::timeout(options.timeout, self.provider.current_position(options))
            .await
            .unwrap_or(Err(PositionError::Timeout));

        match result {
            Ok(position) => {
                info!(
                    "location detected: {:.4}, {:.4}",
                    position.latitude, position.longitude
                );
                GeoEvent::PositionAcquired(position)
            }
            Err(e) => {
                warn!("geolocation error: {}", e);
                GeoEvent::PositionFailed(e)
            }
        }
    }

    /// Run the flow to completion.
    pub async fn run(&self) -> GeoOutcome {
        let state_handle = self.monitor.state();
        let mut generation = state_handle.selection_generation();
        let mut state = GeoState::Idle;
        let mut pending = Some(if self.provider.is_supported() {
            GeoEvent::Start
        } else {
            GeoEvent::Unsupported
        });

        state_handle.set_loading(true);

        while let Some(event) = pending.take() {
            let (next, effects) = transition(&state, event);
            state = next;

            for effect in effects {
                match effect {
                    Effect::RequestPosition(options) => {
                        pending = Some(self.request_position(options).await);
                    }
                    Effect::ReverseGeocode(position) => {
                        let named = self.geocoder.reverse(position.latitude, position.longitude).await;
                        pending = Some(GeoEvent::Geocoded(named));
                    }
                    Effect::SelectLocation(location) => {
                        match state_handle.select_location_if_current(generation, location) {
                            Some(next) => generation = next,
                            None => {
                                info!("geolocation superseded by a newer selection");
                                state_handle.set_loading(false);
                                return GeoOutcome::Superseded;
                            }
                        }
                    }
                    Effect::Predict(location) => {
                        if state_handle.selection_generation() != generation {
                            state_handle.set_loading(false);
                            return GeoOutcome::Superseded;
                        }
                        self.monitor.run_prediction(&location).await;
                    }
                    Effect::ShowMessage(message) => state_handle.set_error(Some(message)),
                    Effect::ClearMessage => state_handle.set_error(None),
                }
            }
        }

        state_handle.set_loading(false);

        match state {
            GeoState::Done(location) => GeoOutcome::Located(location),
            GeoState::Failed(message) => GeoOutcome::Failed(message),
            other => GeoOutcome::Failed(format!("geolocation stopped in state {other:?}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::monitor::tests::ScriptedApi;
    use crate::state::AppState;

    const FIX: Position = Position {
        latitude: 27.3389,
        longitude: 88.6065,
    };

    /// Answers position requests from a script and records the options used.
    struct ScriptedProvider {
        answers: Mutex<Vec<Result<Position, PositionError>>>,
        calls: Mutex<Vec<PositionOptions>>,
    }

    impl ScriptedProvider {
        fn new(answers: Vec<Result<Position, PositionError>>) -> Self {
            Self {
                answers: Mutex::new(answers),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<PositionOptions> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl PositionProvider for ScriptedProvider {
        async fn current_position(&self, options: PositionOptions) -> Result<Position, PositionError> {
            self.calls.lock().unwrap().push(options);
            let mut answers = self.answers.lock().unwrap();
            if answers.is_empty() {
                Err(PositionError::Timeout)
            } else {
                answers.remove(0)
            }
        }
    }

    struct NamedGeocoder(Option<&'static str>);

    impl ReverseGeocoder for NamedGeocoder {
        async fn reverse(&self, latitude: f64, longitude: f64) -> Option<Location> {
            self.0.map(|name| Location::new(name, latitude, longitude))
        }
    }

    fn monitor() -> (Arc<ScriptedApi>, LiveMonitor<ScriptedApi>) {
        let api = Arc::new(ScriptedApi::default());
        let monitor = LiveMonitor::new(Arc::clone(&api), AppState::new(), Duration::from_secs(300));
        (api, monitor)
    }

    #[test]
    fn test_timeout_on_retry_is_terminal() {
        let (state, effects) = transition(
            &GeoState::RequestingLowAccuracy,
            GeoEvent::PositionFailed(PositionError::Timeout),
        );
        assert_eq!(state, GeoState::Failed(MSG_DETECTION_FAILED.to_string()));
        assert!(!effects.iter().any(|e| matches!(e, Effect::RequestPosition(_))));
    }

    #[test]
    fn test_high_accuracy_fix_publishes_fallback_first() {
        let (state, effects) = transition(&GeoState::RequestingHighAccuracy, GeoEvent::PositionAcquired(FIX));
        let fallback = Location::from_coordinates(FIX.latitude, FIX.longitude);

        assert_eq!(
            state,
            GeoState::ReverseGeocoding {
                fallback: fallback.clone()
            }
        );
        assert_eq!(
            effects,
            vec![Effect::SelectLocation(fallback), Effect::ReverseGeocode(FIX)]
        );
    }

    #[test]
    fn test_stray_events_are_ignored() {
        let done = GeoState::Done(Location::new("x", 0.0, 0.0));
        let (state, effects) = transition(&done, GeoEvent::Start);
        assert_eq!(state, done);
        assert!(effects.is_empty());
    }

    #[tokio::test]
    async fn test_success_uses_geocoded_name() {
        let (api, monitor) = monitor();
        let provider = ScriptedProvider::new(vec![Ok(FIX)]);
        let geocoder = NamedGeocoder(Some("Gangtok, Sikkim, India"));

        let outcome = GeolocationFlow::new(&provider, &geocoder, &monitor).run().await;

        assert!(matches!(outcome, GeoOutcome::Located(ref l) if l.name == "Gangtok, Sikkim, India"));
        assert_eq!(provider.calls(), vec![HIGH_ACCURACY]);
        assert_eq!(api.request_names(), ["Gangtok, Sikkim, India"]);
        assert_eq!(
            monitor.state().selected_location().unwrap().name,
            "Gangtok, Sikkim, India"
        );
        assert!(!monitor.state().snapshot().loading);
    }

    #[tokio::test]
    async fn test_geocoding_failure_keeps_coordinates() {
        let (api, monitor) = monitor();
        let provider = ScriptedProvider::new(vec![Ok(FIX)]);

        let outcome = GeolocationFlow::new(&provider, &NamedGeocoder(None), &monitor).run().await;

        assert!(matches!(outcome, GeoOutcome::Located(_)));
        assert_eq!(api.request_names(), ["Location (27.3389, 88.6065)"]);
        assert!(monitor.state().error().is_none());
    }

    #[tokio::test]
    async fn test_timeout_retries_exactly_once() {
        let (api, monitor) = monitor();
        let provider = ScriptedProvider::new(vec![
            Err(PositionError::Timeout),
            Err(PositionError::Timeout),
            Ok(FIX),
        ]);

        let outcome = GeolocationFlow::new(&provider, &NamedGeocoder(None), &monitor).run().await;

        assert_eq!(outcome, GeoOutcome::Failed(MSG_DETECTION_FAILED.to_string()));
        assert_eq!(provider.calls(), vec![HIGH_ACCURACY, LOW_ACCURACY]);
        assert!(api.request_names().is_empty());
        assert_eq!(monitor.state().error().as_deref(), Some(MSG_DETECTION_FAILED));
    }

    #[tokio::test]
    async fn test_low_accuracy_retry_success_skips_geocoding() {
        let (api, monitor) = monitor();
        let provider = ScriptedProvider::new(vec![Err(PositionError::Timeout), Ok(FIX)]);
        let geocoder = NamedGeocoder(Some("never used"));

        let outcome = GeolocationFlow::new(&provider, &geocoder, &monitor).run().await;

        assert!(matches!(outcome, GeoOutcome::Located(ref l) if l.name.starts_with("Location (")));
        assert_eq!(api.request_names(), ["Location (27.3389, 88.6065)"]);
        assert!(monitor.state().error().is_none());
    }

    #[tokio::test]
    async fn test_permission_denied_does_not_retry() {
        let (_, monitor) = monitor();
        let provider = ScriptedProvider::new(vec![Err(PositionError::PermissionDenied)]);

        let outcome = GeolocationFlow::new(&provider, &NamedGeocoder(None), &monitor).run().await;

        assert_eq!(outcome, GeoOutcome::Failed(MSG_DENIED.to_string()));
        assert_eq!(provider.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_does_not_retry() {
        let (_, monitor) = monitor();
        let provider = ScriptedProvider::new(vec![Err(PositionError::PositionUnavailable)]);

        let outcome = GeolocationFlow::new(&provider, &NamedGeocoder(None), &monitor).run().await;

        assert_eq!(outcome, GeoOutcome::Failed(MSG_UNAVAILABLE.to_string()));
        assert_eq!(provider.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_provider() {
        let (_, monitor) = monitor();
        let outcome = GeolocationFlow::new(&FixedPosition(None), &NamedGeocoder(None), &monitor)
            .run()
            .await;
        assert_eq!(outcome, GeoOutcome::Failed(MSG_UNSUPPORTED.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_times_out() {
        struct Hanging;

        impl PositionProvider for Hanging {
            async fn current_position(&self, _options: PositionOptions) -> Result<Position, PositionError> {
                std::future::pending().await
            }
        }

        let (_, monitor) = monitor();
        let outcome = GeolocationFlow::new(&Hanging, &NamedGeocoder(None), &monitor).run().await;
        assert_eq!(outcome, GeoOutcome::Failed(MSG_DETECTION_FAILED.to_string()));
    }

    #[tokio::test]
    async fn test_newer_selection_supersedes_flow() {
        struct Interrupting<'a>(&'a AppState);

        impl ReverseGeocoder for Interrupting<'_> {
            async fn reverse(&self, latitude: f64, longitude: f64) -> Option<Location> {
                // User picks a city while the address lookup is in flight
                self.0.select_location(Location::new("Darjeeling", 27.04, 88.27));
                Some(Location::new("Gangtok", latitude, longitude))
            }
        }

        let (api, monitor) = monitor();
        let provider = ScriptedProvider::new(vec![Ok(FIX)]);
        let geocoder = Interrupting(monitor.state());

        let outcome = GeolocationFlow::new(&provider, &geocoder, &monitor).run().await;

        assert_eq!(outcome, GeoOutcome::Superseded);
        assert!(api.request_names().is_empty());
        assert_eq!(monitor.state().selected_location().unwrap().name, "Darjeeling");
    }
}
