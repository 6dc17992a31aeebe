//! Live monitoring: prediction requests and the re-prediction poll loop.
//!
//! Overlapping requests (a manual trigger while a poll tick is in flight)
//! are not cancelled; whichever response lands last becomes the latest
//! prediction.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::client::PredictionApi;
use crate::models::{AlertQuery, Location, Prediction, PredictionRequest};
use crate::state::AppState;

/// Drives predictions for the selected location.
#[derive(Debug)]
pub struct LiveMonitor<A> {
    api: Arc<A>,
    state: AppState,
    poll_interval: Duration,
}

impl<A> Clone for LiveMonitor<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            state: self.state.clone(),
            poll_interval: self.poll_interval,
        }
    }
}

impl<A: PredictionApi> LiveMonitor<A> {
    #[must_use]
    pub fn new(api: Arc<A>, state: AppState, poll_interval: Duration) -> Self {
        Self {
            api,
            state,
            poll_interval,
        }
    }

    #[must_use]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Request a prediction for `location` and fold the result into state.
    ///
    /// Failures are recorded as the state's error message; the returned
    /// prediction is `None` in that case.
    pub async fn run_prediction(&self, location: &Location) -> Option<Prediction> {
        self.state.set_loading(true);
        self.state.set_error(None);

        let request = PredictionRequest::from(location);
        let result = self.api.fetch_prediction(&request).await;

        let prediction = match result {
            Ok(envelope) => {
                if let Some(alert) = envelope.alert {
                    info!("alert raised: {}", alert.message);
                    self.state.push_alert(alert);
                }
                if let Some(prediction) = envelope.prediction.as_ref() {
                    debug!(
                        "prediction for {}: {:?}",
                        location.name,
                        prediction.risk_level()
                    );
                    self.state.set_prediction(prediction.clone());
                }
                envelope.prediction
            }
            Err(e) => {
                warn!("prediction for {} failed: {}", location.name, e);
                self.state.set_error(Some(e.user_message()));
                None
            }
        };

        self.state.set_loading(false);
        prediction
    }

    /// Select `location` and predict for it.
    pub async fn trigger_prediction(&self, location: Location) -> Option<Prediction> {
        self.state.select_location(location.clone());
        self.run_prediction(&location).await
    }

    /// Replace the alert list from the backend. Best effort: failures are
    /// logged and leave the current list alone.
    pub async fn load_alerts(&self, query: &AlertQuery) {
        match self.api.fetch_alerts(query).await {
            Ok(alerts) => self.state.replace_alerts(alerts),
            Err(e) => warn!("failed to load alerts: {}", e),
        }
    }

    /// Re-predict for the selected location every poll interval.
    ///
    /// A new selection cancels the running interval and starts a fresh one,
    /// so at most one interval is active. Runs until the state is dropped.
    pub async fn run_polling(&self) {
        let mut selection = self.state.watch_selection();

        loop {
            let current = selection.borrow_and_update().clone();

            let Some(location) = current else {
                if selection.changed().await.is_err() {
                    return;
                }
                continue;
            };

            debug!(
                "polling {} every {}ms",
                location.name,
                self.poll_interval.as_millis()
            );

            let mut ticker =
                tokio::time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_prediction(&location).await;
                    }
                    changed = selection.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::errors::RiskwatchError;
    use crate::models::{Alert, ModelResponse, PredictionEnvelope, RiskLevel};

    /// Records requests and answers from a script; an empty script fails.
    #[derive(Default)]
    pub(crate) struct ScriptedApi {
        pub requests: Mutex<Vec<PredictionRequest>>,
        pub responses: Mutex<Vec<Result<PredictionEnvelope, RiskwatchError>>>,
        pub alerts: Mutex<Vec<Alert>>,
    }

    impl ScriptedApi {
        pub(crate) fn request_names(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.location_name.clone())
                .collect()
        }
    }

    impl PredictionApi for ScriptedApi {
        async fn fetch_prediction(
            &self,
            request: &PredictionRequest,
        ) -> Result<PredictionEnvelope, RiskwatchError> {
            self.requests.lock().unwrap().push(request.clone());
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(envelope(RiskLevel::Low, None))
            } else {
                responses.remove(0)
            }
        }

        async fn fetch_alerts(&self, _query: &AlertQuery) -> Result<Vec<Alert>, RiskwatchError> {
            Ok(self.alerts.lock().unwrap().clone())
        }
    }

    pub(crate) fn envelope(level: RiskLevel, alert: Option<Alert>) -> PredictionEnvelope {
        PredictionEnvelope {
            prediction: Some(Prediction {
                id: None,
                model_request: None,
                model_response: Some(ModelResponse {
                    risk_level: level,
                    confidence: 0.9,
                    probabilities: None,
                }),
                weather_snapshot: None,
                created_at: None,
                location: None,
            }),
            alert,
        }
    }

    fn alert(id: &str) -> Alert {
        Alert {
            id: id.to_string(),
            message: "Heavy rainfall".into(),
            risk_level: RiskLevel::High,
            location: None,
            created_at: None,
        }
    }

    fn monitor(api: Arc<ScriptedApi>, interval: Duration) -> LiveMonitor<ScriptedApi> {
        LiveMonitor::new(api, AppState::new(), interval)
    }

    #[tokio::test]
    async fn test_prediction_updates_state() {
        let api = Arc::new(ScriptedApi::default());
        api.responses
            .lock()
            .unwrap()
            .push(Ok(envelope(RiskLevel::High, Some(alert("a1")))));
        let monitor = monitor(Arc::clone(&api), Duration::from_secs(300));

        let prediction = monitor
            .trigger_prediction(Location::new("Guwahati", 26.14, 91.73))
            .await;

        assert_eq!(prediction.and_then(|p| p.risk_level()), Some(RiskLevel::High));
        let state = monitor.state().snapshot();
        assert_eq!(state.selected_location.unwrap().name, "Guwahati");
        assert_eq!(state.alerts.len(), 1);
        assert!(!state.loading);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_failed_prediction_sets_error() {
        let api = Arc::new(ScriptedApi::default());
        api.responses.lock().unwrap().push(Err(RiskwatchError::Api {
            status: 500,
            message: "model unavailable".into(),
        }));
        let monitor = monitor(Arc::clone(&api), Duration::from_secs(300));
        monitor.state().set_prediction(envelope(RiskLevel::Low, None).prediction.unwrap());

        let result = monitor.run_prediction(&Location::new("Puri", 19.81, 85.83)).await;

        assert!(result.is_none());
        assert_eq!(monitor.state().error().as_deref(), Some("model unavailable"));
        assert!(!monitor.state().snapshot().loading);
        // Previous prediction survives a failed refresh
        assert!(monitor.state().latest_prediction().is_some());
    }

    #[tokio::test]
    async fn test_load_alerts_replaces_list() {
        let api = Arc::new(ScriptedApi::default());
        api.alerts.lock().unwrap().extend([alert("x"), alert("y")]);
        let monitor = monitor(Arc::clone(&api), Duration::from_secs(300));
        monitor.state().push_alert(alert("stale"));

        monitor.load_alerts(&AlertQuery::default()).await;

        let ids: Vec<String> = monitor.state().alerts().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, ["x", "y"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_restarts_on_new_selection() {
        let api = Arc::new(ScriptedApi::default());
        let monitor = monitor(Arc::clone(&api), Duration::from_secs(60));

        let poller = monitor.clone();
        let handle = tokio::spawn(async move { poller.run_polling().await });

        // Nothing selected: nothing polled
        tokio::time::sleep(Duration::from_secs(130)).await;
        assert!(api.request_names().is_empty());

        monitor.state().select_location(Location::new("Mumbai", 19.07, 72.87));
        tokio::time::sleep(Duration::from_secs(125)).await;
        assert_eq!(api.request_names(), ["Mumbai", "Mumbai"]);

        // New selection 5s before the next tick: old interval is dropped
        monitor.state().select_location(Location::new("Pune", 18.52, 73.85));
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(api.request_names().len(), 2);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(api.request_names(), ["Mumbai", "Mumbai", "Pune"]);

        handle.abort();
    }
}
