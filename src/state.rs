//! Shared application state.
//!
//! One owned [`DashboardState`] behind a lock. The only way to change it is
//! through the transition methods on [`AppState`], each of which announces
//! itself on a broadcast channel. The selected location is also published on
//! a watch channel so the poll loop can restart when it changes.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::models::{Alert, Location, Prediction};

/// Alerts kept in memory; the oldest fall off past this.
pub const MAX_ALERTS: usize = 1_000;

/// Capacity of the change-notification channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Everything the views read.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardState {
    pub selected_location: Option<Location>,
    pub latest_prediction: Option<Prediction>,
    /// Newest first
    pub alerts: Vec<Alert>,
    pub socket_connected: bool,
    pub loading: bool,
    /// Last user-facing error, cleared on the next attempt
    pub error: Option<String>,
    /// Bumped on every selection; lets stale flows detect they were superseded
    #[serde(skip)]
    selection_generation: u64,
}

/// A state transition, as announced to subscribers.
#[derive(Debug, Clone)]
pub enum StateEvent {
    LocationSelected(Location),
    PredictionUpdated(Box<Prediction>),
    AlertReceived(Box<Alert>),
    AlertsReplaced(usize),
    ConnectionChanged(bool),
    LoadingChanged(bool),
    ErrorChanged(Option<String>),
}

/// Cloneable handle to the shared state.
#[derive(Debug, Clone)]
pub struct AppState {
    inner: Arc<RwLock<DashboardState>>,
    events: broadcast::Sender<StateEvent>,
    selection: Arc<watch::Sender<Option<Location>>>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (selection, _) = watch::channel(None);

        Self {
            inner: Arc::new(RwLock::new(DashboardState::default())),
            events,
            selection: Arc::new(selection),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, DashboardState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, DashboardState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn announce(&self, event: StateEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Subscribe to state transitions.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.events.subscribe()
    }

    /// Watch the selected location.
    #[must_use]
    pub fn watch_selection(&self) -> watch::Receiver<Option<Location>> {
        self.selection.subscribe()
    }

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> DashboardState {
        self.read().clone()
    }

    #[must_use]
    pub fn selected_location(&self) -> Option<Location> {
        self.read().selected_location.clone()
    }

    #[must_use]
    pub fn latest_prediction(&self) -> Option<Prediction> {
        self.read().latest_prediction.clone()
    }

    #[must_use]
    pub fn alerts(&self) -> Vec<Alert> {
        self.read().alerts.clone()
    }

    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.read().error.clone()
    }

    /// Current selection generation.
    #[must_use]
    pub fn selection_generation(&self) -> u64 {
        self.read().selection_generation
    }

    /// Select a location unconditionally. Returns the new generation.
    pub fn select_location(&self, location: Location) -> u64 {
        let mut state = self.write();
        self.apply_selection(&mut state, location)
    }

    /// Select a location only if nothing else was selected since
    /// `generation`. Returns the new generation, or `None` if superseded.
    pub fn select_location_if_current(&self, generation: u64, location: Location) -> Option<u64> {
        let mut state = self.write();
        if state.selection_generation != generation {
            return None;
        }
        Some(self.apply_selection(&mut state, location))
    }

    /// Store and publish a selection under the write guard, so the watch
    /// channel always agrees with `selected_location`.
    fn apply_selection(&self, state: &mut DashboardState, location: Location) -> u64 {
        state.selection_generation += 1;
        state.selected_location = Some(location.clone());
        self.selection.send_replace(Some(location.clone()));
        self.announce(StateEvent::LocationSelected(location));
        state.selection_generation
    }

    /// Replace the latest prediction.
    pub fn set_prediction(&self, prediction: Prediction) {
        self.write().latest_prediction = Some(prediction.clone());
        self.announce(StateEvent::PredictionUpdated(Box::new(prediction)));
    }

    /// Prepend a newly arrived alert.
    pub fn push_alert(&self, alert: Alert) {
        {
            let mut state = self.write();
            state.alerts.insert(0, alert.clone());
            state.alerts.truncate(MAX_ALERTS);
        }
        self.announce(StateEvent::AlertReceived(Box::new(alert)));
    }

    /// Replace the whole alert list (initial load or a filtered reload).
    pub fn replace_alerts(&self, mut alerts: Vec<Alert>) {
        alerts.truncate(MAX_ALERTS);
        let count = alerts.len();
        self.write().alerts = alerts;
        self.announce(StateEvent::AlertsReplaced(count));
    }

    pub fn set_connected(&self, connected: bool) {
        let changed = {
            let mut state = self.write();
            let changed = state.socket_connected != connected;
            state.socket_connected = connected;
            changed
        };
        if changed {
            self.announce(StateEvent::ConnectionChanged(connected));
        }
    }

    pub fn set_loading(&self, loading: bool) {
        self.write().loading = loading;
        self.announce(StateEvent::LoadingChanged(loading));
    }

    pub fn set_error(&self, error: Option<String>) {
        self.write().error = error.clone();
        self.announce(StateEvent::ErrorChanged(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiskLevel;

    fn alert(id: &str) -> Alert {
        Alert {
            id: id.to_string(),
            message: format!("alert {id}"),
            risk_level: RiskLevel::High,
            location: None,
            created_at: None,
        }
    }

    #[test]
    fn test_alerts_newest_first() {
        let state = AppState::new();
        state.push_alert(alert("a"));
        state.push_alert(alert("b"));
        state.push_alert(alert("c"));

        let ids: Vec<String> = state.alerts().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, ["c", "b", "a"]);
    }

    #[test]
    fn test_alert_list_is_bounded() {
        let state = AppState::new();
        state.replace_alerts((0..MAX_ALERTS).map(|i| alert(&i.to_string())).collect());
        state.push_alert(alert("newest"));

        let alerts = state.alerts();
        assert_eq!(alerts.len(), MAX_ALERTS);
        assert_eq!(alerts[0].id, "newest");
        assert_eq!(alerts[MAX_ALERTS - 1].id, (MAX_ALERTS - 2).to_string());
    }

    #[test]
    fn test_conditional_selection() {
        let state = AppState::new();
        let start = state.selection_generation();

        let next = state
            .select_location_if_current(start, Location::from_coordinates(1.0, 2.0))
            .expect("not superseded");

        // A user pick in between wins over the stale flow
        state.select_location(Location::new("Pune", 18.52, 73.85));
        assert!(
            state
                .select_location_if_current(next, Location::new("Stale", 0.0, 0.0))
                .is_none()
        );
        assert_eq!(state.selected_location().unwrap().name, "Pune");
    }

    #[test]
    fn test_concurrent_selections_keep_watch_in_sync() {
        let state = AppState::new();
        let selection = state.watch_selection();

        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let state = state.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        state.select_location(Location::new(format!("w{worker}-{i}"), 0.0, 0.0));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let selected = state.selected_location().unwrap();
        assert_eq!(selection.borrow().as_ref(), Some(&selected));
        assert_eq!(state.selection_generation(), 8 * 200);
    }

    #[test]
    fn test_events_and_watch() {
        let state = AppState::new();
        let mut events = state.subscribe();
        let selection = state.watch_selection();

        state.set_connected(true);
        state.set_connected(true);
        state.select_location(Location::new("Leh", 34.15, 77.58));

        assert!(matches!(events.try_recv(), Ok(StateEvent::ConnectionChanged(true))));
        assert!(matches!(events.try_recv(), Ok(StateEvent::LocationSelected(_))));
        assert!(events.try_recv().is_err());
        assert_eq!(selection.borrow().as_ref().map(|l| l.name.as_str()), Some("Leh"));
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let state = AppState::new();
        state.set_error(Some("boom".into()));
        let value = serde_json::to_value(state.snapshot()).unwrap();
        assert_eq!(value["error"], "boom");
        assert_eq!(value["socketConnected"], false);
        assert!(value.get("selectionGeneration").is_none());
    }
}
