//! Prediction backend API client.
//!
//! Provides async HTTP access to the predictions, alerts, history and
//! locations endpoints. Uses reqwest with rustls for TLS.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::errors::RiskwatchError;
use crate::models::{
    Alert, AlertQuery, Location, NewLocation, Prediction, PredictionEnvelope, PredictionRequest,
};

/// Backend request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// User agent string for API requests.
pub const USER_AGENT: &str = concat!("riskwatch/", env!("CARGO_PKG_VERSION"));

/// Default number of history entries requested.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// The slice of the backend the live monitor depends on.
pub trait PredictionApi: Send + Sync {
    /// Request a fresh prediction for a location.
    fn fetch_prediction(
        &self,
        request: &PredictionRequest,
    ) -> impl Future<Output = Result<PredictionEnvelope, RiskwatchError>> + Send;

    /// List stored alerts, optionally filtered.
    fn fetch_alerts(
        &self,
        query: &AlertQuery,
    ) -> impl Future<Output = Result<Vec<Alert>, RiskwatchError>> + Send;
}

/// Client for the prediction backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    config: Config,
}

impl ApiClient {
    /// Create a new backend client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(config: &Config) -> Result<Self, RiskwatchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Send a request and decode a JSON body, mapping non-2xx to [`RiskwatchError::Api`].
    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RiskwatchError> {
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &body));
        }

        Ok(response.json().await?)
    }

    /// Fetch prediction history, newest first.
    ///
    /// A body that is not a JSON array is treated as no history.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or an entry cannot be parsed.
    #[instrument(skip(self))]
    pub async fn fetch_history(&self, limit: usize) -> Result<Vec<Prediction>, RiskwatchError> {
        let url = self.config.api_url("/api/predictions/history")?;
        debug!("fetching history from {}", url);

        let body: Value = self
            .send_json(self.client.get(url).query(&[("limit", limit)]))
            .await?;

        match body {
            Value::Array(_) => {
                let history: Vec<Prediction> = serde_json::from_value(body)?;
                debug!("fetched {} predictions", history.len());
                Ok(history)
            }
            other => {
                warn!("history endpoint returned non-array body: {}", other);
                Ok(Vec::new())
            }
        }
    }

    /// Fetch the backend's stored locations.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or response cannot be parsed.
    #[instrument(skip(self))]
    pub async fn fetch_locations(&self) -> Result<Vec<Location>, RiskwatchError> {
        let url = self.config.api_url("/api/locations")?;
        debug!("fetching locations from {}", url);
        self.send_json(self.client.get(url)).await
    }

    /// Store a location on the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or response cannot be parsed.
    #[instrument(skip(self), fields(name = %location.name))]
    pub async fn create_location(&self, location: &NewLocation) -> Result<Location, RiskwatchError> {
        let url = self.config.api_url("/api/locations")?;
        debug!("creating location at {}", url);
        self.send_json(self.client.post(url).json(location)).await
    }
}

impl PredictionApi for ApiClient {
    #[instrument(skip(self), fields(location = %request.location_name))]
    async fn fetch_prediction(
        &self,
        request: &PredictionRequest,
    ) -> Result<PredictionEnvelope, RiskwatchError> {
        let url = self.config.api_url("/api/predictions")?;
        debug!("requesting prediction from {}", url);
        self.send_json(self.client.post(url).json(request)).await
    }

    #[instrument(skip(self))]
    async fn fetch_alerts(&self, query: &AlertQuery) -> Result<Vec<Alert>, RiskwatchError> {
        let url = self.config.api_url("/api/alerts")?;
        debug!("fetching alerts from {}", url);

        let alerts: Vec<Alert> = self.send_json(self.client.get(url).query(query)).await?;
        debug!("fetched {} alerts", alerts.len());
        Ok(alerts)
    }
}

/// Build an API error, preferring the backend's `message` field.
fn api_error(status: u16, body: &str) -> RiskwatchError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());

    RiskwatchError::Api { status, message }
}
