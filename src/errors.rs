//! Error types for riskwatch.
//!
//! Uses `thiserror` for library-style error definitions.

use thiserror::Error;

/// Errors that can occur in riskwatch operations.
#[derive(Error, Debug)]
pub enum RiskwatchError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("Failed to parse JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Backend API returned an error status
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Configuration could not be used
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// URL could not be built
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Live channel transport failed
    #[error("Live channel error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Live channel sent something we could not decode
    #[error("Malformed live channel packet: {0}")]
    Packet(String),
}

impl RiskwatchError {
    /// Message suitable for showing to a user in place of a failed result.
    ///
    /// Backend errors carry their own message; everything else falls back
    /// to the display form.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Api { message, .. } if !message.is_empty() => message.clone(),
            Self::Http(e) if e.is_timeout() => "request timed out".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_prefers_backend_message() {
        let err = RiskwatchError::Api {
            status: 503,
            message: "model offline".into(),
        };
        assert_eq!(err.user_message(), "model offline");
    }

    #[test]
    fn test_empty_api_message_falls_back_to_display() {
        let err = RiskwatchError::Api {
            status: 500,
            message: String::new(),
        };
        assert_eq!(err.user_message(), "API error (HTTP 500): ");
    }
}
