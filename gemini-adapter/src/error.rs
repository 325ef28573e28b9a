//! Error types for the Gemini adapter.

use crate::types::NetworkFault;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("No API keys found. Set {0} to a comma-separated list of keys")]
    NoApiKeys(&'static str),

    #[error("API returned status {status}: {body}")]
    Status {
        status: u16,
        api_status: Option<String>,
        message: String,
        body: String,
    },

    #[error("{message}")]
    Network { fault: NetworkFault, message: String },

    #[error("Response contained no candidate text: {0}")]
    EmptyResponse(String),

    #[error("Failed to parse response body: {0}")]
    InvalidResponse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl GeminiError {
    /// Maps a `reqwest` transport error onto a [`NetworkFault`].
    #[must_use]
    pub fn from_transport(err: &reqwest::Error) -> Self {
        let fault = if err.is_timeout() {
            NetworkFault::Timeout
        } else if err.is_connect() {
            NetworkFault::Connect
        } else if err.is_body() || err.is_request() {
            NetworkFault::Disconnected
        } else {
            NetworkFault::Other
        };
        Self::Network {
            fault,
            message: format!("Connection error: {err}"),
        }
    }

    /// HTTP status code, when the failure came from an error response.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
