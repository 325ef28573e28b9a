//! The seam between the retry loop and whatever actually talks to a model.

use crate::credentials::Credential;
use crate::generation::GenerationRequest;
use async_trait::async_trait;
use shardeval_gemini::NetworkFault;
use std::fmt;

/// A single failed backend call, reduced to the fields the classifier inspects.
///
/// Carrying plain status/code/message data keeps classification independent
/// of any transport library's error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendFailure {
    /// HTTP status, when the failure was an error response.
    pub status: Option<u16>,
    /// Provider status string such as `RESOURCE_EXHAUSTED` or `UNAVAILABLE`.
    pub code: Option<String>,
    /// Transport fault, when the request never produced a response.
    pub transport: Option<NetworkFault>,
    /// Full failure text (the raw error body for HTTP failures).
    pub message: String,
}

impl BackendFailure {
    /// A failure with only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            transport: None,
            message: message.into(),
        }
    }

    /// An HTTP error response.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            ..Self::message(message)
        }
    }

    /// A transport-level failure.
    pub fn network(fault: NetworkFault, message: impl Into<String>) -> Self {
        Self {
            transport: Some(fault),
            ..Self::message(message)
        }
    }

    /// Attaches a provider status string.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl fmt::Display for BackendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, &self.code) {
            (Some(status), Some(code)) => write!(f, "{status} {code}: {}", self.message),
            (Some(status), None) => write!(f, "{status}: {}", self.message),
            (None, Some(code)) => write!(f, "{code}: {}", self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for BackendFailure {}

/// Executes one generation attempt with a given credential. No retries.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Returns the model's raw text, or the failure to classify.
    async fn generate_once(
        &self,
        credential: &Credential,
        request: &GenerationRequest,
    ) -> Result<String, BackendFailure>;
}
