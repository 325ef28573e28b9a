use crate::backend::BackendFailure;
use crate::classify::FailureKind;
use shardeval_gemini::GeminiError;
use thiserror::Error;

/// Errors surfaced by [`crate::GenerationClient`] and its collaborators.
///
/// Retryable failures never appear here directly: they are absorbed by the
/// retry loop until the attempt budget runs out.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The classifier decided the failure cannot be recovered from.
    ///
    /// Displays the original failure unchanged.
    #[error("{failure}")]
    NonRetryable {
        /// How the failure was classified (a daily quota on a lone
        /// credential lands here as `RateLimitPerDay`).
        kind: FailureKind,
        /// Attempt on which the client gave up.
        attempt: u32,
        /// The failure as reported by the backend.
        #[source]
        failure: BackendFailure,
    },

    /// Every attempt in the budget failed with a retryable failure.
    #[error("Failed to generate content after {attempts} attempts; last failure: {last_failure}")]
    GenerationExhausted {
        /// Attempts consumed.
        attempts: u32,
        /// Failure observed on the final attempt.
        last_failure: BackendFailure,
    },

    /// Structured output was requested but the model text is not valid JSON.
    #[error("Structured output could not be decoded: {message}")]
    StructuredDecode {
        /// Decoder error message.
        message: String,
        /// Raw model text that failed to decode.
        raw_text: String,
    },

    /// Invalid client or prompt configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error from the Gemini adapter outside a generate call.
    #[error("Gemini adapter error: {0}")]
    Gemini(#[from] GeminiError),
}

impl ClientError {
    /// Classified failure kind, for errors that carry one.
    #[must_use]
    pub const fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::NonRetryable { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
