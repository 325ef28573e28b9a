//! Why an extraction attempt was rejected.

use thiserror::Error;

/// Reason a single extraction attempt did not yield an accepted answer.
///
/// Rejections never escape [`crate::AnswerExtractor`]; they drive the
/// feedback for the next attempt and are logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectionReason {
    /// The generation call itself failed (after the client's own retries).
    #[error("extraction call failed: {0}")]
    Generation(String),

    /// The structured payload did not match `{"answer": string}`.
    #[error("payload does not match the answer schema: {}", .0.join("; "))]
    MalformedPayload(Vec<String>),

    /// A prefix/suffix pair could not be located in the response.
    #[error("could not locate prefix {prefix:?} and suffix {suffix:?} in the response")]
    SpanNotLocated {
        /// Trimmed prefix.
        prefix: String,
        /// Trimmed suffix.
        suffix: String,
    },

    /// The candidate is not a literal substring of the response.
    #[error("candidate {0:?} does not appear verbatim in the response")]
    NotExtractive(String),

    /// The candidate was empty.
    #[error("candidate answer was empty")]
    EmptyCandidate,
}
