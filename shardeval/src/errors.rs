//! Public error types for shardeval.

use shardeval_client::ClientError;
use thiserror::Error;

/// Errors that can occur while preparing or running exchanges.
///
/// `Config` is raised before any exchange starts and aborts the run. Every
/// other variant, when raised inside an exchange, is reported for that
/// sample only.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid run settings, e.g. both concat modes requested or no credentials.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The generation client gave up on the assistant turn.
    ///
    /// Displays the client error unchanged.
    #[error("{0}")]
    Client(#[from] ClientError),

    /// A task or sample file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A task or sample file is not valid JSON for its type.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A sample lacks something the task needs.
    #[error("Invalid sample {task_id}: {message}")]
    Sample {
        /// Offending sample.
        task_id: String,
        /// What is wrong with it.
        message: String,
    },

    /// The conversation logger failed to record an exchange.
    #[error("Logger error: {0}")]
    Logger(String),
}

impl Error {
    /// Whether this error must abort the whole run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
