//! Retry budget and classifier tunables for [`crate::GenerationClient`].

use crate::classify::ErrorClassifier;
use crate::errors::ClientError;
use std::time::Duration;

/// Configuration for the generation retry loop.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Maximum attempts per generate call, including the first (default: 10).
    pub max_attempts: u32,
    /// Optional cap on total time spent waiting inside one call (default: none).
    pub max_elapsed: Option<Duration>,
    /// Wait for rate limits without a parseable hint (default: 60s).
    pub default_rate_limit_wait: Duration,
    /// Margin added to a parsed retry hint (default: 5s).
    pub rate_limit_margin: Duration,
    /// Server-overload backoff multiplier (default: 10s).
    pub server_backoff_base: Duration,
    /// Server-overload backoff ceiling (default: 120s).
    pub server_backoff_cap: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let classifier = ErrorClassifier::default();
        Self {
            max_attempts: 10,
            max_elapsed: None,
            default_rate_limit_wait: classifier.default_rate_limit_wait,
            rate_limit_margin: classifier.rate_limit_margin,
            server_backoff_base: classifier.server_backoff_base,
            server_backoff_cap: classifier.server_backoff_cap,
        }
    }
}

impl ClientConfig {
    /// Set the maximum number of attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    /// Set a cap on total waiting time per call.
    #[must_use]
    pub const fn with_max_elapsed(mut self, limit: Duration) -> Self {
        self.max_elapsed = Some(limit);
        self
    }

    /// Set the fallback rate-limit wait.
    #[must_use]
    pub const fn with_default_rate_limit_wait(mut self, wait: Duration) -> Self {
        self.default_rate_limit_wait = wait;
        self
    }

    /// Set the server backoff base and cap.
    #[must_use]
    pub const fn with_server_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.server_backoff_base = base;
        self.server_backoff_cap = cap;
        self
    }

    /// Checks the invariants the retry loop relies on.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` when `max_attempts` is zero or the
    /// backoff cap is below its base.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.max_attempts == 0 {
            return Err(ClientError::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.server_backoff_cap < self.server_backoff_base {
            return Err(ClientError::Config(format!(
                "server backoff cap ({:?}) is below its base ({:?})",
                self.server_backoff_cap, self.server_backoff_base
            )));
        }
        Ok(())
    }

    /// The classifier these settings describe.
    #[must_use]
    pub const fn classifier(&self) -> ErrorClassifier {
        ErrorClassifier {
            default_rate_limit_wait: self.default_rate_limit_wait,
            rate_limit_margin: self.rate_limit_margin,
            server_backoff_base: self.server_backoff_base,
            server_backoff_cap: self.server_backoff_cap,
        }
    }
}
