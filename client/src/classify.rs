//! Failure classification for the generation retry loop.
//!
//! Precedence (first match wins):
//!
//! | Order | Kind | Signals | Action |
//! |-------|------|---------|--------|
//! | 1 | rate limit | 429, `RESOURCE_EXHAUSTED` | per-minute: wait hint+5s (default 60s); per-day: rotate if pool > 1 else give up |
//! | 2 | `ServerOverload` | 500/503, `INTERNAL`, `UNAVAILABLE`, "overloaded" | wait `min(2^attempt * 10, 120)` s |
//! | 3 | `NetworkTransient` | transport fault, "Server disconnected", "Connection" | wait `2^attempt + U(0,1)` s |
//! | 4 | `RetryableOther` | `ABORTED`, `DEADLINE_EXCEEDED`, 504 | wait `2^attempt + U(0,1)` s |
//! | 5 | `NonRetryable` | anything else | give up |
//!
//! A message carrying both a 429 and overload wording is a rate limit: its
//! recovery may rotate credentials, a server error's never does. The body of
//! any other 4xx response is not searched for server or connection wording.

use crate::backend::BackendFailure;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

static RETRY_IN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"retry in ([\d.]+)s").unwrap_or_else(|_| unreachable!("static pattern"))
});

static RETRY_DELAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""retryDelay"\s*:\s*"([\d.]+)s""#).unwrap_or_else(|_| unreachable!("static pattern"))
});

/// Fixed set of failure kinds a generate call can be assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Quota window of one minute, or an unspecified window.
    RateLimitPerMinute,
    /// Daily quota.
    RateLimitPerDay,
    /// Internal / unavailable / overloaded server.
    ServerOverload,
    /// Connection-level failure.
    NetworkTransient,
    /// Aborted or deadline-exceeded calls.
    RetryableOther,
    /// Anything else.
    NonRetryable,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RateLimitPerMinute => "rate_limit_per_minute",
            Self::RateLimitPerDay => "rate_limit_per_day",
            Self::ServerOverload => "server_overload",
            Self::NetworkTransient => "network_transient",
            Self::RetryableOther => "retryable_other",
            Self::NonRetryable => "non_retryable",
        })
    }
}

/// What the retry loop should do next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecoveryAction {
    /// Sleep for the duration, then retry with the same credential.
    WaitAndRetry(Duration),
    /// Switch to the next credential and retry immediately.
    RotateAndRetry,
    /// Propagate the failure.
    GiveUp,
}

/// Kind plus recovery action for one failure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FailureClassification {
    /// Assigned kind.
    pub kind: FailureKind,
    /// Recovery decision.
    pub action: RecoveryAction,
}

impl FailureClassification {
    /// The wait before the next attempt, if the action is a wait.
    #[must_use]
    pub const fn suggested_wait(&self) -> Option<Duration> {
        match self.action {
            RecoveryAction::WaitAndRetry(wait) => Some(wait),
            RecoveryAction::RotateAndRetry | RecoveryAction::GiveUp => None,
        }
    }

    /// [`Self::suggested_wait`] in seconds.
    #[must_use]
    pub fn suggested_wait_seconds(&self) -> Option<f64> {
        self.suggested_wait().map(|wait| wait.as_secs_f64())
    }

    /// Whether the loop should try again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self.action, RecoveryAction::GiveUp)
    }
}

/// Position of a failure within the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptContext {
    /// 1-based attempt that just failed.
    pub attempt: u32,
    /// Attempt budget.
    pub max_attempts: u32,
    /// Credentials available for rotation.
    pub pool_size: usize,
}

/// Assigns failures to a [`FailureKind`] and computes waits.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    /// Wait for rate limits without a parseable hint (default: 60s).
    pub default_rate_limit_wait: Duration,
    /// Added to a parsed retry hint (default: 5s).
    pub rate_limit_margin: Duration,
    /// Server backoff multiplier (default: 10s).
    pub server_backoff_base: Duration,
    /// Server backoff ceiling (default: 120s).
    pub server_backoff_cap: Duration,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self {
            default_rate_limit_wait: Duration::from_secs(60),
            rate_limit_margin: Duration::from_secs(5),
            server_backoff_base: Duration::from_secs(10),
            server_backoff_cap: Duration::from_secs(120),
        }
    }
}

impl ErrorClassifier {
    /// Classifies a failure, drawing jitter from the thread RNG.
    #[must_use]
    pub fn classify(&self, failure: &BackendFailure, ctx: AttemptContext) -> FailureClassification {
        let jitter = rand::thread_rng().gen_range(0.0..1.0);
        self.classify_with_jitter(failure, ctx, jitter)
    }

    /// Classifies a failure with an explicit jitter in `[0, 1)`.
    #[must_use]
    pub fn classify_with_jitter(
        &self,
        failure: &BackendFailure,
        ctx: AttemptContext,
        jitter: f64,
    ) -> FailureClassification {
        let AttemptContext {
            attempt,
            max_attempts,
            pool_size,
        } = ctx;
        let text = failure.message.as_str();
        let lowered = text.to_lowercase();

        if is_rate_limit(failure, text) {
            let wait = self.rate_limit_wait(text);

            if lowered.contains("per minute") || lowered.contains("perminute") {
                tracing::warn!(
                    event = "rate_limit",
                    window = "minute",
                    attempt,
                    max_attempts,
                    wait_secs = wait.as_secs(),
                    "rate_limit: per-minute quota, waiting"
                );
                return wait_and_retry(FailureKind::RateLimitPerMinute, wait);
            }

            if lowered.contains("per day") || lowered.contains("perday") {
                if pool_size > 1 {
                    tracing::warn!(
                        event = "rate_limit",
                        window = "day",
                        attempt,
                        max_attempts,
                        pool_size,
                        "rate_limit: daily quota, rotating credential"
                    );
                    return FailureClassification {
                        kind: FailureKind::RateLimitPerDay,
                        action: RecoveryAction::RotateAndRetry,
                    };
                }
                tracing::warn!(
                    event = "rate_limit",
                    window = "day",
                    attempt,
                    max_attempts,
                    "rate_limit: daily quota reached and no backup credential available"
                );
                return FailureClassification {
                    kind: FailureKind::RateLimitPerDay,
                    action: RecoveryAction::GiveUp,
                };
            }

            tracing::warn!(
                event = "rate_limit",
                window = "unspecified",
                attempt,
                max_attempts,
                wait_secs = wait.as_secs(),
                "rate_limit: waiting before retry"
            );
            return wait_and_retry(FailureKind::RateLimitPerMinute, wait);
        }

        if is_server_overload(failure, text, &lowered) {
            let wait = self.server_overload_backoff(attempt);
            tracing::warn!(
                event = "server_overload",
                attempt,
                max_attempts,
                wait_secs = wait.as_secs(),
                message = %truncate(text, 100),
                "server_overload: backing off"
            );
            return wait_and_retry(FailureKind::ServerOverload, wait);
        }

        if is_network(failure, text) {
            let wait = jittered_backoff(attempt, jitter);
            tracing::warn!(
                event = "network_transient",
                attempt,
                max_attempts,
                wait_secs = wait.as_secs_f64(),
                "network_transient: backing off"
            );
            return wait_and_retry(FailureKind::NetworkTransient, wait);
        }

        if is_retryable_other(failure) {
            let wait = jittered_backoff(attempt, jitter);
            tracing::warn!(
                event = "retryable_other",
                attempt,
                max_attempts,
                code = failure.code.as_deref().unwrap_or(""),
                wait_secs = wait.as_secs_f64(),
                "retryable_other: backing off"
            );
            return wait_and_retry(FailureKind::RetryableOther, wait);
        }

        tracing::warn!(
            event = "non_retryable",
            attempt,
            max_attempts,
            status = failure.status,
            message = %truncate(text, 200),
            "non_retryable"
        );
        FailureClassification {
            kind: FailureKind::NonRetryable,
            action: RecoveryAction::GiveUp,
        }
    }

    /// `min(base * 2^attempt, cap)`, monotonically non-decreasing in `attempt`.
    #[must_use]
    pub fn server_overload_backoff(&self, attempt: u32) -> Duration {
        let factor = 1_u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.server_backoff_base
            .saturating_mul(factor)
            .min(self.server_backoff_cap)
    }

    /// Parsed retry hint plus margin, or the default wait.
    #[must_use]
    pub fn rate_limit_wait(&self, text: &str) -> Duration {
        parse_retry_hint(text).map_or(self.default_rate_limit_wait, |hint| {
            hint.saturating_add(self.rate_limit_margin)
        })
    }
}

/// Extracts a whole-second retry hint (`retry in 12.7s` or `"retryDelay": "12s"`).
///
/// Fractions are truncated.
#[must_use]
pub fn parse_retry_hint(text: &str) -> Option<Duration> {
    let captured = RETRY_IN
        .captures(text)
        .or_else(|| RETRY_DELAY.captures(text))?;
    let seconds: f64 = captured.get(1)?.as_str().parse().ok()?;
    Duration::try_from_secs_f64(seconds.trunc()).ok()
}

/// `2^attempt + jitter` seconds; uncapped.
#[must_use]
pub fn jittered_backoff(attempt: u32, jitter: f64) -> Duration {
    let seconds = 2_f64.powf(f64::from(attempt)) + jitter.clamp(0.0, 1.0);
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}

const fn wait_and_retry(kind: FailureKind, wait: Duration) -> FailureClassification {
    FailureClassification {
        kind,
        action: RecoveryAction::WaitAndRetry(wait),
    }
}

fn is_rate_limit(failure: &BackendFailure, text: &str) -> bool {
    failure.status == Some(429)
        || failure.code.as_deref() == Some("RESOURCE_EXHAUSTED")
        || text.contains("429")
        || text.contains("RESOURCE_EXHAUSTED")
}

/// A 4xx other than 429: the body describes the request, so its wording
/// is not matched against server or connection signals.
fn is_client_error(failure: &BackendFailure) -> bool {
    matches!(failure.status, Some(400..=499)) && failure.status != Some(429)
}

fn is_server_overload(failure: &BackendFailure, text: &str, lowered: &str) -> bool {
    matches!(failure.status, Some(500 | 503))
        || matches!(failure.code.as_deref(), Some("INTERNAL" | "UNAVAILABLE"))
        || (!is_client_error(failure)
            && (text.contains("503")
                || text.contains("500")
                || text.contains("UNAVAILABLE")
                || lowered.contains("overloaded")))
}

fn is_network(failure: &BackendFailure, text: &str) -> bool {
    failure.transport.is_some()
        || (!is_client_error(failure)
            && (text.contains("RemoteProtocolError")
                || text.contains("Server disconnected")
                || text.contains("Connection")))
}

fn is_retryable_other(failure: &BackendFailure) -> bool {
    failure.status == Some(504)
        || matches!(
            failure.code.as_deref(),
            Some("ABORTED" | "DEADLINE_EXCEEDED")
        )
}

fn truncate(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(idx, _)| &text[..idx])
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use shardeval_gemini::NetworkFault;

    fn ctx(attempt: u32, pool_size: usize) -> AttemptContext {
        AttemptContext {
            attempt,
            max_attempts: 10,
            pool_size,
        }
    }

    #[test]
    fn test_per_minute_uses_hint_plus_margin() {
        let failure = BackendFailure::status(
            429,
            "Quota exceeded for GenerateRequestsPerMinutePerProjectPerModel. Please retry in 12.7s.",
        );
        let c = ErrorClassifier::default().classify_with_jitter(&failure, ctx(1, 1), 0.0);

        assert_eq!(c.kind, FailureKind::RateLimitPerMinute);
        assert_eq!(c.suggested_wait(), Some(Duration::from_secs(17)));
    }

    #[test]
    fn test_per_minute_without_hint_defaults_to_sixty() {
        let failure = BackendFailure::status(429, "limit: 10 requests per minute");
        let c = ErrorClassifier::default().classify_with_jitter(&failure, ctx(1, 1), 0.0);

        assert_eq!(c.kind, FailureKind::RateLimitPerMinute);
        assert_eq!(c.suggested_wait_seconds(), Some(60.0));
    }

    #[test]
    fn test_retry_delay_detail_is_parsed() {
        let body = r#"{"error":{"code":429,"status":"RESOURCE_EXHAUSTED","details":[{"retryDelay":"37s"}]}}"#;
        assert_eq!(parse_retry_hint(body), Some(Duration::from_secs(37)));
    }

    #[test]
    fn test_per_day_rotates_with_backup_credentials() {
        let failure = BackendFailure::status(429, "GenerateRequestsPerDayPerProjectPerModel-FreeTier")
            .with_code("RESOURCE_EXHAUSTED");
        let c = ErrorClassifier::default().classify_with_jitter(&failure, ctx(1, 3), 0.0);

        assert_eq!(c.kind, FailureKind::RateLimitPerDay);
        assert_eq!(c.action, RecoveryAction::RotateAndRetry);
        assert_eq!(c.suggested_wait(), None);
    }

    #[test]
    fn test_per_day_gives_up_on_single_credential() {
        let failure = BackendFailure::message("RESOURCE_EXHAUSTED: quota per day exceeded");
        let c = ErrorClassifier::default().classify_with_jitter(&failure, ctx(1, 1), 0.0);

        assert_eq!(c.kind, FailureKind::RateLimitPerDay);
        assert_eq!(c.action, RecoveryAction::GiveUp);
        assert!(!c.is_retryable());
    }

    #[test]
    fn test_unspecified_window_waits() {
        let failure = BackendFailure::message("429 Too Many Requests");
        let c = ErrorClassifier::default().classify_with_jitter(&failure, ctx(4, 2), 0.0);

        assert_eq!(c.kind, FailureKind::RateLimitPerMinute);
        assert_eq!(c.suggested_wait(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_rate_limit_wins_over_overload_wording() {
        let failure = BackendFailure::message("429: the model is overloaded, UNAVAILABLE");
        let c = ErrorClassifier::default().classify_with_jitter(&failure, ctx(1, 2), 0.0);

        assert_eq!(c.kind, FailureKind::RateLimitPerMinute);
    }

    #[test]
    fn test_server_overload_backoff_is_monotonic_and_capped() {
        let classifier = ErrorClassifier::default();
        let waits: Vec<Duration> = (0..40)
            .map(|attempt| classifier.server_overload_backoff(attempt))
            .collect();

        assert_eq!(waits[1], Duration::from_secs(20));
        assert_eq!(waits[2], Duration::from_secs(40));
        assert_eq!(waits[3], Duration::from_secs(80));
        assert_eq!(waits[4], Duration::from_secs(120));
        assert!(waits.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(waits.iter().all(|wait| *wait <= Duration::from_secs(120)));
    }

    #[test]
    fn test_server_overload_classification() {
        let failure = BackendFailure::status(503, "The model is overloaded. Please try again later.")
            .with_code("UNAVAILABLE");
        let c = ErrorClassifier::default().classify_with_jitter(&failure, ctx(2, 1), 0.0);

        assert_eq!(c.kind, FailureKind::ServerOverload);
        assert_eq!(c.suggested_wait(), Some(Duration::from_secs(40)));
    }

    #[test]
    fn test_network_failure_uses_jittered_backoff() {
        let failure = BackendFailure::network(NetworkFault::Disconnected, "Server disconnected");
        let c = ErrorClassifier::default().classify_with_jitter(&failure, ctx(3, 1), 0.5);

        assert_eq!(c.kind, FailureKind::NetworkTransient);
        assert_eq!(c.suggested_wait(), Some(Duration::from_secs_f64(8.5)));
    }

    #[test]
    fn test_random_jitter_stays_in_range() {
        let failure = BackendFailure::message("Connection reset by peer");
        for _ in 0..50 {
            let c = ErrorClassifier::default().classify(&failure, ctx(2, 1));
            let wait = c.suggested_wait().unwrap();
            assert!(wait >= Duration::from_secs(4) && wait < Duration::from_secs(5));
        }
    }

    #[test]
    fn test_aborted_is_retryable_other() {
        let failure = BackendFailure::status(409, "request aborted").with_code("ABORTED");
        let c = ErrorClassifier::default().classify_with_jitter(&failure, ctx(1, 1), 0.0);

        assert_eq!(c.kind, FailureKind::RetryableOther);
        assert_eq!(c.suggested_wait(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_unmatched_is_non_retryable() {
        let failure = BackendFailure::status(400, "API key not valid. Please pass a valid API key.")
            .with_code("INVALID_ARGUMENT");
        let c = ErrorClassifier::default().classify_with_jitter(&failure, ctx(1, 5), 0.0);

        assert_eq!(c.kind, FailureKind::NonRetryable);
        assert_eq!(c.action, RecoveryAction::GiveUp);
    }

    #[test]
    fn test_client_error_body_digits_are_not_overload() {
        let failure = BackendFailure::status(
            400,
            "The input token count (1500000) exceeds the maximum number of tokens allowed (1048576).",
        )
        .with_code("INVALID_ARGUMENT");
        let c = ErrorClassifier::default().classify_with_jitter(&failure, ctx(1, 1), 0.0);

        assert_eq!(c.kind, FailureKind::NonRetryable);
        assert_eq!(c.action, RecoveryAction::GiveUp);

        let failure = BackendFailure::status(403, "Connection from this region is not allowed");
        let c = ErrorClassifier::default().classify_with_jitter(&failure, ctx(1, 1), 0.0);
        assert_eq!(c.kind, FailureKind::NonRetryable);
    }

    #[test]
    fn test_unstatused_message_still_matches_overload_wording() {
        let failure = BackendFailure::message("500 Internal Server Error");
        let c = ErrorClassifier::default().classify_with_jitter(&failure, ctx(1, 1), 0.0);

        assert_eq!(c.kind, FailureKind::ServerOverload);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
