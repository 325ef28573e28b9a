//! Timing and token estimates for one extraction call.

use std::time::Duration;

/// Metrics collected during an extraction call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionMetrics {
    /// Extraction calls issued.
    pub total_attempts: usize,
    /// Wall-clock time spent, including backoff inside the client.
    pub wall_time: Duration,
    /// Estimated prompt tokens across all attempts.
    pub estimated_input_tokens: usize,
    /// Estimated reply tokens across all attempts.
    pub estimated_output_tokens: usize,
}

/// Estimates tokens at 4 characters per token, rounding up.
///
/// Counts `char`s rather than bytes.
///
/// ```
/// use shardeval_extraction::estimate_tokens;
///
/// assert_eq!(estimate_tokens("hello"), 2);
/// assert_eq!(estimate_tokens("hello world"), 3);
/// ```
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}
