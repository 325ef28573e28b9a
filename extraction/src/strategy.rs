//! Extraction strategies and the prefix/suffix span locator.

use crate::error::RejectionReason;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator the model uses to mark the answer between a prefix and a suffix.
pub const SPAN_SEPARATOR: &str = "[...]";

/// How the final answer is pulled out of an assistant turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// The whole assistant turn is the answer.
    FullResponse,
    /// The task's own extraction function decides.
    TaskSpecific,
    /// The model names the answer span directly.
    Gen,
    /// The model bounds the answer with a prefix and suffix.
    PrefixSuffix,
}

impl ExtractionStrategy {
    /// Whether this strategy issues extraction calls and enforces the
    /// substring invariant.
    #[must_use]
    pub const fn is_extractive(self) -> bool {
        matches!(self, Self::Gen | Self::PrefixSuffix)
    }

    /// Name as used in task definitions.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FullResponse => "full_response",
            Self::TaskSpecific => "task_specific",
            Self::Gen => "gen",
            Self::PrefixSuffix => "prefix_suffix",
        }
    }
}

impl fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtractionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full_response" => Ok(Self::FullResponse),
            "task_specific" => Ok(Self::TaskSpecific),
            "gen" => Ok(Self::Gen),
            "prefix_suffix" => Ok(Self::PrefixSuffix),
            other => Err(format!(
                "unknown extraction strategy '{other}' (expected full_response, task_specific, gen or prefix_suffix)"
            )),
        }
    }
}

/// Resolves a `prefix_suffix` reply against the source text.
///
/// With exactly one [`SPAN_SEPARATOR`], the trimmed halves are located (the
/// prefix at its first occurrence, the suffix at its last) and the span from
/// the prefix's start to the suffix's end is returned. Otherwise the reply
/// itself is the candidate.
///
/// The returned candidate still has to pass the substring check.
///
/// # Errors
///
/// Returns `RejectionReason::SpanNotLocated` when either half is missing
/// from `source`, or the suffix ends before the prefix starts.
pub fn locate_span<'a>(source: &'a str, reply: &'a str) -> Result<&'a str, RejectionReason> {
    if reply.matches(SPAN_SEPARATOR).count() != 1 {
        return Ok(reply);
    }
    let Some((prefix, suffix)) = reply.split_once(SPAN_SEPARATOR) else {
        return Ok(reply);
    };
    let (prefix, suffix) = (prefix.trim(), suffix.trim());

    let not_located = || RejectionReason::SpanNotLocated {
        prefix: prefix.to_string(),
        suffix: suffix.to_string(),
    };

    let start = source.find(prefix).ok_or_else(not_located)?;
    let end = source.rfind(suffix).ok_or_else(not_located)? + suffix.len();
    if end < start {
        return Err(not_located());
    }
    Ok(&source[start..end])
}

/// Applies the extractive invariant: non-empty and verbatim in `source`.
///
/// # Errors
///
/// Returns `EmptyCandidate` or `NotExtractive`.
pub fn check_extractive(source: &str, candidate: &str) -> Result<(), RejectionReason> {
    if candidate.is_empty() {
        return Err(RejectionReason::EmptyCandidate);
    }
    if !source.contains(candidate) {
        return Err(RejectionReason::NotExtractive(candidate.to_string()));
    }
    Ok(())
}
