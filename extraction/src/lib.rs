#![deny(missing_docs)]
//! Extractive answer validation for benchmark transcripts.
//!
//! - [`AnswerExtractor`] - bounded retry loop that never fails
//! - [`ExtractionStrategy`] - how an answer is located
//! - [`RejectionReason`] - why a single attempt was discarded
//! - [`ExtractionMetrics`] - token and timing estimates
//! - [`ExtractionConfig`] - retry behavior configuration
//!
//! An answer from the `gen` or `prefix_suffix` strategies is accepted only
//! if it appears verbatim in the assistant response it was taken from.

pub mod config;
pub mod error;
pub mod extractor;
pub mod metrics;
pub mod prompts;
pub mod strategy;

pub use config::{DEFAULT_EXTRACTION_MODEL, ExtractionConfig};
pub use error::RejectionReason;
pub use extractor::{AnswerExtractor, AnswerSpec, ExtractionAttempt, ExtractionResult};
pub use metrics::{ExtractionMetrics, estimate_tokens};
pub use prompts::{AnswerPayload, answer_schema, build_rejection_feedback};
pub use strategy::{ExtractionStrategy, SPAN_SEPARATOR, check_extractive, locate_span};
