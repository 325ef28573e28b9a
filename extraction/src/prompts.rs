//! Extraction prompts, the answer payload schema and rejection feedback.

use crate::error::RejectionReason;
use crate::strategy::ExtractionStrategy;
use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Prompt asking the model to copy the answer span out of a response.
pub const GEN_PROMPT: &str = "\
You are given a response produced by an assistant, and a description of what a correct answer looks like.

Your job is to find the final answer inside the response and copy it out.

Rules:
- Copy the answer exactly as it appears in the response, character for character.
- Do not rephrase, translate, correct or complete it.
- If the response contains several candidate answers, copy the one the assistant presents as final.

Answer description:
[[ANSWER_DESCRIPTION]]

Response:
<<<
[[ASSISTANT_RESPONSE]]
>>>

Reply with JSON of the form {\"answer\": \"<answer copied from the response>\"}.";

/// Prompt asking the model to bound the answer with a prefix and a suffix.
pub const PREFIX_SUFFIX_PROMPT: &str = "\
You are given a response produced by an assistant, and a description of what a correct answer looks like.

Your job is to point at the final answer inside the response by giving the few words right before it and the few words right after it, with the answer itself replaced by [...].

Rules:
- Use [...] exactly once.
- The text before and after [...] must appear verbatim in the response.
- If the answer starts at the beginning of the response, leave the part before [...] empty; likewise for the end.

Answer description:
[[ANSWER_DESCRIPTION]]

Response:
<<<
[[ASSISTANT_RESPONSE]]
>>>

Reply with JSON of the form {\"answer\": \"<words before> [...] <words after>\"}.";

/// Structured payload returned by every extraction call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AnswerPayload {
    /// The answer span, or a prefix/suffix pair joined by `[...]`.
    pub answer: String,
}

/// Full JSON schema of [`AnswerPayload`], used for validation.
#[must_use]
pub fn answer_schema() -> Value {
    json!(schema_for!(AnswerPayload))
}

/// The subset of [`answer_schema`] the generation API accepts as a response schema.
#[must_use]
pub fn response_schema() -> Value {
    let schema = answer_schema();
    let mut wire = serde_json::Map::new();
    for key in ["type", "properties", "required"] {
        if let Some(value) = schema.get(key) {
            wire.insert(key.to_string(), value.clone());
        }
    }
    Value::Object(wire)
}

/// Prompt template for an extractive strategy; `None` for the others.
#[must_use]
pub const fn template_for(strategy: ExtractionStrategy) -> Option<&'static str> {
    match strategy {
        ExtractionStrategy::Gen => Some(GEN_PROMPT),
        ExtractionStrategy::PrefixSuffix => Some(PREFIX_SUFFIX_PROMPT),
        ExtractionStrategy::FullResponse | ExtractionStrategy::TaskSpecific => None,
    }
}

/// Collects every validation error of `instance` against `schema`, with instance paths.
#[must_use]
pub fn collect_validation_errors(schema: &Value, instance: &Value) -> Vec<String> {
    match jsonschema::Validator::new(schema) {
        Ok(validator) => validator
            .iter_errors(instance)
            .map(|error| format!("At path '{}': {}", error.instance_path, error))
            .collect(),
        Err(e) => vec![format!("Schema compilation error: {e}")],
    }
}

/// Feedback appended to the next extraction prompt after a rejection.
///
/// ```
/// use shardeval_extraction::{RejectionReason, build_rejection_feedback};
///
/// let reason = RejectionReason::NotExtractive("b".to_string());
/// let feedback = build_rejection_feedback(&reason, "{\"answer\":\"b\"}", 1, 3);
/// assert!(feedback.starts_with("Attempt 1/3"));
/// ```
#[must_use]
pub fn build_rejection_feedback(
    reason: &RejectionReason,
    raw_reply: &str,
    attempt: usize,
    max_attempts: usize,
) -> String {
    let mut feedback = format!("Attempt {attempt}/{max_attempts} was rejected: {reason}.\n");

    let hint = match reason {
        RejectionReason::NotExtractive(_) | RejectionReason::EmptyCandidate => {
            "Copy the answer character for character from the response; it must appear in it verbatim."
        }
        RejectionReason::SpanNotLocated { .. } => {
            "The words around [...] must be copied exactly from the response, in order."
        }
        RejectionReason::MalformedPayload(_) => {
            "Reply with a JSON object holding a single string field named \"answer\"."
        }
        RejectionReason::Generation(_) => "Please answer again.",
    };
    feedback.push_str(hint);

    if !matches!(reason, RejectionReason::Generation(_)) {
        feedback.push_str("\n\nYour previous reply:\n");
        feedback.push_str(&truncate(raw_reply, 500));
    }
    feedback
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
