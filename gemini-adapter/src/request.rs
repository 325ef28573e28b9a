//! Request-body builder for Gemini `generateContent` calls.
//!
//! ## Body Layout
//!
//! ```json
//! {
//!   "contents": [{"role": "user", "parts": [{"text": "..."}]}],
//!   "systemInstruction": {"parts": [{"text": "..."}]},
//!   "generationConfig": {
//!     "temperature": 1.0,
//!     "maxOutputTokens": 1000,
//!     "responseMimeType": "application/json",
//!     "responseSchema": {}
//!   }
//! }
//! ```
//!
//! - Assistant turns are sent with role `model`.
//! - System messages never appear in `contents`. The explicit
//!   `system_instruction` wins; otherwise the first system message is used.
//! - `responseMimeType` is only set for JSON output, `responseSchema` only when
//!   a schema was supplied.

use crate::types::{GenerateConfig, Message, Role};
use serde_json::{json, Map, Value};

/// Builds the `generateContent` endpoint URL for a model.
#[must_use]
pub fn endpoint_url(base_url: &str, model: &str) -> String {
    format!(
        "{}/v1beta/models/{model}:generateContent",
        base_url.trim_end_matches('/')
    )
}

/// Builds the JSON body for a `generateContent` call.
#[must_use]
pub fn build_body(messages: &[Message], config: &GenerateConfig) -> Value {
    let contents: Vec<Value> = messages
        .iter()
        .filter(|msg| msg.role != Role::System)
        .map(|msg| {
            json!({
                "role": msg.role.wire_name(),
                "parts": [{"text": msg.content}],
            })
        })
        .collect();

    let system_instruction = config.system_instruction.clone().or_else(|| {
        messages
            .iter()
            .find(|msg| msg.role == Role::System)
            .map(|msg| msg.content.clone())
    });

    let mut generation_config = Map::new();
    generation_config.insert("temperature".to_string(), json!(config.temperature));
    if let Some(max_tokens) = config.max_output_tokens {
        generation_config.insert("maxOutputTokens".to_string(), json!(max_tokens));
    }
    if config.json_output {
        generation_config.insert(
            "responseMimeType".to_string(),
            Value::String("application/json".to_string()),
        );
    }
    if let Some(schema) = &config.response_schema {
        generation_config.insert("responseSchema".to_string(), schema.clone());
    }

    let mut body = Map::new();
    body.insert("contents".to_string(), Value::Array(contents));
    if let Some(instruction) = system_instruction {
        body.insert(
            "systemInstruction".to_string(),
            json!({"parts": [{"text": instruction}]}),
        );
    }
    body.insert(
        "generationConfig".to_string(),
        Value::Object(generation_config),
    );

    Value::Object(body)
}
