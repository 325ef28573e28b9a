//! One `generateContent` round trip: send, read, and map the outcome.

use crate::error::GeminiError;
use crate::request::{build_body, endpoint_url};
use crate::types::{GenerateConfig, Message, RunResult};
use serde::Deserialize;
use std::time::Instant;

/// Header carrying the API key on every request.
pub const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    status: Option<String>,
}

/// Executes one `generateContent` call with no retries.
///
/// # Errors
///
/// - `GeminiError::Network` when the request could not be sent or the body not read.
/// - `GeminiError::Status` for any non-2xx response.
/// - `GeminiError::InvalidResponse` / `GeminiError::EmptyResponse` for unusable 2xx bodies.
pub async fn run_generate(
    http: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    model: &str,
    messages: &[Message],
    config: &GenerateConfig,
) -> Result<RunResult, GeminiError> {
    let start_time = Instant::now();
    let url = endpoint_url(base_url, model);
    let body = build_body(messages, config);

    tracing::debug!(
        event = "generate_request",
        model,
        messages = messages.len(),
        json_output = config.json_output,
        "generate_request"
    );

    let response = http
        .post(&url)
        .header(API_KEY_HEADER, api_key)
        .json(&body)
        .send()
        .await
        .map_err(|e| GeminiError::from_transport(&e))?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| GeminiError::from_transport(&e))?;

    if !status.is_success() {
        return Err(parse_error_response(status.as_u16(), text));
    }

    let parsed: GenerateResponse =
        serde_json::from_str(&text).map_err(|e| GeminiError::InvalidResponse(e.to_string()))?;

    let duration_ms = u64::try_from(start_time.elapsed().as_millis()).unwrap_or(u64::MAX);
    extract_text(parsed, duration_ms)
}

fn parse_error_response(status: u16, body: String) -> GeminiError {
    let (message, api_status) = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => (envelope.error.message, envelope.error.status),
        Err(_) => (body.clone(), None),
    };
    GeminiError::Status {
        status,
        api_status,
        message,
        body,
    }
}

fn extract_text(response: GenerateResponse, duration_ms: u64) -> Result<RunResult, GeminiError> {
    let block_reason = response
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason);

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(GeminiError::EmptyResponse(block_reason.map_or_else(
            || "no candidates returned".to_string(),
            |reason| format!("prompt blocked: {reason}"),
        )));
    };

    let parts: Vec<String> = candidate
        .content
        .map(|content| content.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|part| part.text)
        .collect();

    if parts.is_empty() {
        return Err(GeminiError::EmptyResponse(format!(
            "candidate had no text parts (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    Ok(RunResult {
        text: parts.concat(),
        finish_reason: candidate.finish_reason,
        duration_ms,
    })
}
