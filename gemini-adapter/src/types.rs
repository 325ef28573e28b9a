//! Shared data types for Gemini adapter configuration, messages and results.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default Gemini REST endpoint host.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Author of a transcript message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System preamble; sent as `systemInstruction`, never as content.
    System,
    /// End-user turn.
    User,
    /// Model turn (`model` on the wire).
    Assistant,
}

impl Role {
    /// Role name as used in Gemini `contents`.
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "model",
        }
    }
}

/// One message of a transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Who produced the message.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl Message {
    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Per-request generation options.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateConfig {
    /// Sampling temperature.
    pub temperature: f32,
    /// Explicit system instruction; overrides any system message in the transcript.
    pub system_instruction: Option<String>,
    /// Ask for `application/json` output.
    pub json_output: bool,
    /// Optional response schema (only meaningful with `json_output`).
    pub response_schema: Option<serde_json::Value>,
    /// Output token ceiling.
    pub max_output_tokens: Option<u32>,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            system_instruction: None,
            json_output: false,
            response_schema: None,
            max_output_tokens: None,
        }
    }
}

/// Connection settings shared by every request made through one [`crate::GeminiApi`].
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// Endpoint host, without trailing slash.
    pub base_url: String,
    /// Whole-request HTTP timeout.
    ///
    /// Default: 300 seconds
    pub timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(300),
        }
    }
}

impl GeminiConfig {
    /// Overrides the endpoint host (used to point at a mock server).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Overrides the HTTP timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Outcome of a successful `generateContent` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Concatenated text of the first candidate.
    pub text: String,
    /// Finish reason reported for the first candidate.
    pub finish_reason: Option<String>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Classes of transport-level failure, as observed from the HTTP client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NetworkFault {
    /// Could not establish a connection.
    Connect,
    /// Request or connect timed out.
    Timeout,
    /// Connection dropped mid-request or the body could not be read.
    Disconnected,
    /// Any other transport failure.
    Other,
}
