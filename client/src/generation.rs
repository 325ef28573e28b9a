//! The resilient generate call: one logical request, many physical attempts.

use crate::backend::{BackendFailure, GenerationBackend};
use crate::classify::{AttemptContext, ErrorClassifier, RecoveryAction};
use crate::config::ClientConfig;
use crate::credentials::CredentialPool;
use crate::errors::ClientError;
use serde_json::Value;
use shardeval_gemini::{GenerateConfig, Message};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// One logical generate request. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Ordered conversation sent to the model.
    pub transcript: Vec<Message>,
    /// Model identifier, e.g. `gemini-2.5-flash`.
    pub model_id: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Output token ceiling.
    pub max_output_tokens: Option<u32>,
    /// Decode the reply as JSON.
    pub want_structured_output: bool,
    /// Response schema sent alongside a structured request.
    pub output_schema: Option<Value>,
    /// Explicit system instruction.
    pub system_instruction: Option<String>,
}

impl GenerationRequest {
    /// A plain-text request at temperature 1.0.
    pub fn new(model_id: impl Into<String>, transcript: Vec<Message>) -> Self {
        Self {
            transcript,
            model_id: model_id.into(),
            temperature: 1.0,
            max_output_tokens: None,
            want_structured_output: false,
            output_schema: None,
            system_instruction: None,
        }
    }

    /// Set the sampling temperature.
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the output token ceiling.
    #[must_use]
    pub const fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    /// Request JSON output, optionally constrained by a schema.
    #[must_use]
    pub fn structured(mut self, schema: Option<Value>) -> Self {
        self.want_structured_output = true;
        self.output_schema = schema;
        self
    }

    /// Set the system instruction.
    #[must_use]
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    /// Wire-level options for the Gemini adapter.
    #[must_use]
    pub fn generate_config(&self) -> GenerateConfig {
        GenerateConfig {
            temperature: self.temperature,
            system_instruction: self.system_instruction.clone(),
            json_output: self.want_structured_output,
            response_schema: self.output_schema.clone(),
            max_output_tokens: self.max_output_tokens,
        }
    }

    /// Content of the last user message, if any.
    #[must_use]
    pub fn last_user_prompt(&self) -> Option<&str> {
        self.transcript
            .iter()
            .rev()
            .find(|m| m.role == shardeval_gemini::Role::User)
            .map(|m| m.content.as_str())
    }
}

/// What a successful generate call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutput {
    /// Raw model text.
    Text(String),
    /// Decoded structured payload.
    Structured(Value),
}

impl GenerationOutput {
    /// The text, if this is a text output.
    #[must_use]
    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Text(text) => Some(text),
            Self::Structured(_) => None,
        }
    }

    /// The payload, if this is a structured output.
    #[must_use]
    pub fn into_structured(self) -> Option<Value> {
        match self {
            Self::Structured(value) => Some(value),
            Self::Text(_) => None,
        }
    }
}

/// Issues generate requests against a backend, absorbing retryable failures.
///
/// Constructed once per run and shared (behind an `Arc`) by every exchange.
/// The only mutable state is the credential pool's active index.
pub struct GenerationClient {
    backend: Arc<dyn GenerationBackend>,
    pool: Arc<CredentialPool>,
    classifier: ErrorClassifier,
    config: ClientConfig,
}

impl std::fmt::Debug for GenerationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationClient")
            .field("pool", &self.pool)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GenerationClient {
    /// Creates a client with the default configuration.
    pub fn new(backend: Arc<dyn GenerationBackend>, pool: Arc<CredentialPool>) -> Self {
        let config = ClientConfig::default();
        Self {
            backend,
            pool,
            classifier: config.classifier(),
            config,
        }
    }

    /// Creates a client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if the configuration is invalid.
    pub fn with_config(
        backend: Arc<dyn GenerationBackend>,
        pool: Arc<CredentialPool>,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        Ok(Self {
            backend,
            pool,
            classifier: config.classifier(),
            config,
        })
    }

    /// The shared credential pool.
    #[must_use]
    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    /// The configuration in use.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Runs `request` until it succeeds, gives up, or the attempt budget runs out.
    ///
    /// Returns [`GenerationOutput::Structured`] when structured output was
    /// requested, otherwise [`GenerationOutput::Text`].
    ///
    /// # Errors
    ///
    /// - `ClientError::NonRetryable` with the original failure when the
    ///   classifier gives up (including a daily quota on a lone credential).
    /// - `ClientError::GenerationExhausted` once `max_attempts` retryable
    ///   failures have occurred, or the next wait would pass `max_elapsed`.
    /// - `ClientError::StructuredDecode` when the reply is not valid JSON.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput, ClientError> {
        let text = self.generate_raw(request).await?;

        if !request.want_structured_output {
            return Ok(GenerationOutput::Text(text));
        }

        decode_structured(&text).map(GenerationOutput::Structured)
    }

    /// Convenience wrapper returning plain text. Ignores `want_structured_output`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::generate`], minus decoding.
    pub async fn generate_text(&self, request: &GenerationRequest) -> Result<String, ClientError> {
        self.generate_raw(request).await
    }

    /// Convenience wrapper that always decodes the reply as JSON.
    ///
    /// # Errors
    ///
    /// Same as [`Self::generate`].
    pub async fn generate_json(&self, request: &GenerationRequest) -> Result<Value, ClientError> {
        let text = self.generate_raw(request).await?;
        decode_structured(&text)
    }

    async fn generate_raw(&self, request: &GenerationRequest) -> Result<String, ClientError> {
        let max_attempts = self.config.max_attempts;
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            let (index, credential) = self.pool.current_with_index();

            let failure = match self.backend.generate_once(&credential, request).await {
                Ok(text) => {
                    tracing::debug!(
                        event = "generation_succeeded",
                        model = %request.model_id,
                        attempt = attempt + 1,
                        chars = text.len(),
                        "generation_succeeded"
                    );
                    return Ok(text);
                }
                Err(failure) => failure,
            };

            attempt += 1;
            let classification = self.classifier.classify(
                &failure,
                AttemptContext {
                    attempt,
                    max_attempts,
                    pool_size: self.pool.len(),
                },
            );

            match classification.action {
                RecoveryAction::GiveUp => {
                    return Err(ClientError::NonRetryable {
                        kind: classification.kind,
                        attempt,
                        failure,
                    });
                }
                _ if attempt >= max_attempts => {
                    return Err(exhausted(attempt, failure));
                }
                RecoveryAction::RotateAndRetry => {
                    self.pool.rotate_from(index);
                }
                RecoveryAction::WaitAndRetry(wait) => {
                    if self.exceeds_deadline(started, wait) {
                        tracing::warn!(
                            event = "generation_deadline",
                            attempt,
                            wait_secs = wait.as_secs_f64(),
                            "generation_deadline: next wait passes max_elapsed"
                        );
                        return Err(exhausted(attempt, failure));
                    }
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    fn exceeds_deadline(&self, started: Instant, wait: Duration) -> bool {
        self.config
            .max_elapsed
            .is_some_and(|limit| started.elapsed().saturating_add(wait) > limit)
    }
}

fn exhausted(attempts: u32, last_failure: BackendFailure) -> ClientError {
    tracing::error!(
        event = "generation_exhausted",
        attempts,
        last_failure = %last_failure,
        "generation_exhausted"
    );
    ClientError::GenerationExhausted {
        attempts,
        last_failure,
    }
}

/// Decodes model text as JSON, tolerating a surrounding Markdown code fence.
fn decode_structured(text: &str) -> Result<Value, ClientError> {
    let trimmed = strip_code_fence(text.trim());
    serde_json::from_str(trimmed).map_err(|e| ClientError::StructuredDecode {
        message: e.to_string(),
        raw_text: text.to_string(),
    })
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = rest.strip_prefix("json").unwrap_or(rest);
    body.strip_suffix("```").unwrap_or(body).trim()
}
