//! Scripted backend for exercising the retry loop without a network.

use crate::backend::{BackendFailure, GenerationBackend};
use crate::credentials::Credential;
use crate::generation::GenerationRequest;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

type Responder = dyn Fn(&GenerationRequest) -> Result<String, BackendFailure> + Send + Sync;

/// One call observed by [`ScriptedBackend`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Credential the call was issued with.
    pub credential: Credential,
    /// Requested model.
    pub model: String,
    /// Content of the last user message.
    pub prompt: String,
    /// Whether structured output was requested.
    pub structured: bool,
    /// Requested temperature.
    pub temperature: f32,
    /// Requested token ceiling.
    pub max_output_tokens: Option<u32>,
}

/// Replays queued outcomes in order, then falls back to a responder.
///
/// With neither left, calls fail with a non-retryable message so a test
/// that under-scripts fails loudly instead of hanging in backoff.
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<String, BackendFailure>>>,
    responder: Option<Box<Responder>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedBackend {
    /// An empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful reply.
    #[must_use]
    pub fn then_ok(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()))
    }

    /// Queues a failure.
    #[must_use]
    pub fn then_err(self, failure: BackendFailure) -> Self {
        self.push(Err(failure))
    }

    /// Answers every call past the script with `responder`.
    #[must_use]
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&GenerationRequest) -> Result<String, BackendFailure> + Send + Sync + 'static,
    {
        self.responder = Some(Box::new(responder));
        self
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn push(self, outcome: Result<String, BackendFailure>) -> Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(outcome);
        self
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate_once(
        &self,
        credential: &Credential,
        request: &GenerationRequest,
    ) -> Result<String, BackendFailure> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                credential: credential.clone(),
                model: request.model_id.clone(),
                prompt: request.last_user_prompt().unwrap_or_default().to_string(),
                structured: request.want_structured_output,
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
            });

        let scripted = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        match (scripted, &self.responder) {
            (Some(outcome), _) => outcome,
            (None, Some(responder)) => responder(request),
            (None, None) => Err(BackendFailure::message("scripted backend exhausted")),
        }
    }
}
