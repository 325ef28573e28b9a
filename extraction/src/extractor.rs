//! Bounded, extractive answer extraction over a finished assistant turn.

use serde_json::Value;
use shardeval_client::template::substitute_text;
use shardeval_client::{GenerationClient, GenerationRequest, Message, Role};
use std::sync::Arc;
use tokio::time::Instant;

use crate::config::ExtractionConfig;
use crate::error::RejectionReason;
use crate::metrics::{ExtractionMetrics, estimate_tokens};
use crate::prompts::{
    answer_schema, build_rejection_feedback, collect_validation_errors, response_schema,
    template_for,
};
use crate::strategy::{ExtractionStrategy, check_extractive, locate_span};

/// What the extractor needs to know about a task.
pub trait AnswerSpec: Send + Sync {
    /// Strategy used for this task's answers.
    fn extraction_strategy(&self) -> ExtractionStrategy;

    /// Plain-language description of a correct answer's shape.
    fn answer_description(&self) -> &str;

    /// Task-owned extraction, used by [`ExtractionStrategy::TaskSpecific`].
    ///
    /// Defaults to the whole response.
    fn extract_task_answer(&self, response: &str) -> String {
        response.to_string()
    }
}

/// One extraction call and its verdict. Logged, then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionAttempt {
    /// 1-based attempt number.
    pub attempt_number: usize,
    /// Strategy in effect.
    pub strategy: ExtractionStrategy,
    /// Raw reply (the decoded payload re-serialized), empty if the call failed.
    pub raw_model_output: String,
    /// Candidate derived from the reply, if one could be derived.
    pub candidate_answer: Option<String>,
    /// Whether the candidate was accepted.
    pub accepted: bool,
    /// Why the attempt was rejected.
    pub rejection: Option<RejectionReason>,
}

/// Outcome of an extraction call. Exhaustion is an empty, unaccepted answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    /// Extracted answer; empty after exhaustion.
    pub answer: String,
    /// Extraction calls issued (0 for non-extractive strategies).
    pub attempts_used: usize,
    /// False only when every attempt was rejected.
    pub accepted: bool,
    /// Timing and token estimates.
    pub metrics: ExtractionMetrics,
}

impl ExtractionResult {
    fn direct(answer: String) -> Self {
        Self {
            answer,
            attempts_used: 0,
            accepted: true,
            metrics: ExtractionMetrics::default(),
        }
    }

    /// Whether this is the empty-answer sentinel.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        !self.accepted
    }
}

/// Pulls a verified answer out of an assistant response.
///
/// Never fails: every problem becomes a rejected attempt, and running out of
/// attempts yields an empty answer the caller scores as incorrect.
#[derive(Debug, Clone)]
pub struct AnswerExtractor {
    client: Arc<GenerationClient>,
    config: ExtractionConfig,
    schema: Value,
    wire_schema: Value,
}

impl AnswerExtractor {
    /// Creates an extractor with the default configuration.
    #[must_use]
    pub fn new(client: Arc<GenerationClient>) -> Self {
        Self::with_config(client, ExtractionConfig::default())
    }

    /// Creates an extractor with the given configuration.
    #[must_use]
    pub fn with_config(client: Arc<GenerationClient>, config: ExtractionConfig) -> Self {
        Self {
            client,
            config,
            schema: answer_schema(),
            wire_schema: response_schema(),
        }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extracts from the last assistant message of `transcript`.
    ///
    /// A transcript without an assistant message yields an empty,
    /// unaccepted result without issuing any call.
    pub async fn extract<S>(&self, task: &S, transcript: &[Message]) -> ExtractionResult
    where
        S: AnswerSpec + ?Sized,
    {
        let Some(response) = transcript
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
        else {
            tracing::warn!(
                event = "extraction_skipped",
                "extraction_skipped: transcript has no assistant turn"
            );
            return ExtractionResult {
                answer: String::new(),
                attempts_used: 0,
                accepted: false,
                metrics: ExtractionMetrics::default(),
            };
        };
        self.extract_from_response(task, &response.content).await
    }

    /// Extracts from a single assistant response.
    pub async fn extract_from_response<S>(&self, task: &S, response: &str) -> ExtractionResult
    where
        S: AnswerSpec + ?Sized,
    {
        let strategy = task.extraction_strategy();
        let Some(template) = template_for(strategy) else {
            return match strategy {
                ExtractionStrategy::TaskSpecific => {
                    ExtractionResult::direct(task.extract_task_answer(response))
                }
                _ => ExtractionResult::direct(response.to_string()),
            };
        };

        let base_prompt = substitute_text(
            template,
            &[
                ("ASSISTANT_RESPONSE", response),
                ("ANSWER_DESCRIPTION", task.answer_description()),
            ],
        );

        let max_attempts = self.config.max_attempts;
        let start = Instant::now();
        let mut prompt = base_prompt.clone();
        let mut input_tokens = 0_usize;
        let mut output_tokens = 0_usize;

        for attempt_number in 1..=max_attempts {
            input_tokens += estimate_tokens(&prompt);
            let attempt = self
                .run_attempt(strategy, response, &prompt, attempt_number)
                .await;
            output_tokens += estimate_tokens(&attempt.raw_model_output);

            if attempt.accepted {
                let answer = attempt.candidate_answer.unwrap_or_default();
                tracing::debug!(
                    event = "extraction_accepted",
                    attempt = attempt_number,
                    strategy = %strategy,
                    "extraction_accepted"
                );
                return ExtractionResult {
                    answer,
                    attempts_used: attempt_number,
                    accepted: true,
                    metrics: ExtractionMetrics {
                        total_attempts: attempt_number,
                        wall_time: start.elapsed(),
                        estimated_input_tokens: input_tokens,
                        estimated_output_tokens: output_tokens,
                    },
                };
            }

            if let Some(reason) = &attempt.rejection {
                tracing::warn!(
                    event = "extraction_rejected",
                    attempt = attempt_number,
                    max_attempts,
                    strategy = %strategy,
                    reason = %reason,
                    "extraction_rejected"
                );
                if self.config.include_feedback && attempt_number < max_attempts {
                    let feedback = build_rejection_feedback(
                        reason,
                        &attempt.raw_model_output,
                        attempt_number,
                        max_attempts,
                    );
                    prompt = format!("{base_prompt}\n\n{feedback}");
                }
            }
        }

        tracing::warn!(
            event = "extraction_exhausted",
            attempts = max_attempts,
            strategy = %strategy,
            "extraction_exhausted: returning empty answer"
        );
        ExtractionResult {
            answer: String::new(),
            attempts_used: max_attempts,
            accepted: false,
            metrics: ExtractionMetrics {
                total_attempts: max_attempts,
                wall_time: start.elapsed(),
                estimated_input_tokens: input_tokens,
                estimated_output_tokens: output_tokens,
            },
        }
    }

    async fn run_attempt(
        &self,
        strategy: ExtractionStrategy,
        response: &str,
        prompt: &str,
        attempt_number: usize,
    ) -> ExtractionAttempt {
        let mut attempt = ExtractionAttempt {
            attempt_number,
            strategy,
            raw_model_output: String::new(),
            candidate_answer: None,
            accepted: false,
            rejection: None,
        };

        let request = GenerationRequest::new(self.config.model.clone(), vec![Message::user(prompt)])
            .with_temperature(self.config.temperature)
            .structured(Some(self.wire_schema.clone()));

        let payload = match self.client.generate_json(&request).await {
            Ok(payload) => payload,
            Err(e) => {
                attempt.rejection = Some(RejectionReason::Generation(e.to_string()));
                return attempt;
            }
        };
        attempt.raw_model_output = payload.to_string();

        let errors = collect_validation_errors(&self.schema, &payload);
        let Some(reply) = payload.get("answer").and_then(Value::as_str).filter(|_| errors.is_empty()) else {
            attempt.rejection = Some(RejectionReason::MalformedPayload(errors));
            return attempt;
        };

        let candidate = match strategy {
            ExtractionStrategy::PrefixSuffix => match locate_span(response, reply) {
                Ok(span) => span,
                Err(reason) => {
                    attempt.rejection = Some(reason);
                    return attempt;
                }
            },
            _ => reply,
        };
        attempt.candidate_answer = Some(candidate.to_string());

        match check_extractive(response, candidate) {
            Ok(()) => attempt.accepted = true,
            Err(reason) => attempt.rejection = Some(reason),
        }
        tracing::debug!(event = "extraction_attempt", attempt = ?attempt, "extraction_attempt");
        attempt
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use shardeval_client::testing::ScriptedBackend;
    use shardeval_client::{BackendFailure, ClientConfig, CredentialPool};

    const SOURCE: &str = "The answer is B. Reason: blah";

    struct Spec(ExtractionStrategy);

    impl AnswerSpec for Spec {
        fn extraction_strategy(&self) -> ExtractionStrategy {
            self.0
        }

        fn answer_description(&self) -> &str {
            "A single letter (A, B, C, or D)."
        }

        fn extract_task_answer(&self, response: &str) -> String {
            response.split_whitespace().last().unwrap_or_default().to_string()
        }
    }

    fn extractor(backend: &Arc<ScriptedBackend>) -> AnswerExtractor {
        let pool = Arc::new(CredentialPool::new(["k1"]).unwrap());
        let client = GenerationClient::with_config(
            backend.clone(),
            pool,
            ClientConfig::default().with_max_attempts(1),
        )
        .unwrap();
        AnswerExtractor::new(Arc::new(client))
    }

    #[tokio::test(start_paused = true)]
    async fn test_gen_rejects_non_substring_then_accepts() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .then_ok(r#"{"answer": "b"}"#)
                .then_ok(r#"{"answer": "B."}"#),
        );
        let result = extractor(&backend)
            .extract_from_response(&Spec(ExtractionStrategy::Gen), SOURCE)
            .await;

        assert_eq!(result.answer, "B.");
        assert_eq!(result.attempts_used, 2);
        assert!(result.accepted);

        let calls = backend.calls();
        assert!(calls.iter().all(|c| c.structured && c.temperature.abs() < f32::EPSILON));
        assert!(calls[0].prompt.contains(SOURCE));
        assert!(calls[0].prompt.contains("A single letter"));
        assert!(calls[1].prompt.contains("Attempt 1/3 was rejected"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prefix_suffix_scenario() {
        let backend = Arc::new(ScriptedBackend::new().then_ok(r#"{"answer": "The answer is [...] Reason:"}"#));
        let result = extractor(&backend)
            .extract_from_response(&Spec(ExtractionStrategy::PrefixSuffix), SOURCE)
            .await;

        assert_eq!(result.answer, "The answer is B. Reason:");
        assert_eq!(result.attempts_used, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_empty_sentinel() {
        let backend = Arc::new(ScriptedBackend::new().with_responder(|_| Ok(r#"{"answer": "C."}"#.to_string())));
        let result = extractor(&backend)
            .extract_from_response(&Spec(ExtractionStrategy::Gen), SOURCE)
            .await;

        assert_eq!(result.answer, "");
        assert!(result.is_exhausted());
        assert_eq!(result.attempts_used, 3);
        assert_eq!(result.metrics.total_attempts, 3);
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_failure_consumes_attempt_without_escaping() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .then_err(BackendFailure::status(400, "API key not valid"))
                .then_ok("not json at all")
                .then_ok(r#"{"answer": "B."}"#),
        );
        let result = extractor(&backend)
            .extract_from_response(&Spec(ExtractionStrategy::Gen), SOURCE)
            .await;

        assert_eq!(result.answer, "B.");
        assert_eq!(result.attempts_used, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_payload_is_rejected() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .then_ok(r#"{"verdict": "B."}"#)
                .then_ok(r#"{"answer": "B."}"#),
        );
        let result = extractor(&backend)
            .extract_from_response(&Spec(ExtractionStrategy::Gen), SOURCE)
            .await;

        assert_eq!(result.attempts_used, 2);
        assert!(backend.calls()[1].prompt.contains("single string field"));
    }

    #[tokio::test]
    async fn test_non_extractive_strategies_issue_no_calls() {
        let backend = Arc::new(ScriptedBackend::new());
        let extractor = extractor(&backend);

        let full = extractor
            .extract_from_response(&Spec(ExtractionStrategy::FullResponse), SOURCE)
            .await;
        assert_eq!(full.answer, SOURCE);
        assert_eq!(full.attempts_used, 0);

        let specific = extractor
            .extract_from_response(&Spec(ExtractionStrategy::TaskSpecific), SOURCE)
            .await;
        assert_eq!(specific.answer, "blah");
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_transcript_without_assistant_turn() {
        let backend = Arc::new(ScriptedBackend::new());
        let result = extractor(&backend)
            .extract(&Spec(ExtractionStrategy::Gen), &[Message::user("question")])
            .await;

        assert!(result.is_exhausted());
        assert_eq!(result.attempts_used, 0);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extract_uses_last_assistant_turn() {
        let backend = Arc::new(ScriptedBackend::new().then_ok(r#"{"answer": "B."}"#));
        let transcript = [
            Message::user("question"),
            Message::assistant("Maybe A."),
            Message::user("again"),
            Message::assistant(SOURCE),
        ];
        let result = extractor(&backend)
            .extract(&Spec(ExtractionStrategy::Gen), &transcript)
            .await;

        assert_eq!(result.answer, "B.");
    }
}
