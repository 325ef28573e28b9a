//! [`GenerationBackend`] over the Gemini REST adapter.

use crate::backend::{BackendFailure, GenerationBackend};
use crate::credentials::Credential;
use crate::generation::GenerationRequest;
use async_trait::async_trait;
use shardeval_gemini::{GeminiApi, GeminiError};

#[async_trait]
impl GenerationBackend for GeminiApi {
    async fn generate_once(
        &self,
        credential: &Credential,
        request: &GenerationRequest,
    ) -> Result<String, BackendFailure> {
        let config = request.generate_config();
        let result = self
            .run(
                credential.expose(),
                &request.model_id,
                &request.transcript,
                &config,
            )
            .await
            .map_err(failure_from_gemini)?;

        tracing::debug!(
            event = "gemini_response",
            model = %request.model_id,
            duration_ms = result.duration_ms,
            finish_reason = result.finish_reason.as_deref().unwrap_or(""),
            "gemini_response"
        );
        Ok(result.text)
    }
}

/// Reduces a [`GeminiError`] to the fields the classifier inspects.
///
/// Error responses keep their raw body as the message so quota window names
/// and `retry in Ns` hints stay visible.
#[must_use]
pub fn failure_from_gemini(err: GeminiError) -> BackendFailure {
    match err {
        GeminiError::Status {
            status,
            api_status,
            body,
            ..
        } => {
            let failure = BackendFailure::status(status, body);
            match api_status {
                Some(code) => failure.with_code(code),
                None => failure,
            }
        }
        GeminiError::Network { fault, message } => BackendFailure::network(fault, message),
        other => BackendFailure::message(other.to_string()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::classify::{AttemptContext, ErrorClassifier, FailureKind};
    use shardeval_gemini::NetworkFault;

    fn classify(err: GeminiError) -> FailureKind {
        ErrorClassifier::default()
            .classify_with_jitter(
                &failure_from_gemini(err),
                AttemptContext {
                    attempt: 1,
                    max_attempts: 10,
                    pool_size: 2,
                },
                0.0,
            )
            .kind
    }

    #[test]
    fn test_status_keeps_body_and_code() {
        let failure = failure_from_gemini(GeminiError::Status {
            status: 429,
            api_status: Some("RESOURCE_EXHAUSTED".to_string()),
            message: "Quota exceeded".to_string(),
            body: r#"{"error":{"message":"Quota exceeded per day"}}"#.to_string(),
        });
        assert_eq!(failure.status, Some(429));
        assert_eq!(failure.code.as_deref(), Some("RESOURCE_EXHAUSTED"));
        assert!(failure.message.contains("per day"));
    }

    #[test]
    fn test_gemini_errors_classify_as_expected() {
        assert_eq!(
            classify(GeminiError::Network {
                fault: NetworkFault::Disconnected,
                message: "Connection error: connection closed".to_string(),
            }),
            FailureKind::NetworkTransient
        );
        assert_eq!(
            classify(GeminiError::Status {
                status: 503,
                api_status: Some("UNAVAILABLE".to_string()),
                message: "overloaded".to_string(),
                body: "{}".to_string(),
            }),
            FailureKind::ServerOverload
        );
        assert_eq!(
            classify(GeminiError::EmptyResponse("blocked: SAFETY".to_string())),
            FailureKind::NonRetryable
        );
    }
}
