#![deny(missing_docs)]
//! Resilient model invocation for sharded-instruction benchmark runs.
//!
//! A [`GenerationClient`] owns a [`CredentialPool`] and a
//! [`GenerationBackend`], and turns one logical generate request into as many
//! physical attempts as the [`ErrorClassifier`] allows: rate limits wait or
//! rotate credentials, overloaded servers and flaky connections back off, and
//! everything else surfaces immediately with the original failure.
//!
//! ```no_run
//! # use shardeval_client::prelude::*;
//! # use std::sync::Arc;
//! # async fn example() -> Result<(), ClientError> {
//! let pool = Arc::new(CredentialPool::from_env()?);
//! let api = GeminiApi::new(GeminiConfig::default())?;
//! let client = GenerationClient::new(Arc::new(api), pool);
//!
//! let request = GenerationRequest::new("gemini-2.5-flash", vec![Message::user("Hello!")]);
//! let text = client.generate_text(&request).await?;
//! # Ok(())
//! # }
//! ```

/// Backend implementations.
pub mod adapters;
/// The backend trait seam and its failure type.
pub mod backend;
/// Failure classification and backoff computation.
pub mod classify;
/// Retry loop configuration.
pub mod config;
/// Credential pool and redacted credentials.
pub mod credentials;
/// Error types for the client.
pub mod errors;
/// Generate requests and the retrying client.
pub mod generation;
/// Prompt placeholder substitution.
pub mod template;
/// Scripted backend for tests.
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use adapters::gemini::failure_from_gemini;
pub use backend::{BackendFailure, GenerationBackend};
pub use classify::{
    AttemptContext, ErrorClassifier, FailureClassification, FailureKind, RecoveryAction,
};
pub use config::ClientConfig;
pub use credentials::{Credential, CredentialPool};
pub use errors::ClientError;
pub use generation::{GenerationClient, GenerationOutput, GenerationRequest};
pub use shardeval_gemini::{GeminiApi, GeminiConfig, Message, Role};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        ClientConfig, ClientError, CredentialPool, GeminiApi, GeminiConfig, GenerationBackend,
        GenerationClient, GenerationOutput, GenerationRequest, Message, Role,
    };
}
