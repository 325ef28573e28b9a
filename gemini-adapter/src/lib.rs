//! Rust adapter for the Gemini `generateContent` REST endpoint.
//!
//! This crate builds request bodies, sends them with a per-call API key, and
//! maps error responses and transport failures onto [`GeminiError`]. It never
//! retries; retry policy belongs to the caller.

#![warn(clippy::pedantic)]

/// Discovery of API keys from the process environment.
pub mod discovery;
/// Error types returned by adapter operations.
pub mod error;
/// Request-body and endpoint construction.
pub mod request;
/// HTTP execution and response parsing.
pub mod transport;
/// Core data types shared across the adapter.
pub mod types;

pub use discovery::{discover_api_keys, parse_api_keys, API_KEYS_ENV_VAR};
pub use error::GeminiError;
pub use transport::run_generate;
pub use types::*;

/// HTTP handle for the Gemini REST API.
///
/// Cheap to clone; the underlying connection pool is shared. The API key is
/// supplied per call so one handle can serve a rotating set of credentials.
#[derive(Clone, Debug)]
pub struct GeminiApi {
    http: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiApi {
    /// Builds a handle with the given connection settings.
    ///
    /// # Errors
    /// Returns `GeminiError::InvalidConfig` if the HTTP client cannot be built.
    pub fn new(config: GeminiConfig) -> Result<Self, GeminiError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("shardeval-gemini/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GeminiError::InvalidConfig(e.to_string()))?;
        Ok(Self { http, config })
    }

    /// Connection settings in use.
    #[must_use]
    pub const fn config(&self) -> &GeminiConfig {
        &self.config
    }

    /// Runs a single `generateContent` call. No retries.
    ///
    /// # Errors
    /// Returns `GeminiError::Status` for error responses, `GeminiError::Network`
    /// for transport failures and `GeminiError::EmptyResponse` when no text came back.
    pub async fn run(
        &self,
        api_key: &str,
        model: &str,
        messages: &[Message],
        config: &GenerateConfig,
    ) -> Result<RunResult, GeminiError> {
        run_generate(
            &self.http,
            &self.config.base_url,
            api_key,
            model,
            messages,
            config,
        )
        .await
    }
}
