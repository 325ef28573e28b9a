//! Configuration for the answer-extraction retry loop.

/// Default model used to locate answers.
pub const DEFAULT_EXTRACTION_MODEL: &str = "gemini-2.5-flash";

/// Configuration for extraction retry behavior.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Maximum number of extraction calls before returning an empty answer (default: 3).
    pub max_attempts: usize,
    /// Model asked to locate the answer (default: `gemini-2.5-flash`).
    pub model: String,
    /// Sampling temperature for extraction calls (default: 0.0).
    pub temperature: f32,
    /// Whether to append rejection feedback to the next attempt's prompt (default: true).
    pub include_feedback: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            model: DEFAULT_EXTRACTION_MODEL.to_string(),
            temperature: 0.0,
            include_feedback: true,
        }
    }
}

impl ExtractionConfig {
    /// Set the maximum number of attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, max: usize) -> Self {
        self.max_attempts = max;
        self
    }

    /// Set the extraction model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the sampling temperature.
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set whether rejected attempts feed back into the next prompt.
    #[must_use]
    pub const fn with_feedback(mut self, include: bool) -> Self {
        self.include_feedback = include;
        self
    }
}
