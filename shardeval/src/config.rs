//! Run configuration for conversation simulation.

use crate::errors::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default assistant and system model.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Model-name fragments that mark a reasoning model.
pub const DEFAULT_REASONING_MARKERS: &[&str] = &["o1", "o3", "deepseek-r1", "gemini-2.5"];

/// How the instruction is presented to the assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PromptMode {
    /// The fully specified instruction.
    #[default]
    Full,
    /// All shards in shard-id order, after the system preamble.
    Concat,
    /// First shard fixed, the rest in random order.
    ShuffleConcat,
}

impl PromptMode {
    /// Resolves the two concat flags.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when both flags are set.
    pub fn from_flags(concat: bool, shuffle_concat: bool) -> Result<Self, Error> {
        match (concat, shuffle_concat) {
            (true, true) => Err(Error::Config(
                "cannot run both concat and shuffle-concat in one run".to_string(),
            )),
            (true, false) => Ok(Self::Concat),
            (false, true) => Ok(Self::ShuffleConcat),
            (false, false) => Ok(Self::Full),
        }
    }

    /// Name used in conversation types.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Concat => "concat",
            Self::ShuffleConcat => "shuffle-concat",
        }
    }

    /// Whether shards are concatenated rather than a full prompt used.
    #[must_use]
    pub const fn is_sharded(self) -> bool {
        !matches!(self, Self::Full)
    }
}

impl fmt::Display for PromptMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings shared by every exchange in a run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Model under evaluation.
    pub assistant_model: String,
    /// Model used for answer extraction.
    pub system_model: String,
    /// Assistant sampling temperature (default: 1.0).
    pub temperature: f32,
    /// Target is a base model; few-shot exemplars are filled in.
    pub is_base_model: bool,
    /// Prompt shape.
    pub prompt_mode: PromptMode,
    /// Exemplars per prompt for base models (default: 5).
    pub fewshot_count: usize,
    /// Name fragments marking reasoning models.
    pub reasoning_markers: Vec<String>,
    /// Output budget for reasoning models (default: 16000).
    pub reasoning_max_tokens: u32,
    /// Output budget for other models (default: 1000).
    pub standard_max_tokens: u32,
    /// Exchanges in flight at once (default: 4).
    pub concurrency: usize,
    /// Dataset file name recorded with each exchange.
    pub dataset_fn: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            assistant_model: DEFAULT_MODEL.to_string(),
            system_model: DEFAULT_MODEL.to_string(),
            temperature: 1.0,
            is_base_model: false,
            prompt_mode: PromptMode::Full,
            fewshot_count: 5,
            reasoning_markers: DEFAULT_REASONING_MARKERS
                .iter()
                .map(ToString::to_string)
                .collect(),
            reasoning_max_tokens: 16_000,
            standard_max_tokens: 1_000,
            concurrency: 4,
            dataset_fn: None,
        }
    }
}

impl RunConfig {
    /// Set the assistant model.
    #[must_use]
    pub fn with_assistant_model(mut self, model: impl Into<String>) -> Self {
        self.assistant_model = model.into();
        self
    }

    /// Set the extraction model.
    #[must_use]
    pub fn with_system_model(mut self, model: impl Into<String>) -> Self {
        self.system_model = model.into();
        self
    }

    /// Set the assistant temperature.
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Mark the target as a base model.
    #[must_use]
    pub const fn with_base_model(mut self, is_base_model: bool) -> Self {
        self.is_base_model = is_base_model;
        self
    }

    /// Set the prompt mode.
    #[must_use]
    pub const fn with_prompt_mode(mut self, mode: PromptMode) -> Self {
        self.prompt_mode = mode;
        self
    }

    /// Set the number of concurrent exchanges.
    #[must_use]
    pub const fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Record a dataset file name with each exchange.
    #[must_use]
    pub fn with_dataset_fn(mut self, dataset_fn: impl Into<String>) -> Self {
        self.dataset_fn = Some(dataset_fn.into());
        self
    }

    /// Whether the assistant model matches a reasoning marker.
    #[must_use]
    pub fn is_reasoning_model(&self) -> bool {
        self.reasoning_markers
            .iter()
            .any(|marker| self.assistant_model.contains(marker.as_str()))
    }

    /// Output token budget for the assistant turn.
    #[must_use]
    pub fn max_output_tokens(&self) -> u32 {
        if self.is_reasoning_model() {
            self.reasoning_max_tokens
        } else {
            self.standard_max_tokens
        }
    }

    /// Conversation type, suffixed `-t{temperature}` away from 1.0.
    #[must_use]
    pub fn conv_type(&self) -> String {
        if (self.temperature - 1.0).abs() < f32::EPSILON {
            self.prompt_mode.as_str().to_string()
        } else {
            format!("{}-t{:?}", self.prompt_mode, self.temperature)
        }
    }

    /// Checks settings that would otherwise fail mid-run.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for zero concurrency, a negative or
    /// non-finite temperature, or an empty model name.
    pub fn validate(&self) -> Result<(), Error> {
        if self.concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".to_string()));
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(Error::Config(format!(
                "temperature must be a non-negative number, got {}",
                self.temperature
            )));
        }
        if self.assistant_model.trim().is_empty() || self.system_model.trim().is_empty() {
            return Err(Error::Config("model names must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_both_concat_flags_is_config_error() {
        let err = PromptMode::from_flags(true, true).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(PromptMode::from_flags(false, true).unwrap(), PromptMode::ShuffleConcat);
        assert_eq!(PromptMode::from_flags(false, false).unwrap(), PromptMode::Full);
    }

    #[test]
    fn test_reasoning_budget() {
        let config = RunConfig::default();
        assert!(config.is_reasoning_model());
        assert_eq!(config.max_output_tokens(), 16_000);

        let config = config.with_assistant_model("gemma-3-27b-it");
        assert_eq!(config.max_output_tokens(), 1_000);

        let config = config.with_assistant_model("deepseek-r1-distill");
        assert_eq!(config.max_output_tokens(), 16_000);
    }

    #[test]
    fn test_conv_type_temperature_suffix() {
        let config = RunConfig::default().with_prompt_mode(PromptMode::ShuffleConcat);
        assert_eq!(config.conv_type(), "shuffle-concat");
        assert_eq!(config.clone().with_temperature(0.0).conv_type(), "shuffle-concat-t0.0");
        assert_eq!(config.with_temperature(0.5).conv_type(), "shuffle-concat-t0.5");
    }

    #[test]
    fn test_validate() {
        RunConfig::default().validate().unwrap();
        assert!(RunConfig::default().with_concurrency(0).validate().is_err());
        assert!(RunConfig::default().with_temperature(-1.0).validate().is_err());
    }
}
