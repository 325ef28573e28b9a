//! Task collaborators: prompt rendering, few-shot exemplars and scoring.

use crate::errors::Error;
use crate::sample::{Sample, Shard};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use shardeval_client::template::{substitute, substitute_text};
use shardeval_extraction::{AnswerSpec, ExtractionStrategy};
use std::path::Path;

/// Score and free-form detail returned by a task's evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Score in `[0, 1]`; `None` when the evaluator could not score.
    pub score: Option<f64>,
    /// Evaluator-specific detail, logged verbatim.
    pub detail: Value,
}

impl Evaluation {
    /// An exchange is correct only on a perfect score.
    #[must_use]
    pub fn is_correct(&self) -> bool {
        self.score.is_some_and(|score| (score - 1.0).abs() < f64::EPSILON)
    }
}

/// A benchmark task as seen by the orchestrator.
pub trait Task: AnswerSpec {
    /// Task name, matched against `Sample::task`.
    fn name(&self) -> &str;

    /// Preamble placed before concatenated shards.
    fn system_prompt(&self, sample: &Sample) -> String;

    /// The fully specified instruction for `sample`, few-shot placeholder intact.
    ///
    /// # Errors
    ///
    /// Returns an error when the sample lacks a field the prompt needs.
    fn full_prompt(&self, sample: &Sample) -> Result<String, Error>;

    /// System preamble followed by `shards`, one per line.
    fn concat_prompt(&self, sample: &Sample, shards: &[Shard]) -> String {
        let joined = shards
            .iter()
            .map(|s| s.shard.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        format!("{}\n\n{}", self.system_prompt(sample).trim(), joined.trim())
    }

    /// Exemplars for full prompts.
    fn full_examples(&self, _count: usize) -> String {
        String::new()
    }

    /// Exemplars for concatenated prompts.
    fn sharded_examples(&self, _count: usize) -> String {
        String::new()
    }

    /// Scores an extracted answer.
    fn evaluate(&self, answer: &str, sample: &Sample) -> Evaluation;
}

/// A task defined entirely in JSON.
///
/// ```json
/// {
///   "name": "qa",
///   "system_prompt": "Answer the multiple-choice question.",
///   "full_prompt": "[[fewshot_examples]]\n[[text]]\n[[question]]",
///   "answer_description": "A single letter (A, B, C, or D).",
///   "extraction_strategy": "gen"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateTask {
    /// Task name.
    pub name: String,
    /// Preamble for concatenated prompts.
    pub system_prompt: String,
    /// Full prompt template; `[[field]]` tokens are filled from the sample.
    pub full_prompt: String,
    /// Description handed to the extractor.
    pub answer_description: String,
    /// How answers are extracted.
    pub extraction_strategy: ExtractionStrategy,
    /// Sample field holding the reference answer.
    #[serde(default = "default_label_field")]
    pub label_field: String,
    /// Regex whose first capture group is the answer, for `task_specific`.
    #[serde(default)]
    pub answer_pattern: Option<String>,
    /// Exemplar template for full prompts, filled from an example's fields.
    #[serde(default)]
    pub full_example_template: Option<String>,
    /// Exemplar template for concatenated prompts (`[[shards]]`, `[[label]]`).
    #[serde(default)]
    pub sharded_example_template: Option<String>,
    /// Worked examples for base models.
    #[serde(default)]
    pub examples: Vec<Sample>,
    #[serde(skip)]
    compiled_pattern: Option<Regex>,
}

fn default_label_field() -> String {
    "label".to_string()
}

impl TemplateTask {
    /// Reads and validates a task definition.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io`/`Error::Json` for unreadable files and
    /// `Error::Config` for an invalid `answer_pattern`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let task: Self = serde_json::from_str(&raw)?;
        task.compile()
    }

    /// Compiles `answer_pattern`, if any.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the pattern does not compile.
    pub fn compile(mut self) -> Result<Self, Error> {
        self.compiled_pattern = self
            .answer_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| Error::Config(format!("invalid answer_pattern for task {}: {e}", self.name)))?;
        Ok(self)
    }

    fn render_example(template: &str, example: &Sample) -> String {
        let pairs: Vec<(&str, String)> = example
            .fields
            .iter()
            .map(|(key, value)| {
                let text = value
                    .as_str()
                    .map_or_else(|| value.to_string(), ToString::to_string);
                (key.as_str(), text)
            })
            .collect();
        let borrowed: Vec<(&str, &str)> = pairs.iter().map(|(k, v)| (*k, v.as_str())).collect();
        substitute_text(template, &borrowed)
    }
}

impl AnswerSpec for TemplateTask {
    fn extraction_strategy(&self) -> ExtractionStrategy {
        self.extraction_strategy
    }

    fn answer_description(&self) -> &str {
        &self.answer_description
    }

    fn extract_task_answer(&self, response: &str) -> String {
        self.compiled_pattern
            .as_ref()
            .and_then(|pattern| pattern.captures(response))
            .and_then(|captures| captures.get(1).or_else(|| captures.get(0)))
            .map_or_else(|| response.to_string(), |m| m.as_str().to_string())
    }
}

impl Task for TemplateTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn system_prompt(&self, _sample: &Sample) -> String {
        self.system_prompt.clone()
    }

    fn full_prompt(&self, sample: &Sample) -> Result<String, Error> {
        // Only fields the template names take part, so unrelated non-text
        // fields (ids, numeric metadata) are not substitution errors.
        let referenced: Map<String, Value> = sample
            .fields
            .iter()
            .filter(|(key, _)| self.full_prompt.contains(&format!("[[{key}]]")))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        substitute(&self.full_prompt, &referenced).map_err(|e| Error::Sample {
            task_id: sample.task_id.clone(),
            message: e.to_string(),
        })
    }

    fn full_examples(&self, count: usize) -> String {
        let Some(template) = &self.full_example_template else {
            return String::new();
        };
        self.examples
            .iter()
            .take(count)
            .map(|example| Self::render_example(template, example))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn sharded_examples(&self, count: usize) -> String {
        let Some(template) = &self.sharded_example_template else {
            return String::new();
        };
        self.examples
            .iter()
            .take(count)
            .map(|example| {
                let shards = example
                    .shards
                    .iter()
                    .map(|s| s.shard.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                let label = example.field_str(&self.label_field).unwrap_or_default();
                substitute_text(template, &[("shards", &shards), ("label", label)])
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn evaluate(&self, answer: &str, sample: &Sample) -> Evaluation {
        let Some(expected) = sample.field_str(&self.label_field) else {
            return Evaluation {
                score: None,
                detail: json!({"error": format!("sample has no '{}' field", self.label_field)}),
            };
        };

        let got = answer.trim();
        if got.is_empty() {
            return Evaluation {
                score: Some(0.0),
                detail: json!({"expected": expected, "error": "empty answer"}),
            };
        }

        let matched = got.to_lowercase() == expected.trim().to_lowercase();
        Evaluation {
            score: Some(if matched { 1.0 } else { 0.0 }),
            detail: json!({"expected": expected, "got": got}),
        }
    }
}
