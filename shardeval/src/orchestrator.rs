//! One simulated exchange, end to end, and a bounded-concurrency batch runner.

use crate::config::{PromptMode, RunConfig};
use crate::errors::Error;
use crate::record::{
    AnswerEvaluation, ConversationLogger, ExchangeRecord, LogEntry, LogRole, TraceEntry,
    ANSWER_EVALUATION,
};
use crate::sample::{Sample, Shard};
use crate::task::Task;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use shardeval_client::{GenerationClient, GenerationRequest, Message};
use shardeval_extraction::{AnswerExtractor, ExtractionConfig};
use std::sync::Arc;
use uuid::Uuid;

/// Placeholder replaced by few-shot exemplars (base models) or removed.
pub const FEWSHOT_PLACEHOLDER: &str = "[[fewshot_examples]]";

/// Result of one exchange inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeOutcome {
    /// The exchange ran to completion and was scored.
    Completed(ExchangeRecord),
    /// The exchange failed; the rest of the batch continued.
    Failed {
        /// Sample that failed.
        task_id: String,
        /// Error description.
        error: String,
    },
}

impl ExchangeOutcome {
    /// The record, for completed exchanges.
    #[must_use]
    pub const fn record(&self) -> Option<&ExchangeRecord> {
        match self {
            Self::Completed(record) => Some(record),
            Self::Failed { .. } => None,
        }
    }
}

/// Orders shards for a prompt mode, always on a copy.
///
/// - `Full`: dataset order.
/// - `Concat`: ascending `shard_id` (stable).
/// - `ShuffleConcat`: first shard fixed, the rest permuted with `rng`.
pub fn arrange_shards<R: Rng + ?Sized>(mode: PromptMode, shards: &[Shard], rng: &mut R) -> Vec<Shard> {
    let mut arranged = shards.to_vec();
    match mode {
        PromptMode::Full => {}
        PromptMode::Concat => arranged.sort_by_key(|shard| shard.shard_id),
        PromptMode::ShuffleConcat => {
            if let Some((_, rest)) = arranged.split_first_mut() {
                rest.shuffle(rng);
            }
        }
    }
    arranged
}

/// Drives exchanges: prompt, assistant turn, extraction, scoring, logging.
pub struct ConversationOrchestrator {
    client: Arc<GenerationClient>,
    extractor: AnswerExtractor,
    config: RunConfig,
    logger: Option<Arc<dyn ConversationLogger>>,
}

impl ConversationOrchestrator {
    /// Creates an orchestrator; extraction uses `config.system_model`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `config` is invalid.
    pub fn new(client: Arc<GenerationClient>, config: RunConfig) -> Result<Self, Error> {
        let extraction = ExtractionConfig::default().with_model(config.system_model.clone());
        Self::with_extraction(client, config, extraction)
    }

    /// Creates an orchestrator with explicit extraction settings.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `config` is invalid.
    pub fn with_extraction(
        client: Arc<GenerationClient>,
        config: RunConfig,
        extraction: ExtractionConfig,
    ) -> Result<Self, Error> {
        config.validate()?;
        let extractor = AnswerExtractor::with_config(Arc::clone(&client), extraction);
        Ok(Self {
            client,
            extractor,
            config,
            logger: None,
        })
    }

    /// Sends every finished exchange to `logger`.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn ConversationLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Run settings.
    #[must_use]
    pub const fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Builds the assistant prompt for `sample` without touching it.
    ///
    /// # Errors
    ///
    /// Propagates the task's full-prompt errors.
    pub fn build_prompt<R: Rng + ?Sized>(
        &self,
        task: &dyn Task,
        sample: &Sample,
        rng: &mut R,
    ) -> Result<String, Error> {
        let mode = self.config.prompt_mode;
        let prompt = if mode.is_sharded() {
            let shards = arrange_shards(mode, &sample.shards, rng);
            task.concat_prompt(sample, &shards)
        } else {
            task.full_prompt(sample)?
        };

        let exemplars = if self.config.is_base_model {
            if mode.is_sharded() {
                task.sharded_examples(self.config.fewshot_count)
            } else {
                task.full_examples(self.config.fewshot_count)
            }
        } else {
            String::new()
        };
        Ok(prompt.replace(FEWSHOT_PLACEHOLDER, &exemplars))
    }

    /// Runs one exchange: a single assistant call, then extraction and scoring.
    ///
    /// # Errors
    ///
    /// Returns the client's error when the assistant turn fails, a task
    /// error when the prompt cannot be built, or a logger error.
    pub async fn run<R: Rng + ?Sized>(
        &self,
        task: &dyn Task,
        sample: &Sample,
        rng: &mut R,
    ) -> Result<ExchangeRecord, Error> {
        let prompt = self.build_prompt(task, sample, rng)?;
        let conv_type = self.config.conv_type();

        tracing::info!(
            event = "exchange_started",
            task = task.name(),
            task_id = %sample.task_id,
            conv_type = %conv_type,
            "exchange_started"
        );

        let request = GenerationRequest::new(
            self.config.assistant_model.clone(),
            vec![Message::user(prompt.clone())],
        )
        .with_temperature(self.config.temperature)
        .with_max_output_tokens(self.config.max_output_tokens());

        let response = self.client.generate_text(&request).await?;
        let transcript = vec![Message::user(prompt), Message::assistant(response)];

        let extraction = self.extractor.extract(task, &transcript).await;
        let evaluation = task.evaluate(&extraction.answer, sample);
        let is_correct = evaluation.is_correct();

        tracing::info!(
            event = "exchange_scored",
            task_id = %sample.task_id,
            is_correct,
            score = evaluation.score,
            extraction_attempts = extraction.attempts_used,
            extraction_wall_ms =
                u64::try_from(extraction.metrics.wall_time.as_millis()).unwrap_or(u64::MAX),
            extraction_input_tokens = extraction.metrics.estimated_input_tokens,
            extraction_output_tokens = extraction.metrics.estimated_output_tokens,
            "exchange_scored"
        );

        let mut trace: Vec<TraceEntry> = transcript.into_iter().map(TraceEntry::Message).collect();
        trace.push(TraceEntry::Log(LogEntry {
            role: LogRole::Log,
            content: AnswerEvaluation {
                kind: ANSWER_EVALUATION.to_string(),
                extracted_answer: extraction.answer,
                is_correct,
                score: evaluation.score,
                evaluation_detail: evaluation.detail,
                extraction_attempts: extraction.attempts_used,
            },
            timestamp: Utc::now(),
        }));

        let record = ExchangeRecord {
            conv_id: Uuid::new_v4(),
            conv_type,
            task: task.name().to_string(),
            task_id: sample.task_id.clone(),
            dataset_fn: self.dataset_name(),
            assistant_model: self.config.assistant_model.clone(),
            system_model: self.config.system_model.clone(),
            trace,
            is_correct,
            score: evaluation.score,
        };

        if let Some(logger) = &self.logger {
            logger.log(&record)?;
        }
        Ok(record)
    }

    /// Runs every sample, at most `config.concurrency` at a time.
    ///
    /// Each exchange gets its own RNG, seeded from `seed + index` when a
    /// seed is given. Outcomes come back in completion order.
    pub async fn run_many(
        &self,
        task: &dyn Task,
        samples: &[Sample],
        seed: Option<u64>,
    ) -> Vec<ExchangeOutcome> {
        stream::iter(samples.iter().enumerate())
            .map(|(index, sample)| async move {
                let mut rng = seed.map_or_else(StdRng::from_entropy, |seed| {
                    StdRng::seed_from_u64(seed.wrapping_add(index as u64))
                });
                match self.run(task, sample, &mut rng).await {
                    Ok(record) => ExchangeOutcome::Completed(record),
                    Err(error) => {
                        tracing::error!(
                            event = "exchange_failed",
                            task_id = %sample.task_id,
                            error = %error,
                            "exchange_failed"
                        );
                        ExchangeOutcome::Failed {
                            task_id: sample.task_id.clone(),
                            error: error.to_string(),
                        }
                    }
                }
            })
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await
    }

    fn dataset_name(&self) -> String {
        self.config
            .dataset_fn
            .as_deref()
            .and_then(|path| path.rsplit(['/', '\\']).next())
            .filter(|name| !name.is_empty())
            .unwrap_or("unknown")
            .to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::task::TemplateTask;
    use serde_json::json;
    use shardeval_client::testing::ScriptedBackend;
    use shardeval_client::{BackendFailure, ClientConfig, CredentialPool};

    fn task(strategy: &str) -> TemplateTask {
        serde_json::from_value::<TemplateTask>(json!({
            "name": "qa",
            "system_prompt": "Answer with one letter.",
            "full_prompt": "[[fewshot_examples]]Q: [[question]]",
            "answer_description": "A single letter (A, B, C, or D).",
            "extraction_strategy": strategy,
            "full_example_template": "Q: [[question]] A: [[label]]\n",
            "sharded_example_template": "[[shards]] -> [[label]]\n",
            "examples": [{"task": "qa", "task_id": "ex/1", "question": "1+1?", "label": "B",
                          "shards": [{"shard_id": 1, "shard": "1+1"}]}]
        }))
        .unwrap()
        .compile()
        .unwrap()
    }

    fn sample() -> Sample {
        serde_json::from_value(json!({
            "task": "qa",
            "task_id": "sharded-qa/9",
            "question": "Which letter?",
            "label": "B",
            "shards": [
                {"shard_id": "1", "shard": "s1"},
                {"shard_id": 3, "shard": "s3"},
                {"shard_id": 2, "shard": "s2"},
                {"shard_id": 4, "shard": "s4"},
                {"shard_id": 5, "shard": "s5"}
            ]
        }))
        .unwrap()
    }

    fn orchestrator(backend: &Arc<ScriptedBackend>, config: RunConfig) -> ConversationOrchestrator {
        let pool = Arc::new(CredentialPool::from_csv("k1,k2").unwrap());
        let client = GenerationClient::with_config(
            backend.clone(),
            pool,
            ClientConfig::default().with_max_attempts(2),
        )
        .unwrap();
        ConversationOrchestrator::new(Arc::new(client), config).unwrap()
    }

    #[test]
    fn test_concat_sorts_by_shard_id() {
        let sample = sample();
        let arranged = arrange_shards(PromptMode::Concat, &sample.shards, &mut StdRng::seed_from_u64(1));
        let ids: Vec<u32> = arranged.iter().map(|s| s.shard_id).collect();
        assert_eq!(ids, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_shuffle_keeps_first_shard_and_leaves_input_untouched() {
        let sample = sample();
        let before = sample.clone();

        for seed in 0..50 {
            let arranged =
                arrange_shards(PromptMode::ShuffleConcat, &sample.shards, &mut StdRng::seed_from_u64(seed));
            assert_eq!(arranged[0], sample.shards[0]);
            let mut ids: Vec<u32> = arranged.iter().map(|s| s.shard_id).collect();
            ids.sort_unstable();
            assert_eq!(ids, [1, 2, 3, 4, 5]);
        }
        assert_eq!(sample, before);
    }

    #[test]
    fn test_shuffle_of_empty_or_single_shard() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(arrange_shards(PromptMode::ShuffleConcat, &[], &mut rng).is_empty());
        let one = [Shard::new(7, "only")];
        assert_eq!(arrange_shards(PromptMode::ShuffleConcat, &one, &mut rng), one);
    }

    #[test]
    fn test_fewshot_placeholder_removed_for_instruct_models() {
        let backend = Arc::new(ScriptedBackend::new());
        let orchestrator = orchestrator(&backend, RunConfig::default());
        let prompt = orchestrator
            .build_prompt(&task("gen"), &sample(), &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert_eq!(prompt, "Q: Which letter?");
    }

    #[test]
    fn test_fewshot_filled_for_base_models() {
        let backend = Arc::new(ScriptedBackend::new());
        let full = orchestrator(&backend, RunConfig::default().with_base_model(true));
        let prompt = full
            .build_prompt(&task("gen"), &sample(), &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert_eq!(prompt, "Q: 1+1? A: B\nQ: Which letter?");

        let concat = orchestrator(
            &backend,
            RunConfig::default()
                .with_base_model(true)
                .with_prompt_mode(PromptMode::Concat),
        );
        let prompt = concat
            .build_prompt(&task("gen"), &sample(), &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert_eq!(prompt, "Answer with one letter.\n\ns1\ns2\ns3\ns4\ns5");
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_records_trace_and_score() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .then_ok("The answer is B. Reason: it fits.")
                .then_ok(r#"{"answer": "B"}"#),
        );
        let config = RunConfig::default()
            .with_assistant_model("gemma-3-27b-it")
            .with_temperature(0.7)
            .with_dataset_fn("data/qa/sharded_qa.json");
        let orchestrator = orchestrator(&backend, config);

        let record = orchestrator
            .run(&task("gen"), &sample(), &mut StdRng::seed_from_u64(0))
            .await
            .unwrap();

        assert!(record.is_correct);
        assert_eq!(record.score, Some(1.0));
        assert_eq!(record.conv_type, "full-t0.7");
        assert_eq!(record.dataset_fn, "sharded_qa.json");
        assert_eq!(record.messages().count(), 2);
        assert_eq!(record.evaluation().unwrap().extracted_answer, "B");

        let calls = backend.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].model, "gemma-3-27b-it");
        assert_eq!(calls[0].max_output_tokens, Some(1_000));
        assert!(!calls[0].structured);
        assert_eq!(calls[1].model, "gemini-2.5-flash");
        assert!(calls[1].structured);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_scored_event_reports_extraction_metrics() {
        let captured = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .without_time()
            .with_target(false)
            .with_writer(captured.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let backend = Arc::new(
            ScriptedBackend::new()
                .then_ok("The answer is B.")
                .then_ok(r#"{"answer": "B"}"#),
        );
        let orchestrator = orchestrator(&backend, RunConfig::default());
        orchestrator
            .run(&task("gen"), &sample(), &mut StdRng::seed_from_u64(0))
            .await
            .unwrap();

        let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let scored = logs
            .lines()
            .find(|line| line.contains("exchange_scored"))
            .unwrap();
        assert!(scored.contains("extraction_wall_ms=0"), "{scored}");
        assert!(scored.contains("extraction_output_tokens=4"), "{scored}");
        assert!(!scored.contains("extraction_input_tokens=0 "), "{scored}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_extraction_scores_incorrect() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .then_ok("I am not sure.")
                .with_responder(|_| Ok(r#"{"answer": "B"}"#.to_string())),
        );
        let orchestrator = orchestrator(&backend, RunConfig::default());

        let record = orchestrator
            .run(&task("gen"), &sample(), &mut StdRng::seed_from_u64(0))
            .await
            .unwrap();

        assert!(!record.is_correct);
        let evaluation = record.evaluation().unwrap();
        assert_eq!(evaluation.extracted_answer, "");
        assert_eq!(evaluation.extraction_attempts, 3);
        assert_eq!(backend.call_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_many_reports_failures_per_sample() {
        let backend = Arc::new(ScriptedBackend::new().with_responder(|request| {
            if request.last_user_prompt().is_some_and(|p| p.contains("broken")) {
                Err(BackendFailure::status(400, "Invalid prompt"))
            } else if request.want_structured_output {
                Ok(r#"{"answer": "B"}"#.to_string())
            } else {
                Ok("B".to_string())
            }
        }));
        let orchestrator = orchestrator(&backend, RunConfig::default().with_concurrency(2));

        let mut broken = sample();
        broken.task_id = "sharded-qa/broken".to_string();
        broken.fields.insert("question".to_string(), json!("broken"));
        let samples = vec![sample(), broken, sample()];

        let outcomes = orchestrator.run_many(&task("full_response"), &samples, Some(7)).await;

        assert_eq!(outcomes.len(), 3);
        let completed = outcomes.iter().filter_map(ExchangeOutcome::record).count();
        assert_eq!(completed, 2);
        assert!(outcomes.iter().any(|o| matches!(
            o,
            ExchangeOutcome::Failed { task_id, error } if task_id == "sharded-qa/broken" && error.contains("Invalid prompt")
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_logger_receives_records() {
        let backend = Arc::new(ScriptedBackend::new().with_responder(|_| Ok("B".to_string())));
        let logger = Arc::new(crate::record::JsonLinesLogger::new(Vec::new()));
        let orchestrator = orchestrator(&backend, RunConfig::default()).with_logger(logger.clone());

        orchestrator
            .run(&task("full_response"), &sample(), &mut StdRng::seed_from_u64(0))
            .await
            .unwrap();

        drop(orchestrator);
        let logger = Arc::try_unwrap(logger).ok().unwrap();
        let output = String::from_utf8(logger.into_inner()).unwrap();
        assert_eq!(output.lines().count(), 1);
        assert!(output.contains("\"conv_type\":\"full\""));
    }
}
