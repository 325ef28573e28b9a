//! # shardeval
//!
//! Measures how language models handle an instruction given all at once
//! versus revealed as shards.
//!
//! A [`ConversationOrchestrator`] builds the prompt for one sample (`full`,
//! `concat` or `shuffle-concat`), runs the assistant turn through a shared
//! [`shardeval_client::GenerationClient`], pulls out an extractive answer
//! with [`shardeval_extraction::AnswerExtractor`] and scores it with the
//! sample's [`Task`].
//!
//! ## Example
//!
//! ```no_run
//! # use shardeval::prelude::*;
//! # use std::sync::Arc;
//! # async fn example() -> Result<(), Error> {
//! let pool = Arc::new(CredentialPool::from_env()?);
//! let api = GeminiApi::new(GeminiConfig::default()).map_err(ClientError::from)?;
//! let client = Arc::new(GenerationClient::new(Arc::new(api), pool));
//!
//! let config = RunConfig::default().with_prompt_mode(PromptMode::ShuffleConcat);
//! let orchestrator = ConversationOrchestrator::new(client, config)?;
//!
//! let task = TemplateTask::load("tasks/qa.json")?;
//! let samples = load_samples("data/sharded_qa.json")?;
//! let outcomes = orchestrator.run_many(&task, &samples, Some(42)).await;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

/// Command-line arguments.
pub mod cli;

/// Run configuration.
pub mod config;

/// Public error types.
pub mod errors;

/// Prompt construction and exchange execution.
pub mod orchestrator;

/// Commonly used types and traits.
pub mod prelude;

/// Exchange records and loggers.
pub mod record;

/// Dataset samples and shards.
pub mod sample;

/// Task collaborators.
pub mod task;

pub use config::{PromptMode, RunConfig};
pub use errors::Error;
pub use orchestrator::{arrange_shards, ConversationOrchestrator, ExchangeOutcome};
pub use record::{ConversationLogger, ExchangeRecord, JsonLinesLogger};
pub use sample::{load_samples, Sample, Shard};
pub use task::{Evaluation, Task, TemplateTask};
