//! Command-line surface of the `shardeval` binary.

use crate::config::{PromptMode, RunConfig, DEFAULT_MODEL};
use crate::errors::Error;
use clap::{Args, Parser, Subcommand};
use shardeval_client::ClientConfig;
use std::path::PathBuf;

/// Sharded-instruction benchmark runner.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Command to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Simulate full / concat / shuffle-concat exchanges and print one JSON record per line
    Simulate(SimulateArgs),
}

/// Arguments for `shardeval simulate`.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Task definition (JSON)
    #[arg(long)]
    pub task_file: PathBuf,

    /// Sharded samples (JSON array)
    #[arg(long)]
    pub samples_file: PathBuf,

    /// Model under evaluation
    #[arg(long, default_value = DEFAULT_MODEL)]
    pub assistant_model: String,

    /// Model used for answer extraction
    #[arg(long, default_value = DEFAULT_MODEL)]
    pub system_model: String,

    /// Assistant sampling temperature
    #[arg(long, default_value_t = 1.0)]
    pub temperature: f32,

    /// Present all shards at once, in shard-id order
    #[arg(long)]
    pub concat: bool,

    /// Present all shards at once, first shard fixed and the rest shuffled
    #[arg(long)]
    pub shuffle_concat: bool,

    /// Target is a base model: fill few-shot exemplars
    #[arg(long)]
    pub base_model: bool,

    /// Exchanges in flight at once
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    /// Only run the first N samples of the task
    #[arg(long)]
    pub limit: Option<usize>,

    /// Attempts per generate call
    #[arg(long, default_value_t = 10)]
    pub max_attempts: u32,

    /// Seed for shard shuffling
    #[arg(long)]
    pub seed: Option<u64>,
}

impl SimulateArgs {
    /// Run settings described by the flags.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for conflicting or invalid flags.
    pub fn run_config(&self) -> Result<RunConfig, Error> {
        let mode = PromptMode::from_flags(self.concat, self.shuffle_concat)?;
        let config = RunConfig {
            concurrency: self.concurrency,
            ..RunConfig::default()
        }
        .with_assistant_model(&self.assistant_model)
        .with_system_model(&self.system_model)
        .with_temperature(self.temperature)
        .with_base_model(self.base_model)
        .with_prompt_mode(mode)
        .with_dataset_fn(self.samples_file.display().to_string());
        config.validate()?;
        Ok(config)
    }

    /// Retry settings described by the flags.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for a zero attempt budget.
    pub fn client_config(&self) -> Result<ClientConfig, Error> {
        let config = ClientConfig::default().with_max_attempts(self.max_attempts);
        config
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(config)
    }
}
