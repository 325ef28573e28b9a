//! The `shardeval` binary: runs a task's samples and prints one JSON record per exchange.

use clap::Parser;
use shardeval::cli::{Cli, Commands, SimulateArgs};
use shardeval::prelude::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();

    // stdout carries records only
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Simulate(args) => run_simulate(args).await,
    }
}

async fn run_simulate(args: SimulateArgs) -> Result<(), Error> {
    let run_config = args.run_config()?;
    let client_config = args.client_config()?;

    let task = TemplateTask::load(&args.task_file)?;
    let mut samples: Vec<Sample> = load_samples(&args.samples_file)?
        .into_iter()
        .filter(|sample| sample.task == task.name)
        .collect();
    if let Some(limit) = args.limit {
        samples.truncate(limit);
    }
    if samples.is_empty() {
        tracing::warn!(
            event = "no_samples",
            task = %task.name,
            "no_samples: nothing to run for this task"
        );
        return Ok(());
    }

    let pool = CredentialPool::from_env().map_err(|e| Error::Config(e.to_string()))?;
    tracing::info!(event = "credentials_loaded", count = pool.len(), "credentials_loaded");

    let api = GeminiApi::new(GeminiConfig::default()).map_err(ClientError::from)?;
    let client = GenerationClient::with_config(Arc::new(api), Arc::new(pool), client_config)?;
    let orchestrator = ConversationOrchestrator::new(Arc::new(client), run_config)?
        .with_logger(Arc::new(JsonLinesLogger::stdout()));

    tracing::info!(
        event = "run_started",
        task = %task.name,
        samples = samples.len(),
        conv_type = %orchestrator.config().conv_type(),
        assistant_model = %orchestrator.config().assistant_model,
        "run_started"
    );

    let outcomes = orchestrator.run_many(&task, &samples, args.seed).await;

    let records: Vec<&ExchangeRecord> = outcomes.iter().filter_map(ExchangeOutcome::record).collect();
    let correct = records.iter().filter(|record| record.is_correct).count();
    tracing::info!(
        event = "run_finished",
        completed = records.len(),
        failed = outcomes.len() - records.len(),
        correct,
        "run_finished"
    );
    Ok(())
}
