use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use procurecast_common::{run_stage, AppConfig, PipelineConfig, StageOutcome};
use procurecast_store::SqlStore;
use procurecast_supervisor::{StochasticProbe, Supervisor};

#[derive(Parser)]
#[command(name = "supervisor", about = "Feedback-loop verifier and harvest anomaly scan")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Feedback loop, then anomaly scan (default)
    Run,
    /// Probe high-confidence predictions for new solicitations
    Feedback,
    /// Report recently scraped documents with little or no text
    Anomalies,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("procurecast=info".parse()?))
        .init();

    info!("Procurement supervisor starting...");

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let pipeline = config.pipeline_config()?;

    let outcome = match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_stage("supervisor", run(&config, &pipeline)).await,
        Command::Feedback => run_stage("feedback", feedback(&config, &pipeline)).await,
        Command::Anomalies => run_stage("anomalies", anomalies(&config, &pipeline)).await,
    };

    info!(%outcome, "Supervisor finished");
    std::process::exit(outcome.exit_code());
}

async fn supervisor(config: &AppConfig, pipeline: &PipelineConfig) -> Result<Supervisor> {
    let store = SqlStore::connect(&config.database_url, 2)
        .await
        .context("Failed to connect to database")?;
    let verifier = pipeline.verifier.clone();
    let probe = StochasticProbe::new(verifier.confirmation_rate, verifier.seed);
    info!(
        rate = verifier.confirmation_rate,
        seeded = verifier.seed.is_some(),
        "Using stochastic confirmation probe"
    );
    Ok(Supervisor::new(
        Arc::new(store),
        Box::new(probe),
        verifier,
        pipeline.anomaly.clone(),
    ))
}

async fn run(config: &AppConfig, pipeline: &PipelineConfig) -> Result<StageOutcome> {
    let stats = supervisor(config, pipeline).await?.run().await?;
    Ok(StageOutcome::completed(stats))
}

async fn feedback(config: &AppConfig, pipeline: &PipelineConfig) -> Result<StageOutcome> {
    let stats = supervisor(config, pipeline).await?.feedback().await?;
    Ok(StageOutcome::completed(stats))
}

async fn anomalies(config: &AppConfig, pipeline: &PipelineConfig) -> Result<StageOutcome> {
    let report = supervisor(config, pipeline).await?.anomalies().await?;
    Ok(StageOutcome::completed(report))
}
