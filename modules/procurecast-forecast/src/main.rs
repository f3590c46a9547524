use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use procurecast_common::{run_stage, AppConfig, PipelineConfig, StageOutcome};
use procurecast_forecast::{live_features, predict, run_backtest, train_from_store, ModelArtifact};
use procurecast_store::SqlStore;

#[derive(Parser)]
#[command(name = "forecast", about = "Feature engineering, training and prediction stages")]
struct Cli {
    /// Model artifact path; MODEL_PATH otherwise
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print live feature counts per agency
    Features,
    /// Build the backtest panel, train the classifier and save the artifact
    Train {
        /// First snapshot date (overrides config)
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Last snapshot date (overrides config)
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    /// Score every agency and replace the predictions table
    Predict,
    /// Score the snapshot schedule with the saved model and record results
    Backtest {
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("procurecast=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let mut pipeline = config.pipeline_config()?;
    let model_path = cli.model.unwrap_or_else(|| config.model_path.clone());

    let outcome = match cli.command {
        Command::Features => run_stage("features", features(&config)).await,
        Command::Train { start, end } => {
            override_window(&mut pipeline, start, end);
            run_stage("train", train(&config, &pipeline, model_path)).await
        }
        Command::Predict => run_stage("predict", predict_stage(&config, model_path)).await,
        Command::Backtest { start, end } => {
            override_window(&mut pipeline, start, end);
            run_stage("backtest", backtest(&config, &pipeline, model_path)).await
        }
    };

    info!(%outcome, "Forecast finished");
    std::process::exit(outcome.exit_code());
}

fn override_window(pipeline: &mut PipelineConfig, start: Option<NaiveDate>, end: Option<NaiveDate>) {
    if let Some(start) = start {
        pipeline.backtest.start = start;
    }
    if let Some(end) = end {
        pipeline.backtest.end = end;
    }
}

async fn connect(config: &AppConfig) -> Result<SqlStore> {
    SqlStore::connect(&config.database_url, 2)
        .await
        .context("Failed to connect to database")
}

async fn features(config: &AppConfig) -> Result<StageOutcome> {
    let store = connect(config).await?;
    let frame = live_features(&store).await?;
    println!("agency_id,{}", frame.feature_names().join(","));
    for (idx, agency_id) in frame.agency_ids().iter().enumerate() {
        let values: Vec<String> = frame.row(idx).iter().map(|v| v.to_string()).collect();
        println!("{agency_id},{}", values.join(","));
    }
    Ok(StageOutcome::completed(format!("{} agencies", frame.len())))
}

async fn train(config: &AppConfig, pipeline: &PipelineConfig, model_path: PathBuf) -> Result<StageOutcome> {
    let store = connect(config).await?;
    let report = train_from_store(&store, &pipeline.backtest, &pipeline.training, &model_path).await?;
    Ok(StageOutcome::completed(report))
}

async fn predict_stage(config: &AppConfig, model_path: PathBuf) -> Result<StageOutcome> {
    let store = connect(config).await?;
    let summary = predict(&store, &model_path).await?;
    Ok(StageOutcome::completed(summary))
}

async fn backtest(config: &AppConfig, pipeline: &PipelineConfig, model_path: PathBuf) -> Result<StageOutcome> {
    let artifact = ModelArtifact::load(&model_path)?;
    let store = connect(config).await?;
    let summary = run_backtest(&store, &artifact, &pipeline.backtest).await?;
    Ok(StageOutcome::completed(summary))
}
