use std::sync::Arc;
use std::time::Duration;

use ai_client::Ollama;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use procurecast_common::{run_stage, AgencyId, AppConfig, PipelineConfig, SelectorOverrides, StageOutcome};
use procurecast_scout::{
    extract_unprocessed, resolve_region, AssistedLinkFinder, ChromeFetcher, DocumentHarvester,
    ExtensionLinkFinder, ExtractionContext, HttpFetcher, LinkFinder, NewsHarvester, PageFetcher,
    RegistryHarvester, Throttle,
};
use procurecast_store::{ProcurementStore, SqlStore};

#[derive(Parser)]
#[command(name = "scout", about = "Procurement signal harvesting stages")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the agency ids that belong to a region
    Resolve { region: String },
    /// Harvest planning documents, minutes and listed solicitations
    Documents {
        /// Limit to these agencies (repeatable); all agencies otherwise
        #[arg(long = "agency-id")]
        agency_ids: Vec<AgencyId>,
        /// Ask the local model which links are documents
        #[arg(long)]
        ai_finder: bool,
    },
    /// Harvest recent news articles
    News {
        #[arg(long = "agency-id")]
        agency_ids: Vec<AgencyId>,
    },
    /// Harvest historical solicitations from the opportunity registry
    Solicitations,
    /// Run tier-1 entity extraction over new documents
    Extract,
    /// Resolve a region, then harvest its documents and news
    Regional {
        region: String,
        #[arg(long)]
        ai_finder: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("procurecast=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let pipeline = config.pipeline_config()?;
    let scout = Scout::new(config, pipeline);

    let outcome = match cli.command {
        Command::Resolve { region } => run_stage("resolve", scout.resolve(&region)).await,
        Command::Documents {
            agency_ids,
            ai_finder,
        } => run_stage("documents", scout.documents(targets(&agency_ids), ai_finder)).await,
        Command::News { agency_ids } => run_stage("news", scout.news(targets(&agency_ids))).await,
        Command::Solicitations => run_stage("solicitations", scout.solicitations()).await,
        Command::Extract => run_stage("extract", scout.extract()).await,
        Command::Regional { region, ai_finder } => {
            run_stage("regional", scout.regional(&region, ai_finder)).await
        }
    };

    info!(%outcome, "Scout finished");
    std::process::exit(outcome.exit_code());
}

fn targets(ids: &[AgencyId]) -> Option<&[AgencyId]> {
    (!ids.is_empty()).then_some(ids)
}

/// Wires config into the stage implementations.
struct Scout {
    config: AppConfig,
    pipeline: PipelineConfig,
    throttle: Arc<Throttle>,
}

impl Scout {
    fn new(config: AppConfig, pipeline: PipelineConfig) -> Self {
        let throttle = Arc::new(Throttle::from_config(&pipeline.harvest));
        Self {
            config,
            pipeline,
            throttle,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.harvest.request_timeout_secs)
    }

    async fn connect(&self) -> Result<Arc<dyn ProcurementStore>> {
        let max_connections = (self.pipeline.harvest.concurrency as u32).max(1) + 1;
        let store = SqlStore::connect(&self.config.database_url, max_connections)
            .await
            .context("Failed to connect to database")?;
        Ok(Arc::new(store))
    }

    async fn resolve(&self, region: &str) -> Result<StageOutcome> {
        let store = self.connect().await?;
        let ids = resolve_region(store.as_ref(), region).await?;
        if ids.is_empty() {
            return Ok(StageOutcome::skipped(format!("no agencies found for region {region:?}")));
        }
        println!(
            "{}",
            ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",")
        );
        Ok(StageOutcome::completed(format!("{} agencies", ids.len())))
    }

    async fn documents(&self, targets: Option<&[AgencyId]>, ai_finder: bool) -> Result<StageOutcome> {
        let store = self.connect().await?;
        let harvester = self.document_harvester(store, ai_finder)?;
        let stats = harvester.run(targets).await?;
        Ok(StageOutcome::completed(stats))
    }

    async fn news(&self, targets: Option<&[AgencyId]>) -> Result<StageOutcome> {
        let Some(api_key) = self.config.news_api_key.as_deref() else {
            return Ok(StageOutcome::skipped("NEWS_API_KEY not set"));
        };
        let store = self.connect().await?;
        let harvester = NewsHarvester::new(
            store,
            api_key,
            self.pipeline.news.clone(),
            self.throttle.clone(),
            self.timeout(),
        )?
        .with_concurrency(self.pipeline.harvest.concurrency);
        let stats = harvester.run(targets).await?;
        Ok(StageOutcome::completed(stats))
    }

    async fn solicitations(&self) -> Result<StageOutcome> {
        let Some(api_key) = self.config.sam_api_key.as_deref() else {
            return Ok(StageOutcome::skipped("SAM_API_KEY not set"));
        };
        let store = self.connect().await?;
        let harvester = RegistryHarvester::new(
            store,
            api_key,
            self.pipeline.registry.clone(),
            self.throttle.clone(),
            self.timeout(),
        )?;
        let stats = harvester.run().await?;
        Ok(StageOutcome::completed(stats))
    }

    async fn extract(&self) -> Result<StageOutcome> {
        info!(
            model = self.config.ollama_model.as_str(),
            "Tier-2 extraction model configured (not invoked)"
        );
        let ctx = ExtractionContext::new().context("Failed to compile entity recognisers")?;
        let store = self.connect().await?;
        let stats = extract_unprocessed(store.as_ref(), &ctx).await?;
        Ok(StageOutcome::completed(stats))
    }

    async fn regional(&self, region: &str, ai_finder: bool) -> Result<StageOutcome> {
        let store = self.connect().await?;
        let ids = resolve_region(store.as_ref(), region).await?;
        if ids.is_empty() {
            return Ok(StageOutcome::skipped(format!("no agencies found for region {region:?}")));
        }
        info!(region, agencies = ids.len(), ai_finder, "Starting regional harvest");

        let documents = self
            .document_harvester(store.clone(), ai_finder)?
            .run(Some(&ids))
            .await?;

        let news = match self.config.news_api_key.as_deref() {
            Some(api_key) => {
                let stats = NewsHarvester::new(
                    store,
                    api_key,
                    self.pipeline.news.clone(),
                    self.throttle.clone(),
                    self.timeout(),
                )?
                .with_concurrency(self.pipeline.harvest.concurrency)
                .run(Some(&ids))
                .await?;
                stats.to_string()
            }
            None => "skipped (NEWS_API_KEY not set)".to_string(),
        };

        Ok(StageOutcome::completed(format!(
            "region {region:?}: documents [{documents}]; news [{news}]"
        )))
    }

    fn document_harvester(
        &self,
        store: Arc<dyn ProcurementStore>,
        ai_finder: bool,
    ) -> Result<DocumentHarvester> {
        let harvest = &self.pipeline.harvest;
        let http: Arc<dyn PageFetcher> = Arc::new(HttpFetcher::new(self.timeout())?);
        let browser: Arc<dyn PageFetcher> = Arc::new(ChromeFetcher::new(
            &self.config.chrome_bin,
            harvest.browser_concurrency,
            self.timeout(),
        )?);

        let link_finder: Arc<LinkFinder> = if ai_finder || harvest.use_ai_finder {
            let ollama = Ollama::new(&self.config.ollama_url, &self.config.ollama_model)?;
            Arc::new(AssistedLinkFinder::new(ollama))
        } else {
            Arc::new(ExtensionLinkFinder::pdf())
        };

        let overrides = SelectorOverrides::load(&self.config.selectors_path);
        Ok(
            DocumentHarvester::new(store, browser, http, link_finder, self.throttle.clone())
                .with_overrides(overrides)
                .with_concurrency(harvest.concurrency),
        )
    }
}
