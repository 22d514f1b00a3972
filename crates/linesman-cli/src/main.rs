use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use linesman_client::{ProviderCatalog, ReqwestTransport};
use linesman_core::alert::{AlertConfig, AlertDispatcher};
use linesman_core::context::IngestionContext;
use linesman_core::drift::SchemaDriftDetector;
use linesman_core::metrics::SlaThresholds;
use linesman_core::orchestrator::{IngestionOrchestrator, OrchestratorConfig};
use linesman_core::validation::ContractRegistry;
use linesman_db::BaselineBackend;

type Orchestrator = IngestionOrchestrator<BaselineBackend, ReqwestTransport>;

#[derive(Parser)]
#[command(name = "linesman", version, about = "Resilient sports data ingestion with schema drift detection")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonArgs {
    /// Provider catalog (JSON). Defaults to the built-in NBA CDN + ESPN catalog.
    #[arg(long, global = true, env = "LINESMAN_PROVIDERS")]
    providers: Option<PathBuf>,

    /// Directory holding validation contracts
    #[arg(long, global = true, env = "LINESMAN_SCHEMAS_DIR")]
    schemas_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, validate and drift-check provider data
    Ingest {
        /// Single provider to ingest (with fallback). Omit for all enabled providers.
        #[arg(short, long)]
        provider: Option<String>,

        /// Fetch providers concurrently when ingesting all
        #[arg(long, default_value_t = false)]
        concurrent: bool,

        /// Include the fetched payloads in the output
        #[arg(long, default_value_t = false)]
        with_data: bool,
    },

    /// Probe every enabled provider
    Health,

    /// Run ingestion passes and print the provider's quality metrics
    Metrics {
        #[arg(short, long)]
        provider: String,

        /// Ingestion passes to run before reporting
        #[arg(long, default_value_t = 1)]
        runs: u32,
    },

    /// Run ingestion passes and check the provider against SLA thresholds
    Sla {
        #[arg(short, long)]
        provider: String,

        #[arg(long, default_value_t = 1)]
        runs: u32,

        #[command(flatten)]
        thresholds: ThresholdArgs,
    },

    /// Manage schema drift baselines
    Baselines {
        #[command(subcommand)]
        action: BaselineAction,
    },
}

#[derive(Args)]
struct ThresholdArgs {
    /// Minimum validation pass rate (0.0-1.0)
    #[arg(long)]
    min_pass_rate: Option<f64>,

    /// Maximum drift rate (0.0-1.0)
    #[arg(long)]
    max_drift_rate: Option<f64>,

    /// Maximum health-check error rate (0.0-1.0)
    #[arg(long)]
    max_error_rate: Option<f64>,

    /// Minimum completeness score (0.0-1.0)
    #[arg(long)]
    min_completeness: Option<f64>,
}

impl From<ThresholdArgs> for SlaThresholds {
    fn from(args: ThresholdArgs) -> Self {
        SlaThresholds {
            min_pass_rate: args.min_pass_rate,
            max_drift_rate: args.max_drift_rate,
            max_error_rate: args.max_error_rate,
            min_completeness: args.min_completeness,
        }
    }
}

#[derive(Subcommand)]
enum BaselineAction {
    /// List stored baselines
    List,

    /// Print one baseline
    Show {
        #[arg(short, long)]
        provider: String,
        #[arg(short, long)]
        schema: String,
    },

    /// Delete one baseline; the next ingestion records a fresh one
    Delete {
        #[arg(short, long)]
        provider: String,
        #[arg(short, long)]
        schema: String,
    },

    /// Fetch from the provider now and store its schema as the new baseline
    Rebaseline {
        #[arg(short, long)]
        provider: String,
    },
}

#[derive(Serialize)]
struct BaselineSummary {
    provider: String,
    schema_name: String,
    version: u32,
    hash: String,
    created_at: String,
    fields: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("linesman=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest {
            provider,
            concurrent,
            with_data,
        } => {
            let orch = build_orchestrator(&cli.common, concurrent).await?;
            let ok = cmd_ingest(&orch, provider.as_deref(), with_data).await?;
            if !ok {
                std::process::exit(1);
            }
        }
        Commands::Health => {
            let orch = build_orchestrator(&cli.common, false).await?;
            let statuses = orch.health_check_all().await;
            print_json(&statuses)?;
            if statuses.values().any(|s| !s.healthy) {
                std::process::exit(1);
            }
        }
        Commands::Metrics { provider, runs } => {
            let orch = build_orchestrator(&cli.common, false).await?;
            run_passes(&orch, &provider, runs).await?;
            let metrics = orch
                .context()
                .metrics()
                .get_metrics(&provider)
                .with_context(|| format!("No metrics recorded for '{provider}'"))?;
            print_json(&metrics)?;
        }
        Commands::Sla {
            provider,
            runs,
            thresholds,
        } => {
            let orch = build_orchestrator(&cli.common, false).await?;
            run_passes(&orch, &provider, runs).await?;
            let report = orch
                .context()
                .metrics()
                .check_sla(&provider, &thresholds.into());
            print_json(&report)?;
            if !report.compliant {
                std::process::exit(1);
            }
        }
        Commands::Baselines { action } => {
            cmd_baselines(&cli.common, action).await?;
        }
    }

    Ok(())
}

async fn build_orchestrator(common: &CommonArgs, concurrent: bool) -> Result<Orchestrator> {
    let store = BaselineBackend::from_env()
        .await
        .context("Failed to open baseline store")?;

    let catalog = match &common.providers {
        Some(path) => ProviderCatalog::load(path)?,
        None => ProviderCatalog::default_catalog(),
    };
    let contracts = common.schemas_dir.clone().map(ContractRegistry::new);

    let transport = ReqwestTransport::new().context("Failed to create HTTP client")?;
    let alerts = AlertDispatcher::new(transport.clone(), AlertConfig::from_env());

    let mut orch = IngestionOrchestrator::new(
        Arc::new(IngestionContext::default()),
        SchemaDriftDetector::new(store),
        alerts,
        OrchestratorConfig {
            concurrent,
            alert_on_failure: true,
        },
    );

    let registered = catalog.register_all(&mut orch, &transport, contracts.as_ref());
    if registered == 0 {
        bail!("No providers could be configured; check the provider catalog and logs");
    }
    Ok(orch)
}

/// Returns false if any ingestion failed.
async fn cmd_ingest(orch: &Orchestrator, provider: Option<&str>, with_data: bool) -> Result<bool> {
    match provider {
        Some(name) => {
            let mut result = orch.ingest(name).await;
            if !with_data {
                result.data = None;
            }
            print_json(&result)?;
            Ok(result.success)
        }
        None => {
            let mut aggregate = orch.ingest_from_all().await;
            if !with_data {
                for result in aggregate.results.values_mut() {
                    result.data = None;
                }
            }
            print_json(&aggregate)?;
            Ok(aggregate.success)
        }
    }
}

async fn run_passes(orch: &Orchestrator, provider: &str, runs: u32) -> Result<()> {
    if !orch.has_provider(provider) {
        bail!("Unknown provider '{provider}'");
    }
    for run in 1..=runs.max(1) {
        let result = orch.ingest(provider).await;
        tracing::info!(
            run,
            provider = %provider,
            success = result.success,
            duration_ms = result.metadata.duration_ms,
            "Ingestion pass finished"
        );
    }
    Ok(())
}

async fn cmd_baselines(common: &CommonArgs, action: BaselineAction) -> Result<()> {
    match action {
        BaselineAction::List => {
            let store = BaselineBackend::from_env().await?;
            let detector = SchemaDriftDetector::new(store);
            let summaries: Vec<BaselineSummary> = detector
                .list_baselines()
                .await?
                .into_iter()
                .map(|s| BaselineSummary {
                    fields: s.fields.len(),
                    created_at: s.created_at.to_rfc3339(),
                    provider: s.provider,
                    schema_name: s.schema_name,
                    version: s.version,
                    hash: s.hash,
                })
                .collect();
            print_json(&summaries)?;
        }
        BaselineAction::Show { provider, schema } => {
            let detector = SchemaDriftDetector::new(BaselineBackend::from_env().await?);
            let snapshot = detector
                .get_baseline(&provider, &schema)
                .await?
                .with_context(|| format!("No baseline for {provider}/{schema}"))?;
            print_json(&snapshot)?;
        }
        BaselineAction::Delete { provider, schema } => {
            let detector = SchemaDriftDetector::new(BaselineBackend::from_env().await?);
            if !detector.delete_baseline(&provider, &schema).await? {
                bail!("No baseline for {provider}/{schema}");
            }
            eprintln!("Deleted baseline {provider}/{schema}");
        }
        BaselineAction::Rebaseline { provider } => {
            let orch = build_orchestrator(common, false).await?;
            let snapshot = orch
                .rebaseline_from_provider(&provider)
                .await
                .with_context(|| format!("Failed to rebaseline '{provider}'"))?;
            eprintln!(
                "Stored {}/{} baseline version {} ({})",
                snapshot.provider, snapshot.schema_name, snapshot.version, snapshot.hash
            );
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
