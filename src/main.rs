//! Sortwatch CLI
//!
//! Usage:
//!   sortwatch validate ./run.json [--security security.json] [--api api.json]
//!   sortwatch history
//!   sortwatch demo --pages 5 --per-page 30 [--engine webkit] [--matrix] [--record]
//!   sortwatch init-config ./sortwatch.toml

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sortwatch_backend::{
    browser::{BrowserError, BrowserSession, FixtureBrowser},
    collector::{run_matrix, PaginatedCollector, SessionFactory},
    config::AuditConfig,
    events::TracingEventSink,
    models::{EngineKind, RunResult, Viewport},
    quality::{
        gates::{evaluate, GateReport, Verdict},
        history::JsonFileHistory,
        signals::{ApiCrossCheckSignal, ExternalSignals, SecuritySignal},
        summarize, QualityAggregator, QualityMetricsSnapshot,
    },
    validation::{validate_run, ValidationResult},
};

const DEMO_BASE_URL: &str = "https://demo.listing.local";

#[derive(Parser, Debug)]
#[command(name = "sortwatch")]
#[command(about = "Audit that a paginated listing is served newest-first")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate and score a serialized run, appending it to history
    Validate {
        /// RunResult JSON file
        run: PathBuf,

        /// SecuritySignal JSON file
        #[arg(long)]
        security: Option<PathBuf>,

        /// ApiCrossCheckSignal JSON file
        #[arg(long)]
        api: Option<PathBuf>,

        /// Score without appending to history
        #[arg(long)]
        dry_run: bool,
    },

    /// Summarise retained quality history
    History,

    /// Collect from a synthetic in-memory listing
    Demo {
        #[arg(long, default_value = "chromium")]
        engine: EngineKind,

        #[arg(long, default_value = "5")]
        pages: usize,

        #[arg(long, default_value = "30")]
        per_page: usize,

        /// Minutes between consecutive synthetic entries
        #[arg(long, default_value = "2")]
        gap_minutes: i64,

        /// Run every engine × viewport combination
        #[arg(long)]
        matrix: bool,

        /// Append the scored run to history
        #[arg(long)]
        record: bool,
    },

    /// Write the effective configuration as TOML
    InitConfig { path: PathBuf },
}

#[derive(Serialize)]
struct AuditOutput<'a> {
    run_id: String,
    engine: EngineKind,
    viewport: &'a str,
    collected: usize,
    target: usize,
    pages_visited: u32,
    shortfall: bool,
    validation: &'a ValidationResult,
    quality: &'a QualityMetricsSnapshot,
    gates: &'a GateReport,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sortwatch_backend=info,sortwatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenv::dotenv().ok();
    init_tracing();
    let config = AuditConfig::from_env()?;

    let verdict = match cli.command {
        Commands::Validate {
            run,
            security,
            api,
            dry_run,
        } => {
            let run: RunResult = read_json(&run)?;
            let signals = ExternalSignals {
                security: security.map(|p| read_json::<SecuritySignal>(&p)).transpose()?,
                api: api.map(|p| read_json::<ApiCrossCheckSignal>(&p)).transpose()?,
            };
            audit(&config, &run, &signals, !dry_run)?
        }
        Commands::History => {
            show_history(&config)?;
            Verdict::Pass
        }
        Commands::Demo {
            engine,
            pages,
            per_page,
            gap_minutes,
            matrix,
            record,
        } => {
            let factory = DemoFactory {
                pages,
                per_page,
                gap_minutes,
            };
            let mut config = config;
            config.target_url = FixtureBrowser::page_url(DEMO_BASE_URL, 1);
            if matrix {
                demo_matrix(&factory, &config, record).await?
            } else {
                demo_single(&factory, &config, engine, record).await?
            }
        }
        Commands::InitConfig { path } => {
            config
                .save(&path)
                .with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "wrote configuration");
            Verdict::Pass
        }
    };

    if verdict == Verdict::Fail {
        std::process::exit(1);
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
}

fn history_repo(config: &AuditConfig) -> Box<JsonFileHistory> {
    Box::new(JsonFileHistory::new(
        config.history.path.clone(),
        config.history.retention(),
    ))
}

/// Validate, score, gate and print one run.
fn audit(config: &AuditConfig, run: &RunResult, signals: &ExternalSignals, record: bool) -> Result<Verdict> {
    if run.records.is_empty() {
        bail!("run {} has no records to validate", run.run_id);
    }

    let validation = validate_run(run);
    let mut aggregator = QualityAggregator::new(history_repo(config))?;
    let snapshot = if record {
        aggregator.score_and_record(run, &validation, signals)?
    } else {
        aggregator.score(run, &validation, signals)
    };
    let gates = evaluate(&validation, &snapshot, &config.thresholds);

    let output = AuditOutput {
        run_id: run.run_id.to_string(),
        engine: run.engine,
        viewport: &run.viewport.name,
        collected: run.records.len(),
        target: run.target_count,
        pages_visited: run.pages_visited,
        shortfall: run.shortfall,
        validation: &validation,
        quality: &snapshot,
        gates: &gates,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    info!(
        accuracy = validation.sorting_accuracy.accuracy,
        completeness = validation.data_validation.completeness_ratio,
        overall = snapshot.overall.value,
        grade = %snapshot.overall.grade,
        verdict = %gates.overall,
        "audit complete"
    );
    for gate in gates.failures() {
        warn!(gate = %gate.name, value = gate.value, threshold = gate.threshold, "gate failed");
    }
    Ok(gates.overall)
}

fn show_history(config: &AuditConfig) -> Result<()> {
    let aggregator = QualityAggregator::new(history_repo(config))?;
    let summary = summarize(aggregator.history());
    println!("{}", serde_json::to_string_pretty(&summary)?);
    for snapshot in aggregator.history() {
        println!(
            "{}  {:>6.2}  {:<2}  {:?}",
            snapshot.timestamp.format("%Y-%m-%d %H:%M"),
            snapshot.overall.value,
            snapshot.overall.grade.as_str(),
            snapshot.overall.trend.overall
        );
    }
    Ok(())
}

// =============================================================================
// DEMO
// =============================================================================

struct DemoFactory {
    pages: usize,
    per_page: usize,
    gap_minutes: i64,
}

#[async_trait::async_trait]
impl SessionFactory for DemoFactory {
    async fn open(
        &self,
        _engine: EngineKind,
        _viewport: &Viewport,
    ) -> Result<Arc<dyn BrowserSession>, BrowserError> {
        Ok(Arc::new(FixtureBrowser::paged_listing(
            DEMO_BASE_URL,
            self.pages,
            self.per_page,
            Utc::now(),
            self.gap_minutes,
        )))
    }
}

async fn demo_single(
    factory: &DemoFactory,
    config: &AuditConfig,
    engine: EngineKind,
    record: bool,
) -> Result<Verdict> {
    let viewport = Viewport::desktop();
    let session = factory.open(engine, &viewport).await?;
    let collector = PaginatedCollector::for_engine(session, engine, config, Arc::new(TracingEventSink));
    let run = collector.collect(&config.target_url, viewport).await?;
    audit(config, &run, &ExternalSignals::default(), record)
}

/// One line per engine × viewport; with `record`, every collected run is
/// appended to history.
async fn demo_matrix(factory: &DemoFactory, config: &AuditConfig, record: bool) -> Result<Verdict> {
    let viewports = [Viewport::desktop(), Viewport::tablet(), Viewport::mobile()];
    let entries = run_matrix(factory, config, &EngineKind::ALL, &viewports, Arc::new(TracingEventSink)).await;

    let mut aggregator = QualityAggregator::new(history_repo(config))?;
    let mut worst = Verdict::Pass;
    for entry in &entries {
        match &entry.outcome {
            Ok(run) => {
                let validation = validate_run(run);
                let signals = ExternalSignals::default();
                let snapshot = if record {
                    aggregator.score_and_record(run, &validation, &signals)?
                } else {
                    aggregator.score(run, &validation, &signals)
                };
                let gates = evaluate(&validation, &snapshot, &config.thresholds);
                worst = worst.max(gates.overall);
                println!(
                    "{:<9} {:<8} records={:<4} accuracy={:>6.2} overall={:>6.2} grade={:<2} {}",
                    entry.engine,
                    entry.viewport.name,
                    run.records.len(),
                    validation.sorting_accuracy.accuracy,
                    snapshot.overall.value,
                    snapshot.overall.grade.as_str(),
                    gates.overall
                );
            }
            Err(e) => {
                worst = Verdict::Fail;
                println!("{:<9} {:<8} FAILED: {}", entry.engine, entry.viewport.name, e);
            }
        }
    }
    Ok(worst)
}
