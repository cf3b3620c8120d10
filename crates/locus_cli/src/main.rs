mod config;
mod duration;
mod logging;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use locus_core::{ArticleDraft, ProducerRequest, ProducerStorage, RunMode};
use locus_producer::readiness::DEFAULT_SAMPLE_SIZE;
use locus_producer::{
    audit_readiness, build_fallback, prepare_draft, with_retry, BatchReport, DraftAssessor, HttpLinkChecker, Producer,
    ScheduledRunner, SourceLinkProber, WebhookAlertSink,
};
use locus_quality::{EvaluationContext, QualityEvaluator};
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use crate::config::ProducerArgs;
use crate::duration::HumanDuration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Produces quality-gated local articles", long_about = None)]
pub struct Cli {
    /// Storage backend: memory or sqlite
    #[arg(long, env = "LOCUS_STORAGE", default_value = "memory")]
    storage: String,
    #[arg(long, env = "SQLITE_DB_PATH")]
    db_path: Option<String>,
    #[arg(long, env = "LOCUS_MODEL", default_value = "dummy", help = "Generator to use. Available models: dummy (default), prompt-server")]
    model: String,
    #[arg(long, env = "LOCUS_MODEL_URL")]
    model_url: Option<String>,
    #[arg(long, env = "LOCUS_MODEL_API_KEY", hide_env_values = true)]
    model_api_key: Option<String>,
    /// Webhook that receives critical alerts for fatal runs
    #[arg(long, env = "ALERT_WEBHOOK_URL")]
    alert_webhook_url: Option<String>,
    /// Emit logs as JSON lines
    #[arg(long, env = "LOCUS_LOG_JSON")]
    log_json: bool,
    #[command(flatten)]
    producer: ProducerArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug, Clone)]
struct RequestArgs {
    #[arg(long)]
    topic: String,
    #[arg(long)]
    city: String,
    #[arg(long)]
    keyword: String,
    #[arg(long)]
    language: Option<String>,
}

impl RequestArgs {
    fn to_request(&self) -> ProducerRequest {
        ProducerRequest {
            topic: self.topic.clone(),
            city: self.city.clone(),
            keyword: self.keyword.clone(),
            language: self.language.clone(),
        }
    }
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Produce one article under the pipeline lock
    Produce {
        #[command(flatten)]
        request: RequestArgs,
    },
    /// Produce every case of an eval dataset
    Batch {
        /// JSON array of {"input": {"topic", "city", "keyword", "language"?}}
        #[arg(long)]
        dataset: PathBuf,
        /// Run in periodic mode with the specified interval (e.g. 1h, 30m, 1d, 1h15m30s)
        #[arg(long)]
        interval: Option<HumanDuration>,
    },
    /// Print the fallback article for a request and its quality report
    Fallback {
        #[command(flatten)]
        request: RequestArgs,
    },
    /// Score a draft JSON file against the current policy
    Evaluate {
        #[arg(long)]
        file: PathBuf,
    },
    /// Audit the published catalogue
    Readiness {
        #[arg(long, default_value_t = DEFAULT_SAMPLE_SIZE)]
        sample_size: usize,
    },
}

#[derive(Debug, Deserialize)]
struct DatasetCase {
    input: ProducerRequest,
}

fn load_dataset(path: &Path) -> Result<Vec<ProducerRequest>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading dataset {}", path.display()))?;
    let cases: Vec<DatasetCase> =
        serde_json::from_str(&raw).with_context(|| format!("parsing dataset {}", path.display()))?;
    if cases.is_empty() {
        bail!("dataset {} has no cases", path.display());
    }
    Ok(cases.into_iter().map(|c| c.input).collect())
}

async fn open_storage(cli: &Cli) -> Result<Arc<dyn ProducerStorage>> {
    let url = match cli.storage.as_str() {
        "sqlite" => cli.db_path.clone(),
        _ => None,
    };
    let storage = with_retry(
        "storage initialization",
        cli.producer.retry_max_attempts,
        cli.producer.retry_backoff(),
        || locus_storage::create_storage(&cli.storage, url.as_deref()),
    )
    .await
    .with_context(|| format!("opening {} storage", cli.storage))?;
    info!("💾 Storage initialized successfully (using {})", cli.storage);
    Ok(storage)
}

fn link_checker(cli: &Cli) -> Result<Arc<HttpLinkChecker>> {
    let timeout = std::time::Duration::from_millis(cli.producer.source_probe_timeout_ms);
    Ok(Arc::new(HttpLinkChecker::new(timeout)?))
}

async fn build_producer(cli: &Cli) -> Result<Arc<Producer>> {
    let storage = open_storage(cli).await?;
    let generator = locus_inference::create_model(locus_inference::Config {
        model: Some(cli.model.clone()),
        prompt_server: cli
            .producer
            .prompt_server(cli.model_url.clone(), cli.model_api_key.clone()),
    })?;
    info!("🧠 Generator initialized successfully (using {})", generator.name());

    Ok(Arc::new(Producer::new(
        generator,
        storage,
        link_checker(cli)?,
        cli.producer.producer_config(),
    )))
}

async fn build_runner(cli: &Cli) -> Result<ScheduledRunner> {
    let runner = ScheduledRunner::new(build_producer(cli).await?);
    match &cli.alert_webhook_url {
        Some(url) => {
            let timeout = std::time::Duration::from_millis(cli.producer.source_probe_timeout_ms);
            let sink = WebhookAlertSink::new(url, timeout).context("configuring alert webhook")?;
            info!("🚨 Critical alerts enabled ({:?})", sink);
            Ok(runner.with_alerts(Arc::new(sink)))
        }
        None => Ok(runner),
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn batch_summary(report: &BatchReport) -> serde_json::Value {
    json!({
        "holder": report.holder,
        "skipped": report.skipped,
        "produced": report.produced.iter().map(|o| json!({
            "runId": o.run_id,
            "articleId": o.article.id,
            "slug": o.article.slug,
            "scoreTotal": o.report.score_total,
            "usedFallback": o.used_fallback,
            "counters": o.counters,
        })).collect::<Vec<_>>(),
        "failed": report.failed.iter().map(|f| json!({
            "sourceKey": f.source_key,
            "error": f.error,
        })).collect::<Vec<_>>(),
    })
}

async fn run_batch(runner: &ScheduledRunner, requests: &[ProducerRequest], mode: RunMode) -> Result<BatchReport> {
    let report = runner.run(requests, mode).await?;
    print_json(&batch_summary(&report))?;
    Ok(report)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.log_json);

    match &cli.command {
        Commands::Produce { request } => {
            let runner = build_runner(&cli).await?;
            let report = run_batch(&runner, &[request.to_request()], RunMode::Once).await?;
            if let Some(failure) = report.failed.first() {
                bail!("production failed for {}: {}", failure.source_key, failure.error);
            }
        }
        Commands::Batch { dataset, interval } => {
            let requests = load_dataset(dataset)?;
            let runner = build_runner(&cli).await?;
            info!("📚 Loaded {} cases from {}", requests.len(), dataset.display());

            if let Some(interval) = interval {
                info!("Running in periodic mode with {}s interval", interval.0.as_secs());
                loop {
                    if let Err(e) = run_batch(&runner, &requests, RunMode::Periodic).await {
                        error!(error = %e, "scheduled batch failed");
                    }
                    info!("Waiting {}s before next batch", interval.0.as_secs());
                    tokio::time::sleep(interval.0).await;
                }
            }

            let report = run_batch(&runner, &requests, RunMode::Batch).await?;
            if !report.failed.is_empty() {
                bail!("{} of {} cases failed", report.failed.len(), requests.len());
            }
        }
        Commands::Fallback { request } => {
            let request = request.to_request();
            let evaluator = QualityEvaluator::new(cli.producer.quality_policy());
            let draft = build_fallback(&request, Utc::now(), None);
            let report = evaluator.evaluate(&draft, &EvaluationContext::default());
            print_json(&json!({ "article": draft, "qualityReport": report }))?;
        }
        Commands::Evaluate { file } => {
            let raw = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
            let draft: ArticleDraft =
                serde_json::from_str(&raw).with_context(|| format!("parsing draft {}", file.display()))?;
            let draft = prepare_draft(draft)?;

            let storage = open_storage(&cli).await?;
            let evaluator = QualityEvaluator::new(cli.producer.quality_policy());
            let config = cli.producer.producer_config();
            let prober = SourceLinkProber::new(link_checker(&cli)?, config.probe);
            let assessment = DraftAssessor::new(&evaluator, storage.as_ref(), &prober)
                .assess(draft)
                .await?;
            print_json(&json!({
                "structureSignature": assessment.signature,
                "qualityReport": assessment.report,
            }))?;
            if !assessment.report.passed {
                bail!("draft did not pass: {:?}", assessment.report.failure_codes);
            }
        }
        Commands::Readiness { sample_size } => {
            let storage = open_storage(&cli).await?;
            let report = audit_readiness(storage.as_ref(), &cli.producer.quality_policy(), *sample_size).await?;
            println!("{}", report.render());
            if !report.is_ready() {
                bail!("{} readiness checks failed", report.fail_count());
            }
        }
    }

    Ok(())
}
