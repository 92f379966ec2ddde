use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use gleaner_client::HttpSessionFactory;
use gleaner_core::sink::{SinkEvent, SinkReporter};
use gleaner_core::{
    JobPlan, JobSource, LocatorExtractor, PageProfile, Pipeline, PipelineConfig, RetryConfig,
    RunDate, RunFailure, RunSummary, SelectionMode, SessionFactory, TargetStore, TracingWorkerReporter,
    resolve_run_date,
};
use gleaner_db::{Database, DatabaseConfig, RecordRepository};

#[cfg(feature = "browser")]
const DEFAULT_BACKEND: &str = "browser";
#[cfg(not(feature = "browser"))]
const DEFAULT_BACKEND: &str = "http";

/// Profile used when `--profile` is not given.
const BUILTIN_PROFILE: &str = include_str!("../../../profiles/stock_report.json");

#[derive(Parser)]
#[command(name = "gleaner", version, about = "Rate-limited page field collector")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch field reports for a run date and store them
    Run(RunArgs),

    /// Show target, population and stored-record counts for a run date
    Status {
        /// Run date (YYYYMMDD); defaults to the latest date in target_urls
        #[arg(short = 'a', long = "date", env = "GLEANER_RUN_DATE")]
        date: Option<String>,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Run date (YYYYMMDD); defaults to the latest date in target_urls
    #[arg(short = 'a', long = "date", env = "GLEANER_RUN_DATE")]
    date: Option<String>,

    /// Which targets to fetch: only keys without a record, or every target
    #[arg(long, env = "GLEANER_MODE", default_value = "missing")]
    mode: SelectionMode,

    /// Number of concurrent page sessions (1-12)
    #[arg(long, env = "GLEANER_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Global request rate across all sessions
    #[arg(long, env = "GLEANER_QPS", default_value_t = 0.7)]
    qps: f64,

    /// Records per store write
    #[arg(long, env = "GLEANER_BATCH", default_value_t = 100)]
    batch: usize,

    /// Attempts per page, including the first (1-20)
    #[arg(long, env = "GLEANER_RETRIES", default_value_t = 3)]
    retries: u32,

    /// Navigation and readiness timeout in milliseconds
    #[arg(long, env = "GLEANER_TIMEOUT_MS", default_value_t = 25_000)]
    timeout_ms: u64,

    /// Show the browser window
    #[arg(long, default_value_t = false)]
    headful: bool,

    /// Page session backend
    #[arg(long, env = "GLEANER_BACKEND", value_enum, default_value = DEFAULT_BACKEND)]
    backend: Backend,

    /// Page profile with readiness markers and field locators [default: built-in stock_report]
    #[arg(long, env = "GLEANER_PROFILE")]
    profile: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Headless Chromium (requires the `browser` feature)
    Browser,
    /// Plain HTTP with CSS locators only
    Http,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Setup tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("gleaner=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => cmd_run(args).await,
        Commands::Status { date } => cmd_status(date.as_deref()).await,
    }
}

/// Open the database from DATABASE_URL and create missing tables.
async fn connect_db() -> Result<Database> {
    let config = DatabaseConfig::from_env()?;
    let db = Database::connect(&config)
        .await
        .with_context(|| format!("Failed to open database {}", config.url))?;
    db.migrate().await?;
    Ok(db)
}

fn load_profile(path: Option<&Path>, backend: Backend) -> Result<PageProfile> {
    let profile = match path {
        Some(path) => PageProfile::load(path)
            .with_context(|| format!("Failed to load page profile {}", path.display()))?,
        None => PageProfile::from_json("stock_report", BUILTIN_PROFILE)
            .context("Built-in page profile is invalid")?,
    };
    if backend == Backend::Http && profile.uses_xpath() {
        bail!(
            "Profile '{}' uses XPath locators, which the http backend cannot evaluate; use --backend browser",
            profile.name
        );
    }
    Ok(profile)
}

impl RunArgs {
    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::default()
            .with_workers(self.concurrency)
            .with_qps(self.qps)
            .with_batch_size(self.batch)
            .with_page_timeout(Duration::from_millis(self.timeout_ms))
            .with_retry(RetryConfig::default().with_max_attempts(self.retries))
    }
}

async fn cmd_run(args: RunArgs) -> Result<()> {
    let profile = load_profile(args.profile.as_deref(), args.backend)?;
    let config = args.pipeline_config();
    config.validate()?;

    let db = connect_db().await?;
    let targets = db.target_repo();

    let Some(run_date) = resolve_run_date(&targets, args.date.as_deref()).await? else {
        println!("❌ Cannot determine the run date (pass -a YYYYMMDD or load target_urls first)");
        return Ok(());
    };
    println!("▶ run_date = {run_date} / mode = {}", args.mode);

    let plan = JobSource::new(targets)
        .load_targets(run_date, args.mode)
        .await?;
    if plan.is_empty() {
        println!("{}", empty_plan_message(run_date, args.mode));
        db.close().await;
        return Ok(());
    }

    let store = db.record_repo();
    let finished = match args.backend {
        Backend::Http => match HttpSessionFactory::with_timeout(config.page_timeout) {
            Ok(factory) => Ok(execute(factory, store, profile, config, run_date, args.mode, plan).await),
            Err(e) => Err(e.into()),
        },
        Backend::Browser => {
            run_with_browser(args.headful, store, profile, config, run_date, args.mode, plan).await
        }
    };
    db.close().await;

    let (line, result) = conclude(finished?);
    println!("{line}");
    result
}

/// Final summary line, printed whether or not the run completed.
fn conclude(finished: Result<RunSummary, RunFailure>) -> (String, Result<()>) {
    match finished {
        Ok(summary) => (format!("🏁 Done / {summary}"), Ok(())),
        Err(failure) => (
            format!("🏁 Done / {}", failure.summary),
            Err(anyhow::Error::new(failure.error).context("Run aborted")),
        ),
    }
}

#[cfg(feature = "browser")]
async fn run_with_browser(
    headful: bool,
    store: RecordRepository,
    profile: PageProfile,
    config: PipelineConfig,
    run_date: RunDate,
    mode: SelectionMode,
    plan: JobPlan,
) -> Result<Result<RunSummary, RunFailure>> {
    use gleaner_client::{BrowserOptions, BrowserSessionFactory};

    let options = BrowserOptions {
        headful,
        ..BrowserOptions::default()
    };
    let factory = BrowserSessionFactory::launch(options)
        .await
        .context("Failed to start the browser")?;
    Ok(execute(factory, store, profile, config, run_date, mode, plan).await)
}

#[cfg(not(feature = "browser"))]
async fn run_with_browser(
    _headful: bool,
    _store: RecordRepository,
    _profile: PageProfile,
    _config: PipelineConfig,
    _run_date: RunDate,
    _mode: SelectionMode,
    _plan: JobPlan,
) -> Result<Result<RunSummary, RunFailure>> {
    bail!("This build has no browser backend; rebuild with `--features browser` or pass --backend http")
}

async fn execute<F: SessionFactory>(
    factory: F,
    store: RecordRepository,
    profile: PageProfile,
    config: PipelineConfig,
    run_date: RunDate,
    mode: SelectionMode,
    plan: JobPlan,
) -> Result<RunSummary, RunFailure> {
    let pipeline = Pipeline::new(factory, LocatorExtractor, store, profile, config)
        .with_reporters(TracingWorkerReporter, ConsoleReporter);
    pipeline.execute(run_date, mode, plan).await
}

async fn cmd_status(date: Option<&str>) -> Result<()> {
    let db = connect_db().await?;
    let targets = db.target_repo();

    let Some(run_date) = resolve_run_date(&targets, date).await? else {
        println!("No run date found (pass -a YYYYMMDD or load target_urls first)");
        return Ok(());
    };

    let locations = targets.target_locations(run_date).await?;
    let with_url = locations.iter().filter(|(_, url)| !url.trim().is_empty()).count();
    let population = targets.population_keys(run_date).await?.len();
    let recorded = db.record_repo().count(run_date).await?;
    let outstanding = JobSource::new(targets)
        .load_targets(run_date, SelectionMode::Missing)
        .await?;

    println!("Status for {run_date}:\n");
    println!("  targets     : {} ({with_url} with URL)", locations.len());
    println!("  population  : {population}");
    println!("  recorded    : {recorded}");
    println!(
        "  outstanding : {} ({} without URL)",
        outstanding.len(),
        outstanding.unresolved.len()
    );

    db.close().await;
    Ok(())
}

fn empty_plan_message(run_date: RunDate, mode: SelectionMode) -> String {
    match mode {
        SelectionMode::Missing => format!("✅ {run_date} nothing outstanding (mode=missing)"),
        SelectionMode::All => format!("⚠️ {run_date} no target URLs found (mode=all)"),
    }
}

/// Prints progress and failure lines to stdout.
struct ConsoleReporter;

impl SinkReporter for ConsoleReporter {
    fn report(&self, event: SinkEvent<'_>) {
        match event {
            SinkEvent::Progress {
                done,
                total,
                ok,
                ng,
            } => println!("✅ {done}/{total} / OK:{ok} NG:{ng}"),
            SinkEvent::JobFailed {
                done,
                total,
                key,
                error,
            } => println!("❌ {done}/{total} code:{key} err:{error}"),
            SinkEvent::Flushed { rows } => tracing::debug!(rows, "Batch written"),
            SinkEvent::FlushFailed { rows, error } => {
                tracing::error!(rows, %error, "Batch write failed");
            }
        }
    }
}
