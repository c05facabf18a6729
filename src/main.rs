//! council-report - network activity and treasury reports
//!
//! A CLI tool that reads chain state and the event indexer and generates
//! snapshot, window and council-period reports.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (upstream failure, config, unreadable dataset, etc.)
//!   3 - Caller error (unknown block or period, malformed window)

mod cli;
mod config;

use anyhow::{anyhow, Context, Result};
use cli::{Args, OutputFormat};
use config::{Config, DEFAULT_CONFIG_FILE};
use council_report::chain::{ChainSource, RpcChain};
use council_report::fixture::{Dataset, FixtureSource};
use council_report::indexer::{GraphQlIndexer, IndexerSource};
use council_report::models::{CouncilPeriod, Report};
use council_report::report::{generate_json_report, generate_text_report, write_output};
use council_report::{ReportEngine, ReportError, ReportRequest};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

const EXIT_RUNTIME: i32 = 1;
const EXIT_CALLER: i32 = 3;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(EXIT_CALLER);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    let (mut config, origin) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(EXIT_RUNTIME);
        }
    };
    config.merge_with_args(&args);

    init_logging(config.log_level(&args));

    info!("council-report v{}", env!("CARGO_PKG_VERSION"));
    origin.log();
    debug!("Arguments: {:?}", args);

    match run(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Report failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(EXIT_RUNTIME);
        }
    }
}

/// Handle --init-config: generate a default .council-report.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(EXIT_RUNTIME);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to set the dataset or live endpoints, and tracked accounts.");
    Ok(())
}

/// Initialize logging at the resolved verbosity.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the requested report. Returns the process exit code.
async fn run(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();

    let engine = build_engine(&config)?;
    let format = config.general.format;
    let output = config.general.output.clone();
    let to_stdout = output == "-";
    let chatty = !args.quiet && !to_stdout;

    if args.list_periods {
        let periods = match engine.list_periods().await {
            Ok(periods) => periods,
            Err(e) => return report_failure(e),
        };
        let content = match format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&periods).context("Failed to serialize periods")?
            }
            OutputFormat::Text => periods_text(&periods),
        };
        write_output(&content, Path::new(&output))?;
        return Ok(0);
    }

    let request = request_from_args(&args)?;
    if chatty {
        println!("📊 Generating {}...", describe(&request));
    }

    let report = match engine.generate(&request).await {
        Ok(report) => report,
        Err(e) => return report_failure(e),
    };

    let content = match format {
        OutputFormat::Json => generate_json_report(&report)?,
        OutputFormat::Text => generate_text_report(&report),
    };
    write_output(&content, Path::new(&output))?;

    if chatty {
        print_summary(&report);
        println!("   Duration: {:.1}s", start_time.elapsed().as_secs_f64());
        println!("\n✅ Report saved to: {}", output);
    }

    Ok(0)
}

/// Caller mistakes get their own exit code; everything else propagates.
fn report_failure(e: ReportError) -> Result<i32> {
    if e.is_caller_error() {
        error!("Report rejected: {}", e);
        eprintln!("\n⛔ {}", e);
        return Ok(EXIT_CALLER);
    }
    Err(e.into())
}

fn request_from_args(args: &Args) -> Result<ReportRequest> {
    if let Some(block) = args.snapshot {
        return Ok(ReportRequest::Snapshot { block });
    }
    if let Some(start) = args.start {
        return Ok(ReportRequest::Window {
            start,
            end: args.end,
        });
    }
    if let Some(ref id) = args.period {
        return Ok(ReportRequest::Period { id: id.clone() });
    }
    Err(anyhow!("No report mode selected"))
}

fn describe(request: &ReportRequest) -> String {
    match request {
        ReportRequest::Snapshot { block } => format!("snapshot at block #{}", block),
        ReportRequest::Window { start, end: Some(end) } => {
            format!("window report #{}..#{}", start, end)
        }
        ReportRequest::Window { start, end: None } => {
            format!("window report #{}..head", start)
        }
        ReportRequest::Period { id } => format!("report for council period {}", id),
    }
}

/// Wire the chain and indexer sources into an engine.
///
/// Both sources are live endpoints or both come from the dataset.
fn build_engine(config: &Config) -> Result<ReportEngine> {
    let timeout = config.indexer.timeout_seconds;

    let (chain, indexer): (Arc<dyn ChainSource>, Arc<dyn IndexerSource>) =
        match (config.rpc_url(), config.indexer_url()) {
            (Some(rpc_url), Some(indexer_url)) => {
                info!("Using chain RPC at: {}", rpc_url);
                info!("Using indexer at: {}", indexer_url);
                let chain: Arc<dyn ChainSource> = Arc::new(RpcChain::new(rpc_url, timeout)?);
                let indexer: Arc<dyn IndexerSource> =
                    Arc::new(GraphQlIndexer::new(indexer_url, timeout)?);
                (chain, indexer)
            }
            (None, None) => {
                let fixture_path = config.fixture_path().ok_or_else(|| {
                    anyhow!(
                        "No data source configured. Pass --data <FILE>, or both --rpc-url and --indexer-url"
                    )
                })?;
                info!("Loading dataset from: {}", fixture_path.display());
                let fixture = Arc::new(FixtureSource::new(Dataset::load(&fixture_path)?));
                let chain: Arc<dyn ChainSource> = fixture.clone();
                let indexer: Arc<dyn IndexerSource> = fixture;
                (chain, indexer)
            }
            (Some(_), None) => {
                return Err(anyhow!(
                    "--rpc-url needs --indexer-url: chain state and indexer data must come from the same network"
                ))
            }
            (None, Some(_)) => {
                return Err(anyhow!(
                    "--indexer-url needs --rpc-url: chain state and indexer data must come from the same network"
                ))
            }
        };

    if config.rpc_url().is_some() && config.fixture_path().is_some() {
        warn!("Live endpoints configured, ignoring dataset");
    }

    Ok(ReportEngine::new(chain, indexer, config.to_settings()))
}

/// Where the configuration came from, logged once logging is up.
enum ConfigOrigin {
    File(PathBuf),
    Defaults,
    Fallback(String),
}

impl ConfigOrigin {
    fn log(&self) {
        match self {
            ConfigOrigin::File(path) => info!("Loaded config from {}", path.display()),
            ConfigOrigin::Defaults => debug!("No config file found, using defaults"),
            ConfigOrigin::Fallback(e) => warn!("Failed to load config: {}", e),
        }
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<(Config, ConfigOrigin)> {
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, ConfigOrigin::File(config_path.clone())));
    }

    Ok(match Config::load_default() {
        Ok(Some(config)) => (config, ConfigOrigin::File(PathBuf::from(DEFAULT_CONFIG_FILE))),
        Ok(None) => (Config::default(), ConfigOrigin::Defaults),
        Err(e) => (Config::default(), ConfigOrigin::Fallback(format!("{:#}", e))),
    })
}

fn periods_text(periods: &[CouncilPeriod]) -> String {
    if periods.is_empty() {
        return "No council periods found.".to_string();
    }

    periods
        .iter()
        .map(|p| match p.ended_at_block {
            Some(end) => format!("{:>6}  #{} .. #{}", p.id, p.elected_at_block, end),
            None => format!("{:>6}  #{} .. (in office)", p.id, p.elected_at_block),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn print_summary(report: &Report) {
    println!("\n📋 Summary:");
    match report {
        Report::Snapshot(snapshot) => {
            println!("   Block: #{}", snapshot.block.number);
            println!("   Total issuance: {} JOY", snapshot.supply.total_issuance.round_dp(2));
            println!("   Council size: {}", snapshot.council_size);
        }
        Report::Window(window) => {
            println!(
                "   Blocks: #{} .. #{}",
                window.window.start.number, window.window.end.number
            );
            println!("   Issuance change: {} JOY", window.issuance.change.round_dp(2));
            println!(
                "   Proposals: {} (✅ {} passed | ❌ {} rejected)",
                window.proposals.summary.total,
                window.proposals.summary.passed,
                window.proposals.summary.rejected
            );
        }
        Report::Period(period) => {
            println!("   Council period: {}", period.period.id);
            println!(
                "   Blocks: #{} .. #{}",
                period.report.window.start.number, period.report.window.end.number
            );
            println!("   Proposals: {}", period.report.proposals.summary.total);
        }
    }
}
