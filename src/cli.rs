//! Command-line interface argument parsing.
//!
//! Flags here win over `.council-report.toml`; anything left unset falls
//! back to the config file, then to built-in defaults.

use clap::Parser;
use std::path::PathBuf;

/// council-report - network activity and treasury reports
///
/// Builds snapshot, window and council-period reports from chain state and
/// the event indexer.
///
/// Examples:
///   council-report --data chain.json --snapshot 4200000
///   council-report --data chain.json --start 4100000 --end 4200000 --format json
///   council-report --rpc-url http://127.0.0.1:9933 --indexer-url https://query.example/graphql --start 4100000
///   council-report --data chain.json --list-periods
///   council-report --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Report totals at a single block
    #[arg(long, value_name = "BLOCK", conflicts_with_all = ["start", "period", "list_periods"])]
    pub snapshot: Option<u64>,

    /// First block of a window report
    #[arg(long, value_name = "BLOCK", conflicts_with_all = ["period", "list_periods"])]
    pub start: Option<u64>,

    /// Last block of a window report (defaults to the chain head)
    #[arg(long, value_name = "BLOCK", requires = "start")]
    pub end: Option<u64>,

    /// Report over one council term, by elected council id
    #[arg(long, value_name = "ID", conflicts_with = "list_periods")]
    pub period: Option<String>,

    /// List known council terms and exit
    #[arg(long)]
    pub list_periods: bool,

    /// Offline dataset (JSON) serving chain state and indexer data
    #[arg(short, long, value_name = "FILE", env = "COUNCIL_REPORT_DATA")]
    pub data: Option<PathBuf>,

    /// Node JSON-RPC endpoint for chain state (requires --indexer-url)
    #[arg(long, value_name = "URL", env = "COUNCIL_REPORT_RPC_URL")]
    pub rpc_url: Option<String>,

    /// GraphQL query-node endpoint for indexer queries (requires --rpc-url)
    #[arg(long, value_name = "URL", env = "COUNCIL_REPORT_INDEXER_URL")]
    pub indexer_url: Option<String>,

    /// Output file path for the report (`-` for stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (text, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .council-report.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Maximum number of upstream reads in flight
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Retries for transient upstream failures
    #[arg(long, value_name = "NUM")]
    pub retries: Option<u32>,

    /// Indexer request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Accounts whose balances are tracked (comma-separated)
    #[arg(long, value_name = "ACCOUNTS", value_delimiter = ',')]
    pub track: Option<Vec<String>>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .council-report.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Plain-text summary (default)
    #[default]
    Text,
    /// JSON document
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        let modes = [
            self.snapshot.is_some(),
            self.start.is_some(),
            self.period.is_some(),
            self.list_periods,
        ];
        match modes.iter().filter(|m| **m).count() {
            0 => {
                return Err(
                    "Choose one of --snapshot, --start, --period or --list-periods".to_string(),
                )
            }
            1 => {}
            _ => return Err("Only one report mode can be used at a time".to_string()),
        }

        if let (Some(start), Some(end)) = (self.start, self.end) {
            if end < start {
                return Err(format!("--end {} is before --start {}", end, start));
            }
        }

        if let Some(ref period) = self.period {
            if period.trim().is_empty() {
                return Err("Council period id cannot be empty".to_string());
            }
        }

        if let Some(ref url) = self.indexer_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Indexer URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(ref url) = self.rpc_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("RPC URL must be an HTTP endpoint ('http://' or 'https://')".to_string());
            }
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref data) = self.data {
            if !data.is_file() {
                return Err(format!("Dataset does not exist: {}", data.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
