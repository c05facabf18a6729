//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.council-report.toml` files.

use crate::cli::{Args, OutputFormat};
use anyhow::{Context, Result};
use council_report::retry::RetryPolicy;
use council_report::units::DEFAULT_DECIMALS;
use council_report::report::DEFAULT_INITIAL_SUPPLY;
use council_report::EngineSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = ".council-report.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Indexer endpoint settings.
    #[serde(default)]
    pub indexer: IndexerConfig,

    /// Fetch concurrency and retry settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Chain constants.
    #[serde(default)]
    pub chain: ChainConfig,

    /// Offline dataset.
    #[serde(default)]
    pub data: DataConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Report destination; `-` writes to stdout.
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default)]
    pub format: OutputFormat,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            format: OutputFormat::default(),
            verbose: false,
        }
    }
}

fn default_output() -> String {
    "-".to_string()
}

/// Query-node settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// GraphQL endpoint. Empty means indexer data comes from the dataset.
    #[serde(default)]
    pub url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Items fetched per list request.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_seconds: default_timeout(),
            page_size: default_page_size(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_page_size() -> usize {
    1000
}

/// Fetch pool and backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum upstream reads in flight per report.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            retries: default_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_concurrency() -> usize {
    8
}

fn default_retries() -> u32 {
    RetryPolicy::default().max_retries
}

fn default_base_delay_ms() -> u64 {
    RetryPolicy::default().base_delay_ms
}

fn default_max_delay_ms() -> u64 {
    RetryPolicy::default().max_delay_ms
}

/// Chain endpoint and the constants the reports depend on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Node JSON-RPC endpoint. Empty means chain state comes from the dataset.
    #[serde(default)]
    pub url: String,

    /// Decimal places of the native token.
    #[serde(default = "default_decimals")]
    pub decimals: u32,

    /// Supply at genesis in whole tokens.
    #[serde(default = "default_initial_supply")]
    pub initial_supply: u64,

    /// Accounts whose balances are reported, e.g. exchange wallets.
    #[serde(default)]
    pub tracked_accounts: Vec<String>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            decimals: default_decimals(),
            initial_supply: default_initial_supply(),
            tracked_accounts: Vec::new(),
        }
    }
}

fn default_decimals() -> u32 {
    DEFAULT_DECIMALS
}

fn default_initial_supply() -> u64 {
    DEFAULT_INITIAL_SUPPLY
}

/// Offline dataset settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataConfig {
    /// JSON dataset serving chain state (and indexer data without a URL).
    #[serde(default)]
    pub fixture: String,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence; only explicitly given values override.
    pub fn merge_with_args(&mut self, args: &Args) {
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if let Some(format) = args.format {
            self.general.format = format;
        }
        if args.verbose {
            self.general.verbose = true;
        }

        if let Some(ref url) = args.rpc_url {
            self.chain.url = url.clone();
        }
        if let Some(ref url) = args.indexer_url {
            self.indexer.url = url.clone();
        }
        if let Some(timeout) = args.timeout {
            self.indexer.timeout_seconds = timeout;
        }

        if let Some(concurrency) = args.concurrency {
            self.engine.concurrency = concurrency;
        }
        if let Some(retries) = args.retries {
            self.engine.retries = retries;
        }

        if let Some(ref accounts) = args.track {
            self.chain.tracked_accounts = accounts.clone();
        }

        if let Some(ref data) = args.data {
            self.data.fixture = data.display().to_string();
        }
    }

    /// Engine settings derived from this configuration.
    pub fn to_settings(&self) -> EngineSettings {
        EngineSettings {
            decimals: self.chain.decimals,
            initial_supply: self.chain.initial_supply,
            tracked_accounts: self.chain.tracked_accounts.clone(),
            concurrency: self.engine.concurrency.max(1),
            retry: RetryPolicy {
                max_retries: self.engine.retries,
                base_delay_ms: self.engine.base_delay_ms,
                max_delay_ms: self.engine.max_delay_ms,
                ..RetryPolicy::default()
            },
            page_size: self.indexer.page_size.max(1),
        }
    }

    /// Configured GraphQL endpoint, if any.
    pub fn indexer_url(&self) -> Option<&str> {
        Some(self.indexer.url.trim()).filter(|url| !url.is_empty())
    }

    /// Configured node RPC endpoint, if any.
    pub fn rpc_url(&self) -> Option<&str> {
        Some(self.chain.url.trim()).filter(|url| !url.is_empty())
    }

    /// Log level from the command line, falling back to `[general] verbose`.
    pub fn log_level(&self, args: &Args) -> tracing::Level {
        if !args.quiet && self.general.verbose {
            tracing::Level::DEBUG
        } else {
            args.log_level()
        }
    }

    /// Configured dataset path, if any.
    pub fn fixture_path(&self) -> Option<PathBuf> {
        Some(self.data.fixture.trim())
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.output, "-");
        assert_eq!(config.engine.concurrency, 8);
        assert_eq!(config.chain.decimals, 10);
        assert!(config.indexer_url().is_none());
        assert!(config.rpc_url().is_none());
        assert!(config.fixture_path().is_none());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output = "report.json"
format = "json"

[indexer]
url = "https://query.example/graphql"
page_size = 500

[engine]
retries = 5

[chain]
url = "http://127.0.0.1:9933"
tracked_accounts = ["5Mexc", "5Gate"]
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.output, "report.json");
        assert_eq!(config.general.format, OutputFormat::Json);
        assert_eq!(config.indexer_url(), Some("https://query.example/graphql"));
        assert_eq!(config.indexer.timeout_seconds, 30);
        assert_eq!(config.rpc_url(), Some("http://127.0.0.1:9933"));

        let settings = config.to_settings();
        assert_eq!(settings.page_size, 500);
        assert_eq!(settings.retry.max_retries, 5);
        assert_eq!(settings.retry.base_delay_ms, 200);
        assert_eq!(settings.tracked_accounts, vec!["5Mexc", "5Gate"]);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[data]\nfixture = \"chain.json\"").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.fixture_path(), Some(PathBuf::from("chain.json")));

        assert!(Config::load(Path::new("/nonexistent/.council-report.toml")).is_err());
    }

    #[test]
    fn test_merge_with_args() {
        let mut config: Config = toml::from_str("[engine]\nconcurrency = 2\nretries = 1\n").unwrap();
        let args = Args::try_parse_from([
            "council-report",
            "--snapshot",
            "5",
            "--concurrency",
            "16",
            "--track",
            "5Abc",
        ])
        .unwrap();

        config.merge_with_args(&args);
        assert_eq!(config.engine.concurrency, 16);
        assert_eq!(config.engine.retries, 1);
        assert_eq!(config.chain.tracked_accounts, vec!["5Abc"]);
    }

    #[test]
    fn test_verbose_setting_sets_log_level() {
        let config: Config = toml::from_str("[general]\nverbose = true\n").unwrap();
        let args = Args::try_parse_from(["council-report", "--snapshot", "5"]).unwrap();
        assert_eq!(config.log_level(&args), tracing::Level::DEBUG);

        let quiet = Args::try_parse_from(["council-report", "--snapshot", "5", "-q"]).unwrap();
        assert_eq!(config.log_level(&quiet), tracing::Level::ERROR);

        assert_eq!(Config::default().log_level(&args), tracing::Level::INFO);
    }

    #[test]
    fn test_rpc_url_from_args() {
        let mut config = Config::default();
        let args = Args::try_parse_from([
            "council-report",
            "--snapshot",
            "5",
            "--rpc-url",
            "http://node.example:9933",
        ])
        .unwrap();

        config.merge_with_args(&args);
        assert_eq!(config.rpc_url(), Some("http://node.example:9933"));
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[engine]"));
        assert!(toml_str.contains("[chain]"));

        let reparsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(reparsed.engine.concurrency, 8);
    }
}
