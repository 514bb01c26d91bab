use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use pricecache::config::Config;
use serde::Deserialize;
use tracing::level_filters::LevelFilter;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Outputs the lookup results as JSON.
    Json,
    /// Outputs one line per looked up item.
    Pretty,
    /// Outputs the lookup results as a table.
    Compact,
}

/// A command line interface to a price cache.
///
/// Prices are served from the table in the `service` section of the configuration file, after
/// a simulated latency, and are cached according to the `cache` section.
#[derive(Clone, Parser, Debug)]
#[command(author, version, about, long_about)]
pub struct Cli {
    /// Path to your configuration file.
    #[arg(long, short, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// The output format.
    #[arg(long, global = true, value_enum, default_value = "pretty")]
    pub format: OutputFormat,

    /// The severity level of logging output.
    ///
    /// Overrides the level of the configuration file.
    /// Possible values: off, error, warn, info, debug, trace
    #[arg(long, global = true)]
    pub log_level: Option<LevelFilter>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Subcommand, Debug)]
pub enum Command {
    /// Looks up the price of a single item.
    Price {
        /// The item to look up.
        item_code: String,
    },
    /// Looks up the prices of several items at once.
    ///
    /// By default, items that fail are left out and prices are listed in the order their
    /// lookups completed.
    Prices {
        /// The items to look up.
        #[arg(required = true)]
        item_codes: Vec<String>,
        /// Reports the outcome of every item, in the order they were given.
        #[arg(long, conflicts_with = "strict")]
        detailed: bool,
        /// Fails if any of the items fails.
        #[arg(long)]
        strict: bool,
    },
    /// Looks up the prices of several items repeatedly, to watch cache hits and expiry.
    Replay {
        /// The items to look up.
        #[arg(required = true)]
        item_codes: Vec<String>,
        /// How many times to look up the items.
        #[arg(long, default_value_t = 5)]
        rounds: usize,
        /// How long to wait between rounds.
        #[arg(long, value_parser = humantime::parse_duration, default_value = "500ms")]
        interval: Duration,
    },
}

/// Configures the simulated price service.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// How long every lookup takes.
    ///
    /// Defaults to `50ms`.
    #[serde(with = "humantime_serde")]
    pub latency: Duration,
    /// The known prices. Looking up any other item fails with "not found".
    pub prices: BTreeMap<String, f64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(50),
            prices: BTreeMap::new(),
        }
    }
}

/// The configuration file, which extends the cache [`Config`] by the `service` section.
#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct ConfigFile {
    #[serde(flatten)]
    pub config: Config,
    pub service: ServiceConfig,
}

impl ConfigFile {
    pub fn get(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let buf = fs::read_to_string(path).with_context(|| {
            format!("Could not read configuration file at {}", path.display())
        })?;
        Self::parse(&buf)
    }

    pub fn parse(buf: &str) -> Result<Self> {
        if buf.trim().is_empty() {
            bail!("config file empty");
        }
        serde_yaml::from_str(buf).context("Could not parse configuration file")
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub command: Command,
    pub config: ConfigFile,
    pub output_format: OutputFormat,
}

impl Settings {
    pub fn get() -> Result<Self> {
        Self::from_cli(Cli::parse())
    }

    fn from_cli(cli: Cli) -> Result<Self> {
        let mut config = ConfigFile::get(cli.config.as_deref())?;
        if let Some(level) = cli.log_level {
            config.config.logging.level = level;
        }

        Ok(Self {
            command: cli.command,
            config,
            output_format: cli.format,
        })
    }
}
