//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.newsfacets.toml` files.

use crate::analysis::correlate::{CorrelateOptions, GroupSelector, DEFAULT_OVERLAP_THRESHOLD};
use crate::analysis::year::{ClassifyParams, DEFAULT_EARLIEST_YEAR, DEFAULT_MIN_COUNT, DEFAULT_MIN_FRACTION_DELTA};
use crate::cli::{Args, Command};
use crate::client::Endpoints;
use crate::error::FacetError;
use crate::pipeline::{CorrelateRequest, PipelineSettings};
use crate::search::enrich::DEFAULT_CONCURRENCY;
use crate::search::paginator::DEFAULT_MAX_DURATION_MS;
use crate::search::Budget;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = ".newsfacets.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Upstream API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Pagination budget.
    #[serde(default)]
    pub search: SearchConfig,

    /// Enrichment fan-out.
    #[serde(default)]
    pub enrich: EnrichConfig,

    /// Correlation defaults.
    #[serde(default)]
    pub correlate: CorrelateConfig,

    /// Year comparison defaults.
    #[serde(default)]
    pub year: YearConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Write results here instead of stdout.
    #[serde(default)]
    pub output: Option<String>,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Print JSON on a single line.
    #[serde(default)]
    pub compact: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_search_url")]
    pub search_url: String,

    #[serde(default = "default_enrich_url")]
    pub enrich_url: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            search_url: default_search_url(),
            enrich_url: default_enrich_url(),
            api_key_env: default_api_key_env(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_search_url() -> String {
    "https://api.ft.com/content/search/v1".to_string()
}

fn default_enrich_url() -> String {
    "https://api.ft.com/enrichedcontent".to_string()
}

fn default_api_key_env() -> String {
    "CAPI_KEY".to_string()
}

fn default_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Maximum search calls per pagination run.
    #[serde(default = "default_max_depth")]
    pub max_depth: i64,

    /// Time budget, checked between calls.
    #[serde(default = "default_max_duration_ms")]
    pub max_duration_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_duration_ms: default_max_duration_ms(),
        }
    }
}

fn default_max_depth() -> i64 {
    2
}

fn default_max_duration_ms() -> u64 {
    DEFAULT_MAX_DURATION_MS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichConfig {
    /// Number of concurrent enrichment calls.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelateConfig {
    /// Only articles of these genres are correlated.
    #[serde(default = "default_genres")]
    pub genres: Vec<String>,

    #[serde(default = "default_groups")]
    pub groups: Vec<GroupSelector>,

    /// Keys left out of every correlation, case-insensitive.
    #[serde(default)]
    pub ignore: Vec<String>,

    #[serde(default = "default_overlap_threshold")]
    pub concertina_overlap_threshold: f64,
}

impl Default for CorrelateConfig {
    fn default() -> Self {
        Self {
            genres: default_genres(),
            groups: default_groups(),
            ignore: Vec::new(),
            concertina_overlap_threshold: default_overlap_threshold(),
        }
    }
}

fn default_genres() -> Vec<String> {
    vec!["News".to_string(), "Opinion".to_string()]
}

fn default_groups() -> Vec<GroupSelector> {
    vec![GroupSelector::PrimaryThemes, GroupSelector::Abouts]
}

fn default_overlap_threshold() -> f64 {
    DEFAULT_OVERLAP_THRESHOLD
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YearConfig {
    #[serde(default = "default_min_count")]
    pub min_count: u64,

    #[serde(default = "default_min_fraction_delta")]
    pub min_fraction_delta: f64,

    /// First year of the full-range facet queries.
    #[serde(default = "default_earliest_year")]
    pub earliest_year: i32,
}

impl Default for YearConfig {
    fn default() -> Self {
        Self {
            min_count: default_min_count(),
            min_fraction_delta: default_min_fraction_delta(),
            earliest_year: default_earliest_year(),
        }
    }
}

fn default_min_count() -> u64 {
    DEFAULT_MIN_COUNT
}

fn default_min_fraction_delta() -> f64 {
    DEFAULT_MIN_FRACTION_DELTA
}

fn default_earliest_year() -> i32 {
    DEFAULT_EARLIEST_YEAR
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

    /// Try to load configuration from the current directory.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.newsfacets.toml` from `dir`.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given.
    pub fn merge_with_args(&mut self, args: &Args) {
        if let Some(concurrency) = args.concurrency {
            self.enrich.concurrency = concurrency;
        }
        if let Some(ref output) = args.output {
            self.general.output = Some(output.display().to_string());
        }
        if args.compact {
            self.general.compact = true;
        }
        if args.verbose {
            self.general.verbose = true;
        }

        match &args.command {
            Some(Command::Correlate(correlate)) => {
                if !correlate.genre.is_empty() {
                    self.correlate.genres = correlate.genre.clone();
                }
                if !correlate.group.is_empty() {
                    self.correlate.groups = correlate.group.clone();
                }
                if !correlate.ignore.is_empty() {
                    self.correlate.ignore = correlate.ignore.clone();
                }
                if let Some(threshold) = correlate.overlap_threshold {
                    self.correlate.concertina_overlap_threshold = threshold;
                }
            }
            Some(Command::YearClassify {
                min_count,
                min_fraction_delta,
                ..
            }) => {
                if let Some(min_count) = min_count {
                    self.year.min_count = *min_count;
                }
                if let Some(delta) = min_fraction_delta {
                    self.year.min_fraction_delta = *delta;
                }
            }
            _ => {}
        }
    }

    /// Check values that may have come from a config file.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.correlate.concertina_overlap_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            anyhow::bail!(
                "correlate.concertina_overlap_threshold must be in (0, 1], got {}",
                threshold
            );
        }
        let delta = self.year.min_fraction_delta;
        if !delta.is_finite() || delta < 0.0 {
            anyhow::bail!("year.min_fraction_delta must be a non-negative number, got {}", delta);
        }
        if self.enrich.concurrency == 0 {
            anyhow::bail!("enrich.concurrency must be at least 1");
        }
        Ok(())
    }

    /// Log level from the flags, falling back to `general.verbose`.
    pub fn log_level(&self, args: &Args) -> tracing::Level {
        if !args.quiet && self.general.verbose {
            tracing::Level::DEBUG
        } else {
            args.log_level()
        }
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            search_url: self.api.search_url.clone(),
            enrich_url: self.api.enrich_url.clone(),
        }
    }

    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> std::result::Result<String, FacetError> {
        std::env::var(&self.api.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| FacetError::MissingApiKey(self.api.api_key_env.clone()))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_seconds)
    }

    /// Pipeline settings derived from this configuration.
    pub fn settings(&self) -> PipelineSettings {
        PipelineSettings {
            budget: Budget {
                max_depth: self.search.max_depth,
                max_duration: Duration::from_millis(self.search.max_duration_ms),
            },
            correlate: CorrelateRequest {
                genres: self.correlate.genres.clone(),
                groups: self.correlate.groups.clone(),
                options: CorrelateOptions {
                    ignore: self.correlate.ignore.clone(),
                    overlap_threshold: self.correlate.concertina_overlap_threshold,
                },
            },
            classify: ClassifyParams {
                min_count: self.year.min_count,
                min_fraction_delta: self.year.min_fraction_delta,
            },
            earliest_year: self.year.earliest_year,
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
