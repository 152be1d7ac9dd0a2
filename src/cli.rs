//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::analysis::GroupSelector;
use crate::search::{Budget, FacetSpec, SearchParams};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// newsfacets - search aggregation and facet correlation for news metadata
///
/// Queries the search API, enriches every hit through the content API,
/// and reports facet counts, co-occurrence correlations and year-over-year
/// changes as JSON.
///
/// Examples:
///   newsfacets search --query brexit --max-results 20
///   newsfacets correlate --constraint "topics:Brexit" --max-depth 5
///   newsfacets year-classify 2017 2018
///   newsfacets --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .newsfacets.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (errors only, no spinner)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Write the JSON result to FILE instead of stdout
    #[arg(short, long, value_name = "FILE", global = true)]
    pub output: Option<PathBuf>,

    /// Print JSON on a single line
    #[arg(long, global = true)]
    pub compact: bool,

    /// Log per-method call timings over the last N calls (0 = all)
    #[arg(long, value_name = "N", global = true)]
    pub timings: Option<usize>,

    /// Number of concurrent enrichment calls
    #[arg(long, value_name = "NUM", env = "CAPI_CONCURRENCE", global = true)]
    pub concurrency: Option<usize>,

    /// Generate a default .newsfacets.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// One page of search results, each item enriched
    Search(SearchArgs),

    /// Paginate within the depth and time budget
    Deeper(SearchArgs),

    /// Paginate and flatten to enriched articles
    Articles(SearchArgs),

    /// Paginate, enrich and correlate facets
    Correlate(CorrelateArgs),

    /// Fetch and merge one article
    Article {
        /// Article uuid
        uuid: String,
    },

    /// Facet counts for one calendar year
    YearTopics { year: i32 },

    /// Compare facet counts of two years
    YearCompare { year1: i32, year2: i32 },

    /// Classify facet changes between two years
    YearClassify {
        year1: i32,
        year2: i32,

        /// Drop entries whose larger count is below this
        #[arg(long, value_name = "COUNT")]
        min_count: Option<u64>,

        /// Smallest relative change that counts as a change
        #[arg(long, value_name = "FRACTION", allow_negative_numbers = true)]
        min_fraction_delta: Option<f64>,
    },

    /// Facet counts from the earliest year to today
    Facets {
        /// Restrict to one calendar year
        #[arg(long)]
        year: Option<i32>,
    },

    /// Facet counts for every year since the earliest year
    FacetsByYear,
}

/// Search options shared by the search-based commands.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct SearchArgs {
    /// Free-text query
    #[arg(long, value_name = "TEXT")]
    pub query: Option<String>,

    /// `field:value` constraint ANDed onto the query (repeatable)
    #[arg(long, value_name = "CONSTRAINT")]
    pub constraint: Vec<String>,

    /// Results per page (clamped to 1..=100)
    #[arg(long, value_name = "COUNT", allow_negative_numbers = true)]
    pub max_results: Option<i64>,

    /// Offset of the first result
    #[arg(long, value_name = "OFFSET")]
    pub offset: Option<u32>,

    /// Result aspect to request (repeatable)
    #[arg(long, value_name = "ASPECT")]
    pub aspect: Vec<String>,

    /// Facet to count (repeatable)
    #[arg(long, value_name = "FACET")]
    pub facet: Vec<String>,

    /// Maximum number of search calls
    #[arg(long, value_name = "DEPTH", allow_negative_numbers = true)]
    pub max_depth: Option<i64>,

    /// Stop paginating once this much time has passed
    #[arg(long, value_name = "MS")]
    pub max_duration_ms: Option<u64>,
}

impl SearchArgs {
    pub fn to_params(&self) -> SearchParams {
        SearchParams {
            query_string: self.query.clone(),
            max_results: self.max_results,
            offset: self.offset,
            aspects: (!self.aspect.is_empty()).then(|| self.aspect.clone()),
            constraints: self.constraint.clone(),
            facets: (!self.facet.is_empty()).then(|| FacetSpec {
                names: self.facet.clone(),
                ..Default::default()
            }),
        }
    }

    /// `base` with any budget flags applied.
    pub fn budget(&self, base: Budget) -> Budget {
        Budget {
            max_depth: self.max_depth.unwrap_or(base.max_depth),
            max_duration: self
                .max_duration_ms
                .map(Duration::from_millis)
                .unwrap_or(base.max_duration),
        }
    }
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct CorrelateArgs {
    #[command(flatten)]
    pub search: SearchArgs,

    /// Genre to keep (repeatable)
    #[arg(long, value_name = "GENRE")]
    pub genre: Vec<String>,

    /// Key group to correlate (repeatable)
    #[arg(long, value_name = "GROUP", value_enum)]
    pub group: Vec<GroupSelector>,

    /// Key to leave out, case-insensitive (repeatable)
    #[arg(long, value_name = "KEY")]
    pub ignore: Vec<String>,

    /// Uuid overlap fraction for the concertina merge
    #[arg(long, value_name = "FRACTION")]
    pub overlap_threshold: Option<f64>,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        let Some(command) = &self.command else {
            return Err("A command is required (try --help)".to_string());
        };

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        match command {
            Command::Correlate(args) => {
                if let Some(threshold) = args.overlap_threshold {
                    if !(threshold > 0.0 && threshold <= 1.0) {
                        return Err("Overlap threshold must be in (0, 1]".to_string());
                    }
                }
            }
            Command::YearClassify {
                min_fraction_delta: Some(delta),
                ..
            } => {
                if !delta.is_finite() || *delta < 0.0 {
                    return Err("Min fraction delta must be a non-negative number".to_string());
                }
            }
            Command::Article { uuid } if uuid.trim().is_empty() => {
                return Err("Article uuid must not be empty".to_string());
            }
            _ => {}
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
