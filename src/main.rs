//! newsfacets - news search aggregation and facet correlation
//!
//! A CLI tool that pages through a search API, enriches every hit via a
//! content API, and reports facet correlations and year-over-year facet
//! changes as JSON.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (the `{"err": ...}` JSON is still written)

mod analysis;
mod cli;
mod client;
mod config;
mod error;
mod models;
mod pipeline;
mod report;
mod search;
#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use cli::{Args, Command};
use client::{ApiClient, HttpTransport, ResultCache, TimingRecorder};
use config::{Config, CONFIG_FILE_NAME};
use indicatif::{ProgressBar, ProgressStyle};
use pipeline::{Aggregator, Outcome};
use search::{AnnotationLookup, Enricher};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    let (mut config, source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(config.log_level(&args));

    info!("newsfacets v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    log_config_source(&source);

    match run(args, config).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .newsfacets.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "{} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("Created {} with default settings.", CONFIG_FILE_NAME);
    Ok(())
}

/// Initialize logging at `level`. Logs go to stderr.
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

/// Run one command and write its JSON outcome. Returns the exit code.
async fn run(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();

    config.validate()?;

    let Some(command) = args.command.clone() else {
        anyhow::bail!("No command given");
    };
    let output = config.general.output.as_ref().map(PathBuf::from);
    let compact = config.general.compact;

    let timings = Arc::new(TimingRecorder::new());
    let cache = Arc::new(ResultCache::new());
    let aggregator = match build_aggregator(&config, cache.clone(), timings.clone()) {
        Ok(aggregator) => aggregator,
        Err(e) => {
            error!("{}", e);
            let rendered = report::render_json(&Outcome::<()>::from(Err(e)), compact)?;
            report::write_output(&rendered, output.as_deref())?;
            return Ok(1);
        }
    };

    let spinner = (!args.quiet).then(|| start_spinner(&command));
    let (rendered, ok) = dispatch(&aggregator, &command, compact).await?;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    report::write_output(&rendered, output.as_deref())?;

    if let Some(window) = args.timings {
        log_timings(&timings, window);
    }
    debug!("Result cache holds {} responses", cache.len());

    info!(
        "Finished in {:.1}s{}",
        start_time.elapsed().as_secs_f64(),
        if ok { "" } else { " with errors" }
    );
    Ok(if ok { 0 } else { 1 })
}

/// Wire the HTTP transport, shared stores and pipeline together.
fn build_aggregator(
    config: &Config,
    cache: Arc<ResultCache>,
    timings: Arc<TimingRecorder>,
) -> error::Result<Aggregator> {
    let api_key = config.api_key()?;
    let transport = HttpTransport::new(api_key, config.timeout())?;
    let client = Arc::new(ApiClient::new(
        Arc::new(transport),
        cache,
        timings,
        config.endpoints(),
    ));

    let enricher = Enricher::new(
        client.clone(),
        Arc::new(AnnotationLookup::new()),
        config.enrich.concurrency,
    );
    Ok(Aggregator::new(client, enricher, config.settings()))
}

/// Run `command` and render its outcome. The flag is false for `{err}` outcomes.
async fn dispatch(aggregator: &Aggregator, command: &Command, compact: bool) -> Result<(String, bool)> {
    let settings = aggregator.settings();
    match command {
        Command::Search(search) => finish(aggregator.search(&search.to_params()).await, compact),
        Command::Deeper(search) => finish(
            aggregator
                .search_deeper(&search.to_params(), search.budget(settings.budget))
                .await,
            compact,
        ),
        Command::Articles(search) => finish(
            aggregator
                .search_deeper_articles(&search.to_params(), search.budget(settings.budget))
                .await,
            compact,
        ),
        Command::Correlate(correlate) => finish(
            aggregator
                .correlate(
                    &correlate.search.to_params(),
                    correlate.search.budget(settings.budget),
                    &settings.correlate,
                )
                .await,
            compact,
        ),
        Command::Article { uuid } => finish(aggregator.get_article(uuid).await, compact),
        Command::YearTopics { year } => finish(aggregator.year_topics(*year).await, compact),
        Command::YearCompare { year1, year2 } => {
            finish(aggregator.compare_years(*year1, *year2).await, compact)
        }
        Command::YearClassify { year1, year2, .. } => {
            finish(aggregator.classify_years(*year1, *year2).await, compact)
        }
        Command::Facets { year } => finish(aggregator.all_facets(*year).await, compact),
        Command::FacetsByYear => finish(aggregator.facets_by_year().await, compact),
    }
}

fn finish<T: Serialize>(result: error::Result<T>, compact: bool) -> Result<(String, bool)> {
    if let Err(e) = &result {
        warn!("{}", e);
    }
    let outcome = Outcome::from(result);
    let ok = outcome.is_ok();
    Ok((report::render_json(&outcome, compact)?, ok))
}

fn start_spinner(command: &Command) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed}] {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(format!("Running {}", command_name(command)));
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Search(_) => "search",
        Command::Deeper(_) => "deeper",
        Command::Articles(_) => "articles",
        Command::Correlate(_) => "correlate",
        Command::Article { .. } => "article",
        Command::YearTopics { .. } => "year-topics",
        Command::YearCompare { .. } => "year-compare",
        Command::YearClassify { .. } => "year-classify",
        Command::Facets { .. } => "facets",
        Command::FacetsByYear => "facets-by-year",
    }
}

fn log_timings(timings: &TimingRecorder, window: usize) {
    for (method, summary) in timings.summarise(window) {
        info!(
            "{}: {} calls ({} total), mean {:.0}ms, min {}ms, max {}ms, {} not ok",
            method,
            summary.count,
            summary.total_count,
            summary.mean,
            summary.min,
            summary.max,
            summary.num_not_ok
        );
        for not_ok in &summary.statuses_not_ok {
            debug!("{}: status {} {}", method, not_ok.status, not_ok.status_text);
        }
    }
}

/// Where the configuration came from.
enum ConfigSource {
    File(PathBuf),
    Defaults,
    Unreadable(anyhow::Error),
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is set up, so the source is reported afterwards.
fn load_config(args: &Args) -> Result<(Config, ConfigSource)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, ConfigSource::File(config_path.clone())));
    }

    // Try default location
    Ok(match Config::load_default() {
        Ok(Some(config)) => (config, ConfigSource::File(PathBuf::from(CONFIG_FILE_NAME))),
        Ok(None) => (Config::default(), ConfigSource::Defaults),
        Err(e) => (Config::default(), ConfigSource::Unreadable(e)),
    })
}

fn log_config_source(source: &ConfigSource) {
    match source {
        ConfigSource::File(path) => info!("Loaded config from {}", path.display()),
        ConfigSource::Defaults => debug!("No config file found, using defaults"),
        ConfigSource::Unreadable(e) => warn!("Failed to load config: {:#}", e),
    }
}
