//! Tender Bot
//!
//! Extracts tender details from Mercado Público for a batch of identifiers
//! and writes them as JSON and/or CSV.

mod input;
mod summary;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tender_extraction::{
    CancellationToken, CsvSink, DocumentDownloader, EngineConfig, ExtractionEngine,
    FailureCsvSink, HttpFetcher, JsonSink, NoopLauncher, RenderLauncher, ResultSink, RunOptions,
    TenderPageParser,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_JSON_OUTPUT: &str = "extracted_tenders.json";
const DEFAULT_CSV_OUTPUT: &str = "extracted_tenders.csv";

#[derive(Parser, Debug)]
#[command(name = "tender-bot")]
#[command(about = "Extract tender details from Mercado Público")]
struct Cli {
    /// Tender identifiers, e.g. 1234-567-L123
    identifiers: Vec<String>,

    /// File with one identifier per line (`#` starts a comment)
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Write successful records as JSON
    #[arg(long, value_name = "FILE")]
    json: Option<PathBuf>,

    /// Write successful records as CSV
    #[arg(long, value_name = "FILE")]
    csv: Option<PathBuf>,

    /// Write failed identifiers as CSV
    #[arg(long, value_name = "FILE")]
    failures: Option<PathBuf>,

    /// Maximum tenders in flight
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Seconds between successive requests
    #[arg(long, value_name = "SECONDS")]
    delay: Option<f64>,

    /// Per-attempt timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<f64>,

    /// Retries per strategy after a transient failure
    #[arg(long)]
    retries: Option<u32>,

    /// Portal base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Never fall back to a headless browser
    #[arg(long)]
    no_render: bool,

    /// Extract repeated identifiers only once
    #[arg(long)]
    dedupe: bool,

    /// Save each tender's attached documents under DIR/<id>/
    #[arg(long, value_name = "DIR")]
    download_dir: Option<PathBuf>,
}

impl Cli {
    /// Environment config with flags applied on top.
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = EngineConfig::from_env().context("Invalid TENDER_* environment")?;

        if let Some(max) = self.max_concurrent {
            config.max_concurrent = max;
        }
        if let Some(delay) = self.delay {
            config.request_delay_seconds = delay;
        }
        if let Some(timeout) = self.timeout {
            config.page_timeout_seconds = timeout;
        }
        if let Some(retries) = self.retries {
            config.max_retries = retries;
        }
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if self.no_render {
            config.render_fallback = false;
        }
        if self.dedupe {
            config.dedupe_identifiers = true;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Output files; both defaults when none were requested.
    fn outputs(&self) -> (Option<PathBuf>, Option<PathBuf>) {
        if self.json.is_none() && self.csv.is_none() {
            return (
                Some(PathBuf::from(DEFAULT_JSON_OUTPUT)),
                Some(PathBuf::from(DEFAULT_CSV_OUTPUT)),
            );
        }
        (self.json.clone(), self.csv.clone())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tender_extraction=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let cli = Cli::parse();
    let config = cli.engine_config()?;

    let identifiers = input::collect_identifiers(&cli.identifiers, cli.input.as_deref())?;
    if identifiers.is_empty() {
        bail!("No tender identifiers given; pass them as arguments or with --input");
    }

    start(&cli, config, identifiers).await
}

#[cfg(feature = "chromium")]
async fn start(cli: &Cli, config: EngineConfig, identifiers: Vec<String>) -> Result<()> {
    if config.render_fallback {
        let launcher = tender_extraction::ChromiumLauncher::new();
        return run(cli, config, launcher, identifiers).await;
    }
    run(cli, config, NoopLauncher, identifiers).await
}

#[cfg(not(feature = "chromium"))]
async fn start(cli: &Cli, config: EngineConfig, identifiers: Vec<String>) -> Result<()> {
    run(cli, static_only(config), NoopLauncher, identifiers).await
}

/// Without a browser backend the rendered fallback is switched off, so
/// pages that lack fields keep their `parse_insufficient` kind.
#[cfg_attr(feature = "chromium", allow(dead_code))]
fn static_only(mut config: EngineConfig) -> EngineConfig {
    if config.render_fallback {
        tracing::warn!("Built without the chromium feature; rendered fallback is disabled");
        config.render_fallback = false;
    }
    config
}

async fn run<L: RenderLauncher>(
    cli: &Cli,
    config: EngineConfig,
    launcher: L,
    identifiers: Vec<String>,
) -> Result<()> {
    let fetcher = HttpFetcher::new().context("Failed to build HTTP client")?;
    let downloader = cli
        .download_dir
        .as_ref()
        .map(|dir| DocumentDownloader::from_config(fetcher.clone(), dir, &config));
    let engine = ExtractionEngine::new(config, fetcher, launcher, TenderPageParser::new())
        .context("Failed to create extraction engine")?;

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, cancelling run");
                cancel.cancel();
            }
        }
    });

    tracing::info!(count = identifiers.len(), "Extracting tenders");
    let extracted = engine
        .extract_many_with(&identifiers, RunOptions::new().with_cancel(cancel))
        .await;
    interrupt.abort();
    // Release the browser before surfacing any run error
    engine.shutdown().await?;
    let report = extracted?;

    let (json, csv) = cli.outputs();
    if let Some(path) = json {
        JsonSink::new()
            .write_to_path(&report, &path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    if let Some(path) = csv {
        CsvSink::new()
            .write_to_path(&report, &path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    if let Some(path) = &cli.failures {
        FailureCsvSink::new()
            .write_to_path(&report, path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    summary::print_summary(&report, &engine.stats());

    if let Some(downloader) = downloader {
        if report.cancelled {
            tracing::warn!("Run was cancelled, skipping document downloads");
        } else {
            let downloads = downloader
                .download_report(&report)
                .await
                .with_context(|| format!("Failed to save documents under {}", downloader.dir().display()))?;
            summary::print_downloads(&downloads);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::parse_from([
            "tender-bot",
            "1234-567-L123",
            "--max-concurrent",
            "5",
            "--delay",
            "0",
            "--no-render",
            "--dedupe",
            "--download-dir",
            "adjuntos",
        ]);
        let config = cli.engine_config().unwrap();

        assert_eq!(config.max_concurrent, 5);
        assert_eq!(config.request_delay_seconds, 0.0);
        assert!(!config.render_fallback);
        assert!(config.dedupe_identifiers);
        assert_eq!(cli.download_dir, Some(PathBuf::from("adjuntos")));
        assert_eq!(cli.identifiers, vec!["1234-567-L123"]);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let cli = Cli::parse_from(["tender-bot", "--max-concurrent", "0"]);
        assert!(cli.engine_config().is_err());
    }

    #[test]
    fn test_static_only_disables_fallback() {
        let config = static_only(EngineConfig::default());
        assert!(!config.render_fallback);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_outputs() {
        let cli = Cli::parse_from(["tender-bot"]);
        let (json, csv) = cli.outputs();
        assert_eq!(json, Some(PathBuf::from(DEFAULT_JSON_OUTPUT)));
        assert_eq!(csv, Some(PathBuf::from(DEFAULT_CSV_OUTPUT)));

        let cli = Cli::parse_from(["tender-bot", "--csv", "out.csv"]);
        assert_eq!(cli.outputs(), (None, Some(PathBuf::from("out.csv"))));
    }
}
