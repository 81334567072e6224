//! CLI entry point for the video downloader.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use futures_util::future::join_all;
use tracing::{debug, info, warn};
use vidgrab_core::{DownloadOrchestrator, HttpExtractor, HttpTransfer, LocalStorage, site_url};

mod cli;
mod config;
mod progress;

use cli::{Args, build_requests};
use config::{RuntimeConfig, SIGNING_SECRET_ENV, load_file_config};
use progress::ProgressReporter;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let file_config = load_file_config(args.config.as_deref())?;
    let runtime = RuntimeConfig::resolve(&args, file_config)?;
    let requests = build_requests(&args.items, &runtime.catalog_domain)?;

    let secret = env::var(SIGNING_SECRET_ENV).unwrap_or_default();
    if secret.is_empty() {
        warn!("{SIGNING_SECRET_ENV} is not set; extraction requests are signed with an empty key");
    }

    let extractor = HttpExtractor::new(&runtime.extract_endpoint, secret.into_bytes())
        .context("Failed to create extraction client")?;
    let transfer = HttpTransfer::with_timeouts(
        Some(site_url(&runtime.catalog_domain)),
        runtime.connect_timeout_secs,
        runtime.read_timeout_secs,
    )
    .context("Failed to create transfer client")?;

    let orchestrator = DownloadOrchestrator::new(
        runtime.settings.clone(),
        Arc::new(extractor),
        Arc::new(transfer),
        Arc::new(LocalStorage::new()),
    )?;

    let labels: HashMap<String, String> = requests
        .iter()
        .map(|request| (request.id.clone(), request.display_name.clone()))
        .collect();
    orchestrator.subscribe(ProgressReporter::new(!args.quiet, labels));

    info!(
        downloads = requests.len(),
        output_dir = %runtime.settings.output_dir.display(),
        concurrency = runtime.settings.concurrency,
        "Starting downloads"
    );

    let outcomes = join_all(
        requests
            .into_iter()
            .map(|request| orchestrator.request(request)),
    )
    .await;

    let mut failed = 0usize;
    for outcome in &outcomes {
        if outcome.success {
            if let Some(path) = &outcome.path {
                info!(id = %outcome.id, path = %path.display(), "Saved");
            }
        } else {
            failed += 1;
            warn!(
                id = %outcome.id,
                error = outcome.error.as_deref().unwrap_or("unknown error"),
                "Download failed"
            );
        }
    }

    info!(
        completed = outcomes.len() - failed,
        failed,
        total = outcomes.len(),
        "Downloads finished"
    );

    if failed > 0 {
        bail!("{failed} of {} downloads failed", outcomes.len());
    }
    Ok(())
}
