//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use vidgrab_core::{CatalogItem, DownloadRequest};

/// Download catalog videos to local storage.
///
/// Each ITEM is a catalog video id, optionally followed by `=` and the name
/// to save it under (`v123=My holiday`). Without a name the title reported
/// by the extraction service is used.
#[derive(Parser, Debug)]
#[command(name = "vidgrab")]
#[command(author, version, about)]
pub struct Args {
    /// Videos to download, as ID or ID=DISPLAY NAME
    #[arg(value_name = "ID[=DISPLAY NAME]", required = true)]
    pub items: Vec<String>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Maximum concurrent downloads (1-16) [default: 3]
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub concurrency: Option<u8>,

    /// Attempts per network stage, including the first (1-10) [default: 3]
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub max_attempts: Option<u8>,

    /// Directory to save videos in [default: <Downloads>/vidgrab]
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Preferred stream format [default: mp4]
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// Metadata extraction endpoint URL
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Catalog site domain used for page URLs and the Referer header
    #[arg(long, value_name = "DOMAIN")]
    pub catalog_domain: Option<String>,

    /// Config file [default: $XDG_CONFIG_HOME/vidgrab/config.toml]
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Parses one `ID[=DISPLAY NAME]` item into a catalog stub.
pub fn parse_item(raw: &str) -> Result<CatalogItem> {
    let (id, title) = match raw.split_once('=') {
        Some((id, name)) => (id.trim(), name.trim()),
        None => (raw.trim(), ""),
    };
    if id.is_empty() {
        bail!("Invalid item '{raw}': missing video id");
    }
    Ok(CatalogItem {
        id: id.to_string(),
        title: title.to_string(),
        thumbnail: String::new(),
        duration: String::new(),
        uploader: String::new(),
    })
}

/// Builds download requests for every item, dropping repeated ids.
pub fn build_requests(items: &[String], catalog_domain: &str) -> Result<Vec<DownloadRequest>> {
    let mut requests: Vec<DownloadRequest> = Vec::with_capacity(items.len());
    for raw in items {
        let request = parse_item(raw)?.to_download_request(catalog_domain);
        if !requests.iter().any(|existing| existing.id == request.id) {
            requests.push(request);
        }
    }
    Ok(requests)
}
