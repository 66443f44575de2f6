//! Live listing enumeration: discover the page count from page 1, fetch every
//! page concurrently and emit each game and streamer once.
//!
//! Env:
//! - `LISTING_BASE_URL` listing endpoint; `page=<n>` is appended to its query
//! - `LISTING_MAX_CONCURRENCY` cap on in-flight page requests (unset/0 = unbounded)
//! - `LISTING_REQUEST_TIMEOUT_SECS` per-request timeout (default 15)
//! - `LISTING_USER_AGENT`
//! - `LISTING_REFETCH_FIRST_PAGE` fetch page 1 again during fanout (default 1)
//! - `LISTING_OUTPUT_FORMAT` sql | text | jsonl (default sql)
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::util::env::{env_flag, env_opt, env_parse_opt, env_secs};

pub mod aggregator;
pub mod coordinator;
pub mod dedup;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod output;

pub use coordinator::{Coordinator, FanoutOptions, RunSummary};
pub use error::{FetchError, ListingError};
pub use fetcher::{HttpPageFetcher, PageSource};
pub use models::{Entity, Page, Record};
pub use output::{MemorySink, OutputFormat, RecordSink, WriterSink};

pub const DEFAULT_LISTING_URL: &str =
    "https://www.huya.com/cache.php?m=LiveList&do=getLiveListByPage";
pub const DEFAULT_USER_AGENT: &str = concat!("livelist-spider/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct ListingConfig {
    pub base_url: String,
    pub max_concurrency: Option<usize>,
    pub request_timeout: Duration,
    pub user_agent: String,
    pub refetch_first_page: bool,
    pub output_format: OutputFormat,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LISTING_URL.to_string(),
            max_concurrency: None,
            request_timeout: Duration::from_secs(15),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            refetch_first_page: true,
            output_format: OutputFormat::default(),
        }
    }
}

impl ListingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let output_format = match env_opt("LISTING_OUTPUT_FORMAT") {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!(error = %e, "ignoring LISTING_OUTPUT_FORMAT");
                defaults.output_format
            }),
            None => defaults.output_format,
        };
        Self {
            base_url: env_opt("LISTING_BASE_URL").unwrap_or(defaults.base_url),
            max_concurrency: env_parse_opt::<usize>("LISTING_MAX_CONCURRENCY").filter(|n| *n > 0),
            request_timeout: env_secs("LISTING_REQUEST_TIMEOUT_SECS", 15),
            user_agent: env_opt("LISTING_USER_AGENT").unwrap_or(defaults.user_agent),
            refetch_first_page: env_flag("LISTING_REFETCH_FIRST_PAGE", defaults.refetch_first_page),
            output_format,
        }
    }
}

/// Enumerate the live listing over HTTP into `sink` and log the run summary.
pub async fn run_listing<S: RecordSink>(cfg: &ListingConfig, sink: &mut S) -> Result<RunSummary> {
    let fetcher = HttpPageFetcher::new(cfg).context("failed to build listing http client")?;
    info!(base_url = fetcher.base_url(), "listing run starting");
    let started = Instant::now();

    let summary = Coordinator::new(fetcher, FanoutOptions::from(cfg))
        .run(sink)
        .await?;

    let elapsed_ms = started.elapsed().as_millis() as u64;
    if summary.is_complete() {
        info!(
            total_pages = summary.total_pages,
            groups = summary.groups_emitted,
            users = summary.users_emitted,
            duplicates = summary.duplicates_skipped,
            elapsed_ms,
            "listing run finished"
        );
    } else {
        warn!(
            total_pages = summary.total_pages,
            delivered = summary.pages_delivered,
            failed = ?summary.failed_pages,
            groups = summary.groups_emitted,
            users = summary.users_emitted,
            elapsed_ms,
            "listing run finished with missing pages"
        );
    }
    Ok(summary)
}
