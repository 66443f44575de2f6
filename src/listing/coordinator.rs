use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::aggregator::Aggregator;
use super::error::ListingError;
use super::fetcher::PageSource;
use super::models::Page;
use super::output::RecordSink;
use super::ListingConfig;

/// Pages buffered between the fetch tasks and the aggregator.
const PAGE_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanoutOptions {
    /// Upper bound on in-flight page requests; `None` means one request per page at once.
    pub max_concurrency: Option<usize>,
    /// Fetch page 1 again inside the fanout instead of handing over the copy
    /// already used to learn the page count.
    pub refetch_first_page: bool,
}

impl Default for FanoutOptions {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            refetch_first_page: true,
        }
    }
}

impl From<&ListingConfig> for FanoutOptions {
    fn from(cfg: &ListingConfig) -> Self {
        Self {
            max_concurrency: cfg.max_concurrency,
            refetch_first_page: cfg.refetch_first_page,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total_pages: u32,
    pub pages_delivered: usize,
    pub failed_pages: Vec<u32>,
    pub groups_emitted: usize,
    pub users_emitted: usize,
    pub duplicates_skipped: usize,
}

impl RunSummary {
    pub fn is_complete(&self) -> bool {
        self.failed_pages.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageOutcome {
    Delivered(u32),
    Failed(u32),
}

/// Drives one listing run: page 1, fanout, drain.
pub struct Coordinator<P: PageSource> {
    source: Arc<P>,
    options: FanoutOptions,
}

impl<P: PageSource> Coordinator<P> {
    pub fn new(source: P, options: FanoutOptions) -> Self {
        Self {
            source: Arc::new(source),
            options,
        }
    }

    pub fn source(&self) -> &P {
        &self.source
    }

    /// Run the pipeline, emitting deduplicated records into `sink` as pages arrive.
    ///
    /// Only a page-1 failure is fatal; any other page that fails is logged,
    /// left out of the output and listed in the returned summary.
    pub async fn run<S: RecordSink>(&self, sink: &mut S) -> Result<RunSummary, ListingError> {
        let first = self.source.fetch(1).await.map_err(|e| {
            error!(page = 1, error = %e, "first page failed; aborting run");
            ListingError::Fatal(e)
        })?;
        let total = first.total_pages;
        info!(
            total_pages = total,
            max_concurrency = ?self.options.max_concurrency,
            refetch_first_page = self.options.refetch_first_page,
            "first page fetched; fanning out"
        );

        let (tx, mut rx) = mpsc::channel::<Page>(PAGE_BUFFER);
        let limiter = self
            .options
            .max_concurrency
            .filter(|n| *n > 0)
            .map(|n| Arc::new(Semaphore::new(n)));

        let mut first = Some(first);
        let mut handles = Vec::with_capacity(total as usize);
        for page in 1..=total {
            let cached = if page == 1 && !self.options.refetch_first_page {
                first.take()
            } else {
                None
            };
            handles.push(spawn_page_task(
                Arc::clone(&self.source),
                page,
                cached,
                limiter.clone(),
                tx.clone(),
            ));
        }
        let closer = tokio::spawn(close_when_done(handles, tx));

        let mut aggregator = Aggregator::new(sink);
        let drained = aggregator.drain(&mut rx).await;
        // Dropping the receiver unblocks any task still waiting to send after a sink failure.
        drop(rx);
        let outcomes = closer.await?;
        drained?;

        let stats = aggregator.stats();
        let failed_pages: Vec<u32> = outcomes
            .iter()
            .filter_map(|o| match o {
                PageOutcome::Failed(page) => Some(*page),
                PageOutcome::Delivered(_) => None,
            })
            .collect();
        Ok(RunSummary {
            total_pages: total,
            pages_delivered: outcomes.len() - failed_pages.len(),
            failed_pages,
            groups_emitted: stats.groups_emitted,
            users_emitted: stats.users_emitted,
            duplicates_skipped: stats.duplicates_skipped,
        })
    }
}

fn spawn_page_task<P: PageSource>(
    source: Arc<P>,
    page: u32,
    cached: Option<Page>,
    limiter: Option<Arc<Semaphore>>,
    tx: mpsc::Sender<Page>,
) -> JoinHandle<PageOutcome> {
    tokio::spawn(async move {
        let fetched = match cached {
            Some(p) => Ok(p),
            None => {
                let _permit = match limiter {
                    Some(sem) => sem.acquire_owned().await.ok(),
                    None => None,
                };
                source.fetch(page).await
            }
        };
        match fetched {
            Ok(p) => {
                if tx.send(p).await.is_err() {
                    warn!(page, "aggregator stopped; page discarded");
                    return PageOutcome::Failed(page);
                }
                PageOutcome::Delivered(page)
            }
            Err(e) => {
                warn!(page, error = %e, "page fetch failed; page dropped");
                PageOutcome::Failed(page)
            }
        }
    })
}

/// Wait for every page task, then drop the last sender so the aggregator's
/// receive loop ends. Tasks are numbered 1..=n in spawn order.
async fn close_when_done(
    handles: Vec<JoinHandle<PageOutcome>>,
    tx: mpsc::Sender<Page>,
) -> Vec<PageOutcome> {
    let outcomes: Vec<PageOutcome> = join_all(handles)
        .await
        .into_iter()
        .zip(1u32..)
        .map(|(joined, page)| match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(page, error = %e, "page task panicked");
                PageOutcome::Failed(page)
            }
        })
        .collect();
    drop(tx);
    debug!(tasks = outcomes.len(), "all page tasks finished; results channel closed");
    outcomes
}
