use thiserror::Error;

/// Failure of a single page fetch. Terminal for that page; nothing retries.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error on page {page}: {source}")]
    Transport {
        page: u32,
        #[source]
        source: reqwest::Error,
    },
    #[error("could not decode page {page}: {reason}")]
    Decode { page: u32, reason: String },
    #[error("listing api rejected page {page} (status {status}): {message}")]
    Api {
        page: u32,
        status: i64,
        message: String,
    },
}

impl FetchError {
    pub fn page(&self) -> u32 {
        match self {
            FetchError::Transport { page, .. }
            | FetchError::Decode { page, .. }
            | FetchError::Api { page, .. } => *page,
        }
    }
}

/// Run-level failure of the listing pipeline.
#[derive(Debug, Error)]
pub enum ListingError {
    /// Page 1 is the only source of the page count, so losing it ends the run.
    #[error("first page unavailable, aborting run: {0}")]
    Fatal(#[source] FetchError),
    #[error("failed to write output record: {0}")]
    Sink(#[from] std::io::Error),
    #[error("completion task failed: {0}")]
    Closer(#[from] tokio::task::JoinError),
}
