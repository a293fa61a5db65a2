use crate::models::FilterGroup;
use std::time::Duration;
use thiserror::Error;

/// Failures surfaced by the crawl engine. Most are recovered at the component
/// boundary that owns them; only the initial catalog load is fatal.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("timed out after {limit:?} waiting for {what}")]
    Timeout { limit: Duration, what: &'static str },

    #[error("filter group {0} not found in sidebar")]
    FilterGroupNotFound(FilterGroup),

    #[error("filter group {group}: gave up after {budget} recovery reloads")]
    RecoveryExhausted { group: FilterGroup, budget: u32 },

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("output sink: {0}")]
    Sink(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("browser: {0:#}")]
    Driver(#[from] anyhow::Error),
}

impl CrawlError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, CrawlError::Timeout { .. })
    }
}

pub type Result<T, E = CrawlError> = std::result::Result<T, E>;
