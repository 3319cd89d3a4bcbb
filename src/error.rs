use std::time::Duration;

use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to load {url}: {reason}")]
    LoadFailed { url: String, reason: String },

    #[error("Timed out after {after:?} waiting for selector: {selector}")]
    Timeout { selector: String, after: Duration },

    #[error("Stale element reference: {0}")]
    StaleReference(String),

    #[error("The selector you are trying to scrape for is invalid. Selector: {0}")]
    ParseMissingSelector(String),

    #[error("Couldn't start a rendering session: {0}")]
    SessionStart(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Io Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Csv Error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tokio Join Error, couldn't await a task! {0}")]
    RuntimeJoin(#[from] tokio::task::JoinError),
}

/// A field that couldn't be read off a card. Never leaves the record extractor.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldFault {
    #[error("no element matching {0}")]
    Missing(String),

    #[error("invalid selector {0}")]
    Selector(String),
}

impl From<Error> for FieldFault {
    fn from(value: Error) -> Self {
        match value {
            Error::ParseMissingSelector(sel) => FieldFault::Selector(sel),
            other => FieldFault::Missing(other.to_string()),
        }
    }
}
