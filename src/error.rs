use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum MirrorError {
    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("unknown feed kind: {0}")]
    UnknownFeed(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("redirect from {0} has no location header")]
    RedirectWithoutLocation(String),

    #[error("too many redirects starting at {0}")]
    TooManyRedirects(String),

    #[error("list page {page} returned status {status}")]
    ListStatus { page: u32, status: u16 },

    #[error("list page {page} is malformed: {message}")]
    ListParse { page: u32, message: String },

    #[error("malformed list item: {0}")]
    ItemParse(String),

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("malformed CSV row: {0}")]
    RecordParse(String),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
