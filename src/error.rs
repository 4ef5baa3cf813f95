use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Startup failure while reading `config.json`. Fatal for the binary.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("could not read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("config {path:?} must contain a JSON object")]
    NotAnObject { path: PathBuf },
    #[error("invalid config value: {0}")]
    Invalid(#[source] serde_json::Error),
    #[error("config value {key} out of range: {message}")]
    OutOfRange { key: &'static str, message: String },
}

/// Anything that went wrong while driving the browser.
#[derive(Debug, Error)]
pub enum InteractionError {
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },
    #[error("timed out after {timeout:?} waiting for {locator}")]
    Timeout { locator: String, timeout: Duration },
    #[error("element {locator} not usable: {message}")]
    Element { locator: String, message: String },
    #[error("browser session is not available")]
    SessionClosed,
}

/// Row or table level parsing failure. Never fatal for a search.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("results table not found: {0}")]
    TableNotFound(#[from] InteractionError),
    #[error("results markup contains no table")]
    NotATable,
    #[error("row {row} has {found} cells, expected at least {expected}")]
    TooFewCells {
        row: usize,
        found: usize,
        expected: usize,
    },
    #[error("row {row} has no download link in its title cell")]
    MissingLink { row: usize },
    #[error("row {row} has an unusable download link {href:?}: {source}")]
    BadLink {
        row: usize,
        href: String,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("unsupported export format: {0}")]
    UnsupportedFormat(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("spreadsheet error: {0}")]
    Spreadsheet(#[from] rust_xlsxwriter::XlsxError),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("could not open log file {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("logger already initialized: {0}")]
    AlreadyInitialized(#[from] log::SetLoggerError),
}
