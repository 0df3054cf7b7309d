//! Error types shared by every stage of a pull.

use thiserror::Error;

/// Result type for pull operations
pub type Result<T> = std::result::Result<T, PullError>;

/// Every condition here aborts the run.
#[derive(Debug, Error)]
pub enum PullError {
    /// Fetch failed at the transport level or returned a non-success status
    #[error("source unavailable: {url}: {reason}")]
    SourceUnavailable { url: String, reason: String },

    /// Fetched payload was empty, or decoded to zero rows
    #[error("no data found at {0}")]
    NoDataFound(String),

    /// A configured header name is absent from a source header
    #[error("column {name:?} not found in {context} header")]
    ColumnNotFound { name: String, context: String },

    /// Destination sheet lacks its header, region column or an output column
    #[error("destination sheet format error: {0}")]
    SheetFormat(String),

    /// A data row is too short for a referenced column position
    #[error("row {row} has {len} cells but column {needed} is referenced")]
    RowTooShort {
        row: usize,
        len: usize,
        needed: usize,
    },

    #[error("unsupported source format: {0}")]
    UnsupportedFormat(String),

    /// Payload could not be decoded in the selected format
    #[error("failed to decode {format} payload: {reason}")]
    Decode { format: &'static str, reason: String },

    /// PDF table extraction collaborator failed
    #[error("table extraction failed: {0}")]
    Extraction(String),

    #[error("invalid number {value:?} in column {column} for region {region}")]
    InvalidNumber {
        region: String,
        column: String,
        value: String,
    },

    /// Spreadsheet API answered with a non-success status
    #[error("sheets API error ({status}): {body}")]
    SheetsApi { status: u16, body: String },

    /// A request URL could not be built from the configured base
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("sheets request failed: {0}")]
    SheetsTransport(#[from] reqwest::Error),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PullError {
    pub(crate) fn decode(format: &'static str, reason: impl ToString) -> Self {
        PullError::Decode {
            format,
            reason: reason.to_string(),
        }
    }
}
