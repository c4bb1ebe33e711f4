//! Custom error types for scholar-alerts.
//!
//! All library functions return `Result<T, AlertsError>` instead of using `unwrap()`.

use thiserror::Error;

/// Main error type for scholar-alerts operations.
#[derive(Debug, Error)]
pub enum AlertsError {
    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// OAuth token could not be loaded, refreshed or obtained
    #[error("Auth error: {0}")]
    Auth(String),

    /// Gmail or token endpoint returned a non-success status
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code
        code: u16,
        /// Response body or reason
        message: String,
    },

    /// Email body or header could not be interpreted
    #[error("Parse error: {0}")]
    Parse(String),

    /// Base64 body payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Cache file read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias using `AlertsError`
pub type Result<T> = std::result::Result<T, AlertsError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: impl Into<String>) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| AlertsError::Parse(msg.into()))
    }
}
