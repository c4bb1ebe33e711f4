//! Pipeline configuration.
//!
//! Every value has a default matching the file layout the tool has always
//! used (`token.json`, `credentials.json`, `cache/`, `table.html`), so a bare
//! `scholar-alerts run` in the working directory needs no flags.

use crate::error::{AlertsError, Result};
use std::path::PathBuf;

/// Gmail search filter selecting Scholar alert emails
pub const DEFAULT_QUERY: &str = "from:scholaralerts-noreply@google.com";

/// Read-only Gmail scope. Changing scopes requires deleting the token file.
pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

/// Options for one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Gmail search query
    pub query: String,
    /// OAuth scopes requested during authorization
    pub scopes: Vec<String>,
    /// Persisted OAuth token
    pub token_path: PathBuf,
    /// OAuth client secret downloaded from the Google Cloud console
    pub credentials_path: PathBuf,
    /// Directory holding one CSV per parsed message
    pub cache_dir: PathBuf,
    /// Rendered HTML page
    pub output_path: PathBuf,
    /// Stylesheet href written into the page (not generated)
    pub stylesheet: String,
    /// Group rows that describe the same paper
    pub group: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            query: DEFAULT_QUERY.to_string(),
            scopes: vec![GMAIL_READONLY_SCOPE.to_string()],
            token_path: PathBuf::from("token.json"),
            credentials_path: PathBuf::from("credentials.json"),
            cache_dir: PathBuf::from("cache"),
            output_path: PathBuf::from("table.html"),
            stylesheet: "df_style.css".to_string(),
            group: false,
        }
    }
}

impl PipelineConfig {
    /// Reject configurations that cannot produce a run
    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(AlertsError::Config("Search query must not be empty".to_string()));
        }
        if self.scopes.is_empty() {
            return Err(AlertsError::Config("At least one OAuth scope is required".to_string()));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(AlertsError::Config("Output path must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_file_layout() {
        let config = PipelineConfig::default();
        assert_eq!(config.query, DEFAULT_QUERY);
        assert_eq!(config.token_path, PathBuf::from("token.json"));
        assert_eq!(config.cache_dir, PathBuf::from("cache"));
        assert_eq!(config.output_path, PathBuf::from("table.html"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_query() {
        let config = PipelineConfig {
            query: "  ".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(AlertsError::Config(_))));
    }
}
