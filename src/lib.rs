//! # scholar-alerts
//!
//! Collects Google Scholar alert emails from Gmail into a single HTML table.
//!
//! ## Modules
//!
//! - [`auth`] - OAuth token storage, refresh and the installed-app flow
//! - [`gmail`] - Gmail API listing and message fetch
//! - [`parser`] - Alert email HTML to [`parser::PaperRecord`]s
//! - [`cache`] - One CSV per parsed message
//! - [`aggregate`] - Merge and sort records
//! - [`render`] - HTML page output
//! - [`pipeline`] - The end-to-end run
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use scholar_alerts::{config::PipelineConfig, pipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let summary = pipeline::run(&PipelineConfig::default()).await?;
//!     println!("Rendered {} rows", summary.rows);
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod gmail;
pub mod parser;
pub mod pipeline;
pub mod render;

pub use error::{AlertsError, Result};
