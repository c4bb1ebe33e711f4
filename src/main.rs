//! scholar-alerts - Google Scholar alert digest
//!
//! Pulls Scholar alert emails from Gmail, parses the papers they announce and
//! writes them to one HTML table.
//!
//! ## Usage
//!
//! ```bash
//! scholar-alerts run
//! scholar-alerts run --group --output papers.html
//! scholar-alerts cache clear
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scholar_alerts::auth;
use scholar_alerts::cache::AlertCache;
use scholar_alerts::config::{PipelineConfig, DEFAULT_QUERY};
use scholar_alerts::pipeline;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Google Scholar alert digest
#[derive(Parser)]
#[command(name = "scholar-alerts")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch alerts, update the cache and render the table
    Run {
        /// Gmail search query selecting alert emails
        #[arg(long, default_value = DEFAULT_QUERY)]
        query: String,

        #[command(flatten)]
        auth: AuthArgs,

        /// Directory of per-message CSV files
        #[arg(long, default_value = "cache")]
        cache_dir: PathBuf,

        /// Output HTML file
        #[arg(short, long, default_value = "table.html")]
        output: PathBuf,

        /// Stylesheet href written into the page
        #[arg(long, default_value = "df_style.css")]
        stylesheet: String,

        /// Collapse repeated announcements of the same paper into one row
        #[arg(long)]
        group: bool,
    },

    /// Obtain or refresh the Gmail token without running the pipeline
    Auth {
        #[command(flatten)]
        auth: AuthArgs,
    },

    /// Manage the parsed-message cache
    Cache {
        /// Directory of per-message CSV files
        #[arg(long, default_value = "cache", global = true)]
        cache_dir: PathBuf,

        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(clap::Args)]
struct AuthArgs {
    /// Stored OAuth token
    #[arg(long, default_value = "token.json")]
    token: PathBuf,

    /// OAuth client secrets
    #[arg(long, default_value = "credentials.json")]
    credentials: PathBuf,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Delete every cached message
    Clear,
    /// Show the cache directory
    Path,
    /// List cached message ids
    List,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug, cli.json_logs);

    match cli.command {
        Commands::Run {
            query,
            auth,
            cache_dir,
            output,
            stylesheet,
            group,
        } => {
            let config = PipelineConfig {
                query,
                token_path: auth.token,
                credentials_path: auth.credentials,
                cache_dir,
                output_path: output,
                stylesheet,
                group,
                ..Default::default()
            };
            run_pipeline(config).await
        }
        Commands::Auth { auth } => {
            let config = PipelineConfig {
                token_path: auth.token,
                credentials_path: auth.credentials,
                ..Default::default()
            };
            run_auth(config).await
        }
        Commands::Cache { cache_dir, action } => handle_cache(cache_dir, action),
    }
}

fn init_logging(debug: bool, json: bool) {
    let log_level = if debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if json {
        fmt().json().with_env_filter(filter).with_target(true).init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .init();
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn run_pipeline(config: PipelineConfig) -> Result<()> {
    let summary = pipeline::run(&config)
        .await
        .context("Alert pipeline failed")?;

    println!(
        "Parsed {} alert emails ({} from cache), {} rows",
        summary.messages, summary.cache_hits, summary.rows
    );
    println!("✓ Table written to: {}", summary.output.display());
    Ok(())
}

async fn run_auth(config: PipelineConfig) -> Result<()> {
    let token = auth::authorize(&config)
        .await
        .context("Authorization failed")?;

    match token.expiry {
        Some(expiry) => println!("Token valid until {}", expiry.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("Token stored at {}", config.token_path.display()),
    }
    Ok(())
}

fn handle_cache(cache_dir: PathBuf, action: CacheAction) -> Result<()> {
    let cache = AlertCache::new(cache_dir);

    match action {
        CacheAction::Clear => {
            let removed = cache.clear().context("Failed to clear cache")?;
            println!("Removed {} cached messages.", removed);
        }
        CacheAction::Path => {
            println!("Cache directory: {:?}", cache.dir());
        }
        CacheAction::List => {
            let ids = cache.entries().context("Failed to read cache")?;
            for id in &ids {
                println!("{}", id);
            }
            println!("{} cached messages", ids.len());
        }
    }

    Ok(())
}
