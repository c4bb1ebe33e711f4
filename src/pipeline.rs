//! End-to-end run: authorize, list, parse (through the cache), aggregate, render.

use crate::aggregate::{aggregate, AlertTable};
use crate::auth;
use crate::cache::{AlertCache, CacheStatus};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::gmail::GmailClient;
use crate::parser::PaperRecord;
use crate::render::{render_grouped, render_page, render_table, write_page};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::{error, info};

/// Counts reported at the end of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Messages matching the query
    pub messages: usize,
    /// Messages served from the cache
    pub cache_hits: usize,
    /// Rows in the rendered table (groups when grouping)
    pub rows: usize,
    /// Written page
    pub output: PathBuf,
}

/// Run the whole pipeline with `config`
pub async fn run(config: &PipelineConfig) -> Result<RunSummary> {
    config.validate()?;

    let token = auth::authorize(config).await?;
    let gmail = GmailClient::new(token.token)?;

    info!(query = %config.query, "Listing alert emails");
    let ids = gmail.list_message_ids(&config.query).await?;
    info!(total = ids.len(), "Found alert emails");

    let cache = AlertCache::open(&config.cache_dir)?;
    let (batches, cache_hits) = collect_batches(&gmail, &cache, &ids).await?;

    let table = aggregate(batches);
    let rows = publish(&table, config)?;

    Ok(RunSummary {
        messages: ids.len(),
        cache_hits,
        rows,
        output: config.output_path.clone(),
    })
}

/// Parse every message through the cache, in listing order.
///
/// The first failing message aborts the run.
async fn collect_batches(
    gmail: &GmailClient,
    cache: &AlertCache,
    ids: &[String],
) -> Result<(Vec<Vec<PaperRecord>>, usize)> {
    let progress = ProgressBar::new(ids.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} [{elapsed_precise}<{eta_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut batches = Vec::with_capacity(ids.len());
    let mut hits = 0;

    for id in ids {
        progress.set_message(id.clone());
        let fetched = cache
            .get_or_parse(id, || async move {
                let message = gmail.get_message(id).await?;
                message.parse()
            })
            .await;

        match fetched {
            Ok((records, status)) => {
                if status == CacheStatus::Hit {
                    hits += 1;
                }
                batches.push(records);
            }
            Err(e) => {
                progress.abandon();
                error!(message_id = %id, error = %e, "Failed to process alert email");
                return Err(e);
            }
        }
        progress.inc(1);
    }

    progress.finish_and_clear();
    info!(messages = ids.len(), cache_hits = hits, "Parsed alert emails");
    Ok((batches, hits))
}

/// Render `table` and write the page. Returns the number of rendered rows.
pub fn publish(table: &AlertTable, config: &PipelineConfig) -> Result<usize> {
    let (table_html, rows) = if config.group {
        let groups = table.group_by_paper();
        (render_grouped(&groups), groups.len())
    } else {
        (render_table(table), table.len())
    };

    let page = render_page(&table_html, &config.stylesheet);
    write_page(&config.output_path, &page)?;
    Ok(rows)
}
