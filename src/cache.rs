//! Per-message cache of parsed alert records.
//!
//! Each Gmail message parses to one CSV file `<dir>/<message-id>.csv` with a
//! `title,authors,snippet,date,subject` header row. Entries are written once
//! and never expire; `clear` is the only invalidation.

use crate::error::{AlertsError, Result};
use crate::parser::PaperRecord;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Column order of cache files
pub const CACHE_COLUMNS: [&str; 5] = ["title", "authors", "snippet", "date", "subject"];

const CACHE_EXTENSION: &str = "csv";

/// Whether a lookup was served from disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

/// Flat directory of parsed messages keyed by message id
#[derive(Debug, Clone)]
pub struct AlertCache {
    dir: PathBuf,
}

impl AlertCache {
    /// Cache rooted at `dir`. Nothing is created on disk.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache rooted at `dir`, creating the directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let cache = Self::new(dir);
        std::fs::create_dir_all(&cache.dir)?;
        Ok(cache)
    }

    /// Cache directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the records of message `id`
    pub fn entry_path(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.dir.join(format!("{}.{}", id, CACHE_EXTENSION)))
    }

    /// Whether message `id` has been cached
    pub fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.entry_path(id)?.exists())
    }

    /// Records cached for `id`, or `None` when there is no entry
    pub fn load(&self, id: &str) -> Result<Option<Vec<PaperRecord>>> {
        let path = self.entry_path(id)?;
        if !path.exists() {
            return Ok(None);
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&path)?;

        let mut records: Vec<PaperRecord> = Vec::new();
        for row in reader.deserialize::<PaperRecord>() {
            records.push(row?);
        }
        debug!(message_id = id, count = records.len(), "Loaded cache entry");
        Ok(Some(records))
    }

    /// Write the entry for `id`. An empty record list still produces an entry.
    pub fn store(&self, id: &str, records: &[PaperRecord]) -> Result<()> {
        let path = self.entry_path(id)?;
        let tmp = path.with_extension("csv.tmp");

        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_path(&tmp)?;
            writer.write_record(CACHE_COLUMNS)?;
            for record in records {
                writer.serialize(record)?;
            }
            writer.flush()?;
        }

        std::fs::rename(&tmp, &path)?;
        debug!(message_id = id, count = records.len(), "Stored cache entry");
        Ok(())
    }

    /// Return cached records for `id`, or run `parse`, store and return its result.
    ///
    /// `parse` is not called on a hit.
    pub async fn get_or_parse<F, Fut>(&self, id: &str, parse: F) -> Result<(Vec<PaperRecord>, CacheStatus)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<PaperRecord>>>,
    {
        if let Some(records) = self.load(id)? {
            return Ok((records, CacheStatus::Hit));
        }

        let records = parse().await?;
        self.store(id, &records)?;
        Ok((records, CacheStatus::Miss))
    }

    /// Ids of all cached messages, sorted
    pub fn entries(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(CACHE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Delete every entry, returning how many were removed
    pub fn clear(&self) -> Result<usize> {
        let ids = self.entries()?;
        for id in &ids {
            std::fs::remove_file(self.dir.join(format!("{}.{}", id, CACHE_EXTENSION)))?;
        }
        if !ids.is_empty() {
            info!(count = ids.len(), "Cleared cache at {:?}", self.dir);
        }
        Ok(ids.len())
    }
}

/// Message ids are opaque but must stay inside the cache directory
fn validate_id(id: &str) -> Result<()> {
    let ok = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(AlertsError::Validation(format!("Invalid message id for cache: {:?}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_header_date;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn records() -> Vec<PaperRecord> {
        vec![
            PaperRecord {
                title: "Deep learning, revisited".to_string(),
                authors: "A Smith, B \"Bo\" Jones - Nature, 2020".to_string(),
                snippet: "… multi-line\nsnippet with <b>markup</b>".to_string(),
                date: parse_header_date("Mon, 3 Feb 2020 10:00:00 -0800"),
                subject: "New citations to my articles".to_string(),
            },
            PaperRecord {
                title: "Second".to_string(),
                authors: String::new(),
                snippet: String::new(),
                date: None,
                subject: "New citations to my articles".to_string(),
            },
        ]
    }

    #[test]
    fn test_store_and_load() -> Result<()> {
        let dir = TempDir::new()?;
        let cache = AlertCache::open(dir.path())?;

        cache.store("17a0c9e2b", &records())?;
        assert!(cache.contains("17a0c9e2b")?);
        assert_eq!(cache.load("17a0c9e2b")?, Some(records()));
        assert_eq!(cache.load("other")?, None);
        Ok(())
    }

    #[test]
    fn test_entry_has_header_row() -> Result<()> {
        let dir = TempDir::new()?;
        let cache = AlertCache::open(dir.path())?;

        cache.store("empty", &[])?;
        let content = std::fs::read_to_string(cache.entry_path("empty")?)?;
        assert_eq!(content.trim_end(), "title,authors,snippet,date,subject");
        assert_eq!(cache.load("empty")?, Some(Vec::new()));
        Ok(())
    }

    #[test]
    fn test_loads_raw_header_dates() -> Result<()> {
        let dir = TempDir::new()?;
        let cache = AlertCache::open(dir.path())?;
        std::fs::write(
            cache.entry_path("legacy")?,
            "title,authors,snippet,date,subject\nT,A,S,\"Mon, 3 Feb 2020 10:00:00 -0800\",Subj\n",
        )?;

        let loaded = cache.load("legacy")?.expect("entry present");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].date, parse_header_date("Mon, 3 Feb 2020 10:00:00 -0800"));
        Ok(())
    }

    #[tokio::test]
    async fn test_second_lookup_skips_parse() -> Result<()> {
        let dir = TempDir::new()?;
        let cache = AlertCache::open(dir.path())?;
        let calls = AtomicUsize::new(0);

        let parse = || {
            calls.fetch_add(1, Ordering::SeqCst);
            let out = records();
            async move { Ok(out) }
        };

        let (first, status) = cache.get_or_parse("msg1", parse).await?;
        assert_eq!(status, CacheStatus::Miss);

        let (second, status) = cache.get_or_parse("msg1", parse).await?;
        assert_eq!(status, CacheStatus::Hit);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn test_parse_error_leaves_no_entry() -> Result<()> {
        let dir = TempDir::new()?;
        let cache = AlertCache::open(dir.path())?;

        let result = cache
            .get_or_parse("broken", || async { Err(AlertsError::Parse("bad html".to_string())) })
            .await;
        assert!(result.is_err());
        assert!(!cache.contains("broken")?);
        Ok(())
    }

    #[test]
    fn test_rejects_path_escaping_ids() {
        let cache = AlertCache::new("cache");
        assert!(cache.entry_path("../etc/passwd").is_err());
        assert!(cache.entry_path("").is_err());
        assert!(cache.entry_path("a/b").is_err());
        assert!(cache.entry_path("18c1f2_a-b").is_ok());
    }

    #[test]
    fn test_entries_and_clear() -> Result<()> {
        let dir = TempDir::new()?;
        let cache = AlertCache::open(dir.path())?;
        cache.store("b", &records())?;
        cache.store("a", &[])?;
        std::fs::write(dir.path().join("notes.txt"), "keep")?;

        assert_eq!(cache.entries()?, vec!["a", "b"]);
        assert_eq!(cache.clear()?, 2);
        assert!(cache.entries()?.is_empty());
        assert!(dir.path().join("notes.txt").exists());
        Ok(())
    }
}
