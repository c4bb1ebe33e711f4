//! Merge per-message records into one table.

use crate::parser::PaperRecord;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// One row of the aggregated table, date normalized to UTC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertRow {
    pub title: String,
    pub authors: String,
    pub snippet: String,
    pub date: Option<DateTime<Utc>>,
    pub subject: String,
}

impl From<PaperRecord> for AlertRow {
    fn from(record: PaperRecord) -> Self {
        Self {
            title: record.title,
            authors: record.authors,
            snippet: record.snippet,
            date: record.date.map(|d| d.with_timezone(&Utc)),
            subject: record.subject,
        }
    }
}

/// All alert rows, newest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertTable {
    rows: Vec<AlertRow>,
}

/// Rows sharing title, authors and snippet, with every date/subject they appeared under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupedPaper {
    pub title: String,
    pub authors: String,
    pub snippet: String,
    /// Ascending, undated last
    pub dates: Vec<Option<DateTime<Utc>>>,
    /// Parallel to `dates`
    pub subjects: Vec<String>,
}

/// Concatenate record batches in order and sort by date, newest first.
///
/// The sort is stable: rows with equal dates keep their concatenation order.
/// Rows without a date go last.
pub fn aggregate<I>(batches: I) -> AlertTable
where
    I: IntoIterator<Item = Vec<PaperRecord>>,
{
    let mut rows: Vec<AlertRow> = batches
        .into_iter()
        .flatten()
        .map(AlertRow::from)
        .collect();
    rows.sort_by(|a, b| b.date.cmp(&a.date));
    AlertTable { rows }
}

impl AlertTable {
    pub fn rows(&self) -> &[AlertRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Collapse rows describing the same paper.
    ///
    /// Groups are ordered by `(title, authors, snippet)`.
    pub fn group_by_paper(&self) -> Vec<GroupedPaper> {
        let mut ascending: Vec<&AlertRow> = self.rows.iter().collect();
        ascending.sort_by(|a, b| oldest_first(a.date, b.date));

        let mut groups: BTreeMap<(&str, &str, &str), GroupedPaper> = BTreeMap::new();
        for row in ascending {
            let group = groups
                .entry((row.title.as_str(), row.authors.as_str(), row.snippet.as_str()))
                .or_insert_with(|| GroupedPaper {
                    title: row.title.clone(),
                    authors: row.authors.clone(),
                    snippet: row.snippet.clone(),
                    dates: Vec::new(),
                    subjects: Vec::new(),
                });
            group.dates.push(row.date);
            group.subjects.push(row.subject.clone());
        }
        groups.into_values().collect()
    }
}

fn oldest_first(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
