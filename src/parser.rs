//! Scholar alert email parsing.
//!
//! An alert body lists papers as a flat run of sibling elements:
//!
//! ```text
//! <h3><a class="gse_alrt_title">Title</a></h3>
//! <div style="color:#006621">Authors - Venue, Year</div>
//! <div class="gse_alrt_sni">Snippet text</div>
//! <table>share links</table>
//! <br><br>
//! <h3>...next paper...</h3>
//! ```
//!
//! The parser walks element siblings from the first `h3`, consuming that
//! pattern once per paper. Author, snippet and table elements are optional.

use crate::error::{AlertsError, Result};
use chrono::{DateTime, FixedOffset};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

/// Inline style marking the author line
pub const AUTHOR_STYLE: &str = "color:#006621";

/// First class of the snippet block
pub const SNIPPET_CLASS: &str = "gse_alrt_sni";

/// One paper announced by an alert email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperRecord {
    /// Paper title
    pub title: String,
    /// Author line (authors, venue and year as Scholar formats them)
    pub authors: String,
    /// Matching text snippet
    pub snippet: String,
    /// `Date` header of the email, if it parsed
    #[serde(deserialize_with = "deserialize_date")]
    pub date: Option<DateTime<FixedOffset>>,
    /// `Subject` header of the email
    pub subject: String,
}

/// Accepts RFC 3339 as written by the cache and raw RFC 2822 header values
fn deserialize_date<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<FixedOffset>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_header_date))
}

/// Header values copied onto every record of a message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHeaders {
    /// Raw `Date` header
    pub date: String,
    /// Raw `Subject` header
    pub subject: String,
}

impl MessageHeaders {
    /// Pick `Date` and `Subject` out of a header list. Later duplicates win.
    pub fn from_pairs<'a, I>(headers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut out = Self::default();
        for (name, value) in headers {
            match name {
                "Date" => out.date = value.to_string(),
                "Subject" => out.subject = value.to_string(),
                _ => {}
            }
        }
        out
    }
}

/// A fetched alert email
#[derive(Debug, Clone)]
pub struct AlertMessage {
    /// Gmail message id
    pub id: String,
    /// Date and subject headers
    pub headers: MessageHeaders,
    /// Decoded HTML body
    pub html: String,
}

impl AlertMessage {
    /// Parse this message's body into paper records
    pub fn parse(&self) -> Result<Vec<PaperRecord>> {
        let papers = parse_alert_email(&self.headers, &self.html)?;
        debug!(message_id = %self.id, count = papers.len(), "Parsed alert email");
        Ok(papers)
    }
}

/// Parse an email `Date` header.
///
/// Accepts RFC 2822 with an optional trailing comment such as `(PST)`, and
/// RFC 3339 as a fallback. Returns `None` for empty or unrecognised values.
pub fn parse_header_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let comment = Regex::new(r"\s*\([^()]*\)\s*$").ok()?;
    let stripped = comment.replace(raw, "");

    DateTime::parse_from_rfc2822(&stripped)
        .or_else(|_| DateTime::parse_from_rfc3339(&stripped))
        .ok()
}

/// Parse the HTML body of a Scholar alert email into paper records.
///
/// Every record carries the message's date and subject. Returns an empty
/// list when the body contains no `h3`.
pub fn parse_alert_email(headers: &MessageHeaders, html: &str) -> Result<Vec<PaperRecord>> {
    let document = Html::parse_document(html);
    let title_selector = Selector::parse("h3").map_err(|e| AlertsError::Parse(e.to_string()))?;

    let date = parse_header_date(&headers.date);
    if date.is_none() && !headers.date.is_empty() {
        warn!(date = %headers.date, "Unrecognised Date header");
    }

    let mut papers = Vec::new();
    let Some(mut pt) = document.select(&title_selector).next() else {
        return Ok(papers);
    };

    loop {
        let mut paper = PaperRecord {
            title: String::new(),
            authors: String::new(),
            snippet: String::new(),
            date,
            subject: headers.subject.clone(),
        };

        let mut cursor = Some(pt);
        let mut has_title = false;
        if is_tag(pt, "h3") {
            // Whitespace-only titles still count; only an h3 with no text ends the walk
            has_title = pt.text().any(|t| !t.is_empty());
            paper.title = element_text(pt);
            cursor = next_element(pt);

            if let Some(el) = cursor.filter(|el| is_author(*el)) {
                paper.authors = element_text(el);
                cursor = next_element(el);
            }
            if let Some(el) = cursor.filter(|el| is_snippet(*el)) {
                paper.snippet = element_text(el);
                cursor = next_element(el);
            }
            if let Some(el) = cursor.filter(|el| is_tag(*el, "table")) {
                cursor = next_element(el).and_then(next_element);
            }
        }
        cursor = cursor.and_then(next_element);

        if has_title {
            papers.push(paper);
        }

        match cursor {
            Some(next) if has_title => pt = next,
            _ => break,
        }
    }

    Ok(papers)
}

/// Next sibling that is an element, skipping text and comments
fn next_element(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    el.next_siblings().find_map(ElementRef::wrap)
}

fn is_tag(el: ElementRef<'_>, name: &str) -> bool {
    el.value().name() == name
}

fn is_author(el: ElementRef<'_>) -> bool {
    is_tag(el, "div")
        && el
            .value()
            .attr("style")
            .is_some_and(|style| normalize_style(style) == AUTHOR_STYLE)
}

fn is_snippet(el: ElementRef<'_>) -> bool {
    is_tag(el, "div")
        && el
            .value()
            .attr("class")
            .and_then(|class| class.split_whitespace().next())
            == Some(SNIPPET_CLASS)
}

/// Lowercase, drop whitespace and a trailing `;`
fn normalize_style(style: &str) -> String {
    let compact: String = style
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    compact.trim_end_matches(';').to_string()
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers() -> MessageHeaders {
        MessageHeaders {
            date: "Mon, 3 Feb 2020 10:00:00 -0800".to_string(),
            subject: "New citations to my articles".to_string(),
        }
    }

    fn paper_block(title: &str, authors: &str, snippet: &str) -> String {
        format!(
            r#"<h3 style="font-weight:normal"><a class="gse_alrt_title" href="https://scholar.google.com/x">{title}</a></h3>
<div style="color:#006621">{authors}</div>
<div class="gse_alrt_sni" style="line-height:17px">{snippet}</div>
<table cellpadding="0"><tr><td>share</td></tr></table>
<br><br>
"#
        )
    }

    #[test]
    fn test_single_paper_example() {
        let html = r#"<html><body>
<h3>Paper A</h3>
<div style="color:#006621">A Author, B Author - Journal, 2020</div>
<div class="gse_alrt_sni">This paper shows things.</div>
</body></html>"#;

        let papers = parse_alert_email(&headers(), html).expect("Parse failed");
        assert_eq!(papers.len(), 1);
        let paper = &papers[0];
        assert_eq!(paper.title, "Paper A");
        assert_eq!(paper.authors, "A Author, B Author - Journal, 2020");
        assert_eq!(paper.snippet, "This paper shows things.");
        assert_eq!(paper.subject, "New citations to my articles");
        assert_eq!(paper.date, parse_header_date("Mon, 3 Feb 2020 10:00:00 -0800"));
        assert!(paper.date.is_some());
    }

    #[test]
    fn test_n_titles_yield_n_records() {
        let mut html = String::from("<html><body><p>Scholar Alert</p>");
        for i in 0..4 {
            html.push_str(&paper_block(&format!("Title {i}"), &format!("Author {i}"), "snip"));
        }
        html.push_str("<p>footer</p></body></html>");

        let papers = parse_alert_email(&headers(), &html).expect("Parse failed");
        assert_eq!(papers.len(), 4);
        for (i, paper) in papers.iter().enumerate() {
            assert_eq!(paper.title, format!("Title {i}"));
            assert_eq!(paper.authors, format!("Author {i}"));
            assert_eq!(paper.subject, headers().subject);
            assert_eq!(paper.date, papers[0].date);
        }
    }

    #[test]
    fn test_missing_author_leaves_field_empty() {
        let html = r#"<body>
<h3>No authors here</h3>
<div class="gse_alrt_sni">snippet only</div>
</body>"#;
        let papers = parse_alert_email(&headers(), html).expect("Parse failed");
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].authors, "");
        assert_eq!(papers[0].snippet, "snippet only");
    }

    #[test]
    fn test_malformed_author_style_leaves_field_empty() {
        let html = r#"<body>
<h3>Paper</h3>
<div style="color:#123456">Not the author line</div>
</body>"#;
        let papers = parse_alert_email(&headers(), html).expect("Parse failed");
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].authors, "");
        assert_eq!(papers[0].snippet, "");
    }

    #[test]
    fn test_author_style_tolerates_spacing() {
        let html = r#"<body><h3>Paper</h3><div style="COLOR: #006621;">Someone</div></body>"#;
        let papers = parse_alert_email(&headers(), html).expect("Parse failed");
        assert_eq!(papers[0].authors, "Someone");
    }

    #[test]
    fn test_no_h3_yields_nothing() {
        let papers = parse_alert_email(&headers(), "<html><body><p>hi</p></body></html>")
            .expect("Parse failed");
        assert!(papers.is_empty());
    }

    #[test]
    fn test_walk_stops_at_non_title() {
        let html = format!(
            "<body>{}<p>unsubscribe</p><p>more</p><h3>Never reached</h3></body>",
            paper_block("Only", "Me", "text")
        );
        let papers = parse_alert_email(&headers(), &html).expect("Parse failed");
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].title, "Only");
    }

    #[test]
    fn test_empty_title_stops_walk() {
        let html = "<body><h3></h3><br><br><h3>Later</h3></body>";
        let papers = parse_alert_email(&headers(), html).expect("Parse failed");
        assert!(papers.is_empty());
    }

    #[test]
    fn test_whitespace_title_keeps_walking() {
        let html = "<body><h3>A</h3><br><h3> </h3><br><h3>C</h3></body>";
        let papers = parse_alert_email(&headers(), html).expect("Parse failed");
        let titles: Vec<&str> = papers.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "", "C"]);
    }

    #[test]
    fn test_header_date_variants() {
        assert!(parse_header_date("Tue, 4 Feb 2020 01:02:03 +0000 (UTC)").is_some());
        assert!(parse_header_date("2020-02-04T01:02:03Z").is_some());
        assert!(parse_header_date("").is_none());
        assert!(parse_header_date("yesterday").is_none());
    }

    #[test]
    fn test_unparseable_date_keeps_records() {
        let headers = MessageHeaders {
            date: "not a date".to_string(),
            subject: "s".to_string(),
        };
        let papers = parse_alert_email(&headers, "<body><h3>T</h3></body>").expect("Parse failed");
        assert_eq!(papers.len(), 1);
        assert!(papers[0].date.is_none());
    }

    #[test]
    fn test_headers_from_pairs() {
        let headers = MessageHeaders::from_pairs([
            ("From", "Google Scholar Alerts <scholaralerts-noreply@google.com>"),
            ("Subject", "3 new results"),
            ("Date", "Mon, 3 Feb 2020 10:00:00 -0800"),
            ("date", "ignored"),
        ]);
        assert_eq!(headers.subject, "3 new results");
        assert_eq!(headers.date, "Mon, 3 Feb 2020 10:00:00 -0800");
    }
}
