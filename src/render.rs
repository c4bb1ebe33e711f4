//! Static HTML page for the alert table.
//!
//! The table markup uses the common dataframe HTML layout (leading index
//! column, `dataframe` class) so existing `df_style.css` sheets apply.

use crate::aggregate::{AlertTable, GroupedPaper};
use crate::cache::CACHE_COLUMNS;
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::info;

/// Page skeleton; `{stylecss}` and `{table}` are substituted
pub const PAGE_TEMPLATE: &str = r#"
<html>
  <link rel="stylesheet" type="text/css" href="{stylecss}"/>
  <body>
    <div class="container">
        <div class="fixed">
            <span style="font-size:30pt">Papers</span>
            {table}
        </div>
    </div>
  </body>
</html>
"#;

/// Extra class added to the table element
pub const TABLE_CLASS: &str = "mystyle";

/// Cell text for a row without a date
const MISSING_DATE: &str = "NaT";

/// Render the aggregated table
pub fn render_table(table: &AlertTable) -> String {
    let rows = table.rows().iter().map(|row| {
        vec![
            escape_html(&row.title),
            escape_html(&row.authors),
            escape_html(&row.snippet),
            format_date(row.date),
            escape_html(&row.subject),
        ]
    });
    render_rows(&CACHE_COLUMNS, rows)
}

/// Render grouped papers, one row per paper with its dates and subjects stacked
pub fn render_grouped(groups: &[GroupedPaper]) -> String {
    let rows = groups.iter().map(|group| {
        let dates: Vec<String> = group.dates.iter().map(|d| format_date(*d)).collect();
        let subjects: Vec<String> = group.subjects.iter().map(|s| escape_html(s)).collect();
        vec![
            escape_html(&group.title),
            escape_html(&group.authors),
            escape_html(&group.snippet),
            dates.join("<br>"),
            subjects.join("<br>"),
        ]
    });
    render_rows(&CACHE_COLUMNS, rows)
}

/// Cells must already be escaped
fn render_rows<I>(columns: &[&str], rows: I) -> String
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut html = format!("<table border=\"1\" class=\"dataframe {}\">\n", TABLE_CLASS);
    html.push_str("  <thead>\n    <tr style=\"text-align: right;\">\n      <th></th>\n");
    for column in columns {
        html.push_str(&format!("      <th>{}</th>\n", column));
    }
    html.push_str("    </tr>\n  </thead>\n  <tbody>\n");

    for (index, cells) in rows.into_iter().enumerate() {
        html.push_str("    <tr>\n");
        html.push_str(&format!("      <th>{}</th>\n", index));
        for cell in cells {
            html.push_str(&format!("      <td>{}</td>\n", cell));
        }
        html.push_str("    </tr>\n");
    }

    html.push_str("  </tbody>\n</table>");
    html
}

/// Substitute the table markup and stylesheet href into [`PAGE_TEMPLATE`]
pub fn render_page(table_html: &str, stylesheet: &str) -> String {
    PAGE_TEMPLATE
        .replacen("{stylecss}", &escape_html(stylesheet), 1)
        .replacen("{table}", table_html, 1)
}

/// Write the page, creating parent directories as needed
pub fn write_page(path: &Path, page: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, page)?;
    info!("Wrote {:?}", path);
    Ok(())
}

fn format_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format("%Y-%m-%d %H:%M:%S%:z").to_string())
        .unwrap_or_else(|| MISSING_DATE.to_string())
}

/// Escape text for element content and quoted attributes
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::parser::{parse_header_date, PaperRecord};
    use scraper::{Html, Selector};

    fn record(title: &str) -> PaperRecord {
        PaperRecord {
            title: title.to_string(),
            authors: "A & B".to_string(),
            snippet: "uses <script>".to_string(),
            date: parse_header_date("Mon, 3 Feb 2020 10:00:00 -0800"),
            subject: "alert".to_string(),
        }
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">O'Neil & co</a>"#),
            "&lt;a href=&quot;x&quot;&gt;O&#x27;Neil &amp; co&lt;/a&gt;"
        );
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn test_render_table_rows_and_escaping() {
        let table = aggregate(vec![vec![record("Paper A"), record("Paper B")]]);
        let html = render_table(&table);

        assert!(html.starts_with("<table border=\"1\" class=\"dataframe mystyle\">"));
        assert!(html.contains("<th>title</th>"));
        assert!(html.contains("<td>Paper A</td>"));
        assert!(html.contains("<td>A &amp; B</td>"));
        assert!(html.contains("<td>uses &lt;script&gt;</td>"));
        assert!(html.contains("<td>2020-02-03 18:00:00+00:00</td>"));
        assert!(!html.contains("<script>"));

        let document = Html::parse_fragment(&html);
        let body_rows = Selector::parse("tbody tr").expect("selector");
        assert_eq!(document.select(&body_rows).count(), 2);
    }

    #[test]
    fn test_empty_table_yields_valid_page() {
        let table = aggregate(Vec::<Vec<PaperRecord>>::new());
        let page = render_page(&render_table(&table), "df_style.css");

        assert!(page.contains(r#"href="df_style.css""#));
        assert!(page.contains("<tbody>\n  </tbody>"));
        assert!(!page.contains("{table}"));

        let document = Html::parse_document(&page);
        let header_cells = Selector::parse("thead th").expect("selector");
        let body_rows = Selector::parse("tbody tr").expect("selector");
        assert_eq!(document.select(&header_cells).count(), CACHE_COLUMNS.len() + 1);
        assert_eq!(document.select(&body_rows).count(), 0);
    }

    #[test]
    fn test_missing_date_renders_nat() {
        let mut undated = record("Undated");
        undated.date = None;
        let html = render_table(&aggregate(vec![vec![undated]]));
        assert!(html.contains("<td>NaT</td>"));
    }

    #[test]
    fn test_render_grouped_stacks_values() {
        let mut later = record("Same");
        later.date = parse_header_date("Tue, 4 Feb 2020 10:00:00 +0000");
        later.subject = "second".to_string();
        let table = aggregate(vec![vec![record("Same")], vec![later]]);

        let html = render_grouped(&table.group_by_paper());
        assert!(html.contains("<td>alert<br>second</td>"));
        assert!(html.contains("<th>0</th>"));
        assert!(!html.contains("<th>1</th>"));
    }

    #[test]
    fn test_write_page_creates_parent() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out").join("table.html");
        write_page(&path, "<html></html>")?;
        assert_eq!(std::fs::read_to_string(path)?, "<html></html>");
        Ok(())
    }
}
