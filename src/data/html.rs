//! HTML polling pages.
//!
//! Some sources publish the polling table as an HTML page rather than CSV.
//! The first `<table>` of the page is flattened into CSV text (one record per
//! `<tr>`, one field per `<th>`/`<td>`) so it goes through the same ingest as
//! any other source.

use scraper::{ElementRef, Html, Selector};

use crate::error::AppError;
use crate::report::Stage;

/// CSV never starts with a tag, so a leading `<` plus a table is enough.
pub fn looks_like_html(text: &str) -> bool {
    text.trim_start().starts_with('<') && text.to_ascii_lowercase().contains("<table")
}

/// First table of `html` as CSV text.
pub fn first_table_csv(html: &str) -> Result<String, AppError> {
    let document = Html::parse_document(html);
    let table_sel = selector("table")?;
    let row_sel = selector("tr")?;
    let cell_sel = selector("th, td")?;

    let table = document
        .select(&table_sel)
        .next()
        .ok_or_else(|| AppError::no_data(Stage::Load, "the HTML source has no <table>"))?;

    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(Vec::new());
    let mut rows = 0usize;
    for row in table.select(&row_sel) {
        let cells: Vec<String> = row.select(&cell_sel).map(cell_text).collect();
        if cells.iter().all(String::is_empty) {
            continue;
        }
        writer.write_record(&cells)?;
        rows += 1;
    }
    if rows == 0 {
        return Err(AppError::no_data(Stage::Load, "the first HTML table has no rows"));
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Config(format!("failed to finish CSV from HTML table: {e}")))?;
    String::from_utf8(bytes).map_err(|e| AppError::Config(format!("HTML table is not UTF-8: {e}")))
}

fn selector(css: &str) -> Result<Selector, AppError> {
    Selector::parse(css).map_err(|e| AppError::Config(format!("invalid selector '{css}': {e:?}")))
}

/// Cell text with whitespace collapsed.
fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html><body>
<p>Opinion polling</p>
<table class="wikitable">
  <thead><tr><th>Date</th><th>Pollster</th><th>Bulstrode</th><th>Lydgate</th></tr></thead>
  <tbody>
    <tr><td>10/01/23</td><td>Bardi
        University</td><td>31%*</td><td>40%</td></tr>
    <tr><td>10/02/23</td><td>Garth, Polling</td><td>30%</td><td>41%</td></tr>
    <tr></tr>
  </tbody>
</table>
<table><tr><td>ignored</td></tr></table>
</body></html>"#;

    #[test]
    fn first_table_becomes_csv() {
        assert!(looks_like_html(PAGE));
        let csv = first_table_csv(PAGE).unwrap();
        assert_eq!(
            csv,
            "Date,Pollster,Bulstrode,Lydgate\n\
             10/01/23,Bardi University,31%*,40%\n\
             10/02/23,\"Garth, Polling\",30%,41%\n"
        );
    }

    #[test]
    fn csv_text_is_not_html() {
        assert!(!looks_like_html("Date,Pollster\n10/01/23,<b>Bardi</b>\n"));
    }

    #[test]
    fn page_without_table_is_no_data() {
        let err = first_table_csv("<html><body><p>nothing</p></body></html>").unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
