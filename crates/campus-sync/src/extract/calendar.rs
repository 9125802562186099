//! Academic calendar page.
//!
//! The page is one long run of table rows. Heading rows set the school type
//! and term that apply to the dated rows below them until the next heading.

use regex::Regex;
use scraper::Html;

use super::{collapse_whitespace, selector, text_content};
use crate::types::{CalendarEntry, SyncError, SyncResult};

const SCHOOL_TYPE_MARKER: &str = "AKADEMİK TAKVİMİ";
const YEAR_MARKER: &str = "ÖĞRETİM YILI";
const TERM_MARKERS: &[&str] = &["YARIYILI", "YAZ ÖĞRETİMİ"];
const DATE_HEADER: &str = "TARİH";

/// Term headings are short; longer rows mentioning a term are descriptions.
const MAX_TERM_CHARS: usize = 50;
const MIN_DATE_CHARS: usize = 4;

pub const DEFAULT_SCHOOL_TYPE: &str = "GENEL TAKVİM";
pub const DEFAULT_TERM: &str = "GENEL DÖNEM";
const BARE_SCHOOL_TYPE: &str = "AKADEMİK TAKVİM";

/// Identifier of the `n`th (1-based) calendar entry.
pub fn calendar_id(sequence: u32) -> String {
    format!("calendar-{sequence:04}")
}

/// Every dated calendar row with its governing school type and term.
///
/// A page without any table is an anomaly.
pub fn parse_calendar(html: &str) -> SyncResult<Vec<CalendarEntry>> {
    let document = Html::parse_document(html);
    let table_sel = selector("table")?;
    let row_sel = selector("table tr")?;
    let cell_sel = selector("td")?;
    let marker = Regex::new(&format!("(?i){SCHOOL_TYPE_MARKER}")).map_err(|e| {
        SyncError::ParseAnomaly {
            context: "calendar".into(),
            reason: e.to_string(),
        }
    })?;

    if document.select(&table_sel).next().is_none() {
        return Err(SyncError::ParseAnomaly {
            context: "academic calendar".into(),
            reason: "no table in page".into(),
        });
    }

    let mut school_type = DEFAULT_SCHOOL_TYPE.to_string();
    let mut term = DEFAULT_TERM.to_string();
    let mut entries = Vec::new();

    for row in document.select(&row_sel) {
        let raw = collapse_whitespace(&row.text().collect::<String>());
        let upper = raw.to_uppercase();

        if upper.contains(SCHOOL_TYPE_MARKER) && !upper.contains(YEAR_MARKER) {
            let stripped = marker.replace_all(&raw, "").trim().to_string();
            school_type = if stripped.is_empty() {
                BARE_SCHOOL_TYPE.to_string()
            } else {
                stripped
            };
            tracing::debug!(%school_type, "calendar school type");
            continue;
        }

        if TERM_MARKERS.iter().any(|m| upper.contains(m))
            && raw.chars().count() < MAX_TERM_CHARS
        {
            term = raw;
            tracing::debug!(%term, "calendar term");
            continue;
        }

        let cols: Vec<_> = row.select(&cell_sel).collect();
        let [date_cell, description_cell, ..] = cols.as_slice() else {
            continue;
        };
        let date = text_content(*date_cell);
        let description = text_content(*description_cell);

        if date.is_empty()
            || description.is_empty()
            || date == DATE_HEADER
            || date.chars().count() < MIN_DATE_CHARS
        {
            continue;
        }

        let sequence = entries.len() as u32 + 1;
        entries.push(CalendarEntry {
            id: calendar_id(sequence),
            school_type: school_type.clone(),
            term: term.clone(),
            date,
            description,
            sequence,
        });
    }

    Ok(entries)
}
