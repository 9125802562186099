//! Exam listing table of one department.

use scraper::Html;

use super::{collapse_whitespace, inner_text, selector, text_content};
use crate::types::{SyncError, SyncResult};

/// Rows with fewer cells are layout rows.
pub const MIN_COLUMNS: usize = 6;

/// Code cell text of the header row.
pub const HEADER_LABEL: &str = "Ders Kod";

/// Dates this short are placeholders.
const MIN_DATE_CHARS: usize = 6;

/// One row of the exam table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamListing {
    pub code: String,
    pub section: String,
    pub exam: String,
    pub date: String,
    pub starting: String,
    pub duration: String,
    /// Hall names joined by single spaces.
    pub hall: String,
}

/// Every qualifying exam row, in document order.
///
/// A page without any table is an anomaly; a table without qualifying rows
/// is an empty listing.
pub fn parse_exam_listing(html: &str) -> SyncResult<Vec<ExamListing>> {
    let document = Html::parse_document(html);
    let table_sel = selector("table")?;
    let row_sel = selector("table tr")?;
    let cell_sel = selector("td")?;

    if document.select(&table_sel).next().is_none() {
        return Err(SyncError::ParseAnomaly {
            context: "exam listing".into(),
            reason: "no table in response".into(),
        });
    }

    let mut listings = Vec::new();
    for row in document.select(&row_sel) {
        let cols: Vec<_> = row.select(&cell_sel).collect();
        if cols.len() < MIN_COLUMNS {
            continue;
        }

        let code = text_content(cols[0]);
        let date = text_content(cols[3]);
        if code.is_empty() || code == HEADER_LABEL || date.chars().count() < MIN_DATE_CHARS {
            continue;
        }

        let hall = cols
            .get(6)
            .map(|c| collapse_whitespace(&inner_text(*c)))
            .unwrap_or_default();

        listings.push(ExamListing {
            code,
            section: text_content(cols[1]),
            exam: text_content(cols[2]),
            date,
            starting: text_content(cols[4]),
            duration: text_content(cols[5]),
            hall,
        });
    }

    Ok(listings)
}
