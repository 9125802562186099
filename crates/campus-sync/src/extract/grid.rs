//! Weekly schedule grid of one classroom.
//!
//! Row 0 is the header. Column 0 of every other row holds the time range,
//! columns 1.. hold one cell per weekday. A non-blank cell reads
//!
//! ```text
//! CENG 101 1
//! Dr. Jane Doe
//! ```
//!
//! i.e. `<course code> <section>` on the first line and the instructor on
//! the last.

use scraper::Html;

use super::{inner_text, selector, split_code_section};
use crate::types::{SyncError, SyncResult};

/// Container of the schedule grid.
pub const GRID_SELECTOR: &str = "#GridView1";

/// Cells this short are treated as empty.
const MIN_CELL_CHARS: usize = 3;

/// Academic names this short are noise.
const MIN_ACADEMIC_CHARS: usize = 4;

/// One non-blank weekday cell of the grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridCell {
    /// Column index; 1 is the first weekday.
    pub day: u8,
    /// Time taken from the row's range cell.
    pub time: String,
    /// Rendered cell text.
    pub raw: String,
}

/// A parsed cell, not yet resolved against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCandidate {
    pub day: u8,
    pub time: String,
    pub course_code: String,
    pub section: String,
    pub instructor: String,
}

impl GridCell {
    fn lines(&self) -> impl Iterator<Item = &str> {
        self.raw.lines().map(str::trim).filter(|l| !l.is_empty())
    }

    /// Course code from the first line, if it splits into code and section.
    pub fn course_code(&self) -> Option<String> {
        self.lines()
            .next()
            .and_then(split_code_section)
            .map(|(code, _)| code)
    }

    /// Instructor name from the last line of a multi-line cell.
    pub fn academic_name(&self) -> Option<String> {
        let lines: Vec<&str> = self.lines().collect();
        match lines.as_slice() {
            [_, .., last] if last.chars().count() >= MIN_ACADEMIC_CHARS => {
                Some(last.to_string())
            }
            _ => None,
        }
    }

    /// Full session reading; `None` when the cell does not fit the layout.
    pub fn to_session(&self) -> Option<SessionCandidate> {
        let lines: Vec<&str> = self.lines().collect();
        let [first, .., last] = lines.as_slice() else {
            return None;
        };
        let (course_code, section) = split_code_section(first)?;

        Some(SessionCandidate {
            day: self.day,
            time: self.time.clone(),
            course_code,
            section,
            instructor: last.to_string(),
        })
    }
}

/// Time of a row from its range cell.
///
/// `"08:20/09:10"` yields `"09:10"`; ranges with `-` behave the same; any
/// other text is returned trimmed.
pub fn session_time(range: &str) -> String {
    let range = range.trim();
    let delimiter = if range.contains('/') {
        '/'
    } else if range.contains('-') {
        '-'
    } else {
        return range.to_string();
    };
    range
        .split(delimiter)
        .nth(1)
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

/// All non-blank weekday cells of the grid, row by row.
pub fn parse_grid(html: &str) -> SyncResult<Vec<GridCell>> {
    let document = Html::parse_document(html);
    let grid_sel = selector(GRID_SELECTOR)?;
    let row_sel = selector("tr")?;
    let cell_sel = selector("td")?;

    let grid = document
        .select(&grid_sel)
        .next()
        .ok_or_else(|| SyncError::ParseAnomaly {
            context: "schedule grid".into(),
            reason: format!("{GRID_SELECTOR} not found"),
        })?;

    let mut cells = Vec::new();
    for row in grid.select(&row_sel).skip(1) {
        let tds: Vec<_> = row.select(&cell_sel).collect();
        let [range, days @ ..] = tds.as_slice() else {
            continue;
        };
        if days.is_empty() {
            continue;
        }

        let time = session_time(&inner_text(*range));
        for (offset, td) in days.iter().enumerate() {
            let Ok(day) = u8::try_from(offset + 1) else {
                break;
            };
            let raw = inner_text(*td);
            if raw.chars().count() >= MIN_CELL_CHARS {
                cells.push(GridCell {
                    day,
                    time: time.clone(),
                    raw,
                });
            }
        }
    }

    Ok(cells)
}
