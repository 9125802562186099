//! Structured extraction from portal result markup.
//!
//! Every parser here is synchronous and returns owned records, so no parsed
//! document outlives the call. A page missing its expected container is a
//! [`SyncError::ParseAnomaly`]; malformed rows inside it are skipped.

pub mod calendar;
pub mod grid;
pub mod listing;

use scraper::{ElementRef, Node, Selector};

use crate::types::{SyncError, SyncResult};

pub use calendar::parse_calendar;
pub use grid::{parse_grid, GridCell, SessionCandidate};
pub use listing::{parse_exam_listing, ExamListing};

/// Elements rendered on their own line.
const BLOCK_TAGS: &[&str] = &[
    "address", "blockquote", "div", "dl", "dt", "dd", "fieldset", "form", "h1", "h2", "h3",
    "h4", "h5", "h6", "hr", "li", "ol", "p", "pre", "section", "table", "tr", "ul",
];

/// Elements whose text is never rendered.
const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template"];

pub(crate) fn selector(css: &str) -> SyncResult<Selector> {
    Selector::parse(css).map_err(|e| SyncError::ParseAnomaly {
        context: css.to_string(),
        reason: format!("invalid selector: {e}"),
    })
}

/// Rendered text of an element, one visual line per output line.
///
/// Whitespace inside a line collapses to single spaces, `<br>` and block
/// boundaries start new lines, and blank lines are dropped.
pub fn inner_text(el: ElementRef<'_>) -> String {
    let mut raw = String::new();
    push_rendered(el, &mut raw);

    raw.split('\n')
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn push_rendered(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => {
                out.extend(text.chars().map(|c| if c.is_whitespace() { ' ' } else { c }));
            }
            Node::Element(e) => {
                let name = e.name();
                if name == "br" {
                    out.push('\n');
                    continue;
                }
                if HIDDEN_TAGS.contains(&name) {
                    continue;
                }
                let block = BLOCK_TAGS.contains(&name);
                if block {
                    out.push('\n');
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    push_rendered(child_el, out);
                }
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

/// Concatenated text of every descendant, trimmed.
pub fn text_content(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Collapse every whitespace run to one space and trim.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split `"CENG 101 1"` at its last space into `("CENG 101", "1")`.
pub fn split_code_section(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    let (code, section) = line.rsplit_once(' ')?;
    let (code, section) = (code.trim(), section.trim());
    if code.is_empty() || section.is_empty() {
        return None;
    }
    Some((code.to_string(), section.to_string()))
}
