//! Whole-document conversion and table repair.
//!
//! Markdown tables need a separator row between the header and the body;
//! textile tables have none. [`TableState`] remembers whether the previous
//! converted line was a table row so the separator is synthesized exactly
//! once, below the first row of every table block.

use crate::rules::convert_line;

/// Separator used by [`convert_document`].
pub const DEFAULT_LINE_SEPARATOR: &str = "\n";

/// Tracks whether the previous converted line belonged to a table.
///
/// Scoped to a single document: create a fresh one per conversion.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TableState {
    in_table: bool,
}

impl TableState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the last observed line was a table row.
    pub fn in_table(&self) -> bool {
        self.in_table
    }

    /// Record a converted line.
    ///
    /// Returns the separator row to emit directly below `converted` when it
    /// opens a new table block.
    pub fn observe(&mut self, converted: &str) -> Option<String> {
        if !is_table_row(converted) {
            self.in_table = false;
            return None;
        }
        let opens_table = !self.in_table;
        self.in_table = true;
        opens_table.then(|| separator_row(converted))
    }
}

/// A converted line is a table row when it ends with a cell delimiter.
pub fn is_table_row(line: &str) -> bool {
    line.ends_with('|')
}

/// Build `| -- | -- |` with one segment per cell of `header`.
pub fn separator_row(header: &str) -> String {
    let cells = header.matches('|').count().saturating_sub(1);
    std::iter::repeat_n("| -- ", cells)
        .chain(std::iter::once("|"))
        .collect()
}

/// Convert a full textile document to Markdown, splitting on `\n`.
pub fn convert_document(content: &str) -> String {
    convert_document_with(content, DEFAULT_LINE_SEPARATOR)
}

/// Convert a full textile document, splitting on `line_separator`.
///
/// Carriage returns are removed before splitting, so a `"\r\n"` separator
/// never matches; pass `"\n"` for CRLF input. An empty separator falls back
/// to [`DEFAULT_LINE_SEPARATOR`].
pub fn convert_document_with(content: &str, line_separator: &str) -> String {
    let separator = if line_separator.is_empty() {
        DEFAULT_LINE_SEPARATOR
    } else {
        line_separator
    };
    let normalised = content.replace('\r', "");

    let mut state = TableState::new();
    let mut out = String::with_capacity(normalised.len() + 64);
    for line in normalised.split(separator) {
        let converted = convert_line(line);
        let separator_row = state.observe(&converted);
        out.push_str(&converted);
        out.push('\n');
        if let Some(row) = separator_row {
            out.push_str(&row);
            out.push('\n');
        }
    }

    // A blank line left between two table rows splits the table in two.
    let joined = out.replace("|\n\n|", "|\n|");
    finish(&joined)
}

fn finish(document: &str) -> String {
    let trimmed = document.trim_end();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n")
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
