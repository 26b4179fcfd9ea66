//! Plain-text tables for the `sniff`, `columns` and `preview` reports.
//!
//! Columns are padded to their widest visible cell and separated by two
//! spaces. ANSI colour sequences do not count towards the width, and line
//! breaks or tabs inside a cell are flattened to spaces so every row stays on
//! one terminal line.

use std::fmt;

const GUTTER: &str = "  ";
const MIN_RULE_WIDTH: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TextTable {
    pub fn new<S: AsRef<str>>(headers: &[S]) -> Self {
        Self {
            headers: headers.iter().map(|h| clean_cell(h.as_ref())).collect(),
            rows: Vec::new(),
        }
    }

    /// Cells past the header count are dropped; short rows get blank cells.
    pub fn push_row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut row = cells
            .into_iter()
            .take(self.headers.len())
            .map(|cell| clean_cell(cell.as_ref()))
            .collect::<Vec<_>>();
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths = self
            .headers
            .iter()
            .map(|h| visible_width(h))
            .collect::<Vec<_>>();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(visible_width(cell));
            }
        }
        widths
    }
}

impl fmt::Display for TextTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widths = self.widths();
        let rule_widths = widths
            .iter()
            .map(|width| (*width).max(MIN_RULE_WIDTH))
            .collect::<Vec<_>>();
        let rule = rule_widths
            .iter()
            .map(|width| "-".repeat(*width))
            .collect::<Vec<_>>();

        write_line(f, &self.headers, &widths)?;
        write_line(f, &rule, &rule_widths)?;
        for row in &self.rows {
            write_line(f, row, &widths)?;
        }
        Ok(())
    }
}

fn write_line(f: &mut fmt::Formatter<'_>, cells: &[String], widths: &[usize]) -> fmt::Result {
    let mut line = String::new();
    for (idx, (cell, width)) in cells.iter().zip(widths).enumerate() {
        if idx > 0 {
            line.push_str(GUTTER);
        }
        line.push_str(cell);
        let padding = width.saturating_sub(visible_width(cell));
        line.extend(std::iter::repeat_n(' ', padding));
    }
    writeln!(f, "{}", line.trim_end_matches(' '))
}

pub fn render_table<S: AsRef<str>>(headers: &[String], rows: &[Vec<S>]) -> String {
    let mut table = TextTable::new(headers);
    for row in rows {
        table.push_row(row);
    }
    table.to_string()
}

/// Missing values render as blank cells.
pub fn render_optional_table(headers: &[String], rows: &[Vec<Option<String>>]) -> String {
    let mut table = TextTable::new(headers);
    for row in rows {
        table.push_row(row.iter().map(|value| value.as_deref().unwrap_or("")));
    }
    table.to_string()
}

pub fn print_table<S: AsRef<str>>(headers: &[String], rows: &[Vec<S>]) {
    print!("{}", render_table(headers, rows));
}

/// Character count without ANSI escape sequences such as `\x1b[31m`.
fn visible_width(value: &str) -> usize {
    let mut in_escape = false;
    value
        .chars()
        .filter(|ch| {
            if in_escape {
                in_escape = *ch != 'm';
                false
            } else if *ch == '\u{1b}' {
                in_escape = true;
                false
            } else {
                true
            }
        })
        .count()
}

fn clean_cell(value: &str) -> String {
    value.replace(['\n', '\r', '\t'], " ")
}
