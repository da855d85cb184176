//! Untyped spreadsheet access.
//!
//! Carrier spreadsheets put a title block above the real table, so the header row has
//! to be found by content. The first worksheet is read into a grid of trimmed strings
//! and the first row containing every target header becomes the column header.

use calamine::{open_workbook_auto, Data, Reader};
use std::path::Path;

use crate::error::{Result, TrackerError};

/// A table found below a matched header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    /// Header row values, trimmed and upper-cased
    pub columns: Vec<String>,
    /// Data rows below the header, trimmed
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Index of the first column whose name contains any of `needles`.
    #[must_use]
    pub fn find_column(&self, needles: &[&str]) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| needles.iter().any(|n| c.contains(n)))
    }

    /// Index of the column named exactly `name` (upper-case).
    #[must_use]
    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell text at `row`/`col`, empty when the row is short.
    #[must_use]
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map_or("", String::as_str)
    }
}

/// Render one spreadsheet cell as text.
///
/// Integral floats print without a fractional part, so numeric tracking numbers keep
/// their digits.
#[must_use]
pub fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{f:.0}"),
        other => other.to_string().trim().to_string(),
    }
}

/// Read the first worksheet of `path` as a grid of trimmed strings.
pub fn read_grid(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| TrackerError::Other(format!("Workbook has no worksheets: {}", path.display())))??;
    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

/// Locate the first row of `grid` containing every header in `headers` (case-insensitive).
///
/// The matched row becomes [`Table::columns`] and every row below it is a data row.
/// Returns `None` when no row contains all headers.
#[must_use]
pub fn find_table(grid: &[Vec<String>], headers: &[&str]) -> Option<Table> {
    let wanted: Vec<String> = headers.iter().map(|h| h.trim().to_uppercase()).collect();
    grid.iter().enumerate().find_map(|(idx, row)| {
        let values: Vec<String> = row.iter().map(|v| v.trim().to_uppercase()).collect();
        wanted.iter().all(|h| values.contains(h)).then(|| Table {
            columns: values,
            rows: grid[idx + 1..]
                .iter()
                .map(|r| r.iter().map(|v| v.trim().to_string()).collect())
                .collect(),
        })
    })
}

/// Read `path` and locate a table headed by `headers`.
pub fn load_table_from_excel(path: &Path, headers: &[&str]) -> Result<Option<Table>> {
    let grid = read_grid(path)?;
    Ok(find_table(&grid, headers))
}
