//! Table reconstruction from PDF manifests.
//!
//! Manifests are single-table-per-page reports. Each page's content stream is walked
//! with a small text-state machine that records where every shown string starts.
//! Strings sharing a baseline form a row. Within a row, a horizontal gap wider than
//! the font size starts a new cell, as do tabs or runs of two or more spaces inside
//! one string.

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

use crate::error::Result;

/// Rows of one page's table, top to bottom.
pub type PageTable = Vec<Vec<String>>;

/// Baselines closer than this (in points) belong to the same row.
const ROW_TOLERANCE: f32 = 2.0;

/// Average glyph advance as a fraction of the font size.
const GLYPH_WIDTH_RATIO: f32 = 0.5;

/// `TJ` adjustments (thousandths of an em) at or below this read as a space.
const TJ_SPACE_ADJUSTMENT: f32 = -200.0;

const DEFAULT_FONT_SIZE: f32 = 10.0;

#[allow(clippy::expect_used)]
fn cell_separator() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\t+| {2,}").expect("separator pattern is valid"))
}

/// A string shown at a known text-space position.
#[derive(Debug, Clone, PartialEq)]
struct Fragment {
    x: f32,
    y: f32,
    font_size: f32,
    text: String,
}

impl Fragment {
    fn estimated_end(&self) -> f32 {
        self.x + self.text.chars().count() as f32 * self.font_size * GLYPH_WIDTH_RATIO
    }
}

/// Text-line position, leading and font size between operators.
struct TextState {
    line: (f32, f32),
    leading: f32,
    font_size: f32,
    /// A string was shown since the last positioning operator
    continued: bool,
}

impl TextState {
    fn move_to(&mut self, x: f32, y: f32) {
        self.line = (x, y);
        self.continued = false;
    }

    fn next_line(&mut self) {
        self.move_to(self.line.0, self.line.1 - self.leading);
    }

    fn show(&mut self, text: String, out: &mut Vec<Fragment>) {
        match out.last_mut() {
            Some(last) if self.continued => last.text.push_str(&text),
            _ => out.push(Fragment {
                x: self.line.0,
                y: self.line.1,
                font_size: self.font_size,
                text,
            }),
        }
        self.continued = true;
    }
}

/// Decode a string operand: UTF-16BE when it carries a byte-order mark, Latin-1 otherwise.
fn decode_string(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        },
        _ => bytes.iter().copied().map(char::from).collect(),
    }
}

fn operand_text(object: Option<&Object>) -> String {
    match object {
        Some(Object::String(bytes, _)) => decode_string(bytes),
        _ => String::new(),
    }
}

/// Text of a `TJ` array; large negative kerning becomes a space.
fn array_text(object: Option<&Object>) -> String {
    let Some(Object::Array(items)) = object else {
        return String::new();
    };
    let mut text = String::new();
    for item in items {
        match item {
            Object::String(bytes, _) => text.push_str(&decode_string(bytes)),
            other => {
                if other.as_float().is_ok_and(|adjust| adjust <= TJ_SPACE_ADJUSTMENT) {
                    text.push(' ');
                }
            },
        }
    }
    text
}

/// Positioned strings of one content stream, in drawing order.
fn fragments(operations: &[Operation]) -> Vec<Fragment> {
    let mut state = TextState {
        line: (0.0, 0.0),
        leading: 0.0,
        font_size: DEFAULT_FONT_SIZE,
        continued: false,
    };
    let mut out = Vec::new();

    for op in operations {
        let numbers: Vec<f32> = op.operands.iter().filter_map(|o| o.as_float().ok()).collect();
        match op.operator.as_str() {
            "BT" => state.move_to(0.0, 0.0),
            "Tf" => {
                if let Some(size) = numbers.last() {
                    state.font_size = size.abs();
                }
            },
            "TL" => {
                if let [leading] = numbers[..] {
                    state.leading = leading;
                }
            },
            "Td" => {
                if let [tx, ty] = numbers[..] {
                    state.move_to(state.line.0 + tx, state.line.1 + ty);
                }
            },
            "TD" => {
                if let [tx, ty] = numbers[..] {
                    state.leading = -ty;
                    state.move_to(state.line.0 + tx, state.line.1 + ty);
                }
            },
            "Tm" => {
                if let [_, _, _, _, e, f] = numbers[..] {
                    state.move_to(e, f);
                }
            },
            "T*" => state.next_line(),
            "Tj" => state.show(operand_text(op.operands.first()), &mut out),
            "TJ" => state.show(array_text(op.operands.first()), &mut out),
            "'" => {
                state.next_line();
                state.show(operand_text(op.operands.first()), &mut out);
            },
            "\"" => {
                state.next_line();
                state.show(operand_text(op.operands.get(2)), &mut out);
            },
            _ => {},
        }
    }
    out
}

/// Cells of one row, left to right.
fn row_cells(mut line: Vec<Fragment>) -> Vec<String> {
    line.sort_by(|a, b| a.x.total_cmp(&b.x));
    let mut merged: Vec<String> = Vec::new();
    let mut end = f32::NEG_INFINITY;
    for fragment in &line {
        let text = fragment.text.trim();
        match merged.last_mut() {
            Some(cell) if fragment.x - end < fragment.font_size => {
                cell.push(' ');
                cell.push_str(text);
            },
            _ => merged.push(text.to_string()),
        }
        end = fragment.estimated_end();
    }
    merged
        .iter()
        .flat_map(|cell| cell_separator().split(cell))
        .map(str::trim)
        .filter(|cell| !cell.is_empty())
        .map(str::to_string)
        .collect()
}

/// Group positioned strings into rows, top of the page first.
fn table_from_fragments(mut fragments: Vec<Fragment>) -> PageTable {
    fragments.retain(|f| !f.text.trim().is_empty());
    fragments.sort_by(|a, b| b.y.total_cmp(&a.y));

    let mut table = Vec::new();
    let mut line: Vec<Fragment> = Vec::new();
    for fragment in fragments {
        if line.first().is_some_and(|first| first.y - fragment.y > ROW_TOLERANCE) {
            table.push(row_cells(std::mem::take(&mut line)));
        }
        line.push(fragment);
    }
    if !line.is_empty() {
        table.push(row_cells(line));
    }
    table
}

/// Rebuild the table drawn by one page's content operations.
#[must_use]
pub fn page_table(operations: &[Operation]) -> PageTable {
    table_from_fragments(fragments(operations))
}

/// Extract one table per page from the PDF at `path`.
///
/// Pages without text yield no table.
pub fn extract_tables(path: &Path) -> Result<Vec<PageTable>> {
    let document = Document::load(path)?;
    let mut tables = Vec::new();
    for page_id in document.get_pages().into_values() {
        let content = Content::decode(&document.get_page_content(page_id)?)?;
        let table = page_table(&content.operations);
        if !table.is_empty() {
            tables.push(table);
        }
    }
    Ok(tables)
}
