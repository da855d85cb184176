use rust_xlsxwriter::{Format, Workbook};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{Result, TrackerError};
use crate::models::{CarrierKind, ShipmentRecord, MASTER_COLUMNS};
use crate::sheet;

/// Storage for the master table.
pub trait ShipmentRepository: Send + Sync {
    /// Create an empty table if none exists; returns true when one was created.
    fn ensure_exists(&self) -> Result<bool>;
    /// Every stored row, in order.
    fn load(&self) -> Result<Vec<ShipmentRecord>>;
    /// Replace the stored table with `records`.
    fn save(&self, records: &[ShipmentRecord]) -> Result<()>;
}

/// Master table kept as a single-sheet xlsx workbook.
pub struct XlsxRepository {
    path: PathBuf,
}

impl XlsxRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Positions of the master columns within a header row.
fn column_positions(header: &[String]) -> Result<[usize; 6]> {
    let mut positions = [0usize; 6];
    for (slot, name) in positions.iter_mut().zip(MASTER_COLUMNS) {
        *slot = header
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .ok_or_else(|| TrackerError::InvalidMasterTable(format!("missing column '{name}'")))?;
    }
    Ok(positions)
}

fn cell(row: &[String], idx: usize) -> String {
    row.get(idx).map_or_else(String::new, |v| v.trim().to_string())
}

/// Parse a master-table grid (header row first) into records.
///
/// Blank rows are dropped. Rows without a tracking number are kept as they are.
pub fn records_from_grid(grid: &[Vec<String>]) -> Result<Vec<ShipmentRecord>> {
    let Some((header, rows)) = grid.split_first() else {
        return Ok(Vec::new());
    };
    let [tipo, tracking, consignee, company, reference, status] = column_positions(header)?;

    Ok(rows
        .iter()
        .filter(|row| row.iter().any(|v| !v.trim().is_empty()))
        .map(|row| {
            let reference = cell(row, reference);
            ShipmentRecord {
                carrier: CarrierKind::parse(&cell(row, tipo)),
                tracking_number: cell(row, tracking),
                consignee: cell(row, consignee),
                company: cell(row, company),
                reference: (!reference.is_empty()).then_some(reference),
                status: cell(row, status),
            }
        })
        .collect())
}

impl ShipmentRepository for XlsxRepository {
    fn ensure_exists(&self) -> Result<bool> {
        if self.path.exists() {
            return Ok(false);
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        self.save(&[])?;
        info!("Created master table: {}", self.path.display());
        Ok(true)
    }

    fn load(&self) -> Result<Vec<ShipmentRecord>> {
        let grid = sheet::read_grid(&self.path)?;
        records_from_grid(&grid)
    }

    fn save(&self, records: &[ShipmentRecord]) -> Result<()> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        let bold = Format::new().set_bold();

        for (col, name) in (0u16..).zip(MASTER_COLUMNS) {
            worksheet.write_string_with_format(0, col, name, &bold)?;
        }
        for (row, record) in (1u32..).zip(records) {
            for (col, value) in (0u16..).zip(record.to_row()) {
                worksheet.write_string(row, col, value)?;
            }
        }

        workbook.save(&self.path)?;
        Ok(())
    }
}
