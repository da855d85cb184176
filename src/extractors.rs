//! Carrier manifest extractors and filename routing.
//!
//! Each carrier has one extractor. Which extractor handles a file is decided by the
//! [`ROUTES`] table: a file kind (PDF or spreadsheet) plus filename keywords.

use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::logging::OperationTimer;
use crate::metrics::MetricsCollector;
use crate::models::{Carrier, ShipmentRecord};
use crate::pdf::{self, PageTable};
use crate::sheet::{self, Table};
use crate::validation::{is_absent_cell, is_numeric_tracking, reference_ok};

/// Header sets accepted for Starken spreadsheets, tried in order.
pub const STARKEN_HEADER_SETS: [[&str; 2]; 3] = [
    ["ORDEN DE TRANSPORTE", "DESTINATARIO"],
    ["ORDEN TRANSPORTE", "DESTINATARIO"],
    ["NUMERO DE SEGUIMIENTO", "DESTINATARIO"],
];

/// Header set of Cruz del Sur spreadsheets.
pub const CRUZ_DEL_SUR_HEADERS: [&str; 2] = ["ORDEN TRANSPORTE", "DESTINATARIO"];

/// Minimum digits of a FedEx tracking number.
pub const FEDEX_MIN_TRACKING_DIGITS: usize = 8;

/// Parses one carrier's manifest format.
pub trait Extractor: Send + Sync {
    /// Carrier whose manifests this extractor reads
    fn carrier(&self) -> Carrier;

    /// Parse `path`, propagating I/O and format errors.
    fn try_extract(&self, path: &Path) -> Result<Vec<ShipmentRecord>>;

    /// Parse `path`; failures are logged and yield no records.
    fn extract(&self, path: &Path) -> Vec<ShipmentRecord> {
        let _timer = OperationTimer::new(&format!("extract:{}", self.carrier().slug()));
        match self.try_extract(path) {
            Ok(records) => records,
            Err(e) => {
                warn!(carrier = %self.carrier(), file = %path.display(), "Could not read manifest: {e}");
                MetricsCollector::default().record_extractor_failure(self.carrier());
                Vec::new()
            },
        }
    }
}

/// Kind of source document, decided by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// `.pdf`
    Pdf,
    /// `.xlsx` or `.xls`
    Spreadsheet,
}

impl SourceKind {
    /// Classify a file name by extension, ignoring case.
    #[must_use]
    pub fn of(file_name: &str) -> Option<Self> {
        let lower = file_name.to_lowercase();
        if lower.ends_with(".pdf") {
            Some(Self::Pdf)
        } else if lower.ends_with(".xlsx") || lower.ends_with(".xls") {
            Some(Self::Spreadsheet)
        } else {
            None
        }
    }
}

/// One filename routing rule.
#[derive(Debug, Clone, Copy)]
pub struct Route {
    /// Required document kind
    pub kind: SourceKind,
    /// Any of these (lowercase) must appear in the file name
    pub keywords: &'static [&'static str],
    /// Carrier the file belongs to
    pub carrier: Carrier,
}

/// Routing rules, checked in order.
pub const ROUTES: [Route; 4] = [
    Route {
        kind: SourceKind::Pdf,
        keywords: &["fedex"],
        carrier: Carrier::FedEx,
    },
    Route {
        kind: SourceKind::Pdf,
        keywords: &["manifiesto", "correos"],
        carrier: Carrier::CorreosDeChile,
    },
    Route {
        kind: SourceKind::Spreadsheet,
        keywords: &["cruz"],
        carrier: Carrier::CruzDelSur,
    },
    Route {
        kind: SourceKind::Spreadsheet,
        keywords: &["starken"],
        carrier: Carrier::Starken,
    },
];

/// Carrier whose manifest `file_name` is, if any rule matches.
#[must_use]
pub fn route(file_name: &str) -> Option<Carrier> {
    let kind = SourceKind::of(file_name)?;
    let lower = file_name.to_lowercase();
    ROUTES
        .iter()
        .find(|r| r.kind == kind && r.keywords.iter().any(|k| lower.contains(k)))
        .map(|r| r.carrier)
}

/// Extractor for `carrier`.
#[must_use]
pub fn extractor_for(carrier: Carrier) -> &'static dyn Extractor {
    match carrier {
        Carrier::FedEx => &FedExPdf,
        Carrier::CorreosDeChile => &CorreosPdf,
        Carrier::Starken => &StarkenSheet,
        Carrier::CruzDelSur => &CruzDelSurSheet,
    }
}

/// Route `path` by its file name and extract it. Unrouted files yield `None`.
pub fn extract_file(path: &Path) -> Option<(Carrier, Vec<ShipmentRecord>)> {
    let file_name = path.file_name()?.to_str()?;
    let Some(carrier) = route(file_name) else {
        debug!(file = file_name, "No carrier rule matches; skipping");
        return None;
    };
    let records = extractor_for(carrier).extract(path);
    info!("{}: {} shipments extracted from {}", carrier, records.len(), file_name);
    Some((carrier, records))
}

// ---------------------------------------------------------------------------
// Spreadsheets
// ---------------------------------------------------------------------------

/// Starken transport-order spreadsheet.
#[derive(Debug, Clone, Copy)]
pub struct StarkenSheet;

/// Cruz del Sur transport-order spreadsheet.
#[derive(Debug, Clone, Copy)]
pub struct CruzDelSurSheet;

/// Records of `table` taking tracking numbers from `order_col` and names from `dest_col`.
fn sheet_records(carrier: Carrier, table: &Table, order_col: usize, dest_col: usize) -> Vec<ShipmentRecord> {
    (0..table.rows.len())
        .filter(|&row| !is_absent_cell(table.cell(row, order_col)))
        .map(|row| ShipmentRecord::new(carrier, table.cell(row, order_col), table.cell(row, dest_col)))
        .collect()
}

/// Starken records from a grid, trying each accepted header set.
#[must_use]
pub fn starken_records(grid: &[Vec<String>]) -> Option<Vec<ShipmentRecord>> {
    STARKEN_HEADER_SETS.iter().find_map(|headers| {
        let table = sheet::find_table(grid, headers)?;
        let order_col = table.find_column(&["ORDEN", "NUMERO"])?;
        let dest_col = table.find_column(&["DESTINATARIO"])?;
        Some(sheet_records(Carrier::Starken, &table, order_col, dest_col))
    })
}

/// Cruz del Sur records from a grid.
#[must_use]
pub fn cruz_del_sur_records(grid: &[Vec<String>]) -> Option<Vec<ShipmentRecord>> {
    let table = sheet::find_table(grid, &CRUZ_DEL_SUR_HEADERS)?;
    let order_col = table.column(CRUZ_DEL_SUR_HEADERS[0])?;
    let dest_col = table.column(CRUZ_DEL_SUR_HEADERS[1])?;
    Some(sheet_records(Carrier::CruzDelSur, &table, order_col, dest_col))
}

impl Extractor for StarkenSheet {
    fn carrier(&self) -> Carrier {
        Carrier::Starken
    }

    fn try_extract(&self, path: &Path) -> Result<Vec<ShipmentRecord>> {
        let grid = sheet::read_grid(path)?;
        Ok(starken_records(&grid).unwrap_or_else(|| {
            warn!("No valid headers found in: {}", path.display());
            Vec::new()
        }))
    }
}

impl Extractor for CruzDelSurSheet {
    fn carrier(&self) -> Carrier {
        Carrier::CruzDelSur
    }

    fn try_extract(&self, path: &Path) -> Result<Vec<ShipmentRecord>> {
        let grid = sheet::read_grid(path)?;
        Ok(cruz_del_sur_records(&grid).unwrap_or_else(|| {
            warn!("No valid headers found in: {}", path.display());
            Vec::new()
        }))
    }
}

// ---------------------------------------------------------------------------
// PDFs
// ---------------------------------------------------------------------------

/// FedEx shipment manifest PDF.
#[derive(Debug, Clone, Copy)]
pub struct FedExPdf;

/// Correos de Chile manifest PDF.
#[derive(Debug, Clone, Copy)]
pub struct CorreosPdf;

/// Accept a FedEx data row: numeric tracking number of at least eight digits in the
/// first cell, consignee in the first line of the third cell.
#[must_use]
pub fn fedex_row(row: &[String]) -> Option<ShipmentRecord> {
    let [first, _, third, ..] = row else {
        return None;
    };
    let tracking = first.trim();
    let consignee = third.trim().lines().next().unwrap_or("").trim();
    if tracking.is_empty() || consignee.is_empty() {
        return None;
    }
    if !is_numeric_tracking(tracking) || tracking.len() < FEDEX_MIN_TRACKING_DIGITS {
        return None;
    }
    Some(ShipmentRecord::new(Carrier::FedEx, tracking, consignee))
}

/// FedEx records from page tables; each table's first row is its header.
#[must_use]
pub fn fedex_records(tables: &[PageTable]) -> Vec<ShipmentRecord> {
    tables
        .iter()
        .flat_map(|table| table.iter().skip(1).filter_map(|row| fedex_row(row)))
        .collect()
}

/// Column positions of `DESTINATARIO`, `REFERENCIA` and `SEGUIMIENTO` when `row` is a
/// Correos de Chile header.
fn correos_columns(row: &[String]) -> Option<(usize, usize, usize)> {
    let header: Vec<String> = row.iter().map(|c| c.trim().to_uppercase()).collect();
    let position = |name: &str| header.iter().position(|c| c == name);
    Some((position("DESTINATARIO")?, position("REFERENCIA")?, position("SEGUIMIENTO")?))
}

/// Correos de Chile records from page tables.
///
/// The header is the first row naming `DESTINATARIO`, `REFERENCIA` and `SEGUIMIENTO`;
/// rows above it are page titles. Pages without such a row are skipped.
/// A row is kept when its reference carries a `F-36…` code and its tracking cell is numeric.
#[must_use]
pub fn correos_records(tables: &[PageTable]) -> Vec<ShipmentRecord> {
    let mut records = Vec::new();
    for table in tables {
        let header = table
            .iter()
            .enumerate()
            .find_map(|(i, row)| correos_columns(row).map(|columns| (i, columns)));
        let Some((header_row, (idx_dest, idx_ref, idx_track))) = header else {
            debug!("Skipping table without Correos de Chile columns");
            continue;
        };
        let needed = idx_dest.max(idx_ref).max(idx_track);
        for row in table.iter().skip(header_row + 1).filter(|r| r.len() > needed) {
            let reference = row[idx_ref].trim();
            let tracking = row[idx_track].trim();
            if reference_ok(reference) && is_numeric_tracking(tracking) {
                records.push(
                    ShipmentRecord::new(Carrier::CorreosDeChile, tracking, row[idx_dest].trim())
                        .with_reference(reference),
                );
            }
        }
    }
    records
}

impl Extractor for FedExPdf {
    fn carrier(&self) -> Carrier {
        Carrier::FedEx
    }

    fn try_extract(&self, path: &Path) -> Result<Vec<ShipmentRecord>> {
        Ok(fedex_records(&pdf::extract_tables(path)?))
    }
}

impl Extractor for CorreosPdf {
    fn carrier(&self) -> Carrier {
        Carrier::CorreosDeChile
    }

    fn try_extract(&self, path: &Path) -> Result<Vec<ShipmentRecord>> {
        Ok(correos_records(&pdf::extract_tables(path)?))
    }
}
