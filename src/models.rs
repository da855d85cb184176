//! Data models for shipment reconciliation
//!
//! This module contains the carrier enumeration, the shipment record that makes up
//! one row of the master table, and the fixed column layout of that table.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status placeholder for rows whose carrier is not recognized.
pub const STATUS_UNDEFINED: &str = "Sin definir";

/// Status placeholder for Cruz del Sur rows that were not queried this run.
pub const STATUS_NEEDS_MANUAL_CHECK: &str = "Requiere consulta manual";

/// Column headers of the master table, in order.
pub const MASTER_COLUMNS: [&str; 6] = [
    "Tipo",
    "Numero de Seguimiento/Orden",
    "Consignatario/Destinatario",
    "Compañía de Envío",
    "Referencia",
    "Estado",
];

/// Courier companies the tracker knows how to read and query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Carrier {
    /// FedEx (TNT Chile tracking site)
    FedEx,
    /// Correos de Chile
    CorreosDeChile,
    /// Starken
    Starken,
    /// Cruz del Sur
    CruzDelSur,
}

impl Carrier {
    /// Every carrier, in routing order.
    pub const ALL: [Carrier; 4] = [
        Carrier::FedEx,
        Carrier::CorreosDeChile,
        Carrier::CruzDelSur,
        Carrier::Starken,
    ];

    /// Display name written to the `Tipo` and `Compañía de Envío` columns.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::FedEx => "FedEx",
            Self::CorreosDeChile => "Correos de Chile",
            Self::Starken => "Starken",
            Self::CruzDelSur => "Cruz del Sur",
        }
    }

    /// Short lowercase identifier used as a metric and log label.
    #[must_use]
    pub const fn slug(self) -> &'static str {
        match self {
            Self::FedEx => "fedex",
            Self::CorreosDeChile => "correos",
            Self::Starken => "starken",
            Self::CruzDelSur => "cruz_del_sur",
        }
    }

    /// Parse a display name, ignoring case and surrounding whitespace.
    #[must_use]
    pub fn from_display_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.display_name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Carrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Value of the `Tipo` column.
///
/// Rows written by this tool always carry a known carrier; rows edited by hand may
/// name something else, which is kept verbatim so it survives a save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CarrierKind {
    /// One of the supported carriers
    Known(Carrier),
    /// Any other label found in the master table
    Unrecognized(String),
}

impl CarrierKind {
    /// Classify a `Tipo` cell.
    #[must_use]
    pub fn parse(label: &str) -> Self {
        Carrier::from_display_name(label)
            .map_or_else(|| Self::Unrecognized(label.trim().to_string()), Self::Known)
    }

    /// The carrier, if recognized.
    #[must_use]
    pub const fn carrier(&self) -> Option<Carrier> {
        match self {
            Self::Known(c) => Some(*c),
            Self::Unrecognized(_) => None,
        }
    }

    /// Text written back to the `Tipo` column.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Known(c) => c.display_name(),
            Self::Unrecognized(s) => s,
        }
    }
}

/// One row of the master table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipmentRecord {
    /// Carrier that issued the shipment
    pub carrier: CarrierKind,
    /// Tracking or transport-order number; unique within the master table
    pub tracking_number: String,
    /// Recipient name taken from the manifest
    pub consignee: String,
    /// Carrier display name, kept as its own column
    pub company: String,
    /// Reference code (Correos de Chile only)
    pub reference: Option<String>,
    /// Latest human-readable delivery status
    pub status: String,
}

impl ShipmentRecord {
    /// Create a freshly extracted record with an empty status.
    #[must_use]
    pub fn new(carrier: Carrier, tracking_number: impl Into<String>, consignee: impl Into<String>) -> Self {
        Self {
            carrier: CarrierKind::Known(carrier),
            tracking_number: tracking_number.into(),
            consignee: consignee.into(),
            company: carrier.display_name().to_string(),
            reference: None,
            status: String::new(),
        }
    }

    /// Attach a reference code.
    #[must_use]
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        let reference = reference.into();
        self.reference = (!reference.is_empty()).then_some(reference);
        self
    }

    /// Recognized carrier of this row, if any.
    #[must_use]
    pub const fn known_carrier(&self) -> Option<Carrier> {
        self.carrier.carrier()
    }

    /// Cells of this record in [`MASTER_COLUMNS`] order.
    #[must_use]
    pub fn to_row(&self) -> [&str; 6] {
        [
            self.carrier.label(),
            &self.tracking_number,
            &self.consignee,
            &self.company,
            self.reference.as_deref().unwrap_or(""),
            &self.status,
        ]
    }
}

/// Summary of one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Files in the source folder that matched a carrier rule
    pub files_processed: usize,
    /// Records produced by all extractors
    pub records_extracted: usize,
    /// Rows added to the master table
    pub rows_appended: usize,
    /// Rows whose status came from a live lookup this run
    pub rows_refreshed: usize,
    /// Total rows persisted
    pub total_rows: usize,
    /// Cruz del Sur tracking number queried and the status obtained, if any
    pub cruz_del_sur: Option<(String, Option<String>)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_carrier_round_trips_display_name_case_insensitively() {
        assert_eq!(Carrier::from_display_name("cruz del sur"), Some(Carrier::CruzDelSur));
        assert_eq!(Carrier::from_display_name(" FEDEX "), Some(Carrier::FedEx));
        assert_eq!(Carrier::from_display_name("DHL"), None);
    }

    #[test]
    fn test_unrecognized_kind_keeps_label() {
        let kind = CarrierKind::parse("Chilexpress");
        assert_eq!(kind.carrier(), None);
        assert_eq!(kind.label(), "Chilexpress");
    }

    #[test]
    fn test_empty_reference_is_none() {
        let record = ShipmentRecord::new(Carrier::CorreosDeChile, "123", "Ana").with_reference("");
        assert_eq!(record.reference, None);
        assert_eq!(record.company, "Correos de Chile");
    }
}
