//! Shipment Tracker - Carrier Manifest Reconciliation
//!
//! A Rust library that merges shipment manifests from several Chilean carriers into
//! one master spreadsheet and refreshes each shipment's delivery status.
//!
//! # Features
//!
//! - Extract shipments from FedEx and Correos de Chile PDFs
//! - Extract shipments from Starken and Cruz del Sur spreadsheets
//! - Look up statuses over HTTP (FedEx, Correos) or a scripted browser (Starken)
//! - Query Cruz del Sur through its captcha-guarded form with a solving service
//! - Keep the master table free of duplicate tracking numbers

/// Scripted browser sessions
pub mod browser;
/// Captcha capture and solving
pub mod captcha;
/// Configuration management
pub mod config;
/// Cruz del Sur captcha protocol
pub mod cruz_del_sur;
/// Error types
pub mod error;
/// Manifest extractors and filename routing
pub mod extractors;
/// HTTP status scrapers
pub mod http_status;
/// Logging setup and utilities
pub mod logging;
/// Status lookup trait and registry
pub mod lookup;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// PDF text tables
pub mod pdf;
/// Bounded polling
pub mod poll;
/// Master table storage
pub mod repository;
/// Reconciliation workflow
pub mod service;
/// Spreadsheet reading
pub mod sheet;
/// Starken browser lookup
pub mod starken;
/// Input validation
pub mod validation;

// Re-export key components for easier access
pub use error::{Result, TrackerError};
pub use lookup::{StatusLookup, StatusLookups};
pub use models::{Carrier, CarrierKind, ReconcileReport, ShipmentRecord};
pub use repository::{ShipmentRepository, XlsxRepository};
pub use service::ReconcileService;
