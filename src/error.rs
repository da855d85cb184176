//! Error types for the shipment-tracker library.
//!
//! This module provides custom error types using `thiserror` for better error handling
//! and more specific error messages throughout the application.

use thiserror::Error;

/// Errors that can occur in the shipment-tracker application.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors opening or reading a spreadsheet
    #[error("Spreadsheet read error: {0}")]
    SpreadsheetRead(#[from] calamine::Error),

    /// Errors writing the master spreadsheet
    #[error("Spreadsheet write error: {0}")]
    SpreadsheetWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors parsing a PDF document
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// HTTP transport or status errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Screenshot decoding or encoding errors
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// WebDriver session or command errors
    #[error("Browser error: {0}")]
    Browser(String),

    /// The captcha-solving service rejected a request or returned an error code
    #[error("Captcha solver error: {0}")]
    Solver(String),

    /// The master table exists but does not have the expected shape
    #[error("Invalid master table: {0}")]
    InvalidMasterTable(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// General error with context
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Result with TrackerError
pub type Result<T> = std::result::Result<T, TrackerError>;

impl From<fantoccini::error::CmdError> for TrackerError {
    fn from(err: fantoccini::error::CmdError) -> Self {
        TrackerError::Browser(err.to_string())
    }
}

impl From<fantoccini::error::NewSessionError> for TrackerError {
    fn from(err: fantoccini::error::NewSessionError) -> Self {
        TrackerError::Browser(err.to_string())
    }
}

impl From<config::ConfigError> for TrackerError {
    fn from(err: config::ConfigError) -> Self {
        TrackerError::InvalidConfig(err.to_string())
    }
}
