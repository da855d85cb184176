use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Result, TrackerError};

/// Literal that spreadsheet exports use for an absent cell.
pub const ABSENT_MARKER: &str = "nan";

/// Validation utilities for command-line inputs and manifest cells
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// The source folder must exist and be a directory
    pub fn validate_source_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(TrackerError::Other(format!(
                "Source folder does not exist: {}",
                path.display()
            )));
        }
        if !path.is_dir() {
            return Err(TrackerError::Other(format!(
                "Source path is not a folder: {}",
                path.display()
            )));
        }
        Ok(())
    }

    /// The master table is always written as xlsx
    pub fn validate_master_path(path: &Path) -> Result<()> {
        let is_xlsx = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("xlsx"));
        if !is_xlsx {
            return Err(TrackerError::Other(format!(
                "Master table must be an .xlsx file: {}",
                path.display()
            )));
        }
        if path.is_dir() {
            return Err(TrackerError::Other(format!(
                "Master table path is a folder: {}",
                path.display()
            )));
        }
        Ok(())
    }
}

#[allow(clippy::expect_used)]
fn reference_code_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"F-(\d+)").expect("reference pattern is valid"))
}

/// True when `text` contains an `F-<digits>` code whose digits start with `36`.
#[must_use]
pub fn reference_ok(text: &str) -> bool {
    reference_code_regex()
        .captures_iter(text)
        .any(|cap| cap[1].starts_with("36"))
}

/// True for a non-empty string made only of ASCII digits.
#[must_use]
pub fn is_numeric_tracking(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_digit())
}

/// True for an empty cell or the absent-value marker.
#[must_use]
pub fn is_absent_cell(text: &str) -> bool {
    let text = text.trim();
    text.is_empty() || text.eq_ignore_ascii_case(ABSENT_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_ok_examples() {
        assert!(reference_ok("F-3601 F-1200"));
        assert!(!reference_ok("F-1200"));
        assert!(!reference_ok(""));
    }

    #[test]
    fn test_numeric_tracking() {
        assert!(is_numeric_tracking("00123"));
        assert!(!is_numeric_tracking(""));
        assert!(!is_numeric_tracking("12a"));
    }

    #[test]
    fn test_absent_cell() {
        assert!(is_absent_cell("  "));
        assert!(is_absent_cell("NaN"));
        assert!(!is_absent_cell("T-001"));
    }
}
