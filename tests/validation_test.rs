//! Unit tests for validation.rs and the header search in sheet.rs

use proptest::prelude::*;
use shipment_tracker::sheet::find_table;
use shipment_tracker::validation::{is_absent_cell, is_numeric_tracking, reference_ok, InputValidator};
use tempfile::tempdir;

#[test]
fn test_validate_source_dir_existing() {
    let dir = tempdir().expect("temp dir");
    assert!(InputValidator::validate_source_dir(dir.path()).is_ok());
}

#[test]
fn test_validate_source_dir_missing() {
    let dir = tempdir().expect("temp dir");
    assert!(InputValidator::validate_source_dir(&dir.path().join("nope")).is_err());
}

#[test]
fn test_validate_source_dir_is_file() {
    let dir = tempdir().expect("temp dir");
    let file = dir.path().join("manifest.pdf");
    std::fs::write(&file, b"%PDF").expect("write");
    assert!(InputValidator::validate_source_dir(&file).is_err());
}

#[test]
fn test_validate_master_path_extension() {
    let dir = tempdir().expect("temp dir");
    assert!(InputValidator::validate_master_path(&dir.path().join("envios.xlsx")).is_ok());
    assert!(InputValidator::validate_master_path(&dir.path().join("ENVIOS.XLSX")).is_ok());
    assert!(InputValidator::validate_master_path(&dir.path().join("envios.csv")).is_err());
    assert!(InputValidator::validate_master_path(&dir.path().join("envios")).is_err());
}

#[test]
fn test_validate_master_path_directory() {
    let dir = tempdir().expect("temp dir");
    let folder = dir.path().join("tabla.xlsx");
    std::fs::create_dir(&folder).expect("mkdir");
    assert!(InputValidator::validate_master_path(&folder).is_err());
}

#[test]
fn test_reference_ok_needs_36_prefix() {
    assert!(reference_ok("F-3601"));
    assert!(reference_ok("Factura F-1200 / F-36"));
    assert!(!reference_ok("F-1200"));
    assert!(!reference_ok("36-F"));
    assert!(!reference_ok("F-"));
}

#[test]
fn test_absent_cells() {
    assert!(is_absent_cell(""));
    assert!(is_absent_cell("nan"));
    assert!(is_absent_cell(" NAN "));
    assert!(!is_absent_cell("0"));
}

proptest! {
    #[test]
    fn prop_reference_with_36_code_is_ok(prefix in "[a-zA-Z ]{0,10}", digits in "[0-9]{0,6}") {
        let text = format!("{prefix}F-36{digits}");
        prop_assert!(reference_ok(&text));
    }

    #[test]
    fn prop_reference_without_36_code_is_rejected(first in "[0-24-9]", rest in "[0-9]{0,6}") {
        let text = format!("F-{first}{rest}");
        prop_assert!(!reference_ok(&text));
    }

    #[test]
    fn prop_numeric_tracking_accepts_digits(digits in "[0-9]{1,20}") {
        prop_assert!(is_numeric_tracking(&digits));
    }

    #[test]
    fn prop_numeric_tracking_rejects_non_digits(s in "[0-9]{0,5}[A-Za-z-][0-9]{0,5}") {
        prop_assert!(!is_numeric_tracking(&s));
    }

    #[test]
    fn prop_find_table_present_iff_some_row_has_all_headers(
        rows in prop::collection::vec(
            prop::collection::vec(prop::sample::select(vec!["ORDEN TRANSPORTE", "destinatario", "Fecha", "", "x"]), 0..4),
            0..6,
        )
    ) {
        let grid: Vec<Vec<String>> = rows
            .iter()
            .map(|r| r.iter().map(|c| (*c).to_string()).collect())
            .collect();
        let expected = grid.iter().any(|row| {
            let upper: Vec<String> = row.iter().map(|c| c.to_uppercase()).collect();
            upper.contains(&"ORDEN TRANSPORTE".to_string()) && upper.contains(&"DESTINATARIO".to_string())
        });
        let found = find_table(&grid, &["ORDEN TRANSPORTE", "DESTINATARIO"]);
        prop_assert_eq!(found.is_some(), expected);
        if let Some(table) = found {
            let header_row = grid.len() - table.rows.len() - 1;
            prop_assert_eq!(table.rows.as_slice(), &grid[header_row + 1..]);
        }
    }
}
