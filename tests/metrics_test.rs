//! Unit tests for metrics.rs and the logging timer

use shipment_tracker::logging::OperationTimer;
use shipment_tracker::metrics::{LookupOutcome, MetricsCollector};
use shipment_tracker::Carrier;
use std::time::Duration;

#[test]
fn test_metrics_collector_default_names() {
    let collector = MetricsCollector::default();
    assert_eq!(collector.records_extracted_total, "shiptrack_records_extracted_total");
    assert_eq!(collector.rows_appended_total, "shiptrack_rows_appended_total");
    assert_eq!(collector.status_lookups_total, "shiptrack_status_lookups_total");
    assert_eq!(collector.status_lookup_duration, "shiptrack_status_lookup_duration_seconds");
    assert_eq!(collector.captcha_attempts_total, "shiptrack_captcha_attempts_total");
    assert_eq!(collector.extractor_failures_total, "shiptrack_extractor_failures_total");
}

#[test]
fn test_metric_names_share_prefix() {
    let collector = MetricsCollector::default();
    for name in [
        collector.records_extracted_total,
        collector.rows_appended_total,
        collector.status_lookups_total,
        collector.status_lookup_duration,
        collector.captcha_attempts_total,
        collector.extractor_failures_total,
    ] {
        assert!(name.starts_with("shiptrack_"), "{name}");
    }
}

#[test]
fn test_lookup_outcome_from_status_text() {
    assert_eq!(LookupOutcome::classify(Some("Entregada")), LookupOutcome::Status);
    assert_eq!(LookupOutcome::classify(Some("No disponible")), LookupOutcome::Status);
    assert_eq!(
        LookupOutcome::classify(Some("Error: operation timed out")),
        LookupOutcome::Error
    );
    assert_eq!(
        LookupOutcome::classify(Some("Error navegador: session not created")),
        LookupOutcome::Error
    );
    assert_eq!(LookupOutcome::classify(None), LookupOutcome::NoResult);
}

#[test]
fn test_recording_every_carrier_without_recorder() {
    let collector = MetricsCollector::default();
    for carrier in Carrier::ALL {
        collector.record_extracted(carrier, 2);
        collector.record_extractor_failure(carrier);
        collector.record_lookup(carrier, LookupOutcome::Status, Duration::from_millis(12));
    }
    collector.record_appended(4);
    collector.record_captcha_attempt(true);
    collector.record_captcha_attempt(false);
}

#[test]
fn test_operation_timer_measures_elapsed_time() {
    let timer = OperationTimer::new("test_operation");
    std::thread::sleep(Duration::from_millis(5));
    assert!(timer.elapsed() >= Duration::from_millis(5));
    assert!(timer.finish() >= 5);
}
