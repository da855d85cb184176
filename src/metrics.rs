use metrics::{counter, histogram};
use std::time::Duration;

use crate::models::Carrier;

/// Metric names emitted by the tracker.
///
/// No recorder is installed by the binary, so these are no-ops unless an embedding
/// application installs one.
pub struct MetricsCollector {
    pub records_extracted_total: &'static str,
    pub rows_appended_total: &'static str,
    pub status_lookups_total: &'static str,
    pub status_lookup_duration: &'static str,
    pub captcha_attempts_total: &'static str,
    pub extractor_failures_total: &'static str,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            records_extracted_total: "shiptrack_records_extracted_total",
            rows_appended_total: "shiptrack_rows_appended_total",
            status_lookups_total: "shiptrack_status_lookups_total",
            status_lookup_duration: "shiptrack_status_lookup_duration_seconds",
            captcha_attempts_total: "shiptrack_captcha_attempts_total",
            extractor_failures_total: "shiptrack_extractor_failures_total",
        }
    }
}

/// Outcome label for a status lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOutcome {
    /// A status string was obtained from the carrier
    Status,
    /// The lookup produced an error-prefixed status
    Error,
    /// The lookup gave up without producing anything
    NoResult,
}

impl LookupOutcome {
    const fn label(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Error => "error",
            Self::NoResult => "no_result",
        }
    }

    /// Classify a lookup result by its text.
    pub fn classify(status: Option<&str>) -> Self {
        match status {
            None => Self::NoResult,
            Some(s) if s.starts_with("Error") => Self::Error,
            Some(_) => Self::Status,
        }
    }
}

impl MetricsCollector {
    /// Record records produced by an extractor
    pub fn record_extracted(&self, carrier: Carrier, count: usize) {
        counter!(self.records_extracted_total, "carrier" => carrier.slug()).increment(count as u64);
    }

    /// Record an extractor that failed on a file
    pub fn record_extractor_failure(&self, carrier: Carrier) {
        counter!(self.extractor_failures_total, "carrier" => carrier.slug()).increment(1);
    }

    /// Record rows appended to the master table
    pub fn record_appended(&self, count: usize) {
        counter!(self.rows_appended_total).increment(count as u64);
    }

    /// Record one status lookup and how long it took
    pub fn record_lookup(&self, carrier: Carrier, outcome: LookupOutcome, duration: Duration) {
        counter!(
            self.status_lookups_total,
            "carrier" => carrier.slug(),
            "outcome" => outcome.label()
        )
        .increment(1);
        histogram!(self.status_lookup_duration, "carrier" => carrier.slug()).record(duration.as_secs_f64());
    }

    /// Record one Cruz del Sur captcha attempt
    pub fn record_captcha_attempt(&self, solved: bool) {
        let outcome = if solved { "solved" } else { "failed" };
        counter!(self.captcha_attempts_total, "outcome" => outcome).increment(1);
    }
}
