use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::extractors::extract_file;
use crate::logging::OperationTimer;
use crate::lookup::StatusLookups;
use crate::metrics::{LookupOutcome, MetricsCollector};
use crate::models::{Carrier, ReconcileReport, ShipmentRecord, STATUS_NEEDS_MANUAL_CHECK, STATUS_UNDEFINED};
use crate::repository::ShipmentRepository;

/// Merges carrier manifests into the master table and refreshes statuses.
pub struct ReconcileService {
    repository: Box<dyn ShipmentRepository>,
    lookups: StatusLookups,
    metrics: MetricsCollector,
}

/// Result of the one-off Cruz del Sur query of a run.
struct CruzOverride {
    tracking_number: String,
    status: Option<String>,
}

impl ReconcileService {
    pub fn new(repository: Box<dyn ShipmentRepository>, lookups: StatusLookups) -> Self {
        Self {
            repository,
            lookups,
            metrics: MetricsCollector::default(),
        }
    }

    /// Run one reconciliation over the manifests in `source_dir`.
    ///
    /// With `refresh` off, new rows are appended and saved without any status lookups.
    pub async fn run(&self, source_dir: &Path, refresh: bool) -> Result<ReconcileReport> {
        if self.repository.ensure_exists()? {
            info!("Started a new master table");
        }
        let mut table = self.repository.load()?;
        let mut report = ReconcileReport::default();

        let (files_processed, extracted) = self.extract_dir(source_dir)?;
        report.files_processed = files_processed;
        report.records_extracted = extracted.len();

        let new_records = select_new(&table, &extracted);
        report.rows_appended = new_records.len();
        self.metrics.record_appended(new_records.len());
        info!("{} new shipments to append", new_records.len());
        table.extend(new_records);

        if refresh {
            let cruz = self.query_cruz_del_sur(&extracted).await;
            report.rows_refreshed = self.refresh_statuses(&mut table, cruz.as_ref()).await;
            report.cruz_del_sur = cruz.map(|c| (c.tracking_number, c.status));
        }

        self.repository.save(&table)?;
        report.total_rows = table.len();
        Ok(report)
    }

    /// Extract every routed file in `dir`, in file-name order.
    fn extract_dir(&self, dir: &Path) -> Result<(usize, Vec<ShipmentRecord>)> {
        let mut paths = std::fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<PathBuf>>>()?;
        paths.sort();

        let mut files = 0;
        let mut records = Vec::new();
        for path in paths.iter().filter(|p| p.is_file()) {
            if let Some((carrier, found)) = extract_file(path) {
                files += 1;
                self.metrics.record_extracted(carrier, found.len());
                records.extend(found);
            }
        }
        Ok((files, records))
    }

    async fn query_cruz_del_sur(&self, extracted: &[ShipmentRecord]) -> Option<CruzOverride> {
        let tracking_number = extracted
            .iter()
            .find(|r| r.known_carrier() == Some(Carrier::CruzDelSur) && !r.tracking_number.is_empty())?
            .tracking_number
            .clone();

        let Some(lookup) = self.lookups.get(Carrier::CruzDelSur) else {
            warn!("Cruz del Sur shipments found but no lookup is configured; skipping query");
            return Some(CruzOverride {
                tracking_number,
                status: None,
            });
        };

        let timer = OperationTimer::new("lookup:cruz_del_sur");
        let status = lookup.lookup(&tracking_number).await;
        self.metrics.record_lookup(
            Carrier::CruzDelSur,
            LookupOutcome::classify(status.as_deref()),
            timer.elapsed(),
        );
        info!("Cruz del Sur {tracking_number}: {}", status.as_deref().unwrap_or("no result"));
        Some(CruzOverride {
            tracking_number,
            status,
        })
    }

    /// Apply the per-carrier status rules to every row; returns how many got a live status.
    async fn refresh_statuses(&self, table: &mut [ShipmentRecord], cruz: Option<&CruzOverride>) -> usize {
        let mut refreshed = 0;
        for record in table.iter_mut() {
            let updated = match record.known_carrier() {
                Some(Carrier::CruzDelSur) => {
                    let status = cruz
                        .filter(|c| c.tracking_number == record.tracking_number)
                        .and_then(|c| c.status.clone());
                    match status {
                        Some(status) => Some(status),
                        None => {
                            fill_if_empty(record, STATUS_NEEDS_MANUAL_CHECK);
                            None
                        },
                    }
                },
                Some(carrier) if record.tracking_number.is_empty() => {
                    debug!("{carrier} row without tracking number; keeping its status");
                    None
                },
                Some(carrier) => self.live_status(carrier, &record.tracking_number).await,
                None => {
                    fill_if_empty(record, STATUS_UNDEFINED);
                    None
                },
            };
            if let Some(status) = updated {
                record.status = status;
                refreshed += 1;
            }
        }
        refreshed
    }

    async fn live_status(&self, carrier: Carrier, tracking_number: &str) -> Option<String> {
        let Some(lookup) = self.lookups.get(carrier) else {
            debug!("No lookup registered for {carrier}; keeping status of {tracking_number}");
            return None;
        };
        let timer = OperationTimer::new(&format!("lookup:{}", carrier.slug()));
        let status = lookup.lookup(tracking_number).await;
        self.metrics
            .record_lookup(carrier, LookupOutcome::classify(status.as_deref()), timer.elapsed());
        debug!("{carrier} {tracking_number}: {}", status.as_deref().unwrap_or("no result"));
        status
    }
}

fn fill_if_empty(record: &mut ShipmentRecord, default: &str) {
    if record.status.trim().is_empty() {
        record.status = default.to_string();
    }
}

/// Extracted records whose tracking number is neither in `table` nor earlier in the batch.
pub fn select_new(table: &[ShipmentRecord], extracted: &[ShipmentRecord]) -> Vec<ShipmentRecord> {
    let mut seen: HashSet<&str> = table.iter().map(|r| r.tracking_number.as_str()).collect();
    extracted
        .iter()
        .filter(|r| !r.tracking_number.is_empty() && seen.insert(r.tracking_number.as_str()))
        .cloned()
        .collect()
}
