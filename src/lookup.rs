//! Status lookup seam.
//!
//! Every carrier exposes the same capability, "tracking number in, status out". The
//! workflow only sees [`StatusLookup`] trait objects held in a [`StatusLookups`] registry.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::models::Carrier;

/// Fetches the live delivery status of one shipment.
#[async_trait]
pub trait StatusLookup: Send + Sync {
    /// Carrier this client queries
    fn carrier(&self) -> Carrier;

    /// Current status of `tracking_number`.
    ///
    /// Failures are folded into the returned text (`"Error: …"`). `None` means the
    /// lookup gave up without a status and the previous one should be kept.
    async fn lookup(&self, tracking_number: &str) -> Option<String>;
}

/// Status lookup clients keyed by carrier.
#[derive(Default)]
pub struct StatusLookups {
    by_carrier: HashMap<Carrier, Box<dyn StatusLookup>>,
}

impl StatusLookups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `lookup` for its carrier, replacing any earlier one.
    pub fn register(&mut self, lookup: Box<dyn StatusLookup>) -> &mut Self {
        self.by_carrier.insert(lookup.carrier(), lookup);
        self
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, lookup: Box<dyn StatusLookup>) -> Self {
        self.register(lookup);
        self
    }

    /// Client for `carrier`, if one is registered.
    pub fn get(&self, carrier: Carrier) -> Option<&dyn StatusLookup> {
        self.by_carrier.get(&carrier).map(AsRef::as_ref)
    }
}

/// Format a lookup failure the way it is stored in the status column.
pub fn error_status(err: impl std::fmt::Display) -> String {
    format!("Error: {err}")
}
