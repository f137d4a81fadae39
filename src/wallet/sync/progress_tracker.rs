//! Progress tracking for address synchronization.
//!
//! This module provides the `SyncProgressTracker`, which records what happened to each index
//! visited during a sync run: whether its record was created, skipped or refreshed, the status it
//! ended in, and the outcome of its most recent inclusion check.
//!
//! Termination strategies read the tracker to decide whether the run goes on; the orchestrator
//! turns it into `SyncStats` once the run ends.

use crate::wallet::AddressStatus;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Service for tracking synchronization progress
#[derive(Debug, Clone)]
pub struct SyncProgressTracker {
    /// First index of this sync session
    start_index: u64,
    /// Indices visited so far, created or not
    processed_indices: BTreeSet<u64>,
    /// Records derived and inserted during this run
    records_created: usize,
    /// Terminal records whose ledger refresh was skipped
    records_skipped: usize,
    /// Records refreshed from the ledger
    records_refreshed: usize,
    /// Refreshed records left in status `New`
    fresh_addresses: usize,
    /// Whether the last inclusion check of the last refreshed index confirmed an outgoing spend
    last_check_confirmed_spend: bool,
    /// Indices found (or kept) in status `Overused`
    overused_indices: Vec<u64>,
    /// Sum of the balances observed during this run
    observed_balance: u64,
    /// Number of indices processed when progress was last logged
    last_logged_count: usize,
}

impl SyncProgressTracker {
    /// Create a new progress tracker starting from the given index.
    pub fn new(start_index: u64) -> Self {
        Self {
            start_index,
            processed_indices: BTreeSet::new(),
            records_created: 0,
            records_skipped: 0,
            records_refreshed: 0,
            fresh_addresses: 0,
            last_check_confirmed_spend: false,
            overused_indices: Vec::new(),
            observed_balance: 0,
            last_logged_count: 0,
        }
    }

    pub fn record_created(&mut self, index: u64) {
        self.processed_indices.insert(index);
        self.records_created += 1;
    }

    /// Record a terminal index whose refresh was skipped.
    pub fn record_skipped(&mut self, index: u64, status: AddressStatus) {
        self.processed_indices.insert(index);
        self.records_skipped += 1;
        if status == AddressStatus::Overused {
            self.overused_indices.push(index);
        }
    }

    /// Record the outcome of refreshing one index from the ledger.
    ///
    /// `confirmed_spend` is true when the most recent inclusion check made for the index
    /// confirmed an outgoing transaction.
    pub fn record_refreshed(
        &mut self,
        index: u64,
        status: AddressStatus,
        balance: u64,
        confirmed_spend: bool,
    ) {
        self.processed_indices.insert(index);
        self.records_refreshed += 1;
        self.observed_balance = self.observed_balance.saturating_add(balance);
        self.last_check_confirmed_spend = confirmed_spend;
        match status {
            AddressStatus::New => self.fresh_addresses += 1,
            AddressStatus::Overused => self.overused_indices.push(index),
            _ => {}
        }
    }

    pub fn fresh_addresses(&self) -> usize {
        self.fresh_addresses
    }

    pub fn last_check_confirmed_spend(&self) -> bool {
        self.last_check_confirmed_spend
    }

    pub fn indices_processed(&self) -> usize {
        self.processed_indices.len()
    }

    /// Log progress every 100 indices or when forced
    pub fn log_progress(&mut self, force: bool) {
        let processed = self.processed_indices.len();
        let should_log = force || processed.saturating_sub(self.last_logged_count) >= 100;

        if should_log && processed > 0 {
            info!(
                "Sync progress: {} indices ({} created, {} refreshed, {} skipped), {} fresh addresses",
                processed,
                self.records_created,
                self.records_refreshed,
                self.records_skipped,
                self.fresh_addresses
            );
            self.last_logged_count = processed;
        }
    }

    /// Get sync statistics as a SyncStats struct
    pub fn get_stats(&self) -> SyncStats {
        SyncStats {
            start_index: self.start_index,
            highest_processed_index: self.processed_indices.last().copied(),
            total_indices_processed: self.processed_indices.len(),
            records_created: self.records_created,
            records_refreshed: self.records_refreshed,
            records_skipped: self.records_skipped,
            fresh_addresses: self.fresh_addresses,
            observed_balance: self.observed_balance,
            overused: self.overused_indices.clone(),
        }
    }

    /// Warn about every index in status `Overused`; such addresses are reported, never corrected.
    pub fn report_overused(&self) {
        for index in &self.overused_indices {
            warn!(
                "Address at index {} has more than one confirmed outgoing transaction",
                index
            );
        }
    }
}

/// Statistics about one sync run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub start_index: u64,
    pub highest_processed_index: Option<u64>,
    pub total_indices_processed: usize,
    pub records_created: usize,
    pub records_refreshed: usize,
    pub records_skipped: usize,
    pub fresh_addresses: usize,
    pub observed_balance: u64,
    pub overused: Vec<u64>,
}

impl SyncStats {
    /// Get a human-readable summary of the sync statistics
    pub fn summary(&self) -> String {
        let range = match self.highest_processed_index {
            Some(end) => format!("{} to {}", self.start_index, end),
            None => format!("{} (nothing processed)", self.start_index),
        };
        format!(
            "Sync from {}: {} created, {} refreshed, {} skipped, {} fresh addresses{}",
            range,
            self.records_created,
            self.records_refreshed,
            self.records_skipped,
            self.fresh_addresses,
            if self.overused.is_empty() {
                String::new()
            } else {
                format!(" ({} overused)", self.overused.len())
            }
        )
    }
}
