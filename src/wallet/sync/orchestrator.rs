//! Address synchronization engine.
//!
//! This module defines the `SynchronizationEngine`, which walks the address index space and keeps
//! the local record store in line with the ledger. For every index it:
//! - loads the cached record, deriving and inserting it when missing
//! - skips terminal records unless a rescan is requested or they still hold a balance
//! - refreshes the balance, tallies the confirmed transactions and applies the status transition
//!
//! Indices are processed strictly one after another. Each index is a critical section: an
//! interrupt is honoured between indices, never in the middle of one.
//! Which index ends the run is decided by the `SyncStrategy` chosen for the invocation.

use crate::config::WalletContext;
use crate::ledger::{LedgerClient, LedgerError, TransactionFilter};
use crate::utils::{ShutdownSignal, format_iota_amount};
use crate::wallet::status::TransactionTally;
use crate::wallet::sync::{
    progress_tracker::{SyncProgressTracker, SyncStats},
    repositories::AddressRepository,
    strategies::{SyncConfig, SyncMode},
};
use crate::wallet::{AddressRecord, AddressStatus, WalletError};

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which records a balance refresh covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceScope {
    /// Records at or above the configured search floor
    FromSearchFloor,
    All,
}

/// Result of a balance refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSummary {
    pub address_count: usize,
    pub total_balance: u64,
}

/// Keeps the address record store synchronized with the ledger.
pub struct SynchronizationEngine {
    ledger: Arc<dyn LedgerClient>,
    repository: Arc<dyn AddressRepository>,
    config: SyncConfig,
    shutdown: ShutdownSignal,
}

impl SynchronizationEngine {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        repository: Arc<dyn AddressRepository>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            ledger,
            repository,
            config: SyncConfig::default(),
            shutdown,
        }
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Start synchronization at `start_index` under the termination policy `mode`.
    ///
    /// With `rescan_all`, terminal records are refreshed too; their status still never changes.
    pub async fn synchronize(
        &self,
        ctx: &WalletContext,
        start_index: u64,
        mode: SyncMode,
        rescan_all: bool,
    ) -> Result<SyncStats, WalletError> {
        let strategy = mode.into_strategy();
        info!(
            "Starting {} from index {}{}",
            strategy.name(),
            start_index,
            if rescan_all { " (rescanning all)" } else { "" }
        );

        let mut progress = SyncProgressTracker::new(start_index);
        let mut index = start_index;

        while strategy.should_continue(index, &progress) {
            if strategy.is_open_ended()
                && progress.indices_processed() >= self.config.max_indices_per_run
            {
                warn!(
                    "{} stopped after {} indices without meeting its end condition",
                    strategy.name(),
                    self.config.max_indices_per_run
                );
                break;
            }

            self.shutdown.checkpoint(&format!("syncing index {}", index))?;
            {
                let _guard = self.shutdown.critical_section();
                self.sync_index(ctx, index, rescan_all, &mut progress)
                    .await?;
            }

            progress.log_progress(false);
            index += 1;
        }

        progress.log_progress(true);
        progress.report_overused();

        let stats = progress.get_stats();
        info!("Sync completed: {}", stats.summary());
        Ok(stats)
    }

    /// Read-modify-write of a single index.
    async fn sync_index(
        &self,
        ctx: &WalletContext,
        index: u64,
        rescan_all: bool,
        progress: &mut SyncProgressTracker,
    ) -> Result<(), WalletError> {
        let record = match self.repository.find_by_index(index).await? {
            Some(record) => record,
            None => {
                let address = self
                    .ledger
                    .derive_address(&ctx.seed, index, ctx.security_level)
                    .await?;
                let record = AddressRecord::new(index, address, ctx.security_level);
                self.repository.insert(record.clone()).await?;
                progress.record_created(index);
                debug!("Derived address for index {}", index);
                record
            }
        };

        // a spent address may look fresh again after a snapshot; only dust keeps it in the refresh
        if record.status.is_terminal() && !rescan_all && record.balance == 0 {
            debug!("Skipping index {} in status {}", index, record.status);
            progress.record_skipped(index, record.status);
            return Ok(());
        }

        let balance = self
            .ledger
            .get_balances(std::slice::from_ref(&record.address), ctx.balance_threshold)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                LedgerError::InvalidResponse(format!("no balance returned for index {}", index))
            })?;

        let transactions = self
            .ledger
            .find_transactions(TransactionFilter::Addresses(vec![record.address.clone()]))
            .await?;
        let hashes: Vec<String> = transactions.iter().map(|tx| tx.hash.clone()).collect();
        let inclusion = self.ledger.get_inclusion_states(&hashes).await?;
        if inclusion.len() != transactions.len() {
            return Err(LedgerError::InvalidResponse(format!(
                "{} inclusion states for {} transactions",
                inclusion.len(),
                transactions.len()
            ))
            .into());
        }

        let tally = TransactionTally::from_inclusion(&transactions, &inclusion);
        let status = tally.status_after(record.status);
        let confirmed_spend = transactions
            .last()
            .zip(inclusion.last())
            .is_some_and(|(tx, confirmed)| *confirmed && tx.is_outgoing());

        self.repository
            .update_balance_and_status(index, balance, status)
            .await?;

        if status != record.status {
            info!(
                "Index {} moved from {} to {} ({})",
                index,
                record.status,
                status,
                format_iota_amount(balance)
            );
        } else {
            debug!(
                "Index {}: {} transactions, balance {}, status {}",
                index,
                transactions.len(),
                balance,
                status
            );
        }

        progress.record_refreshed(index, status, balance, confirmed_spend);
        Ok(())
    }

    /// Refresh cached balances in batches; a published address that received funds becomes `Used`.
    pub async fn update_balances(
        &self,
        ctx: &WalletContext,
        scope: BalanceScope,
    ) -> Result<BalanceSummary, WalletError> {
        let records = match scope {
            BalanceScope::FromSearchFloor => {
                self.repository.find_from_index(ctx.search_floor).await?
            }
            BalanceScope::All => self.repository.find_all().await?,
        };

        if records.is_empty() {
            return Err(WalletError::ValidationError(
                "no addresses in the store, run SyncAll to derive them".to_string(),
            ));
        }

        let mut total_balance = 0u64;
        for batch in records.chunks(self.config.balance_batch_size.max(1)) {
            self.shutdown.checkpoint("refreshing the next balance batch")?;
            let _guard = self.shutdown.critical_section();

            let addresses: Vec<String> = batch.iter().map(|r| r.address.clone()).collect();
            let balances = self
                .ledger
                .get_balances(&addresses, ctx.balance_threshold)
                .await?;
            if balances.len() != batch.len() {
                return Err(LedgerError::InvalidResponse(format!(
                    "requested {} balances, received {}",
                    batch.len(),
                    balances.len()
                ))
                .into());
            }

            for (record, balance) in batch.iter().zip(balances) {
                total_balance = total_balance.saturating_add(balance);
                if record.status == AddressStatus::Published && balance > 0 {
                    self.repository
                        .update_balance_and_status(record.index, balance, AddressStatus::Used)
                        .await?;
                } else {
                    self.repository.update_balance(record.index, balance).await?;
                }
            }
            debug!("Refreshed balances of {} addresses", batch.len());
        }

        info!(
            "Refreshed {} balances, total {}",
            records.len(),
            format_iota_amount(total_balance)
        );
        Ok(BalanceSummary {
            address_count: records.len(),
            total_balance,
        })
    }
}
