//! Wallet facade wiring the sync engine, address book, funding and bundle services together.

use crate::config::{ReplaySettings, WalletContext};
use crate::ledger::LedgerClient;
use crate::transaction::{
	AutomaticReplayOutcome, BundleReplayState, BundleSummary, ConfirmationChecker,
	ConfirmationState, ReplayEngine, ReplayReport, TransferBuilder, TransferReceipt,
	TransferSubmitter,
};
use crate::utils::ShutdownSignal;
use crate::wallet::addresses::{AddressBook, AddressIndexes};
use crate::wallet::funding::FundingSelector;
use crate::wallet::sync::{
	AddressRepository, BalanceScope, BalanceSummary, SyncMode, SyncStats, SynchronizationEngine,
};
use crate::wallet::{AddressRecord, AddressStatus, IssuedAddress, WalletError};

use std::sync::Arc;

/// One wallet: a seed, its record store and the ledger it lives on.
pub struct WalletService {
	ctx: WalletContext,
	sync: Arc<SynchronizationEngine>,
	addresses: Arc<AddressBook>,
	transfers: TransferSubmitter,
	confirmations: ConfirmationChecker,
	replays: ReplayEngine,
}

impl WalletService {
	pub fn new(
		ctx: WalletContext,
		replay: ReplaySettings,
		ledger: Arc<dyn LedgerClient>,
		repository: Arc<dyn AddressRepository>,
		shutdown: ShutdownSignal,
	) -> Self {
		let sync = Arc::new(SynchronizationEngine::new(
			ledger.clone(),
			repository.clone(),
			shutdown.clone(),
		));
		let addresses = Arc::new(AddressBook::new(ledger.clone(), repository.clone()));
		let funding = Arc::new(FundingSelector::new(repository, addresses.clone()));
		let transfers =
			TransferSubmitter::new(ledger.clone(), sync.clone(), funding, shutdown.clone());

		Self {
			ctx,
			sync,
			addresses,
			transfers,
			confirmations: ConfirmationChecker::new(ledger.clone()),
			replays: ReplayEngine::new(ledger, replay, shutdown),
		}
	}

	pub fn context(&self) -> &WalletContext {
		&self.ctx
	}

	/// Synchronizes from the search floor. `rescan_all` also refreshes spent addresses.
	pub async fn sync(&self, mode: SyncMode, rescan_all: bool) -> Result<SyncStats, WalletError> {
		self.sync
			.synchronize(&self.ctx, self.ctx.search_floor, mode, rescan_all)
			.await
	}

	/// A fresh receiving address, reserved as `Published`.
	pub async fn get_new_address(&self) -> Result<IssuedAddress, WalletError> {
		self.addresses
			.get_new_address(&self.ctx, AddressStatus::Published)
			.await
	}

	pub async fn get_address_indexes(&self) -> Result<AddressIndexes, WalletError> {
		self.addresses.get_address_indexes().await
	}

	pub async fn update_balances(&self, scope: BalanceScope) -> Result<BalanceSummary, WalletError> {
		self.sync.update_balances(&self.ctx, scope).await
	}

	pub async fn total_balance(&self) -> Result<u64, WalletError> {
		self.addresses.total_balance().await
	}

	pub async fn list_addresses(&self, entire: bool) -> Result<Vec<AddressRecord>, WalletError> {
		self.addresses.list_addresses(&self.ctx, entire).await
	}

	pub async fn get_bundles(&self, address: &str) -> Result<Vec<BundleSummary>, WalletError> {
		self.confirmations.get_bundles(address).await
	}

	pub async fn get_confirmation_state(
		&self,
		bundle_hash: &str,
	) -> Result<ConfirmationState, WalletError> {
		self.confirmations.get_confirmation_state(bundle_hash).await
	}

	pub async fn transfer(
		&self,
		destination: &str,
		value: u64,
		message: &str,
		tag: &str,
	) -> Result<TransferReceipt, WalletError> {
		let transfer = TransferBuilder::new()
			.with_destination(destination)
			.with_value(value)
			.with_message(message)
			.with_tag(tag)
			.build()?;
		self.transfers.execute_transfer(&self.ctx, transfer).await
	}

	pub async fn get_replay_candidates(
		&self,
		address: &str,
	) -> Result<Vec<BundleReplayState>, WalletError> {
		self.replays.get_replay_candidates(&self.ctx, address).await
	}

	pub async fn replay(&self, address: &str) -> Result<ReplayReport, WalletError> {
		self.replays.replay(&self.ctx, address).await
	}

	pub async fn fully_automatic_replay(
		&self,
		address: &str,
	) -> Result<Vec<AutomaticReplayOutcome>, WalletError> {
		self.replays.fully_automatic_replay(&self.ctx, address).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ledger::Seed;
	use crate::testing::{MockLedger, hash_of, mock_address, tx};
	use crate::wallet::sync::FileAddressRepository;

	fn ctx() -> WalletContext {
		WalletContext {
			seed: Seed::new("SEED"),
			security_level: 2,
			new_address_floor: 0,
			search_floor: 0,
			min_weight_magnitude: 14,
			balance_threshold: 100,
			transfer_depth: 5,
		}
	}

	#[tokio::test]
	async fn receive_then_spend_against_file_store() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("wallet.json");
		let ledger = Arc::new(MockLedger::new());
		let repository = Arc::new(FileAddressRepository::open(&path).await.unwrap());
		let wallet = WalletService::new(
			ctx(),
			ReplaySettings::default(),
			ledger.clone(),
			repository,
			ShutdownSignal::new(),
		);

		let stats = wallet.sync(SyncMode::FreshPool, false).await.unwrap();
		assert_eq!(stats.fresh_addresses, 10);

		let receiving = wallet.get_new_address().await.unwrap();
		assert_eq!(receiving.index, 0);

		// funds arrive and confirm
		ledger.add_transaction(
			tx(&hash_of("DEPOSIT"), &receiving.address, 25, &hash_of("DEPOSITBUNDLE"), 0, 0),
			true,
		);
		ledger.set_balance(&receiving.address, 25);
		let summary = wallet.update_balances(BalanceScope::All).await.unwrap();
		assert_eq!(summary.total_balance, 25);
		assert_eq!(wallet.total_balance().await.unwrap(), 25);
		let listed = wallet.list_addresses(false).await.unwrap();
		assert_eq!(listed.len(), 1);
		assert_eq!(listed[0].status, AddressStatus::Used);

		let receipt = wallet.transfer(&hash_of("MERCHANT"), 20, "", "").await.unwrap();
		let submission = &ledger.submissions()[0];
		assert_eq!(submission.options.inputs[0].key_index, 0);
		assert_eq!(submission.options.remainder_address, Some(mock_address(1)));

		let bundles = wallet.get_bundles(&mock_address(1)).await.unwrap();
		assert_eq!(bundles.len(), 1);
		assert_eq!(bundles[0].bundle, receipt.bundle);

		// the store survives a restart
		let reopened = FileAddressRepository::open(&path).await.unwrap();
		assert_eq!(
			reopened.find_by_index(1).await.unwrap().unwrap().status,
			AddressStatus::Published
		);
	}
}
