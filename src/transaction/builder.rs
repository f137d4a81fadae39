//! Outgoing transfer construction and submission
//!
//! `TransferBuilder` validates the caller-supplied fields of a transfer; `TransferSubmitter`
//! refreshes balances, selects funding and hands the bundle to the ledger.

use crate::config::WalletContext;
use crate::ledger::{LedgerClient, Transfer, TransferOptions, trytes};
use crate::utils::ShutdownSignal;
use crate::wallet::funding::FundingSelector;
use crate::wallet::sync::{BalanceScope, SynchronizationEngine};
use crate::wallet::WalletError;

use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Builder for a single-output transfer
#[derive(Debug, Default)]
pub struct TransferBuilder {
	/// Receiving address, with or without checksum
	destination: Option<String>,
	/// Amount in atomic units
	value: u64,
	message: String,
	tag: String,
}

impl TransferBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_destination(mut self, address: impl Into<String>) -> Self {
		self.destination = Some(address.into());
		self
	}

	pub fn with_value(mut self, value: u64) -> Self {
		self.value = value;
		self
	}

	pub fn with_message(mut self, message: impl Into<String>) -> Self {
		self.message = message.into();
		self
	}

	pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
		self.tag = tag.into();
		self
	}

	/// Validates the fields and returns the transfer
	pub fn build(self) -> Result<Transfer, WalletError> {
		let address = self.destination.ok_or_else(|| {
			WalletError::ValidationError("a destination address is required".to_string())
		})?;
		if !trytes::is_address(&address) {
			return Err(WalletError::ValidationError(format!(
				"{:?} is not a valid destination address",
				address
			)));
		}
		if !trytes::is_trytes(&self.message) || self.message.len() > trytes::MESSAGE_LENGTH {
			return Err(WalletError::ValidationError(format!(
				"message must be at most {} trytes",
				trytes::MESSAGE_LENGTH
			)));
		}
		if !trytes::is_trytes(&self.tag) || self.tag.len() > trytes::TAG_LENGTH {
			return Err(WalletError::ValidationError(format!(
				"tag must be at most {} trytes",
				trytes::TAG_LENGTH
			)));
		}

		Ok(Transfer {
			address,
			value: self.value,
			message: self.message,
			tag: self.tag,
		})
	}
}

/// Bundle and tail transaction of a submitted transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
	pub bundle: String,
	pub tail_transaction: String,
}

pub struct TransferSubmitter {
	ledger: Arc<dyn LedgerClient>,
	sync: Arc<SynchronizationEngine>,
	funding: Arc<FundingSelector>,
	shutdown: ShutdownSignal,
}

impl TransferSubmitter {
	pub fn new(
		ledger: Arc<dyn LedgerClient>,
		sync: Arc<SynchronizationEngine>,
		funding: Arc<FundingSelector>,
		shutdown: ShutdownSignal,
	) -> Self {
		Self {
			ledger,
			sync,
			funding,
			shutdown,
		}
	}

	/// Funds and submits `transfer`. Once started, the whole sequence runs to completion.
	pub async fn execute_transfer(
		&self,
		ctx: &WalletContext,
		transfer: Transfer,
	) -> Result<TransferReceipt, WalletError> {
		self.shutdown.checkpoint("starting the transfer")?;
		let _guard = self.shutdown.critical_section();

		let mut options = TransferOptions::default();
		if transfer.value > 0 {
			self.sync.update_balances(ctx, BalanceScope::All).await?;
			let selection = self.funding.select_funding(ctx, transfer.value).await?;
			options.remainder_address =
				Some(trytes::no_checksum(&selection.remainder.address).to_string());
			options.inputs = selection.inputs;
		}

		let value = transfer.value;
		let transactions = self
			.ledger
			.submit_transfer(
				&ctx.seed,
				ctx.transfer_depth,
				ctx.min_weight_magnitude,
				std::slice::from_ref(&transfer),
				&options,
			)
			.await?;

		let tail = transactions.iter().find(|tx| tx.is_tail()).ok_or_else(|| {
			WalletError::InvariantViolation("submitted bundle has no tail transaction".to_string())
		})?;
		info!(
			"Sent {} in bundle {} (tail {})",
			value, tail.bundle, tail.hash
		);
		Ok(TransferReceipt {
			bundle: tail.bundle.clone(),
			tail_transaction: tail.hash.clone(),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ledger::Seed;
	use crate::testing::{MockLedger, hash_of, mock_address, numbered_hash};
	use crate::wallet::addresses::AddressBook;
	use crate::wallet::sync::{AddressRepository, InMemoryAddressRepository};
	use crate::wallet::{AddressRecord, AddressStatus};

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

	fn submitter(
		ledger: &Arc<MockLedger>,
		repo: &Arc<InMemoryAddressRepository>,
		shutdown: ShutdownSignal,
	) -> TransferSubmitter {
		let sync = Arc::new(SynchronizationEngine::new(
			ledger.clone(),
			repo.clone(),
			shutdown.clone(),
		));
		let book = Arc::new(AddressBook::new(ledger.clone(), repo.clone()));
		let funding = Arc::new(FundingSelector::new(repo.clone(), book));
		TransferSubmitter::new(ledger.clone(), sync, funding, shutdown)
	}

	fn funded_store(ledger: &MockLedger) -> Arc<InMemoryAddressRepository> {
		ledger.set_balance(&mock_address(0), 30);
		ledger.set_balance(&mock_address(1), 40);
		Arc::new(InMemoryAddressRepository::with_records((0..2).map(|i| AddressRecord {
			index: i,
			address: mock_address(i),
			balance: 0,
			status: AddressStatus::Used,
			security_level: 2,
		})))
	}

	#[test]
	fn builder_validates_fields() {
		assert!(TransferBuilder::new().with_value(5).build().is_err());
		assert!(
			TransferBuilder::new()
				.with_destination("BAD ADDRESS")
				.build()
				.is_err()
		);
		assert!(
			TransferBuilder::new()
				.with_destination(hash_of("DEST"))
				.with_message("lowercase")
				.build()
				.is_err()
		);
		assert!(
			TransferBuilder::new()
				.with_destination(hash_of("DEST"))
				.with_tag("A".repeat(28))
				.build()
				.is_err()
		);

		let transfer = TransferBuilder::new()
			.with_destination(hash_of("DEST"))
			.with_value(12)
			.with_tag("WALLET")
			.build()
			.unwrap();
		assert_eq!(transfer.value, 12);
		assert_eq!(transfer.message, "");
	}

	#[tokio::test]
	async fn funds_and_submits_value_transfer() {
		let ledger = Arc::new(MockLedger::new());
		let repo = funded_store(&ledger);
		let transfer = TransferBuilder::new()
			.with_destination(hash_of("DEST"))
			.with_value(50)
			.build()
			.unwrap();

		let receipt = submitter(&ledger, &repo, ShutdownSignal::new())
			.execute_transfer(&ctx(), transfer.clone())
			.await
			.unwrap();

		assert_eq!(receipt.bundle, numbered_hash("SENTBUNDLE", 0));
		let submissions = ledger.submissions();
		assert_eq!(submissions.len(), 1);
		let submission = &submissions[0];
		assert_eq!(submission.depth, 5);
		assert_eq!(submission.min_weight_magnitude, 14);
		assert_eq!(submission.transfers, vec![transfer]);
		let keys: Vec<u64> = submission.options.inputs.iter().map(|i| i.key_index).collect();
		assert_eq!(keys, vec![0, 1]);
		assert_eq!(submission.options.remainder_address, Some(mock_address(2)));
		// the refreshed balances were used for funding
		assert_eq!(repo.find_by_index(1).await.unwrap().unwrap().balance, 40);
	}

	#[tokio::test]
	async fn zero_value_transfer_needs_no_funding() {
		let ledger = Arc::new(MockLedger::new());
		let repo = Arc::new(InMemoryAddressRepository::new());
		let transfer = TransferBuilder::new()
			.with_destination(hash_of("DEST"))
			.with_message("HELLO")
			.build()
			.unwrap();

		submitter(&ledger, &repo, ShutdownSignal::new())
			.execute_transfer(&ctx(), transfer)
			.await
			.unwrap();
		let submission = &ledger.submissions()[0];
		assert!(submission.options.inputs.is_empty());
		assert_eq!(submission.options.remainder_address, None);
		assert!(ledger.balance_requests().is_empty());
	}

	#[tokio::test]
	async fn insufficient_funds_submit_nothing() {
		let ledger = Arc::new(MockLedger::new());
		let repo = funded_store(&ledger);
		let transfer = TransferBuilder::new()
			.with_destination(hash_of("DEST"))
			.with_value(500)
			.build()
			.unwrap();

		let err = submitter(&ledger, &repo, ShutdownSignal::new())
			.execute_transfer(&ctx(), transfer)
			.await
			.unwrap_err();
		assert_eq!(err.kind(), "insufficient_funds");
		assert!(ledger.submissions().is_empty());
	}

	#[tokio::test]
	async fn pending_interrupt_prevents_submission() {
		let ledger = Arc::new(MockLedger::new());
		let repo = funded_store(&ledger);
		let shutdown = ShutdownSignal::new();
		shutdown.request();
		let transfer = TransferBuilder::new()
			.with_destination(hash_of("DEST"))
			.with_value(10)
			.build()
			.unwrap();

		let err = submitter(&ledger, &repo, shutdown)
			.execute_transfer(&ctx(), transfer)
			.await
			.unwrap_err();
		assert_eq!(err.kind(), "interrupted");
		assert!(ledger.submissions().is_empty());
	}
}
