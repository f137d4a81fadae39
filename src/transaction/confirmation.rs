use crate::ledger::{LedgerClient, LedgerError, Transaction, TransactionFilter, trytes};
use crate::wallet::WalletError;

use itertools::Itertools;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Confirmation verdict for a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleStatus {
	Confirmed,
	Unconfirmed,
}

/// Inclusion counts over every transaction carrying a bundle hash, replays included
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmationState {
	#[serde(rename = "confirmedTransactionsCount")]
	pub confirmed_count: usize,
	#[serde(rename = "unconfirmedTransactionsCount")]
	pub unconfirmed_count: usize,
	pub status: BundleStatus,
}

/// A bundle touching an address and how often it was reattached
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleSummary {
	pub bundle: String,
	pub replays: usize,
}

/// A zero-value bundle needs one confirmed transaction; a value transfer needs more than two.
pub fn classify(confirmed_count: usize, value: u64) -> BundleStatus {
	if (confirmed_count > 0 && value == 0) || (confirmed_count > 2 && value > 0) {
		BundleStatus::Confirmed
	} else {
		BundleStatus::Unconfirmed
	}
}

/// Sum of the positive transaction values.
pub(crate) fn transferred_value(transactions: &[Transaction]) -> u64 {
	transactions
		.iter()
		.filter(|tx| tx.is_incoming())
		.map(|tx| tx.value.unsigned_abs())
		.sum()
}

pub(crate) fn ensure_address(address: &str) -> Result<(), WalletError> {
	if trytes::is_address(address) {
		Ok(())
	} else {
		Err(WalletError::ValidationError(format!(
			"{:?} is not a valid address",
			address
		)))
	}
}

/// Queries the ledger for the state of bundles
#[derive(Clone)]
pub struct ConfirmationChecker {
	ledger: Arc<dyn LedgerClient>,
}

impl ConfirmationChecker {
	pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
		Self { ledger }
	}

	pub async fn get_confirmation_state(
		&self,
		bundle_hash: &str,
	) -> Result<ConfirmationState, WalletError> {
		if !trytes::is_hash(bundle_hash) {
			return Err(WalletError::ValidationError(format!(
				"{:?} is not a valid bundle hash",
				bundle_hash
			)));
		}

		let transactions = self
			.ledger
			.find_transactions(TransactionFilter::Bundles(vec![bundle_hash.to_string()]))
			.await?;
		let inclusion = self.inclusion_states(&transactions).await?;

		let confirmed_count = inclusion.iter().filter(|c| **c).count();
		let unconfirmed_count = inclusion.len() - confirmed_count;
		let value = transferred_value(&transactions);
		let status = classify(confirmed_count, value);

		debug!(
			"Bundle {}: {} confirmed, {} unconfirmed, value {}",
			bundle_hash, confirmed_count, unconfirmed_count, value
		);
		Ok(ConfirmationState {
			confirmed_count,
			unconfirmed_count,
			status,
		})
	}

	/// Inclusion state of each transaction, in order.
	pub(crate) async fn inclusion_states(
		&self,
		transactions: &[Transaction],
	) -> Result<Vec<bool>, WalletError> {
		let hashes: Vec<String> = transactions.iter().map(|tx| tx.hash.clone()).collect();
		let inclusion = self.ledger.get_inclusion_states(&hashes).await?;
		if inclusion.len() != hashes.len() {
			return Err(LedgerError::InvalidResponse(format!(
				"{} inclusion states for {} transactions",
				inclusion.len(),
				hashes.len()
			))
			.into());
		}
		Ok(inclusion)
	}

	/// Bundles touching `address` in first-seen order.
	pub async fn get_bundles(&self, address: &str) -> Result<Vec<BundleSummary>, WalletError> {
		ensure_address(address)?;
		let transactions = self
			.ledger
			.find_transactions(TransactionFilter::Addresses(vec![address.to_string()]))
			.await?;

		let mut occurrences: HashMap<&str, usize> = HashMap::new();
		for tx in &transactions {
			*occurrences.entry(tx.bundle.as_str()).or_default() += 1;
		}

		Ok(transactions
			.iter()
			.map(|tx| tx.bundle.as_str())
			.unique()
			.map(|bundle| BundleSummary {
				bundle: bundle.to_string(),
				replays: occurrences.get(bundle).copied().unwrap_or(1) - 1,
			})
			.collect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{MockLedger, hash_of, mock_address, tx};

	#[test]
	fn classification_thresholds() {
		assert_eq!(classify(1, 0), BundleStatus::Confirmed);
		assert_eq!(classify(0, 0), BundleStatus::Unconfirmed);
		assert_eq!(classify(2, 10), BundleStatus::Unconfirmed);
		assert_eq!(classify(3, 10), BundleStatus::Confirmed);
	}

	#[tokio::test]
	async fn zero_value_bundle_with_partial_confirmation() {
		let ledger = Arc::new(MockLedger::new());
		let bundle = hash_of("ZEROBUNDLE");
		ledger.add_transaction(tx(&hash_of("TA"), &mock_address(0), 0, &bundle, 0, 2), true);
		ledger.add_transaction(tx(&hash_of("TB"), &mock_address(1), 0, &bundle, 1, 2), true);
		ledger.add_transaction(tx(&hash_of("TC"), &mock_address(2), 0, &bundle, 2, 2), false);

		let state = ConfirmationChecker::new(ledger)
			.get_confirmation_state(&bundle)
			.await
			.unwrap();
		assert_eq!(state, ConfirmationState {
			confirmed_count: 2,
			unconfirmed_count: 1,
			status: BundleStatus::Confirmed,
		});

		let json = serde_json::to_value(&state).unwrap();
		assert_eq!(json["confirmedTransactionsCount"], 2);
		assert_eq!(json["status"], "confirmed");
	}

	#[tokio::test]
	async fn value_bundle_needs_three_confirmations() {
		let ledger = Arc::new(MockLedger::new());
		let bundle = hash_of("VALUEBUNDLE");
		ledger.add_transaction(tx(&hash_of("TA"), &mock_address(0), 10, &bundle, 0, 1), true);
		ledger.add_transaction(tx(&hash_of("TB"), &mock_address(1), -10, &bundle, 1, 1), true);

		let checker = ConfirmationChecker::new(ledger.clone());
		let state = checker.get_confirmation_state(&bundle).await.unwrap();
		assert_eq!(state.status, BundleStatus::Unconfirmed);

		ledger.add_transaction(tx(&hash_of("TAR"), &mock_address(0), 10, &bundle, 0, 1), true);
		let state = checker.get_confirmation_state(&bundle).await.unwrap();
		assert_eq!(state.confirmed_count, 3);
		assert_eq!(state.status, BundleStatus::Confirmed);
	}

	#[tokio::test]
	async fn rejects_malformed_bundle_hash() {
		let checker = ConfirmationChecker::new(Arc::new(MockLedger::new()));
		let err = checker.get_confirmation_state("SHORT").await.unwrap_err();
		assert_eq!(err.kind(), "validation");
	}

	#[tokio::test]
	async fn bundles_in_first_seen_order_with_replays() {
		let ledger = Arc::new(MockLedger::new());
		let address = mock_address(4);
		let first = hash_of("FIRST");
		let second = hash_of("SECOND");
		ledger.add_transaction(tx(&hash_of("TA"), &address, 5, &first, 0, 0), false);
		ledger.add_transaction(tx(&hash_of("TB"), &address, 0, &second, 0, 0), true);
		ledger.add_transaction(tx(&hash_of("TC"), &address, 5, &first, 0, 0), false);
		ledger.add_transaction(tx(&hash_of("TD"), &address, 5, &first, 0, 0), true);

		let bundles = ConfirmationChecker::new(ledger)
			.get_bundles(&address)
			.await
			.unwrap();
		assert_eq!(bundles, vec![
			BundleSummary {
				bundle: first,
				replays: 2
			},
			BundleSummary {
				bundle: second,
				replays: 0
			},
		]);
	}
}
