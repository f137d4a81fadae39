//!
//! Greedy input selection for outgoing transfers.
//!
//! Records are scanned by ascending index and every funded, well-formed address is taken until
//! the target is covered. There is no attempt to minimise the number of inputs or to avoid small
//! remainders: the selection is always the shortest funded prefix of the index order.

use crate::config::WalletContext;
use crate::ledger::{Input, trytes};
use crate::wallet::addresses::AddressBook;
use crate::wallet::sync::AddressRepository;
use crate::wallet::{AddressStatus, IssuedAddress, WalletError};

use std::sync::Arc;
use tracing::{debug, info};

/// Inputs covering a transfer and the address receiving the remainder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingSelection {
	pub inputs: Vec<Input>,
	pub total: u64,
	/// Issued as `New` when `total` matches the target exactly, `Published` otherwise.
	pub remainder: IssuedAddress,
}

pub struct FundingSelector {
	repository: Arc<dyn AddressRepository>,
	addresses: Arc<AddressBook>,
}

impl FundingSelector {
	pub fn new(repository: Arc<dyn AddressRepository>, addresses: Arc<AddressBook>) -> Self {
		Self {
			repository,
			addresses,
		}
	}

	pub async fn select_funding(
		&self,
		ctx: &WalletContext,
		target: u64,
	) -> Result<FundingSelection, WalletError> {
		if target == 0 {
			return Err(WalletError::ValidationError(
				"a zero-value transfer needs no funding".to_string(),
			));
		}

		let records = self.repository.find_all().await?;
		debug!("Searching funding among {} records", records.len());

		let mut inputs = Vec::new();
		let mut total = 0u64;
		for record in records {
			if total >= target {
				break;
			}
			if record.balance == 0 || !trytes::is_address(&record.address) {
				continue;
			}
			debug!(
				"Funding from index {} with balance {}",
				record.index, record.balance
			);
			total = total.saturating_add(record.balance);
			inputs.push(Input {
				address: trytes::no_checksum(&record.address).to_string(),
				security: record.security_level,
				key_index: record.index,
				balance: record.balance,
			});
		}

		if total < target {
			return Err(WalletError::insufficient(target, total));
		}

		// an exact match leaves nothing for the remainder output, so its index is not burned
		let remainder_status = if total == target {
			AddressStatus::New
		} else {
			AddressStatus::Published
		};
		let remainder = self
			.addresses
			.get_new_address(ctx, remainder_status)
			.await?;

		info!(
			"Selected {} inputs totalling {} for {}, remainder to index {}",
			inputs.len(),
			total,
			target,
			remainder.index
		);
		Ok(FundingSelection {
			inputs,
			total,
			remainder,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ledger::Seed;
	use crate::testing::{MockLedger, mock_address};
	use crate::wallet::AddressRecord;
	use crate::wallet::sync::InMemoryAddressRepository;
	use proptest::prelude::*;

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

	fn record(index: u64, balance: u64, status: AddressStatus) -> AddressRecord {
		AddressRecord {
			index,
			address: mock_address(index),
			balance,
			status,
			security_level: 2,
		}
	}

	fn selector(repo: &Arc<InMemoryAddressRepository>) -> FundingSelector {
		let book = Arc::new(AddressBook::new(Arc::new(MockLedger::new()), repo.clone()));
		FundingSelector::new(repo.clone(), book)
	}

	#[tokio::test]
	async fn covers_target_with_prefix_and_publishes_remainder() {
		let repo = Arc::new(InMemoryAddressRepository::with_records([
			record(0, 30, AddressStatus::Used),
			record(1, 40, AddressStatus::Used),
		]));

		let selection = selector(&repo).select_funding(&ctx(), 50).await.unwrap();
		let indexes: Vec<u64> = selection.inputs.iter().map(|i| i.key_index).collect();
		assert_eq!(indexes, vec![0, 1]);
		assert_eq!(selection.total, 70);
		assert_eq!(selection.remainder.index, 2);
		assert_eq!(
			repo.find_by_index(2).await.unwrap().unwrap().status,
			AddressStatus::Published
		);
	}

	#[tokio::test]
	async fn exact_match_keeps_remainder_new() {
		let repo = Arc::new(InMemoryAddressRepository::with_records([
			record(0, 30, AddressStatus::Used),
			record(1, 20, AddressStatus::Used),
			record(2, 0, AddressStatus::New),
		]));

		let selection = selector(&repo).select_funding(&ctx(), 50).await.unwrap();
		assert_eq!(selection.total, 50);
		assert_eq!(selection.remainder.index, 2);
		assert_eq!(
			repo.find_by_index(2).await.unwrap().unwrap().status,
			AddressStatus::New
		);
	}

	#[tokio::test]
	async fn skips_malformed_and_empty_records() {
		let mut broken = record(0, 100, AddressStatus::Used);
		broken.address = "NOT-AN-ADDRESS".to_string();
		let mut with_checksum = record(2, 15, AddressStatus::Used);
		with_checksum.address.push_str("ABCDEFGHI");
		with_checksum.security_level = 3;
		let repo = Arc::new(InMemoryAddressRepository::with_records([
			broken,
			record(1, 0, AddressStatus::Used),
			with_checksum,
		]));

		let selection = selector(&repo).select_funding(&ctx(), 10).await.unwrap();
		assert_eq!(selection.inputs.len(), 1);
		let input = &selection.inputs[0];
		assert_eq!(input.key_index, 2);
		assert_eq!(input.address, mock_address(2));
		assert_eq!(input.security, 3);
	}

	#[tokio::test]
	async fn reports_shortfall() {
		let repo = Arc::new(InMemoryAddressRepository::with_records([record(
			0,
			30,
			AddressStatus::Used,
		)]));
		let err = selector(&repo).select_funding(&ctx(), 50).await.unwrap_err();
		assert!(matches!(
			err,
			WalletError::InsufficientFunds {
				required: 50,
				available: 30,
				shortfall: 20
			}
		));
		// nothing was reserved
		assert_eq!(repo.find_all().await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn rejects_zero_target() {
		let repo = Arc::new(InMemoryAddressRepository::new());
		let err = selector(&repo).select_funding(&ctx(), 0).await.unwrap_err();
		assert_eq!(err.kind(), "validation");
	}

	proptest! {
		#[test]
		fn selection_is_shortest_funded_prefix(
			balances in proptest::collection::vec(0u64..50, 1..20),
			target in 1u64..400,
		) {
			let runtime = tokio::runtime::Builder::new_current_thread()
				.enable_all()
				.build()
				.unwrap();
			let repo = Arc::new(InMemoryAddressRepository::with_records(
				balances
					.iter()
					.enumerate()
					.map(|(i, b)| record(i as u64, *b, AddressStatus::Used)),
			));
			let result = runtime.block_on(selector(&repo).select_funding(&ctx(), target));
			let available: u64 = balances.iter().sum();

			match result {
				Ok(selection) => {
					prop_assert!(selection.total >= target);
					let last = selection.inputs.last().unwrap();
					prop_assert!(selection.total - last.balance < target);
					let expected: Vec<u64> = balances
						.iter()
						.enumerate()
						.filter(|(i, b)| **b > 0 && (*i as u64) <= last.key_index)
						.map(|(i, _)| i as u64)
						.collect();
					let got: Vec<u64> = selection.inputs.iter().map(|i| i.key_index).collect();
					prop_assert_eq!(got, expected);
				}
				Err(err) => {
					prop_assert!(available < target);
					prop_assert_eq!(err.kind(), "insufficient_funds");
				}
			}
		}
	}
}
