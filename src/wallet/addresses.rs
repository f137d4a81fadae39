use crate::config::WalletContext;
use crate::ledger::LedgerClient;
use crate::wallet::sync::{AddressRepository, StoreError};
use crate::wallet::{AddressRecord, AddressStatus, IssuedAddress, WalletError};

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Suggested index floors, derived from where funds currently sit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AddressIndexes {
	#[serde(rename = "addressIndexNewAddressStart")]
	pub new_address_start: u64,
	#[serde(rename = "addressIndexSeachBalancesStart")]
	pub search_balances_start: u64,
}

/// Issues addresses from the record store and answers questions about it
pub struct AddressBook {
	ledger: Arc<dyn LedgerClient>,
	repository: Arc<dyn AddressRepository>,
}

impl AddressBook {
	pub fn new(ledger: Arc<dyn LedgerClient>, repository: Arc<dyn AddressRepository>) -> Self {
		Self { ledger, repository }
	}

	/// Hands out the lowest unused address at or above the new-address floor and marks it with
	/// `status`. A fresh address is derived when none is left.
	///
	/// New records that still carry a cached balance are passed over; they may be funding inputs.
	pub async fn get_new_address(
		&self,
		ctx: &WalletContext,
		status: AddressStatus,
	) -> Result<IssuedAddress, WalletError> {
		let record = match self.first_unused(ctx).await? {
			Some(record) => record,
			None => {
				self.add_new_address(ctx).await?;
				self.first_unused(ctx).await?.ok_or_else(|| {
					StoreError::Inconsistent(
						"freshly derived address is missing, rebuild the store with SyncAll"
							.to_string(),
					)
				})?
			}
		};

		self.repository.update_status(record.index, status).await?;
		info!("Issued address at index {} as {}", record.index, status);
		Ok(IssuedAddress {
			address: record.address,
			index: record.index,
		})
	}

	async fn first_unused(&self, ctx: &WalletContext) -> Result<Option<AddressRecord>, WalletError> {
		Ok(self
			.repository
			.find_new_from(ctx.new_address_floor)
			.await?
			.into_iter()
			.find(|r| r.balance == 0))
	}

	/// Derives and stores the address after the highest known index, never below the floor.
	pub async fn add_new_address(&self, ctx: &WalletContext) -> Result<AddressRecord, WalletError> {
		let floor = ctx.new_address_floor;
		let index = match self.repository.find_last().await? {
			Some(last) if last.index + 1 >= floor => last.index + 1,
			_ => floor + 1,
		};

		let address = self
			.ledger
			.derive_address(&ctx.seed, index, ctx.security_level)
			.await?;
		let record = AddressRecord::new(index, address, ctx.security_level);
		self.repository.insert(record.clone()).await?;
		debug!("Added address at index {}", index);
		Ok(record)
	}

	/// Lowest and highest index holding a non-zero balance (0 when none).
	pub async fn get_address_indexes(&self) -> Result<AddressIndexes, WalletError> {
		let funded = self.repository.find_with_nonzero_balance().await?;
		Ok(AddressIndexes {
			search_balances_start: funded.first().map(|r| r.index).unwrap_or(0),
			new_address_start: funded.last().map(|r| r.index).unwrap_or(0),
		})
	}

	/// Sum of every cached balance.
	pub async fn total_balance(&self) -> Result<u64, WalletError> {
		let records = self.repository.find_all().await?;
		if records.is_empty() {
			return Err(WalletError::ValidationError(
				"no addresses in the store, run SyncAll to derive them".to_string(),
			));
		}
		Ok(records.iter().map(|r| r.balance).sum())
	}

	/// Records from the search floor up; unused addresses only when `entire` is set.
	pub async fn list_addresses(
		&self,
		ctx: &WalletContext,
		entire: bool,
	) -> Result<Vec<AddressRecord>, WalletError> {
		let records = self.repository.find_from_index(ctx.search_floor).await?;
		Ok(records
			.into_iter()
			.filter(|r| entire || r.status != AddressStatus::New)
			.collect())
	}
}
