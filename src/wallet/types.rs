use crate::ledger::LedgerError;
use crate::wallet::sync::repositories::StoreError;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a derived address.
///
/// `Exhausted` and `Overused` are terminal: once recorded they are never replaced.
/// `Published` marks an address handed out by the wallet before the ledger has seen it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressStatus {
	/// Not attached to the ledger.
	New,
	/// Issued for receiving funds; nothing confirmed yet.
	Published,
	/// Has confirmed zero-value transactions only.
	Attached,
	/// Has confirmed incoming value and no confirmed outgoing transaction.
	Used,
	/// Has exactly one confirmed outgoing transaction; must not be used again.
	Exhausted,
	/// Has more than one confirmed outgoing transaction.
	Overused,
}

impl AddressStatus {
	pub fn is_terminal(self) -> bool {
		matches!(self, AddressStatus::Exhausted | AddressStatus::Overused)
	}

	pub fn as_str(self) -> &'static str {
		match self {
			AddressStatus::New => "new",
			AddressStatus::Published => "published",
			AddressStatus::Attached => "attached",
			AddressStatus::Used => "used",
			AddressStatus::Exhausted => "exhausted",
			AddressStatus::Overused => "overused",
		}
	}
}

impl fmt::Display for AddressStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Cached state of one derived address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressRecord {
	pub index: u64,
	pub address: String,
	pub balance: u64,
	pub status: AddressStatus,
	pub security_level: u8,
}

impl AddressRecord {
	/// A freshly derived, unused address.
	pub fn new(index: u64, address: String, security_level: u8) -> Self {
		Self {
			index,
			address,
			balance: 0,
			status: AddressStatus::New,
			security_level,
		}
	}
}

/// Address handed out by the wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedAddress {
	pub address: String,
	pub index: u64,
}

/// Error types for wallet operations
#[allow(clippy::enum_variant_names)]
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
	#[error("Transport error: {0}")]
	TransportError(#[from] LedgerError),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error(
		"Insufficient funds: found a total of {available}, {shortfall} short of the required {required}"
	)]
	InsufficientFunds {
		required: u64,
		available: u64,
		shortfall: u64,
	},

	#[error("Database error: {0}")]
	DatabaseError(#[from] StoreError),

	#[error("Invariant violation: {0}")]
	InvariantViolation(String),

	#[error("Configuration error: {0}")]
	ConfigError(String),

	#[error("Interrupted before {0}")]
	Interrupted(String),
}

impl WalletError {
	/// Stable identifier of the error kind for structured output.
	pub fn kind(&self) -> &'static str {
		match self {
			WalletError::TransportError(_) => "transport",
			WalletError::ValidationError(_) => "validation",
			WalletError::InsufficientFunds { .. } => "insufficient_funds",
			WalletError::DatabaseError(_) => "database",
			WalletError::InvariantViolation(_) => "invariant_violation",
			WalletError::ConfigError(_) => "config",
			WalletError::Interrupted(_) => "interrupted",
		}
	}

	pub(crate) fn insufficient(required: u64, available: u64) -> Self {
		WalletError::InsufficientFunds {
			required,
			available,
			shortfall: required.saturating_sub(available),
		}
	}
}
