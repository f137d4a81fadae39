//! Address lifecycle transitions.
//!
//! The status of an address is derived from its confirmed transaction history. Only confirmed
//! transactions count; pending ones may still be dropped or reattached. Terminal states are
//! never recomputed: after a ledger snapshot a spent address can look fresh again.

use crate::ledger::Transaction;
use crate::wallet::AddressStatus;

/// Confirmed transaction counts for one address, split by direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionTally {
	pub outgoing: usize,
	pub incoming: usize,
	pub zero_value: usize,
}

impl TransactionTally {
	/// Counts the confirmed entries of `transactions`; `inclusion[i]` belongs to `transactions[i]`.
	pub fn from_inclusion(transactions: &[Transaction], inclusion: &[bool]) -> Self {
		let mut tally = Self::default();
		for (tx, confirmed) in transactions.iter().zip(inclusion) {
			if *confirmed {
				tally.record(tx);
			}
		}
		tally
	}

	fn record(&mut self, tx: &Transaction) {
		if tx.is_outgoing() {
			self.outgoing += 1;
		} else if tx.is_incoming() {
			self.incoming += 1;
		} else {
			self.zero_value += 1;
		}
	}

	pub fn status_after(&self, previous: AddressStatus) -> AddressStatus {
		derive_status(previous, self.outgoing, self.incoming, self.zero_value)
	}
}

/// Next status of an address given its confirmed outgoing, incoming and zero-value counts.
pub fn derive_status(
	previous: AddressStatus,
	outgoing: usize,
	incoming: usize,
	zero_value: usize,
) -> AddressStatus {
	if previous.is_terminal() {
		return previous;
	}

	match (outgoing, incoming, zero_value) {
		(2.., _, _) => AddressStatus::Overused,
		(1, _, _) => AddressStatus::Exhausted,
		(0, 1.., _) => AddressStatus::Used,
		(0, 0, 1..) => AddressStatus::Attached,
		_ => previous,
	}
}
