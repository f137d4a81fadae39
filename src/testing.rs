//! In-memory ledger used by the unit tests.

use crate::ledger::trytes::{self, int_to_trytes};
use crate::ledger::{
	LedgerClient, LedgerError, Seed, Transaction, TransactionFilter, Transfer, TransferOptions,
};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Deterministic 81-tryte address for `index`.
pub fn mock_address(index: u64) -> String {
	let digits = int_to_trytes(index as i64, 9).unwrap();
	format!("{:9<81}", format!("MOCK{}", digits))
}

/// 81-tryte hash built from an uppercase label.
pub fn hash_of(label: &str) -> String {
	assert!(trytes::is_trytes(label) && label.len() <= trytes::HASH_LENGTH);
	format!("{:9<81}", label)
}

/// Hash built from a label and a counter.
pub fn numbered_hash(label: &str, n: usize) -> String {
	hash_of(&format!("{}{}", label, int_to_trytes(n as i64, 6).unwrap()))
}

pub fn tx(
	hash: &str,
	address: &str,
	value: i64,
	bundle: &str,
	current_index: u64,
	last_index: u64,
) -> Transaction {
	Transaction {
		hash: hash.to_string(),
		address: address.to_string(),
		value,
		current_index,
		last_index,
		bundle: bundle.to_string(),
		trunk_transaction: hash_of("TRUNK"),
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
	pub depth: u32,
	pub min_weight_magnitude: u32,
	pub transfers: Vec<Transfer>,
	pub options: TransferOptions,
}

#[derive(Default)]
struct MockState {
	balances: HashMap<String, u64>,
	transactions: Vec<Transaction>,
	inclusion: HashMap<String, bool>,
	derive_calls: usize,
	balance_requests: Vec<usize>,
	submissions: Vec<Submission>,
	replays: Vec<(String, u32)>,
	confirm_on_replay: bool,
	fail_replays: bool,
}

/// Ledger double with scripted balances, transactions and inclusion states
#[derive(Default)]
pub struct MockLedger {
	state: Mutex<MockState>,
}

impl MockLedger {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set_balance(&self, address: &str, balance: u64) {
		let mut state = self.state.lock().unwrap();
		state
			.balances
			.insert(trytes::no_checksum(address).to_string(), balance);
	}

	pub fn add_transaction(&self, transaction: Transaction, confirmed: bool) {
		let mut state = self.state.lock().unwrap();
		state
			.inclusion
			.insert(transaction.hash.clone(), confirmed);
		state.transactions.push(transaction);
	}

	pub fn set_inclusion(&self, hash: &str, confirmed: bool) {
		self.state
			.lock()
			.unwrap()
			.inclusion
			.insert(hash.to_string(), confirmed);
	}

	/// Marks every transaction of replayed bundles as confirmed.
	pub fn confirm_on_replay(&self, enabled: bool) {
		self.state.lock().unwrap().confirm_on_replay = enabled;
	}

	pub fn fail_replays(&self, enabled: bool) {
		self.state.lock().unwrap().fail_replays = enabled;
	}

	pub fn derive_calls(&self) -> usize {
		self.state.lock().unwrap().derive_calls
	}

	/// Sizes of the address lists passed to `get_balances`.
	pub fn balance_requests(&self) -> Vec<usize> {
		self.state.lock().unwrap().balance_requests.clone()
	}

	pub fn submissions(&self) -> Vec<Submission> {
		self.state.lock().unwrap().submissions.clone()
	}

	/// Tail hash and depth of every replay.
	pub fn replays(&self) -> Vec<(String, u32)> {
		self.state.lock().unwrap().replays.clone()
	}
}

#[async_trait]
impl LedgerClient for MockLedger {
	async fn derive_address(
		&self,
		_seed: &Seed,
		index: u64,
		_security_level: u8,
	) -> Result<String, LedgerError> {
		self.state.lock().unwrap().derive_calls += 1;
		Ok(mock_address(index))
	}

	async fn get_balances(
		&self,
		addresses: &[String],
		_threshold: u32,
	) -> Result<Vec<u64>, LedgerError> {
		let mut state = self.state.lock().unwrap();
		state.balance_requests.push(addresses.len());
		Ok(addresses
			.iter()
			.map(|a| {
				state
					.balances
					.get(trytes::no_checksum(a))
					.copied()
					.unwrap_or(0)
			})
			.collect())
	}

	async fn find_transactions(
		&self,
		filter: TransactionFilter,
	) -> Result<Vec<Transaction>, LedgerError> {
		let state = self.state.lock().unwrap();
		let found = match filter {
			TransactionFilter::Addresses(addresses) => state
				.transactions
				.iter()
				.filter(|t| addresses.iter().any(|a| trytes::no_checksum(a) == t.address))
				.cloned()
				.collect(),
			TransactionFilter::Bundles(bundles) => state
				.transactions
				.iter()
				.filter(|t| bundles.contains(&t.bundle))
				.cloned()
				.collect(),
		};
		Ok(found)
	}

	async fn get_inclusion_states(&self, hashes: &[String]) -> Result<Vec<bool>, LedgerError> {
		let state = self.state.lock().unwrap();
		Ok(hashes
			.iter()
			.map(|h| state.inclusion.get(h).copied().unwrap_or(false))
			.collect())
	}

	async fn submit_transfer(
		&self,
		_seed: &Seed,
		depth: u32,
		min_weight_magnitude: u32,
		transfers: &[Transfer],
		options: &TransferOptions,
	) -> Result<Vec<Transaction>, LedgerError> {
		let mut state = self.state.lock().unwrap();
		let n = state.submissions.len();
		state.submissions.push(Submission {
			depth,
			min_weight_magnitude,
			transfers: transfers.to_vec(),
			options: options.clone(),
		});

		let bundle = numbered_hash("SENTBUNDLE", n);
		let mut entries: Vec<(String, i64)> = transfers
			.iter()
			.map(|t| (t.address.clone(), t.value as i64))
			.collect();
		entries.extend(
			options
				.inputs
				.iter()
				.map(|i| (i.address.clone(), -(i.balance as i64))),
		);
		let remainder = entries.iter().map(|(_, value)| value).sum::<i64>().abs();
		if let (Some(address), true) = (&options.remainder_address, remainder > 0) {
			entries.push((address.clone(), remainder));
		}
		let last_index = entries.len().saturating_sub(1) as u64;
		let bundle_txs: Vec<Transaction> = entries
			.into_iter()
			.enumerate()
			.map(|(i, (address, value))| {
				tx(
					&numbered_hash(&format!("SENT{}", int_to_trytes(n as i64, 3).unwrap()), i),
					&address,
					value,
					&bundle,
					i as u64,
					last_index,
				)
			})
			.collect();
		state.transactions.extend(bundle_txs.iter().cloned());
		Ok(bundle_txs)
	}

	async fn replay_bundle(
		&self,
		tail_hash: &str,
		depth: u32,
		_min_weight_magnitude: u32,
	) -> Result<Vec<Transaction>, LedgerError> {
		let mut state = self.state.lock().unwrap();
		if state.fail_replays {
			return Err(LedgerError::NodeError("attachToTangle failed".to_string()));
		}
		let n = state.replays.len();
		state.replays.push((tail_hash.to_string(), depth));

		let bundle = state
			.transactions
			.iter()
			.find(|t| t.hash == tail_hash)
			.map(|t| t.bundle.clone())
			.ok_or_else(|| LedgerError::InvalidResponse(format!("unknown tail {}", tail_hash)))?;

		let prefix = format!("REPLAY{}", int_to_trytes(n as i64, 3).unwrap());
		let mut copies: Vec<Transaction> = state
			.transactions
			.iter()
			.filter(|t| t.bundle == bundle)
			.cloned()
			.collect();
		copies.sort_by_key(|t| t.current_index);
		copies.dedup_by_key(|t| t.current_index);
		for (i, copy) in copies.iter_mut().enumerate() {
			copy.hash = numbered_hash(&prefix, i);
		}

		let confirmed = state.confirm_on_replay;
		for copy in &copies {
			state.inclusion.insert(copy.hash.clone(), confirmed);
		}
		state.transactions.extend(copies.iter().cloned());
		Ok(copies)
	}
}
