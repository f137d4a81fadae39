//!
//! Ledger client abstraction and its HTTP implementation.
//!
//! `LedgerClient` is the capability set the wallet consumes. `HttpLedgerClient` talks to a
//! node's JSON command API; seed-bound cryptography is delegated to a `SeedCrypto`
//! implementation. No call is retried here: every failure is surfaced to the caller.

use super::signer::SeedCrypto;
use super::trytes::{self, decode_transaction};
use super::types::*;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const API_VERSION_HEADER: &str = "X-IOTA-API-Version";

/// Operations the wallet needs from the ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync {
	/// Derives the address for `(seed, index, security_level)`.
	async fn derive_address(
		&self,
		seed: &Seed,
		index: u64,
		security_level: u8,
	) -> Result<String, LedgerError>;

	/// Confirmed balances for `addresses`, in the same order.
	async fn get_balances(&self, addresses: &[String], threshold: u32)
	-> Result<Vec<u64>, LedgerError>;

	/// All transactions matching the filter.
	async fn find_transactions(
		&self,
		filter: TransactionFilter,
	) -> Result<Vec<Transaction>, LedgerError>;

	/// Inclusion (confirmation) state of each hash, in the same order.
	async fn get_inclusion_states(&self, hashes: &[String]) -> Result<Vec<bool>, LedgerError>;

	/// Signs, attaches and broadcasts a transfer. Returns the transactions of the new bundle.
	async fn submit_transfer(
		&self,
		seed: &Seed,
		depth: u32,
		min_weight_magnitude: u32,
		transfers: &[Transfer],
		options: &TransferOptions,
	) -> Result<Vec<Transaction>, LedgerError>;

	/// Reattaches the bundle whose tail is `tail_hash`.
	async fn replay_bundle(
		&self,
		tail_hash: &str,
		depth: u32,
		min_weight_magnitude: u32,
	) -> Result<Vec<Transaction>, LedgerError>;
}

/// Ledger node client speaking the JSON command API
#[derive(Clone)]
pub struct HttpLedgerClient {
	/// The underlying HTTP client.
	http_client: Client,
	/// The node's API endpoint.
	provider_url: String,
	/// Seed cryptography backend.
	signer: Arc<dyn SeedCrypto>,
}

impl HttpLedgerClient {
	/// Create a new ledger client.
	///
	/// # Arguments
	/// * `provider_url` - The node API endpoint, e.g. `http://localhost:14265`.
	/// * `signer` - Backend for address derivation, signing and hashing.
	pub fn new(provider_url: String, signer: Arc<dyn SeedCrypto>) -> Result<Self, LedgerError> {
		let http_client = Client::builder().timeout(Duration::from_secs(30)).build()?;

		Ok(Self {
			http_client,
			provider_url,
			signer,
		})
	}

	/// Execute one API command.
	///
	/// # Returns
	/// The decoded response, or a `LedgerError` if the request fails or the node reports an error.
	pub async fn execute_command<T: DeserializeOwned>(
		&self,
		command: serde_json::Value,
	) -> Result<T, LedgerError> {
		debug!("Executing node command: {}", command["command"]);

		let response = self
			.http_client
			.post(&self.provider_url)
			.header("Content-Type", "application/json")
			.header(API_VERSION_HEADER, "1")
			.json(&command)
			.send()
			.await?;

		let status = response.status();
		let response_json: serde_json::Value = response.json().await?;

		if let Some(error) = response_json
			.get("error")
			.or_else(|| response_json.get("exception"))
		{
			return Err(LedgerError::NodeError(format!(
				"{} ({}): {}",
				command["command"], status, error
			)));
		}

		if !status.is_success() {
			return Err(LedgerError::NodeError(format!("HTTP error: {}", status)));
		}

		Ok(serde_json::from_value(response_json)?)
	}

	async fn get_trytes(&self, hashes: &[String]) -> Result<Vec<String>, LedgerError> {
		let response: TrytesResponse = self
			.execute_command(json!({
				"command": "getTrytes",
				"hashes": hashes,
			}))
			.await?;

		if response.trytes.len() != hashes.len() {
			return Err(LedgerError::InvalidResponse(format!(
				"requested {} transactions, received {}",
				hashes.len(),
				response.trytes.len()
			)));
		}
		Ok(response.trytes)
	}

	/// Collects the bundle starting at `tail_hash` by following trunk references.
	///
	/// Returns the raw trytes in bundle order (tail first).
	async fn get_bundle_trytes(&self, tail_hash: &str) -> Result<Vec<String>, LedgerError> {
		let mut walk = BundleWalk::new(tail_hash);
		let mut bundle_trytes = Vec::new();
		let mut hash = tail_hash.to_string();

		loop {
			let raw = self
				.get_trytes(std::slice::from_ref(&hash))
				.await?
				.into_iter()
				.next()
				.ok_or(LedgerError::InvalidResponse("empty getTrytes reply".to_string()))?;
			let tx = decode_transaction(&hash, &raw)?;
			let step = walk.accept(&tx)?;
			bundle_trytes.push(raw);
			match step {
				WalkStep::Next(trunk) => hash = trunk,
				WalkStep::Complete => break,
			}
		}

		Ok(bundle_trytes)
	}

	/// Selects tips, attaches `trytes` (last transaction first) and stores/broadcasts them.
	async fn send_trytes(
		&self,
		trytes: Vec<String>,
		depth: u32,
		min_weight_magnitude: u32,
	) -> Result<Vec<Transaction>, LedgerError> {
		let tips: TransactionsToApproveResponse = self
			.execute_command(json!({
				"command": "getTransactionsToApprove",
				"depth": depth,
			}))
			.await?;

		let attached: TrytesResponse = self
			.execute_command(json!({
				"command": "attachToTangle",
				"trunkTransaction": tips.trunk_transaction,
				"branchTransaction": tips.branch_transaction,
				"minWeightMagnitude": min_weight_magnitude,
				"trytes": trytes,
			}))
			.await?;

		let _: serde_json::Value = self
			.execute_command(json!({
				"command": "storeTransactions",
				"trytes": attached.trytes,
			}))
			.await?;
		let _: serde_json::Value = self
			.execute_command(json!({
				"command": "broadcastTransactions",
				"trytes": attached.trytes,
			}))
			.await?;

		let mut transactions = Vec::with_capacity(attached.trytes.len());
		for raw in &attached.trytes {
			let hash = self.signer.transaction_hash(raw).await?;
			transactions.push(decode_transaction(&hash, raw)?);
		}
		transactions.sort_by_key(|tx| tx.current_index);

		info!(
			"Attached and broadcast {} transactions of bundle {}",
			transactions.len(),
			transactions
				.first()
				.map(|tx| tx.bundle.as_str())
				.unwrap_or("<empty>")
		);
		Ok(transactions)
	}
}

enum WalkStep {
	Next(String),
	Complete,
}

/// Trunk walk through one bundle. Positions must follow each other from the tail up to
/// `last_index`, so a walk takes at most `last_index + 1` steps.
struct BundleWalk {
	tail_hash: String,
	bundle: Option<String>,
	last_index: u64,
	next_position: u64,
}

impl BundleWalk {
	fn new(tail_hash: &str) -> Self {
		Self {
			tail_hash: tail_hash.to_string(),
			bundle: None,
			last_index: 0,
			next_position: 0,
		}
	}

	fn accept(&mut self, tx: &Transaction) -> Result<WalkStep, LedgerError> {
		if tx.current_index != self.next_position {
			return Err(LedgerError::InvalidResponse(format!(
				"bundle of tail {}: expected position {}, found {}",
				self.tail_hash, self.next_position, tx.current_index
			)));
		}

		match &self.bundle {
			None => {
				self.bundle = Some(tx.bundle.clone());
				self.last_index = tx.last_index;
			}
			Some(bundle) if *bundle != tx.bundle || tx.last_index != self.last_index => {
				return Err(LedgerError::InvalidResponse(format!(
					"bundle {} is incomplete at position {}",
					bundle, tx.current_index
				)));
			}
			Some(_) => {}
		}

		if tx.current_index >= self.last_index {
			return Ok(WalkStep::Complete);
		}
		self.next_position += 1;
		Ok(WalkStep::Next(tx.trunk_transaction.clone()))
	}
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
	async fn derive_address(
		&self,
		seed: &Seed,
		index: u64,
		security_level: u8,
	) -> Result<String, LedgerError> {
		self.signer.derive_address(seed, index, security_level).await
	}

	async fn get_balances(
		&self,
		addresses: &[String],
		threshold: u32,
	) -> Result<Vec<u64>, LedgerError> {
		let addresses: Vec<&str> = addresses.iter().map(|a| trytes::no_checksum(a)).collect();
		let response: BalancesResponse = self
			.execute_command(json!({
				"command": "getBalances",
				"addresses": addresses,
				"threshold": threshold,
			}))
			.await?;

		if response.balances.len() != addresses.len() {
			return Err(LedgerError::InvalidResponse(format!(
				"requested {} balances, received {}",
				addresses.len(),
				response.balances.len()
			)));
		}

		response
			.balances
			.iter()
			.map(|b| {
				b.parse::<u64>()
					.map_err(|e| LedgerError::InvalidResponse(format!("balance {:?}: {}", b, e)))
			})
			.collect()
	}

	async fn find_transactions(
		&self,
		filter: TransactionFilter,
	) -> Result<Vec<Transaction>, LedgerError> {
		let command = match &filter {
			TransactionFilter::Addresses(addresses) => {
				let addresses: Vec<&str> =
					addresses.iter().map(|a| trytes::no_checksum(a)).collect();
				json!({ "command": "findTransactions", "addresses": addresses })
			}
			TransactionFilter::Bundles(bundles) => {
				json!({ "command": "findTransactions", "bundles": bundles })
			}
		};

		let response: HashesResponse = self.execute_command(command).await?;
		if response.hashes.is_empty() {
			return Ok(Vec::new());
		}

		let raw = self.get_trytes(&response.hashes).await?;
		response
			.hashes
			.iter()
			.zip(raw.iter())
			.map(|(hash, trytes)| decode_transaction(hash, trytes).map_err(LedgerError::from))
			.collect()
	}

	async fn get_inclusion_states(&self, hashes: &[String]) -> Result<Vec<bool>, LedgerError> {
		if hashes.is_empty() {
			return Ok(Vec::new());
		}

		let node_info: NodeInfoResponse = self
			.execute_command(json!({ "command": "getNodeInfo" }))
			.await?;

		let response: InclusionStatesResponse = self
			.execute_command(json!({
				"command": "getInclusionStates",
				"transactions": hashes,
				"tips": [node_info.latest_solid_subtangle_milestone],
			}))
			.await?;

		if response.states.len() != hashes.len() {
			return Err(LedgerError::InvalidResponse(format!(
				"requested {} inclusion states, received {}",
				hashes.len(),
				response.states.len()
			)));
		}
		Ok(response.states)
	}

	async fn submit_transfer(
		&self,
		seed: &Seed,
		depth: u32,
		min_weight_magnitude: u32,
		transfers: &[Transfer],
		options: &TransferOptions,
	) -> Result<Vec<Transaction>, LedgerError> {
		let trytes = self
			.signer
			.prepare_transfers(seed, transfers, options)
			.await?;
		info!("Prepared bundle with {} transactions", trytes.len());
		self.send_trytes(trytes, depth, min_weight_magnitude).await
	}

	async fn replay_bundle(
		&self,
		tail_hash: &str,
		depth: u32,
		min_weight_magnitude: u32,
	) -> Result<Vec<Transaction>, LedgerError> {
		let mut trytes = self.get_bundle_trytes(tail_hash).await?;
		trytes.reverse();
		info!("Replaying bundle of tail {}", tail_hash);
		self.send_trytes(trytes, depth, min_weight_magnitude).await
	}
}
