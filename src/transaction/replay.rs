//!
//! Replay of stuck bundles.
//!
//! A bundle is worth reattaching only while none of its transactions is confirmed and every
//! address it spends from still holds exactly the amount being spent. `ReplayEngine` inspects the
//! bundles touching an address, reattaches the eligible ones once, or keeps polling and
//! reattaching them until they confirm, lose their funding or run out of attempts.

use crate::config::{ReplaySettings, WalletContext};
use crate::ledger::{LedgerClient, LedgerError, TransactionFilter};
use crate::transaction::confirmation::{ConfirmationChecker, ConfirmationState, ensure_address};
use crate::utils::ShutdownSignal;
use crate::wallet::WalletError;

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Replay-relevant view of one bundle, computed per invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleReplayState {
	pub bundle_hash: String,
	/// Transaction at position 0; required to reattach the bundle.
	pub tail_transaction: Option<String>,
	pub confirmed_transactions: usize,
	pub unconfirmed_transactions: usize,
	/// Every spending address still holds exactly the spent amount.
	pub valid_funding: bool,
	pub funding_addresses: Vec<String>,
	/// Transactions of the queried address carrying this bundle hash.
	pub count: usize,
}

impl BundleReplayState {
	pub fn is_eligible(&self) -> bool {
		self.valid_funding && self.confirmed_transactions == 0
	}

	fn tail(&self) -> Result<&str, WalletError> {
		self.tail_transaction.as_deref().ok_or_else(|| {
			WalletError::InvariantViolation(format!(
				"bundle {} has no tail transaction",
				self.bundle_hash
			))
		})
	}
}

/// Bundles reattached by a manual replay
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
	pub replayed_bundles: Vec<String>,
}

/// What the automatic replay loop did for one bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomaticReplayOutcome {
	pub bundle: String,
	pub valid_funding: bool,
	pub iterations: u32,
	pub replays: u32,
	pub final_state: ConfirmationState,
}

pub struct ReplayEngine {
	ledger: Arc<dyn LedgerClient>,
	checker: ConfirmationChecker,
	settings: ReplaySettings,
	shutdown: ShutdownSignal,
}

impl ReplayEngine {
	pub fn new(
		ledger: Arc<dyn LedgerClient>,
		settings: ReplaySettings,
		shutdown: ShutdownSignal,
	) -> Self {
		Self {
			checker: ConfirmationChecker::new(ledger.clone()),
			ledger,
			settings,
			shutdown,
		}
	}

	/// Replay state of every bundle touching `address`, in first-seen order.
	pub async fn get_replay_candidates(
		&self,
		ctx: &WalletContext,
		address: &str,
	) -> Result<Vec<BundleReplayState>, WalletError> {
		ensure_address(address)?;
		let transactions = self
			.ledger
			.find_transactions(TransactionFilter::Addresses(vec![address.to_string()]))
			.await?;

		let mut states: Vec<BundleReplayState> = Vec::new();
		let mut positions: HashMap<String, usize> = HashMap::new();
		for tx in transactions {
			if let Some(&position) = positions.get(&tx.bundle) {
				states[position].count += 1;
				continue;
			}
			let state = self.inspect_bundle(ctx, &tx.bundle).await?;
			positions.insert(tx.bundle, states.len());
			states.push(state);
		}

		for state in &states {
			debug!(
				"Bundle {}: seen {} times, {} confirmed, {} unconfirmed, funding valid: {}",
				state.bundle_hash,
				state.count,
				state.confirmed_transactions,
				state.unconfirmed_transactions,
				state.valid_funding
			);
		}
		Ok(states)
	}

	async fn inspect_bundle(
		&self,
		ctx: &WalletContext,
		bundle_hash: &str,
	) -> Result<BundleReplayState, WalletError> {
		let transactions = self
			.ledger
			.find_transactions(TransactionFilter::Bundles(vec![bundle_hash.to_string()]))
			.await?;
		let inclusion = self.checker.inclusion_states(&transactions).await?;

		let mut state = BundleReplayState {
			bundle_hash: bundle_hash.to_string(),
			tail_transaction: None,
			confirmed_transactions: 0,
			unconfirmed_transactions: 0,
			valid_funding: true,
			funding_addresses: Vec::new(),
			count: 1,
		};

		for (tx, confirmed) in transactions.iter().zip(inclusion) {
			if tx.is_tail() {
				state.tail_transaction = Some(tx.hash.clone());
			}
			if confirmed {
				state.confirmed_transactions += 1;
			} else {
				state.unconfirmed_transactions += 1;
			}

			// reattachments repeat the same spends
			if !tx.is_outgoing() || state.funding_addresses.contains(&tx.address) {
				continue;
			}
			let balance = self
				.ledger
				.get_balances(std::slice::from_ref(&tx.address), ctx.balance_threshold)
				.await?
				.into_iter()
				.next()
				.ok_or_else(|| {
					LedgerError::InvalidResponse(format!("no balance returned for {}", tx.address))
				})?;
			let needed = tx.value.unsigned_abs();
			if balance != needed {
				debug!(
					"Funding of bundle {} is gone: need {}, address holds {}",
					bundle_hash, needed, balance
				);
				state.valid_funding = false;
			}
			state.funding_addresses.push(tx.address.clone());
		}

		Ok(state)
	}

	/// Reattaches every eligible bundle touching `address` once.
	pub async fn replay(
		&self,
		ctx: &WalletContext,
		address: &str,
	) -> Result<ReplayReport, WalletError> {
		let candidates = self.get_replay_candidates(ctx, address).await?;

		let mut replayed_bundles = Vec::new();
		for state in candidates.iter().filter(|s| s.is_eligible()) {
			let tail = state.tail()?;
			self.shutdown
				.checkpoint(&format!("replaying bundle {}", state.bundle_hash))?;
			let _guard = self.shutdown.critical_section();

			info!("Replaying bundle {}", state.bundle_hash);
			self.ledger
				.replay_bundle(tail, self.settings.manual_depth, ctx.min_weight_magnitude)
				.await?;
			replayed_bundles.push(state.bundle_hash.clone());
		}

		Ok(ReplayReport { replayed_bundles })
	}

	/// Polls and reattaches each funded, unconfirmed bundle touching `address` until it confirms,
	/// loses its funding or `max_iterations` is reached.
	///
	/// Failed re-checks and reattachments inside the loop are logged and retried on the next
	/// iteration. A final confirmation state is reported for every bundle.
	pub async fn fully_automatic_replay(
		&self,
		ctx: &WalletContext,
		address: &str,
	) -> Result<Vec<AutomaticReplayOutcome>, WalletError> {
		let candidates = self.get_replay_candidates(ctx, address).await?;
		let interval = Duration::from_secs(self.settings.poll_interval_secs);

		let mut outcomes = Vec::with_capacity(candidates.len());
		for state in candidates {
			info!("Checking bundle {}", state.bundle_hash);
			let mut confirmation = self
				.checker
				.get_confirmation_state(&state.bundle_hash)
				.await?;
			if !state.valid_funding {
				info!(
					"Bundle {} has no valid funding and cannot confirm, not replaying",
					state.bundle_hash
				);
			}

			let mut iterations = 0u32;
			let mut replays = 0u32;
			while confirmation.confirmed_count == 0
				&& state.valid_funding
				&& iterations < self.settings.max_iterations
			{
				self.shutdown.checkpoint(&format!(
					"automatic replay {} of bundle {}",
					iterations + 1,
					state.bundle_hash
				))?;
				debug!("Waiting {}s before the next check", interval.as_secs());
				tokio::time::sleep(interval).await;

				match self.checker.get_confirmation_state(&state.bundle_hash).await {
					Ok(current) => confirmation = current,
					Err(e) => warn!("Confirmation check of {} failed: {}", state.bundle_hash, e),
				}

				if confirmation.confirmed_count == 0 {
					let tail = state.tail()?;
					let _guard = self.shutdown.critical_section();
					match self
						.ledger
						.replay_bundle(tail, self.settings.automatic_depth, ctx.min_weight_magnitude)
						.await
					{
						Ok(_) => {
							replays += 1;
							info!("Replayed bundle {} ({} so far)", state.bundle_hash, replays);
						}
						Err(e) => warn!("Replay of {} failed: {}", state.bundle_hash, e),
					}
				}
				iterations += 1;
			}

			let final_state = self
				.checker
				.get_confirmation_state(&state.bundle_hash)
				.await?;
			info!(
				"Final confirmation state of bundle {} is {:?}",
				state.bundle_hash, final_state.status
			);
			outcomes.push(AutomaticReplayOutcome {
				bundle: state.bundle_hash,
				valid_funding: state.valid_funding,
				iterations,
				replays,
				final_state,
			});
		}

		Ok(outcomes)
	}
}
