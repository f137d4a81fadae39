use crate::wallet::sync::progress_tracker::SyncProgressTracker;

/// Number of `New` addresses a fresh-pool run accumulates before stopping.
pub const FRESH_POOL_TARGET: usize = 10;

/// Trait for the termination policies of a sync run
pub trait SyncStrategy: Send + Sync {
	/// Whether `next_index` should be processed, given the progress made so far.
	fn should_continue(&self, next_index: u64, progress: &SyncProgressTracker) -> bool;

	/// Get the name of this strategy
	fn name(&self) -> &'static str;

	/// Whether the end of the run depends on what the ledger reports. Only such runs are capped.
	fn is_open_ended(&self) -> bool {
		true
	}
}

/// Configuration for sync runs
#[derive(Debug, Clone)]
pub struct SyncConfig {
	/// Upper bound on indices visited by an open-ended run; bounded runs always reach their end
	pub max_indices_per_run: usize,
	/// Addresses per `get_balances` request
	pub balance_batch_size: usize,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			max_indices_per_run: 1000,
			balance_batch_size: 20,
		}
	}
}

/// Stops when the index reaches `end_index` (exclusive)
pub struct BoundedSync {
	end_index: u64,
}

impl BoundedSync {
	pub fn new(end_index: u64) -> Self {
		Self { end_index }
	}
}

impl SyncStrategy for BoundedSync {
	fn should_continue(&self, next_index: u64, _progress: &SyncProgressTracker) -> bool {
		next_index < self.end_index
	}

	fn name(&self) -> &'static str {
		"BoundedSync"
	}

	fn is_open_ended(&self) -> bool {
		false
	}
}

/// Stops after the first index whose latest inclusion check confirmed an outgoing transaction
pub struct ConfirmedSpendGatedSync;

impl SyncStrategy for ConfirmedSpendGatedSync {
	fn should_continue(&self, _next_index: u64, progress: &SyncProgressTracker) -> bool {
		!progress.last_check_confirmed_spend()
	}

	fn name(&self) -> &'static str {
		"ConfirmedSpendGatedSync"
	}
}

/// Stops once enough refreshed addresses are still `New`
pub struct FreshPoolSync {
	target_new: usize,
}

impl FreshPoolSync {
	pub fn new(target_new: usize) -> Self {
		Self { target_new }
	}
}

impl Default for FreshPoolSync {
	fn default() -> Self {
		Self::new(FRESH_POOL_TARGET)
	}
}

impl SyncStrategy for FreshPoolSync {
	fn should_continue(&self, _next_index: u64, progress: &SyncProgressTracker) -> bool {
		progress.fresh_addresses() < self.target_new
	}

	fn name(&self) -> &'static str {
		"FreshPoolSync"
	}
}

/// Termination mode selected by the caller; exactly one governs a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
	/// Process indices up to the given end (exclusive)
	Bounded(u64),
	ConfirmedSpendGated,
	FreshPool,
}

impl SyncMode {
	pub fn into_strategy(self) -> Box<dyn SyncStrategy> {
		match self {
			SyncMode::Bounded(end_index) => Box::new(BoundedSync::new(end_index)),
			SyncMode::ConfirmedSpendGated => Box::new(ConfirmedSpendGatedSync),
			SyncMode::FreshPool => Box::new(FreshPoolSync::default()),
		}
	}
}
