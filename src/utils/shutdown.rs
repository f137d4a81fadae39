//!
//! Deferred interrupt handling.
//!
//! Ctrl+C does not kill a running command. The signal is recorded and honoured at the next
//! unit boundary (`checkpoint`), never inside a critical section such as one address's
//! read-modify-write or a transfer submission.

use crate::wallet::WalletError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{info, warn};

/// Shared interrupt flag checked at unit boundaries
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
	requested: Arc<AtomicBool>,
	critical_depth: Arc<AtomicUsize>,
}

impl ShutdownSignal {
	pub fn new() -> Self {
		Self::default()
	}

	/// Spawns a task that records Ctrl+C instead of terminating the process.
	pub fn listen_for_ctrl_c(&self) {
		let signal = self.clone();
		tokio::spawn(async move {
			loop {
				if let Err(e) = tokio::signal::ctrl_c().await {
					warn!("Unable to listen for Ctrl+C: {}", e);
					return;
				}
				signal.request();
				if signal.in_critical_section() {
					warn!("Interrupt received; finishing the current operation before stopping");
				} else {
					warn!("Interrupt received; stopping at the next safe point");
				}
			}
		});
	}

	pub fn request(&self) {
		self.requested.store(true, Ordering::SeqCst);
	}

	pub fn is_requested(&self) -> bool {
		self.requested.load(Ordering::SeqCst)
	}

	fn in_critical_section(&self) -> bool {
		self.critical_depth.load(Ordering::SeqCst) > 0
	}

	/// Fails with `Interrupted` if an interrupt is pending. `next_unit` names the work that
	/// would have started.
	pub fn checkpoint(&self, next_unit: &str) -> Result<(), WalletError> {
		if self.is_requested() && !self.in_critical_section() {
			info!("Stopping before {}", next_unit);
			return Err(WalletError::Interrupted(next_unit.to_string()));
		}
		Ok(())
	}

	/// Marks a unit of work that must not be interrupted until the guard is dropped.
	pub fn critical_section(&self) -> CriticalSection {
		self.critical_depth.fetch_add(1, Ordering::SeqCst);
		CriticalSection {
			depth: self.critical_depth.clone(),
		}
	}
}

/// Guard returned by `ShutdownSignal::critical_section`
#[derive(Debug)]
pub struct CriticalSection {
	depth: Arc<AtomicUsize>,
}

impl Drop for CriticalSection {
	fn drop(&mut self) {
		self.depth.fetch_sub(1, Ordering::SeqCst);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn checkpoint_passes_without_request() {
		let signal = ShutdownSignal::new();
		assert!(signal.checkpoint("index 0").is_ok());
	}

	#[test]
	fn checkpoint_fails_after_request() {
		let signal = ShutdownSignal::new();
		signal.clone().request();
		let err = signal.checkpoint("index 4").unwrap_err();
		assert_eq!(err.kind(), "interrupted");
		assert!(err.to_string().contains("index 4"));
	}

	#[test]
	fn critical_section_defers_interrupt() {
		let signal = ShutdownSignal::new();
		let guard = signal.critical_section();
		signal.request();
		assert!(signal.checkpoint("nested unit").is_ok());
		drop(guard);
		assert!(signal.checkpoint("next unit").is_err());
	}
}
