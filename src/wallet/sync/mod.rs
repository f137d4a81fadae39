//! Address Synchronization Module
//!
//! This module keeps the local address record store in line with the ledger. It is composed of
//! several submodules, each responsible for a specific aspect of the sync process:
//!
//! - `orchestrator`: The `SynchronizationEngine`, which walks the index space and refreshes balances and statuses.
//! - `progress_tracker`: Tracks what happened to each visited index and produces run statistics.
//! - `repositories`: The typed record store interface with in-memory and file-backed implementations.
//! - `strategies`: The mutually exclusive termination policies of a sync run and their configuration.

/// Main coordinator for the address sync process
pub mod orchestrator;
/// Tracks synchronization progress and statistics
pub mod progress_tracker;
/// Address record storage
pub mod repositories;
/// Termination policies for a sync run
pub mod strategies;

pub use orchestrator::*;
pub use progress_tracker::SyncStats;
pub use repositories::{
	AddressRepository, FileAddressRepository, InMemoryAddressRepository, StoreError,
};
pub use strategies::{SyncConfig, SyncMode};
