//! Ledger integration module
//!
//! This module provides the client abstraction and types for talking to a ledger node:
//! balances, transaction lookup, inclusion states, transfer submission and bundle replay.
//! Seed-bound cryptography sits behind the `SeedCrypto` trait.

/// Ledger client trait and the node HTTP implementation
mod client;
/// Remote signing service integration
pub mod signer;
/// Tryte codec and identifier validation
pub mod trytes;
/// Type definitions for ledger data structures
mod types;

pub use client::{HttpLedgerClient, LedgerClient};
pub use signer::{RemoteSigner, SeedCrypto};
pub use types::*;
