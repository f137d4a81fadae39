//! Address lifecycle tracking and ledger synchronization for a seed-derived IOTA wallet.

pub mod config;
pub mod ledger;
pub mod transaction;
pub mod utils;
pub mod wallet;

#[cfg(test)]
pub(crate) mod testing;
