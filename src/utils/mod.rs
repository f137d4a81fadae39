//!
//! Utility module for the wallet.
//!
//! Amount formatting and deferred interrupt handling shared across the codebase.
/// Utility functions for formatting and display
pub mod index;
/// Ctrl+C deferral and critical sections
pub mod shutdown;

pub use index::format_iota_amount;
pub use shutdown::{CriticalSection, ShutdownSignal};
