/// Address issuance and store queries
pub mod addresses;
/// Input selection for outgoing transfers
pub mod funding;
/// Wallet facade used by the command binary
pub mod service;
/// Address status transitions
pub mod status;
/// Ledger synchronization of the address store
pub mod sync;
pub mod types;

pub use service::WalletService;
pub use types::*;
