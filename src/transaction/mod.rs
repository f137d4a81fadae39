/// Transfer validation and submission
pub mod builder;
/// Bundle confirmation state and bundle listing
pub mod confirmation;
/// Replay of unconfirmed bundles
pub mod replay;

pub use builder::{TransferBuilder, TransferReceipt, TransferSubmitter};
pub use confirmation::{BundleStatus, BundleSummary, ConfirmationChecker, ConfirmationState};
pub use replay::{AutomaticReplayOutcome, BundleReplayState, ReplayEngine, ReplayReport};
