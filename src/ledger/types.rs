//! Types for the ledger node API and the data it returns

use serde::{Deserialize, Serialize};
use std::fmt;

use super::trytes::{self, TryteError};

/// Secret seed the address pool is derived from.
///
/// The seed never appears in `Debug` output or log lines.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Seed(String);

impl Seed {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Seed(<redacted>)")
    }
}

/// A transaction as seen on the ledger.
///
/// Value is signed: negative values spend from `address`, positive values fund it and
/// zero-value transactions only attach data to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// The transaction hash.
    pub hash: String,
    /// Address the transaction spends from or deposits to.
    pub address: String,
    /// Signed value in atomic units.
    pub value: i64,
    /// Relative position inside the bundle; 0 is the tail.
    pub current_index: u64,
    /// Relative position of the last transaction in the bundle.
    pub last_index: u64,
    /// Bundle hash shared by every transaction of one transfer.
    pub bundle: String,
    /// Next transaction of the bundle (or an arbitrary tip for the head).
    pub trunk_transaction: String,
}

impl Transaction {
    pub fn is_tail(&self) -> bool {
        self.current_index == 0
    }

    pub fn is_outgoing(&self) -> bool {
        self.value < 0
    }

    pub fn is_incoming(&self) -> bool {
        self.value > 0
    }
}

/// Filter accepted by `findTransactions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionFilter {
    Addresses(Vec<String>),
    Bundles(Vec<String>),
}

/// One output of an outgoing transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub address: String,
    pub value: u64,
    pub message: String,
    pub tag: String,
}

/// An address that funds a transfer together with what is needed to sign for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Input {
    pub address: String,
    pub security: u8,
    pub key_index: u64,
    pub balance: u64,
}

/// Funding and remainder handling for `submit_transfer`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOptions {
    /// Address receiving whatever the inputs hold beyond the transfer value.
    #[serde(rename = "address", skip_serializing_if = "Option::is_none")]
    pub remainder_address: Option<String>,
    pub inputs: Vec<Input>,
}

/// Response of `getBalances`. The node reports balances as decimal strings.
#[derive(Debug, Clone, Deserialize)]
pub struct BalancesResponse {
    pub balances: Vec<String>,
}

/// Response of `findTransactions`.
#[derive(Debug, Clone, Deserialize)]
pub struct HashesResponse {
    pub hashes: Vec<String>,
}

/// Response of `getTrytes` and `attachToTangle`.
#[derive(Debug, Clone, Deserialize)]
pub struct TrytesResponse {
    pub trytes: Vec<String>,
}

/// Subset of `getNodeInfo` the client relies on.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfoResponse {
    pub latest_solid_subtangle_milestone: String,
}

/// Response of `getInclusionStates`.
#[derive(Debug, Clone, Deserialize)]
pub struct InclusionStatesResponse {
    pub states: Vec<bool>,
}

/// Response of `getTransactionsToApprove`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsToApproveResponse {
    pub trunk_transaction: String,
    pub branch_transaction: String,
}

/// Error types for ledger and signer calls
#[allow(clippy::enum_variant_names)]
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Node error: {0}")]
    NodeError(String),

    #[error("Invalid node response: {0}")]
    InvalidResponse(String),

    #[error("Tryte codec error: {0}")]
    CodecError(#[from] TryteError),

    #[error("Signer error: {0}")]
    SignerError(String),
}

impl LedgerError {
    pub(crate) fn invalid_address(address: &str) -> Self {
        LedgerError::InvalidResponse(format!(
            "derived address {:?} is not a valid address",
            address
        ))
    }
}

/// Checks that a derived address has the expected shape.
pub(crate) fn ensure_address(address: String) -> Result<String, LedgerError> {
    if trytes::is_address(&address) {
        Ok(address)
    } else {
        Err(LedgerError::invalid_address(&address))
    }
}
