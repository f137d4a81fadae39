//!
//! Seed cryptography delegated to a remote signing service.
//!
//! Address derivation, bundle finalisation/signing and transaction hashing are not done in
//! this crate. `SeedCrypto` is the seam; `RemoteSigner` forwards the work over HTTP to a
//! signing service running next to the wallet.

use async_trait::async_trait;
use backoff::{ExponentialBackoff, future::retry};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use super::types::{LedgerError, Seed, Transfer, TransferOptions, ensure_address};

/// Cryptographic operations bound to the wallet seed.
#[async_trait]
pub trait SeedCrypto: Send + Sync {
    /// Derives the address at `index` for the given security level.
    async fn derive_address(
        &self,
        seed: &Seed,
        index: u64,
        security_level: u8,
    ) -> Result<String, LedgerError>;

    /// Builds and signs the bundle for `transfers`, returning its raw transaction trytes
    /// in attachment order (last transaction first).
    async fn prepare_transfers(
        &self,
        seed: &Seed,
        transfers: &[Transfer],
        options: &TransferOptions,
    ) -> Result<Vec<String>, LedgerError>;

    /// Hash of one raw transaction (after proof-of-work has been attached).
    async fn transaction_hash(&self, trytes: &str) -> Result<String, LedgerError>;
}

#[derive(Debug, Deserialize)]
struct AddressReply {
    address: String,
}

#[derive(Debug, Deserialize)]
struct TrytesReply {
    trytes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct HashReply {
    hash: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrepareTransfersRequest<'a> {
    seed: &'a Seed,
    transfers: &'a [Transfer],
    #[serde(flatten)]
    options: &'a TransferOptions,
}

/// Remote signing service client
pub struct RemoteSigner {
    url: reqwest::Url,
    client: reqwest::Client,
    max_elapsed: Duration,
}

impl RemoteSigner {
    /// Creates a new signer client for the service at `url`.
    pub fn new(url: &str) -> Result<Self, LedgerError> {
        let url = reqwest::Url::parse(url)
            .map_err(|e| LedgerError::SignerError(format!("invalid signer URL {}: {}", url, e)))?;
        let client = reqwest::ClientBuilder::new()
            .pool_idle_timeout(None)
            .build()?;
        Ok(Self {
            url,
            client,
            max_elapsed: Duration::from_secs(60),
        })
    }

    /// Posts `body` to `endpoint`, retrying transport failures and server errors.
    async fn post<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> Result<T, LedgerError> {
        let url = self
            .url
            .join(endpoint)
            .map_err(|e| LedgerError::SignerError(format!("invalid endpoint {}: {}", endpoint, e)))?;

        let policy = ExponentialBackoff {
            max_elapsed_time: Some(self.max_elapsed),
            ..ExponentialBackoff::default()
        };

        let bytes = retry(policy, || async {
            let resp = self
                .client
                .post(url.clone())
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    warn!("Signer send error on {}: {}", endpoint, e);
                    backoff::Error::transient(LedgerError::HttpError(e))
                })?;

            let status = resp.status();
            let bytes = resp.bytes().await.map_err(|e| {
                warn!("Signer body error on {}: {}", endpoint, e);
                backoff::Error::transient(LedgerError::HttpError(e))
            })?;

            if status.is_server_error() {
                warn!("Signer responded {} on {}", status, endpoint);
                return Err(backoff::Error::transient(LedgerError::SignerError(format!(
                    "{} responded {}",
                    endpoint, status
                ))));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(LedgerError::SignerError(format!(
                    "{} responded {}: {}",
                    endpoint,
                    status,
                    String::from_utf8_lossy(&bytes)
                ))));
            }

            Ok(bytes)
        })
        .await?;

        debug!("Signer {} returned {} bytes", endpoint, bytes.len());
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl SeedCrypto for RemoteSigner {
    async fn derive_address(
        &self,
        seed: &Seed,
        index: u64,
        security_level: u8,
    ) -> Result<String, LedgerError> {
        let reply: AddressReply = self
            .post(
                "derive-address",
                json!({
                    "seed": seed.expose(),
                    "index": index,
                    "security": security_level,
                    "checksum": true,
                }),
            )
            .await?;
        ensure_address(reply.address)
    }

    async fn prepare_transfers(
        &self,
        seed: &Seed,
        transfers: &[Transfer],
        options: &TransferOptions,
    ) -> Result<Vec<String>, LedgerError> {
        let body = serde_json::to_value(PrepareTransfersRequest {
            seed,
            transfers,
            options,
        })?;
        let reply: TrytesReply = self.post("prepare-transfers", body).await?;
        if reply.trytes.is_empty() {
            return Err(LedgerError::SignerError(
                "signer returned an empty bundle".to_string(),
            ));
        }
        Ok(reply.trytes)
    }

    async fn transaction_hash(&self, trytes: &str) -> Result<String, LedgerError> {
        let reply: HashReply = self
            .post("transaction-hash", json!({ "trytes": trytes }))
            .await?;
        Ok(reply.hash)
    }
}
