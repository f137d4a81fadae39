//! Configuration file and the per-invocation wallet context.
//!
//! One file can hold several named wallet sections next to the shared node settings; a command
//! runs against exactly one section.

use crate::ledger::{Seed, trytes};
use crate::wallet::WalletError;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Root of the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
	/// Node API endpoint.
	#[serde(default = "default_provider")]
	pub provider: String,
	/// Signing service endpoint.
	#[serde(default = "default_signer")]
	pub signer: String,
	#[serde(default = "default_min_weight_magnitude")]
	pub min_weight_magnitude: u32,
	#[serde(default)]
	pub replay: ReplaySettings,
	/// Named wallet sections.
	#[serde(default)]
	pub wallets: HashMap<String, WalletSection>,
}

fn default_provider() -> String {
	"http://localhost:14265".to_string()
}

fn default_signer() -> String {
	"http://localhost:14266".to_string()
}

fn default_min_weight_magnitude() -> u32 {
	14
}

/// One wallet's seed, store and index floors
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSection {
	pub seed: Seed,
	pub database_file: PathBuf,
	#[serde(default = "default_security_level")]
	pub address_security_level: u8,
	/// Lowest index considered when issuing new addresses.
	#[serde(default)]
	pub address_index_new_address_start: u64,
	/// Lowest index considered when syncing and refreshing balances.
	#[serde(default, alias = "addressIndexSeachBalancesStart")]
	pub address_index_search_balances_start: u64,
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

fn default_security_level() -> u8 {
	2
}

fn default_log_level() -> String {
	"info".to_string()
}

/// Tip-selection depths and the automatic replay loop parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReplaySettings {
	/// Seconds to wait before each automatic replay check.
	pub poll_interval_secs: u64,
	/// Upper bound on automatic replay iterations per bundle.
	pub max_iterations: u32,
	pub manual_depth: u32,
	pub automatic_depth: u32,
	pub transfer_depth: u32,
	/// Confirmation threshold passed to `getBalances`.
	pub balance_threshold: u32,
	/// Shared public nodes the automatic replay loop must not run against.
	pub restricted_providers: Vec<String>,
}

impl Default for ReplaySettings {
	fn default() -> Self {
		Self {
			poll_interval_secs: 60,
			max_iterations: 100,
			manual_depth: 14,
			automatic_depth: 20,
			transfer_depth: 5,
			balance_threshold: 100,
			restricted_providers: vec![
				"http://node.iotawallet.info:14265".to_string(),
				"http://iota.bitfinex.com:80".to_string(),
			],
		}
	}
}

/// Resolved configuration of the wallet a command runs against
#[derive(Debug, Clone)]
pub struct WalletConfig {
	pub name: String,
	pub provider: String,
	pub signer: String,
	pub min_weight_magnitude: u32,
	pub replay: ReplaySettings,
	pub wallet: WalletSection,
}

impl WalletConfig {
	/// Reads `path` and selects the wallet section called `name`.
	pub async fn load(path: impl AsRef<Path>, name: &str) -> Result<Self, WalletError> {
		let path = path.as_ref();
		let content = tokio::fs::read_to_string(path).await.map_err(|e| {
			WalletError::ConfigError(format!("cannot read {}: {}", path.display(), e))
		})?;
		let file: ConfigFile = serde_json::from_str(&content).map_err(|e| {
			WalletError::ConfigError(format!("invalid configuration {}: {}", path.display(), e))
		})?;
		debug!(
			"Loaded configuration {} with {} wallet sections",
			path.display(),
			file.wallets.len()
		);
		Self::from_file(file, name)
	}

	pub fn from_file(mut file: ConfigFile, name: &str) -> Result<Self, WalletError> {
		let wallet = file.wallets.remove(name).ok_or_else(|| {
			WalletError::ConfigError(format!("no wallet section named {:?}", name))
		})?;

		let config = Self {
			name: name.to_string(),
			provider: file.provider,
			signer: file.signer,
			min_weight_magnitude: file.min_weight_magnitude,
			replay: file.replay,
			wallet,
		};
		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<(), WalletError> {
		let seed = self.wallet.seed.expose();
		if seed.is_empty() {
			return Err(WalletError::ConfigError(
				"no seed provided for this wallet".to_string(),
			));
		}
		if seed.len() > trytes::HASH_LENGTH || !trytes::is_trytes(seed) {
			return Err(WalletError::ConfigError(format!(
				"seed must be at most {} trytes",
				trytes::HASH_LENGTH
			)));
		}
		if !(1..=3).contains(&self.wallet.address_security_level) {
			return Err(WalletError::ConfigError(format!(
				"addressSecurityLevel must be 1, 2 or 3, got {}",
				self.wallet.address_security_level
			)));
		}
		if self.min_weight_magnitude == 0 {
			return Err(WalletError::ConfigError(
				"minWeightMagnitude must be positive".to_string(),
			));
		}
		if self.wallet.database_file.as_os_str().is_empty() {
			return Err(WalletError::ConfigError(
				"databaseFile must not be empty".to_string(),
			));
		}
		Ok(())
	}

	/// The automatic replay loop polls and reattaches for a long time; shared public nodes
	/// listed in `replay.restrictedProviders` refuse it.
	pub fn ensure_automatic_replay_allowed(&self) -> Result<(), WalletError> {
		let provider = self.provider.trim_end_matches('/');
		if self
			.replay
			.restricted_providers
			.iter()
			.any(|restricted| restricted.trim_end_matches('/').eq_ignore_ascii_case(provider))
		{
			return Err(WalletError::ConfigError(format!(
				"automatic replay puts a very high load on {}, set up your own node to use it",
				self.provider
			)));
		}
		Ok(())
	}

	pub fn context(&self) -> WalletContext {
		WalletContext {
			seed: self.wallet.seed.clone(),
			security_level: self.wallet.address_security_level,
			new_address_floor: self.wallet.address_index_new_address_start,
			search_floor: self.wallet.address_index_search_balances_start,
			min_weight_magnitude: self.min_weight_magnitude,
			balance_threshold: self.replay.balance_threshold,
			transfer_depth: self.replay.transfer_depth,
		}
	}
}

/// Values every wallet operation needs, built once at startup and passed down explicitly.
#[derive(Debug, Clone)]
pub struct WalletContext {
	pub seed: Seed,
	pub security_level: u8,
	pub new_address_floor: u64,
	pub search_floor: u64,
	pub min_weight_magnitude: u32,
	pub balance_threshold: u32,
	pub transfer_depth: u32,
}

#[cfg(test)]
mod tests {
	use super::*;

	const CONFIG: &str = r#"{
		"provider": "http://node.example:14265",
		"wallets": {
			"my-wallet": {
				"seed": "MY9SEED9HERE",
				"databaseFile": "database-my-wallet.json",
				"addressIndexSeachBalancesStart": 7
			},
			"bad-level": {
				"seed": "SEED",
				"databaseFile": "bad.json",
				"addressSecurityLevel": 4
			},
			"empty-seed": {
				"seed": "",
				"databaseFile": "empty.json"
			}
		}
	}"#;

	fn file() -> ConfigFile {
		serde_json::from_str(CONFIG).unwrap()
	}

	#[test]
	fn applies_defaults() {
		let config = WalletConfig::from_file(file(), "my-wallet").unwrap();
		assert_eq!(config.provider, "http://node.example:14265");
		assert_eq!(config.min_weight_magnitude, 14);
		assert_eq!(config.replay, ReplaySettings::default());
		assert_eq!(config.wallet.address_security_level, 2);
		assert_eq!(config.wallet.address_index_new_address_start, 0);
		assert_eq!(config.wallet.address_index_search_balances_start, 7);

		let ctx = config.context();
		assert_eq!(ctx.search_floor, 7);
		assert_eq!(ctx.transfer_depth, 5);
		assert_eq!(ctx.balance_threshold, 100);
	}

	#[test]
	fn rejects_invalid_sections() {
		assert_eq!(
			WalletConfig::from_file(file(), "bad-level")
				.unwrap_err()
				.kind(),
			"config"
		);
		assert!(WalletConfig::from_file(file(), "empty-seed").is_err());
		assert!(WalletConfig::from_file(file(), "missing").is_err());
	}

	#[test]
	fn seed_is_redacted() {
		let config = WalletConfig::from_file(file(), "my-wallet").unwrap();
		let rendered = format!("{:?}", config);
		assert!(!rendered.contains("MY9SEED9HERE"));
	}

	#[test]
	fn automatic_replay_refused_on_public_nodes() {
		let mut config = WalletConfig::from_file(file(), "my-wallet").unwrap();
		assert!(config.ensure_automatic_replay_allowed().is_ok());

		config.provider = "http://iota.bitfinex.com:80/".to_string();
		assert_eq!(
			config.ensure_automatic_replay_allowed().unwrap_err().kind(),
			"config"
		);

		config.replay.restricted_providers.clear();
		assert!(config.ensure_automatic_replay_allowed().is_ok());
	}

	#[tokio::test]
	async fn loads_from_disk() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("wallet-config.json");
		tokio::fs::write(&path, CONFIG).await.unwrap();

		let config = WalletConfig::load(&path, "my-wallet").await.unwrap();
		assert_eq!(config.name, "my-wallet");
		assert!(
			WalletConfig::load(dir.path().join("absent.json"), "my-wallet")
				.await
				.is_err()
		);
	}
}
