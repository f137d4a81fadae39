use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{error, info};

use tangle_wallet_sync::config::WalletConfig;
use tangle_wallet_sync::ledger::{HttpLedgerClient, RemoteSigner};
use tangle_wallet_sync::utils::{ShutdownSignal, format_iota_amount};
use tangle_wallet_sync::wallet::sync::{BalanceScope, FileAddressRepository, SyncMode};
use tangle_wallet_sync::wallet::{WalletError, WalletService};

const DEFAULT_CONFIG: &str = "wallet-config.json";
const DEFAULT_WALLET: &str = "my-wallet";

const USAGE: &str = "\
Usage: tangle-wallet <command> [arguments]

Environment: TANGLE_WALLET_CONFIG (default wallet-config.json), TANGLE_WALLET (default my-wallet)

Command               Arguments                  Purpose
Sync                  [end]                      Refresh addresses that may still change
SyncAll               [end]                      Rebuild the store, spent addresses included
                                                 (no end: until 10 unused addresses, 0: until a confirmed spend)
GetNewAddress                                    Issue an unused receiving address
GetAddressIndexes                                Suggest addressIndex* floors for the config file
UpdateBalances                                   Refresh balances from the search floor up
UpdateAllBalances                                Refresh every balance
ShowBalance                                      Total of the cached balances
ShowDB / ShowEntireDB                            Cached addresses (unused ones only with ShowEntireDB)
GetBundles            address                    Bundles touching an address
GetConfirmationState  bundle                     Confirmation state of a bundle
Transfer              address amount [msg] [tag] Send an amount to an address
Replay                address                    Reattach unconfirmed bundles of an address once
FullyAutomaticReplay  address                    Keep reattaching until confirmed or out of attempts";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
	let args: Vec<String> = env::args().skip(1).collect();
	let Some(command) = args.first().cloned() else {
		eprintln!("{}", USAGE);
		return ExitCode::FAILURE;
	};
	if command.eq_ignore_ascii_case("help") {
		println!("{}", USAGE);
		return ExitCode::SUCCESS;
	}

	let config_path = env::var("TANGLE_WALLET_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG.to_string());
	let wallet_name = env::var("TANGLE_WALLET").unwrap_or_else(|_| DEFAULT_WALLET.to_string());

	let config = match WalletConfig::load(&config_path, &wallet_name).await {
		Ok(config) => config,
		Err(e) => return report_error(&e),
	};

	// Initialize tracing subscriber; RUST_LOG overrides the configured level
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.wallet.log_level)),
		)
		.with_writer(std::io::stderr)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	info!("Using wallet {} on {}", config.name, config.provider);

	let allowed = match command.as_str() {
		"FullyAutomaticReplay" | "FAR" => config.ensure_automatic_replay_allowed(),
		_ => Ok(()),
	};
	if let Err(e) = allowed {
		return report_error(&e);
	}

	let service = match build_service(&config).await {
		Ok(service) => service,
		Err(e) => return report_error(&e),
	};

	match run(&service, &command, &args[1..]).await {
		Ok(output) => {
			println!("{}", with_status(output));
			ExitCode::SUCCESS
		}
		Err(e) => report_error(&e),
	}
}

async fn build_service(config: &WalletConfig) -> Result<WalletService, WalletError> {
	let signer = RemoteSigner::new(&config.signer)?;
	let ledger = HttpLedgerClient::new(config.provider.clone(), Arc::new(signer))?;
	info!("Created ledger client");

	let repository = FileAddressRepository::open(&config.wallet.database_file).await?;

	let shutdown = ShutdownSignal::new();
	shutdown.listen_for_ctrl_c();

	Ok(WalletService::new(
		config.context(),
		config.replay.clone(),
		Arc::new(ledger),
		Arc::new(repository),
		shutdown,
	))
}

async fn run(service: &WalletService, command: &str, args: &[String]) -> Result<Value, WalletError> {
	match command {
		"Sync" | "S" => to_output(service.sync(sync_mode(args)?, false).await?),
		"SyncAll" | "SA" => to_output(service.sync(sync_mode(args)?, true).await?),
		"GetNewAddress" | "GNA" => to_output(service.get_new_address().await?),
		"GetAddressIndexes" | "GAI" => to_output(service.get_address_indexes().await?),
		"UpdateBalances" | "UBS" => {
			to_output(service.update_balances(BalanceScope::FromSearchFloor).await?)
		}
		"UpdateAllBalances" | "UABS" => to_output(service.update_balances(BalanceScope::All).await?),
		"ShowBalance" | "SB" => {
			let total = service.total_balance().await?;
			Ok(json!({
				"totalBalance": total,
				"unit": "iota",
				"formatted": format_iota_amount(total),
			}))
		}
		"ShowDB" | "SDB" => Ok(json!({ "addresses": service.list_addresses(false).await? })),
		"ShowEntireDB" => Ok(json!({ "addresses": service.list_addresses(true).await? })),
		"GetBundles" | "GBS" => {
			let address = required(args, 0, "address")?;
			Ok(json!({ "bundles": service.get_bundles(address).await? }))
		}
		"GetConfirmationState" | "GCS" => {
			let bundle = required(args, 0, "bundle hash")?;
			to_output(service.get_confirmation_state(bundle).await?)
		}
		"Transfer" | "Send" => {
			let address = required(args, 0, "destination address")?;
			let amount = required(args, 1, "amount")?;
			let value = amount.parse::<u64>().map_err(|_| {
				WalletError::ValidationError(format!("{:?} is not a valid amount", amount))
			})?;
			let message = args.get(2).map(String::as_str).unwrap_or("");
			let tag = args.get(3).map(String::as_str).unwrap_or("");
			to_output(service.transfer(address, value, message, tag).await?)
		}
		"Replay" | "R" => {
			let address = required(args, 0, "address")?;
			to_output(service.replay(address).await?)
		}
		"FullyAutomaticReplay" | "FAR" => {
			let address = required(args, 0, "address")?;
			Ok(json!({ "bundles": service.fully_automatic_replay(address).await? }))
		}
		other => Err(WalletError::ValidationError(format!(
			"invalid command {}, try help",
			other
		))),
	}
}

/// No argument keeps syncing until the pool holds 10 unused addresses, `0` stops at the first
/// confirmed spend, any other number is an exclusive end index.
fn sync_mode(args: &[String]) -> Result<SyncMode, WalletError> {
	match args.first() {
		None => Ok(SyncMode::FreshPool),
		Some(end) => match end.parse::<u64>() {
			Ok(0) => Ok(SyncMode::ConfirmedSpendGated),
			Ok(end) => Ok(SyncMode::Bounded(end)),
			Err(_) => Err(WalletError::ValidationError(format!(
				"{:?} is not a valid end index",
				end
			))),
		},
	}
}

fn required<'a>(args: &'a [String], position: usize, what: &str) -> Result<&'a str, WalletError> {
	args.get(position)
		.map(String::as_str)
		.ok_or_else(|| WalletError::ValidationError(format!("please provide a {}", what)))
}

fn to_output<T: Serialize>(value: T) -> Result<Value, WalletError> {
	serde_json::to_value(value)
		.map_err(|e| WalletError::InvariantViolation(format!("unserializable result: {}", e)))
}

fn with_status(output: Value) -> Value {
	match output {
		Value::Object(mut map) => {
			map.entry("status").or_insert_with(|| json!("ok"));
			Value::Object(map)
		}
		other => json!({ "status": "ok", "result": other }),
	}
}

fn report_error(e: &WalletError) -> ExitCode {
	error!("{}", e);
	println!(
		"{}",
		json!({ "status": "error", "kind": e.kind(), "message": e.to_string() })
	);
	ExitCode::FAILURE
}
