//! Wallet layer CLI
//!
//! Offline helpers (coin selection, BIP49 derivation) plus live fee quotes.

use bitcoin::bip32::Xpub;
use bitcoin::secp256k1::Secp256k1;
use chainsfr_wallets::account::AddressEntry;
use chainsfr_wallets::chain::{AlloyEvmClient, BitcoinClient, EvmClient, HttpBitcoinClient};
use chainsfr_wallets::tx::{btc, collect_utxos, TxFee};
use chainsfr_wallets::{Config, Error, Result, RpcConfig, WalletContext, WalletFactory};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "walletctl")]
#[command(about = "Inspect and exercise the multi-wallet transaction layer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file (JSON); environment variables otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show current configuration
    Config,

    /// List the registered wallet types
    Types,

    /// Fetch current gas price and Bitcoin fee rate
    Fees,

    /// Run coin selection over an address pool
    Select {
        /// JSON file holding the account's `addresses` array
        #[arg(short, long)]
        pool: PathBuf,

        /// Amount to send, in satoshi
        #[arg(long)]
        value: u64,

        /// Fee rate in sat/byte
        #[arg(long)]
        fee_rate: u64,
    },

    /// Derive a BIP49 address from an account xpub
    Derive {
        #[arg(long)]
        xpub: String,

        /// Full key path, e.g. 49'/1'/0'/0/3
        #[arg(long)]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    match cli.command {
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Types => {
            let factory = WalletFactory::new(WalletContext::new(config));
            for wallet_type in factory.supported_types() {
                println!("{}", wallet_type);
            }
        }
        Commands::Fees => run_fees(&config).await?,
        Commands::Select {
            pool,
            value,
            fee_rate,
        } => run_select(pool, value, fee_rate)?,
        Commands::Derive { xpub, path } => run_derive(&config, &xpub, &path)?,
    }

    Ok(())
}

async fn run_fees(config: &Config) -> Result<()> {
    let rpc = RpcConfig::from_env(config.ethereum_network, config.bitcoin_network);
    tracing::info!(eth_rpc = %rpc.eth_rpc_url, btc_api = %rpc.btc_api_url, "Fetching fees");

    let evm = AlloyEvmClient::from_rpc_config(&rpc)?;
    let chain_id = evm.chain_id().await?;
    let gas_price = evm.gas_price().await?;
    let transfer = TxFee::evm(gas_price, chainsfr_wallets::tx::ETH_TRANSFER_GAS);

    let bitcoin = HttpBitcoinClient::from_rpc_config(&rpc);
    let fee_rate = bitcoin.fee_rate().await?;

    println!("Ethereum (chain {})", chain_id);
    println!("  gas price:      {} wei", gas_price);
    println!("  transfer cost:  {} ETH", transfer.cost_in_standard_unit);
    println!("Bitcoin ({})", config.bitcoin_network.name());
    println!("  fastest fee:    {} sat/byte", fee_rate);

    Ok(())
}

fn run_select(pool: PathBuf, value: u64, fee_rate: u64) -> Result<()> {
    let content = std::fs::read_to_string(&pool).map_err(|e| Error::Config(e.to_string()))?;
    let addresses: Vec<AddressEntry> = serde_json::from_str(&content)?;

    let selection = collect_utxos(&addresses, value, fee_rate)?;
    tracing::info!(
        inputs = selection.utxos_collected.len(),
        fee = selection.fee_paid(value),
        change = selection.change(value),
        "Selected inputs"
    );
    println!("{}", serde_json::to_string_pretty(&selection)?);
    Ok(())
}

fn run_derive(config: &Config, xpub: &str, path: &str) -> Result<()> {
    let xpub = Xpub::from_str(xpub)
        .map_err(|e| Error::InvalidArgument(format!("Invalid xpub: {}", e)))?;
    let secp = Secp256k1::verification_only();
    let address = btc::derive_address(&secp, &xpub, path, config.bitcoin_network.network())?;
    println!("{}", address);
    Ok(())
}
