//! lovelace — build, sign and submit ledger transactions from the command line.
//!
//! Configuration comes from the environment (see [`config`]); UTXOs and
//! parameters come from Blockfrost, or from a JSON snapshot for offline use.

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use lovelace_client::{cancellation, BlockfrostClient, SnapshotLedger, SubmitClient, SubmitError};
use lovelace_core::address::{Address, Network};
use lovelace_core::constants::LOVELACE_PER_ADA;
use lovelace_core::traits::LedgerQuery;
use lovelace_core::types::Transaction;
use lovelace_wallet::wallet::DEFAULT_TTL_OFFSET;
use lovelace_wallet::{AccountKey, PaymentRequest, Wallet};

use crate::config::CliConfig;

/// Build, sign and submit ledger transactions.
#[derive(Parser)]
#[command(name = "lovelace")]
#[command(version, about)]
struct Cli {
    /// Log filter (overrides RUST_LOG), e.g. `debug` or `lovelace_wallet=debug`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the addresses of an account.
    Address(AddressArgs),
    /// Build and sign a payment, optionally submitting it.
    Send(SendArgs),
    /// Submit a signed transaction file.
    Submit(FileArgs),
    /// Decode and summarize a signed transaction file.
    Inspect(FileArgs),
}

#[derive(Args)]
struct AddressArgs {
    /// Account number (hardened step of m/1852'/1815'/account').
    #[arg(long, default_value_t = 0)]
    account: u32,

    /// Payment key index.
    #[arg(long, default_value_t = 0)]
    index: u32,
}

#[derive(Args)]
struct SendArgs {
    /// Recipient address (bech32).
    #[arg(short, long)]
    to: String,

    /// Amount in lovelace.
    #[arg(short, long)]
    amount: u64,

    /// Transaction message.
    #[arg(short, long)]
    message: Option<String>,

    /// Slots between the current tip and the TTL.
    #[arg(long, default_value_t = DEFAULT_TTL_OFFSET)]
    ttl_offset: u64,

    /// Spend from the base address instead of the enterprise address.
    #[arg(long)]
    base: bool,

    #[arg(long, default_value_t = 0)]
    account: u32,

    #[arg(long, default_value_t = 0)]
    index: u32,

    /// Read parameters, tip and UTXOs from a JSON snapshot instead of Blockfrost.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Write the signed transaction (CBOR hex) here.
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Submit after building.
    #[arg(long)]
    submit: bool,
}

#[derive(Args)]
struct FileArgs {
    /// Signed transaction, raw CBOR or hex text.
    #[arg(short, long)]
    file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(level) => tracing_subscriber::EnvFilter::try_new(level).context("Invalid --log-level")?,
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = CliConfig::from_env()?;
    match cli.command {
        Commands::Address(args) => show_addresses(&config, args),
        Commands::Send(args) => send(&config, args).await,
        Commands::Submit(args) => submit_file(&config, &args.file).await,
        Commands::Inspect(args) => inspect(&args.file),
    }
}

fn show_addresses(config: &CliConfig, args: AddressArgs) -> Result<()> {
    let root = config.root_key()?;
    let account = AccountKey::from_root(&root, args.account).context("Failed to derive account")?;
    let network = config.network();

    println!("Network:    {}", network_name(network));
    println!("Path:       m/1852'/1815'/{}'/0/{}", args.account, args.index);
    println!("Base:       {}", account.base_address(network, args.index)?);
    println!("Enterprise: {}", account.enterprise_address(network, args.index)?);
    println!("Reward:     {}", account.reward_address(network)?);
    Ok(())
}

async fn send(config: &CliConfig, args: SendArgs) -> Result<()> {
    let network = config.network();
    let to: Address = args.to.parse().context("Invalid recipient address")?;
    if to.network() != network {
        bail!(
            "Recipient is a {} address but LOVELACE_NETWORK selects {}",
            network_name(to.network()),
            network_name(network)
        );
    }

    let ledger: Arc<dyn LedgerQuery> = match &args.snapshot {
        Some(path) => Arc::new(
            SnapshotLedger::load(path).with_context(|| format!("Failed to load snapshot {}", path.display()))?,
        ),
        None => Arc::new(BlockfrostClient::new(config.blockfrost()?)?),
    };

    let root = config.root_key()?;
    let wallet = Wallet::from_root(&root, args.account, network, ledger.clone())?.with_address_index(args.index);

    let mut request = PaymentRequest::new(to, args.amount).with_ttl_offset(args.ttl_offset);
    if let Some(message) = args.message {
        request = request.with_message(message);
    }
    if args.base {
        request = request.from_base_address();
    }

    let payment = wallet.pay(&request).await.context("Failed to build payment")?;
    let tx = &payment.transaction;
    let bytes = tx.to_bytes()?;

    println!("Transaction: {}", tx.id()?);
    println!("From:        {}", payment.sender);
    println!("To:          {} ({})", to, format_ada(args.amount));
    println!("Input:       {} ({})", payment.selection.selected.input, format_ada(payment.selection.selected.amount));
    println!("Fee:         {} (size {} bytes)", format_ada(payment.fee_report.fee), bytes.len());
    match payment.fee_report.change {
        Some(change) => println!("Change:      {}", format_ada(change)),
        None => println!("Change:      none ({} absorbed into fee)", format_ada(payment.fee_report.absorbed)),
    }

    if let Some(out) = &args.out {
        std::fs::write(out, format!("{}\n", hex::encode(&bytes)))
            .with_context(|| format!("Failed to write {}", out.display()))?;
        println!("Written to:  {}", out.display());
    }

    if args.submit {
        submit_transaction(config, tx).await?;
    }
    Ok(())
}

async fn submit_file(config: &CliConfig, path: &Path) -> Result<()> {
    let bytes = read_tx_file(path)?;
    let tx = Transaction::from_bytes(&bytes).context("File does not contain a signed transaction")?;
    submit_transaction(config, &tx).await
}

async fn submit_transaction(config: &CliConfig, tx: &Transaction) -> Result<()> {
    let client = SubmitClient::new(config.submit())?;
    let (handle, cancel) = cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    match client.submit(tx, &cancel).await {
        Ok(tx_hash) => {
            info!(%tx_hash, "submitted");
            println!("Submitted:   {tx_hash}");
            Ok(())
        }
        Err(SubmitError::UnknownOutcome { tx_hash, reason }) => {
            eprintln!("Submission outcome unknown for {tx_hash}: {reason}");
            eprintln!("Check the chain for this id before submitting again.");
            bail!("submission outcome unknown")
        }
        Err(e) => Err(e).context("Submission failed"),
    }
}

fn inspect(path: &Path) -> Result<()> {
    let bytes = read_tx_file(path)?;
    let tx = Transaction::from_bytes(&bytes).context("File does not contain a signed transaction")?;
    let body = &tx.body;

    println!("Transaction: {}", tx.id()?);
    println!("Size:        {} bytes", bytes.len());
    println!("Inputs:");
    for input in &body.inputs {
        println!("  {input}");
    }
    println!("Outputs:");
    for output in &body.outputs {
        println!("  {} {}", output.address, format_ada(output.amount));
    }
    let outputs = body.total_output()?;
    println!("Fee:         {}", format_ada(body.fee));
    println!("Spends:      {} (outputs + fee)", format_ada(outputs.saturating_add(body.fee)));
    match body.ttl {
        Some(ttl) => println!("TTL:         slot {ttl}"),
        None => println!("TTL:         none"),
    }
    if let Some(aux) = &tx.auxiliary_data {
        println!("Message:     {}", aux.message.concat());
    }
    let witnesses = match tx.verify_witnesses() {
        Ok(()) => "valid",
        Err(_) => "INVALID",
    };
    println!("Witnesses:   {} ({witnesses})", tx.witness_set.len());
    Ok(())
}

/// Raw CBOR, or CBOR hex text as written by `send --out`.
fn read_tx_file(path: &Path) -> Result<Vec<u8>> {
    let raw = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if let Ok(text) = std::str::from_utf8(&raw) {
        if let Ok(decoded) = hex::decode(text.trim()) {
            return Ok(decoded);
        }
    }
    Ok(raw)
}

fn format_ada(lovelace: u64) -> String {
    format!("{}.{:06} ADA", lovelace / LOVELACE_PER_ADA, lovelace % LOVELACE_PER_ADA)
}

fn network_name(network: Network) -> &'static str {
    match network {
        Network::Mainnet => "mainnet",
        Network::Testnet => "testnet",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_ada_pads_fraction() {
        assert_eq!(format_ada(1_000_000), "1.000000 ADA");
        assert_eq!(format_ada(9_997_281_236), "9997.281236 ADA");
        assert_eq!(format_ada(42), "0.000042 ADA");
    }

    #[test]
    fn read_tx_file_accepts_hex_and_raw() {
        let dir = tempfile::tempdir().unwrap();
        let hex_path = dir.path().join("tx.hex");
        let raw_path = dir.path().join("tx.cbor");
        std::fs::write(&hex_path, "84a0a0f5f6\n").unwrap();
        std::fs::write(&raw_path, [0x84, 0xa0, 0xa0, 0xf5, 0xf6]).unwrap();
        assert_eq!(read_tx_file(&hex_path).unwrap(), vec![0x84, 0xa0, 0xa0, 0xf5, 0xf6]);
        assert_eq!(read_tx_file(&raw_path).unwrap(), vec![0x84, 0xa0, 0xa0, 0xf5, 0xf6]);
    }

    #[test]
    fn cli_parses_send() {
        let cli = Cli::try_parse_from([
            "lovelace",
            "send",
            "--to",
            "addr_test1vpe3gtplyv5ygjnwnddyv0yc640hupqgkr2528xzf5nms7qalkkln",
            "--amount",
            "1000000",
            "--snapshot",
            "ledger.json",
            "--submit",
        ])
        .unwrap();
        match cli.command {
            Commands::Send(args) => {
                assert_eq!(args.amount, 1_000_000);
                assert_eq!(args.ttl_offset, 300);
                assert!(args.submit);
                assert!(!args.base);
            }
            _ => panic!("expected send"),
        }
    }
}
