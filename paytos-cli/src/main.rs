//! Paytos CLI
//!
//! Command-line interface for Paytos stealth payments on Aptos.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use dialoguer::Password;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::watch;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use paytos_aptos::{AptosConfig, AptosEventSource, MAINNET_INDEXER_URL};
use paytos_core::constants::{
    DEFAULT_EVENT_TYPE, DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE, DEFAULT_POLL_INTERVAL_SECS,
};
use paytos_core::traits::MetaAddressStore;
use paytos_core::types::{AptosAddress, Direction, MetaAddress, SecretKeyBytes};
use paytos_core::PaytosError;
use paytos_crypto::{parse_public_key_hex, AesGcmCustody, SecretScalar};
use paytos_registry::FileStore;
use paytos_scanner::{EventScanner, ScannerConfig, TickReport};
use paytos_stealth::{open_scan_key, AddressDeriver, BalanceAggregator, StealthWallet};

/// Paytos - Stealth payments on Aptos
#[derive(Parser)]
#[command(name = "paytos")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Store file
    #[arg(long, global = true, env = "PAYTOS_STORE", default_value = "paytos-store.payt")]
    store: PathBuf,

    #[command(flatten)]
    custody: CustodyArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CustodyArgs {
    /// Passphrase protecting scan keys (prompted when absent)
    #[arg(long, global = true, env = "PAYTOS_CUSTODY_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,

    /// Salt for the passphrase (at least 8 bytes)
    #[arg(long, global = true, env = "PAYTOS_CUSTODY_SALT", hide_env_values = true)]
    salt: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a meta-address and register it for scanning
    Keygen {
        /// Owner the meta-address belongs to
        owner: String,
        /// Print the keys without registering them
        #[arg(long)]
        no_register: bool,
    },

    /// Derive a one-time stealth address for a meta-address
    Derive {
        /// Recipient meta-address (st:aptos:0x...)
        meta_address: String,
        /// Fixed ephemeral secret (hex) instead of a random one
        #[arg(long)]
        ephemeral_secret: Option<String>,
    },

    /// Recover the stealth address and private key behind an ephemeral key
    Recover {
        /// Published ephemeral public key (hex, any encoding)
        ephemeral_key: String,
        /// Registered meta-address id
        #[arg(long)]
        meta_id: Uuid,
        /// Spend secret (hex, prompted when absent)
        #[arg(long, env = "PAYTOS_SPEND_SECRET", hide_env_values = true)]
        spend_secret: Option<String>,
    },

    /// Scan transfer events and record payments
    Scan {
        /// Run a single tick and exit
        #[arg(long)]
        once: bool,
        #[command(flatten)]
        source: SourceArgs,
        /// Seconds between ticks
        #[arg(long, env = "PAYTOS_SCAN_INTERVAL_SECS", default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
        interval_secs: u64,
        /// Match meta-addresses concurrently
        #[arg(long)]
        parallel: bool,
        /// Ignore published view tags
        #[arg(long)]
        no_view_tags: bool,
    },

    /// Show net balances of a stealth address
    Balance {
        /// Stealth address
        address: String,
    },

    /// Show an owner's transactions, newest first
    History {
        /// Owner id
        owner: String,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage registered meta-addresses
    Meta {
        #[command(subcommand)]
        command: MetaCommands,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// Aptos indexer GraphQL endpoint
    #[arg(long, env = "PAYTOS_INDEXER_URL", default_value = MAINNET_INDEXER_URL)]
    indexer_url: String,
    /// Indexer API key
    #[arg(long, env = "PAYTOS_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    /// Transfer event type
    #[arg(long, env = "PAYTOS_EVENT_TYPE", default_value = DEFAULT_EVENT_TYPE)]
    event_type: String,
    /// Events per indexer page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,
    /// Indexer pages read per tick
    #[arg(long, default_value_t = DEFAULT_MAX_PAGES)]
    max_pages: usize,
}

#[derive(Subcommand)]
enum MetaCommands {
    /// List an owner's meta-addresses, newest first
    List {
        /// Owner id
        owner: String,
    },
    /// Delete one of an owner's meta-addresses
    Delete {
        /// Owner id
        owner: String,
        /// Meta-address id
        meta_id: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);
    tracing::debug!(store = %cli.store.display(), "Paytos CLI starting");

    match cli.command {
        Commands::Keygen { ref owner, no_register } => cmd_keygen(&cli, owner, no_register).await,
        Commands::Derive {
            ref meta_address,
            ref ephemeral_secret,
        } => cmd_derive(meta_address, ephemeral_secret.as_deref()),
        Commands::Recover {
            ref ephemeral_key,
            meta_id,
            ref spend_secret,
        } => cmd_recover(&cli, ephemeral_key, meta_id, spend_secret.clone()).await,
        Commands::Scan {
            once,
            ref source,
            interval_secs,
            parallel,
            no_view_tags,
        } => {
            let mut config = ScannerConfig::new()
                .interval(Duration::from_secs(interval_secs.max(1)))
                .event_type(source.event_type.clone());
            if parallel {
                config = config.parallel_matching();
            }
            if no_view_tags {
                config = config.without_view_tags();
            }
            cmd_scan(&cli, source, config, once).await
        }
        Commands::Balance { ref address } => cmd_balance(&cli.store, address).await,
        Commands::History { ref owner, json } => cmd_history(&cli.store, owner, json).await,
        Commands::Meta { ref command } => match command {
            MetaCommands::List { owner } => cmd_meta_list(&cli.store, owner).await,
            MetaCommands::Delete { owner, meta_id } => cmd_meta_delete(&cli.store, owner, *meta_id).await,
        },
    }
}

fn init_logging(verbose: bool, json: bool) {
    let default = if verbose { "paytos=debug,info" } else { "paytos=info,warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

async fn open_store(path: &Path) -> Result<Arc<FileStore>> {
    let store = FileStore::open(path)
        .await
        .with_context(|| format!("Failed to open store {}", path.display()))?;
    Ok(Arc::new(store))
}

fn open_custody(args: &CustodyArgs) -> Result<AesGcmCustody> {
    let salt = args
        .salt
        .as_deref()
        .context("Custody salt missing: set PAYTOS_CUSTODY_SALT or pass --salt")?;
    let passphrase = match &args.passphrase {
        Some(passphrase) => passphrase.clone(),
        None => Password::new()
            .with_prompt("Custody passphrase")
            .interact()
            .context("Failed to read passphrase")?,
    };

    AesGcmCustody::from_passphrase(&passphrase, salt.as_bytes()).context("Failed to derive custody key")
}

fn parse_secret(hex: &str) -> Result<SecretScalar> {
    let bytes = SecretKeyBytes::from_hex(hex).context("Secret must be 32 bytes of hex")?;
    Ok(SecretScalar::from_bytes(bytes.as_bytes())?)
}

/// Generate and register a meta-address
async fn cmd_keygen(cli: &Cli, owner: &str, no_register: bool) -> Result<()> {
    println!("{}", "🔑 Generating stealth keys...".cyan().bold());
    let wallet = StealthWallet::generate()?;

    if no_register {
        let keys = serde_json::json!({
            "meta_address": wallet.meta_address().encode(),
            "scan_secret": wallet.scan_secret().to_hex(),
            "spend_secret": wallet.spend_secret().to_hex(),
        });
        println!("{}", serde_json::to_string_pretty(&keys)?);
    } else {
        let custody = open_custody(&cli.custody)?;
        let store = open_store(&cli.store).await?;
        let record = wallet
            .register(owner, &custody, store.as_ref())
            .await
            .context("Failed to register meta-address")?;

        println!("\n{}", "✅ Meta-address registered:".green().bold());
        println!("   {} {}", "Owner:".dimmed(), owner);
        println!("   {} {}", "Id:".dimmed(), record.meta_id);
        println!("   {} {}", "Meta-address:".yellow(), wallet.meta_address().encode());
        println!("\n   {} {}", "Spend secret:".red().bold(), wallet.spend_secret().to_hex());
    }

    println!("\n{}", "⚠️  IMPORTANT: The spend secret is shown once and never stored.".red().bold());
    println!("   Anyone holding it controls every payment to this meta-address.");
    Ok(())
}

/// Derive a one-time stealth address
fn cmd_derive(meta_address: &str, ephemeral_secret: Option<&str>) -> Result<()> {
    let meta = MetaAddress::parse(meta_address).context("Invalid meta-address")?;
    let deriver = AddressDeriver::new();

    let payment = match ephemeral_secret {
        Some(hex) => deriver.derive_with_ephemeral(&meta, &parse_secret(hex)?)?,
        None => deriver.derive(&meta)?,
    };

    println!("{}", "💸 Stealth payment derived:".green().bold());
    println!("   {} {}", "Address:".yellow(), payment.stealth_address);
    println!("   {} {}", "View tag:".dimmed(), payment.view_tag);
    println!("   {} {}", "Ephemeral key:".dimmed(), payment.ephemeral_public_key);

    println!("\n{}", "📋 Announcement (JSON):".yellow().bold());
    println!("{}", serde_json::to_string_pretty(&payment.announcement())?);

    println!("\n{}", "ℹ️  Next steps:".cyan());
    println!("   1. Send funds to the stealth address above");
    println!("   2. Publish the ephemeral key with the transfer");
    Ok(())
}

/// Recover a stealth address and its private key
async fn cmd_recover(cli: &Cli, ephemeral_key: &str, meta_id: Uuid, spend_secret: Option<String>) -> Result<()> {
    let ephemeral = parse_public_key_hex(ephemeral_key).context("Invalid ephemeral key")?;

    let store = open_store(&cli.store).await?;
    let record = store
        .get_meta_address(meta_id)
        .await?
        .with_context(|| format!("No meta-address {}", meta_id))?;

    let custody = open_custody(&cli.custody)?;
    let scan = open_scan_key(&record, &custody)
        .await
        .context("Failed to open scan key")?;

    let spend_hex = match spend_secret {
        Some(hex) => hex,
        None => Password::new()
            .with_prompt("Spend secret (hex)")
            .interact()
            .context("Failed to read spend secret")?,
    };
    let wallet = StealthWallet::from_scalars(scan, parse_secret(&spend_hex)?)?;
    ensure!(
        *wallet.meta_address() == record.meta_address(),
        "Spend secret does not belong to meta-address {}",
        meta_id
    );

    let found = wallet.recover(&ephemeral)?;
    let private_key = wallet.stealth_private_key(&ephemeral)?;

    println!("{}", "🔓 Stealth address recovered:".green().bold());
    println!("   {} {}", "Address:".yellow(), found.address);
    println!("   {} {}", "View tag:".dimmed(), found.view_tag);
    println!("   {} {}", "Public key:".dimmed(), found.stealth_public_key);
    println!("\n   {} {}", "Private key:".red().bold(), private_key.to_hex());
    Ok(())
}

/// Scan transfer events
async fn cmd_scan(cli: &Cli, source: &SourceArgs, config: ScannerConfig, once: bool) -> Result<()> {
    let mut aptos = AptosConfig::new(source.indexer_url.clone())
        .with_page_size(source.page_size)
        .with_max_pages(source.max_pages);
    if let Some(key) = &source.api_key {
        aptos = aptos.with_api_key(key.clone());
    }
    let events = Arc::new(AptosEventSource::new(aptos)?);
    let custody = Arc::new(open_custody(&cli.custody)?);
    let store = open_store(&cli.store).await?;

    let scanner = EventScanner::new(events, custody, store.clone(), config);

    if once {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
        spinner.set_message("Scanning transfer events...");
        spinner.enable_steady_tick(Duration::from_millis(100));

        let result = scanner.scan_once().await;
        spinner.finish_and_clear();
        let report = result.context("Scan failed")?;
        print_report(&report);
        return Ok(());
    }

    println!("{}", "🔎 Scanning for payments...".cyan().bold());
    println!("   {} {}", "Event type:".dimmed(), scanner.config().event_type);
    println!("   {} {:?}", "Interval:".dimmed(), scanner.config().interval);
    println!("\n   Press Ctrl+C to stop.\n");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    scanner.run(shutdown_rx).await?;
    store.flush().await?;

    let stats = scanner.stats();
    println!("\n{}", "📈 Session:".green().bold());
    println!("   Events seen: {}", stats.events_seen);
    println!("   Payments recorded: {}", stats.matches);
    println!("   View tag filter efficiency: {:.1}%", stats.filter_efficiency());
    Ok(())
}

fn print_report(report: &TickReport) {
    let stats = &report.stats;
    if report.recorded.is_empty() {
        println!("{} ({} events checked)", "No new payments.".yellow(), stats.events_seen);
    } else {
        println!("{} {} payment(s) recorded:", "✅".green(), report.recorded.len());
        for tx in &report.recorded {
            println!(
                "   {} {} {} {} → {}",
                tx.owner_id.bold(),
                tx.amount,
                tx.asset_type,
                tx.token_address.as_deref().unwrap_or("-"),
                tx.stealth_address
            );
        }
    }
    if let Some(cursor) = report.next_cursor {
        println!("   {} {}", "Cursor:".dimmed(), cursor);
    }
    if stats.per_key_failures > 0 || stats.malformed_events > 0 {
        println!(
            "   {} {} key failures, {} malformed events",
            "⚠️".yellow(),
            stats.per_key_failures,
            stats.malformed_events
        );
    }
}

/// Show balances of a stealth address
async fn cmd_balance(store_path: &Path, address: &str) -> Result<()> {
    let address = AptosAddress::parse(address).context("Invalid address")?;
    let store = open_store(store_path).await?;

    let rows = BalanceAggregator::new(store).balances_for_address(&address).await?;
    if rows.is_empty() {
        println!("{}", "No holdings.".yellow());
        return Ok(());
    }

    println!("{} {}", "💰 Balances of".cyan().bold(), address);
    for row in rows {
        println!(
            "   {:<5} {:<40} {}",
            row.asset_type,
            row.token_address.as_deref().unwrap_or("-"),
            row.balance
        );
    }
    Ok(())
}

/// Show an owner's history
async fn cmd_history(store_path: &Path, owner: &str, json: bool) -> Result<()> {
    let store = open_store(store_path).await?;
    let history = BalanceAggregator::new(store).history(owner).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }
    if history.is_empty() {
        println!("{}", "No transactions.".yellow());
        return Ok(());
    }

    for tx in history {
        let direction = match tx.direction {
            Direction::In => "IN ".green(),
            Direction::Out => "OUT".red(),
        };
        println!(
            "{} {} {} {} {} ({})",
            direction,
            tx.amount,
            tx.asset_type,
            tx.stealth_address,
            tx.token_address.as_deref().unwrap_or("-"),
            tx.event
        );
    }
    Ok(())
}

/// List meta-addresses
async fn cmd_meta_list(store_path: &Path, owner: &str) -> Result<()> {
    let store = open_store(store_path).await?;
    let records = store.meta_addresses_for_owner(owner).await?;

    if records.is_empty() {
        println!("{}", "No meta-addresses.".yellow());
        return Ok(());
    }
    for record in records {
        println!("{} {}", record.meta_id.to_string().bold(), record.created_at.to_rfc3339());
        println!("   {}", record.meta_address().encode());
    }
    Ok(())
}

/// Delete a meta-address
async fn cmd_meta_delete(store_path: &Path, owner: &str, meta_id: Uuid) -> Result<()> {
    let store = open_store(store_path).await?;
    if let Err(e) = store.delete_meta_address(owner, meta_id).await {
        if matches!(e, PaytosError::NotFound(_)) {
            bail!("{} has no meta-address {}", owner, meta_id);
        }
        return Err(e.into());
    }
    println!("{} {}", "🗑️  Deleted".green(), meta_id);
    Ok(())
}
