//! Rescue: sweep a 1-of-2 multisig output with a browser wallet
//!
//! Builds the sweep, routes it to the configured wallet for one signature
//! per input, finalizes and broadcasts it.
//!
//! # Usage
//!
//! ```bash
//! rescue recover --config rescue.toml --recovery-key <hex> --multisig-address <addr>
//! rescue fees --config rescue.toml
//! rescue validate --config rescue.toml
//! rescue wallets
//! ```

mod config;
mod prompt;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bitcoin::Network;

use rescue_chain::electrum::default_server;
use rescue_chain::{ElectrumClient, EsploraClient, FeeEstimator};
use rescue_core::{FeeRate, FieldError, RecoveryForm, SweepPlan};
use rescue_flow::{RecoveryOrchestrator, RecoveryReceipt};
use rescue_signer::{create_signer, HttpRelay, ManualSigner, SignerAdapter, WalletKind};

use config::{Backend, RescueConfig, SignerChoice, MANUAL_WALLET};
use prompt::StdinPrompt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Recover,
    Fees,
    Validate,
    Wallets,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Args {
    command: Command,
    config_path: Option<PathBuf>,
    recovery_key: Option<String>,
    multisig_address: Option<String>,
    fee_rate: Option<u32>,
}

#[derive(Debug, PartialEq, Eq)]
enum Invocation {
    Help,
    Version,
    Run(Args),
}

fn main() -> Result<()> {
    // TLS for Esplora and Electrum
    rustls::crypto::ring::default_provider()
        .install_default()
        .ok();

    // Parse CLI args (minimal, no clap)
    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args = match parse_args(&raw)? {
        Invocation::Help => {
            print_help();
            return Ok(());
        }
        Invocation::Version => {
            println!("rescue {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Invocation::Run(args) => args,
    };

    if args.command == Command::Wallets {
        print_wallets();
        return Ok(());
    }

    // Load config
    let mut rescue_config = RescueConfig::load(args.config_path.as_ref()).with_context(|| {
        match &args.config_path {
            Some(path) => format!("Failed to load config from {}", path.display()),
            None => "Failed to build default config".to_string(),
        }
    })?;

    // Env, then command line
    rescue_config.apply_env_overrides();
    if let Some(rate) = args.fee_rate {
        rescue_config.fees.fee_rate = Some(rate);
    }

    rescue_config
        .validate()
        .context("Configuration validation failed")?;

    // Init logger
    std::env::set_var("RUST_LOG", &rescue_config.log_level);
    env_logger::init();
    log::debug!(
        "Network {}, backend {}, wallet {}",
        rescue_config.bitcoin.network,
        rescue_config.bitcoin.backend,
        rescue_config.signer.wallet
    );

    let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;

    match args.command {
        Command::Validate => print_summary(&rescue_config),
        Command::Fees => rt.block_on(show_fees(&rescue_config)),
        Command::Recover => rt.block_on(recover(&rescue_config, &args)),
        Command::Wallets => Ok(()),
    }
}

fn parse_args(args: &[String]) -> Result<Invocation> {
    let mut command = None;
    let mut config_path = None;
    let mut recovery_key = None;
    let mut multisig_address = None;
    let mut fee_rate = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                config_path = Some(PathBuf::from(value_of(args, &mut i)?));
            }
            "--recovery-key" | "-k" => {
                recovery_key = Some(value_of(args, &mut i)?.to_string());
            }
            "--multisig-address" | "-a" => {
                multisig_address = Some(value_of(args, &mut i)?.to_string());
            }
            "--fee-rate" | "-f" => {
                let raw = value_of(args, &mut i)?;
                let rate = raw
                    .parse::<u32>()
                    .with_context(|| format!("Invalid fee rate: {}", raw))?;
                fee_rate = Some(rate);
            }
            "--help" | "-h" | "help" => return Ok(Invocation::Help),
            "--version" | "-V" => return Ok(Invocation::Version),
            "recover" | "fees" | "validate" | "wallets" if command.is_none() => {
                command = Some(match args[i].as_str() {
                    "recover" => Command::Recover,
                    "fees" => Command::Fees,
                    "validate" => Command::Validate,
                    _ => Command::Wallets,
                });
            }
            other => anyhow::bail!("Unknown argument: {}", other),
        }
        i += 1;
    }

    let Some(command) = command else {
        return Ok(Invocation::Help);
    };

    if command == Command::Recover {
        anyhow::ensure!(recovery_key.is_some(), "recover requires --recovery-key");
        anyhow::ensure!(
            multisig_address.is_some(),
            "recover requires --multisig-address"
        );
    }

    Ok(Invocation::Run(Args {
        command,
        config_path,
        recovery_key,
        multisig_address,
        fee_rate,
    }))
}

fn value_of<'a>(args: &'a [String], i: &mut usize) -> Result<&'a str> {
    let flag = &args[*i];
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .with_context(|| format!("{} requires a value", flag))
}

// ============================================================================
// Commands
// ============================================================================

async fn recover(config: &RescueConfig, args: &Args) -> Result<()> {
    let network = config.network()?;
    let signer = build_signer(config, network)?;

    let mut orchestrator = match config.backend()? {
        Backend::Esplora => {
            RecoveryOrchestrator::new(network, Arc::new(esplora(config, network)?), signer)
        }
        Backend::Electrum => {
            RecoveryOrchestrator::new(network, Arc::new(electrum(config, network).await?), signer)
        }
    };

    let user_rate = config
        .fees
        .fee_rate
        .map(FeeRate::from_sat_per_vb)
        .transpose()?;
    let fee = orchestrator.resolve_fee_rate(user_rate).await;
    if let Some(warning) = &fee.warning {
        println!("⚠️  {}", warning);
    }

    let form = RecoveryForm {
        public_key: args.recovery_key.clone().unwrap_or_default(),
        multisig_address: args.multisig_address.clone().unwrap_or_default(),
        fee_rate: fee.rate.sat_per_vb(),
    };
    let params = form
        .parse(network)
        .map_err(|errors| anyhow::anyhow!(describe_field_errors(&errors)))?;

    let plan = orchestrator
        .preview(&params)
        .await
        .context("Could not plan the sweep")?;
    print_plan(&plan, &fee.source);

    let name = orchestrator.signer_name();
    println!("Connecting to {}…", name);
    match orchestrator.connect_signer().await {
        Ok(identity) => println!("Connected: funds go to {}", identity.address),
        Err(e) if e.is_user_rejection() => {
            println!("Connection cancelled in {}. Nothing was signed.", name);
            return Ok(());
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to connect to {}", name)),
    }

    println!("Approve the signature request in {}…", name);
    let result = orchestrator.recover(&params).await;
    orchestrator.disconnect_signer();

    match result {
        Ok(receipt) => {
            print_receipt(&receipt);
            Ok(())
        }
        Err(e) if e.is_user_rejection() => {
            println!("Signing cancelled in {}. Nothing was broadcast.", name);
            Ok(())
        }
        Err(e) => Err(e).context("Recovery failed"),
    }
}

async fn show_fees(config: &RescueConfig) -> Result<()> {
    let network = config.network()?;
    match config.backend()? {
        Backend::Esplora => print_fees(&esplora(config, network)?).await,
        Backend::Electrum => print_fees(&electrum(config, network).await?).await,
    }
}

async fn print_fees<F: FeeEstimator>(estimator: &F) -> Result<()> {
    let tiers = estimator
        .recommended_fees()
        .await
        .context("Failed to fetch fee recommendations")?;
    println!("Recommended fee rates (sat/vB):");
    println!("  Fastest:    {}", tiers.fastest_fee);
    println!("  Half hour:  {}", tiers.half_hour_fee);
    println!("  Hour:       {}  (used by default)", tiers.hour_fee);
    println!("  Economy:    {}", tiers.economy_fee);
    println!("  Minimum:    {}", tiers.minimum_fee);
    Ok(())
}

fn print_summary(config: &RescueConfig) -> Result<()> {
    let network = config.network()?;
    println!("✅ Configuration is valid.");
    println!("  Network:       {}", network);
    match config.backend()? {
        Backend::Esplora => println!(
            "  Esplora:       {}",
            config
                .bitcoin
                .esplora_url
                .as_deref()
                .or(rescue_chain::esplora::default_base_url(network))
                .unwrap_or("-")
        ),
        Backend::Electrum => println!(
            "  Electrum:      {}",
            config
                .bitcoin
                .electrum_url
                .as_deref()
                .unwrap_or(default_server(network))
        ),
    }
    match config.signer_choice()? {
        SignerChoice::Wallet(kind) => {
            println!("  Wallet:        {}", kind.label());
            println!("  Relay:         {}", config.signer.relay_url);
        }
        SignerChoice::Manual => println!("  Wallet:        manual (file exchange)"),
    }
    match config.fees.fee_rate {
        Some(rate) => println!("  Fee rate:      {} sat/vB", rate),
        None => println!("  Fee rate:      recommended"),
    }
    Ok(())
}

fn print_wallets() {
    println!("Supported wallets:");
    for kind in WalletKind::ALL {
        println!("  {:<12} {}", kind.id(), kind.label());
    }
    println!("  {:<12} PSBT file exchange", MANUAL_WALLET);
}

// ============================================================================
// Wiring
// ============================================================================

fn build_signer(config: &RescueConfig, network: Network) -> Result<Box<dyn SignerAdapter>> {
    match config.signer_choice()? {
        SignerChoice::Wallet(kind) => {
            let relay = HttpRelay::new(config.signer.relay_url.clone(), config.relay_timeout())
                .context("Failed to set up wallet relay")?;
            Ok(create_signer(kind, Arc::new(relay), network))
        }
        SignerChoice::Manual => {
            let manual = config
                .signer
                .manual
                .clone()
                .context("signer.manual is not configured")?;
            Ok(Box::new(ManualSigner::new(manual, Box::new(StdinPrompt))))
        }
    }
}

fn esplora(config: &RescueConfig, network: Network) -> Result<EsploraClient> {
    EsploraClient::new(
        network,
        config.bitcoin.esplora_url.as_deref(),
        config.http_timeout(),
    )
    .context("Failed to set up Esplora client")
}

async fn electrum(config: &RescueConfig, network: Network) -> Result<ElectrumClient> {
    let url = config
        .bitcoin
        .electrum_url
        .clone()
        .unwrap_or_else(|| default_server(network).to_string());
    ElectrumClient::connect(&url, network)
        .await
        .with_context(|| format!("Failed to connect to Electrum server {}", url))
}

// ============================================================================
// Output
// ============================================================================

fn describe_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{:?}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

fn print_plan(plan: &SweepPlan, source: &rescue_core::FeeSource) {
    println!("Sweep plan:");
    println!("  Inputs:        {}", plan.input_count);
    println!("  Total:         {}", plan.total);
    println!("  Size (est.):   {} vB", plan.estimated_vsize);
    println!("  Fee rate:      {} ({:?})", plan.fee_rate, source);
    println!("  Fee:           {}", plan.fee);
    println!("  You receive:   {}", plan.final_amount);
}

fn print_receipt(receipt: &RecoveryReceipt) {
    println!("✅ Recovery transaction broadcast.");
    println!("  Txid:          {}", receipt.txid);
    println!("  Amount:        {}", receipt.amount);
    println!("  Fee:           {}", receipt.fee);
    println!("  Destination:   {}", receipt.destination);
    println!("  Explorer:      {}", receipt.explorer_url);
}

fn print_help() {
    println!(
        r#"Rescue: recover funds from a 1-of-2 multisig with a browser wallet

USAGE:
    rescue <COMMAND> [OPTIONS]

COMMANDS:
    recover               Sweep every output of the multisig address to the wallet
    fees                  Show recommended fee rates
    validate              Validate the config file and exit
    wallets               List supported wallets

OPTIONS:
    -c, --config <PATH>             Config file path (optional)
    -k, --recovery-key <HEX>        Recovery public key (33-byte compressed, hex)
    -a, --multisig-address <ADDR>   Multisig (P2WSH) address holding the funds
    -f, --fee-rate <N>              Fee rate in sat/vB (default: recommended)
    -h, --help                      Show this help message
    -V, --version                   Show version

ENVIRONMENT VARIABLES (override config file):
    RESCUE_LOG_LEVEL      Log level (error/warn/info/debug/trace)
    RESCUE_NETWORK        Bitcoin network (bitcoin/testnet/signet/regtest)
    RESCUE_BACKEND        Chain backend (esplora/electrum)
    RESCUE_ESPLORA_URL    Esplora API base URL
    RESCUE_ELECTRUM_URL   Electrum server URL
    RESCUE_WALLET         Wallet id (see `rescue wallets`)
    RESCUE_RELAY_URL      Wallet bridge JSON-RPC endpoint
    RESCUE_FEE_RATE       Fee rate in sat/vB

EXAMPLES:
    # Sweep with Xverse through the local wallet bridge
    rescue recover -c rescue.toml -k 02ab… -a bc1q…

    # Fixed fee rate
    rescue recover -c rescue.toml -k 02ab… -a bc1q… --fee-rate 8
"#
    );
}
