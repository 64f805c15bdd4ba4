//! CLI configuration, parsed from a TOML file plus environment overrides.
//!
//! Priority: environment variables > config file > defaults. Every field is
//! optional, so `rescue` also runs without a config file.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use bitcoin::Network;
use serde::{Deserialize, Serialize};

use rescue_signer::{ManualSignerConfig, WalletKind};

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescueConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Network and chain backend
    #[serde(default)]
    pub bitcoin: BitcoinSection,

    /// Which wallet signs, and how to reach it
    #[serde(default)]
    pub signer: SignerSection,

    /// Fee overrides and HTTP limits
    #[serde(default)]
    pub fees: FeeSection,
}

/// Bitcoin network settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitcoinSection {
    /// Bitcoin network: "bitcoin", "testnet", "signet", "regtest"
    #[serde(default = "default_network")]
    pub network: String,

    /// Chain backend: "esplora" or "electrum"
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Esplora API base URL (defaults to mempool.space for the network)
    pub esplora_url: Option<String>,

    /// Electrum server URL (defaults to a public server for the network)
    pub electrum_url: Option<String>,
}

impl Default for BitcoinSection {
    fn default() -> Self {
        Self {
            network: default_network(),
            backend: default_backend(),
            esplora_url: None,
            electrum_url: None,
        }
    }
}

/// Signer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerSection {
    /// Wallet id ("xverse", "unisat", "leather", "magic_eden", "phantom",
    /// "wizz") or "manual"
    #[serde(default = "default_wallet")]
    pub wallet: String,

    /// JSON-RPC endpoint of the wallet bridge page
    #[serde(default = "default_relay_url")]
    pub relay_url: String,

    /// Per-request bound on wallet round trips. Unset waits for the user
    /// indefinitely.
    pub relay_timeout_secs: Option<u64>,

    /// File exchange for `wallet = "manual"`
    pub manual: Option<ManualSignerConfig>,
}

impl Default for SignerSection {
    fn default() -> Self {
        Self {
            wallet: default_wallet(),
            relay_url: default_relay_url(),
            relay_timeout_secs: None,
            manual: None,
        }
    }
}

/// Fee settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeeSection {
    /// Fixed fee rate in sat/vB; skips the recommendation
    pub fee_rate: Option<u32>,

    /// Per-request bound on chain backend HTTP calls
    pub http_timeout_secs: Option<u64>,
}

/// The configured chain backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Esplora,
    Electrum,
}

/// The configured signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerChoice {
    Wallet(WalletKind),
    Manual,
}

pub const MANUAL_WALLET: &str = "manual";

// ============================================================================
// Default value functions
// ============================================================================

fn default_log_level() -> String {
    "info".to_string()
}

fn default_network() -> String {
    "bitcoin".to_string()
}

fn default_backend() -> String {
    "esplora".to_string()
}

fn default_wallet() -> String {
    WalletKind::Xverse.id().to_string()
}

fn default_relay_url() -> String {
    "http://127.0.0.1:3737/rpc".to_string()
}

// ============================================================================
// Loading & environment override
// ============================================================================

impl RescueConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: RescueConfig =
            toml::from_str(&contents).with_context(|| "Failed to parse TOML config")?;
        Ok(config)
    }

    /// Load from `path` if given, otherwise start from defaults.
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(toml::from_str("")?),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `RESCUE_LOG_LEVEL`
    /// - `RESCUE_NETWORK`
    /// - `RESCUE_BACKEND`
    /// - `RESCUE_ESPLORA_URL`
    /// - `RESCUE_ELECTRUM_URL`
    /// - `RESCUE_WALLET`
    /// - `RESCUE_RELAY_URL`
    /// - `RESCUE_FEE_RATE`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("RESCUE_LOG_LEVEL") {
            self.log_level = v;
        }
        if let Ok(v) = std::env::var("RESCUE_NETWORK") {
            self.bitcoin.network = v;
        }
        if let Ok(v) = std::env::var("RESCUE_BACKEND") {
            self.bitcoin.backend = v;
        }
        if let Ok(v) = std::env::var("RESCUE_ESPLORA_URL") {
            self.bitcoin.esplora_url = Some(v);
        }
        if let Ok(v) = std::env::var("RESCUE_ELECTRUM_URL") {
            self.bitcoin.electrum_url = Some(v);
        }
        if let Ok(v) = std::env::var("RESCUE_WALLET") {
            self.signer.wallet = v;
        }
        if let Ok(v) = std::env::var("RESCUE_RELAY_URL") {
            self.signer.relay_url = v;
        }
        if let Ok(v) = std::env::var("RESCUE_FEE_RATE") {
            if let Ok(rate) = v.parse::<u32>() {
                self.fees.fee_rate = Some(rate);
            }
        }
    }

    /// Parse the bitcoin network string to a `bitcoin::Network`.
    pub fn network(&self) -> Result<Network> {
        match self.bitcoin.network.as_str() {
            "bitcoin" | "mainnet" => Ok(Network::Bitcoin),
            "testnet" | "testnet3" => Ok(Network::Testnet),
            "signet" => Ok(Network::Signet),
            "regtest" => Ok(Network::Regtest),
            other => anyhow::bail!("Unknown network: {}", other),
        }
    }

    pub fn backend(&self) -> Result<Backend> {
        match self.bitcoin.backend.to_ascii_lowercase().as_str() {
            "esplora" | "mempool" => Ok(Backend::Esplora),
            "electrum" => Ok(Backend::Electrum),
            other => anyhow::bail!("Unknown chain backend: {}", other),
        }
    }

    pub fn signer_choice(&self) -> Result<SignerChoice> {
        if self.signer.wallet.eq_ignore_ascii_case(MANUAL_WALLET) {
            return Ok(SignerChoice::Manual);
        }
        let kind = WalletKind::from_str(&self.signer.wallet)
            .map_err(|_| anyhow::anyhow!("Unknown wallet: {}", self.signer.wallet))?;
        Ok(SignerChoice::Wallet(kind))
    }

    pub fn relay_timeout(&self) -> Option<Duration> {
        self.signer.relay_timeout_secs.map(Duration::from_secs)
    }

    pub fn http_timeout(&self) -> Option<Duration> {
        self.fees.http_timeout_secs.map(Duration::from_secs)
    }

    /// Validate that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        let network = self.network()?;
        let backend = self.backend()?;

        // Regtest has no public Esplora instance
        if backend == Backend::Esplora && network == Network::Regtest {
            anyhow::ensure!(
                self.bitcoin.esplora_url.is_some(),
                "bitcoin.esplora_url is required on regtest"
            );
        }

        if let Some(rate) = self.fees.fee_rate {
            anyhow::ensure!(rate >= 1, "fees.fee_rate must be >= 1");
        }

        match self.signer_choice()? {
            SignerChoice::Manual => {
                let manual = self
                    .signer
                    .manual
                    .as_ref()
                    .context("signer.manual is required when wallet = \"manual\"")?;
                anyhow::ensure!(
                    !manual.address.trim().is_empty(),
                    "signer.manual.address must not be empty"
                );
                anyhow::ensure!(
                    rescue_core::validate_public_key(&manual.public_key),
                    "signer.manual.public_key must be a compressed public key"
                );
                anyhow::ensure!(
                    manual.unsigned_path != manual.signed_path,
                    "signer.manual.unsigned_path and signed_path must differ"
                );
            }
            SignerChoice::Wallet(_) => {
                anyhow::ensure!(
                    !self.signer.relay_url.is_empty(),
                    "signer.relay_url must not be empty"
                );
            }
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
