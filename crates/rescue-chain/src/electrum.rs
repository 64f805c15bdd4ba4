//! Electrum alternative to mempool.space
//!
//! Looks up the multisig's outputs by script, estimates fees from block
//! targets and pushes the finished sweep. The client is blocking, so every
//! call runs on tokio's blocking pool.

use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::{Address, Amount, Network, Transaction, Txid};
use electrum_client::{Client, ElectrumApi, Error as ElectrumError, ListUnspentRes};
use rescue_core::{FeeTiers, SpendableOutput};

use crate::error::ChainError;
use crate::{Broadcaster, FeeEstimator, OutputSource};

/// Confirmation targets (blocks) behind each fee tier.
const FASTEST_TARGET: usize = 1;
const HALF_HOUR_TARGET: usize = 3;
const HOUR_TARGET: usize = 6;
const ECONOMY_TARGET: usize = 144;

/// Output lookup, fee estimates and broadcast over one Electrum connection.
#[derive(Clone)]
pub struct ElectrumClient {
    client: Arc<Client>,
    network: Network,
}

impl ElectrumClient {
    /// Blocking connect. `network` is the chain the server is expected to follow.
    pub fn new(url: &str, network: Network) -> Result<Self, ChainError> {
        if network == Network::Bitcoin && url.starts_with("tcp://") {
            log::warn!("Plain tcp Electrum on mainnet; the server sees which address is swept");
        }

        let client =
            Client::new(url).map_err(|e: ElectrumError| ChainError::Connection(e.to_string()))?;
        log::info!("Connected to Electrum server {}", url);

        Ok(Self {
            client: Arc::new(client),
            network,
        })
    }

    /// Connect without blocking the runtime.
    pub async fn connect(url: &str, network: Network) -> Result<Self, ChainError> {
        let url = url.to_string();
        tokio::task::spawn_blocking(move || Self::new(&url, network))
            .await
            .map_err(|e| ChainError::Task(e.to_string()))?
    }

    pub fn network(&self) -> Network {
        self.network
    }

    async fn run<T, F>(&self, f: F) -> Result<Result<T, ElectrumError>, ChainError>
    where
        T: Send + 'static,
        F: FnOnce(&Client) -> Result<T, ElectrumError> + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || f(&client))
            .await
            .map_err(|e| ChainError::Task(e.to_string()))
    }
}

/// Convert a `listunspent` entry. Height 0 (or negative) means mempool.
pub fn output_from_unspent(u: &ListUnspentRes) -> SpendableOutput {
    let confirmed = u.height > 0;
    SpendableOutput {
        txid: u.tx_hash,
        vout: u.tx_pos as u32,
        value: Amount::from_sat(u.value),
        confirmed,
        block_height: confirmed.then_some(u.height as u32),
    }
}

/// Electrum reports BTC/kvB; -1 means "no estimate". Rounds up.
pub fn btc_per_kvb_to_sat_per_vb(rate: f64) -> u32 {
    if !rate.is_finite() || rate <= 0.0 {
        return 0;
    }
    (rate * 100_000.0).ceil().min(u32::MAX as f64) as u32
}

/// The server's own message for a protocol error, if it sent one.
fn electrum_message(e: &ElectrumError) -> String {
    if let ElectrumError::Protocol(value) = e {
        if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
            return message.to_string();
        }
    }
    e.to_string()
}

/// Only a protocol error is the server refusing the transaction. Transport
/// failures leave its fate unknown.
fn broadcast_error(e: ElectrumError) -> ChainError {
    match e {
        ElectrumError::Protocol(_) => {
            let message = electrum_message(&e);
            log::warn!("Broadcast rejected: {}", message);
            ChainError::BroadcastRejected(message)
        }
        other => {
            log::warn!("Broadcast outcome unknown: {}", other);
            ChainError::Electrum(other.to_string())
        }
    }
}

#[async_trait]
impl OutputSource for ElectrumClient {
    async fn fetch_outputs(&self, address: &Address) -> Result<Vec<SpendableOutput>, ChainError> {
        let script = address.script_pubkey();
        let unspent = self
            .run(move |c| c.script_list_unspent(&script))
            .await?
            .map_err(|e| ChainError::Electrum(e.to_string()))?;

        log::info!("Found {} spendable output(s) for {}", unspent.len(), address);
        Ok(unspent.iter().map(output_from_unspent).collect())
    }
}

#[async_trait]
impl FeeEstimator for ElectrumClient {
    async fn recommended_fees(&self) -> Result<FeeTiers, ChainError> {
        let (fastest, half_hour, hour, economy, minimum) = self
            .run(|c| {
                Ok((
                    c.estimate_fee(FASTEST_TARGET)?,
                    c.estimate_fee(HALF_HOUR_TARGET)?,
                    c.estimate_fee(HOUR_TARGET)?,
                    c.estimate_fee(ECONOMY_TARGET)?,
                    c.relay_fee()?,
                ))
            })
            .await?
            .map_err(|e| ChainError::Electrum(e.to_string()))?;

        Ok(FeeTiers {
            fastest_fee: btc_per_kvb_to_sat_per_vb(fastest),
            half_hour_fee: btc_per_kvb_to_sat_per_vb(half_hour),
            hour_fee: btc_per_kvb_to_sat_per_vb(hour),
            economy_fee: btc_per_kvb_to_sat_per_vb(economy),
            minimum_fee: btc_per_kvb_to_sat_per_vb(minimum),
        })
    }
}

#[async_trait]
impl Broadcaster for ElectrumClient {
    async fn broadcast(&self, tx: &Transaction) -> Result<Txid, ChainError> {
        let tx = tx.clone();
        log::info!("Broadcasting {} via Electrum", tx.compute_txid());
        self.run(move |c| c.transaction_broadcast(&tx))
            .await?
            .map_err(broadcast_error)
    }
}

/// Default Electrum servers for each network
pub fn default_server(network: Network) -> &'static str {
    match network {
        Network::Bitcoin => "ssl://electrum.blockstream.info:60002",
        Network::Testnet => "ssl://electrum.blockstream.info:60004",
        Network::Signet => "ssl://mempool.space:60602",
        Network::Regtest => "tcp://127.0.0.1:60401",
        _ => "ssl://electrum.blockstream.info:60002",
    }
}
