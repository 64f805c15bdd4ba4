//! Esplora HTTP API client (mempool.space by default).
//!
//! ```text
//! GET  {base}/address/{address}/utxo   -> [{txid, vout, value, status}]
//! GET  {base}/v1/fees/recommended      -> {fastestFee, .., minimumFee}
//! POST {base}/tx  (hex body)           -> txid
//! ```

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::{Address, Amount, Network, Transaction, Txid};
use rescue_core::{FeeTiers, SpendableOutput};
use serde::Deserialize;

use crate::error::ChainError;
use crate::{Broadcaster, FeeEstimator, OutputSource};

#[derive(Debug, Deserialize)]
struct EsploraUtxo {
    txid: Txid,
    vout: u32,
    value: u64,
    status: EsploraStatus,
}

#[derive(Debug, Deserialize)]
struct EsploraStatus {
    confirmed: bool,
    #[serde(default)]
    block_height: Option<u32>,
}

impl From<EsploraUtxo> for SpendableOutput {
    fn from(u: EsploraUtxo) -> Self {
        SpendableOutput {
            txid: u.txid,
            vout: u.vout,
            value: Amount::from_sat(u.value),
            confirmed: u.status.confirmed,
            block_height: u.status.block_height,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Text of a broadcast rejection: the JSON `message` if present, else the
/// raw body, else the HTTP status.
pub fn rejection_message(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        return parsed.message;
    }
    let body = body.trim();
    if !body.is_empty() {
        return body.to_string();
    }
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| status.to_string())
}

/// mempool.space Esplora base URL for a network.
pub fn default_base_url(network: Network) -> Option<&'static str> {
    match network {
        Network::Bitcoin => Some("https://mempool.space/api"),
        Network::Testnet => Some("https://mempool.space/testnet/api"),
        Network::Signet => Some("https://mempool.space/signet/api"),
        _ => None,
    }
}

/// Esplora client
#[derive(Debug, Clone)]
pub struct EsploraClient {
    client: reqwest::Client,
    base_url: String,
    network: Network,
}

impl EsploraClient {
    /// Create a client for `network`.
    ///
    /// `base_url` overrides the mempool.space default (required on regtest).
    /// `timeout` bounds each request; `None` leaves requests unbounded.
    pub fn new(
        network: Network,
        base_url: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Self, ChainError> {
        let base_url = match base_url {
            Some(url) => url,
            None => default_base_url(network).ok_or(ChainError::NoEndpoint(network))?,
        };

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            network,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn network(&self) -> Network {
        self.network
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl OutputSource for EsploraClient {
    async fn fetch_outputs(&self, address: &Address) -> Result<Vec<SpendableOutput>, ChainError> {
        let url = self.url(&format!("/address/{}/utxo", address));
        log::debug!("GET {}", url);

        let utxos: Vec<EsploraUtxo> = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        log::info!("Found {} spendable output(s) for {}", utxos.len(), address);
        Ok(utxos.into_iter().map(SpendableOutput::from).collect())
    }
}

#[async_trait]
impl FeeEstimator for EsploraClient {
    async fn recommended_fees(&self) -> Result<FeeTiers, ChainError> {
        let url = self.url("/v1/fees/recommended");
        log::debug!("GET {}", url);

        let tiers: FeeTiers = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(tiers)
    }
}

#[async_trait]
impl Broadcaster for EsploraClient {
    async fn broadcast(&self, tx: &Transaction) -> Result<Txid, ChainError> {
        let url = self.url("/tx");
        log::info!("Broadcasting {} via {}", tx.compute_txid(), self.base_url);

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(serialize_hex(tx))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status.is_server_error() {
            // Gateway or node trouble, not a verdict on the transaction
            log::warn!("Broadcast outcome unknown ({}): {}", status, body.trim());
            return Err(ChainError::UnexpectedResponse(format!("{}: {}", status, body.trim())));
        }
        if !status.is_success() {
            let message = rejection_message(status, &body);
            log::warn!("Broadcast rejected ({}): {}", status, message);
            return Err(ChainError::BroadcastRejected(message));
        }

        let txid = Txid::from_str(body.trim()).map_err(|e| {
            ChainError::UnexpectedResponse(format!("bad txid '{}': {}", body.trim(), e))
        })?;
        if txid != tx.compute_txid() {
            log::warn!("Relay reported txid {} for {}", txid, tx.compute_txid());
        }
        Ok(txid)
    }
}
