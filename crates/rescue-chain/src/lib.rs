//! Rescue Chain
//!
//! Everything the recovery needs from the Bitcoin network:
//! - spendable outputs locked to the multisig address
//! - a recommended fee rate
//! - transaction broadcast
//!
//! Two backends implement all three: [`EsploraClient`] (mempool.space or any
//! Esplora HTTP API) and [`ElectrumClient`].

use async_trait::async_trait;
use bitcoin::{Address, Network, Transaction, Txid};
use rescue_core::{FeeRate, FeeTiers, SpendableOutput};

pub mod electrum;
pub mod error;
pub mod esplora;

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

pub use electrum::ElectrumClient;
pub use error::ChainError;
pub use esplora::EsploraClient;

/// Lists the unspent outputs locked to an address.
#[async_trait]
pub trait OutputSource: Send + Sync {
    async fn fetch_outputs(&self, address: &Address) -> Result<Vec<SpendableOutput>, ChainError>;
}

/// Recommends fee rates.
#[async_trait]
pub trait FeeEstimator: Send + Sync {
    async fn recommended_fees(&self) -> Result<FeeTiers, ChainError>;

    /// The medium tier, or `None` if the estimate could not be obtained.
    async fn fetch_recommended_rate(&self) -> Option<FeeRate> {
        match self.recommended_fees().await {
            Ok(tiers) => tiers.medium(),
            Err(e) => {
                log::warn!("Fee estimation failed: {}", e);
                None
            }
        }
    }
}

/// Submits a finalized transaction.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast(&self, tx: &Transaction) -> Result<Txid, ChainError>;
}

/// A backend that provides all three services.
pub trait ChainBackend: OutputSource + FeeEstimator + Broadcaster {}

impl<T: OutputSource + FeeEstimator + Broadcaster> ChainBackend for T {}

/// Block explorer link for a transaction.
pub fn explorer_tx_url(network: Network, txid: &Txid) -> String {
    let prefix = match network {
        Network::Testnet => "/testnet",
        Network::Signet => "/signet",
        _ => "",
    };
    format!("https://mempool.space{}/tx/{}", prefix, txid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;

    struct Broken;

    #[async_trait]
    impl FeeEstimator for Broken {
        async fn recommended_fees(&self) -> Result<FeeTiers, ChainError> {
            Err(ChainError::UnexpectedResponse("down".into()))
        }
    }

    struct Fixed(FeeTiers);

    #[async_trait]
    impl FeeEstimator for Fixed {
        async fn recommended_fees(&self) -> Result<FeeTiers, ChainError> {
            Ok(self.0)
        }
    }

    fn tiers(hour: u32) -> FeeTiers {
        FeeTiers {
            fastest_fee: 40,
            half_hour_fee: 30,
            hour_fee: hour,
            economy_fee: 10,
            minimum_fee: 1,
        }
    }

    #[tokio::test]
    async fn test_recommended_rate_is_hour_tier() {
        let rate = Fixed(tiers(22)).fetch_recommended_rate().await;
        assert_eq!(rate, Some(FeeRate::from_sat_per_vb(22).unwrap()));
    }

    #[tokio::test]
    async fn test_recommended_rate_none_on_failure_or_zero() {
        assert_eq!(Broken.fetch_recommended_rate().await, None);
        assert_eq!(Fixed(tiers(0)).fetch_recommended_rate().await, None);
    }

    #[test]
    fn test_explorer_urls() {
        let txid = Txid::all_zeros();
        assert_eq!(
            explorer_tx_url(Network::Bitcoin, &txid),
            format!("https://mempool.space/tx/{}", txid)
        );
        assert!(explorer_tx_url(Network::Signet, &txid)
            .starts_with("https://mempool.space/signet/tx/"));
    }
}
