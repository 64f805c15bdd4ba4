//! Leather, through `window.btc.request(..)`.
//!
//! Leather signs with a specific account; the account number is the third
//! hardened component of the address's derivation path
//! (`m/84'/0'/<account>'/0/0`).

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::bip32::{ChildNumber, DerivationPath};
use bitcoin::psbt::Psbt;
use bitcoin::Network;
use serde::Deserialize;
use serde_json::json;

use super::unreadable;
use crate::adapter::{
    connect_failure, sign_failure, CancelSignal, Session, SignerAdapter, SignerError,
    SignerIdentity, WalletKind, SIGHASH_ALL,
};
use crate::codec;
use crate::relay::{call_as, WalletRelay};

pub(crate) const TARGET: &str = "btc";

const SIGNAL: CancelSignal = CancelSignal::Generic;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Addresses {
    #[serde(default)]
    addresses: Vec<LeatherAddress>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeatherAddress {
    address: String,
    public_key: String,
    #[serde(default)]
    derivation_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SignedHex {
    hex: Option<String>,
}

/// Account number from a BIP-32 path whose first three steps are hardened.
pub fn account_from_derivation_path(path: &str) -> Option<u32> {
    let path = DerivationPath::from_str(path.trim()).ok()?;
    let steps: Vec<ChildNumber> = path.into_iter().take(3).copied().collect();
    match steps.as_slice() {
        [
            ChildNumber::Hardened { .. },
            ChildNumber::Hardened { .. },
            ChildNumber::Hardened { index },
        ] => Some(*index),
        _ => None,
    }
}

fn network_name(network: Network) -> &'static str {
    match network {
        Network::Bitcoin => "mainnet",
        Network::Testnet => "testnet",
        Network::Signet => "signet",
        _ => "regtest",
    }
}

pub struct LeatherSigner {
    relay: Arc<dyn WalletRelay>,
    network: Network,
    session: Session,
    account: Option<u32>,
}

impl LeatherSigner {
    pub fn new(relay: Arc<dyn WalletRelay>, network: Network) -> Self {
        Self {
            relay,
            network,
            session: Session::default(),
            account: None,
        }
    }

    /// Account resolved at connect time, if the wallet reported a path.
    pub fn account(&self) -> Option<u32> {
        self.account
    }
}

#[async_trait]
impl SignerAdapter for LeatherSigner {
    fn name(&self) -> &'static str {
        WalletKind::Leather.label()
    }

    fn identity(&self) -> Option<&SignerIdentity> {
        self.session.identity()
    }

    async fn connect(&mut self) -> Result<SignerIdentity, SignerError> {
        let response: Envelope<Addresses> =
            call_as(self.relay.as_ref(), TARGET, "request", json!(["getAddresses"]))
                .await
                .map_err(|f| connect_failure(WalletKind::Leather, SIGNAL, f))?;

        let first = response
            .result
            .and_then(|r| r.addresses.into_iter().next())
            .ok_or_else(|| {
                SignerError::ConnectionError("No addresses returned from Leather wallet".into())
            })?;

        self.account = first
            .derivation_path
            .as_deref()
            .and_then(account_from_derivation_path);

        let identity = SignerIdentity::from_hex(first.address, &first.public_key)?;
        log::info!(
            "Connected to Leather: {} (account {:?})",
            identity.address,
            self.account
        );
        Ok(self.session.establish(identity))
    }

    async fn request_signature(
        &self,
        _identity: &SignerIdentity,
        psbt: &Psbt,
        indices: &[u32],
    ) -> Result<Psbt, SignerError> {
        let mut options = json!({
            "hex": codec::to_hex(psbt),
            "broadcast": false,
            "signAtIndex": indices,
            "allowedSighash": [SIGHASH_ALL],
            "network": network_name(self.network),
        });
        if let Some(account) = self.account {
            options["account"] = json!(account);
        }

        let response: Envelope<SignedHex> =
            call_as(self.relay.as_ref(), TARGET, "request", json!(["signPsbt", options]))
                .await
                .map_err(|f| sign_failure(WalletKind::Leather, SIGNAL, f))?;

        let hex = response.result.and_then(|r| r.hex).ok_or_else(|| {
            SignerError::SigningFailed("Failed to sign PSBT with Leather wallet".into())
        })?;
        codec::from_hex(&hex).map_err(|e| unreadable(WalletKind::Leather, e))
    }

    fn disconnect(&mut self) {
        self.session.clear();
        self.account = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_from_path() {
        assert_eq!(account_from_derivation_path("m/84'/0'/0'/0/0"), Some(0));
        assert_eq!(account_from_derivation_path("m/84'/0'/3'/0/0"), Some(3));
        assert_eq!(account_from_derivation_path("m/86'/0'/12'"), Some(12));
    }

    #[test]
    fn test_account_requires_hardened_prefix() {
        assert_eq!(account_from_derivation_path("m/84'/0'/3/0/0"), None);
        assert_eq!(account_from_derivation_path("m/84'/0'"), None);
        assert_eq!(account_from_derivation_path("m"), None);
        assert_eq!(account_from_derivation_path("not a path"), None);
    }

    #[test]
    fn test_network_names() {
        assert_eq!(network_name(Network::Bitcoin), "mainnet");
        assert_eq!(network_name(Network::Regtest), "regtest");
    }
}
