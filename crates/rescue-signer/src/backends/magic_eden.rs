//! Magic Eden, discovered through the wallet-standard registry and driven
//! with sats-connect callbacks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::psbt::Psbt;
use bitcoin::Network;
use serde::Deserialize;
use serde_json::json;

use super::{
    payment_account, sats_connect_network, unreadable, SignedBase64, WalletAccount,
    CONNECT_MESSAGE, SIGN_MESSAGE,
};
use crate::adapter::{
    connect_failure, sign_failure, CancelSignal, Session, SignerAdapter, SignerError,
    SignerIdentity, WalletKind, SIGHASH_ALL,
};
use crate::codec;
use crate::relay::{call_as, Callback, WalletRelay};

pub(crate) const REGISTRY: &str = "wallet-standard";
pub(crate) const TARGET: &str = "magic-eden";

/// Registry entry name and the feature that exposes the provider.
pub const WALLET_NAME: &str = "Magic Eden";
pub const PROVIDER_FEATURE: &str = "sats-connect:";

const SIGNAL: CancelSignal = CancelSignal::Callback;

#[derive(Debug, Deserialize)]
struct RegisteredWallet {
    name: String,
    #[serde(default)]
    features: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AddressResponse {
    addresses: Vec<WalletAccount>,
}

pub struct MagicEdenSigner {
    relay: Arc<dyn WalletRelay>,
    network: Network,
    session: Session,
    provider_found: AtomicBool,
}

impl MagicEdenSigner {
    pub fn new(relay: Arc<dyn WalletRelay>, network: Network) -> Self {
        Self {
            relay,
            network,
            session: Session::default(),
            provider_found: AtomicBool::new(false),
        }
    }

    /// Locate the provider once; later calls reuse the result.
    async fn ensure_provider(&self) -> Result<(), SignerError> {
        if self.provider_found.load(Ordering::Acquire) {
            return Ok(());
        }

        let wallets: Vec<RegisteredWallet> =
            call_as(self.relay.as_ref(), REGISTRY, "getWallets", json!([]))
                .await
                .map_err(|f| connect_failure(WalletKind::MagicEden, SIGNAL, f))?;

        let found = wallets
            .iter()
            .any(|w| w.name == WALLET_NAME && w.features.iter().any(|f| f == PROVIDER_FEATURE));
        if !found {
            return Err(SignerError::BackendUnavailable(
                WalletKind::MagicEden.label().into(),
            ));
        }

        self.provider_found.store(true, Ordering::Release);
        Ok(())
    }
}

#[async_trait]
impl SignerAdapter for MagicEdenSigner {
    fn name(&self) -> &'static str {
        WalletKind::MagicEden.label()
    }

    fn identity(&self) -> Option<&SignerIdentity> {
        self.session.identity()
    }

    async fn connect(&mut self) -> Result<SignerIdentity, SignerError> {
        self.ensure_provider().await?;

        let params = json!({
            "purposes": ["payment"],
            "message": CONNECT_MESSAGE,
            "network": { "type": sats_connect_network(self.network) },
        });
        let outcome: Callback<AddressResponse> =
            call_as(self.relay.as_ref(), TARGET, "getAddress", params)
                .await
                .map_err(|f| connect_failure(WalletKind::MagicEden, SIGNAL, f))?;

        let response = match outcome {
            Callback::Finish(response) => response,
            Callback::Cancel => return Err(SignerError::UserRejected),
        };

        let identity = payment_account(WalletKind::MagicEden, &response.addresses)?;
        log::info!("Connected to Magic Eden: {}", identity.address);
        Ok(self.session.establish(identity))
    }

    async fn request_signature(
        &self,
        identity: &SignerIdentity,
        psbt: &Psbt,
        indices: &[u32],
    ) -> Result<Psbt, SignerError> {
        self.ensure_provider().await?;

        // One grouped instruction covering every index
        let params = json!({
            "network": { "type": sats_connect_network(self.network) },
            "message": SIGN_MESSAGE,
            "psbtBase64": codec::to_base64(psbt),
            "broadcast": false,
            "inputsToSign": [{
                "address": identity.address,
                "signingIndexes": indices,
                "sigHash": SIGHASH_ALL,
            }],
        });

        let outcome: Callback<SignedBase64> =
            call_as(self.relay.as_ref(), TARGET, "signTransaction", params)
                .await
                .map_err(|f| sign_failure(WalletKind::MagicEden, SIGNAL, f))?;

        match outcome {
            Callback::Finish(signed) => codec::from_base64(&signed.psbt_base64)
                .map_err(|e| unreadable(WalletKind::MagicEden, e)),
            Callback::Cancel => Err(SignerError::UserRejected),
        }
    }

    fn disconnect(&mut self) {
        self.session.clear();
    }
}
