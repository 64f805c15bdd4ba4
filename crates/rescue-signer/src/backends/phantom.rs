//! Phantom, through `window.phantom.bitcoin`. PSBTs cross as raw bytes.

use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::psbt::Psbt;
use serde_json::json;

use super::{payment_account, unreadable, WalletAccount};
use crate::adapter::{
    connect_failure, sign_failure, CancelSignal, Session, SignerAdapter, SignerError,
    SignerIdentity, WalletKind, SIGHASH_ALL,
};
use crate::codec;
use crate::relay::{call_as, WalletRelay};

pub(crate) const TARGET: &str = "phantom.bitcoin";

/// Phantom's "user rejected" error code.
pub const USER_REJECTED: i64 = 4001;

const SIGNAL: CancelSignal = CancelSignal::Code(USER_REJECTED);

pub struct PhantomSigner {
    relay: Arc<dyn WalletRelay>,
    session: Session,
}

impl PhantomSigner {
    pub fn new(relay: Arc<dyn WalletRelay>) -> Self {
        Self {
            relay,
            session: Session::default(),
        }
    }

    async fn ensure_provider(&self) -> Result<(), SignerError> {
        let is_phantom: Option<bool> = call_as(self.relay.as_ref(), TARGET, "isPhantom", json!([]))
            .await
            .map_err(|f| connect_failure(WalletKind::Phantom, SIGNAL, f))?;
        if is_phantom != Some(true) {
            return Err(SignerError::BackendUnavailable(
                WalletKind::Phantom.label().into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl SignerAdapter for PhantomSigner {
    fn name(&self) -> &'static str {
        WalletKind::Phantom.label()
    }

    fn identity(&self) -> Option<&SignerIdentity> {
        self.session.identity()
    }

    async fn connect(&mut self) -> Result<SignerIdentity, SignerError> {
        self.ensure_provider().await?;

        let accounts: Option<Vec<WalletAccount>> =
            call_as(self.relay.as_ref(), TARGET, "requestAccounts", json!([]))
                .await
                .map_err(|f| connect_failure(WalletKind::Phantom, SIGNAL, f))?;
        let accounts = accounts
            .ok_or_else(|| SignerError::ConnectionError("could not list accounts".into()))?;

        let identity = payment_account(WalletKind::Phantom, &accounts)?;
        log::info!("Connected to Phantom: {}", identity.address);
        Ok(self.session.establish(identity))
    }

    async fn request_signature(
        &self,
        identity: &SignerIdentity,
        psbt: &Psbt,
        indices: &[u32],
    ) -> Result<Psbt, SignerError> {
        self.ensure_provider().await?;

        let inputs_to_sign: Vec<_> = indices
            .iter()
            .map(|i| {
                json!({
                    "address": identity.address,
                    "signingIndexes": [i],
                    "sigHash": SIGHASH_ALL,
                })
            })
            .collect();
        let params = json!([codec::to_bytes(psbt), { "inputsToSign": inputs_to_sign }]);

        let signed: Vec<u8> = call_as(self.relay.as_ref(), TARGET, "signPSBT", params)
            .await
            .map_err(|f| sign_failure(WalletKind::Phantom, SIGNAL, f))?;

        codec::from_bytes(&signed).map_err(|e| unreadable(WalletKind::Phantom, e))
    }

    fn disconnect(&mut self) {
        self.session.clear();
    }
}
