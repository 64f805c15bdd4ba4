//! Wizz, through `window.wizz.bitcoin`.
//!
//! `requestAccounts` yields only an address, so the public key is fetched
//! separately; a session without one is not established.

use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::psbt::Psbt;
use serde_json::json;

use super::unreadable;
use crate::adapter::{
    connect_failure, sign_failure, CancelSignal, Session, SignerAdapter, SignerError,
    SignerIdentity, WalletKind, SIGHASH_ALL,
};
use crate::codec;
use crate::relay::{call_as, WalletRelay};

pub(crate) const TARGET: &str = "wizz.bitcoin";

const SIGNAL: CancelSignal = CancelSignal::Generic;

pub struct WizzSigner {
    relay: Arc<dyn WalletRelay>,
    session: Session,
}

impl WizzSigner {
    pub fn new(relay: Arc<dyn WalletRelay>) -> Self {
        Self {
            relay,
            session: Session::default(),
        }
    }
}

#[async_trait]
impl SignerAdapter for WizzSigner {
    fn name(&self) -> &'static str {
        WalletKind::Wizz.label()
    }

    fn identity(&self) -> Option<&SignerIdentity> {
        self.session.identity()
    }

    async fn connect(&mut self) -> Result<SignerIdentity, SignerError> {
        let fail = |f| connect_failure(WalletKind::Wizz, SIGNAL, f);

        let accounts: Vec<String> =
            call_as(self.relay.as_ref(), TARGET, "requestAccounts", json!([]))
                .await
                .map_err(fail)?;
        let address = accounts.into_iter().next().ok_or_else(|| {
            SignerError::ConnectionError("No address returned from Wizz wallet".into())
        })?;

        let public_key: Option<String> =
            call_as(self.relay.as_ref(), TARGET, "getPublicKey", json!([]))
                .await
                .map_err(fail)?;
        let public_key = public_key.filter(|k| !k.is_empty()).ok_or_else(|| {
            SignerError::ConnectionError("Wizz wallet did not provide a public key".into())
        })?;

        let identity = SignerIdentity::from_hex(address, &public_key)?;
        log::info!("Connected to Wizz: {}", identity.address);
        Ok(self.session.establish(identity))
    }

    async fn request_signature(
        &self,
        identity: &SignerIdentity,
        psbt: &Psbt,
        indices: &[u32],
    ) -> Result<Psbt, SignerError> {
        let inputs_to_sign: Vec<_> = indices
            .iter()
            .map(|i| {
                json!({
                    "index": i,
                    "address": identity.address,
                    "sighashType": SIGHASH_ALL,
                })
            })
            .collect();
        let options = json!({
            "psbt": codec::to_hex(psbt),
            "inputsToSign": inputs_to_sign,
        });

        let signed: String = call_as(self.relay.as_ref(), TARGET, "signPsbt", json!([options]))
            .await
            .map_err(|f| sign_failure(WalletKind::Wizz, SIGNAL, f))?;

        codec::from_hex(&signed).map_err(|e| unreadable(WalletKind::Wizz, e))
    }

    fn disconnect(&mut self) {
        self.session.clear();
    }
}
