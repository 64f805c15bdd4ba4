//! Unisat, through `window.unisat`.

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

pub(crate) const TARGET: &str = "unisat";

const SIGNAL: CancelSignal = CancelSignal::Generic;

pub struct UnisatSigner {
    relay: Arc<dyn WalletRelay>,
    session: Session,
}

impl UnisatSigner {
    pub fn new(relay: Arc<dyn WalletRelay>) -> Self {
        Self {
            relay,
            session: Session::default(),
        }
    }
}

#[async_trait]
impl SignerAdapter for UnisatSigner {
    fn name(&self) -> &'static str {
        WalletKind::Unisat.label()
    }

    fn identity(&self) -> Option<&SignerIdentity> {
        self.session.identity()
    }

    async fn connect(&mut self) -> Result<SignerIdentity, SignerError> {
        let fail = |f| connect_failure(WalletKind::Unisat, SIGNAL, f);

        let accounts: Vec<String> =
            call_as(self.relay.as_ref(), TARGET, "requestAccounts", json!([]))
                .await
                .map_err(fail)?;
        let address = accounts.into_iter().next().ok_or_else(|| {
            SignerError::ConnectionError("No address returned from Unisat wallet".into())
        })?;

        let public_key: String = call_as(self.relay.as_ref(), TARGET, "getPublicKey", json!([]))
            .await
            .map_err(fail)?;

        let identity = SignerIdentity::from_hex(address, &public_key)?;
        log::info!("Connected to Unisat: {}", identity.address);
        Ok(self.session.establish(identity))
    }

    async fn request_signature(
        &self,
        identity: &SignerIdentity,
        psbt: &Psbt,
        indices: &[u32],
    ) -> Result<Psbt, SignerError> {
        let to_sign_inputs: Vec<_> = indices
            .iter()
            .map(|i| {
                json!({
                    "index": i,
                    "address": identity.address,
                    "sighashTypes": [SIGHASH_ALL],
                    "disableTweakSigner": true,
                })
            })
            .collect();
        let options = json!({
            "autoFinalized": false,
            "toSignInputs": to_sign_inputs,
        });

        let signed: String = call_as(
            self.relay.as_ref(),
            TARGET,
            "signPsbt",
            json!([codec::to_hex(psbt), options]),
        )
        .await
        .map_err(|f| sign_failure(WalletKind::Unisat, SIGNAL, f))?;

        codec::from_hex(&signed).map_err(|e| unreadable(WalletKind::Unisat, e))
    }

    fn disconnect(&mut self) {
        self.session.clear();
    }
}
