//! Xverse, through the sats-connect `request()` API.

use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::psbt::Psbt;
use bitcoin::Network;
use serde_json::json;

use super::{
    payment_account, sats_connect_network, unreadable, SignedBase64, WalletAccount,
    CONNECT_MESSAGE, SIGN_MESSAGE,
};
use crate::adapter::{
    connect_failure, sign_failure, CancelSignal, Session, SignerAdapter, SignerError,
    SignerIdentity, WalletKind,
};
use crate::codec;
use crate::relay::{call_as, Callback, RpcStatus, WalletRelay};

pub(crate) const TARGET: &str = "sats-connect";

/// sats-connect's "user rejected" error code.
pub const USER_REJECTED: i64 = -32000;

const SIGNAL: CancelSignal = CancelSignal::Code(USER_REJECTED);

pub struct XverseSigner {
    relay: Arc<dyn WalletRelay>,
    network: Network,
    session: Session,
}

impl XverseSigner {
    pub fn new(relay: Arc<dyn WalletRelay>, network: Network) -> Self {
        Self {
            relay,
            network,
            session: Session::default(),
        }
    }
}

#[async_trait]
impl SignerAdapter for XverseSigner {
    fn name(&self) -> &'static str {
        WalletKind::Xverse.label()
    }

    fn identity(&self) -> Option<&SignerIdentity> {
        self.session.identity()
    }

    async fn connect(&mut self) -> Result<SignerIdentity, SignerError> {
        let params = json!({
            "purposes": ["payment"],
            "message": CONNECT_MESSAGE,
        });
        let status: RpcStatus<Vec<WalletAccount>> =
            call_as(self.relay.as_ref(), TARGET, "getAccounts", params)
                .await
                .map_err(|f| connect_failure(WalletKind::Xverse, SIGNAL, f))?;

        let accounts = match status {
            RpcStatus::Success { result } => result,
            RpcStatus::Error { error } if error.code == USER_REJECTED => {
                return Err(SignerError::UserRejected)
            }
            RpcStatus::Error { error } => {
                return Err(SignerError::ConnectionError(error.message))
            }
        };

        let identity = payment_account(WalletKind::Xverse, &accounts)?;
        log::info!("Connected to Xverse: {}", identity.address);
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
            .map(|i| json!({ "address": identity.address, "signingIndexes": [i] }))
            .collect();
        let params = json!({
            "network": { "type": sats_connect_network(self.network) },
            "message": SIGN_MESSAGE,
            "psbtBase64": codec::to_base64(psbt),
            "broadcast": false,
            "inputsToSign": inputs_to_sign,
        });

        let outcome: Callback<SignedBase64> =
            call_as(self.relay.as_ref(), TARGET, "signTransaction", params)
                .await
                .map_err(|f| sign_failure(WalletKind::Xverse, SIGNAL, f))?;

        match outcome {
            Callback::Finish(signed) => codec::from_base64(&signed.psbt_base64)
                .map_err(|e| unreadable(WalletKind::Xverse, e)),
            Callback::Cancel => Err(SignerError::UserRejected),
        }
    }

    fn disconnect(&mut self) {
        self.session.clear();
    }
}
