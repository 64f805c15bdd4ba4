//! One adapter per supported browser wallet.
//!
//! | Wallet     | Relay target       | PSBT encoding | Decline signal        |
//! |------------|--------------------|---------------|-----------------------|
//! | Xverse     | `sats-connect`     | base64        | code -32000 / cancel  |
//! | Unisat     | `unisat`           | hex           | generic error         |
//! | Leather    | `btc`              | hex           | generic error         |
//! | Magic Eden | `magic-eden`       | base64        | cancel callback       |
//! | Phantom    | `phantom.bitcoin`  | bytes         | code 4001             |
//! | Wizz       | `wizz.bitcoin`     | hex           | generic error         |

use std::sync::Arc;

use bitcoin::Network;
use serde::Deserialize;

use crate::adapter::{SignerAdapter, SignerError, SignerIdentity, WalletKind};
use crate::codec::CodecError;
use crate::relay::WalletRelay;

pub mod leather;
pub mod magic_eden;
pub mod phantom;
pub mod unisat;
pub mod wizz;
pub mod xverse;


pub use leather::{account_from_derivation_path, LeatherSigner};
pub use magic_eden::MagicEdenSigner;
pub use phantom::PhantomSigner;
pub use unisat::UnisatSigner;
pub use wizz::WizzSigner;
pub use xverse::XverseSigner;

/// Prompt shown by wallets that display a message on connect.
pub(crate) const CONNECT_MESSAGE: &str = "Address for receiving payments";

/// Prompt shown by wallets that display a message on signing.
pub(crate) const SIGN_MESSAGE: &str = "Sign multisig recovery transaction";

/// Build the adapter for `kind`, talking through `relay`.
pub fn create_signer(
    kind: WalletKind,
    relay: Arc<dyn WalletRelay>,
    network: Network,
) -> Box<dyn SignerAdapter> {
    match kind {
        WalletKind::Leather => Box::new(LeatherSigner::new(relay, network)),
        WalletKind::MagicEden => Box::new(MagicEdenSigner::new(relay, network)),
        WalletKind::Phantom => Box::new(PhantomSigner::new(relay)),
        WalletKind::Unisat => Box::new(UnisatSigner::new(relay)),
        WalletKind::Wizz => Box::new(WizzSigner::new(relay)),
        WalletKind::Xverse => Box::new(XverseSigner::new(relay, network)),
    }
}

/// Account entry as reported by sats-connect style wallets.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WalletAccount {
    pub address: String,
    pub public_key: String,
    #[serde(default)]
    pub purpose: String,
}

impl WalletAccount {
    pub fn identity(&self) -> Result<SignerIdentity, SignerError> {
        SignerIdentity::from_hex(&self.address, &self.public_key)
    }
}

/// The account used for payments (the sweep destination).
pub(crate) fn payment_account(
    wallet: WalletKind,
    accounts: &[WalletAccount],
) -> Result<SignerIdentity, SignerError> {
    accounts
        .iter()
        .find(|a| a.purpose == "payment")
        .ok_or_else(|| {
            SignerError::ConnectionError(format!("No payment address found in {}", wallet))
        })?
        .identity()
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SignedBase64 {
    #[serde(rename = "psbtBase64")]
    pub psbt_base64: String,
}

/// `network.type` for sats-connect payloads.
pub(crate) fn sats_connect_network(network: Network) -> &'static str {
    match network {
        Network::Bitcoin => "Mainnet",
        Network::Testnet => "Testnet",
        Network::Signet => "Signet",
        _ => "Regtest",
    }
}

pub(crate) fn unreadable(wallet: WalletKind, err: CodecError) -> SignerError {
    SignerError::SigningFailed(format!("{} returned an unreadable PSBT: {}", wallet, err))
}
