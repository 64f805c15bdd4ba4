//! The uniform signer contract.
//!
//! Every backend speaks its own dialect (hex vs base64 vs raw bytes,
//! per-index vs grouped signing instructions, numeric cancel codes vs
//! callbacks). Adapters hide all of that behind [`SignerAdapter`]: the
//! orchestrator hands over a PSBT and a list of input indices and gets a
//! PSBT back, or a [`SignerError`] from one shared taxonomy.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use bitcoin::psbt::Psbt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::relay::RelayFailure;

/// SIGHASH_ALL, as every backend is asked to sign with it.
pub const SIGHASH_ALL: u8 = 1;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("{0} wallet not found")]
    BackendUnavailable(String),

    #[error("User rejected the request")]
    UserRejected,

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Wallet not connected")]
    NotConnected,

    #[error("Signing failed: {0}")]
    SigningFailed(String),
}

impl SignerError {
    /// True for an explicit human decline, which callers should not present
    /// as a failure.
    pub fn is_user_rejection(&self) -> bool {
        matches!(self, SignerError::UserRejected)
    }
}

/// Identity returned by a successful connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerIdentity {
    /// Payment address of the connected account; receives the sweep
    pub address: String,
    /// Public key of that account (33-byte compressed)
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
}

impl SignerIdentity {
    /// Build from the hex public key most wallets report.
    pub fn from_hex(address: impl Into<String>, public_key_hex: &str) -> Result<Self, SignerError> {
        let public_key = hex::decode(public_key_hex.trim())
            .map_err(|e| SignerError::ConnectionError(format!("invalid public key hex: {}", e)))?;
        Ok(Self {
            address: address.into(),
            public_key,
        })
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(&self.public_key)
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

/// The six browser wallets reachable through a relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletKind {
    Leather,
    MagicEden,
    Phantom,
    Unisat,
    Wizz,
    Xverse,
}

impl WalletKind {
    /// Every selectable wallet, in display order.
    pub const ALL: [WalletKind; 6] = [
        WalletKind::Leather,
        WalletKind::MagicEden,
        WalletKind::Phantom,
        WalletKind::Unisat,
        WalletKind::Wizz,
        WalletKind::Xverse,
    ];

    pub fn label(self) -> &'static str {
        match self {
            WalletKind::Leather => "Leather",
            WalletKind::MagicEden => "Magic Eden",
            WalletKind::Phantom => "Phantom",
            WalletKind::Unisat => "Unisat",
            WalletKind::Wizz => "Wizz",
            WalletKind::Xverse => "Xverse",
        }
    }

    /// Config/CLI identifier.
    pub fn id(self) -> &'static str {
        match self {
            WalletKind::Leather => "leather",
            WalletKind::MagicEden => "magic_eden",
            WalletKind::Phantom => "phantom",
            WalletKind::Unisat => "unisat",
            WalletKind::Wizz => "wizz",
            WalletKind::Xverse => "xverse",
        }
    }
}

impl fmt::Display for WalletKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for WalletKind {
    type Err = SignerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        WalletKind::ALL
            .into_iter()
            .find(|k| k.id() == normalized)
            .ok_or_else(|| SignerError::BackendUnavailable(s.trim().to_string()))
    }
}

/// A connected (or connectable) external signer.
///
/// Implementors provide [`connect`](Self::connect) and
/// [`request_signature`](Self::request_signature); the provided
/// [`sign_inputs`](Self::sign_inputs) adds the checks every backend shares.
#[async_trait]
pub trait SignerAdapter: Send + Sync {
    /// Human-readable backend name.
    fn name(&self) -> &'static str;

    /// Identity of the current session, if connected.
    fn identity(&self) -> Option<&SignerIdentity>;

    /// Open a session with the backend.
    async fn connect(&mut self) -> Result<SignerIdentity, SignerError>;

    /// Backend-specific signing round trip. Called only while connected and
    /// with validated indices.
    async fn request_signature(
        &self,
        identity: &SignerIdentity,
        psbt: &Psbt,
        indices: &[u32],
    ) -> Result<Psbt, SignerError>;

    /// Forget the session. Idempotent.
    fn disconnect(&mut self);

    /// Ask the backend to sign exactly `indices` of `psbt` with the session key.
    ///
    /// The returned PSBT is rejected if the backend changed the unsigned
    /// transaction in any way.
    async fn sign_inputs(&self, psbt: &Psbt, indices: &[u32]) -> Result<Psbt, SignerError> {
        let identity = self.identity().ok_or(SignerError::NotConnected)?.clone();
        check_indices(psbt, indices)?;

        log::info!(
            "Requesting {} signature(s) from {} for {}",
            indices.len(),
            self.name(),
            identity.address
        );
        let signed = self.request_signature(&identity, psbt, indices).await?;
        ensure_unaltered(psbt, signed)
    }
}

/// Connection state shared by every adapter.
#[derive(Debug, Clone, Default)]
pub struct Session {
    identity: Option<SignerIdentity>,
}

impl Session {
    pub fn identity(&self) -> Option<&SignerIdentity> {
        self.identity.as_ref()
    }

    pub fn establish(&mut self, identity: SignerIdentity) -> SignerIdentity {
        self.identity = Some(identity.clone());
        identity
    }

    pub fn clear(&mut self) {
        self.identity = None;
    }
}

/// Indices must be in range and unique.
pub fn check_indices(psbt: &Psbt, indices: &[u32]) -> Result<(), SignerError> {
    if indices.is_empty() {
        return Err(SignerError::SigningFailed("no inputs to sign".into()));
    }
    let count = psbt.inputs.len();
    let mut seen = BTreeSet::new();
    for &index in indices {
        if index as usize >= count {
            return Err(SignerError::SigningFailed(format!(
                "input index {} out of range ({} inputs)",
                index, count
            )));
        }
        if !seen.insert(index) {
            return Err(SignerError::SigningFailed(format!(
                "input index {} requested twice",
                index
            )));
        }
    }
    Ok(())
}

/// Reject a signed PSBT whose transaction differs from the one sent.
pub fn ensure_unaltered(sent: &Psbt, signed: Psbt) -> Result<Psbt, SignerError> {
    if signed.unsigned_tx != sent.unsigned_tx {
        return Err(SignerError::SigningFailed(
            "signer returned a different transaction".into(),
        ));
    }
    if signed.inputs.len() != sent.inputs.len() || signed.outputs.len() != sent.outputs.len() {
        return Err(SignerError::SigningFailed(
            "signer changed the PSBT input/output maps".into(),
        ));
    }
    Ok(signed)
}

/// Wallets that signal errors generically: treat the EIP-1193 4001 code or
/// rejection wording as a human decline.
pub(crate) fn looks_like_rejection(code: Option<i64>, message: &str) -> bool {
    if code == Some(4001) {
        return true;
    }
    let lower = message.to_ascii_lowercase();
    ["reject", "cancel", "denied", "declined"]
        .iter()
        .any(|w| lower.contains(w))
}

/// How a backend marks a human decline in its error values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CancelSignal {
    /// Exactly this numeric code
    Code(i64),
    /// No distinguished code; classify by [`looks_like_rejection`]
    Generic,
    /// Only an explicit cancel callback; errors are always failures
    Callback,
}

impl CancelSignal {
    fn is_cancel(self, code: Option<i64>, message: &str) -> bool {
        match self {
            CancelSignal::Code(c) => code == Some(c),
            CancelSignal::Generic => looks_like_rejection(code, message),
            CancelSignal::Callback => false,
        }
    }
}

/// Map a relay failure during connect.
pub(crate) fn connect_failure(
    wallet: WalletKind,
    signal: CancelSignal,
    failure: RelayFailure,
) -> SignerError {
    match failure {
        RelayFailure::Unavailable(_) => SignerError::BackendUnavailable(wallet.label().into()),
        RelayFailure::Wallet { code, message } if signal.is_cancel(code, &message) => {
            SignerError::UserRejected
        }
        RelayFailure::Wallet { message, .. } => {
            SignerError::ConnectionError(format!("{}: {}", wallet, message))
        }
        RelayFailure::Transport(message) => {
            SignerError::ConnectionError(format!("{}: {}", wallet, message))
        }
    }
}

/// Map a relay failure during signing.
pub(crate) fn sign_failure(
    wallet: WalletKind,
    signal: CancelSignal,
    failure: RelayFailure,
) -> SignerError {
    match failure {
        RelayFailure::Unavailable(_) => SignerError::BackendUnavailable(wallet.label().into()),
        RelayFailure::Wallet { code, message } if signal.is_cancel(code, &message) => {
            SignerError::UserRejected
        }
        RelayFailure::Wallet { message, .. } | RelayFailure::Transport(message) => {
            SignerError::SigningFailed(format!("{}: {}", wallet, message))
        }
    }
}
