//! 1-of-2 multisig script model
//!
//! The recovery output is a P2WSH whose witness script is a bare
//! 1-of-2 `CHECKMULTISIG`:
//!
//! ```text
//! OP_1 <RECOVERY_KEY> <USER_KEY> OP_2 OP_CHECKMULTISIG
//! ```
//!
//! Either key alone satisfies the script. The user normally does not hold
//! the recovery key's private counterpart, so the sweep is signed with the
//! user's own wallet key.
//!
//! Key order is significant: swapping the two keys yields a different
//! script and therefore a different address.

use std::str::FromStr;

use bitcoin::opcodes::all::{OP_CHECKMULTISIG, OP_PUSHNUM_1, OP_PUSHNUM_2};
use bitcoin::script::Builder;
use bitcoin::{Address, CompressedPublicKey, Network, PublicKey, Script, ScriptBuf};
use miniscript::Descriptor;
use thiserror::Error;

/// Length of a compressed secp256k1 public key.
pub const COMPRESSED_KEY_LEN: usize = 33;

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Invalid public key: {0}")]
    InvalidKey(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Descriptor error: {0}")]
    Descriptor(#[from] miniscript::Error),
}

/// The derived 1-of-2 recovery script.
///
/// Never stored; rebuilt from the two keys for every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryScript {
    /// Key printed on the recovery sheet (first in the script)
    pub recovery_key: CompressedPublicKey,
    /// Key of the connected wallet (second in the script)
    pub user_key: CompressedPublicKey,
    /// `OP_1 <recovery> <user> OP_2 OP_CHECKMULTISIG`
    pub witness_script: ScriptBuf,
    /// P2WSH output script committing to `witness_script`
    pub output_script: ScriptBuf,
}

impl RecoveryScript {
    /// Signatures required to spend.
    pub const THRESHOLD: usize = 1;

    /// Build the script from two already-validated keys, recovery key first.
    pub fn new(recovery_key: CompressedPublicKey, user_key: CompressedPublicKey) -> Self {
        let witness_script = Builder::new()
            .push_opcode(OP_PUSHNUM_1)
            .push_key(&PublicKey::from(recovery_key))
            .push_key(&PublicKey::from(user_key))
            .push_opcode(OP_PUSHNUM_2)
            .push_opcode(OP_CHECKMULTISIG)
            .into_script();
        let output_script = witness_script.to_p2wsh();

        Self {
            recovery_key,
            user_key,
            witness_script,
            output_script,
        }
    }

    /// Both keys in script order.
    pub fn pubkeys(&self) -> [CompressedPublicKey; 2] {
        [self.recovery_key, self.user_key]
    }

    /// The P2WSH address for this script on `network`.
    pub fn address(&self, network: Network) -> Address {
        Address::p2wsh(&self.witness_script, network)
    }

    /// Whether `script_pubkey` is the P2WSH output of this script.
    pub fn matches(&self, script_pubkey: &Script) -> bool {
        self.output_script.as_script() == script_pubkey
    }

    /// Output descriptor (`wsh(multi(1,K1,K2))#checksum`) for importing the
    /// script into other wallets.
    ///
    /// Fails when both keys are identical, which miniscript rejects as a
    /// duplicate key even though the raw script is still spendable.
    pub fn descriptor(&self) -> Result<Descriptor<PublicKey>, ScriptError> {
        let desc = format!(
            "wsh(multi(1,{},{}))",
            PublicKey::from(self.recovery_key),
            PublicKey::from(self.user_key)
        );
        Ok(Descriptor::<PublicKey>::from_str(&desc)?)
    }
}

/// Decode a 33-byte compressed public key.
pub fn decode_public_key(bytes: &[u8]) -> Result<CompressedPublicKey, ScriptError> {
    if bytes.len() != COMPRESSED_KEY_LEN {
        return Err(ScriptError::InvalidKey(format!(
            "expected {} bytes, got {}",
            COMPRESSED_KEY_LEN,
            bytes.len()
        )));
    }
    CompressedPublicKey::from_slice(bytes).map_err(|e| ScriptError::InvalidKey(e.to_string()))
}

/// Decode a hex-encoded compressed public key.
pub fn parse_public_key(hex_str: &str) -> Result<CompressedPublicKey, ScriptError> {
    let bytes = hex::decode(hex_str.trim())
        .map_err(|e| ScriptError::InvalidKey(format!("not hex: {}", e)))?;
    decode_public_key(&bytes)
}

/// Derive the recovery script from raw key bytes (recovery key first).
pub fn derive_witness_script(
    recovery_key: &[u8],
    user_key: &[u8],
) -> Result<RecoveryScript, ScriptError> {
    let recovery = decode_public_key(recovery_key)?;
    let user = decode_public_key(user_key)?;
    Ok(RecoveryScript::new(recovery, user))
}

/// Parse an address and check it belongs to `network`.
pub fn parse_address(address: &str, network: Network) -> Result<Address, ScriptError> {
    let unchecked = Address::from_str(address.trim())
        .map_err(|e| ScriptError::InvalidAddress(e.to_string()))?;
    unchecked
        .require_network(network)
        .map_err(|e| ScriptError::InvalidAddress(e.to_string()))
}

/// Decode an address into its output script.
pub fn output_script_for(address: &str, network: Network) -> Result<ScriptBuf, ScriptError> {
    Ok(parse_address(address, network)?.script_pubkey())
}

/// True when `hex_str` decodes to a valid compressed public key. Never panics.
pub fn validate_public_key(hex_str: &str) -> bool {
    parse_public_key(hex_str).is_ok()
}

/// True when `address` is a valid address for `network`. Never panics.
pub fn validate_address(address: &str, network: Network) -> bool {
    parse_address(address, network).is_ok()
}
