//! PSBT wire encodings used by the wallets.
//!
//! Unisat, Leather and Wizz take hex; Xverse and Magic Eden take base64;
//! Phantom takes raw bytes.

use base64::prelude::*;
use bitcoin::psbt::Psbt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid PSBT: {0}")]
    Psbt(#[from] bitcoin::psbt::Error),

    #[error("unrecognized PSBT encoding")]
    Unrecognized,
}

pub fn to_hex(psbt: &Psbt) -> String {
    hex::encode(psbt.serialize())
}

pub fn from_hex(s: &str) -> Result<Psbt, CodecError> {
    let bytes = hex::decode(s.trim())?;
    from_bytes(&bytes)
}

pub fn to_base64(psbt: &Psbt) -> String {
    BASE64_STANDARD.encode(psbt.serialize())
}

pub fn from_base64(s: &str) -> Result<Psbt, CodecError> {
    let bytes = BASE64_STANDARD.decode(s.trim())?;
    from_bytes(&bytes)
}

pub fn to_bytes(psbt: &Psbt) -> Vec<u8> {
    psbt.serialize()
}

pub fn from_bytes(bytes: &[u8]) -> Result<Psbt, CodecError> {
    Ok(Psbt::deserialize(bytes)?)
}

/// Accept either text encoding (files written by hand or by other tools).
///
/// Hex is tried first: a valid hex PSBT starts with `70736274ff`, which is
/// never valid base64 of a PSBT.
pub fn from_text(s: &str) -> Result<Psbt, CodecError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(CodecError::Unrecognized);
    }
    if let Ok(psbt) = from_hex(s) {
        return Ok(psbt);
    }
    from_base64(s)
}
