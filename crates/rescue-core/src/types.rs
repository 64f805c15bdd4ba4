//! Data model shared by the sweep builder, the chain clients and the flow.

use bitcoin::{Address, Amount, CompressedPublicKey, Network, OutPoint, Txid};
use serde::{Deserialize, Serialize};

use crate::fee::FeeRate;
use crate::script::{parse_address, parse_public_key};

/// An output locked by the recovery script that has not been spent yet.
///
/// Immutable once fetched. Lives for a single recovery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendableOutput {
    /// Funding transaction
    pub txid: Txid,
    /// Output index within the funding transaction
    pub vout: u32,
    /// Value in satoshis
    pub value: Amount,
    /// Whether the funding transaction is confirmed
    pub confirmed: bool,
    /// Confirmation height, when the source reports one
    pub block_height: Option<u32>,
}

impl SpendableOutput {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint {
            txid: self.txid,
            vout: self.vout,
        }
    }
}

/// Validated parameters of one recovery attempt, before a signer is involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryParams {
    /// The recovery key (first key of the script)
    pub recovery_key: CompressedPublicKey,
    /// Address holding the locked funds
    pub multisig_address: Address,
    pub fee_rate: FeeRate,
}

/// Everything the builder needs, with the destination taken from the
/// connected signer's identity. Built fresh per attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryRequest {
    pub recovery_key: CompressedPublicKey,
    pub multisig_address: Address,
    pub fee_rate: FeeRate,
    pub destination: Address,
}

impl RecoveryRequest {
    pub fn new(params: &RecoveryParams, destination: Address) -> Self {
        Self {
            recovery_key: params.recovery_key,
            multisig_address: params.multisig_address.clone(),
            fee_rate: params.fee_rate,
            destination,
        }
    }
}

/// Form field a validation message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormField {
    PublicKey,
    MultisigAddress,
    FeeRate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: FormField,
    pub message: String,
}

impl FieldError {
    fn new(field: FormField, message: &str) -> Self {
        Self {
            field,
            message: message.to_string(),
        }
    }
}

/// Raw user input, as typed into a form or passed on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryForm {
    /// Recovery public key (hex)
    pub public_key: String,
    pub multisig_address: String,
    /// sat/vB
    pub fee_rate: u32,
}

impl RecoveryForm {
    /// Validate every field, collecting one message per bad field.
    pub fn parse(&self, network: Network) -> Result<RecoveryParams, Vec<FieldError>> {
        let mut errors = Vec::new();

        let recovery_key = if self.public_key.trim().is_empty() {
            errors.push(FieldError::new(
                FormField::PublicKey,
                "Multisig public key is required",
            ));
            None
        } else {
            match parse_public_key(&self.public_key) {
                Ok(key) => Some(key),
                Err(_) => {
                    errors.push(FieldError::new(
                        FormField::PublicKey,
                        "Invalid public key format",
                    ));
                    None
                }
            }
        };

        let multisig_address = if self.multisig_address.trim().is_empty() {
            errors.push(FieldError::new(
                FormField::MultisigAddress,
                "Multisig address is required",
            ));
            None
        } else {
            match parse_address(&self.multisig_address, network) {
                Ok(addr) => Some(addr),
                Err(_) => {
                    errors.push(FieldError::new(
                        FormField::MultisigAddress,
                        "Invalid Bitcoin address",
                    ));
                    None
                }
            }
        };

        let fee_rate = match FeeRate::from_sat_per_vb(self.fee_rate) {
            Ok(rate) => Some(rate),
            Err(_) => {
                errors.push(FieldError::new(
                    FormField::FeeRate,
                    "Fee rate must be at least 1 sat/vB",
                ));
                None
            }
        };

        match (recovery_key, multisig_address, fee_rate) {
            (Some(recovery_key), Some(multisig_address), Some(fee_rate)) if errors.is_empty() => {
                Ok(RecoveryParams {
                    recovery_key,
                    multisig_address,
                    fee_rate,
                })
            }
            _ => Err(errors),
        }
    }
}
