//! Finalization and extraction of a signed sweep
//!
//! Each input must carry one ECDSA signature from either script key. The
//! signature is checked against the BIP-143 sighash before the witness is
//! materialized:
//!
//! ```text
//! witness = [ <empty>, <sig>, <witness_script> ]
//! ```
//!
//! The empty element is the extra stack item consumed by the
//! `CHECKMULTISIG` off-by-one.

use bitcoin::ecdsa::Signature;
use bitcoin::hashes::Hash;
use bitcoin::psbt::{Input, Psbt};
use bitcoin::secp256k1::{Message, Secp256k1, Verification};
use bitcoin::sighash::SighashCache;
use bitcoin::{PublicKey, Transaction, Witness};
use thiserror::Error;

use crate::script::RecoveryScript;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FinalizeError {
    #[error("Input {index} cannot be finalized: {reason}")]
    Input { index: usize, reason: String },

    #[error("Transaction extraction failed: {0}")]
    Extract(String),
}

impl FinalizeError {
    fn input(index: usize, reason: impl Into<String>) -> Self {
        Self::Input {
            index,
            reason: reason.into(),
        }
    }
}

/// Finalize every input of a signed sweep in place.
///
/// Inputs the wallet already finalized are re-verified and kept as-is.
pub fn finalize_sweep(psbt: &mut Psbt, script: &RecoveryScript) -> Result<(), FinalizeError> {
    let secp = Secp256k1::verification_only();
    let tx = psbt.unsigned_tx.clone();
    let mut cache = SighashCache::new(&tx);

    for (index, input) in psbt.inputs.iter_mut().enumerate() {
        if let Some(witness) = &input.final_script_witness {
            check_final_witness(&secp, &mut cache, index, input, witness, script)?;
            log::debug!("Input {} already finalized by signer", index);
            continue;
        }

        let sig = select_signature(&secp, &mut cache, index, input, script)?;
        input.final_script_witness = Some(Witness::from_slice(&[
            Vec::new(),
            sig.to_vec(),
            script.witness_script.to_bytes(),
        ]));

        // BIP-174 finalizer: drop everything but the UTXO and the final fields
        input.partial_sigs.clear();
        input.sighash_type = None;
        input.redeem_script = None;
        input.witness_script = None;
        input.bip32_derivation.clear();
    }

    Ok(())
}

/// Extract the network-serializable transaction from a finalized PSBT.
pub fn extract_transaction(psbt: Psbt) -> Result<Transaction, FinalizeError> {
    psbt.extract_tx()
        .map_err(|e| FinalizeError::Extract(e.to_string()))
}

/// Finalize then extract.
pub fn finalize_and_extract(
    mut psbt: Psbt,
    script: &RecoveryScript,
) -> Result<Transaction, FinalizeError> {
    finalize_sweep(&mut psbt, script)?;
    extract_transaction(psbt)
}

fn select_signature<C: Verification>(
    secp: &Secp256k1<C>,
    cache: &mut SighashCache<&Transaction>,
    index: usize,
    input: &Input,
    script: &RecoveryScript,
) -> Result<Signature, FinalizeError> {
    if let Some(ws) = &input.witness_script {
        if ws != &script.witness_script {
            return Err(FinalizeError::input(index, "witness script was altered"));
        }
    }

    for key in script.pubkeys() {
        if let Some(sig) = input.partial_sigs.get(&PublicKey::from(key)) {
            verify_signature(secp, cache, index, input, &key.into(), sig, script)?;
            return Ok(*sig);
        }
    }

    Err(FinalizeError::input(
        index,
        "no signature from either script key",
    ))
}

fn check_final_witness<C: Verification>(
    secp: &Secp256k1<C>,
    cache: &mut SighashCache<&Transaction>,
    index: usize,
    input: &Input,
    witness: &Witness,
    script: &RecoveryScript,
) -> Result<(), FinalizeError> {
    let items: Vec<&[u8]> = witness.iter().collect();
    if items.len() != 3 || !items[0].is_empty() {
        return Err(FinalizeError::input(index, "unexpected witness shape"));
    }
    if items[2] != script.witness_script.as_bytes() {
        return Err(FinalizeError::input(index, "witness script was altered"));
    }

    let sig = Signature::from_slice(items[1])
        .map_err(|e| FinalizeError::input(index, format!("bad signature encoding: {}", e)))?;

    let valid = script.pubkeys().iter().any(|key| {
        verify_signature(secp, cache, index, input, &(*key).into(), &sig, script).is_ok()
    });
    if !valid {
        return Err(FinalizeError::input(
            index,
            "signature does not match either script key",
        ));
    }
    Ok(())
}

fn verify_signature<C: Verification>(
    secp: &Secp256k1<C>,
    cache: &mut SighashCache<&Transaction>,
    index: usize,
    input: &Input,
    key: &PublicKey,
    sig: &Signature,
    script: &RecoveryScript,
) -> Result<(), FinalizeError> {
    let utxo = input
        .witness_utxo
        .as_ref()
        .ok_or_else(|| FinalizeError::input(index, "missing witness UTXO"))?;

    let sighash = cache
        .p2wsh_signature_hash(index, &script.witness_script, utxo.value, sig.sighash_type)
        .map_err(|e| FinalizeError::input(index, e.to_string()))?;
    let msg = Message::from_digest(sighash.to_byte_array());

    secp.verify_ecdsa(&msg, &sig.signature, &key.inner)
        .map_err(|_| FinalizeError::input(index, "signature does not satisfy the script"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fee::FeeRate;
    use crate::sweep::build_unsigned_sweep;
    use crate::test_utils::{
        sign_inputs, test_destination, test_keypair, test_outputs, test_script,
    };
    use bitcoin::{Amount, EcdsaSighashType, Network};

    fn unsigned(values: &[u64]) -> (Psbt, RecoveryScript) {
        let script = test_script();
        let sweep = build_unsigned_sweep(
            &test_outputs(values),
            &script,
            &script.output_script,
            &test_destination(Network::Bitcoin),
            FeeRate::from_sat_per_vb(2).unwrap(),
        )
        .unwrap();
        (sweep.psbt, script)
    }

    #[test]
    fn test_finalize_with_user_key() {
        let (mut psbt, script) = unsigned(&[60_000, 40_000]);
        let (user_sk, _) = test_keypair(2);
        sign_inputs(&mut psbt, &user_sk, &[0, 1]);

        let tx = finalize_and_extract(psbt, &script).unwrap();
        assert_eq!(tx.input.len(), 2);
        assert_eq!(tx.output.len(), 1);
        for txin in &tx.input {
            assert_eq!(txin.witness.len(), 3);
            assert!(txin.witness.nth(0).unwrap().is_empty());
            assert_eq!(txin.witness.nth(2).unwrap(), script.witness_script.as_bytes());
        }
    }

    #[test]
    fn test_finalize_with_recovery_key() {
        let (mut psbt, script) = unsigned(&[60_000]);
        let (recovery_sk, _) = test_keypair(1);
        sign_inputs(&mut psbt, &recovery_sk, &[0]);

        assert!(finalize_and_extract(psbt, &script).is_ok());
    }

    #[test]
    fn test_finalize_clears_signing_fields() {
        let (mut psbt, script) = unsigned(&[60_000]);
        let (user_sk, _) = test_keypair(2);
        sign_inputs(&mut psbt, &user_sk, &[0]);

        finalize_sweep(&mut psbt, &script).unwrap();
        assert!(psbt.inputs[0].partial_sigs.is_empty());
        assert!(psbt.inputs[0].witness_script.is_none());
        assert!(psbt.inputs[0].final_script_witness.is_some());
        assert!(psbt.inputs[0].witness_utxo.is_some());
    }

    #[test]
    fn test_unsigned_input_fails() {
        let (mut psbt, script) = unsigned(&[60_000, 40_000]);
        let (user_sk, _) = test_keypair(2);
        sign_inputs(&mut psbt, &user_sk, &[0]);

        let err = finalize_and_extract(psbt, &script).unwrap_err();
        assert!(matches!(err, FinalizeError::Input { index: 1, .. }));
    }

    #[test]
    fn test_foreign_key_signature_fails() {
        let (mut psbt, script) = unsigned(&[60_000]);
        let (stranger_sk, _) = test_keypair(9);
        sign_inputs(&mut psbt, &stranger_sk, &[0]);

        let err = finalize_and_extract(psbt, &script).unwrap_err();
        assert!(matches!(err, FinalizeError::Input { index: 0, .. }));
    }

    #[test]
    fn test_signature_over_other_value_fails() {
        let (mut psbt, script) = unsigned(&[60_000]);
        let (user_sk, _) = test_keypair(2);
        sign_inputs(&mut psbt, &user_sk, &[0]);

        // Lie about the spent amount after signing: sighash no longer matches
        psbt.inputs[0].witness_utxo.as_mut().unwrap().value = Amount::from_sat(61_000);
        let err = finalize_and_extract(psbt, &script).unwrap_err();
        assert_eq!(
            err,
            FinalizeError::Input {
                index: 0,
                reason: "signature does not satisfy the script".into()
            }
        );
    }

    #[test]
    fn test_prefinalized_input_kept() {
        let (mut psbt, script) = unsigned(&[60_000, 40_000]);
        let (user_sk, _) = test_keypair(2);
        sign_inputs(&mut psbt, &user_sk, &[0, 1]);

        // Wallet finalized input 0 on its own
        let mut first = psbt.clone();
        finalize_sweep(&mut first, &script).unwrap();
        psbt.inputs[0] = first.inputs[0].clone();

        let tx = finalize_and_extract(psbt, &script).unwrap();
        assert_eq!(tx.input[0].witness, first.inputs[0].final_script_witness.clone().unwrap());
    }

    #[test]
    fn test_tampered_final_witness_rejected() {
        let (mut psbt, script) = unsigned(&[60_000]);
        psbt.inputs[0].final_script_witness = Some(Witness::from_slice(&[
            Vec::new(),
            vec![0x30, 0x01],
            script.witness_script.to_bytes(),
        ]));
        assert!(finalize_sweep(&mut psbt, &script).is_err());
    }

    #[test]
    fn test_sighash_single_signature_verified_with_its_own_flag() {
        let (mut psbt, script) = unsigned(&[60_000]);
        let (user_sk, _) = test_keypair(2);
        crate::test_utils::sign_inputs_with_sighash(
            &mut psbt,
            &user_sk,
            &[0],
            EcdsaSighashType::Single,
        );
        assert!(finalize_and_extract(psbt, &script).is_ok());
    }

    #[test]
    fn test_consensus_verification() {
        // Run the extracted sweep through libbitcoinconsensus: the witness must
        // satisfy the P2WSH 1-of-2 script for every input.
        let values = [75_000u64, 25_000, 5_000];
        let (mut psbt, script) = unsigned(&values);
        let (user_sk, _) = test_keypair(2);
        sign_inputs(&mut psbt, &user_sk, &[0, 1, 2]);

        let tx = finalize_and_extract(psbt, &script).unwrap();
        let tx_bytes = bitcoin::consensus::serialize(&tx);

        for (i, value) in values.iter().enumerate() {
            let result = bitcoinconsensus::verify(
                script.output_script.as_bytes(),
                *value,
                &tx_bytes,
                None,
                i,
            );
            assert!(
                result.is_ok(),
                "consensus verification failed for input {}: {:?}",
                i,
                result.err()
            );
        }
    }
}
