//! Shared test utilities for rescue tests.
//!
//! Deterministic keys, fake spendable outputs, and a software signer that
//! produces the same partial signatures a wallet would.

use bitcoin::hashes::Hash;
use bitcoin::psbt::Psbt;
use bitcoin::secp256k1::{Message, Secp256k1, SecretKey};
use bitcoin::sighash::SighashCache;
use bitcoin::{Address, Amount, CompressedPublicKey, EcdsaSighashType, Network, Txid};

use crate::script::RecoveryScript;
use crate::types::SpendableOutput;

/// Generate a deterministic keypair from a seed byte.
///
/// The secret key is `[0x01, 0x00, ..., 0x00, seed]` (32 bytes).
pub fn test_keypair(seed_byte: u8) -> (SecretKey, CompressedPublicKey) {
    let secp = Secp256k1::new();
    let mut secret_bytes = [0u8; 32];
    secret_bytes[31] = seed_byte;
    secret_bytes[0] = 0x01;
    let sk = SecretKey::from_slice(&secret_bytes).unwrap();
    let pk = CompressedPublicKey(sk.public_key(&secp));
    (sk, pk)
}

/// Recovery script with key 1 as the recovery key and key 2 as the user key.
pub fn test_script() -> RecoveryScript {
    let (_, recovery) = test_keypair(1);
    let (_, user) = test_keypair(2);
    RecoveryScript::new(recovery, user)
}

/// P2WPKH address of key 2 (the user wallet).
pub fn test_destination(network: Network) -> Address {
    let (_, user) = test_keypair(2);
    Address::p2wpkh(&user, network)
}

/// One confirmed output per value, each from a distinct fake txid.
pub fn test_outputs(values: &[u64]) -> Vec<SpendableOutput> {
    values
        .iter()
        .enumerate()
        .map(|(i, value)| SpendableOutput {
            txid: Txid::from_byte_array([0xA0 + i as u8; 32]),
            vout: i as u32,
            value: Amount::from_sat(*value),
            confirmed: true,
            block_height: Some(800_000 + i as u32),
        })
        .collect()
}

/// Add a SIGHASH_ALL partial signature from `sk` to each listed input.
pub fn sign_inputs(psbt: &mut Psbt, sk: &SecretKey, indices: &[usize]) {
    sign_inputs_with_sighash(psbt, sk, indices, EcdsaSighashType::All);
}

/// Add a partial signature with an explicit sighash flag.
pub fn sign_inputs_with_sighash(
    psbt: &mut Psbt,
    sk: &SecretKey,
    indices: &[usize],
    sighash_type: EcdsaSighashType,
) {
    let secp = Secp256k1::new();
    let pk = bitcoin::PublicKey::new(sk.public_key(&secp));
    let tx = psbt.unsigned_tx.clone();
    let mut cache = SighashCache::new(&tx);

    for &i in indices {
        let input = &psbt.inputs[i];
        let script = input.witness_script.clone().expect("witness script");
        let value = input.witness_utxo.as_ref().expect("witness utxo").value;
        let sighash = cache
            .p2wsh_signature_hash(i, &script, value, sighash_type)
            .expect("sighash");
        let msg = Message::from_digest(sighash.to_byte_array());
        let signature = secp.sign_ecdsa(&msg, sk);
        psbt.inputs[i].partial_sigs.insert(
            pk,
            bitcoin::ecdsa::Signature {
                signature,
                sighash_type,
            },
        );
    }
}
