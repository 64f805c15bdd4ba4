//! Malformed and hostile input.
//!
//! These tests verify:
//! 1. Key and address parsing rejects bad input without panicking
//! 2. Fee arithmetic cannot overflow into a spendable sweep
//! 3. A wallet cannot smuggle changes into the transaction
//! 4. Signatures from keys outside the script never finalize

use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::psbt::Psbt;
use bitcoin::{Amount, Network, ScriptBuf, TxOut};
use serde_json::{json, Value};

use rescue_core::test_utils::{
    sign_inputs, test_destination, test_keypair, test_outputs, test_script,
};
use rescue_core::{
    build_unsigned_sweep, finalize_and_extract, parse_address, parse_public_key, plan_sweep,
    FeeRate, FinalizeError, SweepError,
};
use rescue_signer::{codec, create_signer, RelayFailure, SignerError, WalletKind, WalletRelay};

// ============================================================================
// 1. Parsing
// ============================================================================

#[test]
fn test_malformed_public_keys_rejected() {
    let (_, pk) = test_keypair(1);
    let good = hex::encode(pk.to_bytes());
    let uncompressed = format!("04{}", "11".repeat(64));
    let bad_prefix = format!("05{}", &good[2..]);
    let x_only = good[2..].to_string();

    for input in [
        "",
        "zz",
        "02",
        &good[..good.len() - 1],
        x_only.as_str(),
        bad_prefix.as_str(),
        uncompressed.as_str(),
        format!("{}00", good).as_str(),
        "\u{0}\u{0}\u{0}",
    ] {
        assert!(parse_public_key(input).is_err(), "accepted {:?}", input);
    }
    assert!(parse_public_key(&format!("  {}\n", good)).is_ok());
}

#[test]
fn test_addresses_bound_to_network() {
    let mainnet = test_script().address(Network::Bitcoin).to_string();
    let testnet = test_script().address(Network::Testnet).to_string();

    assert!(parse_address(&mainnet, Network::Bitcoin).is_ok());
    assert!(parse_address(&mainnet, Network::Testnet).is_err());
    assert!(parse_address(&testnet, Network::Bitcoin).is_err());

    let mut corrupted = mainnet.clone();
    corrupted.pop();
    corrupted.push(if mainnet.ends_with('q') { 'p' } else { 'q' });
    let truncated_upper = mainnet.to_uppercase()[1..].to_string();
    for input in [
        "",
        "bc1",
        "not an address",
        corrupted.as_str(),
        truncated_upper.as_str(),
    ] {
        assert!(parse_address(input, Network::Bitcoin).is_err(), "accepted {:?}", input);
    }
}

#[test]
fn test_garbage_signer_responses_rejected() {
    for input in ["", "   ", "cHNidP8=", "70736274ff", "not base64 !!", "00"] {
        assert!(codec::from_text(input).is_err(), "accepted {:?}", input);
    }
    assert!(codec::from_bytes(&[]).is_err());
    assert!(codec::from_bytes(b"psbt\xff\x00").is_err());
}

// ============================================================================
// 2. Fee arithmetic
// ============================================================================

#[test]
fn test_absurd_fee_rate_is_insufficient_funds() {
    let outputs = test_outputs(&[50_000_000, 50_000_000]);
    let result = plan_sweep(&outputs, FeeRate::from_sat_per_vb(u32::MAX).unwrap());
    assert!(matches!(result, Err(SweepError::InsufficientFunds { .. })));

    // Totals that overflow u64 are refused outright
    let outputs = test_outputs(&[u64::MAX, 1]);
    let result = plan_sweep(&outputs, FeeRate::MIN);
    assert!(matches!(result, Err(SweepError::Psbt(_))));
}

#[test]
fn test_zero_fee_rate_rejected() {
    assert!(FeeRate::from_sat_per_vb(0).is_err());
}

// ============================================================================
// 3. Hostile wallet
// ============================================================================

/// Speaks the Unisat dialect and answers `signPsbt` with `respond`.
struct HostileUnisat {
    respond: fn(Psbt) -> Value,
}

#[async_trait]
impl WalletRelay for HostileUnisat {
    async fn call(
        &self,
        _target: &str,
        method: &str,
        params: Value,
    ) -> Result<Value, RelayFailure> {
        match method {
            "requestAccounts" => Ok(json!([test_destination(Network::Bitcoin).to_string()])),
            "getPublicKey" => Ok(json!(hex::encode(test_keypair(2).1.to_bytes()))),
            "signPsbt" => {
                let psbt = codec::from_hex(params[0].as_str().unwrap()).unwrap();
                Ok((self.respond)(psbt))
            }
            other => Err(RelayFailure::Unavailable(other.to_string())),
        }
    }
}

fn unsigned() -> Psbt {
    let script = test_script();
    build_unsigned_sweep(
        &test_outputs(&[40_000, 30_000]),
        &script,
        &script.output_script,
        &test_destination(Network::Bitcoin),
        FeeRate::from_sat_per_vb(2).unwrap(),
    )
    .unwrap()
    .psbt
}

async fn sign_with(respond: fn(Psbt) -> Value) -> Result<Psbt, SignerError> {
    let relay = Arc::new(HostileUnisat { respond });
    let mut signer = create_signer(WalletKind::Unisat, relay, Network::Bitcoin);
    signer.connect().await?;
    signer.sign_inputs(&unsigned(), &[0, 1]).await
}

#[tokio::test]
async fn test_honest_wallet_accepted() {
    let signed = sign_with(|mut psbt| {
        sign_inputs(&mut psbt, &test_keypair(2).0, &[0, 1]);
        json!(codec::to_hex(&psbt))
    })
    .await
    .unwrap();
    assert_eq!(signed.inputs[0].partial_sigs.len(), 1);
}

#[tokio::test]
async fn test_redirected_output_rejected() {
    let result = sign_with(|mut psbt| {
        psbt.unsigned_tx.output[0].script_pubkey = ScriptBuf::new();
        json!(codec::to_hex(&psbt))
    })
    .await;
    assert!(matches!(result, Err(SignerError::SigningFailed(_))));
}

#[tokio::test]
async fn test_extra_output_rejected() {
    let result = sign_with(|mut psbt| {
        psbt.unsigned_tx.output.push(TxOut {
            value: Amount::from_sat(1_000),
            script_pubkey: test_destination(Network::Bitcoin).script_pubkey(),
        });
        psbt.outputs.push(Default::default());
        json!(codec::to_hex(&psbt))
    })
    .await;
    assert!(matches!(result, Err(SignerError::SigningFailed(_))));
}

#[tokio::test]
async fn test_reordered_inputs_rejected() {
    let result = sign_with(|mut psbt| {
        psbt.unsigned_tx.input.swap(0, 1);
        psbt.inputs.swap(0, 1);
        json!(codec::to_hex(&psbt))
    })
    .await;
    assert!(matches!(result, Err(SignerError::SigningFailed(_))));
}

#[tokio::test]
async fn test_unreadable_response_rejected() {
    for respond in [
        (|_| json!("zz")) as fn(Psbt) -> Value,
        (|_| json!(null)) as fn(Psbt) -> Value,
        (|_| json!({"psbt": "cHNidP8="})) as fn(Psbt) -> Value,
    ] {
        let result = sign_with(respond).await;
        assert!(matches!(result, Err(SignerError::SigningFailed(_))), "{:?}", result);
    }
}

// ============================================================================
// 4. Foreign signatures
// ============================================================================

#[test]
fn test_foreign_key_signature_never_finalizes() {
    let mut psbt = unsigned();
    sign_inputs(&mut psbt, &test_keypair(9).0, &[0, 1]);
    let result = finalize_and_extract(psbt, &test_script());
    assert!(matches!(result, Err(FinalizeError::Input { index: 0, .. })));
}

#[test]
fn test_partially_signed_never_finalizes() {
    let mut psbt = unsigned();
    sign_inputs(&mut psbt, &test_keypair(2).0, &[0]);
    let result = finalize_and_extract(psbt, &test_script());
    assert!(matches!(result, Err(FinalizeError::Input { index: 1, .. })));
}

#[test]
fn test_recovery_key_signature_finalizes() {
    let mut psbt = unsigned();
    sign_inputs(&mut psbt, &test_keypair(1).0, &[0, 1]);
    let tx = finalize_and_extract(psbt, &test_script()).unwrap();
    assert_eq!(tx.input.len(), 2);
    assert_eq!(tx.input[0].witness.len(), 3);
}
