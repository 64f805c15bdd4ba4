//! End-to-end sweeps across all crates.
//!
//! These tests run fully offline:
//! 1. A browser wallet reached over the HTTP JSON-RPC bridge
//! 2. The manual file-exchange signer
//! 3. Every input of the result passes libbitcoinconsensus

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use bitcoin::{Amount, Network, Transaction};
use serde_json::{json, Value};

use rescue_chain::memory::MemoryChain;
use rescue_core::test_utils::{
    sign_inputs, test_destination, test_keypair, test_outputs, test_script,
};
use rescue_core::{FeeRate, RecoveryParams};
use rescue_flow::{FailureKind, RecoveryOrchestrator, RecoveryState};
use rescue_signer::{
    codec, create_signer, HttpRelay, ManualPrompt, ManualSigner, ManualSignerConfig, SignerAdapter,
    WalletKind,
};

fn params(fee_rate: u32) -> RecoveryParams {
    RecoveryParams {
        recovery_key: test_keypair(1).1,
        multisig_address: test_script().address(Network::Bitcoin),
        fee_rate: FeeRate::from_sat_per_vb(fee_rate).unwrap(),
    }
}

fn assert_consensus_valid(tx: &Transaction, values: &[u64]) {
    let tx_bytes = bitcoin::consensus::serialize(tx);
    let spk = test_script().output_script;
    for (i, value) in values.iter().enumerate() {
        bitcoinconsensus::verify(spk.as_bytes(), *value, &tx_bytes, None, i)
            .unwrap_or_else(|e| panic!("input {} rejected: {:?}", i, e));
    }
}

// ============================================================================
// 1. Wallet bridge over HTTP
// ============================================================================

/// A bridge page hosting only Unisat, signing with key 2.
#[derive(Clone, Default)]
struct Bridge {
    decline: bool,
    sign_requests: Arc<AtomicUsize>,
}

fn rpc_error(id: Value, code: i64, message: &str) -> Json<Value> {
    Json(json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}}))
}

async fn bridge_rpc(State(bridge): State<Bridge>, Json(req): Json<Value>) -> Json<Value> {
    let id = req["id"].clone();
    let result = match req["method"].as_str().unwrap_or_default() {
        "unisat.requestAccounts" => json!([test_destination(Network::Bitcoin).to_string()]),
        "unisat.getPublicKey" => json!(hex::encode(test_keypair(2).1.to_bytes())),
        "unisat.signPsbt" => {
            bridge.sign_requests.fetch_add(1, Ordering::SeqCst);
            if bridge.decline {
                return rpc_error(id, 4001, "User rejected the request.");
            }
            let mut psbt = codec::from_hex(req["params"][0].as_str().unwrap()).unwrap();
            let indices: Vec<usize> = req["params"][1]["toSignInputs"]
                .as_array()
                .unwrap()
                .iter()
                .map(|entry| entry["index"].as_u64().unwrap() as usize)
                .collect();
            sign_inputs(&mut psbt, &test_keypair(2).0, &indices);
            json!(codec::to_hex(&psbt))
        }
        _ => return rpc_error(id, -32601, "Method not found"),
    };
    Json(json!({"jsonrpc": "2.0", "id": id, "result": result}))
}

async fn serve_bridge(bridge: Bridge) -> String {
    let app = Router::new()
        .route("/rpc", post(bridge_rpc))
        .with_state(bridge);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/rpc", addr)
}

fn bridged(url: &str, kind: WalletKind, chain: Arc<MemoryChain>) -> RecoveryOrchestrator {
    let relay = Arc::new(HttpRelay::new(url, None).unwrap());
    RecoveryOrchestrator::new(Network::Bitcoin, chain, create_signer(kind, relay, Network::Bitcoin))
}

#[tokio::test]
async fn test_sweep_through_http_bridge() {
    let values = [100_000u64, 50_000];
    let bridge = Bridge::default();
    let url = serve_bridge(bridge.clone()).await;
    let chain = Arc::new(MemoryChain::new(test_outputs(&values)));
    let mut orch = bridged(&url, WalletKind::Unisat, chain.clone());

    let identity = orch.connect_signer().await.unwrap();
    assert_eq!(identity.address, test_destination(Network::Bitcoin).to_string());

    let receipt = orch.recover(&params(10)).await.unwrap();
    assert_eq!(receipt.amount, Amount::from_sat(146_560));
    assert_eq!(bridge.sign_requests.load(Ordering::SeqCst), 1);

    let sent = chain.broadcasts();
    assert_eq!(sent.len(), 1);
    assert_consensus_valid(&sent[0], &values);
}

#[tokio::test]
async fn test_bridge_decline_is_user_rejection() {
    let bridge = Bridge {
        decline: true,
        ..Default::default()
    };
    let url = serve_bridge(bridge).await;
    let chain = Arc::new(MemoryChain::new(test_outputs(&[60_000])));
    let mut orch = bridged(&url, WalletKind::Unisat, chain.clone());
    orch.connect_signer().await.unwrap();

    let err = orch.recover(&params(5)).await.unwrap_err();
    assert!(err.is_user_rejection());
    assert_eq!(orch.state(), RecoveryState::Idle);
    assert!(chain.broadcasts().is_empty());
}

#[tokio::test]
async fn test_bridge_without_wallet_reports_unavailable() {
    let url = serve_bridge(Bridge::default()).await;
    let chain = Arc::new(MemoryChain::new(vec![]));
    for kind in [WalletKind::Phantom, WalletKind::Wizz, WalletKind::Leather] {
        let mut orch = bridged(&url, kind, chain.clone());
        let err = orch.connect_signer().await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::BackendUnavailable, "{}", kind);
    }
}

#[tokio::test]
async fn test_bridge_down_is_connection_error() {
    // Nothing listens on port 9 of localhost
    let relay = Arc::new(HttpRelay::new("http://127.0.0.1:9/rpc", None).unwrap());
    let mut signer = create_signer(WalletKind::Unisat, relay, Network::Bitcoin);
    let err = signer.connect().await.unwrap_err();
    assert!(!err.is_user_rejection());
    assert!(signer.identity().is_none());
}

// ============================================================================
// 2. Manual file exchange
// ============================================================================

/// Reads the exported PSBT, signs it with key 2 and writes it back as hex.
struct Operator;

#[async_trait]
impl ManualPrompt for Operator {
    async fn await_signed(&self, unsigned_path: &Path, signed_path: &Path) -> bool {
        let text = std::fs::read_to_string(unsigned_path).unwrap();
        let mut psbt = codec::from_text(&text).unwrap();
        let indices: Vec<usize> = (0..psbt.inputs.len()).collect();
        sign_inputs(&mut psbt, &test_keypair(2).0, &indices);
        std::fs::write(signed_path, codec::to_hex(&psbt)).unwrap();
        true
    }
}

#[tokio::test]
async fn test_sweep_with_manual_signer() {
    let dir = tempfile::tempdir().unwrap();
    let config = ManualSignerConfig {
        unsigned_path: dir.path().join("sweep.psbt"),
        signed_path: dir.path().join("sweep-signed.psbt"),
        address: test_destination(Network::Bitcoin).to_string(),
        public_key: hex::encode(test_keypair(2).1.to_bytes()),
    };

    let values = [25_000u64, 35_000, 45_000];
    let chain = Arc::new(MemoryChain::new(test_outputs(&values)));
    let signer = Box::new(ManualSigner::new(config, Box::new(Operator)));
    let mut orch = RecoveryOrchestrator::new(Network::Bitcoin, chain.clone(), signer);

    orch.connect_signer().await.unwrap();
    let receipt = orch.recover(&params(4)).await.unwrap();
    assert_eq!(receipt.input_count, 3);
    assert!(dir.path().join("sweep.psbt").exists());
    assert_consensus_valid(&chain.broadcasts()[0], &values);
}
