//! Live network checks against public mempool.space and Electrum servers.
//!
//! Run with: `cargo test -p rescue-e2e --test live_integration -- --ignored --nocapture`

use std::sync::Once;
use std::time::Duration;

use bitcoin::Network;

use rescue_chain::electrum::default_server;
use rescue_chain::{
    Broadcaster, ChainError, ElectrumClient, EsploraClient, FeeEstimator, OutputSource,
};
use rescue_core::test_utils::{
    sign_inputs, test_destination, test_keypair, test_outputs, test_script,
};
use rescue_core::{build_unsigned_sweep, finalize_and_extract, FeeRate};

static INIT_CRYPTO: Once = Once::new();

fn init_rustls() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

fn esplora(network: Network) -> EsploraClient {
    EsploraClient::new(network, None, Some(Duration::from_secs(30))).unwrap()
}

// ============================================================================
// Esplora (mempool.space)
// ============================================================================

#[tokio::test]
#[ignore = "requires network access - mempool.space"]
async fn test_mempool_recommended_fees() {
    init_rustls();
    let tiers = esplora(Network::Bitcoin).recommended_fees().await.unwrap();
    println!("  Fees: {:?}", tiers);
    assert!(tiers.fastest_fee >= tiers.economy_fee);
    assert!(tiers.minimum_fee >= 1);
    assert!(tiers.medium().is_some());
}

#[tokio::test]
#[ignore = "requires network access - mempool.space"]
async fn test_mempool_signet_outputs() {
    init_rustls();
    let address = test_script().address(Network::Signet);
    let outputs = esplora(Network::Signet).fetch_outputs(&address).await.unwrap();
    println!("  {} holds {} output(s)", address, outputs.len());
    for output in outputs {
        assert!(output.value.to_sat() > 0);
    }
}

#[tokio::test]
#[ignore = "requires network access - mempool.space"]
async fn test_mempool_signet_rejects_unfunded_sweep() {
    init_rustls();
    let script = test_script();
    let mut psbt = build_unsigned_sweep(
        &test_outputs(&[100_000]),
        &script,
        &script.output_script,
        &test_destination(Network::Signet),
        FeeRate::from_sat_per_vb(2).unwrap(),
    )
    .unwrap()
    .psbt;
    sign_inputs(&mut psbt, &test_keypair(2).0, &[0]);
    let tx = finalize_and_extract(psbt, &script).unwrap();

    match esplora(Network::Signet).broadcast(&tx).await {
        Err(ChainError::BroadcastRejected(message)) => {
            println!("  Rejected: {}", message);
            assert!(!message.is_empty());
        }
        other => panic!("expected a rejection, got {:?}", other),
    }
}

// ============================================================================
// Electrum
// ============================================================================

#[tokio::test]
#[ignore = "requires network access - testnet Electrum"]
async fn test_electrum_testnet_fees_and_outputs() {
    init_rustls();
    let server = default_server(Network::Testnet);
    let client = match ElectrumClient::connect(server, Network::Testnet).await {
        Ok(client) => client,
        Err(e) => {
            println!("  ✗ {} unreachable: {}", server, e);
            return;
        }
    };

    let tiers = client.recommended_fees().await.unwrap();
    println!("  Fees: {:?}", tiers);
    assert!(tiers.minimum_fee >= 1);

    let address = test_script().address(Network::Testnet);
    let outputs = client.fetch_outputs(&address).await.unwrap();
    println!("  {} holds {} output(s)", address, outputs.len());
}
