//! The recovery state machine
//!
//! ```text
//! Idle -> InputsFetched -> Built -> AwaitingSignature -> Signed -> Finalized -> Broadcast
//!   ^                                                                   |
//!   +------------------------ Failed(kind) <----------------------------+ (any step)
//! ```
//!
//! One attempt at a time: [`RecoveryOrchestrator::recover`] takes
//! `&mut self`. Nothing survives a failed attempt; the next call starts over
//! from fetching outputs.

use std::fmt;
use std::sync::Arc;

use bitcoin::consensus::encode::serialize_hex;
use bitcoin::{Amount, Network, Txid};
use serde::{Deserialize, Serialize};

use rescue_chain::{
    explorer_tx_url, Broadcaster, ChainBackend, ChainError, FeeEstimator, OutputSource,
};
use rescue_core::script::decode_public_key;
use rescue_core::{
    build_unsigned_sweep, extract_transaction, finalize_sweep, parse_address, plan_sweep,
    resolve_fee_rate, FeeRate, FeeResolution, RecoveryParams, RecoveryRequest, RecoveryScript,
    SweepError, SweepPlan,
};
use rescue_signer::{SignerAdapter, SignerError, SignerIdentity};

use crate::error::{FailureKind, RecoveryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryState {
    Idle,
    InputsFetched,
    Built,
    AwaitingSignature,
    Signed,
    Finalized,
    Broadcast,
    Failed(FailureKind),
}

impl fmt::Display for RecoveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryState::Failed(kind) => write!(f, "Failed({:?})", kind),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Outcome of a successful attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReceipt {
    pub txid: Txid,
    pub fee: Amount,
    /// Value sent to the wallet
    pub amount: Amount,
    pub input_count: usize,
    pub destination: String,
    /// Network-serialized transaction, hex
    pub raw_tx: String,
    pub explorer_url: String,
}

pub struct RecoveryOrchestrator {
    network: Network,
    outputs: Arc<dyn OutputSource>,
    fees: Arc<dyn FeeEstimator>,
    broadcaster: Arc<dyn Broadcaster>,
    signer: Box<dyn SignerAdapter>,
    state: RecoveryState,
    history: Vec<RecoveryState>,
}

impl RecoveryOrchestrator {
    /// Use one backend for outputs, fees and broadcast.
    pub fn new<C>(network: Network, chain: Arc<C>, signer: Box<dyn SignerAdapter>) -> Self
    where
        C: ChainBackend + 'static,
    {
        Self::from_parts(network, chain.clone(), chain.clone(), chain, signer)
    }

    pub fn from_parts(
        network: Network,
        outputs: Arc<dyn OutputSource>,
        fees: Arc<dyn FeeEstimator>,
        broadcaster: Arc<dyn Broadcaster>,
        signer: Box<dyn SignerAdapter>,
    ) -> Self {
        Self {
            network,
            outputs,
            fees,
            broadcaster,
            signer,
            state: RecoveryState::Idle,
            history: Vec::new(),
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn state(&self) -> RecoveryState {
        self.state
    }

    /// States entered during the latest attempt, in order.
    pub fn history(&self) -> &[RecoveryState] {
        &self.history
    }

    pub fn signer_name(&self) -> &'static str {
        self.signer.name()
    }

    pub fn signer_identity(&self) -> Option<&SignerIdentity> {
        self.signer.identity()
    }

    pub async fn connect_signer(&mut self) -> Result<SignerIdentity, RecoveryError> {
        let identity = self.signer.connect().await?;
        log::info!("{} connected: {}", self.signer.name(), identity.address);
        Ok(identity)
    }

    pub fn disconnect_signer(&mut self) {
        self.signer.disconnect();
        log::info!("{} disconnected", self.signer.name());
    }

    /// Fee rate for an attempt: the user's rate, else the estimator's medium
    /// tier, else the fallback with a warning.
    pub async fn resolve_fee_rate(&self, user: Option<FeeRate>) -> FeeResolution {
        let recommended = match user {
            Some(_) => None,
            None => self.fees.fetch_recommended_rate().await,
        };
        resolve_fee_rate(user, recommended)
    }

    /// Fetch the locked outputs and compute the sweep amounts without
    /// building or signing anything.
    pub async fn preview(&self, params: &RecoveryParams) -> Result<SweepPlan, RecoveryError> {
        let outputs = self
            .outputs
            .fetch_outputs(&params.multisig_address)
            .await
            .map_err(RecoveryError::Chain)?;
        Ok(plan_sweep(&outputs, params.fee_rate)?)
    }

    /// Run one full attempt: fetch, build, sign, finalize, broadcast.
    ///
    /// The destination and the user key come from the connected signer.
    pub async fn recover(
        &mut self,
        params: &RecoveryParams,
    ) -> Result<RecoveryReceipt, RecoveryError> {
        self.history.clear();
        self.state = RecoveryState::Idle;

        match self.attempt(params).await {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                let kind = e.kind();
                if e.is_user_rejection() {
                    log::info!("Recovery cancelled in {}", self.signer.name());
                } else {
                    log::error!("Recovery failed: {}", e);
                }
                self.transition(RecoveryState::Failed(kind));
                self.transition(RecoveryState::Idle);
                Err(e)
            }
        }
    }

    fn transition(&mut self, next: RecoveryState) {
        log::info!("Recovery: {} -> {}", self.state, next);
        self.state = next;
        self.history.push(next);
    }

    async fn attempt(&mut self, params: &RecoveryParams) -> Result<RecoveryReceipt, RecoveryError> {
        let identity = self
            .signer
            .identity()
            .cloned()
            .ok_or(SignerError::NotConnected)?;
        let user_key = decode_public_key(&identity.public_key)?;
        let destination = parse_address(&identity.address, self.network)?;
        let request = RecoveryRequest::new(params, destination);

        let script = RecoveryScript::new(request.recovery_key, user_key);
        let multisig_script = request.multisig_address.script_pubkey();
        if !script.matches(&multisig_script) {
            log::warn!(
                "{} is not the P2WSH of the recovery key and the connected wallet key (expected {})",
                request.multisig_address,
                script.address(self.network)
            );
        }

        // Idle -> InputsFetched
        let outputs = self
            .outputs
            .fetch_outputs(&request.multisig_address)
            .await
            .map_err(RecoveryError::Chain)?;
        if outputs.is_empty() {
            return Err(SweepError::NoInputs.into());
        }
        self.transition(RecoveryState::InputsFetched);

        // InputsFetched -> Built
        let sweep = build_unsigned_sweep(
            &outputs,
            &script,
            &multisig_script,
            &request.destination,
            request.fee_rate,
        )?;
        let plan = sweep.plan;
        log::info!(
            "Sweeping {} from {} input(s), fee {} at {}",
            plan.final_amount,
            plan.input_count,
            plan.fee,
            plan.fee_rate
        );
        self.transition(RecoveryState::Built);

        // Built -> AwaitingSignature -> Signed
        let indices: Vec<u32> = (0..sweep.psbt.inputs.len() as u32).collect();
        self.transition(RecoveryState::AwaitingSignature);
        let mut signed = self.signer.sign_inputs(&sweep.psbt, &indices).await?;
        self.transition(RecoveryState::Signed);

        // Signed -> Finalized
        finalize_sweep(&mut signed, &script)?;
        self.transition(RecoveryState::Finalized);

        // Finalized -> Broadcast
        let tx = extract_transaction(signed)?;
        let raw_tx = serialize_hex(&tx);
        let txid = self
            .broadcaster
            .broadcast(&tx)
            .await
            .map_err(|e| match e {
                e @ ChainError::BroadcastRejected(_) => RecoveryError::Broadcast(e),
                // No verdict from the relay; the transaction may still be out there
                other => RecoveryError::Chain(other),
            })?;
        self.transition(RecoveryState::Broadcast);

        let explorer_url = explorer_tx_url(self.network, &txid);
        log::info!("Recovery broadcast: {}", explorer_url);

        Ok(RecoveryReceipt {
            txid,
            fee: plan.fee,
            amount: plan.final_amount,
            input_count: plan.input_count,
            destination: request.destination.to_string(),
            raw_tx,
            explorer_url,
        })
    }
}
