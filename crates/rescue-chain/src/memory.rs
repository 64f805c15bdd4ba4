//! In-memory chain backend for tests.

use std::sync::Mutex;

use async_trait::async_trait;
use bitcoin::{Address, Transaction, Txid};
use rescue_core::{FeeTiers, SpendableOutput};

use crate::error::ChainError;
use crate::{Broadcaster, FeeEstimator, OutputSource};

/// Serves fixed outputs and fee tiers, and records broadcasts.
#[derive(Default)]
pub struct MemoryChain {
    outputs: Vec<SpendableOutput>,
    tiers: Option<FeeTiers>,
    reject_with: Option<String>,
    broadcast_error: Option<String>,
    fetch_error: Option<String>,
    queried: Mutex<Vec<Address>>,
    broadcasts: Mutex<Vec<Transaction>>,
}

impl MemoryChain {
    pub fn new(outputs: Vec<SpendableOutput>) -> Self {
        Self {
            outputs,
            ..Default::default()
        }
    }

    pub fn with_fees(mut self, tiers: FeeTiers) -> Self {
        self.tiers = Some(tiers);
        self
    }

    /// Refuse every broadcast with this relay message.
    pub fn rejecting(mut self, message: impl Into<String>) -> Self {
        self.reject_with = Some(message.into());
        self
    }

    /// Lose every broadcast in transit, without a verdict from the relay.
    pub fn dropping_broadcasts(mut self, message: impl Into<String>) -> Self {
        self.broadcast_error = Some(message.into());
        self
    }

    /// Fail every output lookup.
    pub fn unreachable(mut self, message: impl Into<String>) -> Self {
        self.fetch_error = Some(message.into());
        self
    }

    pub fn queried(&self) -> Vec<Address> {
        self.queried.lock().map(|q| q.clone()).unwrap_or_default()
    }

    pub fn broadcasts(&self) -> Vec<Transaction> {
        self.broadcasts.lock().map(|b| b.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl OutputSource for MemoryChain {
    async fn fetch_outputs(&self, address: &Address) -> Result<Vec<SpendableOutput>, ChainError> {
        if let Ok(mut queried) = self.queried.lock() {
            queried.push(address.clone());
        }
        match &self.fetch_error {
            Some(message) => Err(ChainError::Connection(message.clone())),
            None => Ok(self.outputs.clone()),
        }
    }
}

#[async_trait]
impl FeeEstimator for MemoryChain {
    async fn recommended_fees(&self) -> Result<FeeTiers, ChainError> {
        self.tiers
            .ok_or_else(|| ChainError::UnexpectedResponse("no fee data".into()))
    }
}

#[async_trait]
impl Broadcaster for MemoryChain {
    async fn broadcast(&self, tx: &Transaction) -> Result<Txid, ChainError> {
        if let Some(message) = &self.reject_with {
            return Err(ChainError::BroadcastRejected(message.clone()));
        }
        if let Some(message) = &self.broadcast_error {
            return Err(ChainError::Connection(message.clone()));
        }
        if let Ok(mut broadcasts) = self.broadcasts.lock() {
            broadcasts.push(tx.clone());
        }
        Ok(tx.compute_txid())
    }
}
