//! Unsigned sweep construction
//!
//! Spends every locked output into a single output paying the connected
//! wallet. Input `i` of the PSBT always spends `inputs[i]`; signers are told
//! which inputs to sign by index, so this ordering is part of the contract.

use bitcoin::absolute::LockTime;
use bitcoin::psbt::Psbt;
use bitcoin::transaction::{Transaction, TxIn, Version};
use bitcoin::{Address, Amount, Script, ScriptBuf, Sequence, TxOut, Witness};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fee::{estimate_sweep_vsize, FeeRate};
use crate::script::RecoveryScript;
use crate::types::SpendableOutput;

/// Outputs below this value are non-standard and will not relay.
pub const DUST_LIMIT: Amount = Amount::from_sat(546);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SweepError {
    #[error("No spendable outputs found for this multisig address")]
    NoInputs,

    #[error("Fee of {fee} is higher than available funds ({total})")]
    InsufficientFunds { total: Amount, fee: Amount },

    #[error("PSBT error: {0}")]
    Psbt(String),
}

/// Amounts for a sweep, computed before any PSBT is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepPlan {
    pub input_count: usize,
    pub total: Amount,
    pub estimated_vsize: u64,
    pub fee_rate: FeeRate,
    pub fee: Amount,
    /// Value of the single output
    pub final_amount: Amount,
}

/// Work out the fee and swept amount for `inputs` at `fee_rate`.
pub fn plan_sweep(inputs: &[SpendableOutput], fee_rate: FeeRate) -> Result<SweepPlan, SweepError> {
    if inputs.is_empty() {
        return Err(SweepError::NoInputs);
    }

    let total_sat = inputs
        .iter()
        .try_fold(0u64, |acc, utxo| acc.checked_add(utxo.value.to_sat()))
        .ok_or_else(|| SweepError::Psbt("input total overflows".into()))?;
    let total = Amount::from_sat(total_sat);

    let estimated_vsize = estimate_sweep_vsize(inputs.len());
    let fee = fee_rate.fee_for_vsize(estimated_vsize);

    if fee >= total {
        return Err(SweepError::InsufficientFunds { total, fee });
    }

    Ok(SweepPlan {
        input_count: inputs.len(),
        total,
        estimated_vsize,
        fee_rate,
        fee,
        final_amount: total - fee,
    })
}

/// An unsigned sweep ready to hand to a signer.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedSweep {
    pub psbt: Psbt,
    pub plan: SweepPlan,
}

/// Build the unsigned sweep PSBT.
///
/// # Arguments
/// * `inputs` - outputs to spend, in the order they should appear
/// * `script` - the 1-of-2 recovery script locking every input
/// * `multisig_output_script` - output script of the multisig address
/// * `destination` - address receiving everything minus the fee
/// * `fee_rate` - sat/vB applied to the estimated size
pub fn build_unsigned_sweep(
    inputs: &[SpendableOutput],
    script: &RecoveryScript,
    multisig_output_script: &Script,
    destination: &Address,
    fee_rate: FeeRate,
) -> Result<UnsignedSweep, SweepError> {
    let plan = plan_sweep(inputs, fee_rate)?;

    if plan.final_amount < DUST_LIMIT {
        log::warn!(
            "Swept amount {} is below the dust limit ({}); relays may reject it",
            plan.final_amount,
            DUST_LIMIT
        );
    }

    let tx_inputs: Vec<TxIn> = inputs
        .iter()
        .map(|utxo| TxIn {
            previous_output: utxo.outpoint(),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        })
        .collect();

    let tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: tx_inputs,
        output: vec![TxOut {
            value: plan.final_amount,
            script_pubkey: destination.script_pubkey(),
        }],
    };

    let mut psbt = Psbt::from_unsigned_tx(tx)
        .map_err(|e| SweepError::Psbt(format!("PSBT creation failed: {}", e)))?;

    for (i, utxo) in inputs.iter().enumerate() {
        psbt.inputs[i].witness_utxo = Some(TxOut {
            value: utxo.value,
            script_pubkey: multisig_output_script.to_owned(),
        });
        psbt.inputs[i].witness_script = Some(script.witness_script.clone());
    }

    log::debug!(
        "Built sweep: {} inputs, total {}, fee {} ({} vB est.), output {}",
        plan.input_count,
        plan.total,
        plan.fee,
        plan.estimated_vsize,
        plan.final_amount
    );

    Ok(UnsignedSweep { psbt, plan })
}
