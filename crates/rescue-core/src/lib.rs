//! Rescue Core
//!
//! Builds, finalizes and extracts the sweep that empties a 1-of-2 multisig
//! output into a wallet the user controls.
//!
//! # Flow
//!
//! ```text
//! RecoveryScript::new(recovery_key, user_key)
//!   -> build_unsigned_sweep(outputs, script, ..)   // unsigned PSBT
//!   -> (external signer adds one signature per input)
//!   -> finalize_sweep / extract_transaction        // raw transaction
//! ```
//!
//! Nothing here performs I/O or holds private keys.

pub mod fee;
pub mod finalize;
pub mod script;
pub mod sweep;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use fee::{resolve_fee_rate, FeeError, FeeRate, FeeResolution, FeeSource, FeeTiers};
pub use finalize::{extract_transaction, finalize_and_extract, finalize_sweep, FinalizeError};
pub use script::{
    derive_witness_script, output_script_for, parse_address, parse_public_key,
    validate_address, validate_public_key, RecoveryScript, ScriptError,
};
pub use sweep::{build_unsigned_sweep, plan_sweep, SweepError, SweepPlan, UnsignedSweep};
pub use types::{
    FieldError, FormField, RecoveryForm, RecoveryParams, RecoveryRequest, SpendableOutput,
};
