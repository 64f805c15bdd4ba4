use rescue_chain::ChainError;
use rescue_core::{FeeError, FinalizeError, ScriptError, SweepError};
use rescue_signer::SignerError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a recovery attempt stopped.
#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Fee(#[from] FeeError),

    #[error(transparent)]
    Sweep(#[from] SweepError),

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error("Finalization failed: {0}")]
    Finalize(#[from] FinalizeError),

    #[error("Broadcast rejected: {0}")]
    Broadcast(ChainError),

    #[error("Chain backend error: {0}")]
    Chain(ChainError),
}

/// Flat classification of [`RecoveryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    InvalidKey,
    InvalidAddress,
    InvalidFeeRate,
    NoInputs,
    InsufficientFunds,
    BackendUnavailable,
    ConnectionError,
    NotConnected,
    UserRejected,
    SigningFailed,
    FinalizationFailed,
    BroadcastRejected,
    Chain,
}

impl RecoveryError {
    pub fn kind(&self) -> FailureKind {
        match self {
            RecoveryError::Script(ScriptError::InvalidAddress(_)) => FailureKind::InvalidAddress,
            RecoveryError::Script(_) => FailureKind::InvalidKey,
            RecoveryError::Fee(FeeError::InvalidFeeRate) => FailureKind::InvalidFeeRate,
            RecoveryError::Sweep(SweepError::NoInputs) => FailureKind::NoInputs,
            RecoveryError::Sweep(SweepError::InsufficientFunds { .. }) => {
                FailureKind::InsufficientFunds
            }
            // Only reachable with nonsensical output values from the backend
            RecoveryError::Sweep(SweepError::Psbt(_)) => FailureKind::Chain,
            RecoveryError::Signer(e) => match e {
                SignerError::BackendUnavailable(_) => FailureKind::BackendUnavailable,
                SignerError::UserRejected => FailureKind::UserRejected,
                SignerError::ConnectionError(_) => FailureKind::ConnectionError,
                SignerError::NotConnected => FailureKind::NotConnected,
                SignerError::SigningFailed(_) => FailureKind::SigningFailed,
            },
            RecoveryError::Finalize(_) => FailureKind::FinalizationFailed,
            RecoveryError::Broadcast(_) => FailureKind::BroadcastRejected,
            RecoveryError::Chain(_) => FailureKind::Chain,
        }
    }

    /// The human declined in the wallet. Not a failure to report as such.
    pub fn is_user_rejection(&self) -> bool {
        self.kind() == FailureKind::UserRejected
    }
}
