//! Rescue Flow
//!
//! Drives one recovery attempt end to end:
//!
//! ```text
//! fetch outputs -> build unsigned sweep -> external signature
//!   -> finalize -> extract -> broadcast
//! ```
//!
//! Chain access and signing are injected ([`rescue_chain`] traits and a
//! [`rescue_signer::SignerAdapter`]), so the same flow runs against
//! mempool.space, Electrum, a browser wallet, a file-exchange signer, or
//! test doubles.

pub mod error;
pub mod orchestrator;

pub use error::{FailureKind, RecoveryError};
pub use orchestrator::{RecoveryOrchestrator, RecoveryReceipt, RecoveryState};
