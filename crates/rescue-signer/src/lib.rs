//! Rescue Signer
//!
//! External signers for the recovery sweep. The private key never enters
//! this process: a browser wallet (reached through a [`WalletRelay`]) or an
//! operator with a hardware device (through [`ManualSigner`]) adds the
//! signatures.
//!
//! ```text
//! SignerAdapter
//!   ├── XverseSigner, UnisatSigner, LeatherSigner,
//!   │   MagicEdenSigner, PhantomSigner, WizzSigner   (via WalletRelay)
//!   └── ManualSigner                                  (via files)
//! ```

pub mod adapter;
pub mod backends;
pub mod codec;
pub mod manual;
pub mod relay;

#[cfg(any(test, feature = "test-utils"))]
pub mod fake;

pub use adapter::{SignerAdapter, SignerError, SignerIdentity, WalletKind};
pub use backends::create_signer;
pub use manual::{ManualPrompt, ManualSigner, ManualSignerConfig};
pub use relay::{HttpRelay, RelayFailure, WalletRelay};
