//! File-exchange signer for hardware or air-gapped wallets.
//!
//! ```text
//! unsigned_path  <- base64 PSBT written here
//!   (operator signs it elsewhere)
//! signed_path    -> signed PSBT read back (base64 or hex)
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bitcoin::psbt::Psbt;
use serde::{Deserialize, Serialize};

use crate::adapter::{Session, SignerAdapter, SignerError, SignerIdentity};
use crate::codec;

/// Waits for the operator between writing and reading the PSBT files.
#[async_trait]
pub trait ManualPrompt: Send + Sync {
    /// Returns `false` if the operator cancels.
    async fn await_signed(&self, unsigned_path: &Path, signed_path: &Path) -> bool;
}

/// Where the files live and which account signs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualSignerConfig {
    pub unsigned_path: PathBuf,
    pub signed_path: PathBuf,
    /// Payment address of the signing account (sweep destination)
    pub address: String,
    /// Compressed public key of that account, hex
    pub public_key: String,
}

pub struct ManualSigner {
    config: ManualSignerConfig,
    prompt: Box<dyn ManualPrompt>,
    session: Session,
}

impl ManualSigner {
    pub fn new(config: ManualSignerConfig, prompt: Box<dyn ManualPrompt>) -> Self {
        Self {
            config,
            prompt,
            session: Session::default(),
        }
    }

    pub fn config(&self) -> &ManualSignerConfig {
        &self.config
    }
}

#[async_trait]
impl SignerAdapter for ManualSigner {
    fn name(&self) -> &'static str {
        "Manual"
    }

    fn identity(&self) -> Option<&SignerIdentity> {
        self.session.identity()
    }

    async fn connect(&mut self) -> Result<SignerIdentity, SignerError> {
        if self.config.address.trim().is_empty() {
            return Err(SignerError::ConnectionError(
                "manual signer has no address configured".into(),
            ));
        }
        let identity =
            SignerIdentity::from_hex(self.config.address.trim(), &self.config.public_key)?;
        if identity.public_key.len() != rescue_core::script::COMPRESSED_KEY_LEN {
            return Err(SignerError::ConnectionError(format!(
                "manual signer public key must be {} bytes",
                rescue_core::script::COMPRESSED_KEY_LEN
            )));
        }
        log::info!("Manual signer ready for {}", identity.address);
        Ok(self.session.establish(identity))
    }

    async fn request_signature(
        &self,
        _identity: &SignerIdentity,
        psbt: &Psbt,
        indices: &[u32],
    ) -> Result<Psbt, SignerError> {
        let unsigned = &self.config.unsigned_path;
        let signed = &self.config.signed_path;

        // A signed file from an earlier attempt must not answer this one
        match tokio::fs::remove_file(signed).await {
            Ok(()) => log::debug!("Removed stale {}", signed.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(SignerError::SigningFailed(format!(
                    "cannot clear {}: {}",
                    signed.display(),
                    e
                )))
            }
        }

        tokio::fs::write(unsigned, format!("{}\n", codec::to_base64(psbt)))
            .await
            .map_err(|e| {
                SignerError::SigningFailed(format!("cannot write {}: {}", unsigned.display(), e))
            })?;
        log::info!(
            "Unsigned PSBT written to {}; sign inputs {:?} and save the result to {}",
            unsigned.display(),
            indices,
            signed.display()
        );

        if !self.prompt.await_signed(unsigned, signed).await {
            return Err(SignerError::UserRejected);
        }

        let text = match tokio::fs::read_to_string(signed).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(SignerError::UserRejected),
            Err(e) => {
                return Err(SignerError::SigningFailed(format!(
                    "cannot read {}: {}",
                    signed.display(),
                    e
                )))
            }
        };
        if text.trim().is_empty() {
            return Err(SignerError::UserRejected);
        }

        codec::from_text(&text).map_err(|e| {
            SignerError::SigningFailed(format!("signed PSBT file is unreadable: {}", e))
        })
    }

    fn disconnect(&mut self) {
        self.session.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::Network;
    use rescue_core::test_utils::{
        sign_inputs, test_destination, test_keypair, test_outputs, test_script,
    };
    use rescue_core::{build_unsigned_sweep, FeeRate};

    /// Plays the operator: signs the unsigned file with key 2, or declines.
    struct Operator {
        approve: bool,
        write_hex: bool,
    }

    #[async_trait]
    impl ManualPrompt for Operator {
        async fn await_signed(&self, unsigned_path: &Path, signed_path: &Path) -> bool {
            if !self.approve {
                return false;
            }
            let text = std::fs::read_to_string(unsigned_path).unwrap();
            let mut psbt = codec::from_base64(&text).unwrap();
            let (sk, _) = test_keypair(2);
            let all: Vec<usize> = (0..psbt.inputs.len()).collect();
            sign_inputs(&mut psbt, &sk, &all);
            let out = if self.write_hex {
                codec::to_hex(&psbt)
            } else {
                codec::to_base64(&psbt)
            };
            std::fs::write(signed_path, out).unwrap();
            true
        }
    }

    fn config(dir: &Path) -> ManualSignerConfig {
        let (_, pk) = test_keypair(2);
        ManualSignerConfig {
            unsigned_path: dir.join("unsigned.psbt"),
            signed_path: dir.join("signed.psbt"),
            address: test_destination(Network::Bitcoin).to_string(),
            public_key: pk.to_string(),
        }
    }

    fn psbt() -> Psbt {
        let script = test_script();
        build_unsigned_sweep(
            &test_outputs(&[30_000, 20_000]),
            &script,
            &script.output_script,
            &test_destination(Network::Bitcoin),
            FeeRate::MIN,
        )
        .unwrap()
        .psbt
    }

    #[tokio::test]
    async fn test_round_trip_through_files() {
        for write_hex in [false, true] {
            let dir = tempfile::tempdir().unwrap();
            let mut signer = ManualSigner::new(
                config(dir.path()),
                Box::new(Operator { approve: true, write_hex }),
            );
            signer.connect().await.unwrap();

            let unsigned = psbt();
            let signed = signer.sign_inputs(&unsigned, &[0, 1]).await.unwrap();
            assert_eq!(signed.unsigned_tx, unsigned.unsigned_tx);
            assert!(signed.inputs.iter().all(|i| i.partial_sigs.len() == 1));
        }
    }

    #[tokio::test]
    async fn test_declined_prompt_is_user_rejection() {
        let dir = tempfile::tempdir().unwrap();
        let mut signer = ManualSigner::new(
            config(dir.path()),
            Box::new(Operator { approve: false, write_hex: false }),
        );
        signer.connect().await.unwrap();
        let err = signer.sign_inputs(&psbt(), &[0, 1]).await.unwrap_err();
        assert_eq!(err, SignerError::UserRejected);
        // The unsigned file is still left behind for the operator
        assert!(dir.path().join("unsigned.psbt").exists());
    }

    struct Shrug;

    #[async_trait]
    impl ManualPrompt for Shrug {
        async fn await_signed(&self, _: &Path, signed_path: &Path) -> bool {
            std::fs::write(signed_path, "  \n").unwrap();
            true
        }
    }

    #[tokio::test]
    async fn test_empty_response_is_user_rejection() {
        let dir = tempfile::tempdir().unwrap();
        let mut signer = ManualSigner::new(config(dir.path()), Box::new(Shrug));
        signer.connect().await.unwrap();
        let err = signer.sign_inputs(&psbt(), &[0]).await.unwrap_err();
        assert_eq!(err, SignerError::UserRejected);
    }

    /// Presses Enter without exporting anything.
    struct Impatient;

    #[async_trait]
    impl ManualPrompt for Impatient {
        async fn await_signed(&self, _: &Path, _: &Path) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_leftover_signed_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());

        // Signed file from an earlier attempt over different outputs
        let mut stale = build_unsigned_sweep(
            &test_outputs(&[70_000]),
            &test_script(),
            &test_script().output_script,
            &test_destination(Network::Bitcoin),
            FeeRate::MIN,
        )
        .unwrap()
        .psbt;
        sign_inputs(&mut stale, &test_keypair(2).0, &[0]);
        std::fs::write(&cfg.signed_path, codec::to_base64(&stale)).unwrap();

        let mut signer = ManualSigner::new(cfg, Box::new(Impatient));
        signer.connect().await.unwrap();
        let err = signer.sign_inputs(&psbt(), &[0, 1]).await.unwrap_err();
        assert_eq!(err, SignerError::UserRejected);
        assert!(!dir.path().join("signed.psbt").exists());
    }

    #[tokio::test]
    async fn test_bad_config_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.public_key = "02abcd".into();
        let mut signer = ManualSigner::new(cfg, Box::new(Shrug));
        assert!(matches!(
            signer.connect().await,
            Err(SignerError::ConnectionError(_))
        ));
        assert!(signer.identity().is_none());
    }

    #[tokio::test]
    async fn test_not_connected() {
        let dir = tempfile::tempdir().unwrap();
        let signer = ManualSigner::new(config(dir.path()), Box::new(Shrug));
        assert_eq!(
            signer.sign_inputs(&psbt(), &[0]).await.unwrap_err(),
            SignerError::NotConnected
        );
    }
}
