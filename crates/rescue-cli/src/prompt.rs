//! Terminal prompt for the manual signer.

use std::io::{BufRead, Write};
use std::path::Path;

use async_trait::async_trait;
use rescue_signer::ManualPrompt;

/// Asks the operator on stdin to sign the exported PSBT.
pub struct StdinPrompt;

/// `true` unless the operator typed something starting with `n` or `q`.
pub fn is_confirmation(answer: &str) -> bool {
    !matches!(
        answer.trim().chars().next().map(|c| c.to_ascii_lowercase()),
        Some('n') | Some('q')
    )
}

#[async_trait]
impl ManualPrompt for StdinPrompt {
    async fn await_signed(&self, unsigned_path: &Path, signed_path: &Path) -> bool {
        println!();
        println!("Unsigned PSBT written to {}", unsigned_path.display());
        println!("Sign every input with your wallet and save the result to");
        println!("    {}", signed_path.display());
        print!("Press Enter when done, or type 'n' to cancel: ");
        let _ = std::io::stdout().flush();

        let answer = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            match std::io::stdin().lock().read_line(&mut line) {
                Ok(0) | Err(_) => None,
                Ok(_) => Some(line),
            }
        })
        .await;

        match answer {
            Ok(Some(line)) => is_confirmation(&line),
            // EOF or a dead reader counts as cancel
            _ => false,
        }
    }
}
