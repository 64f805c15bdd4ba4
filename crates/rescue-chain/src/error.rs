use bitcoin::Network;
use thiserror::Error;

/// Errors from chain backends
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Electrum error: {0}")]
    Electrum(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    /// Node/relay refused the transaction; message is the relay's own text
    #[error("{0}")]
    BroadcastRejected(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("No default Esplora endpoint for {0}; configure one explicitly")]
    NoEndpoint(Network),

    #[error("Background task failed: {0}")]
    Task(String),
}
