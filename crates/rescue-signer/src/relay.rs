//! Transport between an adapter and the wallet it drives.
//!
//! Browser wallets live behind injected JavaScript objects (`window.unisat`,
//! `window.btc`, `window.phantom.bitcoin`, ...). A [`WalletRelay`] forwards
//! one method call to such an object and returns its JSON result, so the
//! adapters themselves never touch a browser.
//!
//! [`HttpRelay`] speaks JSON-RPC 2.0 to a local bridge page that owns the
//! wallet objects:
//!
//! ```text
//! -> {"jsonrpc":"2.0","id":"7","method":"unisat.signPsbt","params":[..]}
//! <- {"jsonrpc":"2.0","id":"7","result":"70736274ff..."}
//! <- {"jsonrpc":"2.0","id":"7","error":{"code":4001,"message":"User rejected"}}
//! ```
//!
//! A `-32601` (method not found) error means the wallet object is not
//! injected.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// JSON-RPC code the bridge uses for a missing wallet object.
pub const METHOD_NOT_FOUND: i64 = -32601;

const JSONRPC: &str = "2.0";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayFailure {
    /// The wallet object is not present
    #[error("wallet object '{0}' is not available")]
    Unavailable(String),

    /// The wallet threw or returned an error
    #[error("wallet error{}: {message}", code_suffix(.code))]
    Wallet { code: Option<i64>, message: String },

    /// The relay itself failed (network, malformed response)
    #[error("relay transport error: {0}")]
    Transport(String),
}

impl RelayFailure {
    pub fn wallet(code: Option<i64>, message: impl Into<String>) -> Self {
        Self::Wallet {
            code,
            message: message.into(),
        }
    }
}

fn code_suffix(code: &Option<i64>) -> String {
    code.map(|c| format!(" {}", c)).unwrap_or_default()
}

/// Forwards method calls to a wallet object.
#[async_trait]
pub trait WalletRelay: Send + Sync {
    /// Invoke `method` on the wallet object `target` with `params`.
    async fn call(&self, target: &str, method: &str, params: Value) -> Result<Value, RelayFailure>;
}

/// Call and decode the result into `T`.
pub(crate) async fn call_as<T: DeserializeOwned>(
    relay: &dyn WalletRelay,
    target: &str,
    method: &str,
    params: Value,
) -> Result<T, RelayFailure> {
    let value = relay.call(target, method, params).await?;
    serde_json::from_value(value).map_err(|e| {
        RelayFailure::Transport(format!("unexpected {}.{} response: {}", target, method, e))
    })
}

/// Outcome of a callback-style API (sats-connect `onFinish` / `onCancel`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "event", content = "response", rename_all = "lowercase")]
pub enum Callback<T> {
    Finish(T),
    Cancel,
}

/// Envelope of the sats-connect `request()` API.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RpcStatus<T> {
    Success { result: T },
    Error { error: RpcError },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcError {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

// ============================================================================
// HTTP bridge
// ============================================================================

#[derive(Serialize)]
struct Request<'a> {
    jsonrpc: &'a str,
    id: String,
    method: String,
    params: Value,
}

#[derive(Deserialize)]
struct Response {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

/// JSON-RPC 2.0 client for a wallet bridge.
#[derive(Debug)]
pub struct HttpRelay {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl HttpRelay {
    /// `timeout` bounds each HTTP exchange; `None` waits indefinitely, which
    /// is what a human approving in a wallet popup needs.
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, RelayFailure> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| RelayFailure::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(0),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn handle_response(target: &str, response: Response) -> Result<Value, RelayFailure> {
        match (response.result, response.error) {
            (_, Some(error)) if error.code == METHOD_NOT_FOUND => {
                Err(RelayFailure::Unavailable(target.to_string()))
            }
            (_, Some(error)) => Err(RelayFailure::wallet(Some(error.code), error.message)),
            (Some(result), None) => Ok(result),
            // A void JavaScript method
            (None, None) => Ok(Value::Null),
        }
    }
}

#[async_trait]
impl WalletRelay for HttpRelay {
    async fn call(&self, target: &str, method: &str, params: Value) -> Result<Value, RelayFailure> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = Request {
            jsonrpc: JSONRPC,
            id: id.to_string(),
            method: format!("{}.{}", target, method),
            params,
        };
        log::debug!("relay -> {} (id {})", request.method, request.id);

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RelayFailure::Transport(e.to_string()))?
            .json::<Response>()
            .await
            .map_err(|e| RelayFailure::Transport(e.to_string()))?;

        Self::handle_response(target, response)
    }
}
