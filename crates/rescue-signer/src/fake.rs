//! Scripted in-process wallet for tests.
//!
//! [`FakeWallet`] answers relay calls in the dialect of one [`WalletKind`],
//! parsing requests as strictly as the real wallet would and signing with a
//! real key, so adapters and the orchestrator can be exercised end to end.

use std::sync::Mutex;

use async_trait::async_trait;
use bitcoin::psbt::Psbt;
use bitcoin::secp256k1::SecretKey;
use bitcoin::{Address, Amount, CompressedPublicKey, Network};
use serde_json::{json, Value};

use rescue_core::test_utils::{sign_inputs, test_keypair};

use crate::adapter::WalletKind;
use crate::backends::{leather, magic_eden, phantom, unisat, wizz, xverse};
use crate::codec;
use crate::relay::{RelayFailure, WalletRelay};

/// How the fake responds to a connect or sign request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeBehavior {
    Approve,
    /// Explicit human decline in the wallet's own dialect
    Reject,
    /// Non-cancellation wallet error
    Fail,
    /// Sign, then alter the transaction (sign only)
    Tamper,
}

pub struct FakeWallet {
    kind: WalletKind,
    secret_key: SecretKey,
    public_key: CompressedPublicKey,
    address: Address,
    installed: bool,
    on_connect: FakeBehavior,
    on_sign: FakeBehavior,
    calls: Mutex<Vec<String>>,
    signed: Mutex<Vec<Vec<u32>>>,
}

impl FakeWallet {
    /// Wallet holding test key 2 (the user key of `test_script()`).
    pub fn new(kind: WalletKind, network: Network) -> Self {
        Self::with_key(kind, network, 2)
    }

    /// Wallet holding `test_keypair(seed)`.
    pub fn with_key(kind: WalletKind, network: Network, seed: u8) -> Self {
        let (secret_key, public_key) = test_keypair(seed);
        Self {
            kind,
            secret_key,
            public_key,
            address: Address::p2wpkh(&public_key, network),
            installed: true,
            on_connect: FakeBehavior::Approve,
            on_sign: FakeBehavior::Approve,
            calls: Mutex::new(Vec::new()),
            signed: Mutex::new(Vec::new()),
        }
    }

    /// Wallet extension not installed.
    pub fn absent(mut self) -> Self {
        self.installed = false;
        self
    }

    pub fn on_connect(mut self, behavior: FakeBehavior) -> Self {
        self.on_connect = behavior;
        self
    }

    pub fn on_sign(mut self, behavior: FakeBehavior) -> Self {
        self.on_sign = behavior;
        self
    }

    pub fn kind(&self) -> WalletKind {
        self.kind
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn public_key(&self) -> CompressedPublicKey {
        self.public_key
    }

    /// `target.method` of every call received, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Index lists of each signing request, as the wallet understood them.
    pub fn signed_indices(&self) -> Vec<Vec<u32>> {
        self.signed.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn target(&self) -> &'static str {
        match self.kind {
            WalletKind::Leather => leather::TARGET,
            WalletKind::MagicEden => magic_eden::TARGET,
            WalletKind::Phantom => phantom::TARGET,
            WalletKind::Unisat => unisat::TARGET,
            WalletKind::Wizz => wizz::TARGET,
            WalletKind::Xverse => xverse::TARGET,
        }
    }

    fn account(&self) -> Value {
        json!({
            "address": self.address.to_string(),
            "publicKey": self.public_key.to_string(),
            "purpose": "payment",
            "addressType": "p2wpkh",
        })
    }

    fn sign(&self, psbt: Psbt, indices: Vec<u32>) -> Result<Psbt, RelayFailure> {
        let mut psbt = psbt;
        let as_usize: Vec<usize> = indices.iter().map(|&i| i as usize).collect();
        if as_usize.iter().any(|&i| i >= psbt.inputs.len()) {
            return Err(malformed("index out of range"));
        }
        sign_inputs(&mut psbt, &self.secret_key, &as_usize);
        if let Ok(mut signed) = self.signed.lock() {
            signed.push(indices);
        }
        if self.on_sign == FakeBehavior::Tamper {
            let out = &mut psbt.unsigned_tx.output[0];
            out.value = out.value.checked_sub(Amount::from_sat(1_000)).unwrap_or(Amount::ZERO);
        }
        Ok(psbt)
    }

    fn connect_reply(&self, method: &str) -> Result<Value, RelayFailure> {
        match (self.kind, self.on_connect) {
            (WalletKind::Xverse, FakeBehavior::Reject) => Ok(json!({
                "status": "error",
                "error": { "code": xverse::USER_REJECTED, "message": "User rejected request" },
            })),
            (WalletKind::MagicEden, FakeBehavior::Reject) => Ok(json!({ "event": "cancel" })),
            (WalletKind::Unisat, FakeBehavior::Reject)
            | (WalletKind::Leather, FakeBehavior::Reject) => {
                Err(RelayFailure::wallet(Some(4001), "User rejected the request."))
            }
            (WalletKind::Phantom, FakeBehavior::Reject) => Err(RelayFailure::wallet(
                Some(phantom::USER_REJECTED),
                "User rejected the request.",
            )),
            (WalletKind::Wizz, FakeBehavior::Reject) => {
                Err(RelayFailure::wallet(None, "User canceled"))
            }
            (_, FakeBehavior::Fail) => Err(RelayFailure::wallet(Some(-32603), "Internal error")),
            _ => Ok(match (self.kind, method) {
                (WalletKind::Xverse, _) => json!({
                    "status": "success",
                    "result": [
                        {
                            "address": "bc1pordinalsplaceholder",
                            "publicKey": self.public_key.to_string(),
                            "purpose": "ordinals",
                        },
                        self.account(),
                    ],
                }),
                (WalletKind::MagicEden, _) => json!({
                    "event": "finish",
                    "response": { "addresses": [self.account()] },
                }),
                (WalletKind::Phantom, _) => json!([self.account()]),
                (WalletKind::Leather, _) => json!({
                    "result": { "addresses": [{
                        "symbol": "BTC",
                        "type": "p2wpkh",
                        "address": self.address.to_string(),
                        "publicKey": self.public_key.to_string(),
                        "derivationPath": "m/84'/0'/2'/0/0",
                    }] },
                }),
                (_, "getPublicKey") => json!(self.public_key.to_string()),
                _ => json!([self.address.to_string()]),
            }),
        }
    }

    fn sign_reply(&self, params: &Value) -> Result<Value, RelayFailure> {
        match (self.kind, self.on_sign) {
            (WalletKind::Xverse, FakeBehavior::Reject)
            | (WalletKind::MagicEden, FakeBehavior::Reject) => {
                return Ok(json!({ "event": "cancel" }))
            }
            (WalletKind::Phantom, FakeBehavior::Reject) => {
                return Err(RelayFailure::wallet(Some(phantom::USER_REJECTED), "User rejected"))
            }
            (WalletKind::Wizz, FakeBehavior::Reject) => {
                return Err(RelayFailure::wallet(None, "User canceled the signing request"))
            }
            (_, FakeBehavior::Reject) => {
                return Err(RelayFailure::wallet(Some(4001), "User rejected the request."))
            }
            (_, FakeBehavior::Fail) => {
                return Err(RelayFailure::wallet(None, "Internal error"));
            }
            _ => {}
        }

        match self.kind {
            WalletKind::Xverse | WalletKind::MagicEden => {
                let psbt = codec::from_base64(str_at(params, "/psbtBase64")?)
                    .map_err(|e| malformed(e.to_string()))?;
                let indices =
                    collect_indices(params, "/inputsToSign", "signingIndexes", &self.address)?;
                let signed = self.sign(psbt, indices)?;
                Ok(json!({
                    "event": "finish",
                    "response": { "psbtBase64": codec::to_base64(&signed) },
                }))
            }
            WalletKind::Unisat => {
                if params.pointer("/1/autoFinalized") != Some(&json!(false)) {
                    return Err(malformed("autoFinalized must be false"));
                }
                let psbt =
                    codec::from_hex(str_at(params, "/0")?).map_err(|e| malformed(e.to_string()))?;
                let indices = collect_indices(params, "/1/toSignInputs", "index", &self.address)?;
                Ok(json!(codec::to_hex(&self.sign(psbt, indices)?)))
            }
            WalletKind::Wizz => {
                let psbt = codec::from_hex(str_at(params, "/0/psbt")?)
                    .map_err(|e| malformed(e.to_string()))?;
                let indices = collect_indices(params, "/0/inputsToSign", "index", &self.address)?;
                Ok(json!(codec::to_hex(&self.sign(psbt, indices)?)))
            }
            WalletKind::Leather => {
                if params.pointer("/0") != Some(&json!("signPsbt")) {
                    return Err(malformed("expected signPsbt"));
                }
                let psbt = codec::from_hex(str_at(params, "/1/hex")?)
                    .map_err(|e| malformed(e.to_string()))?;
                let indices: Vec<u32> = params
                    .pointer("/1/signAtIndex")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .ok_or_else(|| malformed("signAtIndex"))?;
                let signed = self.sign(psbt, indices)?;
                Ok(json!({ "result": { "hex": codec::to_hex(&signed) } }))
            }
            WalletKind::Phantom => {
                let bytes: Vec<u8> = params
                    .pointer("/0")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .ok_or_else(|| malformed("psbt bytes"))?;
                let psbt = codec::from_bytes(&bytes).map_err(|e| malformed(e.to_string()))?;
                let indices =
                    collect_indices(params, "/1/inputsToSign", "signingIndexes", &self.address)?;
                Ok(json!(codec::to_bytes(&self.sign(psbt, indices)?)))
            }
        }
    }
}

#[async_trait]
impl WalletRelay for FakeWallet {
    async fn call(&self, target: &str, method: &str, params: Value) -> Result<Value, RelayFailure> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(format!("{}.{}", target, method));
        }

        // Discovery and provider checks
        if self.kind == WalletKind::MagicEden && target == magic_eden::REGISTRY {
            let wallets = if self.installed {
                json!([
                    { "name": "Other", "features": ["standard:connect"] },
                    { "name": magic_eden::WALLET_NAME, "features": [magic_eden::PROVIDER_FEATURE] },
                ])
            } else {
                json!([])
            };
            return Ok(wallets);
        }
        if target != self.target() || !self.installed {
            return Err(RelayFailure::Unavailable(target.to_string()));
        }
        if method == "isPhantom" {
            return Ok(json!(true));
        }

        let is_sign = matches!(method, "signTransaction" | "signPsbt" | "signPSBT")
            || params.pointer("/0") == Some(&json!("signPsbt"));
        if is_sign {
            self.sign_reply(&params)
        } else {
            self.connect_reply(method)
        }
    }
}

fn malformed(what: impl std::fmt::Display) -> RelayFailure {
    RelayFailure::Transport(format!("fake wallet rejected malformed request: {}", what))
}

fn str_at<'a>(params: &'a Value, pointer: &str) -> Result<&'a str, RelayFailure> {
    params
        .pointer(pointer)
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(pointer))
}

/// Flatten per-entry index fields (a number or an array of numbers),
/// requiring each entry to name the connected address.
fn collect_indices(
    params: &Value,
    pointer: &str,
    field: &str,
    address: &Address,
) -> Result<Vec<u32>, RelayFailure> {
    let entries = params
        .pointer(pointer)
        .and_then(Value::as_array)
        .ok_or_else(|| malformed(pointer))?;

    let mut indices = Vec::new();
    for entry in entries {
        if entry.get("address").and_then(Value::as_str) != Some(address.to_string().as_str()) {
            return Err(malformed("input entry for a foreign address"));
        }
        match entry.get(field) {
            Some(Value::Array(items)) => {
                for item in items {
                    indices.push(item.as_u64().ok_or_else(|| malformed(field))? as u32);
                }
            }
            Some(Value::Number(n)) => {
                indices.push(n.as_u64().ok_or_else(|| malformed(field))? as u32)
            }
            _ => return Err(malformed(field)),
        }
    }
    Ok(indices)
}
