//! EVM JSON-RPC client — `eth_call`, `eth_getBalance` and
//! `eth_getTransactionReceipt` against one network.
//!
//! ## Resilience
//!
//! * Transport errors, HTTP 429 and soft JSON-RPC errors are retried with
//!   exponential back-off according to the configured [`RetryPolicy`].
//! * JSON-RPC `-32600` / `-32601` and reverts (`3`) are hard failures.

use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::errors::{GatewayError, Result};
use crate::retry::{retry_if, RetryPolicy};

// ─────────────────────────────────────────────────────────
// JSON-RPC response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    /// `0x1` on success, `0x0` on revert.
    pub status: Option<U256>,
    #[serde(default)]
    pub logs: Vec<Log>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    pub address: Address,
    #[serde(default)]
    pub topics: Vec<B256>,
}

// ─────────────────────────────────────────────────────────
// Reader abstraction
// ─────────────────────────────────────────────────────────

/// Read access to a single chain.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// `eth_call` against the latest block; returns the raw return data.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes>;

    /// Native balance of `account`.
    async fn balance(&self, account: Address) -> Result<U256>;

    /// Receipt for a mined transaction, `None` while pending or unknown.
    async fn receipt(&self, tx_hash: B256) -> Result<Option<TransactionReceipt>>;
}

/// Encode `call`, run it against `to`, and decode the typed return value.
pub async fn call<C>(reader: &dyn ChainReader, to: Address, call: C) -> Result<C::Return>
where
    C: SolCall + Send,
{
    let out = reader.call(to, Bytes::from(call.abi_encode())).await?;
    Ok(C::abi_decode_returns(&out, true)?)
}

// ─────────────────────────────────────────────────────────
// HTTP implementation
// ─────────────────────────────────────────────────────────

pub struct RpcClient {
    client: Client,
    url: String,
    retry: RetryPolicy,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(client: Client, url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            url: url.into(),
            retry,
            next_id: AtomicU64::new(1),
        }
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<Option<T>> {
        retry_if(
            self.retry,
            || self.request_once(method, params.clone()),
            is_transient,
        )
        .await
    }

    async fn request_once<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let resp = self
            .client
            .post(&self.url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GatewayError::Transient(format!("rate-limited by {}", self.url)));
        }

        let body: RpcResponse<T> = resp.json().await?;
        if let Some(err) = body.error {
            return Err(classify(err));
        }

        debug!("{method} #{id} answered by {}", self.url);
        Ok(body.result)
    }
}

#[async_trait]
impl ChainReader for RpcClient {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let params = json!([{ "to": to, "data": data }, "latest"]);
        self.request::<Bytes>("eth_call", params)
            .await?
            .ok_or_else(|| GatewayError::Rpc("Empty result from eth_call".to_string()))
    }

    async fn balance(&self, account: Address) -> Result<U256> {
        self.request::<U256>("eth_getBalance", json!([account, "latest"]))
            .await?
            .ok_or_else(|| GatewayError::Rpc("Empty result from eth_getBalance".to_string()))
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<TransactionReceipt>> {
        self.request::<TransactionReceipt>("eth_getTransactionReceipt", json!([tx_hash]))
            .await
    }
}

fn classify(err: RpcError) -> GatewayError {
    match err.code {
        // Invalid request / method not found / execution reverted.
        -32600 | -32601 | 3 => {
            GatewayError::Rpc(format!("RPC hard error {}: {}", err.code, err.message))
        }
        _ if err.message.contains("revert") => {
            GatewayError::Rpc(format!("RPC hard error {}: {}", err.code, err.message))
        }
        _ => GatewayError::Transient(format!("RPC soft error {}: {}", err.code, err.message)),
    }
}

fn is_transient(e: &GatewayError) -> bool {
    matches!(e, GatewayError::Http(_) | GatewayError::Transient(_))
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
