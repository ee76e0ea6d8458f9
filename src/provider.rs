//! JSON-RPC network provider adapter
//!
//! Wraps a remote ledger RPC endpoint behind the [`LedgerRpc`] trait so the
//! session can be exercised against a test double. Connection policy is
//! deliberately minimal: probe the primary endpoint once, probe the fallback
//! once, give up. Retrying individual queries is the caller's decision.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Ledger RPC surface the session depends on
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Chain id the connected node reported at connect time
    fn chain_id(&self) -> u64;

    /// Current balance of `address` in wei
    async fn get_balance(&self, address: &str) -> Result<u128>;

    /// Next nonce for `address`, including pending transactions
    async fn transaction_count(&self, address: &str) -> Result<u64>;

    /// Current gas price in wei
    async fn gas_price(&self) -> Result<u128>;

    /// Broadcast a signed raw transaction, returning its hash
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String>;

    /// Poll until the transaction is included or `timeout` elapses
    async fn wait_for_confirmation(
        &self,
        hash: &str,
        timeout: Duration,
    ) -> Result<TransactionReceipt>;
}

/// Network acknowledgment that a transaction was included in a block
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    /// Hex quantity; absent while the transaction is still pending
    pub block_number: Option<String>,
    /// "0x1" on success, "0x0" on revert; absent on pre-Byzantium nodes
    pub status: Option<String>,
}

impl TransactionReceipt {
    /// Whether the transaction executed without reverting
    pub fn succeeded(&self) -> bool {
        self.status.as_deref() != Some("0x0")
    }

    pub fn block_number_u64(&self) -> Option<u64> {
        let raw = self.block_number.as_deref()?;
        u64::from_str_radix(raw.trim_start_matches("0x"), 16).ok()
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// HTTP JSON-RPC 2.0 provider
pub struct JsonRpcProvider {
    client: Client,
    endpoint: String,
    chain_id: u64,
    poll_interval: Duration,
    next_id: AtomicU64,
}

impl JsonRpcProvider {
    /// Connect to `primary`, probing it with `eth_chainId`. On failure the
    /// `fallback` endpoint is probed exactly once; if both are unreachable
    /// the call fails with [`Error::NoProviderAvailable`]. No backoff, no
    /// further retries.
    pub async fn connect(
        primary: &str,
        fallback: Option<&str>,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        match Self::probe(&client, primary).await {
            Ok(chain_id) => {
                info!(chain_id, "connected to primary rpc endpoint");
                Ok(Self::from_parts(client, primary, chain_id, poll_interval))
            }
            Err(primary_err) => {
                let Some(fallback) = fallback else {
                    return Err(Error::NoProviderAvailable(primary_err.to_string()));
                };
                warn!("primary rpc endpoint unreachable ({primary_err}), trying fallback");
                match Self::probe(&client, fallback).await {
                    Ok(chain_id) => {
                        info!(chain_id, "connected to fallback rpc endpoint");
                        Ok(Self::from_parts(client, fallback, chain_id, poll_interval))
                    }
                    Err(fallback_err) => Err(Error::NoProviderAvailable(format!(
                        "primary: {primary_err}; fallback: {fallback_err}"
                    ))),
                }
            }
        }
    }

    fn from_parts(client: Client, endpoint: &str, chain_id: u64, poll_interval: Duration) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
            chain_id,
            poll_interval,
            next_id: AtomicU64::new(1),
        }
    }

    async fn probe(client: &Client, endpoint: &str) -> Result<u64> {
        let response = Self::post(client, endpoint, 0, "eth_chainId", json!([])).await?;
        match response.result {
            Some(Value::String(raw)) => Ok(parse_quantity(&raw)? as u64),
            _ => Err(Error::Network("endpoint did not report a chain id".into())),
        }
    }

    async fn post(
        client: &Client,
        endpoint: &str,
        id: u64,
        method: &str,
        params: Value,
    ) -> Result<RpcResponse> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(method, "rpc request");
        let response = client
            .post(endpoint)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?
            .error_for_status()
            .map_err(transport_error)?;
        response.json().await.map_err(transport_error)
    }

    async fn request(&self, method: &str, params: Value) -> Result<RpcResponse> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Self::post(&self.client, &self.endpoint, id, method, params).await
    }

    /// Issue a call, mapping node-reported errors to [`Error::Network`]
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let response = self.request(method, params).await?;
        if let Some(err) = response.error {
            return Err(Error::Network(format!(
                "rpc error {}: {}",
                err.code, err.message
            )));
        }
        response
            .result
            .ok_or_else(|| Error::Network("rpc response missing result".into()))
    }

    async fn call_quantity(&self, method: &str, params: Value) -> Result<u128> {
        match self.call(method, params).await? {
            Value::String(raw) => parse_quantity(&raw),
            other => Err(Error::Network(format!(
                "expected hex quantity, got {other}"
            ))),
        }
    }

    async fn transaction_receipt(&self, hash: &str) -> Result<Option<TransactionReceipt>> {
        match self.call("eth_getTransactionReceipt", json!([hash])).await? {
            Value::Null => Ok(None),
            value => Ok(Some(serde_json::from_value(value)?)),
        }
    }
}

#[async_trait]
impl LedgerRpc for JsonRpcProvider {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn get_balance(&self, address: &str) -> Result<u128> {
        self.call_quantity("eth_getBalance", json!([address, "latest"]))
            .await
    }

    async fn transaction_count(&self, address: &str) -> Result<u64> {
        // "pending" so sequential sends from one session don't reuse a nonce
        let count = self
            .call_quantity("eth_getTransactionCount", json!([address, "pending"]))
            .await?;
        Ok(count as u64)
    }

    async fn gas_price(&self) -> Result<u128> {
        self.call_quantity("eth_gasPrice", json!([])).await
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String> {
        let encoded = format!("0x{}", hex::encode(raw));
        let response = self
            .request("eth_sendRawTransaction", json!([encoded]))
            .await?;
        if let Some(err) = response.error {
            // The node refused the transaction; nothing was accepted
            return Err(Error::Broadcast(format!(
                "{} (code {})",
                err.message, err.code
            )));
        }
        match response.result {
            Some(Value::String(hash)) => Ok(hash),
            _ => Err(Error::Broadcast("node returned no transaction hash".into())),
        }
    }

    async fn wait_for_confirmation(
        &self,
        hash: &str,
        timeout: Duration,
    ) -> Result<TransactionReceipt> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(receipt) = self.transaction_receipt(hash).await? {
                if receipt.block_number.is_some() {
                    debug!(hash, "transaction confirmed");
                    return Ok(receipt);
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::ConfirmationTimeout {
                    hash: hash.to_string(),
                    waited_secs: timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    // Strip the URL so endpoint credentials never reach logs or callers
    Error::Network(e.without_url().to_string())
}

/// Parse a JSON-RPC hex quantity ("0x1a") into an integer
fn parse_quantity(raw: &str) -> Result<u128> {
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| Error::Network(format!("malformed quantity '{raw}'")))?;
    u128::from_str_radix(digits, 16)
        .map_err(|_| Error::Network(format!("malformed quantity '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x1a").unwrap(), 26);
        assert_eq!(
            parse_quantity("0xde0b6b3a7640000").unwrap(),
            1_000_000_000_000_000_000
        );
        assert!(parse_quantity("26").is_err());
        assert!(parse_quantity("0xzz").is_err());
        assert!(parse_quantity("0x").is_err());
    }

    #[test]
    fn test_receipt_deserialization() {
        let receipt: TransactionReceipt = serde_json::from_value(json!({
            "transactionHash": "0xabc",
            "blockNumber": "0x10",
            "status": "0x1",
            "gasUsed": "0x5208"
        }))
        .unwrap();
        assert_eq!(receipt.transaction_hash, "0xabc");
        assert_eq!(receipt.block_number_u64(), Some(16));
        assert!(receipt.succeeded());
    }

    #[test]
    fn test_receipt_revert_status() {
        let receipt: TransactionReceipt = serde_json::from_value(json!({
            "transactionHash": "0xabc",
            "blockNumber": "0x10",
            "status": "0x0"
        }))
        .unwrap();
        assert!(!receipt.succeeded());
    }

    #[test]
    fn test_pending_receipt_has_no_block() {
        let receipt: TransactionReceipt = serde_json::from_value(json!({
            "transactionHash": "0xabc",
            "blockNumber": null,
            "status": null
        }))
        .unwrap();
        assert_eq!(receipt.block_number_u64(), None);
        assert!(receipt.succeeded());
    }

    #[test]
    fn test_rpc_response_shapes() {
        let ok: RpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":"0x1"}"#).unwrap();
        assert!(ok.error.is_none());
        assert_eq!(ok.result, Some(json!("0x1")));

        let err: RpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"nonce too low"}}"#,
        )
        .unwrap();
        let err = err.error.unwrap();
        assert_eq!(err.code, -32000);
        assert_eq!(err.message, "nonce too low");
    }
}
