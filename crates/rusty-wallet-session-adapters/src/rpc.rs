use std::time::Duration;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use serde_json::Value;

use rusty_wallet_session_core::{RpcPort, WalletError};

use crate::config::AdapterConfig;

/// Native-balance reads against a chain-pinned JSON-RPC endpoint.
#[derive(Debug, Clone)]
pub struct HttpRpcAdapter {
    client: reqwest::Client,
}

impl HttpRpcAdapter {
    pub fn new(config: &AdapterConfig) -> Result<Self, WalletError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| WalletError::Transport(format!("http client init failed: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RpcPort for HttpRpcAdapter {
    async fn native_balance(
        &self,
        endpoint: &str,
        address: Address,
    ) -> Result<U256, WalletError> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_getBalance",
            "params": [address.to_string(), "latest"],
        });
        let response = self
            .client
            .post(endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| WalletError::Transport(format!("balance rpc request failed: {e}")))?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| WalletError::Transport(format!("balance rpc json decode failed: {e}")))?;
        if !status.is_success() {
            return Err(WalletError::Transport(format!(
                "balance rpc status {status}: {body}"
            )));
        }
        if let Some(err) = body.get("error") {
            return Err(WalletError::Transport(format!(
                "balance rpc returned error: {err}"
            )));
        }
        let raw = body
            .get("result")
            .and_then(Value::as_str)
            .ok_or_else(|| WalletError::Transport("balance rpc missing result".to_owned()))?;
        U256::from_str_radix(raw.trim_start_matches("0x"), 16)
            .map_err(|e| WalletError::InvalidPayload(format!("invalid balance quantity: {e}")))
    }
}
