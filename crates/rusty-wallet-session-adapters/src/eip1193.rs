use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;
use serde_json::Value;
use tokio::task::JoinHandle;

use rusty_wallet_session_core::{
    ChainId, EventHandler, ProviderEvent, ProviderEventKind, ProviderPort, SubscriptionHandle,
    SubscriptionRegistry, WalletError,
};

use crate::config::AdapterConfig;

/// Gateway to an injected EIP-1193 provider reached over an HTTP bridge.
///
/// Requests are forwarded as JSON-RPC; provider-initiated events are
/// reconstructed by polling `eth_accounts`/`eth_chainId` and diffing
/// against the previous snapshot, since a plain HTTP bridge cannot push.
pub struct Eip1193ProxyGateway {
    base_url: Option<String>,
    client: reqwest::Client,
    poll_interval: Duration,
    subscriptions: Arc<SubscriptionRegistry>,
    snapshot: Arc<Mutex<ProviderSnapshot>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Default)]
struct ProviderSnapshot {
    primed: bool,
    reachable: bool,
    accounts: Vec<Address>,
    chain_id: Option<ChainId>,
}

impl Eip1193ProxyGateway {
    pub fn new(config: &AdapterConfig) -> Result<Self, WalletError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| WalletError::Transport(format!("http client init failed: {e}")))?;
        Ok(Self {
            base_url: config.proxy_base_url.clone(),
            client,
            poll_interval: Duration::from_millis(config.event_poll_interval_ms),
            subscriptions: Arc::new(SubscriptionRegistry::new()),
            snapshot: Arc::new(Mutex::new(ProviderSnapshot::default())),
            watcher: Mutex::new(None),
        })
    }

    /// Event polling starts lazily on the first subscribe; an unconnected
    /// gateway never generates background traffic.
    fn ensure_watcher(&self) {
        let Some(base_url) = self.base_url.clone() else {
            return;
        };
        let mut watcher = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if watcher.is_some() {
            return;
        }
        let client = self.client.clone();
        let interval = self.poll_interval;
        let subscriptions = Arc::clone(&self.subscriptions);
        let snapshot = Arc::clone(&self.snapshot);
        *watcher = Some(tokio::spawn(async move {
            watch_provider(client, base_url, interval, subscriptions, snapshot).await;
        }));
    }
}

impl Drop for Eip1193ProxyGateway {
    fn drop(&mut self) {
        if let Ok(mut watcher) = self.watcher.lock() {
            if let Some(handle) = watcher.take() {
                handle.abort();
            }
        }
    }
}

#[async_trait]
impl ProviderPort for Eip1193ProxyGateway {
    fn is_available(&self) -> bool {
        self.base_url.is_some()
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError> {
        let Some(base_url) = &self.base_url else {
            return Err(WalletError::ProviderUnavailable);
        };
        rpc_call(&self.client, base_url, method, params).await
    }

    fn subscribe(
        &self,
        kind: ProviderEventKind,
        handler: EventHandler,
    ) -> Result<SubscriptionHandle, WalletError> {
        let handle = self.subscriptions.subscribe(kind, handler)?;
        self.ensure_watcher();
        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.subscriptions.unsubscribe(handle);
    }
}

async fn watch_provider(
    client: reqwest::Client,
    base_url: String,
    interval: Duration,
    subscriptions: Arc<SubscriptionRegistry>,
    snapshot: Arc<Mutex<ProviderSnapshot>>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match fetch_snapshot(&client, &base_url).await {
            Ok((accounts, chain_id)) => {
                let events = {
                    let mut snap = snapshot.lock().unwrap_or_else(PoisonError::into_inner);
                    diff_snapshot(&mut snap, accounts, chain_id)
                };
                for event in events {
                    subscriptions.dispatch(event);
                }
            }
            Err(e) => {
                let lost = {
                    let mut snap = snapshot.lock().unwrap_or_else(PoisonError::into_inner);
                    let lost = snap.reachable;
                    snap.reachable = false;
                    lost
                };
                if lost {
                    tracing::warn!(error = %e, "provider bridge unreachable");
                    subscriptions.dispatch(ProviderEvent::Disconnected);
                } else {
                    tracing::debug!(error = %e, "provider snapshot poll failed");
                }
            }
        }
    }
}

async fn fetch_snapshot(
    client: &reqwest::Client,
    base_url: &str,
) -> Result<(Vec<Address>, ChainId), WalletError> {
    let raw_accounts = rpc_call(client, base_url, "eth_accounts", serde_json::json!([])).await?;
    let raw_chain = rpc_call(client, base_url, "eth_chainId", serde_json::json!([])).await?;
    let accounts = raw_accounts
        .as_array()
        .map(|arr| {
            // Unparsable entries are skipped at the boundary.
            arr.iter()
                .filter_map(Value::as_str)
                .filter_map(|raw| raw.parse::<Address>().ok())
                .collect()
        })
        .unwrap_or_default();
    let chain = raw_chain
        .as_str()
        .ok_or_else(|| WalletError::InvalidPayload("chain id must be a string".to_owned()))
        .and_then(ChainId::parse)?;
    Ok((accounts, chain))
}

/// First successful poll seeds the baseline without events; afterwards
/// only genuine changes are dispatched.
fn diff_snapshot(
    snap: &mut ProviderSnapshot,
    accounts: Vec<Address>,
    chain_id: ChainId,
) -> Vec<ProviderEvent> {
    snap.reachable = true;
    if !snap.primed {
        snap.primed = true;
        snap.accounts = accounts;
        snap.chain_id = Some(chain_id);
        return Vec::new();
    }
    let mut events = Vec::new();
    if snap.accounts != accounts {
        snap.accounts = accounts.clone();
        events.push(ProviderEvent::AccountsChanged(accounts));
    }
    if snap.chain_id != Some(chain_id) {
        snap.chain_id = Some(chain_id);
        events.push(ProviderEvent::ChainChanged(chain_id));
    }
    events
}

async fn rpc_call(
    client: &reqwest::Client,
    base_url: &str,
    method: &str,
    params: Value,
) -> Result<Value, WalletError> {
    let payload = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    });
    let response = client
        .post(base_url)
        .json(&payload)
        .send()
        .await
        .map_err(|e| WalletError::Transport(format!("eip1193 bridge request failed: {e}")))?;
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| WalletError::Transport(format!("eip1193 bridge json decode failed: {e}")))?;
    if !status.is_success() {
        return Err(WalletError::Transport(format!(
            "eip1193 bridge status {status}: {body}"
        )));
    }
    if let Some(err) = body.get("error") {
        let code = err.get("code").and_then(Value::as_i64).unwrap_or(-32603);
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("provider error")
            .to_owned();
        return Err(WalletError::from_rpc(code, message));
    }
    body.get("result")
        .cloned()
        .ok_or_else(|| WalletError::Transport("eip1193 bridge missing result".to_owned()))
}
