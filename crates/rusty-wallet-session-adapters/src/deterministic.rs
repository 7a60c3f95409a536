use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;

use rusty_wallet_session_core::{
    ChainId, EventHandler, ProviderEvent, ProviderEventKind, ProviderPort, SubscriptionHandle,
    SubscriptionRegistry, WalletError,
};

/// In-process provider with fully scripted behavior: account/chain state,
/// per-method failure queues, request gates that hold a call in flight
/// until released, and a recorded call log. Serves the integration tests
/// and providerless environments.
#[derive(Clone, Default)]
pub struct DeterministicProvider {
    state: Arc<Mutex<ProviderState>>,
    subscriptions: Arc<SubscriptionRegistry>,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub params: Value,
}

struct ProviderState {
    available: bool,
    accounts: Vec<Address>,
    chain_id: ChainId,
    balances: HashMap<(ChainId, Address), U256>,
    failures: HashMap<String, VecDeque<WalletError>>,
    gates: HashMap<String, Arc<Notify>>,
    calls: Vec<RecordedCall>,
}

impl Default for ProviderState {
    fn default() -> Self {
        Self {
            available: true,
            accounts: vec!["0x1000000000000000000000000000000000000001"
                .parse()
                .expect("valid built-in deterministic account")],
            chain_id: ChainId(1),
            balances: HashMap::new(),
            failures: HashMap::new(),
            gates: HashMap::new(),
            calls: Vec::new(),
        }
    }
}

impl DeterministicProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProviderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
    }

    pub fn set_accounts(&self, accounts: Vec<Address>) {
        self.lock().accounts = accounts;
    }

    pub fn set_chain(&self, chain_id: ChainId) {
        self.lock().chain_id = chain_id;
    }

    pub fn set_balance(&self, chain_id: ChainId, address: Address, wei: U256) {
        self.lock().balances.insert((chain_id, address), wei);
    }

    /// Queues a failure returned by the next call to `method`, ahead of
    /// its normal response.
    pub fn enqueue_failure(&self, method: &str, error: WalletError) {
        self.lock()
            .failures
            .entry(method.to_owned())
            .or_default()
            .push_back(error);
    }

    /// Holds the next requests for `method` in flight until
    /// `release_requests` is called. The call is recorded before it parks,
    /// so tests can observe it as in flight.
    pub fn hold_requests(&self, method: &str) {
        self.lock()
            .gates
            .insert(method.to_owned(), Arc::new(Notify::new()));
    }

    pub fn release_requests(&self, method: &str) {
        let gate = self.lock().gates.remove(method);
        if let Some(gate) = gate {
            // notify_waiters wakes parked calls; notify_one leaves a
            // permit in case the call has not reached the gate yet.
            gate.notify_waiters();
            gate.notify_one();
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.lock().calls.iter().filter(|c| c.method == method).count()
    }

    /// Injects a provider-initiated account change, updating the scripted
    /// state and invoking the registered handler.
    pub fn emit_accounts_changed(&self, accounts: Vec<Address>) {
        self.lock().accounts = accounts.clone();
        self.subscriptions
            .dispatch(ProviderEvent::AccountsChanged(accounts));
    }

    pub fn emit_chain_changed(&self, chain_id: ChainId) {
        self.lock().chain_id = chain_id;
        self.subscriptions
            .dispatch(ProviderEvent::ChainChanged(chain_id));
    }

    pub fn emit_disconnected(&self) {
        self.subscriptions.dispatch(ProviderEvent::Disconnected);
    }

    fn respond(&self, method: &str, params: &Value) -> Result<Value, WalletError> {
        let mut g = self.lock();
        match method {
            "eth_accounts" | "eth_requestAccounts" => Ok(serde_json::json!(g
                .accounts
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<String>>())),
            "eth_chainId" => Ok(Value::String(g.chain_id.to_hex())),
            "eth_getBalance" => {
                let raw = params
                    .get(0)
                    .and_then(Value::as_str)
                    .ok_or_else(|| WalletError::InvalidPayload("missing address".to_owned()))?;
                let address: Address = raw
                    .parse()
                    .map_err(|e| WalletError::InvalidPayload(format!("invalid address: {e}")))?;
                let wei = g
                    .balances
                    .get(&(g.chain_id, address))
                    .copied()
                    .unwrap_or(U256::ZERO);
                Ok(Value::String(format!("0x{wei:x}")))
            }
            "wallet_switchEthereumChain" => {
                let raw = params
                    .get(0)
                    .and_then(|p| p.get("chainId"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| WalletError::InvalidPayload("missing chainId".to_owned()))?;
                let target = ChainId::parse(raw)?;
                g.chain_id = target;
                drop(g);
                // A real provider confirms the switch through its
                // chainChanged event, not the request response.
                self.subscriptions
                    .dispatch(ProviderEvent::ChainChanged(target));
                Ok(Value::Null)
            }
            "wallet_addEthereumChain"
            | "wallet_revokePermissions"
            | "wallet_requestPermissions" => Ok(Value::Null),
            other => Err(WalletError::ProviderRpc {
                code: -32601,
                message: format!("method not found: {other}"),
            }),
        }
    }
}

#[async_trait]
impl ProviderPort for DeterministicProvider {
    fn is_available(&self) -> bool {
        self.lock().available
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError> {
        let gate = {
            let mut g = self.lock();
            if !g.available {
                return Err(WalletError::ProviderUnavailable);
            }
            g.calls.push(RecordedCall {
                method: method.to_owned(),
                params: params.clone(),
            });
            g.gates.get(method).cloned()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let scripted = self
            .lock()
            .failures
            .get_mut(method)
            .and_then(VecDeque::pop_front);
        if let Some(error) = scripted {
            return Err(error);
        }
        self.respond(method, &params)
    }

    fn subscribe(
        &self,
        kind: ProviderEventKind,
        handler: EventHandler,
    ) -> Result<SubscriptionHandle, WalletError> {
        self.subscriptions.subscribe(kind, handler)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.subscriptions.unsubscribe(handle);
    }
}
