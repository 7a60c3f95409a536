use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::ChainId;

/// EIP-1193 error code for an explicit user rejection at the wallet prompt.
pub const CODE_USER_REJECTED: i64 = 4001;
/// MetaMask-style code for a prompt that is already open.
pub const CODE_REQUEST_PENDING: i64 = -32002;
/// `wallet_switchEthereumChain` code for a chain the provider does not know.
pub const CODE_UNRECOGNIZED_CHAIN: i64 = 4902;

#[derive(Debug, Clone, Error)]
pub enum WalletError {
    #[error("no injected wallet provider available")]
    ProviderUnavailable,
    #[error("request rejected by the user")]
    UserRejected,
    #[error("a wallet prompt is already pending")]
    RequestAlreadyPending,
    #[error("authorization succeeded but returned no accounts")]
    NoAccountsReturned,
    #[error("chain {0} is not known to the provider or the registry")]
    ChainUnrecognized(ChainId),
    #[error("balance query raced a provider-side chain switch")]
    TransientNetworkMismatch,
    #[error("provider rpc error {code}: {message}")]
    ProviderRpc { code: i64, message: String },
    #[error("session is not connected")]
    NotConnected,
    #[error("event handler already registered for {0:?}")]
    AlreadySubscribed(ProviderEventKind),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl WalletError {
    /// Boundary classification of a raw provider error. Chain-unknown (4902)
    /// is deliberately left as a passthrough: only the switch flow knows
    /// which chain it asked for.
    pub fn from_rpc(code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            CODE_USER_REJECTED => Self::UserRejected,
            CODE_REQUEST_PENDING => Self::RequestAlreadyPending,
            _ if message.contains("network changed") => Self::TransientNetworkMismatch,
            _ => Self::ProviderRpc { code, message },
        }
    }

    pub fn is_unrecognized_chain(&self) -> bool {
        matches!(
            self,
            Self::ProviderRpc {
                code: CODE_UNRECOGNIZED_CHAIN,
                ..
            }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderEventKind {
    AccountsChanged,
    ChainChanged,
    Disconnected,
}

/// Provider-initiated event, already parsed at the gateway boundary.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    AccountsChanged(Vec<Address>),
    ChainChanged(ChainId),
    Disconnected,
}

impl ProviderEvent {
    pub fn kind(&self) -> ProviderEventKind {
        match self {
            Self::AccountsChanged(_) => ProviderEventKind::AccountsChanged,
            Self::ChainChanged(_) => ProviderEventKind::ChainChanged,
            Self::Disconnected => ProviderEventKind::Disconnected,
        }
    }
}

pub type EventHandler = Arc<dyn Fn(ProviderEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle {
    kind: ProviderEventKind,
    id: u64,
}

/// Handler bookkeeping shared by gateway implementations: at most one live
/// handler per event kind, fail-fast on a second subscribe, idempotent
/// unsubscribe. Handlers are invoked with no registry lock held, so a
/// handler may unsubscribe from within its own invocation.
#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    slots: HashMap<ProviderEventKind, (u64, EventHandler)>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        kind: ProviderEventKind,
        handler: EventHandler,
    ) -> Result<SubscriptionHandle, WalletError> {
        let mut g = self
            .inner
            .lock()
            .map_err(|e| WalletError::Transport(format!("subscription lock poisoned: {e}")))?;
        if g.slots.contains_key(&kind) {
            return Err(WalletError::AlreadySubscribed(kind));
        }
        g.next_id += 1;
        let id = g.next_id;
        g.slots.insert(kind, (id, handler));
        Ok(SubscriptionHandle { kind, id })
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        let Ok(mut g) = self.inner.lock() else {
            return;
        };
        if g.slots.get(&handle.kind).map(|(id, _)| *id) == Some(handle.id) {
            g.slots.remove(&handle.kind);
        }
    }

    /// Dispatches an event to the registered handler, if any. The handler
    /// reference is cloned out of the lock before the call.
    pub fn dispatch(&self, event: ProviderEvent) {
        let handler = {
            let Ok(g) = self.inner.lock() else {
                return;
            };
            g.slots.get(&event.kind()).map(|(_, h)| Arc::clone(h))
        };
        if let Some(handler) = handler {
            handler(event);
        }
    }
}

/// Request/response and event-subscription facade over an injected wallet
/// provider. No retries or business interpretation; pure boundary crossing.
#[async_trait]
pub trait ProviderPort: Send + Sync + 'static {
    fn is_available(&self) -> bool;

    async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError>;

    fn subscribe(
        &self,
        kind: ProviderEventKind,
        handler: EventHandler,
    ) -> Result<SubscriptionHandle, WalletError>;

    fn unsubscribe(&self, handle: SubscriptionHandle);
}

/// Chain-pinned native-balance read against a specific RPC endpoint.
#[async_trait]
pub trait RpcPort: Send + Sync + 'static {
    async fn native_balance(&self, endpoint: &str, address: Address)
        -> Result<U256, WalletError>;
}

/// Optional key-value persistence. Never load-bearing: every failure at
/// this seam is logged and swallowed by the callers.
pub trait StorePort: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<String>, WalletError>;
    fn put(&self, key: &str, value: &str) -> Result<(), WalletError>;
    fn remove(&self, key: &str) -> Result<(), WalletError>;
}
