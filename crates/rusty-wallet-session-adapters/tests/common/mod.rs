#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;

use rusty_wallet_session_adapters::{
    AdapterConfig, DeterministicProvider, HttpRpcAdapter, MemoryStoreAdapter,
};
use rusty_wallet_session_core::{
    ChainId, ChainMetadata, ChainRegistry, NativeCurrency, Session, SessionConfig, SessionStatus,
    SessionStore,
};

pub type TestStore = SessionStore<DeterministicProvider, HttpRpcAdapter, MemoryStoreAdapter>;

pub struct Harness {
    pub provider: DeterministicProvider,
    pub kv: Arc<MemoryStoreAdapter>,
    pub store: TestStore,
}

pub fn harness() -> Harness {
    harness_with_registry(offline_registry())
}

pub fn harness_with_registry(registry: ChainRegistry) -> Harness {
    let provider = DeterministicProvider::new();
    let rpc = Arc::new(HttpRpcAdapter::new(&AdapterConfig::default()).expect("http rpc adapter"));
    let kv = Arc::new(MemoryStoreAdapter::new());
    let store = SessionStore::new(
        Arc::new(provider.clone()),
        rpc,
        Arc::clone(&kv),
        Arc::new(registry),
        fast_config(),
    );
    Harness {
        provider,
        kv,
        store,
    }
}

pub fn fast_config() -> SessionConfig {
    SessionConfig {
        balance_retry_backoff: Duration::from_millis(1),
    }
}

/// Chains without RPC endpoints, so balance queries route through the
/// wallet provider instead of the network.
pub fn offline_registry() -> ChainRegistry {
    ChainRegistry::with_chains(vec![
        offline_chain(1, "Ethereum Mainnet", "ETH", None),
        offline_chain(137, "Polygon Mainnet", "MATIC", Some("https://polygonscan.com")),
        offline_chain(8453, "Base Mainnet", "ETH", None),
    ])
}

pub fn offline_chain(
    id: u64,
    name: &str,
    symbol: &str,
    explorer: Option<&str>,
) -> ChainMetadata {
    ChainMetadata {
        chain_id: ChainId(id),
        display_name: name.to_owned(),
        rpc_endpoints: Vec::new(),
        explorer_base_url: explorer.map(str::to_owned),
        native_currency: NativeCurrency {
            name: symbol.to_owned(),
            symbol: symbol.to_owned(),
            decimals: 18,
        },
    }
}

/// The provider's built-in deterministic account.
pub fn default_account() -> Address {
    "0x1000000000000000000000000000000000000001"
        .parse()
        .expect("valid default account")
}

pub fn account_a() -> Address {
    "0x00000000000000000000000000000000000000aa"
        .parse()
        .expect("valid account a")
}

pub fn account_b() -> Address {
    "0x00000000000000000000000000000000000000bb"
        .parse()
        .expect("valid account b")
}

/// Lets tasks spawned on the current-thread runtime (balance refreshes,
/// released request gates) run to completion.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

pub fn assert_invariants(s: &Session) {
    assert_eq!(
        s.active_address.is_none(),
        s.accounts.is_empty(),
        "active address must track account list emptiness"
    );
    if let Some(active) = s.active_address {
        assert_eq!(s.accounts.first(), Some(&active), "active must be first");
    }
    assert_eq!(
        s.listeners_attached,
        s.status == SessionStatus::Connected,
        "listeners must be attached exactly while connected"
    );
}
