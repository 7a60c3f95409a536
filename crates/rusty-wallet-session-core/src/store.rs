use std::sync::{Arc, Mutex, PoisonError, Weak};

use alloy::primitives::Address;
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::balance::BalanceFetcher;
use crate::domain::{lock_session, ChainId, ChainMetadata, Session, SessionConfig, SessionStatus};
use crate::ports::{
    EventHandler, ProviderEvent, ProviderEventKind, ProviderPort, RpcPort, StorePort,
    SubscriptionHandle, WalletError,
};
use crate::registry::ChainRegistry;

/// Key under which the optional store adapter remembers the last active
/// address for optimistic pre-render.
pub const LAST_ADDRESS_KEY: &str = "last_wallet_address";

/// The wallet session state machine.
///
/// Owns the single `Session` aggregate and is the only writer to it; the
/// public methods are idempotent and safe to call from multiple UI
/// contexts. Provider events are handled as synchronous callbacks, and
/// every async continuation re-validates the session state after its
/// await instead of trusting what it captured.
pub struct SessionStore<P, R, K> {
    inner: Arc<StoreInner<P, R, K>>,
}

impl<P, R, K> Clone for SessionStore<P, R, K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct StoreInner<P, R, K> {
    provider: Arc<P>,
    kv: Arc<K>,
    registry: Arc<ChainRegistry>,
    state: Arc<Mutex<Session>>,
    balance: BalanceFetcher<P, R>,
    probe_once: OnceCell<()>,
    subscriptions: Mutex<Vec<SubscriptionHandle>>,
    /// Handed to event handlers and spawned tasks so neither keeps a
    /// dropped store alive.
    weak_self: Weak<StoreInner<P, R, K>>,
}

impl<P: ProviderPort, R: RpcPort, K: StorePort> SessionStore<P, R, K> {
    pub fn new(
        provider: Arc<P>,
        rpc: Arc<R>,
        kv: Arc<K>,
        registry: Arc<ChainRegistry>,
        config: SessionConfig,
    ) -> Self {
        let state = Arc::new(Mutex::new(Session::new()));
        let balance = BalanceFetcher::new(
            Arc::clone(&provider),
            rpc,
            Arc::clone(&registry),
            Arc::clone(&state),
            config.balance_retry_backoff,
        );
        let inner = Arc::new_cyclic(|weak| StoreInner {
            provider,
            kv,
            registry,
            state,
            balance,
            probe_once: OnceCell::new(),
            subscriptions: Mutex::new(Vec::new()),
            weak_self: weak.clone(),
        });
        Self { inner }
    }

    pub fn snapshot(&self) -> Session {
        lock_session(&self.inner.state).clone()
    }

    pub fn registry(&self) -> &ChainRegistry {
        &self.inner.registry
    }

    pub fn current_chain_metadata(&self) -> Option<ChainMetadata> {
        let chain = lock_session(&self.inner.state).chain_id?;
        self.inner.registry.lookup(chain).cloned()
    }

    /// Silent account check for automatic reconnection. Runs at most once
    /// per store lifetime; concurrent callers join the in-flight attempt.
    pub async fn probe(&self) {
        self.inner
            .probe_once
            .get_or_init(|| async { self.inner.run_probe().await })
            .await;
    }

    /// Requests account authorization and establishes the session.
    /// No-op while a connect is in flight or the session is connected.
    pub async fn connect(&self) -> Result<(), WalletError> {
        {
            let mut s = lock_session(&self.inner.state);
            if s.status != SessionStatus::Disconnected {
                return Ok(());
            }
            s.status = SessionStatus::Connecting;
        }
        match self.inner.establish().await {
            Ok((accounts, chain)) => {
                // A disconnect that raced the handshake leaves nothing to
                // apply; the attempt simply dissolves.
                self.inner
                    .apply_connected(SessionStatus::Connecting, accounts, chain);
                Ok(())
            }
            Err(e) => {
                {
                    let mut s = lock_session(&self.inner.state);
                    if s.status == SessionStatus::Connecting {
                        s.status = SessionStatus::Disconnected;
                    }
                }
                if !matches!(e, WalletError::UserRejected) {
                    tracing::warn!(error = %e, "wallet connect failed");
                }
                Err(e)
            }
        }
    }

    /// Tears the session down locally and, when `revoke` is set, asks the
    /// provider to drop the authorization. Allowed from any state;
    /// idempotent. Revoke failures never prevent the local reset.
    pub async fn disconnect(&self, revoke: bool) {
        self.inner.teardown_local();
        if revoke && self.inner.provider.is_available() {
            if let Err(e) = self
                .inner
                .provider
                .request(
                    "wallet_revokePermissions",
                    serde_json::json!([{ "eth_accounts": {} }]),
                )
                .await
            {
                tracing::warn!(error = %e, "permission revoke failed");
            }
        }
    }

    /// Asks the provider to switch its active chain. A user rejection
    /// resolves as a benign no-op. The session's `chain_id` is updated
    /// asynchronously via the `chainChanged` event, never from here.
    pub async fn switch_chain(&self, target: ChainId) -> Result<(), WalletError> {
        if lock_session(&self.inner.state).status != SessionStatus::Connected {
            return Err(WalletError::NotConnected);
        }
        match self.inner.request_switch(target).await {
            Ok(()) | Err(WalletError::UserRejected) => Ok(()),
            Err(e) if e.is_unrecognized_chain() => self.inner.add_then_retry(target).await,
            Err(e) => Err(e),
        }
    }

    /// Re-prompts the provider's account-permission UI. Fire-and-forget:
    /// the outcome is observed through a later `accountsChanged` event.
    pub async fn reselect_accounts(&self) {
        if !self.inner.provider.is_available() {
            return;
        }
        if let Err(e) = self
            .inner
            .provider
            .request(
                "wallet_requestPermissions",
                serde_json::json!([{ "eth_accounts": {} }]),
            )
            .await
        {
            tracing::debug!(error = %e, "account reselection request failed");
        }
    }

    pub async fn refresh_balance(&self) {
        self.inner.balance.refresh().await;
    }

    pub fn last_known_address(&self) -> Option<Address> {
        match self.inner.kv.get(LAST_ADDRESS_KEY) {
            Ok(Some(raw)) => raw.parse().ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(error = %e, "reading persisted address failed");
                None
            }
        }
    }
}

impl<P: ProviderPort, R: RpcPort, K: StorePort> StoreInner<P, R, K> {
    async fn run_probe(&self) {
        if self.provider.is_available() {
            match self
                .provider
                .request("eth_accounts", serde_json::json!([]))
                .await
            {
                Ok(raw) => match parse_accounts(&raw) {
                    Ok(accounts) if !accounts.is_empty() => {
                        let chain = self.read_chain_id().await;
                        self.apply_connected(SessionStatus::Disconnected, accounts, chain);
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "silent wallet probe failed"),
                },
                Err(e) => tracing::warn!(error = %e, "silent wallet probe failed"),
            }
        }
        lock_session(&self.state).has_completed_initial_check = true;
    }

    async fn establish(&self) -> Result<(Vec<Address>, Option<ChainId>), WalletError> {
        if !self.provider.is_available() {
            return Err(WalletError::ProviderUnavailable);
        }
        let raw = self
            .provider
            .request("eth_requestAccounts", serde_json::json!([]))
            .await?;
        let accounts = parse_accounts(&raw)?;
        if accounts.is_empty() {
            return Err(WalletError::NoAccountsReturned);
        }
        let chain = self.read_chain_id().await;
        Ok((accounts, chain))
    }

    /// An unreadable chain id degrades to `None` instead of failing the
    /// whole connect.
    async fn read_chain_id(&self) -> Option<ChainId> {
        let raw = self
            .provider
            .request("eth_chainId", serde_json::json!([]))
            .await
            .ok()?;
        ChainId::parse(raw.as_str()?).ok()
    }

    /// Completes a connect or probe attempt. Applies only if the session
    /// is still in the state the attempt started from; a competing
    /// transition during the handshake wins.
    fn apply_connected(
        &self,
        expected: SessionStatus,
        accounts: Vec<Address>,
        chain: Option<ChainId>,
    ) -> bool {
        {
            let mut s = lock_session(&self.state);
            if s.status != expected {
                return false;
            }
            s.set_accounts(accounts);
            s.chain_id = chain;
            s.status = SessionStatus::Connected;
            s.listeners_attached = true;
        }
        self.attach_listeners();
        self.persist_active_address();
        self.spawn_balance_refresh();
        tracing::info!("wallet session connected");
        true
    }

    /// Detaches listeners and clears the aggregate. Shared by explicit
    /// disconnects and provider-driven teardowns; never touches the
    /// provider beyond unsubscribing.
    fn teardown_local(&self) {
        self.detach_listeners();
        lock_session(&self.state).clear();
        if let Err(e) = self.kv.remove(LAST_ADDRESS_KEY) {
            tracing::debug!(error = %e, "clearing persisted address failed");
        }
    }

    /// Idempotent: a second attach while handlers are live is a no-op, so
    /// repeated connect cycles never double-deliver events.
    fn attach_listeners(&self) {
        let mut subs = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !subs.is_empty() {
            return;
        }
        for kind in [
            ProviderEventKind::AccountsChanged,
            ProviderEventKind::ChainChanged,
            ProviderEventKind::Disconnected,
        ] {
            match self.provider.subscribe(kind, self.event_handler()) {
                Ok(handle) => subs.push(handle),
                Err(e) => tracing::warn!(error = %e, ?kind, "listener attach failed"),
            }
        }
    }

    fn detach_listeners(&self) {
        let handles: Vec<SubscriptionHandle> = {
            let mut subs = self
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *subs)
        };
        for handle in handles {
            self.provider.unsubscribe(handle);
        }
    }

    fn event_handler(&self) -> EventHandler {
        let weak = self.weak_self.clone();
        Arc::new(move |event: ProviderEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.on_provider_event(event);
            }
        })
    }

    fn on_provider_event(&self, event: ProviderEvent) {
        match event {
            ProviderEvent::AccountsChanged(accounts) => self.on_accounts_changed(accounts),
            ProviderEvent::ChainChanged(chain) => self.on_chain_changed(chain),
            ProviderEvent::Disconnected => {
                tracing::info!("provider reported disconnect");
                self.teardown_local();
            }
        }
    }

    fn on_accounts_changed(&self, accounts: Vec<Address>) {
        if accounts.is_empty() {
            // The provider already dropped the authorization; tear down
            // locally without a revoke round-trip.
            self.teardown_local();
            return;
        }
        lock_session(&self.state).set_accounts(accounts);
        self.persist_active_address();
        self.spawn_balance_refresh();
    }

    fn on_chain_changed(&self, chain: ChainId) {
        lock_session(&self.state).chain_id = Some(chain);
        self.spawn_balance_refresh();
    }

    async fn request_switch(&self, target: ChainId) -> Result<(), WalletError> {
        self.provider
            .request(
                "wallet_switchEthereumChain",
                serde_json::json!([{ "chainId": target.to_hex() }]),
            )
            .await
            .map(|_| ())
    }

    /// Chain-unknown recovery: add the chain from registry metadata, then
    /// retry the switch exactly once.
    async fn add_then_retry(&self, target: ChainId) -> Result<(), WalletError> {
        let Some(meta) = self.registry.lookup(target) else {
            return Err(WalletError::ChainUnrecognized(target));
        };
        match self
            .provider
            .request("wallet_addEthereumChain", add_chain_params(meta))
            .await
        {
            Ok(_) => {}
            Err(WalletError::UserRejected) => return Ok(()),
            Err(e) => return Err(e),
        }
        match self.request_switch(target).await {
            Ok(()) | Err(WalletError::UserRejected) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn persist_active_address(&self) {
        let address = lock_session(&self.state).active_address;
        if let Some(address) = address {
            if let Err(e) = self.kv.put(LAST_ADDRESS_KEY, &address.to_string()) {
                tracing::debug!(error = %e, "persisting active address failed");
            }
        }
    }

    fn spawn_balance_refresh(&self) {
        let Some(inner) = self.weak_self.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            inner.balance.refresh().await;
        });
    }
}

fn parse_accounts(value: &Value) -> Result<Vec<Address>, WalletError> {
    let arr = value
        .as_array()
        .ok_or_else(|| WalletError::InvalidPayload("account list must be an array".to_owned()))?;
    arr.iter()
        .map(|item| {
            let raw = item.as_str().ok_or_else(|| {
                WalletError::InvalidPayload("account entry must be a string".to_owned())
            })?;
            raw.parse()
                .map_err(|e| WalletError::InvalidPayload(format!("invalid account address: {e}")))
        })
        .collect()
}

/// `wallet_addEthereumChain` request body from registry metadata.
fn add_chain_params(meta: &ChainMetadata) -> Value {
    let mut entry = serde_json::json!({
        "chainId": meta.chain_id.to_hex(),
        "chainName": meta.display_name,
        "rpcUrls": meta.rpc_endpoints,
        "nativeCurrency": {
            "name": meta.native_currency.name,
            "symbol": meta.native_currency.symbol,
            "decimals": meta.native_currency.decimals,
        },
    });
    if let Some(explorer) = &meta.explorer_base_url {
        entry["blockExplorerUrls"] = serde_json::json!([explorer]);
    }
    serde_json::json!([entry])
}
