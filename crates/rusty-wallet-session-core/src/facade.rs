use alloy::primitives::Address;

use crate::domain::{ChainId, ChainMetadata, ChainSummary, Session, SessionStatus};
use crate::ports::{ProviderPort, RpcPort, StorePort, WalletError};
use crate::store::SessionStore;

const SHORT_HEAD: usize = 7;
const SHORT_TAIL: usize = 5;

/// The surface consumed by UI code: read-only derived views over the
/// session plus the store actions, delegated unchanged. Holds no state of
/// its own.
pub struct SessionFacade<P, R, K> {
    store: SessionStore<P, R, K>,
}

impl<P, R, K> Clone for SessionFacade<P, R, K> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<P: ProviderPort, R: RpcPort, K: StorePort> SessionFacade<P, R, K> {
    pub fn new(store: SessionStore<P, R, K>) -> Self {
        Self { store }
    }

    /// First-use entry point: runs the silent account probe. Safe to call
    /// from every mount site; only the first call does anything.
    pub async fn start(&self) {
        self.store.probe().await;
    }

    pub fn snapshot(&self) -> Session {
        self.store.snapshot()
    }

    pub fn is_connected(&self) -> bool {
        self.store.snapshot().status == SessionStatus::Connected
    }

    /// Fixed-width head/tail display form of the active address
    /// ("0x1a2b3...f9e8d"), or `None` when disconnected.
    pub fn short_address(&self) -> Option<String> {
        self.store.snapshot().active_address.map(|a| short_display(&a))
    }

    pub fn chain_list(&self) -> Vec<ChainSummary> {
        self.store.registry().list_all()
    }

    pub fn current_chain_metadata(&self) -> Option<ChainMetadata> {
        self.store.current_chain_metadata()
    }

    pub fn last_known_address(&self) -> Option<Address> {
        self.store.last_known_address()
    }

    pub async fn connect(&self) -> Result<(), WalletError> {
        self.store.connect().await
    }

    pub async fn disconnect(&self, revoke: bool) {
        self.store.disconnect(revoke).await;
    }

    pub async fn switch_chain(&self, target: ChainId) -> Result<(), WalletError> {
        self.store.switch_chain(target).await
    }

    pub async fn reselect_accounts(&self) {
        self.store.reselect_accounts().await;
    }

    pub async fn refresh_balance(&self) {
        self.store.refresh_balance().await;
    }

}

/// Short user-facing text for a failed connect. Only the three actionable
/// failures get specific wording; everything else stays generic so
/// provider internals never leak into the UI.
pub fn connect_failure_message(err: &WalletError) -> &'static str {
    match err {
        WalletError::ProviderUnavailable => {
            "No wallet extension detected. Install a wallet to continue."
        }
        WalletError::UserRejected => "Connection request was declined in the wallet.",
        WalletError::RequestAlreadyPending => {
            "A wallet prompt is already open. Respond to it and try again."
        }
        _ => "Connection failed.",
    }
}

pub fn short_display(address: &Address) -> String {
    let full = address.to_string();
    format!(
        "{}...{}",
        &full[..SHORT_HEAD],
        &full[full.len() - SHORT_TAIL..]
    )
}
