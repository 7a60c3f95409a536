use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rusty_wallet_session_core::{StorePort, WalletError};

/// In-memory key-value store for the optional last-known-address record.
#[derive(Debug, Clone, Default)]
pub struct MemoryStoreAdapter {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStoreAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorePort for MemoryStoreAdapter {
    fn get(&self, key: &str) -> Result<Option<String>, WalletError> {
        let g = self
            .inner
            .lock()
            .map_err(|e| WalletError::Transport(format!("store lock poisoned: {e}")))?;
        Ok(g.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), WalletError> {
        let mut g = self
            .inner
            .lock()
            .map_err(|e| WalletError::Transport(format!("store lock poisoned: {e}")))?;
        g.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), WalletError> {
        let mut g = self
            .inner
            .lock()
            .map_err(|e| WalletError::Transport(format!("store lock poisoned: {e}")))?;
        g.remove(key);
        Ok(())
    }
}
