use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use alloy::primitives::{utils::format_units, Address, U256};
use serde::{Deserialize, Serialize};

use crate::ports::WalletError;

/// EVM chain identifier. Decimal internally, hex-prefixed on the wire
/// (`eth_chainId`, `chainChanged`, `wallet_switchEthereumChain`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl ChainId {
    /// Accepts both forms the ecosystem produces: `0x`-prefixed hex and
    /// plain decimal.
    pub fn parse(raw: &str) -> Result<Self, WalletError> {
        if raw.starts_with("0x") || raw.starts_with("0X") {
            u64::from_str_radix(raw.trim_start_matches("0x").trim_start_matches("0X"), 16)
                .map(Self)
                .map_err(|e| WalletError::InvalidPayload(format!("invalid hex chain id: {e}")))
        } else {
            raw.parse()
                .map(Self)
                .map_err(|e| WalletError::InvalidPayload(format!("invalid chain id: {e}")))
        }
    }

    pub fn to_hex(self) -> String {
        format!("0x{:x}", self.0)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// The single mutable session aggregate. One instance per store; reads are
/// served as clones so UI code never holds the live state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub status: SessionStatus,
    /// Wallet-reported order; the first entry is the active account.
    pub accounts: Vec<Address>,
    pub active_address: Option<Address>,
    pub chain_id: Option<ChainId>,
    /// Native-currency amount in whole units as a decimal string.
    pub balance: Option<String>,
    /// Set exactly once, after the first silent account probe resolves.
    pub has_completed_initial_check: bool,
    /// Invariant: true iff `status == Connected`.
    pub listeners_attached: bool,
}

impl Session {
    pub fn new() -> Self {
        Self {
            status: SessionStatus::Disconnected,
            accounts: Vec::new(),
            active_address: None,
            chain_id: None,
            balance: None,
            has_completed_initial_check: false,
            listeners_attached: false,
        }
    }

    /// Replaces the account list, keeping `active_address` in lock-step:
    /// `None` iff the list is empty, otherwise the first entry.
    pub(crate) fn set_accounts(&mut self, accounts: Vec<Address>) {
        self.active_address = accounts.first().copied();
        self.accounts = accounts;
    }

    pub(crate) fn clear(&mut self) {
        self.status = SessionStatus::Disconnected;
        self.accounts.clear();
        self.active_address = None;
        self.chain_id = None;
        self.balance = None;
        self.listeners_attached = false;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// `(address, chain)` pair captured when an async balance read starts.
/// The result is applied only if the live session still matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceRequestContext {
    pub address: Address,
    pub chain_id: ChainId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainMetadata {
    pub chain_id: ChainId,
    pub display_name: String,
    pub rpc_endpoints: Vec<String>,
    pub explorer_base_url: Option<String>,
    pub native_currency: NativeCurrency,
}

/// Abbreviated registry row for chain pickers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSummary {
    pub chain_id: ChainId,
    pub display_name: String,
}

/// Session-level tunables. The retry backoff is the only knob the state
/// machine itself consumes; adapters carry their own config.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub balance_retry_backoff: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            balance_retry_backoff: Duration::from_millis(150),
        }
    }
}

/// A poisoned session lock only ever holds a fully-written `Session`
/// (every mutation completes before the guard drops), so the value is
/// recovered rather than propagating the poison.
pub(crate) fn lock_session(state: &Mutex<Session>) -> MutexGuard<'_, Session> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Formats a wei-denominated amount as a whole-unit decimal string,
/// trailing zeros trimmed ("1.500000000000000000" -> "1.5").
pub fn format_native_amount(wei: U256, decimals: u8) -> Result<String, WalletError> {
    let raw = format_units(wei, decimals)
        .map_err(|e| WalletError::InvalidPayload(format!("unit formatting failed: {e}")))?;
    Ok(trim_decimal(&raw))
}

fn trim_decimal(raw: &str) -> String {
    if !raw.contains('.') {
        return raw.to_owned();
    }
    let trimmed = raw.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() {
        "0".to_owned()
    } else {
        trimmed.to_owned()
    }
}
