use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::U256;
use serde_json::Value;

use crate::domain::{
    format_native_amount, lock_session, BalanceRequestContext, ChainId, Session,
};
use crate::ports::{ProviderPort, RpcPort, WalletError};
use crate::registry::ChainRegistry;

const NATIVE_DECIMALS_FALLBACK: u8 = 18;

/// Native-balance refresh against the session's current account and chain.
///
/// A refresh captures `(active_address, chain_id)` up front and applies its
/// result only if the live session still matches that pair when the read
/// resolves; anything else is discarded as stale. At most one query is in
/// flight at a time: late callers join the running one.
pub struct BalanceFetcher<P, R> {
    provider: Arc<P>,
    rpc: Arc<R>,
    registry: Arc<ChainRegistry>,
    state: Arc<Mutex<Session>>,
    gate: tokio::sync::Mutex<()>,
    retry_backoff: Duration,
}

impl<P: ProviderPort, R: RpcPort> BalanceFetcher<P, R> {
    pub(crate) fn new(
        provider: Arc<P>,
        rpc: Arc<R>,
        registry: Arc<ChainRegistry>,
        state: Arc<Mutex<Session>>,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            provider,
            rpc,
            registry,
            state,
            gate: tokio::sync::Mutex::new(()),
            retry_backoff,
        }
    }

    pub async fn refresh(&self) {
        let ctx = {
            let mut s = lock_session(&self.state);
            match (s.active_address, s.chain_id) {
                (Some(address), Some(chain_id)) => BalanceRequestContext { address, chain_id },
                _ => {
                    s.balance = None;
                    return;
                }
            }
        };

        let _gate = match self.gate.try_lock() {
            Ok(g) => g,
            Err(_) => {
                // A query is already in flight. Wait for it to apply its
                // outcome instead of issuing a second concurrent one.
                let _joined = self.gate.lock().await;
                return;
            }
        };

        let outcome = self.query(&ctx).await;

        let mut s = lock_session(&self.state);
        if s.active_address != Some(ctx.address) || s.chain_id != Some(ctx.chain_id) {
            // The session moved on while the read was in flight. Not an
            // error; the result is just no longer relevant.
            tracing::debug!(
                address = %ctx.address,
                chain = %ctx.chain_id,
                "discarding stale balance result"
            );
            return;
        }
        match outcome {
            Ok(amount) => s.balance = Some(amount),
            Err(e) => {
                tracing::debug!(error = %e, "balance refresh failed");
                s.balance = None;
            }
        }
    }

    async fn query(&self, ctx: &BalanceRequestContext) -> Result<String, WalletError> {
        let wei = match self.read_wei(ctx).await {
            Err(WalletError::TransientNetworkMismatch) => {
                tokio::time::sleep(self.retry_backoff).await;
                self.read_wei(ctx).await?
            }
            other => other?,
        };
        let decimals = self
            .registry
            .lookup(ctx.chain_id)
            .map(|m| m.native_currency.decimals)
            .unwrap_or(NATIVE_DECIMALS_FALLBACK);
        format_native_amount(wei, decimals)
    }

    /// Prefers a chain-pinned registry endpoint; falls back to routing the
    /// query through the wallet provider itself.
    async fn read_wei(&self, ctx: &BalanceRequestContext) -> Result<U256, WalletError> {
        if let Some(endpoint) = self.endpoint_for(ctx.chain_id) {
            return self.rpc.native_balance(&endpoint, ctx.address).await;
        }
        let raw = self
            .provider
            .request(
                "eth_getBalance",
                serde_json::json!([ctx.address.to_string(), "latest"]),
            )
            .await?;
        parse_wei_quantity(&raw)
    }

    fn endpoint_for(&self, chain_id: ChainId) -> Option<String> {
        self.registry
            .lookup(chain_id)
            .and_then(|m| m.rpc_endpoints.first().cloned())
    }
}

fn parse_wei_quantity(value: &Value) -> Result<U256, WalletError> {
    let raw = value
        .as_str()
        .ok_or_else(|| WalletError::InvalidPayload("balance must be a hex quantity".to_owned()))?;
    U256::from_str_radix(raw.trim_start_matches("0x"), 16)
        .map_err(|e| WalletError::InvalidPayload(format!("invalid balance quantity: {e}")))
}
