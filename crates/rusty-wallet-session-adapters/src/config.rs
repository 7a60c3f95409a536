#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Base URL of an EIP-1193 bridge forwarding requests to an injected
    /// provider. `None` means no provider is reachable from this process.
    pub proxy_base_url: Option<String>,
    pub request_timeout_ms: u64,
    pub event_poll_interval_ms: u64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            proxy_base_url: None,
            request_timeout_ms: 15_000,
            event_poll_interval_ms: 1_000,
        }
    }
}

impl AdapterConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("RUSTY_WALLET_PROXY_URL") {
            if !url.is_empty() {
                config.proxy_base_url = Some(url);
            }
        }
        if let Some(ms) = env_ms("RUSTY_WALLET_REQUEST_TIMEOUT_MS") {
            config.request_timeout_ms = ms;
        }
        if let Some(ms) = env_ms("RUSTY_WALLET_EVENT_POLL_MS") {
            config.event_poll_interval_ms = ms;
        }
        config
    }
}

fn env_ms(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.parse().ok()
}
