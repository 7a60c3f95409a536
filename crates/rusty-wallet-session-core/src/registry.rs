use std::collections::BTreeMap;

use crate::domain::{ChainId, ChainMetadata, ChainSummary, NativeCurrency};

/// Static chain-metadata lookup. Built once, never mutated; thread-safe by
/// virtue of immutability.
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    chains: BTreeMap<ChainId, ChainMetadata>,
}

impl ChainRegistry {
    pub fn with_chains(chains: Vec<ChainMetadata>) -> Self {
        Self {
            chains: chains.into_iter().map(|c| (c.chain_id, c)).collect(),
        }
    }

    /// The shipped mainnet/testnet table.
    pub fn builtin() -> Self {
        Self::with_chains(vec![
            chain(1, "Ethereum Mainnet", &["https://rpc.ankr.com/eth"], Some("https://etherscan.io"), "Ether", "ETH"),
            chain(8453, "Base Mainnet", &["https://mainnet.base.org"], Some("https://basescan.org"), "Ether", "ETH"),
            chain(42161, "Arbitrum One", &["https://arb1.arbitrum.io/rpc"], Some("https://arbiscan.io"), "Ether", "ETH"),
            chain(137, "Polygon Mainnet", &["https://polygon-rpc.com"], Some("https://polygonscan.com"), "MATIC", "MATIC"),
            chain(56, "BNB Smart Chain", &["https://bsc-dataseed.binance.org"], Some("https://bscscan.com"), "BNB", "BNB"),
            chain(59144, "Linea", &["https://rpc.linea.build"], Some("https://lineascan.build"), "Ether", "ETH"),
            chain(11155111, "Sepolia Testnet", &["https://rpc.sepolia.org"], Some("https://sepolia.etherscan.io"), "SepoliaETH", "SepoliaETH"),
        ])
    }

    pub fn lookup(&self, chain_id: ChainId) -> Option<&ChainMetadata> {
        self.chains.get(&chain_id)
    }

    /// All known chains, sorted by display name ascending.
    pub fn list_all(&self) -> Vec<ChainSummary> {
        let mut all: Vec<ChainSummary> = self
            .chains
            .values()
            .map(|c| ChainSummary {
                chain_id: c.chain_id,
                display_name: c.display_name.clone(),
            })
            .collect();
        all.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        all
    }
}

fn chain(
    id: u64,
    name: &str,
    rpc: &[&str],
    explorer: Option<&str>,
    currency_name: &str,
    symbol: &str,
) -> ChainMetadata {
    ChainMetadata {
        chain_id: ChainId(id),
        display_name: name.to_owned(),
        rpc_endpoints: rpc.iter().map(|r| (*r).to_owned()).collect(),
        explorer_base_url: explorer.map(str::to_owned),
        native_currency: NativeCurrency {
            name: currency_name.to_owned(),
            symbol: symbol.to_owned(),
            decimals: 18,
        },
    }
}
