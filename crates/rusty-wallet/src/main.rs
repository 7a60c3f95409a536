//! Rusty-Wallet: a wallet session lifecycle CLI over an EIP-1193 bridge

use std::sync::Arc;
use std::time::Duration;

use eyre::{bail, Result};

use rusty_wallet_session_adapters::{
    AdapterConfig, Eip1193ProxyGateway, HttpRpcAdapter, MemoryStoreAdapter,
};
use rusty_wallet_session_core::{
    connect_failure_message, ChainId, ChainRegistry, Session, SessionConfig, SessionFacade,
    SessionStore,
};

type Facade = SessionFacade<Eip1193ProxyGateway, HttpRpcAdapter, MemoryStoreAdapter>;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        print_usage();
        return Ok(());
    };

    let config = AdapterConfig::from_env();
    let provider = Arc::new(Eip1193ProxyGateway::new(&config)?);
    let rpc = Arc::new(HttpRpcAdapter::new(&config)?);
    let kv = Arc::new(MemoryStoreAdapter::new());
    let registry = Arc::new(ChainRegistry::builtin());
    let facade = SessionFacade::new(SessionStore::new(
        provider,
        rpc,
        kv,
        registry,
        SessionConfig::default(),
    ));

    match command {
        "status" => {
            facade.start().await;
            print_session(&facade);
        }
        "chains" => {
            for chain in facade.chain_list() {
                println!("{:>10}  {}", chain.chain_id, chain.display_name);
            }
        }
        "connect" => {
            facade.start().await;
            if let Err(e) = facade.connect().await {
                bail!("{}", connect_failure_message(&e));
            }
            facade.refresh_balance().await;
            print_session(&facade);
        }
        "disconnect" => {
            let revoke = !args.iter().any(|a| a == "--keep-permissions");
            facade.start().await;
            facade.disconnect(revoke).await;
            print_session(&facade);
        }
        "switch" => {
            let Some(raw) = args.get(1) else {
                bail!("usage: rusty-wallet switch <chain-id>");
            };
            let target = ChainId::parse(raw)?;
            facade.start().await;
            facade.switch_chain(target).await?;
            // The chain change lands via the provider event; give the
            // bridge one poll interval to deliver it before reading.
            tokio::time::sleep(Duration::from_millis(config.event_poll_interval_ms)).await;
            print_session(&facade);
        }
        "balance" => {
            facade.start().await;
            facade.refresh_balance().await;
            print_session(&facade);
        }
        "reselect" => {
            facade.start().await;
            facade.reselect_accounts().await;
        }
        "watch" => {
            facade.start().await;
            tracing::info!("watching wallet session; ctrl-c to exit");
            let mut last: Option<Session> = None;
            loop {
                let snapshot = facade.snapshot();
                if last.as_ref() != Some(&snapshot) {
                    print_session(&facade);
                    last = Some(snapshot);
                }
                tokio::time::sleep(Duration::from_millis(config.event_poll_interval_ms)).await;
            }
        }
        other => {
            print_usage();
            bail!("unknown command: {other}");
        }
    }
    Ok(())
}

fn print_session(facade: &Facade) {
    let s = facade.snapshot();
    println!("status     {:?}", s.status);
    println!(
        "address    {}",
        facade.short_address().unwrap_or_else(|| "-".to_owned())
    );
    match facade.current_chain_metadata() {
        Some(meta) => println!("chain      {} ({})", meta.display_name, meta.chain_id),
        None => println!(
            "chain      {}",
            s.chain_id.map(|c| c.to_string()).unwrap_or_else(|| "-".to_owned())
        ),
    }
    let symbol = facade
        .current_chain_metadata()
        .map(|m| m.native_currency.symbol)
        .unwrap_or_else(|| "native".to_owned());
    println!(
        "balance    {}",
        s.balance
            .map(|b| format!("{b} {symbol}"))
            .unwrap_or_else(|| "-".to_owned())
    );
}

fn print_usage() {
    println!("rusty-wallet <command>");
    println!();
    println!("  status                  probe for an authorized session and print it");
    println!("  chains                  list chains known to the registry");
    println!("  connect                 request account authorization");
    println!("  disconnect [--keep-permissions]");
    println!("                          tear the session down (revokes by default)");
    println!("  switch <chain-id>       ask the wallet to switch chains (hex or decimal)");
    println!("  balance                 refresh the native balance");
    println!("  reselect                re-open the wallet's account picker");
    println!("  watch                   print the session whenever it changes");
    println!();
    println!("environment: RUSTY_WALLET_PROXY_URL, RUSTY_WALLET_REQUEST_TIMEOUT_MS,");
    println!("             RUSTY_WALLET_EVENT_POLL_MS");
}
