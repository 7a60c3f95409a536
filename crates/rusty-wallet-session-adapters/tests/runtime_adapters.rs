mod common;

use std::io::Read;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, U256};

use rusty_wallet_session_adapters::{AdapterConfig, Eip1193ProxyGateway, HttpRpcAdapter};
use rusty_wallet_session_core::{
    ChainId, ChainMetadata, ChainRegistry, NativeCurrency, ProviderEvent, ProviderEventKind,
    ProviderPort, RpcPort, WalletError,
};

use common::{account_a, account_b, harness_with_registry};

/// Serves the same JSON-RPC response body for every request.
fn spawn_static_rpc_server(body: &'static str) -> String {
    let server = tiny_http::Server::http("127.0.0.1:0").expect("bind loopback rpc server");
    let addr = server.server_addr().to_ip().expect("tcp listener address");
    std::thread::spawn(move || {
        for request in server.incoming_requests() {
            let _ = request.respond(tiny_http::Response::from_string(body));
        }
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn http_rpc_adapter_reads_a_native_balance() {
    let endpoint =
        spawn_static_rpc_server(r#"{"jsonrpc":"2.0","id":1,"result":"0x14d1120d7b160000"}"#);
    let rpc = HttpRpcAdapter::new(&AdapterConfig::default()).expect("rpc adapter");

    let wei = rpc
        .native_balance(&endpoint, account_a())
        .await
        .expect("balance read");
    assert_eq!(wei, U256::from(1_500_000_000_000_000_000u64));
}

#[tokio::test]
async fn http_rpc_adapter_surfaces_rpc_errors_as_transport() {
    let endpoint = spawn_static_rpc_server(
        r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32005,"message":"rate limited"}}"#,
    );
    let rpc = HttpRpcAdapter::new(&AdapterConfig::default()).expect("rpc adapter");

    let err = rpc
        .native_balance(&endpoint, account_a())
        .await
        .expect_err("must fail");
    assert!(matches!(err, WalletError::Transport(_)));
}

#[tokio::test]
async fn registry_endpoint_route_feeds_the_session_balance() {
    let endpoint =
        spawn_static_rpc_server(r#"{"jsonrpc":"2.0","id":1,"result":"0x14d1120d7b160000"}"#);
    let registry = ChainRegistry::with_chains(vec![ChainMetadata {
        chain_id: ChainId(1),
        display_name: "Ethereum Mainnet".to_owned(),
        rpc_endpoints: vec![endpoint],
        explorer_base_url: None,
        native_currency: NativeCurrency {
            name: "Ether".to_owned(),
            symbol: "ETH".to_owned(),
            decimals: 18,
        },
    }]);
    let h = harness_with_registry(registry);

    h.store.connect().await.expect("connect");
    h.store.refresh_balance().await;

    assert_eq!(h.store.snapshot().balance, Some("1.5".to_owned()));
    // The chain-pinned endpoint served the read; the provider never did.
    assert_eq!(h.provider.call_count("eth_getBalance"), 0);
}

#[tokio::test]
async fn proxy_gateway_classifies_a_user_rejection() {
    let endpoint = spawn_static_rpc_server(
        r#"{"jsonrpc":"2.0","id":1,"error":{"code":4001,"message":"User rejected the request."}}"#,
    );
    let config = AdapterConfig {
        proxy_base_url: Some(endpoint),
        ..AdapterConfig::default()
    };
    let gateway = Eip1193ProxyGateway::new(&config).expect("gateway");

    assert!(gateway.is_available());
    let err = gateway
        .request("eth_requestAccounts", serde_json::json!([]))
        .await
        .expect_err("must fail");
    assert!(matches!(err, WalletError::UserRejected));
}

#[tokio::test]
async fn proxy_gateway_forwards_results() {
    let endpoint = spawn_static_rpc_server(r#"{"jsonrpc":"2.0","id":1,"result":"0x89"}"#);
    let config = AdapterConfig {
        proxy_base_url: Some(endpoint),
        ..AdapterConfig::default()
    };
    let gateway = Eip1193ProxyGateway::new(&config).expect("gateway");

    let result = gateway
        .request("eth_chainId", serde_json::json!([]))
        .await
        .expect("request");
    assert_eq!(result, serde_json::json!("0x89"));
}

#[tokio::test]
async fn gateway_without_a_bridge_is_unavailable() {
    let gateway = Eip1193ProxyGateway::new(&AdapterConfig::default()).expect("gateway");

    assert!(!gateway.is_available());
    let err = gateway
        .request("eth_accounts", serde_json::json!([]))
        .await
        .expect_err("must fail");
    assert!(matches!(err, WalletError::ProviderUnavailable));
}

#[tokio::test]
async fn proxy_watcher_reconstructs_account_events() {
    let accounts: Arc<Mutex<Vec<Address>>> = Arc::new(Mutex::new(vec![account_a()]));
    let server = tiny_http::Server::http("127.0.0.1:0").expect("bind loopback rpc server");
    let addr = server.server_addr().to_ip().expect("tcp listener address");
    let served = Arc::clone(&accounts);
    std::thread::spawn(move || {
        for mut request in server.incoming_requests() {
            let mut body = String::new();
            let _ = request.as_reader().read_to_string(&mut body);
            let result = if body.contains("eth_accounts") {
                let list: Vec<String> = served
                    .lock()
                    .expect("server state lock")
                    .iter()
                    .map(|a| a.to_string())
                    .collect();
                serde_json::json!(list)
            } else {
                serde_json::json!("0x1")
            };
            let payload = serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": result});
            let _ = request.respond(tiny_http::Response::from_string(payload.to_string()));
        }
    });

    let config = AdapterConfig {
        proxy_base_url: Some(format!("http://{addr}")),
        event_poll_interval_ms: 20,
        ..AdapterConfig::default()
    };
    let gateway = Eip1193ProxyGateway::new(&config).expect("gateway");

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    gateway
        .subscribe(
            ProviderEventKind::AccountsChanged,
            Arc::new(move |event| {
                let _ = tx.send(event);
            }),
        )
        .expect("subscribe");

    // Let the watcher prime its baseline, then move the account set.
    tokio::time::sleep(Duration::from_millis(80)).await;
    *accounts.lock().expect("test state lock") = vec![account_b()];

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event within timeout")
        .expect("channel open");
    match event {
        ProviderEvent::AccountsChanged(list) => assert_eq!(list, vec![account_b()]),
        other => panic!("unexpected event: {other:?}"),
    }
}
