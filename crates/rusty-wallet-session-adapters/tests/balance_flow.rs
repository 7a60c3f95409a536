mod common;

use alloy::primitives::U256;

use rusty_wallet_session_core::{ChainId, WalletError};

use common::{account_a, account_b, default_account, harness, settle};

fn eth(units: u64) -> U256 {
    U256::from(units) * U256::from(1_000_000_000_000_000_000u64)
}

#[tokio::test]
async fn connect_kicks_off_an_initial_refresh() {
    let h = harness();
    h.provider
        .set_balance(ChainId(1), default_account(), eth(2));

    h.store.connect().await.expect("connect");
    settle().await;

    assert_eq!(h.store.snapshot().balance, Some("2".to_owned()));
}

#[tokio::test]
async fn refresh_without_an_active_session_clears_the_balance() {
    let h = harness();
    h.store.refresh_balance().await;

    assert_eq!(h.store.snapshot().balance, None);
    assert_eq!(h.provider.call_count("eth_getBalance"), 0);
}

#[tokio::test]
async fn late_result_from_a_previous_chain_is_discarded() {
    let h = harness();
    h.provider.set_accounts(vec![account_a()]);
    h.provider.set_balance(ChainId(1), account_a(), eth(2));
    h.provider.set_balance(ChainId(8453), account_a(), eth(3));
    h.provider.hold_requests("eth_getBalance");

    h.store.connect().await.expect("connect");
    settle().await;
    // The connect-time refresh is now parked in flight under chain 1.
    assert_eq!(h.provider.call_count("eth_getBalance"), 1);

    // The wallet moves to another chain before the read resolves.
    h.provider.emit_chain_changed(ChainId(8453));
    settle().await;

    h.provider.release_requests("eth_getBalance");
    settle().await;

    // The stale result never lands.
    assert_eq!(h.store.snapshot().balance, None);
    assert_eq!(h.store.snapshot().chain_id, Some(ChainId(8453)));

    h.store.refresh_balance().await;
    assert_eq!(h.store.snapshot().balance, Some("3".to_owned()));
}

#[tokio::test]
async fn stale_failure_leaves_the_previous_balance_untouched() {
    let h = harness();
    h.provider.set_accounts(vec![account_a()]);
    h.provider.set_balance(ChainId(1), account_a(), eth(1));
    h.store.connect().await.expect("connect");
    settle().await;
    assert_eq!(h.store.snapshot().balance, Some("1".to_owned()));

    h.provider.hold_requests("eth_getBalance");
    h.provider.enqueue_failure(
        "eth_getBalance",
        WalletError::ProviderRpc {
            code: -32000,
            message: "backend overloaded".to_owned(),
        },
    );

    // A fetch starts for account B, then the wallet switches back to A
    // while it is still in flight.
    h.provider.emit_accounts_changed(vec![account_b()]);
    settle().await;
    h.provider.emit_accounts_changed(vec![account_a()]);
    settle().await;

    h.provider.release_requests("eth_getBalance");
    settle().await;

    // The failed read belonged to B's context; A's balance survives for
    // the next refresh to resolve.
    let s = h.store.snapshot();
    assert_eq!(s.active_address, Some(account_a()));
    assert_eq!(s.balance, Some("1".to_owned()));
}

#[tokio::test]
async fn current_failure_degrades_the_balance_to_unknown() {
    let h = harness();
    h.provider.set_balance(ChainId(1), default_account(), eth(1));
    h.store.connect().await.expect("connect");
    settle().await;
    assert_eq!(h.store.snapshot().balance, Some("1".to_owned()));

    h.provider.enqueue_failure(
        "eth_getBalance",
        WalletError::ProviderRpc {
            code: -32000,
            message: "backend overloaded".to_owned(),
        },
    );
    h.store.refresh_balance().await;

    assert_eq!(h.store.snapshot().balance, None);
}

#[tokio::test]
async fn network_mismatch_is_retried_exactly_once() {
    let h = harness();
    h.provider
        .set_balance(ChainId(1), default_account(), eth(5));
    h.store.connect().await.expect("connect");
    settle().await;

    let before = h.provider.call_count("eth_getBalance");
    h.provider
        .enqueue_failure("eth_getBalance", WalletError::TransientNetworkMismatch);
    h.store.refresh_balance().await;

    assert_eq!(h.provider.call_count("eth_getBalance"), before + 2);
    assert_eq!(h.store.snapshot().balance, Some("5".to_owned()));
}

#[tokio::test]
async fn repeated_network_mismatch_gives_up_after_one_retry() {
    let h = harness();
    h.provider
        .set_balance(ChainId(1), default_account(), eth(5));
    h.store.connect().await.expect("connect");
    settle().await;

    let before = h.provider.call_count("eth_getBalance");
    h.provider
        .enqueue_failure("eth_getBalance", WalletError::TransientNetworkMismatch);
    h.provider
        .enqueue_failure("eth_getBalance", WalletError::TransientNetworkMismatch);
    h.store.refresh_balance().await;

    assert_eq!(h.provider.call_count("eth_getBalance"), before + 2);
    assert_eq!(h.store.snapshot().balance, None);
}

#[tokio::test]
async fn concurrent_refreshes_coalesce_into_one_query() {
    let h = harness();
    h.provider
        .set_balance(ChainId(1), default_account(), eth(4));
    h.store.connect().await.expect("connect");
    settle().await;

    let before = h.provider.call_count("eth_getBalance");
    h.provider.hold_requests("eth_getBalance");

    let store_a = h.store.clone();
    let first = tokio::spawn(async move { store_a.refresh_balance().await });
    settle().await;
    assert_eq!(h.provider.call_count("eth_getBalance"), before + 1);

    let store_b = h.store.clone();
    let second = tokio::spawn(async move { store_b.refresh_balance().await });
    settle().await;

    h.provider.release_requests("eth_getBalance");
    first.await.expect("join first");
    second.await.expect("join second");

    assert_eq!(h.provider.call_count("eth_getBalance"), before + 1);
    assert_eq!(h.store.snapshot().balance, Some("4".to_owned()));
}

#[tokio::test]
async fn fractional_amounts_render_in_whole_units() {
    let h = harness();
    h.provider.set_balance(
        ChainId(1),
        default_account(),
        U256::from(1_500_000_000_000_000_000u64),
    );
    h.store.connect().await.expect("connect");
    settle().await;

    assert_eq!(h.store.snapshot().balance, Some("1.5".to_owned()));
}
