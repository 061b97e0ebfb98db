mod common;

use common::{session, settle, Wallets, LEDGER_HOLDER, LEDGER_OPERATOR};
use dualmint_core::{ChainKind, NetworkIdentity, SessionState};

#[tokio::test(start_paused = true)]
async fn readiness_poll_tolerates_late_injection() {
    let wallets = Wallets::new();
    wallets.ledger.debug_delay_injection(1);
    let manager = session(&wallets);

    let snap = manager.connect(ChainKind::LedgerChain).await;
    assert!(snap.session.is_connected);
    assert_eq!(snap.session.address.as_deref(), Some(LEDGER_OPERATOR));
}

#[tokio::test(start_paused = true)]
async fn readiness_poll_gives_up_after_policy() {
    let wallets = Wallets::new();
    wallets.ledger.debug_delay_injection(10);
    let manager = session(&wallets);

    let snap = manager.connect(ChainKind::LedgerChain).await;
    assert!(snap.invariants_hold());
    assert_eq!(snap.state, SessionState::Disconnected);
    assert_eq!(
        snap.session.last_error.as_deref(),
        Some("Failed to get account details after connecting. Try refreshing.")
    );
}

#[tokio::test]
async fn locked_extension_is_not_ready() {
    let wallets = Wallets::new();
    wallets.ledger.debug_set_ready(false);
    let manager = session(&wallets);

    let snap = manager.connect(ChainKind::LedgerChain).await;
    assert_eq!(snap.state, SessionState::Disconnected);
    assert_eq!(
        snap.session.last_error.as_deref(),
        Some("Wallet extension is not ready. Please log in or set it up.")
    );
}

#[tokio::test]
async fn rejected_permission_fails_connect() {
    let wallets = Wallets::new();
    wallets.ledger.debug_reject_permission(true);
    let manager = session(&wallets);

    let snap = manager.connect(ChainKind::LedgerChain).await;
    assert_eq!(snap.state, SessionState::Disconnected);
    assert!(snap
        .session
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("rejected")));
}

#[tokio::test]
async fn broadcast_account_switch_is_applied() {
    let wallets = Wallets::new();
    let manager = session(&wallets);
    let _mount = manager.mount().expect("mount");
    manager.connect(ChainKind::LedgerChain).await;
    let old = manager.signer().await.expect("signer");

    wallets
        .ledger
        .debug_switch_account(LEDGER_HOLDER)
        .expect("switch");
    let snap = settle(&manager, |s| {
        s.session.address.as_deref() == Some(LEDGER_HOLDER) && s.has_signer
    })
    .await;
    assert!(snap.session.is_network_correct);
    assert!(manager.ensure_current(&old).is_err());
    assert_eq!(manager.signer().await.expect("signer").address, LEDGER_HOLDER);
}

#[tokio::test]
async fn broadcast_lock_disconnects() {
    let wallets = Wallets::new();
    let manager = session(&wallets);
    let _mount = manager.mount().expect("mount");
    manager.connect(ChainKind::LedgerChain).await;

    wallets.ledger.debug_lock().expect("lock");
    let snap = settle(&manager, |s| s.state == SessionState::Disconnected).await;
    assert_eq!(snap.session.chain_kind, ChainKind::LedgerChain);
    assert_eq!(snap.session.address, None);
}

#[tokio::test]
async fn broadcast_node_change_marks_wrong_network() {
    let wallets = Wallets::new();
    let manager = session(&wallets);
    let _mount = manager.mount().expect("mount");
    manager.connect(ChainKind::LedgerChain).await;

    wallets
        .ledger
        .debug_set_node("https://api.shasta.trongrid.io")
        .expect("node");
    let snap = settle(&manager, |s| !s.session.is_network_correct).await;
    assert!(snap.session.is_connected);
    assert!(!snap.has_signer);
    assert_eq!(
        snap.session.network_identity,
        Some(NetworkIdentity::Node("https://api.shasta.trongrid.io".to_owned()))
    );
    assert!(snap
        .session
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("LEDGER_MAINNET")));
}

#[tokio::test]
async fn foreign_broadcasts_are_ignored() {
    let wallets = Wallets::new();
    let manager = session(&wallets);
    let _mount = manager.mount().expect("mount");
    manager.connect(ChainKind::LedgerChain).await;

    wallets
        .bus
        .post_from(
            dualmint_core::ContextId("ad-frame".to_owned()),
            serde_json::json!({
                "message": { "action": "setAccount", "data": { "address": false } }
            }),
        )
        .expect("post");
    tokio::task::yield_now().await;
    let snap = manager.snapshot();
    assert!(snap.session.is_connected);
    assert_eq!(snap.session.address.as_deref(), Some(LEDGER_OPERATOR));
}

#[tokio::test]
async fn unmounting_releases_listeners() {
    let wallets = Wallets::new();
    let manager = session(&wallets);
    let mount = manager.mount().expect("mount");
    assert_eq!(wallets.bus.listener_count().expect("count"), 1);
    assert_eq!(wallets.evm.listener_count().expect("count"), 1);
    drop(mount);
    assert_eq!(wallets.bus.listener_count().expect("count"), 0);
    assert_eq!(wallets.evm.listener_count().expect("count"), 0);
}
