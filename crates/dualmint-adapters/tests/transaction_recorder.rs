mod common;

use common::{recorder_with, EVM_HOLDER, LEDGER_HOLDER};
use dualmint_adapters::NotifierAdapter;
use dualmint_core::{
    ChainKind, NotificationStatus, RecordDetails, RecordKey, RecordStorePort, RecordSubmission,
    RequestOrigin, TokenAction,
};

fn mint(hash: &str, contact: Option<&str>) -> RecordSubmission {
    RecordSubmission {
        chain: ChainKind::EvmChain,
        action: TokenAction::Mint,
        tx_hash: hash.to_owned(),
        counterparty_address: EVM_HOLDER.to_owned(),
        amount: 100.0,
        contact: contact.map(str::to_owned),
    }
}

fn burn(hash: &str) -> RecordSubmission {
    RecordSubmission {
        chain: ChainKind::LedgerChain,
        action: TokenAction::Burn,
        tx_hash: hash.to_owned(),
        counterparty_address: LEDGER_HOLDER.to_owned(),
        amount: 5.0,
        contact: None,
    }
}

fn origin() -> RequestOrigin {
    RequestOrigin {
        client_ip: Some("10.0.0.7".to_owned()),
        user_agent: Some("dualmint-tests".to_owned()),
    }
}

#[tokio::test]
async fn repeated_submission_is_recorded_once() {
    let fx = recorder_with(NotifierAdapter::capture());
    let submission = mint("0xabc", Some("holder@example.com"));

    let first = fx
        .recorder
        .record(&submission, "ops@example.com", &origin())
        .await
        .expect("first");
    assert!(!first.already_existed);
    assert_eq!(first.message(), "Mint recorded successfully");
    assert_eq!(first.notification, NotificationStatus::Sent);
    assert_eq!(first.explorer_url, "https://testnet.bscscan.com/tx/0xabc");

    let second = fx
        .recorder
        .record(&submission, "ops@example.com", &origin())
        .await
        .expect("second");
    assert!(second.already_existed);
    assert_eq!(second.message(), "Transaction already recorded");
    assert_eq!(second.record, first.record);

    assert_eq!(fx.store.len().await, 1);
    assert_eq!(fx.notifier.captured().len(), 1);
    let audit = fx.audit.entries();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, "mint");
    assert_eq!(audit[0].metadata["txHash"], "0xabc");
    assert_eq!(audit[0].metadata["notificationSent"], true);
    assert_eq!(audit[0].origin, origin());
}

#[tokio::test]
async fn evm_hash_case_does_not_create_duplicates() {
    let fx = recorder_with(NotifierAdapter::capture());
    fx.recorder
        .record(&mint("0xABC", None), "ops", &origin())
        .await
        .expect("first");
    let again = fx
        .recorder
        .record(&mint(" 0xabc ", None), "ops", &origin())
        .await
        .expect("second");
    assert!(again.already_existed);
    assert_eq!(fx.store.len().await, 1);
}

#[tokio::test]
async fn concurrent_duplicates_yield_one_record() {
    let fx = recorder_with(NotifierAdapter::capture());
    let submission = mint("0xdef", Some("holder@example.com"));

    let origin = origin();
    let (a, b) = tokio::join!(
        fx.recorder.record(&submission, "ops", &origin),
        fx.recorder.record(&submission, "ops", &origin)
    );
    let outcomes = [a.expect("a"), b.expect("b")];
    assert_eq!(outcomes.iter().filter(|o| !o.already_existed).count(), 1);
    assert_eq!(fx.store.len().await, 1);
    assert_eq!(fx.notifier.captured().len(), 1);
}

#[tokio::test]
async fn mint_expiry_follows_token_lifespan() {
    let fx = recorder_with(NotifierAdapter::capture());
    let outcome = fx
        .recorder
        .record(&mint("0x01", None), "ops", &origin())
        .await
        .expect("record");
    match outcome.record.details {
        RecordDetails::Mint { expiry_date, .. } => {
            assert_eq!(expiry_date, outcome.record.timestamp.plus_days(180));
        }
        other => panic!("expected mint details, got {other:?}"),
    }
    assert_eq!(outcome.notification, NotificationStatus::NotRequested);
}

#[tokio::test]
async fn failed_notification_is_stored_as_not_sent() {
    let notifier = NotifierAdapter::capture();
    notifier.debug_fail(true);
    let fx = recorder_with(notifier);

    let outcome = fx
        .recorder
        .record(&mint("0x02", Some("holder@example.com")), "ops", &origin())
        .await
        .expect("record survives notifier failure");
    assert!(!outcome.already_existed);
    assert_eq!(outcome.notification, NotificationStatus::Failed);

    let stored = fx
        .store
        .find(&RecordKey::new(ChainKind::EvmChain, "0x02"))
        .await
        .expect("find")
        .expect("stored");
    assert_eq!(stored.notification_status(), NotificationStatus::Failed);
}

#[tokio::test]
async fn unconfigured_notifier_is_skipped() {
    let fx = recorder_with(NotifierAdapter::disabled());
    let outcome = fx
        .recorder
        .record(&mint("0x03", Some("holder@example.com")), "ops", &origin())
        .await
        .expect("record");
    assert_eq!(outcome.notification, NotificationStatus::Failed);
    assert_eq!(fx.audit.entries()[0].metadata["contact"], "holder@example.com");
}

#[tokio::test]
async fn burn_is_recorded_without_notification() {
    let fx = recorder_with(NotifierAdapter::capture());
    let outcome = fx
        .recorder
        .record(&burn("7c2d"), "ops", &origin())
        .await
        .expect("record");
    assert_eq!(outcome.message(), "Burn recorded successfully");
    assert_eq!(outcome.notification, NotificationStatus::NotRequested);
    assert!(outcome.explorer_url.ends_with("#/transaction/7c2d"));
    assert!(fx.notifier.captured().is_empty());
    let audit = fx.audit.entries();
    assert_eq!(audit[0].action, "burn");
    assert_eq!(audit[0].metadata["contact"], "N/A");
}

#[tokio::test]
async fn invalid_submission_is_not_stored() {
    let fx = recorder_with(NotifierAdapter::capture());
    let bad = RecordSubmission {
        amount: -1.0,
        ..mint("0x04", Some("not-an-email"))
    };
    let err = fx
        .recorder
        .record(&bad, "ops", &origin())
        .await
        .expect_err("invalid");
    assert_eq!(err.kind(), "VALIDATION");
    assert!(err.to_string().contains("Amount must be positive"));
    assert!(err.to_string().contains("Invalid email format"));
    assert!(fx.store.is_empty().await);
}

#[tokio::test]
async fn store_outage_surfaces_and_fails_health() {
    let fx = recorder_with(NotifierAdapter::capture());
    fx.store.debug_set_unavailable(true);

    let err = fx
        .recorder
        .record(&mint("0x05", None), "ops", &origin())
        .await
        .expect_err("store down");
    assert_eq!(err.kind(), "PERSISTENCE");

    let health = fx.recorder.health().await;
    assert!(!health.store_ok);
    assert!(!health.is_healthy());
}

#[tokio::test]
async fn failure_audit_uses_error_suffix() {
    let fx = recorder_with(NotifierAdapter::disabled());
    let err = dualmint_core::PortError::Validation("Amount must be positive".to_owned());
    fx.recorder
        .record_failure(TokenAction::Burn, "ops", &origin(), &err)
        .await;
    let audit = fx.audit.entries();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, "burn_error");
    assert_eq!(audit[0].metadata["kind"], "VALIDATION");
}

#[tokio::test]
async fn audit_outage_does_not_fail_recording() {
    let fx = recorder_with(NotifierAdapter::capture());
    fx.audit.debug_fail(true);
    let outcome = fx
        .recorder
        .record(&burn("99aa"), "ops", &origin())
        .await
        .expect("record");
    assert!(!outcome.already_existed);
    assert!(fx.audit.entries().is_empty());
}
