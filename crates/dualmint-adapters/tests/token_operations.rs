mod common;

use alloy::primitives::U256;

use common::{
    evm_profile, ledger_profile, session, Wallets, EVM_HOLDER, EVM_OPERATOR, LEDGER_HOLDER,
    LEDGER_OPERATOR, LEDGER_TOKEN,
};
use dualmint_core::{ChainKind, PortError, SessionManager, TokenAction, TokenMethod, TokenOperator};

fn operator(manager: &SessionManager) -> TokenOperator {
    TokenOperator::new(manager.clone(), &evm_profile(), &ledger_profile())
}

#[tokio::test]
async fn evm_mint_sends_scaled_amount() {
    let wallets = Wallets::new();
    let manager = session(&wallets);
    manager.connect(ChainKind::EvmChain).await;

    let tx = operator(&manager).mint(EVM_HOLDER, "1.5").await.expect("mint");
    assert_eq!(tx.chain, ChainKind::EvmChain);
    assert_eq!(tx.action, TokenAction::Mint);
    assert_eq!(tx.initiator, EVM_OPERATOR);
    assert!(tx.tx_hash.starts_with("0x"));
    assert_eq!(tx.tx_hash.len(), 66);
    assert_eq!(tx.amount, 1.5);

    let sent = wallets.evm.sent_calls().expect("calls");
    assert_eq!(sent.len(), 1);
    let (from, call) = &sent[0];
    assert_eq!(from, EVM_OPERATOR);
    assert_eq!(call.method, TokenMethod::Mint);
    assert_eq!(call.counterparty, EVM_HOLDER);
    assert_eq!(call.amount, U256::from(1_500_000_000_000_000_000u128));
    assert_eq!(call.fee_limit, None);
}

#[tokio::test]
async fn operations_require_correct_network() {
    let wallets = Wallets::new();
    wallets.evm.debug_set_chain(56).expect("chain");
    let manager = session(&wallets);
    manager.connect(ChainKind::EvmChain).await;

    let err = operator(&manager)
        .burn(EVM_HOLDER, "1")
        .await
        .expect_err("wrong network");
    assert!(matches!(err, PortError::WrongNetwork(_)));
    assert!(wallets.evm.sent_calls().expect("calls").is_empty());
}

#[tokio::test]
async fn operations_require_connection() {
    let wallets = Wallets::new();
    let manager = session(&wallets);
    let err = operator(&manager)
        .mint(EVM_HOLDER, "1")
        .await
        .expect_err("not connected");
    assert_eq!(err.to_string(), "Please connect your wallet first.");
}

#[tokio::test]
async fn invalid_input_never_reaches_wallet() {
    let wallets = Wallets::new();
    let manager = session(&wallets);
    manager.connect(ChainKind::EvmChain).await;
    let op = operator(&manager);

    let err = op.mint("0x1234", "1").await.expect_err("bad address");
    assert_eq!(err.kind(), "VALIDATION");
    let err = op.mint(EVM_HOLDER, "0.00001").await.expect_err("too small");
    assert!(err.to_string().contains("at least 0.0001"));
    let err = op.mint(EVM_HOLDER, "abc").await.expect_err("not a number");
    assert_eq!(err.kind(), "VALIDATION");
    let err = op.mint(LEDGER_HOLDER, "1").await.expect_err("ledger address on evm");
    assert_eq!(err.kind(), "VALIDATION");
    assert!(wallets.evm.sent_calls().expect("calls").is_empty());
}

#[tokio::test]
async fn revert_is_reported_as_ownership_failure() {
    let wallets = Wallets::new();
    let manager = session(&wallets);
    manager.connect(ChainKind::EvmChain).await;
    wallets.evm.debug_revert_calls(true).expect("revert");

    let err = operator(&manager)
        .mint(EVM_HOLDER, "2")
        .await
        .expect_err("reverted");
    assert_eq!(err, PortError::Reverted("Only the owner can mint tokens.".to_owned()));
}

#[tokio::test]
async fn wallet_rejection_is_cancellation() {
    let wallets = Wallets::new();
    let manager = session(&wallets);
    manager.connect(ChainKind::EvmChain).await;
    wallets.evm.debug_reject_requests(true).expect("reject");

    let err = operator(&manager)
        .burn(EVM_HOLDER, "2")
        .await
        .expect_err("rejected");
    assert_eq!(
        err,
        PortError::UserRejected("You have canceled the burning process.".to_owned())
    );
}

#[tokio::test]
async fn ledger_burn_uses_fee_limit_and_base_units() {
    let wallets = Wallets::new();
    let manager = session(&wallets);
    manager.connect(ChainKind::LedgerChain).await;

    let tx = operator(&manager)
        .burn(LEDGER_HOLDER, "2.5")
        .await
        .expect("burn");
    assert_eq!(tx.chain, ChainKind::LedgerChain);
    assert_eq!(tx.action, TokenAction::Burn);
    assert_eq!(tx.initiator, LEDGER_OPERATOR);
    assert_eq!(tx.tx_hash.len(), 64);
    assert_eq!(tx.base_units, U256::from(2_500_000u64));

    let sent = wallets.ledger.sent_calls();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].contract, LEDGER_TOKEN);
    assert_eq!(sent[0].method, TokenMethod::BurnFrom);
    assert_eq!(sent[0].fee_limit, Some(150_000_000));
}

#[tokio::test]
async fn ledger_revert_is_reported_as_ownership_failure() {
    let wallets = Wallets::new();
    let manager = session(&wallets);
    manager.connect(ChainKind::LedgerChain).await;
    wallets.ledger.debug_revert_calls(true);

    let err = operator(&manager)
        .burn(LEDGER_HOLDER, "1")
        .await
        .expect_err("reverted");
    assert_eq!(err, PortError::Reverted("Only the owner can burn tokens.".to_owned()));
}

#[tokio::test]
async fn ledger_rejects_evm_address() {
    let wallets = Wallets::new();
    let manager = session(&wallets);
    manager.connect(ChainKind::LedgerChain).await;

    let err = operator(&manager)
        .mint(EVM_HOLDER, "1")
        .await
        .expect_err("wrong address family");
    assert_eq!(err.kind(), "VALIDATION");
    assert!(wallets.ledger.sent_calls().is_empty());
}
