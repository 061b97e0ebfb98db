mod common;

use std::sync::{Arc, Mutex};
use std::thread;

use alloy::primitives::U256;
use serde_json::{json, Value};
use tiny_http::{Header, Response, Server, StatusCode};

use common::{evm_profile, ledger_profile, settle, LEDGER_HOLDER, LEDGER_OPERATOR, LEDGER_TOKEN};
use dualmint_adapters::{AdapterConfig, BroadcastBus, InjectedWalletSource, LedgerExtensionAdapter};
use dualmint_core::{
    ChainKind, LedgerExtensionPort, NetworkIdentity, PortError, SessionManager, TokenCall,
    TokenMethod,
};

/// What the bridged wallet reports and what it was asked to do.
struct WalletScript {
    state: Value,
    reject_sends: bool,
    revert_reads: bool,
    sends: Vec<Value>,
    reads: Vec<Value>,
}

impl WalletScript {
    fn unlocked(node: &str) -> Self {
        Self {
            state: json!({ "ready": true, "address": LEDGER_OPERATOR, "fullNode": node }),
            reject_sends: false,
            revert_reads: false,
            sends: Vec::new(),
            reads: Vec::new(),
        }
    }
}

struct MockWallet {
    url: String,
    script: Arc<Mutex<WalletScript>>,
    server: Arc<Server>,
    join: Option<thread::JoinHandle<()>>,
}

impl Drop for MockWallet {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn rpc_result(result: Value) -> (u16, Value) {
    (200, json!({ "jsonrpc": "2.0", "id": 1, "result": result }))
}

fn answer(script: &Mutex<WalletScript>, path: &str, body: Value) -> (u16, Value) {
    let Ok(mut g) = script.lock() else {
        return (500, json!({ "error": "script poisoned" }));
    };
    if path == "/wallet/triggerconstantcontract" {
        g.reads.push(body);
        if g.revert_reads {
            // "REVERT opcode executed", hex-encoded like the node does.
            return (
                200,
                json!({ "result": { "code": "CONTRACT_EXE_ERROR", "message": "524556455254206f70636f6465206578656375746564" } }),
            );
        }
        let word = format!("{:064x}", 5_000_000u64);
        return (200, json!({ "result": { "result": true }, "constant_result": [word] }));
    }
    match body["method"].as_str().unwrap_or_default() {
        "tron_requestAccounts" => rpc_result(json!({ "code": 200, "message": "ok" })),
        "tron_getState" => rpc_result(g.state.clone()),
        "tron_triggerSmartContract" if g.reject_sends => (
            200,
            json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": 4001, "message": "Confirmation declined by user" } }),
        ),
        "tron_triggerSmartContract" => {
            g.sends.push(body["params"][0].clone());
            rpc_result(json!({ "txid": "7c2d".repeat(16) }))
        }
        other => (404, json!({ "error": format!("no route for {other}") })),
    }
}

fn spawn_wallet(script: WalletScript) -> MockWallet {
    let server = Arc::new(Server::http("127.0.0.1:0").expect("start server"));
    let url = format!("http://{}", server.server_addr());
    let script = Arc::new(Mutex::new(script));

    let join = {
        let server = Arc::clone(&server);
        let script = Arc::clone(&script);
        thread::spawn(move || {
            for mut req in server.incoming_requests() {
                let body: Value = serde_json::from_reader(req.as_reader()).unwrap_or(Value::Null);
                let (code, payload) = answer(&script, req.url(), body);
                let header = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                    .expect("header");
                let response = Response::from_string(payload.to_string())
                    .with_status_code(StatusCode(code))
                    .with_header(header);
                let _ = req.respond(response);
            }
        })
    };

    MockWallet {
        url,
        script,
        server,
        join: Some(join),
    }
}

fn bridged_extension(wallet: &MockWallet, bus: &BroadcastBus) -> LedgerExtensionAdapter {
    let config = AdapterConfig {
        ledger_proxy_url: Some(wallet.url.clone()),
        ledger_node_api_url: Some(wallet.url.clone()),
        ..AdapterConfig::default()
    };
    LedgerExtensionAdapter::with_config(&config).with_bus(bus.clone())
}

fn session_over(extension: &LedgerExtensionAdapter, bus: &BroadcastBus) -> SessionManager {
    let source = InjectedWalletSource::new()
        .with_ledger(Arc::new(extension.clone()))
        .with_channel(Arc::new(bus.clone()));
    SessionManager::new(Arc::new(source), evm_profile(), ledger_profile())
}

fn mint_call() -> TokenCall {
    TokenCall {
        contract: LEDGER_TOKEN.to_owned(),
        method: TokenMethod::Mint,
        counterparty: LEDGER_HOLDER.to_owned(),
        amount: U256::from(1_500_000u64),
        fee_limit: Some(150_000_000),
    }
}

#[tokio::test]
async fn connect_uses_bridged_account_and_node() {
    let wallet = spawn_wallet(WalletScript::unlocked("https://api.trongrid.io"));
    let bus = BroadcastBus::new("main-frame");
    let extension = bridged_extension(&wallet, &bus);
    let manager = session_over(&extension, &bus);

    let snap = manager.connect(ChainKind::LedgerChain).await;
    assert!(snap.invariants_hold());
    assert!(snap.session.is_connected);
    assert!(snap.session.is_network_correct);
    assert_eq!(snap.session.address.as_deref(), Some(LEDGER_OPERATOR));
    assert_eq!(
        snap.session.network_identity,
        Some(NetworkIdentity::Node("https://api.trongrid.io".to_owned()))
    );
    assert_eq!(manager.signer().await.expect("signer").address, LEDGER_OPERATOR);
}

#[tokio::test]
async fn balance_is_read_through_node_api() {
    let wallet = spawn_wallet(WalletScript::unlocked("https://api.trongrid.io"));
    let bus = BroadcastBus::new("main-frame");
    let extension = bridged_extension(&wallet, &bus);
    extension.request_accounts().await.expect("permission");

    let instance = extension.injected().expect("instance");
    let balance = instance
        .contract_balance_of(LEDGER_TOKEN, LEDGER_HOLDER)
        .await
        .expect("balance");
    assert_eq!(balance, U256::from(5_000_000u64));

    let reads = wallet.script.lock().expect("script").reads.clone();
    assert_eq!(reads.len(), 1);
    assert_eq!(reads[0]["function_selector"], "balanceOf(address)");
    assert_eq!(reads[0]["contract_address"], LEDGER_TOKEN);
    assert_eq!(reads[0]["visible"], true);
    assert_eq!(reads[0]["parameter"].as_str().map(str::len), Some(64));
}

#[tokio::test]
async fn reverted_read_surfaces_decoded_message() {
    let mut script = WalletScript::unlocked("https://api.trongrid.io");
    script.revert_reads = true;
    let wallet = spawn_wallet(script);
    let bus = BroadcastBus::new("main-frame");
    let extension = bridged_extension(&wallet, &bus);

    let err = extension
        .injected()
        .expect("instance")
        .contract_balance_of(LEDGER_TOKEN, LEDGER_HOLDER)
        .await
        .expect_err("reverted");
    assert_eq!(err.kind(), "REVERTED");
    assert!(err.to_string().contains("REVERT opcode executed"));
}

#[tokio::test]
async fn send_goes_through_bridge_with_encoded_call() {
    let wallet = spawn_wallet(WalletScript::unlocked("https://api.trongrid.io"));
    let bus = BroadcastBus::new("main-frame");
    let extension = bridged_extension(&wallet, &bus);
    extension.request_accounts().await.expect("permission");

    let id = extension
        .injected()
        .expect("instance")
        .contract_send(&mint_call())
        .await
        .expect("sent");
    assert_eq!(id.len(), 64);

    let sends = wallet.script.lock().expect("script").sends.clone();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0]["ownerAddress"], LEDGER_OPERATOR);
    assert_eq!(sends[0]["functionSelector"], "mint(address,uint256)");
    assert_eq!(sends[0]["feeLimit"], 150_000_000);
    let parameter = sends[0]["parameter"].as_str().expect("parameter");
    assert_eq!(parameter.len(), 128);
    assert!(parameter.ends_with(&format!("{:064x}", 1_500_000u64)));
}

#[tokio::test]
async fn declined_send_is_user_rejection() {
    let mut script = WalletScript::unlocked("https://api.trongrid.io");
    script.reject_sends = true;
    let wallet = spawn_wallet(script);
    let bus = BroadcastBus::new("main-frame");
    let extension = bridged_extension(&wallet, &bus);
    extension.request_accounts().await.expect("permission");

    let err = extension
        .injected()
        .expect("instance")
        .contract_send(&mint_call())
        .await
        .expect_err("declined");
    assert_eq!(
        err,
        PortError::UserRejected("Confirmation declined by user".to_owned())
    );
}

#[tokio::test]
async fn node_change_seen_on_sync_reaches_session() {
    let wallet = spawn_wallet(WalletScript::unlocked("https://api.trongrid.io"));
    let bus = BroadcastBus::new("main-frame");
    let extension = bridged_extension(&wallet, &bus);
    let manager = session_over(&extension, &bus);
    let _mount = manager.mount().expect("mount");
    manager.connect(ChainKind::LedgerChain).await;

    wallet.script.lock().expect("script").state = json!({
        "ready": true,
        "address": LEDGER_OPERATOR,
        "fullNode": "https://api.shasta.trongrid.io",
    });
    extension.sync_state().await.expect("sync");

    let snap = settle(&manager, |s| !s.session.is_network_correct).await;
    assert!(snap.session.is_connected);
    assert!(!snap.has_signer);
}

#[tokio::test]
async fn locked_wallet_hides_account() {
    let wallet = spawn_wallet(WalletScript::unlocked("https://api.trongrid.io"));
    let bus = BroadcastBus::new("main-frame");
    let extension = bridged_extension(&wallet, &bus);
    extension.request_accounts().await.expect("permission");
    let instance = extension.injected().expect("instance");
    assert_eq!(instance.default_address().as_deref(), Some(LEDGER_OPERATOR));

    wallet.script.lock().expect("script").state =
        json!({ "ready": false, "address": false, "fullNode": "https://api.trongrid.io" });
    extension.sync_state().await.expect("sync");
    assert!(!extension.is_ready());
    assert_eq!(instance.default_address(), None);
}
