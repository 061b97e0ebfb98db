use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use alloy::primitives::{keccak256, U256};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use dualmint_core::{
    LedgerExtensionPort, LedgerInstancePort, LedgerPermission, PortError, TokenCall,
};

use crate::{AdapterConfig, BroadcastBus};

const DEFAULT_ACCOUNT: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";
const DEFAULT_NODE: &str = "https://api.trongrid.io";
const LEDGER_ADDRESS_PREFIX: u8 = 0x41;

struct ExtensionState {
    ready: bool,
    account: String,
    full_node: String,
    reject_permission: bool,
    authorized: bool,
    /// Number of `injected()` reads that still see no instance.
    injection_delay_reads: u32,
    balances: HashMap<(String, String), U256>,
    revert_calls: bool,
    reject_calls: bool,
    sent_calls: Vec<TokenCall>,
    tx_seq: u64,
}

impl Default for ExtensionState {
    fn default() -> Self {
        Self {
            ready: true,
            account: DEFAULT_ACCOUNT.to_owned(),
            full_node: DEFAULT_NODE.to_owned(),
            reject_permission: false,
            authorized: false,
            injection_delay_reads: 0,
            balances: HashMap::new(),
            revert_calls: false,
            reject_calls: false,
            sent_calls: Vec::new(),
            tx_seq: 0,
        }
    }
}

impl ExtensionState {
    /// Nothing is known about a bridged wallet until the first state sync.
    fn unsynced() -> Self {
        Self {
            account: String::new(),
            full_node: String::new(),
            ..Self::default()
        }
    }
}

/// Ledger-chain wallet extension: a deterministic in-memory extension, or a
/// proxy to a real one behind a JSON-RPC bridge. Account and node changes are
/// announced over the attached `BroadcastBus` the way the real extension
/// posts them into the page.
#[derive(Clone, Default)]
pub struct LedgerExtensionAdapter {
    mode: LedgerMode,
    state: Arc<Mutex<ExtensionState>>,
    bus: Option<BroadcastBus>,
}

#[derive(Clone, Default)]
enum LedgerMode {
    #[default]
    Deterministic,
    Proxy(LedgerProxy),
}

/// Bridge to the wallet for account and signing requests, plus the node's
/// HTTP API for constant contract reads.
#[derive(Clone)]
struct LedgerProxy {
    bridge_url: String,
    /// Falls back to the wallet's own full node when unset.
    node_api_url: Option<String>,
    client: reqwest::Client,
}

/// `tron_getState` result.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BridgeState {
    ready: bool,
    /// A base58 address, or `false` while the wallet is locked.
    #[serde(default)]
    address: Value,
    #[serde(default)]
    full_node: Option<String>,
}

impl LedgerProxy {
    async fn call(&self, method: &str, params: Value) -> Result<Value, PortError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(&self.bridge_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PortError::Transport(format!("ledger bridge request failed: {e}")))?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| PortError::Transport(format!("ledger bridge json decode failed: {e}")))?;
        if let Some(err) = body.get("error") {
            let code = err.get("code").and_then(Value::as_i64).unwrap_or(-32603);
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown wallet error");
            return Err(PortError::from_rpc(code, message));
        }
        if !status.is_success() {
            return Err(PortError::Transport(format!(
                "ledger bridge status {status}: {body}"
            )));
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| PortError::Transport("ledger bridge missing result".to_owned()))
    }

    /// `POST /wallet/triggerconstantcontract` on the node API.
    async fn trigger_constant(
        &self,
        node: &str,
        owner: &str,
        contract: &str,
        selector: &str,
        parameter: String,
    ) -> Result<Vec<u8>, PortError> {
        let url = format!("{}/wallet/triggerconstantcontract", node.trim_end_matches('/'));
        let body = json!({
            "owner_address": owner,
            "contract_address": contract,
            "function_selector": selector,
            "parameter": parameter,
            "visible": true,
        });
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PortError::Transport(format!("ledger node request failed: {e}")))?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| PortError::Transport(format!("ledger node json decode failed: {e}")))?;
        if !status.is_success() {
            return Err(PortError::Transport(format!("ledger node status {status}: {body}")));
        }

        let result = body.get("result").cloned().unwrap_or(Value::Null);
        if result.get("result").and_then(Value::as_bool) != Some(true) {
            let code = result.get("code").and_then(Value::as_str).unwrap_or("UNKNOWN");
            let message = result
                .get("message")
                .and_then(Value::as_str)
                .map(node_message)
                .unwrap_or_default();
            return Err(PortError::Reverted(format!("{code}: {message}")));
        }
        let word = body
            .get("constant_result")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(Value::as_str)
            .ok_or_else(|| PortError::Transport("ledger node returned no constant result".to_owned()))?;
        alloy::hex::decode(word)
            .map_err(|e| PortError::Transport(format!("ledger node result is not hex: {e}")))
    }
}

/// Node error messages come back hex-encoded.
fn node_message(raw: &str) -> String {
    alloy::hex::decode(raw)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| raw.to_owned())
}

/// ABI word of a base58check ledger address: its 20-byte body, left padded.
fn encode_word_address(raw: &str) -> Result<[u8; 32], PortError> {
    let payload = bs58::decode(raw.trim())
        .with_check(None)
        .into_vec()
        .map_err(|e| PortError::Validation(format!("invalid ledger address '{raw}': {e}")))?;
    if payload.len() != 21 || payload[0] != LEDGER_ADDRESS_PREFIX {
        return Err(PortError::Validation(format!("invalid ledger address '{raw}'")));
    }
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(&payload[1..]);
    Ok(word)
}

fn call_parameter(address: &str, amount: Option<U256>) -> Result<String, PortError> {
    let mut data = encode_word_address(address)?.to_vec();
    if let Some(amount) = amount {
        data.extend_from_slice(&amount.to_be_bytes::<32>());
    }
    Ok(alloy::hex::encode(data))
}

fn json_tx_id(value: &Value) -> Result<String, PortError> {
    value
        .as_str()
        .or_else(|| value.get("txid").and_then(Value::as_str))
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| PortError::Transport("ledger bridge returned no transaction id".to_owned()))
}

impl LedgerExtensionAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bridge runtime when `ledger_proxy_url` is set, deterministic otherwise.
    pub fn with_config(config: &AdapterConfig) -> Self {
        let mode = match &config.ledger_proxy_url {
            Some(bridge_url) => {
                let timeout = Duration::from_millis(config.ledger_proxy_timeout_ms);
                match reqwest::Client::builder().timeout(timeout).build() {
                    Ok(client) => LedgerMode::Proxy(LedgerProxy {
                        bridge_url: bridge_url.clone(),
                        node_api_url: config.ledger_node_api_url.clone(),
                        client,
                    }),
                    Err(e) => {
                        tracing::warn!(error = %e, "ledger bridge client unavailable, using deterministic extension");
                        LedgerMode::Deterministic
                    }
                }
            }
            None => LedgerMode::Deterministic,
        };
        let state = match &mode {
            LedgerMode::Proxy(_) => ExtensionState::unsynced(),
            LedgerMode::Deterministic => ExtensionState::default(),
        };
        Self {
            mode,
            state: Arc::new(Mutex::new(state)),
            bus: None,
        }
    }

    pub fn with_bus(mut self, bus: BroadcastBus) -> Self {
        self.bus = Some(bus);
        self
    }

    fn lock(&self) -> MutexGuard<'_, ExtensionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn proxy(&self) -> Option<&LedgerProxy> {
        match &self.mode {
            LedgerMode::Proxy(proxy) => Some(proxy),
            LedgerMode::Deterministic => None,
        }
    }

    /// Pulls account and node from the bridged wallet and announces whatever
    /// moved since the last sync. No-op for the deterministic extension.
    pub async fn sync_state(&self) -> Result<(), PortError> {
        let Some(proxy) = self.proxy() else {
            return Ok(());
        };
        let raw = proxy.call("tron_getState", json!([])).await?;
        let state: BridgeState = serde_json::from_value(raw)
            .map_err(|e| PortError::Transport(format!("ledger bridge state malformed: {e}")))?;
        let address = state
            .address
            .as_str()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_owned);

        let (account_moved, node_moved) = {
            let mut g = self.lock();
            let account = address.clone().unwrap_or_default();
            let node = state.full_node.clone().unwrap_or_default();
            let account_moved = !g.account.is_empty() && g.account != account;
            let node_moved = !g.full_node.is_empty() && g.full_node != node;
            g.ready = state.ready;
            g.account = account;
            g.full_node = node;
            if address.is_none() {
                g.authorized = false;
            }
            (account_moved, node_moved)
        };
        tracing::debug!(ready = state.ready, account_moved, node_moved, "ledger bridge state synced");

        if account_moved {
            match &address {
                Some(a) => self.announce("setAccount", json!({ "address": a }))?,
                None => self.announce("setAccount", json!({ "address": false }))?,
            }
        }
        if node_moved {
            if let Some(node) = &state.full_node {
                self.announce("setNode", json!({ "node": { "fullNode": node } }))?;
            }
        }
        Ok(())
    }

    fn announce(&self, action: &str, data: serde_json::Value) -> Result<(), PortError> {
        if let Some(bus) = &self.bus {
            bus.post(json!({
                "message": { "action": action, "data": data }
            }))?;
        }
        Ok(())
    }

    pub fn debug_switch_account(&self, address: &str) -> Result<(), PortError> {
        self.lock().account = address.to_owned();
        self.announce("setAccount", json!({ "address": address }))
    }

    pub fn debug_set_node(&self, full_node: &str) -> Result<(), PortError> {
        self.lock().full_node = full_node.to_owned();
        self.announce("setNode", json!({ "node": { "fullNode": full_node } }))
    }

    /// Locks the extension; it reports the account as `false`.
    pub fn debug_lock(&self) -> Result<(), PortError> {
        {
            let mut g = self.lock();
            g.ready = false;
            g.authorized = false;
        }
        self.announce("setAccount", json!({ "address": false }))
    }

    pub fn debug_set_ready(&self, ready: bool) {
        self.lock().ready = ready;
    }

    pub fn debug_reject_permission(&self, reject: bool) {
        self.lock().reject_permission = reject;
    }

    pub fn debug_delay_injection(&self, reads: u32) {
        self.lock().injection_delay_reads = reads;
    }

    pub fn debug_set_balance(&self, token: &str, owner: &str, amount: U256) {
        self.lock()
            .balances
            .insert((token.to_owned(), owner.to_owned()), amount);
    }

    pub fn debug_revert_calls(&self, revert: bool) {
        self.lock().revert_calls = revert;
    }

    pub fn debug_reject_calls(&self, reject: bool) {
        self.lock().reject_calls = reject;
    }

    pub fn sent_calls(&self) -> Vec<TokenCall> {
        self.lock().sent_calls.clone()
    }
}

#[async_trait]
impl LedgerExtensionPort for LedgerExtensionAdapter {
    fn is_ready(&self) -> bool {
        self.lock().ready
    }

    async fn request_accounts(&self) -> Result<LedgerPermission, PortError> {
        if let Some(proxy) = self.proxy() {
            let raw = proxy.call("tron_requestAccounts", json!([])).await?;
            let permission: LedgerPermission = serde_json::from_value(raw).map_err(|e| {
                PortError::Transport(format!("ledger bridge permission malformed: {e}"))
            })?;
            if permission.code == LedgerPermission::GRANTED {
                self.lock().authorized = true;
                self.sync_state().await?;
            }
            return Ok(permission);
        }
        let mut g = self.lock();
        if g.reject_permission {
            return Ok(LedgerPermission {
                code: LedgerPermission::REJECTED,
                message: "User rejected the request.".to_owned(),
            });
        }
        g.authorized = true;
        Ok(LedgerPermission {
            code: LedgerPermission::GRANTED,
            message: "The site is already in the whitelist".to_owned(),
        })
    }

    fn injected(&self) -> Option<Arc<dyn LedgerInstancePort>> {
        let mut g = self.lock();
        if g.injection_delay_reads > 0 {
            g.injection_delay_reads -= 1;
            return None;
        }
        Some(Arc::new(InjectedInstance {
            extension: self.clone(),
        }))
    }
}

/// Chain instance the extension injects once it has an unlocked account.
struct InjectedInstance {
    extension: LedgerExtensionAdapter,
}

impl InjectedInstance {
    fn lock(&self) -> MutexGuard<'_, ExtensionState> {
        self.extension.lock()
    }

    async fn proxy_balance_of(
        &self,
        proxy: &LedgerProxy,
        contract: &str,
        owner: &str,
    ) -> Result<U256, PortError> {
        let node = match &proxy.node_api_url {
            Some(url) => url.clone(),
            None => Some(self.lock().full_node.clone())
                .filter(|n| !n.is_empty())
                .ok_or_else(|| {
                    PortError::ProviderNotReady("Wallet has no full node configured.".to_owned())
                })?,
        };
        let word = proxy
            .trigger_constant(
                &node,
                owner,
                contract,
                "balanceOf(address)",
                call_parameter(owner, None)?,
            )
            .await?;
        if word.len() > 32 {
            return Err(PortError::Transport(format!(
                "balanceOf returned {} bytes",
                word.len()
            )));
        }
        Ok(U256::from_be_slice(&word))
    }

    async fn proxy_send(&self, proxy: &LedgerProxy, call: &TokenCall) -> Result<String, PortError> {
        let owner = {
            let g = self.lock();
            if !g.authorized || g.account.is_empty() {
                return Err(PortError::NotConnected("wallet is locked".to_owned()));
            }
            g.account.clone()
        };
        let params = json!([{
            "ownerAddress": owner,
            "contractAddress": call.contract,
            "functionSelector": call.method.signature(),
            "parameter": call_parameter(&call.counterparty, Some(call.amount))?,
            "feeLimit": call.fee_limit,
        }]);
        let id = json_tx_id(&proxy.call("tron_triggerSmartContract", params).await?)?;
        self.lock().sent_calls.push(call.clone());
        if let Err(err) = self.extension.sync_state().await {
            tracing::debug!(error = %err, "ledger state sync after send failed");
        }
        Ok(id)
    }
}

#[async_trait]
impl LedgerInstancePort for InjectedInstance {
    fn default_address(&self) -> Option<String> {
        let g = self.lock();
        (g.ready && g.authorized).then(|| g.account.clone())
    }

    fn full_node_host(&self) -> Option<String> {
        Some(self.lock().full_node.clone())
    }

    async fn contract_balance_of(&self, contract: &str, owner: &str) -> Result<U256, PortError> {
        if let Some(proxy) = self.extension.proxy() {
            return self.proxy_balance_of(proxy, contract, owner).await;
        }
        let g = self.lock();
        Ok(g.balances
            .get(&(contract.to_owned(), owner.to_owned()))
            .copied()
            .unwrap_or(U256::ZERO))
    }

    async fn contract_send(&self, call: &TokenCall) -> Result<String, PortError> {
        if let Some(proxy) = self.extension.proxy() {
            return self.proxy_send(proxy, call).await;
        }
        let mut g = self.lock();
        if !g.authorized {
            return Err(PortError::NotConnected("wallet is locked".to_owned()));
        }
        if g.reject_calls {
            return Err(PortError::UserRejected("Confirmation declined by user".to_owned()));
        }
        if g.revert_calls {
            return Err(PortError::Transport(format!(
                "Contract validate error : account {} does not exist",
                g.account
            )));
        }
        g.tx_seq = g.tx_seq.saturating_add(1);
        let id = keccak256(format!("{}:{}:{}:{}", g.account, call.contract, call.amount, g.tx_seq));
        g.sent_calls.push(call.clone());
        Ok(alloy::hex::encode(id))
    }
}
