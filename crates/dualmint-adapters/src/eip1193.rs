use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{keccak256, Address, U256};
use async_trait::async_trait;
use serde_json::{json, Value};

use dualmint_core::network_switch::UNRECOGNIZED_CHAIN_ERROR_CODE;
use dualmint_core::{
    parse_chain_id, AddChainParams, EvmProviderPort, ListenerId, PortError, ProviderEvent,
    ProviderEventKind, ProviderListener, ProviderNotification, TokenCall,
};

use crate::AdapterConfig;

const DEFAULT_ACCOUNT: &str = "0x1000000000000000000000000000000000000001";

/// EIP-1193 wallet provider: a deterministic in-memory wallet, or a JSON-RPC
/// proxy to a real one.
#[derive(Clone)]
pub struct Eip1193Adapter {
    mode: ProviderMode,
    state: Arc<Mutex<ProviderState>>,
}

#[derive(Clone)]
enum ProviderMode {
    Deterministic,
    Proxy(ProxyRuntime),
}

#[derive(Clone)]
struct ProxyRuntime {
    base_url: String,
    client: reqwest::Client,
}

struct ProviderState {
    accounts: Vec<String>,
    authorized: bool,
    chain_id: u64,
    known_chains: BTreeSet<u64>,
    reject_requests: bool,
    switch_is_noop: bool,
    revert_calls: bool,
    balances: HashMap<(String, String), U256>,
    sent_calls: Vec<(String, TokenCall)>,
    added_chains: Vec<AddChainParams>,
    listeners: BTreeMap<ListenerId, ProviderListener>,
    next_listener: ListenerId,
    event_seq: u64,
    events: Vec<ProviderEvent>,
}

impl Default for ProviderState {
    fn default() -> Self {
        Self {
            accounts: vec![DEFAULT_ACCOUNT.to_owned()],
            authorized: false,
            chain_id: 97,
            known_chains: BTreeSet::from([1, 56, 97]),
            reject_requests: false,
            switch_is_noop: false,
            revert_calls: false,
            balances: HashMap::new(),
            sent_calls: Vec::new(),
            added_chains: Vec::new(),
            listeners: BTreeMap::new(),
            next_listener: 0,
            event_seq: 0,
            events: Vec::new(),
        }
    }
}

impl ProviderState {
    /// Logs the event and returns the listeners to notify once the lock is released.
    fn record(&mut self, notification: &ProviderNotification) -> Vec<ProviderListener> {
        let (kind, value) = match notification {
            ProviderNotification::AccountsChanged(accounts) => (
                ProviderEventKind::AccountsChanged,
                json!(accounts).to_string(),
            ),
            ProviderNotification::ChainChanged(id) => (ProviderEventKind::ChainChanged, id.clone()),
        };
        self.event_seq = self.event_seq.saturating_add(1);
        self.events.push(ProviderEvent {
            sequence: self.event_seq,
            kind,
            value,
        });
        self.listeners.values().cloned().collect()
    }
}

fn balance_key(token: &str, owner: &str) -> (String, String) {
    (token.to_ascii_lowercase(), owner.to_ascii_lowercase())
}

fn notify(listeners: Vec<ProviderListener>, notification: ProviderNotification) {
    for listener in listeners {
        listener(notification.clone());
    }
}

impl Default for Eip1193Adapter {
    fn default() -> Self {
        Self::deterministic()
    }
}

impl Eip1193Adapter {
    pub fn deterministic() -> Self {
        Self {
            mode: ProviderMode::Deterministic,
            state: Arc::new(Mutex::new(ProviderState::default())),
        }
    }

    /// Proxy runtime when `eip1193_proxy_url` is set, deterministic otherwise.
    pub fn with_config(config: &AdapterConfig) -> Self {
        let mode = match &config.eip1193_proxy_url {
            Some(base_url) => {
                let timeout = Duration::from_millis(config.eip1193_timeout_ms);
                match reqwest::Client::builder().timeout(timeout).build() {
                    Ok(client) => ProviderMode::Proxy(ProxyRuntime {
                        base_url: base_url.clone(),
                        client,
                    }),
                    Err(e) => {
                        tracing::warn!(error = %e, "eip1193 proxy client unavailable, using deterministic wallet");
                        ProviderMode::Deterministic
                    }
                }
            }
            None => ProviderMode::Deterministic,
        };
        Self {
            mode,
            state: Arc::new(Mutex::new(ProviderState::default())),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ProviderState>, PortError> {
        self.state
            .lock()
            .map_err(|e| PortError::Transport(format!("provider lock poisoned: {e}")))
    }

    fn proxy(&self) -> Option<&ProxyRuntime> {
        match &self.mode {
            ProviderMode::Proxy(proxy) => Some(proxy),
            ProviderMode::Deterministic => None,
        }
    }

    async fn proxy_call(
        &self,
        proxy: &ProxyRuntime,
        method: &str,
        params: Value,
    ) -> Result<Value, PortError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = proxy
            .client
            .post(&proxy.base_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PortError::Transport(format!("eip1193 proxy request failed: {e}")))?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| PortError::Transport(format!("eip1193 proxy json decode failed: {e}")))?;
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
                "eip1193 proxy status {status}: {body}"
            )));
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| PortError::Transport("eip1193 proxy missing result".to_owned()))
    }

    /// Replaces the exposed accounts and emits `accountsChanged`.
    pub fn debug_set_accounts(&self, accounts: Vec<String>) -> Result<(), PortError> {
        let (listeners, visible) = {
            let mut g = self.lock()?;
            g.accounts = accounts;
            let visible = if g.authorized { g.accounts.clone() } else { Vec::new() };
            let note = ProviderNotification::AccountsChanged(visible.clone());
            (g.record(&note), visible)
        };
        notify(listeners, ProviderNotification::AccountsChanged(visible));
        Ok(())
    }

    /// Simulates a lock or a revoked permission.
    pub fn debug_revoke(&self) -> Result<(), PortError> {
        let listeners = {
            let mut g = self.lock()?;
            g.authorized = false;
            g.record(&ProviderNotification::AccountsChanged(Vec::new()))
        };
        notify(listeners, ProviderNotification::AccountsChanged(Vec::new()));
        Ok(())
    }

    /// Moves the wallet to `chain_id` as if the user switched it by hand.
    pub fn debug_set_chain(&self, chain_id: u64) -> Result<(), PortError> {
        let note = ProviderNotification::ChainChanged(format!("{chain_id:#x}"));
        let listeners = {
            let mut g = self.lock()?;
            g.chain_id = chain_id;
            g.known_chains.insert(chain_id);
            g.record(&note)
        };
        notify(listeners, note);
        Ok(())
    }

    pub fn debug_forget_chain(&self, chain_id: u64) -> Result<(), PortError> {
        self.lock()?.known_chains.remove(&chain_id);
        Ok(())
    }

    pub fn debug_reject_requests(&self, reject: bool) -> Result<(), PortError> {
        self.lock()?.reject_requests = reject;
        Ok(())
    }

    /// Switch requests succeed without moving the wallet.
    pub fn debug_silent_switch(&self, noop: bool) -> Result<(), PortError> {
        self.lock()?.switch_is_noop = noop;
        Ok(())
    }

    pub fn debug_revert_calls(&self, revert: bool) -> Result<(), PortError> {
        self.lock()?.revert_calls = revert;
        Ok(())
    }

    pub fn debug_set_balance(&self, token: &str, owner: &str, amount: U256) -> Result<(), PortError> {
        self.lock()?.balances.insert(balance_key(token, owner), amount);
        Ok(())
    }

    pub fn sent_calls(&self) -> Result<Vec<(String, TokenCall)>, PortError> {
        Ok(self.lock()?.sent_calls.clone())
    }

    pub fn added_chains(&self) -> Result<Vec<AddChainParams>, PortError> {
        Ok(self.lock()?.added_chains.clone())
    }

    pub fn listener_count(&self) -> Result<usize, PortError> {
        Ok(self.lock()?.listeners.len())
    }

    pub fn drain_events(&self) -> Result<Vec<ProviderEvent>, PortError> {
        Ok(std::mem::take(&mut self.lock()?.events))
    }

    fn check_rejection(&self, what: &str) -> Result<(), PortError> {
        if self.lock()?.reject_requests {
            return Err(PortError::UserRejected(format!("User rejected the {what} request.")));
        }
        Ok(())
    }

    fn deterministic_switch(&self, chain_id: u64) -> Result<(), PortError> {
        let note = ProviderNotification::ChainChanged(format!("{chain_id:#x}"));
        let listeners = {
            let mut g = self.lock()?;
            if !g.known_chains.contains(&chain_id) {
                return Err(PortError::from_rpc(
                    UNRECOGNIZED_CHAIN_ERROR_CODE,
                    format!("Unrecognized chain ID {chain_id:#x}. Try adding the chain first."),
                ));
            }
            if g.switch_is_noop || g.chain_id == chain_id {
                return Ok(());
            }
            g.chain_id = chain_id;
            g.record(&note)
        };
        notify(listeners, note);
        Ok(())
    }
}

fn json_chain_id_to_u64(value: &Value) -> Result<u64, PortError> {
    if let Some(n) = value.as_u64() {
        return Ok(n);
    }
    let s = value
        .as_str()
        .ok_or_else(|| PortError::Validation("chain id must be string or number".to_owned()))?;
    parse_chain_id(s)
}

fn json_accounts(value: Value) -> Result<Vec<String>, PortError> {
    let items = value
        .as_array()
        .ok_or_else(|| PortError::Transport("accounts result must be array".to_owned()))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_owned)
                .ok_or_else(|| PortError::Transport("account item must be string".to_owned()))
        })
        .collect()
}

fn encode_word_address(raw: &str) -> Result<[u8; 32], PortError> {
    let address = Address::from_str(raw.trim())
        .map_err(|e| PortError::Validation(format!("invalid address '{raw}': {e}")))?;
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_slice());
    Ok(word)
}

/// ABI calldata for `fn(address, uint256)` style calls and `balanceOf(address)`.
fn calldata(signature: &str, address: &str, amount: Option<U256>) -> Result<String, PortError> {
    let mut data = keccak256(signature.as_bytes())[..4].to_vec();
    data.extend_from_slice(&encode_word_address(address)?);
    if let Some(amount) = amount {
        data.extend_from_slice(&amount.to_be_bytes::<32>());
    }
    Ok(format!("0x{}", alloy::hex::encode(data)))
}

#[async_trait]
impl EvmProviderPort for Eip1193Adapter {
    async fn request_accounts(&self) -> Result<Vec<String>, PortError> {
        if let Some(proxy) = self.proxy() {
            let result = self.proxy_call(proxy, "eth_requestAccounts", json!([])).await?;
            let accounts = json_accounts(result)?;
            let mut g = self.lock()?;
            g.accounts = accounts.clone();
            g.authorized = true;
            return Ok(accounts);
        }
        self.check_rejection("account")?;
        let mut g = self.lock()?;
        g.authorized = true;
        Ok(g.accounts.clone())
    }

    async fn accounts(&self) -> Result<Vec<String>, PortError> {
        if let Some(proxy) = self.proxy() {
            let result = self.proxy_call(proxy, "eth_accounts", json!([])).await?;
            return json_accounts(result);
        }
        let g = self.lock()?;
        Ok(if g.authorized { g.accounts.clone() } else { Vec::new() })
    }

    async fn chain_id(&self) -> Result<u64, PortError> {
        if let Some(proxy) = self.proxy() {
            let result = self.proxy_call(proxy, "eth_chainId", json!([])).await?;
            let chain_id = json_chain_id_to_u64(&result)?;
            let note = ProviderNotification::ChainChanged(format!("{chain_id:#x}"));
            let listeners = {
                let mut g = self.lock()?;
                if g.chain_id == chain_id {
                    Vec::new()
                } else {
                    g.chain_id = chain_id;
                    g.record(&note)
                }
            };
            notify(listeners, note);
            return Ok(chain_id);
        }
        Ok(self.lock()?.chain_id)
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), PortError> {
        if let Some(proxy) = self.proxy() {
            self.proxy_call(
                proxy,
                "wallet_switchEthereumChain",
                json!([{ "chainId": format!("{chain_id:#x}") }]),
            )
            .await?;
            return Ok(());
        }
        self.check_rejection("switch")?;
        self.deterministic_switch(chain_id)
    }

    async fn add_chain(&self, params: &AddChainParams) -> Result<(), PortError> {
        if let Some(proxy) = self.proxy() {
            self.proxy_call(proxy, "wallet_addEthereumChain", json!([params]))
                .await?;
            return Ok(());
        }
        self.check_rejection("add network")?;
        let chain_id = parse_chain_id(&params.chain_id)?;
        {
            let mut g = self.lock()?;
            g.known_chains.insert(chain_id);
            g.added_chains.push(params.clone());
        }
        // Wallets offer to switch right after adding.
        self.deterministic_switch(chain_id)
    }

    async fn token_balance(&self, token: &str, owner: &str) -> Result<U256, PortError> {
        if let Some(proxy) = self.proxy() {
            let data = calldata("balanceOf(address)", owner, None)?;
            let result = self
                .proxy_call(proxy, "eth_call", json!([{ "to": token, "data": data }, "latest"]))
                .await?;
            let hex = result
                .as_str()
                .ok_or_else(|| PortError::Transport("eth_call result must be hex".to_owned()))?;
            let digits = hex.trim_start_matches("0x");
            if digits.is_empty() {
                return Ok(U256::ZERO);
            }
            return U256::from_str_radix(digits, 16)
                .map_err(|e| PortError::Validation(format!("invalid balance word: {e}")));
        }
        let g = self.lock()?;
        Ok(g.balances
            .get(&balance_key(token, owner))
            .copied()
            .unwrap_or(U256::ZERO))
    }

    async fn send_token_call(&self, from: &str, call: &TokenCall) -> Result<String, PortError> {
        let data = calldata(call.method.signature(), &call.counterparty, Some(call.amount))?;
        if let Some(proxy) = self.proxy() {
            let result = self
                .proxy_call(
                    proxy,
                    "eth_sendTransaction",
                    json!([{ "from": from, "to": call.contract, "data": data }]),
                )
                .await?;
            return result
                .as_str()
                .map(str::to_owned)
                .ok_or_else(|| PortError::Transport("eth_sendTransaction must return hash".to_owned()));
        }

        let mut g = self.lock()?;
        if g.reject_requests {
            return Err(PortError::UserRejected("user rejected action".to_owned()));
        }
        if g.revert_calls {
            return Err(PortError::Rpc {
                code: -32603,
                message: "execution reverted: Ownable: caller is not the owner".to_owned(),
            });
        }
        let nonce = g.sent_calls.len();
        let hash = keccak256(format!("{from}:{}:{data}:{nonce}", call.contract).as_bytes());
        g.sent_calls.push((from.to_owned(), call.clone()));
        Ok(hash.to_string())
    }

    fn subscribe(&self, listener: ProviderListener) -> Result<ListenerId, PortError> {
        let mut g = self.lock()?;
        g.next_listener = g.next_listener.saturating_add(1);
        let id = g.next_listener;
        g.listeners.insert(id, listener);
        Ok(id)
    }

    fn unsubscribe(&self, id: ListenerId) -> Result<(), PortError> {
        self.lock()?
            .listeners
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| PortError::NotFound(format!("provider listener {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calldata_starts_with_selector() {
        let data = calldata(
            "balanceOf(address)",
            "0x1000000000000000000000000000000000000001",
            None,
        )
        .expect("calldata");
        assert!(data.starts_with("0x70a08231"));
        assert_eq!(data.len(), 2 + 8 + 64);
    }

    #[test]
    fn chain_id_accepts_numbers_and_hex_strings() {
        assert_eq!(json_chain_id_to_u64(&json!(97)).expect("number"), 97);
        assert_eq!(json_chain_id_to_u64(&json!("0x38")).expect("hex"), 56);
        assert!(json_chain_id_to_u64(&json!(null)).is_err());
    }
}
