use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use dualmint_core::{
    EvmNetworkProfile, ExplorerUrls, LedgerNetworkProfile, NativeCurrency, RecorderSettings,
    RetryPolicy,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerNetwork {
    Mainnet,
    Shasta,
}

impl FromStr for LedgerNetwork {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(LedgerNetwork::Mainnet),
            "shasta" => Ok(LedgerNetwork::Shasta),
            other => Err(format!("unknown ledger network '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub evm_chain_id: u64,
    pub evm_chain_name: String,
    pub evm_currency_name: String,
    pub evm_currency_symbol: String,
    pub evm_rpc_url: String,
    pub evm_explorer_url: String,
    pub evm_token_contract: String,
    pub evm_token_decimals: u8,
    pub ledger_network: LedgerNetwork,
    /// Overrides the built-in host allow-list of `ledger_network` when set.
    pub ledger_allowed_hosts: Option<Vec<String>>,
    pub ledger_token_contract: String,
    pub ledger_token_decimals: u8,
    pub evm_explorer_tx_base: String,
    pub ledger_explorer_tx_base: String,
    pub readiness_attempts: u32,
    pub readiness_delay_ms: u64,
    pub manual_switch_recheck_ms: u64,
    pub token_lifespan_days: u64,
    pub side_effect_timeout_ms: u64,
    pub recording_endpoint_url: String,
    pub recording_api_token: Option<String>,
    pub recording_timeout_ms: u64,
    pub recording_retry_count: u32,
    pub notifier_webhook_url: Option<String>,
    pub notifier_timeout_ms: u64,
    pub eip1193_proxy_url: Option<String>,
    pub eip1193_timeout_ms: u64,
    /// JSON-RPC bridge to a real ledger wallet extension.
    pub ledger_proxy_url: Option<String>,
    /// Node HTTP API for constant contract reads; the wallet's node when unset.
    pub ledger_node_api_url: Option<String>,
    pub ledger_proxy_timeout_ms: u64,
    pub record_store_path: Option<PathBuf>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        let evm = EvmNetworkProfile::default();
        let explorer = ExplorerUrls::default();
        Self {
            evm_chain_id: evm.chain_id,
            evm_chain_name: evm.chain_name,
            evm_currency_name: evm.native_currency.name,
            evm_currency_symbol: evm.native_currency.symbol,
            evm_rpc_url: "https://bsc-testnet-rpc.publicnode.com".to_owned(),
            evm_explorer_url: "https://testnet.bscscan.com".to_owned(),
            evm_token_contract: evm.token_contract,
            evm_token_decimals: 18,
            ledger_network: LedgerNetwork::Mainnet,
            ledger_allowed_hosts: None,
            ledger_token_contract: String::new(),
            ledger_token_decimals: 6,
            evm_explorer_tx_base: explorer.evm,
            ledger_explorer_tx_base: explorer.ledger,
            readiness_attempts: 2,
            readiness_delay_ms: 300,
            manual_switch_recheck_ms: 3_000,
            token_lifespan_days: 180,
            side_effect_timeout_ms: 10_000,
            recording_endpoint_url: "http://127.0.0.1:8787".to_owned(),
            recording_api_token: None,
            recording_timeout_ms: 15_000,
            recording_retry_count: 3,
            notifier_webhook_url: None,
            notifier_timeout_ms: 10_000,
            eip1193_proxy_url: None,
            eip1193_timeout_ms: 15_000,
            ledger_proxy_url: None,
            ledger_node_api_url: None,
            ledger_proxy_timeout_ms: 15_000,
            record_store_path: None,
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        Some(raw) => match raw.parse() {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, value = %raw, error = %e, "ignoring unparseable setting");
                default
            }
        },
        None => default,
    }
}

impl AdapterConfig {
    /// Reads `DUALMINT_*` variables over the defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            evm_chain_id: env_parse("DUALMINT_EVM_CHAIN_ID", d.evm_chain_id),
            evm_chain_name: env_string("DUALMINT_EVM_CHAIN_NAME").unwrap_or(d.evm_chain_name),
            evm_currency_name: env_string("DUALMINT_EVM_CURRENCY_NAME")
                .unwrap_or(d.evm_currency_name),
            evm_currency_symbol: env_string("DUALMINT_EVM_CURRENCY_SYMBOL")
                .unwrap_or(d.evm_currency_symbol),
            evm_rpc_url: env_string("DUALMINT_EVM_RPC_URL").unwrap_or(d.evm_rpc_url),
            evm_explorer_url: env_string("DUALMINT_EVM_EXPLORER_URL").unwrap_or(d.evm_explorer_url),
            evm_token_contract: env_string("DUALMINT_EVM_TOKEN").unwrap_or(d.evm_token_contract),
            evm_token_decimals: env_parse("DUALMINT_EVM_TOKEN_DECIMALS", d.evm_token_decimals),
            ledger_network: env_parse("DUALMINT_LEDGER_NETWORK", d.ledger_network),
            ledger_allowed_hosts: env_string("DUALMINT_LEDGER_HOSTS").map(|raw| {
                raw.split(',')
                    .map(|h| h.trim().to_ascii_lowercase())
                    .filter(|h| !h.is_empty())
                    .collect()
            }),
            ledger_token_contract: env_string("DUALMINT_LEDGER_TOKEN")
                .unwrap_or(d.ledger_token_contract),
            ledger_token_decimals: env_parse(
                "DUALMINT_LEDGER_TOKEN_DECIMALS",
                d.ledger_token_decimals,
            ),
            evm_explorer_tx_base: env_string("DUALMINT_EVM_EXPLORER_TX")
                .unwrap_or(d.evm_explorer_tx_base),
            ledger_explorer_tx_base: env_string("DUALMINT_LEDGER_EXPLORER_TX")
                .unwrap_or(d.ledger_explorer_tx_base),
            readiness_attempts: env_parse("DUALMINT_READINESS_ATTEMPTS", d.readiness_attempts),
            readiness_delay_ms: env_parse("DUALMINT_READINESS_DELAY_MS", d.readiness_delay_ms),
            manual_switch_recheck_ms: env_parse(
                "DUALMINT_SWITCH_RECHECK_MS",
                d.manual_switch_recheck_ms,
            ),
            token_lifespan_days: env_parse("DUALMINT_TOKEN_LIFESPAN_DAYS", d.token_lifespan_days),
            side_effect_timeout_ms: env_parse(
                "DUALMINT_SIDE_EFFECT_TIMEOUT_MS",
                d.side_effect_timeout_ms,
            ),
            recording_endpoint_url: env_string("DUALMINT_RECORDING_URL")
                .unwrap_or(d.recording_endpoint_url),
            recording_api_token: env_string("DUALMINT_RECORDING_TOKEN"),
            recording_timeout_ms: env_parse("DUALMINT_RECORDING_TIMEOUT_MS", d.recording_timeout_ms),
            recording_retry_count: env_parse(
                "DUALMINT_RECORDING_RETRY_COUNT",
                d.recording_retry_count,
            ),
            notifier_webhook_url: env_string("DUALMINT_NOTIFIER_WEBHOOK_URL"),
            notifier_timeout_ms: env_parse("DUALMINT_NOTIFIER_TIMEOUT_MS", d.notifier_timeout_ms),
            eip1193_proxy_url: env_string("DUALMINT_EIP1193_PROXY_URL"),
            eip1193_timeout_ms: env_parse("DUALMINT_EIP1193_TIMEOUT_MS", d.eip1193_timeout_ms),
            ledger_proxy_url: env_string("DUALMINT_LEDGER_PROXY_URL"),
            ledger_node_api_url: env_string("DUALMINT_LEDGER_NODE_API_URL"),
            ledger_proxy_timeout_ms: env_parse(
                "DUALMINT_LEDGER_PROXY_TIMEOUT_MS",
                d.ledger_proxy_timeout_ms,
            ),
            record_store_path: env_string("DUALMINT_STORE_PATH").map(PathBuf::from),
        }
    }

    pub fn evm_profile(&self) -> EvmNetworkProfile {
        EvmNetworkProfile {
            chain_id: self.evm_chain_id,
            chain_name: self.evm_chain_name.clone(),
            native_currency: NativeCurrency {
                name: self.evm_currency_name.clone(),
                symbol: self.evm_currency_symbol.clone(),
                decimals: 18,
            },
            rpc_urls: vec![self.evm_rpc_url.clone()],
            explorer_urls: vec![self.evm_explorer_url.clone()],
            token_contract: self.evm_token_contract.clone(),
            token_decimals: self.evm_token_decimals,
        }
    }

    pub fn ledger_profile(&self) -> LedgerNetworkProfile {
        let mut profile = match self.ledger_network {
            LedgerNetwork::Mainnet => LedgerNetworkProfile::mainnet(),
            LedgerNetwork::Shasta => LedgerNetworkProfile::shasta(),
        };
        if let Some(hosts) = &self.ledger_allowed_hosts {
            profile.allowed_hosts = hosts.clone();
        }
        profile.token_contract = self.ledger_token_contract.clone();
        profile.token_decimals = self.ledger_token_decimals;
        profile.readiness = RetryPolicy::fixed(
            self.readiness_attempts,
            Duration::from_millis(self.readiness_delay_ms),
        );
        profile.manual_switch_recheck = Duration::from_millis(self.manual_switch_recheck_ms);
        profile
    }

    pub fn explorer_urls(&self) -> ExplorerUrls {
        ExplorerUrls {
            evm: self.evm_explorer_tx_base.clone(),
            ledger: self.ledger_explorer_tx_base.clone(),
        }
    }

    pub fn recorder_settings(&self) -> RecorderSettings {
        RecorderSettings {
            token_lifespan_days: self.token_lifespan_days,
            explorer: self.explorer_urls(),
            side_effect_timeout: Duration::from_millis(self.side_effect_timeout_ms),
        }
    }

    /// Retry policy of the client-side recording call.
    pub fn recording_retry(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.recording_retry_count.saturating_add(1),
            Duration::from_millis(500),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_profile_follows_selected_network() {
        let cfg = AdapterConfig {
            ledger_network: LedgerNetwork::Shasta,
            readiness_attempts: 4,
            ..AdapterConfig::default()
        };
        let profile = cfg.ledger_profile();
        assert_eq!(profile.allowed_hosts, vec!["api.shasta.trongrid.io".to_owned()]);
        assert_eq!(profile.readiness.max_attempts, 4);
        assert_eq!(profile.manual_switch_recheck, Duration::from_secs(3));
    }

    #[test]
    fn host_override_replaces_allow_list() {
        let cfg = AdapterConfig {
            ledger_allowed_hosts: Some(vec!["node.internal".to_owned()]),
            ..AdapterConfig::default()
        };
        assert_eq!(cfg.ledger_profile().allowed_hosts, vec!["node.internal".to_owned()]);
    }

    #[test]
    fn ledger_network_parses_case_insensitively() {
        assert_eq!("Shasta".parse::<LedgerNetwork>(), Ok(LedgerNetwork::Shasta));
        assert!("nile".parse::<LedgerNetwork>().is_err());
    }
}
