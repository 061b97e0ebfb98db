use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::ChainKind;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Expected EVM network plus the metadata needed to add it to a wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmNetworkProfile {
    pub chain_id: u64,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub explorer_urls: Vec<String>,
    pub token_contract: String,
    pub token_decimals: u8,
}

impl Default for EvmNetworkProfile {
    fn default() -> Self {
        Self {
            chain_id: 97,
            chain_name: "BNB Smart Chain Testnet".to_owned(),
            native_currency: NativeCurrency {
                name: "BNB".to_owned(),
                symbol: "tBNB".to_owned(),
                decimals: 18,
            },
            rpc_urls: vec!["https://bsc-testnet-rpc.publicnode.com".to_owned()],
            explorer_urls: vec!["https://testnet.bscscan.com".to_owned()],
            token_contract: "0x0000000000000000000000000000000000000000".to_owned(),
            token_decimals: 18,
        }
    }
}

/// Expected ledger network, recognised by the wallet's configured full node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerNetworkProfile {
    pub network_tag: String,
    pub allowed_hosts: Vec<String>,
    pub token_contract: String,
    pub token_decimals: u8,
    /// Reads of the injected account handle after a permission grant.
    pub readiness: RetryPolicy,
    /// Delay before re-checking the network after a manual switch prompt.
    pub manual_switch_recheck: Duration,
}

impl LedgerNetworkProfile {
    pub fn mainnet() -> Self {
        Self {
            network_tag: "LEDGER_MAINNET".to_owned(),
            allowed_hosts: vec!["api.trongrid.io".to_owned(), "api.tronstack.io".to_owned()],
            ..Self::base()
        }
    }

    pub fn shasta() -> Self {
        Self {
            network_tag: "LEDGER_SHASTA".to_owned(),
            allowed_hosts: vec!["api.shasta.trongrid.io".to_owned()],
            ..Self::base()
        }
    }

    fn base() -> Self {
        Self {
            network_tag: String::new(),
            allowed_hosts: Vec::new(),
            token_contract: String::new(),
            token_decimals: 6,
            readiness: RetryPolicy::fixed(2, Duration::from_millis(300)),
            manual_switch_recheck: Duration::from_secs(3),
        }
    }
}

impl Default for LedgerNetworkProfile {
    fn default() -> Self {
        Self::mainnet()
    }
}

/// Explorer transaction URL prefixes, one per chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorerUrls {
    pub evm: String,
    pub ledger: String,
}

impl ExplorerUrls {
    pub fn tx_url(&self, chain: ChainKind, tx_hash: &str) -> String {
        let base = match chain {
            ChainKind::EvmChain => &self.evm,
            ChainKind::LedgerChain => &self.ledger,
        };
        format!("{base}{tx_hash}")
    }
}

impl Default for ExplorerUrls {
    fn default() -> Self {
        Self {
            evm: "https://testnet.bscscan.com/tx/".to_owned(),
            ledger: "https://shasta.tronscan.org/#/transaction/".to_owned(),
        }
    }
}
