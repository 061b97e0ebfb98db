use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimestampMs(pub u64);

impl TimestampMs {
    pub fn plus_days(self, days: u64) -> Self {
        TimestampMs(self.0.saturating_add(days.saturating_mul(DAY_MS)))
    }
}

/// The two ledgers an operator can act on. Legacy wire names (`BSC`,
/// `TRON`) are accepted as aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChainKind {
    #[serde(alias = "BSC")]
    EvmChain,
    #[serde(alias = "TRON")]
    LedgerChain,
}

impl ChainKind {
    pub const ALL: [ChainKind; 2] = [ChainKind::EvmChain, ChainKind::LedgerChain];

    pub fn as_str(self) -> &'static str {
        match self {
            ChainKind::EvmChain => "EvmChain",
            ChainKind::LedgerChain => "LedgerChain",
        }
    }
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Numeric chain id for the EVM chain, full-node host for the ledger chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NetworkIdentity {
    ChainId(u64),
    Node(String),
}

impl fmt::Display for NetworkIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkIdentity::ChainId(id) => write!(f, "{id}"),
            NetworkIdentity::Node(host) => f.write_str(host),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenAction {
    Mint,
    Burn,
}

impl TokenAction {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenAction::Mint => "mint",
            TokenAction::Burn => "burn",
        }
    }
}

impl fmt::Display for TokenAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BurnReason {
    Manual,
    Expired,
}

/// Natural key of a recorded transaction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub chain: ChainKind,
    pub tx_hash: String,
}

impl RecordKey {
    pub fn new(chain: ChainKind, tx_hash: &str) -> Self {
        Self {
            chain,
            tx_hash: normalize_tx_hash(chain, tx_hash),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain, self.tx_hash)
    }
}

/// EVM hashes are case-insensitive hex; ledger transaction ids are kept verbatim.
pub fn normalize_tx_hash(chain: ChainKind, raw: &str) -> String {
    let trimmed = raw.trim();
    match chain {
        ChainKind::EvmChain => trimmed.to_ascii_lowercase(),
        ChainKind::LedgerChain => trimmed.to_owned(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum RecordDetails {
    #[serde(rename_all = "camelCase")]
    Mint {
        expiry_date: TimestampMs,
        notification_sent: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        contact: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Burn { reason: BurnReason },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub tx_hash: String,
    pub chain: ChainKind,
    pub counterparty_address: String,
    pub amount: f64,
    pub initiator_identity: String,
    pub timestamp: TimestampMs,
    #[serde(flatten)]
    pub details: RecordDetails,
}

impl TransactionRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.chain, &self.tx_hash)
    }

    pub fn action(&self) -> TokenAction {
        match self.details {
            RecordDetails::Mint { .. } => TokenAction::Mint,
            RecordDetails::Burn { .. } => TokenAction::Burn,
        }
    }

    pub fn notification_status(&self) -> NotificationStatus {
        match &self.details {
            RecordDetails::Mint {
                contact: Some(_),
                notification_sent: true,
                ..
            } => NotificationStatus::Sent,
            RecordDetails::Mint {
                contact: Some(_),
                notification_sent: false,
                ..
            } => NotificationStatus::Failed,
            _ => NotificationStatus::NotRequested,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Sent,
    Failed,
    NotRequested,
}

/// Payload of a recording call, produced by the client after a chain
/// transaction hash is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSubmission {
    pub chain: ChainKind,
    pub action: TokenAction,
    pub tx_hash: String,
    pub counterparty_address: String,
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
}

/// Body returned by the recording endpoint for both first and repeated calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingReceipt {
    pub message: String,
    pub record: TransactionRecord,
    pub already_existed: bool,
    pub explorer_url: String,
    pub notification_status: NotificationStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOrigin {
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub action: String,
    pub initiator: String,
    pub target: Option<String>,
    pub metadata: Value,
    pub origin: RequestOrigin,
    pub timestamp: TimestampMs,
}
