use std::fmt;
use std::sync::Arc;

use alloy::primitives::U256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::{
    AuditEntry, RecordKey, RecordSubmission, RecordingReceipt, TransactionRecord,
};
use crate::network_switch::AddChainParams;
use crate::operations::TokenCall;

/// EIP-1193 "user rejected the request".
pub const USER_REJECTED_CODE: i64 = 4001;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("{0}")]
    ProviderAbsent(String),
    #[error("{0}")]
    ProviderNotReady(String),
    #[error("{0}")]
    UserRejected(String),
    #[error("{0}")]
    WrongNetwork(String),
    #[error("{0}")]
    StaleHandle(String),
    #[error("provider handle not recognized: {0}")]
    ResolutionFailure(String),
    #[error("{0}")]
    SwitchUnsupported(String),
    #[error("{0}")]
    NotConnected(String),
    /// The contract refused the call (typically a missing role).
    #[error("{0}")]
    Reverted(String),
    #[error("wallet rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("port not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("unauthorized")]
    Unauthorized,
}

impl PortError {
    /// Classifies a wallet JSON-RPC error object.
    pub fn from_rpc(code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        if code == USER_REJECTED_CODE {
            PortError::UserRejected(message)
        } else {
            PortError::Rpc { code, message }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PortError::ProviderAbsent(_) => "PROVIDER_ABSENT",
            PortError::ProviderNotReady(_) => "PROVIDER_NOT_READY",
            PortError::UserRejected(_) => "USER_REJECTED",
            PortError::WrongNetwork(_) => "WRONG_NETWORK",
            PortError::StaleHandle(_) => "STALE_HANDLE",
            PortError::ResolutionFailure(_) => "RESOLUTION_FAILURE",
            PortError::SwitchUnsupported(_) => "SWITCH_UNSUPPORTED",
            PortError::NotConnected(_) => "NOT_CONNECTED",
            PortError::Reverted(_) => "REVERTED",
            PortError::Rpc { .. } => "RPC_ERROR",
            PortError::NotImplemented(_) => "NOT_IMPLEMENTED",
            PortError::Transport(_) => "TRANSPORT",
            PortError::Validation(_) => "VALIDATION",
            PortError::Conflict(_) => "CONFLICT",
            PortError::NotFound(_) => "NOT_FOUND",
            PortError::Persistence(_) => "PERSISTENCE",
            PortError::Unauthorized => "UNAUTHORIZED",
        }
    }

    pub fn rpc_code(&self) -> Option<i64> {
        match self {
            PortError::Rpc { code, .. } => Some(*code),
            PortError::UserRejected(_) => Some(USER_REJECTED_CODE),
            _ => None,
        }
    }
}

pub type ListenerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderEventKind {
    AccountsChanged,
    ChainChanged,
}

/// Raw provider event as logged by a provider runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEvent {
    pub sequence: u64,
    pub kind: ProviderEventKind,
    pub value: String,
}

/// Payload handed to listeners registered through `EvmProviderPort::subscribe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderNotification {
    AccountsChanged(Vec<String>),
    ChainChanged(String),
}

pub type ProviderListener = Arc<dyn Fn(ProviderNotification) + Send + Sync>;

/// Injected EIP-1193 style provider.
#[async_trait]
pub trait EvmProviderPort: Send + Sync {
    /// `eth_requestAccounts`; may prompt the user.
    async fn request_accounts(&self) -> Result<Vec<String>, PortError>;
    /// `eth_accounts`; never prompts.
    async fn accounts(&self) -> Result<Vec<String>, PortError>;
    async fn chain_id(&self) -> Result<u64, PortError>;
    async fn switch_chain(&self, chain_id: u64) -> Result<(), PortError>;
    async fn add_chain(&self, params: &AddChainParams) -> Result<(), PortError>;
    async fn token_balance(&self, token: &str, owner: &str) -> Result<U256, PortError>;
    async fn send_token_call(&self, from: &str, call: &TokenCall) -> Result<String, PortError>;
    fn subscribe(&self, listener: ProviderListener) -> Result<ListenerId, PortError>;
    fn unsubscribe(&self, id: ListenerId) -> Result<(), PortError>;
}

/// Response of the ledger extension's account permission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerPermission {
    pub code: u16,
    pub message: String,
}

impl LedgerPermission {
    pub const GRANTED: u16 = 200;
    pub const REJECTED: u16 = 4001;
}

/// The wallet extension object of the ledger chain.
#[async_trait]
pub trait LedgerExtensionPort: Send + Sync {
    /// Unlocked and initialized.
    fn is_ready(&self) -> bool;
    async fn request_accounts(&self) -> Result<LedgerPermission, PortError>;
    /// The injected chain instance, once the extension has populated it.
    fn injected(&self) -> Option<Arc<dyn LedgerInstancePort>>;
}

/// Injected ledger-chain instance (account handle, node, contract calls).
#[async_trait]
pub trait LedgerInstancePort: Send + Sync {
    fn default_address(&self) -> Option<String>;
    fn full_node_host(&self) -> Option<String>;
    async fn contract_balance_of(&self, contract: &str, owner: &str) -> Result<U256, PortError>;
    async fn contract_send(&self, call: &TokenCall) -> Result<String, PortError>;
}

/// Identity of an execution context (a window/frame) on a broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextId(pub String);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastMessage {
    pub origin: ContextId,
    pub payload: Value,
}

pub type BroadcastListener = Arc<dyn Fn(BroadcastMessage) + Send + Sync>;

/// Shared message channel the ledger wallet talks through.
pub trait BroadcastChannelPort: Send + Sync {
    /// The context this session runs in; messages from elsewhere are foreign.
    fn context_id(&self) -> ContextId;
    fn subscribe(&self, listener: BroadcastListener) -> Result<ListenerId, PortError>;
    fn unsubscribe(&self, id: ListenerId) -> Result<(), PortError>;
}

/// Whatever wallet runtimes the execution environment exposes.
pub trait WalletSource: Send + Sync {
    fn evm_provider(&self) -> Option<Arc<dyn EvmProviderPort>>;
    fn ledger_extension(&self) -> Option<Arc<dyn LedgerExtensionPort>>;
    fn broadcast_channel(&self) -> Option<Arc<dyn BroadcastChannelPort>>;
}

pub trait ClockPort: Send + Sync {
    fn now_ms(&self) -> Result<u64, PortError>;
}

#[async_trait]
pub trait RecordStorePort: Send + Sync {
    async fn find(&self, key: &RecordKey) -> Result<Option<TransactionRecord>, PortError>;
    /// Fails with `PortError::Conflict` when the key is already stored.
    async fn insert(&self, record: &TransactionRecord) -> Result<(), PortError>;
    async fn set_notification_sent(&self, key: &RecordKey, sent: bool) -> Result<(), PortError>;
    async fn ping(&self) -> Result<(), PortError>;
}

#[async_trait]
pub trait NotifierPort: Send + Sync {
    fn is_configured(&self) -> bool;
    async fn notify_mint(
        &self,
        record: &TransactionRecord,
        contact: &str,
        explorer_url: &str,
    ) -> Result<(), PortError>;
}

#[async_trait]
pub trait AuditPort: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<(), PortError>;
}

/// Client side of the recording endpoint.
#[async_trait]
pub trait RecordingPort: Send + Sync {
    async fn submit(&self, submission: &RecordSubmission) -> Result<RecordingReceipt, PortError>;
}

#[async_trait]
impl<T: RecordStorePort + ?Sized> RecordStorePort for Arc<T> {
    async fn find(&self, key: &RecordKey) -> Result<Option<TransactionRecord>, PortError> {
        (**self).find(key).await
    }

    async fn insert(&self, record: &TransactionRecord) -> Result<(), PortError> {
        (**self).insert(record).await
    }

    async fn set_notification_sent(&self, key: &RecordKey, sent: bool) -> Result<(), PortError> {
        (**self).set_notification_sent(key, sent).await
    }

    async fn ping(&self) -> Result<(), PortError> {
        (**self).ping().await
    }
}

#[async_trait]
impl<T: NotifierPort + ?Sized> NotifierPort for Arc<T> {
    fn is_configured(&self) -> bool {
        (**self).is_configured()
    }

    async fn notify_mint(
        &self,
        record: &TransactionRecord,
        contact: &str,
        explorer_url: &str,
    ) -> Result<(), PortError> {
        (**self).notify_mint(record, contact, explorer_url).await
    }
}

#[async_trait]
impl<T: AuditPort + ?Sized> AuditPort for Arc<T> {
    async fn append(&self, entry: AuditEntry) -> Result<(), PortError> {
        (**self).append(entry).await
    }
}

impl<T: ClockPort + ?Sized> ClockPort for Arc<T> {
    fn now_ms(&self) -> Result<u64, PortError> {
        (**self).now_ms()
    }
}
