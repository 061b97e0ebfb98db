pub mod adapter;
pub mod balance;
pub mod domain;
pub mod events;
pub mod handle;
pub mod network_switch;
pub mod operations;
pub mod ports;
pub mod profile;
pub mod recorder;
pub mod retry;
pub mod session;
pub mod state_machine;

pub use adapter::{AccountGrant, ChainAdapter, EvmChainAdapter, LedgerChainAdapter};
pub use balance::{format_base_units, BalanceResolver, BalanceWatcher, ResolutionPath, TokenBalance};
pub use domain::{
    AuditEntry, BurnReason, ChainKind, NetworkIdentity, NotificationStatus, RecordDetails,
    RecordKey, RecordSubmission, RecordingReceipt, RequestOrigin, TimestampMs, TokenAction,
    TransactionRecord,
};
pub use events::{parse_chain_id, EventNormalizer, EventSubscriptions, WalletEvent, WalletEventKind};
pub use handle::{ContextStamp, ProviderHandle, SignerHandle, SigningCapability};
pub use network_switch::{AddChainParams, NetworkSwitchProtocol, SwitchOutcome};
pub use operations::{FlowOutcome, MintBurnFlow, SubmittedTx, TokenCall, TokenMethod, TokenOperator};
pub use ports::{
    AuditPort, BroadcastChannelPort, BroadcastListener, BroadcastMessage, ClockPort, ContextId,
    EvmProviderPort, LedgerExtensionPort, LedgerInstancePort, LedgerPermission, ListenerId,
    NotifierPort, PortError, ProviderEvent, ProviderEventKind, ProviderListener,
    ProviderNotification, RecordStorePort, RecordingPort, WalletSource,
};
pub use profile::{EvmNetworkProfile, ExplorerUrls, LedgerNetworkProfile, NativeCurrency};
pub use recorder::{RecordOutcome, RecorderHealth, RecorderSettings, TransactionRecorder};
pub use retry::{poll_until, retry_async, RetryPolicy};
pub use session::{Session, SessionManager, SessionMount, SessionSnapshot};
pub use state_machine::{session_transition, SessionAction, SessionState, StateTransition};
