pub mod audit;
pub mod broadcast;
pub mod clock;
pub mod config;
pub mod eip1193;
pub mod ledger_extension;
pub mod notifier;
pub mod record_store;
pub mod recording_client;
pub mod wallet_source;

pub use audit::AuditLogAdapter;
pub use broadcast::BroadcastBus;
pub use clock::SystemClockAdapter;
pub use config::{AdapterConfig, LedgerNetwork};
pub use eip1193::Eip1193Adapter;
pub use ledger_extension::LedgerExtensionAdapter;
pub use notifier::{MintNotification, NotifierAdapter};
pub use record_store::MemoryRecordStore;
pub use recording_client::RecordingClient;
pub use wallet_source::InjectedWalletSource;
