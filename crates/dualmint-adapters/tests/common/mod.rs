#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::U256;
use async_trait::async_trait;

use dualmint_adapters::{
    AuditLogAdapter, BroadcastBus, Eip1193Adapter, InjectedWalletSource, LedgerExtensionAdapter,
    MemoryRecordStore, NotifierAdapter,
};
use dualmint_core::{
    AddChainParams, ClockPort, EvmNetworkProfile, EvmProviderPort, LedgerNetworkProfile,
    ListenerId, PortError, ProviderListener, RecorderSettings, RetryPolicy, SessionManager,
    SessionSnapshot, TokenCall, TransactionRecorder,
};

pub const EVM_TOKEN: &str = "0x00000000000000000000000000000000000070c0";
pub const LEDGER_TOKEN: &str = "TXYZopYRdj2D9XRtbG411XZZ3kM5VkAeBf";
pub const EVM_OPERATOR: &str = "0x1000000000000000000000000000000000000001";
pub const EVM_HOLDER: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
pub const LEDGER_OPERATOR: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";
pub const LEDGER_HOLDER: &str = "TJRabPrwbZy45sbavfcjinPJC18kjpRTv8";

#[derive(Debug, Default)]
pub struct TestClock {
    now: AtomicU64,
}

impl ClockPort for TestClock {
    fn now_ms(&self) -> Result<u64, PortError> {
        Ok(self.now.fetch_add(1, Ordering::SeqCst) + 1_739_750_400_000)
    }
}

pub struct Wallets {
    pub evm: Eip1193Adapter,
    pub ledger: LedgerExtensionAdapter,
    pub bus: BroadcastBus,
}

impl Wallets {
    pub fn new() -> Self {
        let bus = BroadcastBus::new("main-frame");
        Self {
            evm: Eip1193Adapter::default(),
            ledger: LedgerExtensionAdapter::new().with_bus(bus.clone()),
            bus,
        }
    }

    pub fn source(&self) -> Arc<InjectedWalletSource> {
        Arc::new(
            InjectedWalletSource::new()
                .with_evm(Arc::new(self.evm.clone()))
                .with_ledger(Arc::new(self.ledger.clone()))
                .with_channel(Arc::new(self.bus.clone())),
        )
    }
}

/// Deterministic provider with calls that stall long enough for the event
/// pump and snapshot watchers to run in between.
pub struct StallingProvider {
    inner: Eip1193Adapter,
    hop_on_accounts: Option<u64>,
    hopped: AtomicBool,
    switch_delay: Duration,
}

impl StallingProvider {
    pub fn new(inner: Eip1193Adapter) -> Self {
        Self {
            inner,
            hop_on_accounts: None,
            hopped: AtomicBool::new(false),
            switch_delay: Duration::ZERO,
        }
    }

    /// The user moves the wallet to `chain_id` during the first `eth_accounts`
    /// call, after a connect has already read the network.
    pub fn hop_on_accounts(mut self, chain_id: u64) -> Self {
        self.hop_on_accounts = Some(chain_id);
        self
    }

    pub fn switch_delay(mut self, delay: Duration) -> Self {
        self.switch_delay = delay;
        self
    }
}

#[async_trait]
impl EvmProviderPort for StallingProvider {
    async fn request_accounts(&self) -> Result<Vec<String>, PortError> {
        self.inner.request_accounts().await
    }

    async fn accounts(&self) -> Result<Vec<String>, PortError> {
        if let Some(chain_id) = self.hop_on_accounts {
            if !self.hopped.swap(true, Ordering::SeqCst) {
                self.inner.debug_set_chain(chain_id)?;
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }
        self.inner.accounts().await
    }

    async fn chain_id(&self) -> Result<u64, PortError> {
        self.inner.chain_id().await
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), PortError> {
        tokio::time::sleep(self.switch_delay).await;
        self.inner.switch_chain(chain_id).await
    }

    async fn add_chain(&self, params: &AddChainParams) -> Result<(), PortError> {
        self.inner.add_chain(params).await
    }

    async fn token_balance(&self, token: &str, owner: &str) -> Result<U256, PortError> {
        self.inner.token_balance(token, owner).await
    }

    async fn send_token_call(&self, from: &str, call: &TokenCall) -> Result<String, PortError> {
        self.inner.send_token_call(from, call).await
    }

    fn subscribe(&self, listener: ProviderListener) -> Result<ListenerId, PortError> {
        self.inner.subscribe(listener)
    }

    fn unsubscribe(&self, id: ListenerId) -> Result<(), PortError> {
        self.inner.unsubscribe(id)
    }
}

/// Session over `wallets` with the EVM provider replaced by `provider`.
pub fn session_with_evm(wallets: &Wallets, provider: impl EvmProviderPort + 'static) -> SessionManager {
    let source = InjectedWalletSource::new()
        .with_evm(Arc::new(provider))
        .with_ledger(Arc::new(wallets.ledger.clone()))
        .with_channel(Arc::new(wallets.bus.clone()));
    SessionManager::new(Arc::new(source), evm_profile(), ledger_profile())
}

pub fn evm_profile() -> EvmNetworkProfile {
    EvmNetworkProfile {
        token_contract: EVM_TOKEN.to_owned(),
        ..EvmNetworkProfile::default()
    }
}

pub fn ledger_profile() -> LedgerNetworkProfile {
    LedgerNetworkProfile {
        token_contract: LEDGER_TOKEN.to_owned(),
        ..LedgerNetworkProfile::mainnet()
    }
}

pub fn session(wallets: &Wallets) -> SessionManager {
    SessionManager::new(wallets.source(), evm_profile(), ledger_profile())
}

/// Waits until a published snapshot satisfies `pred`.
pub async fn settle<F>(manager: &SessionManager, pred: F) -> SessionSnapshot
where
    F: FnMut(&SessionSnapshot) -> bool,
{
    let mut rx = manager.watch();
    let snapshot = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
        .await
        .expect("session settled in time")
        .expect("session sender alive")
        .clone();
    assert!(snapshot.invariants_hold(), "invariants broken: {snapshot:?}");
    snapshot
}

pub type TestRecorder =
    TransactionRecorder<MemoryRecordStore, NotifierAdapter, AuditLogAdapter, TestClock>;

pub struct RecorderFixture {
    pub store: MemoryRecordStore,
    pub notifier: NotifierAdapter,
    pub audit: AuditLogAdapter,
    pub recorder: TestRecorder,
}

pub fn recorder_with(notifier: NotifierAdapter) -> RecorderFixture {
    let store = MemoryRecordStore::new();
    let audit = AuditLogAdapter::new();
    let recorder = TransactionRecorder::new(
        store.clone(),
        notifier.clone(),
        audit.clone(),
        TestClock::default(),
        RecorderSettings::default(),
    );
    RecorderFixture {
        store,
        notifier,
        audit,
        recorder,
    }
}

pub fn quick_retry(attempts: u32) -> RetryPolicy {
    RetryPolicy::fixed(attempts, Duration::from_millis(1))
}
