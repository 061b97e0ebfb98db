//! Wallet session ownership.
//!
//! `SessionManager` is the only writer of the [`Session`]. Every mutation that
//! follows an await is compare-and-set against the context epoch captured
//! before the await; results that arrive after the context moved on are
//! dropped. Readers get [`SessionSnapshot`]s, either on demand or through
//! [`SessionManager::watch`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::adapter::{ChainAdapter, EvmChainAdapter, LedgerChainAdapter};
use crate::domain::{ChainKind, NetworkIdentity};
use crate::events::{EventNormalizer, EventSubscriptions, WalletEvent, WalletEventKind};
use crate::handle::{same_account, ContextStamp, ProviderHandle, SigningCapability};
use crate::network_switch::SwitchOutcome;
use crate::ports::{PortError, WalletSource};
use crate::profile::{EvmNetworkProfile, LedgerNetworkProfile};
use crate::state_machine::{session_transition, SessionAction, SessionState};

#[derive(Debug, Clone)]
pub struct Session {
    pub chain_kind: ChainKind,
    pub address: Option<String>,
    pub provider_handle: Option<ProviderHandle>,
    pub network_identity: Option<NetworkIdentity>,
    pub is_connected: bool,
    /// Only meaningful while connected.
    pub is_network_correct: bool,
    pub is_loading: bool,
    pub last_error: Option<String>,
}

impl Session {
    pub fn new(chain_kind: ChainKind) -> Self {
        Self {
            chain_kind,
            address: None,
            provider_handle: None,
            network_identity: None,
            is_connected: false,
            is_network_correct: false,
            is_loading: false,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session: Session,
    pub state: SessionState,
    pub has_signer: bool,
}

impl SessionSnapshot {
    /// Checks the structural invariants every published snapshot must hold.
    pub fn invariants_hold(&self) -> bool {
        let s = &self.session;
        let connected_consistent = s.is_connected == self.state.is_connected();
        let connected_complete =
            !s.is_connected || (s.address.is_some() && s.provider_handle.is_some());
        let network_flag = s.is_connected || !s.is_network_correct;
        let signer_requires_connection = !self.has_signer || s.is_connected;
        connected_consistent && connected_complete && network_flag && signer_requires_connection
    }
}

struct SessionCell {
    session: Session,
    state: SessionState,
    /// Bumped whenever the active context is replaced (reset, disconnect).
    epoch: u64,
    /// Bumped on account or network changes inside one epoch.
    revision: u64,
    signer: Option<SigningCapability>,
    pending_recheck: Option<JoinHandle<()>>,
    /// Events for the active chain received while a connect is in flight,
    /// replayed in arrival order once it commits.
    deferred: Vec<WalletEventKind>,
}

impl SessionCell {
    fn new(kind: ChainKind) -> Self {
        Self {
            session: Session::new(kind),
            state: SessionState::Idle,
            epoch: 0,
            revision: 0,
            signer: None,
            pending_recheck: None,
            deferred: Vec::new(),
        }
    }

    fn stamp(&self) -> ContextStamp {
        ContextStamp {
            epoch: self.epoch,
            revision: self.revision,
        }
    }

    fn transition(&mut self, action: SessionAction) {
        match session_transition(self.state, action) {
            Ok((next, transition)) => {
                tracing::debug!(
                    from = ?transition.from,
                    to = ?transition.to,
                    reason = transition.reason,
                    "session transition"
                );
                self.state = next;
            }
            Err(err) => tracing::warn!(error = %err, "session action ignored"),
        }
        self.session.is_connected = self.state.is_connected();
        if !self.session.is_connected {
            self.session.is_network_correct = false;
        }
    }

    /// Replaces the context; anything in flight against the old epoch is void.
    fn clear(&mut self, kind: ChainKind) {
        self.epoch += 1;
        self.revision = 0;
        self.signer = None;
        self.deferred.clear();
        if let Some(task) = self.pending_recheck.take() {
            task.abort();
        }
        self.session = Session::new(kind);
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session: self.session.clone(),
            state: self.state,
            has_signer: self.signer.is_some(),
        }
    }
}

struct SessionInner {
    wallets: Arc<dyn WalletSource>,
    evm: EvmChainAdapter,
    ledger: LedgerChainAdapter,
    recheck_delay: Duration,
    cell: Mutex<SessionCell>,
    updates: watch::Sender<SessionSnapshot>,
}

impl SessionInner {
    fn adapter(&self, kind: ChainKind) -> &dyn ChainAdapter {
        match kind {
            ChainKind::EvmChain => &self.evm,
            ChainKind::LedgerChain => &self.ledger,
        }
    }
}

enum Followup {
    Done(SessionSnapshot),
    RefreshHandle(ContextStamp, ChainKind, String),
    RefreshSigner(ContextStamp),
}

struct Established {
    address: String,
    handle: ProviderHandle,
    identity: NetworkIdentity,
    network_correct: bool,
    signer: Option<SigningCapability>,
}

#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl SessionManager {
    pub fn new(
        wallets: Arc<dyn WalletSource>,
        evm: EvmNetworkProfile,
        ledger: LedgerNetworkProfile,
    ) -> Self {
        let cell = SessionCell::new(ChainKind::EvmChain);
        let (updates, _) = watch::channel(cell.snapshot());
        Self {
            inner: Arc::new(SessionInner {
                evm: EvmChainAdapter::new(Arc::clone(&wallets), evm),
                recheck_delay: ledger.manual_switch_recheck,
                ledger: LedgerChainAdapter::new(Arc::clone(&wallets), ledger),
                wallets,
                cell: Mutex::new(cell),
                updates,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionCell> {
        self.inner.cell.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, cell: &SessionCell) -> SessionSnapshot {
        let snapshot = cell.snapshot();
        self.inner.updates.send_replace(snapshot.clone());
        snapshot
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().snapshot()
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.updates.subscribe()
    }

    pub fn adapter(&self, kind: ChainKind) -> &dyn ChainAdapter {
        self.inner.adapter(kind)
    }

    /// Changes the selected chain kind. A different kind resets the session
    /// and voids any connect still in flight.
    pub fn select_chain(&self, kind: ChainKind) -> SessionSnapshot {
        let mut cell = self.lock();
        if cell.session.chain_kind == kind {
            return cell.snapshot();
        }
        tracing::info!(from = %cell.session.chain_kind, to = %kind, "chain selection changed");
        cell.clear(kind);
        cell.transition(SessionAction::Reset);
        self.publish(&cell)
    }

    pub async fn connect(&self, kind: ChainKind) -> SessionSnapshot {
        let epoch = {
            let mut cell = self.lock();
            cell.clear(kind);
            cell.transition(SessionAction::BeginConnect);
            cell.session.is_loading = true;
            self.publish(&cell);
            cell.epoch
        };
        tracing::info!(chain = %kind, epoch, "connecting wallet");

        let result = self.establish(kind).await;

        let followup = {
            let mut cell = self.lock();
            if cell.epoch != epoch {
                tracing::info!(chain = %kind, epoch, "discarding superseded connect result");
                return cell.snapshot();
            }
            self.commit_connect(&mut cell, kind, result)
        };
        self.run_followup(followup).await
    }

    /// Applies a connect result, then replays events deferred while it ran.
    fn commit_connect(
        &self,
        cell: &mut SessionCell,
        kind: ChainKind,
        result: Result<Established, PortError>,
    ) -> Followup {
        match result {
            Ok(established) => {
                let Established {
                    address,
                    handle,
                    identity,
                    network_correct,
                    signer,
                } = established;
                let adapter = self.inner.adapter(kind);
                cell.session.last_error =
                    (!network_correct).then(|| adapter.wrong_network_message(&identity));
                cell.session.address = Some(address);
                cell.session.provider_handle = Some(handle);
                cell.session.network_identity = Some(identity);
                cell.session.is_loading = false;
                let stamp = cell.stamp();
                cell.signer = signer.map(|mut cap| {
                    cap.stamp = stamp;
                    cap
                });
                cell.transition(SessionAction::ConnectSucceeded { network_correct });
                cell.session.is_network_correct = network_correct;
                tracing::info!(
                    chain = %kind,
                    address = cell.session.address.as_deref().unwrap_or_default(),
                    network_correct,
                    "wallet connected"
                );
            }
            Err(err) => {
                tracing::warn!(chain = %kind, code = err.kind(), error = %err, "wallet connect failed");
                cell.session = Session::new(kind);
                cell.signer = None;
                cell.transition(SessionAction::ConnectFailed);
                cell.session.last_error = Some(err.to_string());
                cell.deferred.clear();
            }
        }

        let deferred = std::mem::take(&mut cell.deferred);
        if deferred.is_empty() {
            return Followup::Done(self.publish(cell));
        }
        tracing::debug!(chain = %kind, count = deferred.len(), "replaying events received during connect");
        // The signer was derived against what the wallet looked like before these events.
        cell.signer = None;
        cell.revision += 1;
        let mut followup = Followup::Done(cell.snapshot());
        for event in deferred {
            if !cell.state.is_connected() {
                break;
            }
            followup = self.apply_event(cell, event);
        }
        followup
    }

    async fn establish(&self, kind: ChainKind) -> Result<Established, PortError> {
        let adapter = self.inner.adapter(kind);
        adapter.detect()?;
        let grant = adapter.request_account().await?;
        let identity = adapter.read_network(&grant.handle).await?;
        let network_correct = adapter.is_expected_network(&identity);
        let signer = if network_correct {
            match adapter.derive_signer(&grant.handle, &grant.address).await {
                Ok(cap) => Some(cap),
                Err(err) => {
                    tracing::debug!(error = %err, "signer not available yet");
                    None
                }
            }
        } else {
            None
        };
        Ok(Established {
            address: grant.address,
            handle: grant.handle,
            identity,
            network_correct,
            signer,
        })
    }

    /// Local reset; keeps the selected chain kind.
    pub fn disconnect(&self) -> SessionSnapshot {
        let mut cell = self.lock();
        let kind = cell.session.chain_kind;
        cell.clear(kind);
        cell.transition(SessionAction::Disconnect);
        tracing::info!(chain = %kind, "wallet disconnected");
        self.publish(&cell)
    }

    pub async fn switch_network(&self) -> SessionSnapshot {
        let (kind, epoch, handle) = {
            let mut cell = self.lock();
            let handle = match (cell.state.is_connected(), cell.session.provider_handle.clone()) {
                (true, Some(handle)) => handle,
                _ => {
                    cell.session.last_error = Some("Please connect your wallet first.".to_owned());
                    return self.publish(&cell);
                }
            };
            cell.session.is_loading = true;
            self.publish(&cell);
            (cell.session.chain_kind, cell.epoch, handle)
        };
        let adapter = self.inner.adapter(kind);

        match adapter.request_switch(&handle).await {
            Ok(outcome) => {
                tracing::info!(chain = %kind, ?outcome, "network switch requested");
                self.recheck_network(epoch, outcome_error(outcome)).await;
            }
            Err(PortError::SwitchUnsupported(message)) => {
                let mut cell = self.lock();
                if cell.epoch == epoch {
                    cell.session.last_error = Some(message);
                    self.schedule_recheck(&mut cell, epoch);
                }
            }
            Err(err) => {
                tracing::warn!(chain = %kind, error = %err, "network switch failed");
                // The wallet may still have moved; trust only a fresh read.
                self.recheck_network(epoch, Some(err.to_string())).await;
            }
        }
        self.finish_loading(epoch)
    }

    fn finish_loading(&self, epoch: u64) -> SessionSnapshot {
        let mut cell = self.lock();
        if cell.epoch != epoch {
            return cell.snapshot();
        }
        cell.session.is_loading = false;
        self.publish(&cell)
    }

    fn schedule_recheck(&self, cell: &mut SessionCell, epoch: u64) {
        if let Some(task) = cell.pending_recheck.take() {
            task.abort();
        }
        let manager = self.clone();
        let delay = self.inner.recheck_delay;
        cell.pending_recheck = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            manager.recheck_network(epoch, None).await;
        }));
    }

    /// Re-reads the wallet's network and applies it if the context is unchanged.
    /// `fallback_error` is kept when the fresh read is not the expected network.
    async fn recheck_network(&self, epoch: u64, fallback_error: Option<String>) -> SessionSnapshot {
        let (kind, handle) = {
            let cell = self.lock();
            match (cell.session.provider_handle.clone(), cell.epoch == epoch) {
                (Some(handle), true) => (cell.session.chain_kind, handle),
                _ => return cell.snapshot(),
            }
        };
        let read = self.inner.adapter(kind).read_network(&handle).await;

        let followup = {
            let mut cell = self.lock();
            if cell.epoch != epoch || !cell.state.is_connected() {
                return cell.snapshot();
            }
            match read {
                Ok(identity) => {
                    let correct = self.apply_network(&mut cell, identity);
                    if !correct {
                        if let Some(message) = fallback_error {
                            cell.session.last_error = Some(message);
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(chain = %kind, error = %err, "network re-read failed");
                    cell.revision += 1;
                    cell.signer = None;
                    cell.transition(SessionAction::NetworkChecked { correct: false });
                    cell.session.is_network_correct = false;
                    cell.session.last_error =
                        Some(fallback_error.unwrap_or_else(|| err.to_string()));
                }
            }
            self.signer_followup(&cell)
        };
        self.run_followup(followup).await
    }

    fn apply_network(&self, cell: &mut SessionCell, identity: NetworkIdentity) -> bool {
        let adapter = self.inner.adapter(cell.session.chain_kind);
        let correct = adapter.is_expected_network(&identity);
        cell.revision += 1;
        cell.session.last_error = (!correct).then(|| adapter.wrong_network_message(&identity));
        cell.session.network_identity = Some(identity);
        if !correct {
            cell.signer = None;
        } else if let Some(signer) = cell.signer.as_mut() {
            signer.stamp = ContextStamp {
                epoch: cell.epoch,
                revision: cell.revision,
            };
        }
        cell.transition(SessionAction::NetworkChecked { correct });
        cell.session.is_network_correct = correct;
        correct
    }

    /// Publishes the cell and decides whether a signer must be derived.
    fn signer_followup(&self, cell: &SessionCell) -> Followup {
        let snapshot = self.publish(cell);
        if snapshot.session.is_network_correct && !snapshot.has_signer {
            Followup::RefreshSigner(cell.stamp())
        } else {
            Followup::Done(snapshot)
        }
    }

    async fn run_followup(&self, mut followup: Followup) -> SessionSnapshot {
        loop {
            followup = match followup {
                Followup::Done(snapshot) => return snapshot,
                Followup::RefreshHandle(stamp, kind, address) => {
                    self.refresh_handle(stamp, kind, address).await
                }
                Followup::RefreshSigner(stamp) => return self.refresh_signer(stamp).await,
            };
        }
    }

    /// Applies one normalized wallet event. Events that arrive while a connect
    /// for the same chain is in flight are held until that connect commits.
    pub async fn handle_event(&self, event: WalletEvent) -> SessionSnapshot {
        let followup = {
            let mut cell = self.lock();
            if event.chain != cell.session.chain_kind {
                tracing::trace!(?event, "discarding event for inactive chain");
                return cell.snapshot();
            }
            if cell.state == SessionState::Connecting {
                tracing::debug!(?event, "deferring event until connect settles");
                cell.revision += 1;
                cell.deferred.push(event.kind);
                return cell.snapshot();
            }
            if !cell.state.is_connected() {
                tracing::trace!(?event, "discarding event while disconnected");
                return cell.snapshot();
            }
            self.apply_event(&mut cell, event.kind)
        };
        self.run_followup(followup).await
    }

    fn apply_event(&self, cell: &mut SessionCell, event: WalletEventKind) -> Followup {
        let kind = cell.session.chain_kind;
        match event {
            WalletEventKind::AccountChanged(address) if address.is_empty() => {
                cell.clear(kind);
                cell.transition(SessionAction::AccountCleared);
                tracing::info!(chain = %kind, "wallet locked or access revoked");
                Followup::Done(self.publish(cell))
            }
            WalletEventKind::AccountChanged(address) => {
                let unchanged = cell
                    .session
                    .address
                    .as_deref()
                    .is_some_and(|current| same_account(kind, current, &address));
                if unchanged {
                    self.signer_followup(cell)
                } else {
                    tracing::info!(chain = %kind, %address, "wallet account changed");
                    cell.revision += 1;
                    cell.signer = None;
                    cell.session.address = Some(address.clone());
                    self.publish(cell);
                    Followup::RefreshHandle(cell.stamp(), kind, address)
                }
            }
            WalletEventKind::NetworkChanged(identity) => {
                tracing::info!(chain = %kind, %identity, "wallet network changed");
                self.apply_network(cell, identity);
                self.signer_followup(cell)
            }
        }
    }

    async fn refresh_handle(
        &self,
        stamp: ContextStamp,
        kind: ChainKind,
        address: String,
    ) -> Followup {
        let refreshed = self.inner.adapter(kind).refresh_handle(&address).await;
        let mut cell = self.lock();
        if cell.stamp() != stamp {
            return Followup::Done(cell.snapshot());
        }
        match refreshed {
            Ok(handle) => {
                cell.session.provider_handle = Some(handle);
                self.signer_followup(&cell)
            }
            Err(err) => {
                tracing::warn!(chain = %kind, error = %err, "could not refresh provider handle");
                cell.session.last_error = Some(err.to_string());
                Followup::Done(self.publish(&cell))
            }
        }
    }

    async fn refresh_signer(&self, stamp: ContextStamp) -> SessionSnapshot {
        let (kind, handle, address) = {
            let cell = self.lock();
            match (&cell.session.provider_handle, &cell.session.address) {
                (Some(handle), Some(address)) if cell.stamp() == stamp => {
                    (cell.session.chain_kind, handle.clone(), address.clone())
                }
                _ => return cell.snapshot(),
            }
        };
        let derived = self.inner.adapter(kind).derive_signer(&handle, &address).await;

        let mut cell = self.lock();
        if cell.stamp() != stamp {
            return cell.snapshot();
        }
        match derived {
            Ok(mut cap) => {
                cap.stamp = stamp;
                cell.signer = Some(cap);
            }
            Err(err) => tracing::debug!(error = %err, "signer refresh failed"),
        }
        self.publish(&cell)
    }

    /// Derives a signing capability from the current handle at call time.
    pub async fn signer(&self) -> Result<SigningCapability, PortError> {
        let (kind, stamp, handle, address) = {
            let cell = self.lock();
            if !cell.state.is_connected() {
                return Err(PortError::NotConnected(
                    "Please connect your wallet first.".to_owned(),
                ));
            }
            if !cell.session.is_network_correct {
                return Err(PortError::WrongNetwork(
                    cell.session
                        .last_error
                        .clone()
                        .unwrap_or_else(|| "Wallet is connected to the wrong network.".to_owned()),
                ));
            }
            match (&cell.session.provider_handle, &cell.session.address) {
                (Some(handle), Some(address)) => (
                    cell.session.chain_kind,
                    cell.stamp(),
                    handle.clone(),
                    address.clone(),
                ),
                _ => {
                    return Err(PortError::NotConnected(
                        "Please connect your wallet first.".to_owned(),
                    ))
                }
            }
        };

        let mut cap = self.inner.adapter(kind).derive_signer(&handle, &address).await?;

        let mut cell = self.lock();
        if cell.stamp() != stamp {
            return Err(PortError::StaleHandle(
                "Wallet changed while preparing the transaction. Please try again.".to_owned(),
            ));
        }
        cap.stamp = stamp;
        cell.signer = Some(cap.clone());
        self.publish(&cell);
        Ok(cap)
    }

    /// Whether `cap` still belongs to the active context.
    pub fn ensure_current(&self, cap: &SigningCapability) -> Result<(), PortError> {
        let cell = self.lock();
        let current = cell.state.is_connected()
            && cell.session.is_network_correct
            && cell.session.chain_kind == cap.chain
            && cell.stamp() == cap.stamp;
        if current {
            Ok(())
        } else {
            Err(PortError::StaleHandle(
                "wallet context changed since the signer was derived".to_owned(),
            ))
        }
    }

    /// Subscribes to wallet notifications and pumps them into the session
    /// until the returned guard is dropped.
    pub fn mount(&self) -> Result<SessionMount, PortError> {
        let (subscriptions, mut events) = EventNormalizer::attach(self.inner.wallets.as_ref())?;
        let manager = self.clone();
        let pump = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                manager.handle_event(event).await;
            }
        });
        Ok(SessionMount {
            _subscriptions: subscriptions,
            pump,
        })
    }
}

fn outcome_error(outcome: SwitchOutcome) -> Option<String> {
    match outcome {
        SwitchOutcome::Switched => None,
        SwitchOutcome::AddRequested => Some(
            "Network was added to the wallet. Approve the switch in your wallet to continue."
                .to_owned(),
        ),
    }
}

/// Event subscriptions plus the pump task feeding the session.
pub struct SessionMount {
    _subscriptions: EventSubscriptions,
    pump: JoinHandle<()>,
}

impl Drop for SessionMount {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
