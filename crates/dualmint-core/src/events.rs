//! Normalization of wallet change notifications.
//!
//! The EVM wallet emits `accountsChanged`/`chainChanged` directly; the ledger
//! wallet posts `{message: {action, data}}` envelopes on a shared broadcast
//! channel. Both become [`WalletEvent`]s delivered in transport order.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::domain::{ChainKind, NetworkIdentity};
use crate::ports::{
    BroadcastChannelPort, BroadcastMessage, ContextId, EvmProviderPort, ListenerId, PortError,
    ProviderNotification, WalletSource,
};

const ACTION_SET_ACCOUNT: &str = "setAccount";
const ACTION_SET_NODE: &str = "setNode";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEventKind {
    /// Empty string means the wallet locked or revoked access.
    AccountChanged(String),
    NetworkChanged(NetworkIdentity),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletEvent {
    pub chain: ChainKind,
    pub kind: WalletEventKind,
}

impl WalletEvent {
    pub fn account(chain: ChainKind, address: impl Into<String>) -> Self {
        Self {
            chain,
            kind: WalletEventKind::AccountChanged(address.into()),
        }
    }

    pub fn network(chain: ChainKind, identity: NetworkIdentity) -> Self {
        Self {
            chain,
            kind: WalletEventKind::NetworkChanged(identity),
        }
    }
}

/// Parses a chain id as reported by a wallet: `0x`-prefixed hex or decimal.
pub fn parse_chain_id(raw: &str) -> Result<u64, PortError> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse::<u64>(),
    };
    parsed.map_err(|e| PortError::Validation(format!("invalid chain id '{raw}': {e}")))
}

pub fn normalize_provider_notification(notification: ProviderNotification) -> Option<WalletEvent> {
    match notification {
        ProviderNotification::AccountsChanged(accounts) => Some(WalletEvent::account(
            ChainKind::EvmChain,
            accounts.into_iter().next().unwrap_or_default(),
        )),
        ProviderNotification::ChainChanged(raw) => match parse_chain_id(&raw) {
            Ok(id) => Some(WalletEvent::network(
                ChainKind::EvmChain,
                NetworkIdentity::ChainId(id),
            )),
            Err(err) => {
                tracing::warn!(error = %err, "dropping chainChanged with unparseable id");
                None
            }
        },
    }
}

/// Translates one broadcast message. Anything foreign or malformed is ignored.
pub fn normalize_broadcast(own: &ContextId, message: &BroadcastMessage) -> Option<WalletEvent> {
    if &message.origin != own {
        return None;
    }
    let envelope = message.payload.get("message")?;
    let action = envelope.get("action")?.as_str()?;
    let data = envelope.get("data");

    match action {
        ACTION_SET_ACCOUNT => {
            let address = match data?.get("address")? {
                Value::String(s) => s.trim().to_owned(),
                // The extension reports `false` / `null` on lock.
                Value::Bool(false) | Value::Null => String::new(),
                _ => return None,
            };
            Some(WalletEvent::account(ChainKind::LedgerChain, address))
        }
        ACTION_SET_NODE => {
            let host = data?.get("node")?.get("fullNode")?.as_str()?;
            Some(WalletEvent::network(
                ChainKind::LedgerChain,
                NetworkIdentity::Node(host.trim().to_ascii_lowercase()),
            ))
        }
        _ => None,
    }
}

/// Releases both registrations when dropped.
pub struct EventSubscriptions {
    evm: Option<(Arc<dyn EvmProviderPort>, ListenerId)>,
    broadcast: Option<(Arc<dyn BroadcastChannelPort>, ListenerId)>,
}

impl EventSubscriptions {
    pub fn is_empty(&self) -> bool {
        self.evm.is_none() && self.broadcast.is_none()
    }
}

impl Drop for EventSubscriptions {
    fn drop(&mut self) {
        if let Some((provider, id)) = self.evm.take() {
            if let Err(err) = provider.unsubscribe(id) {
                tracing::warn!(error = %err, "failed to remove provider listener");
            }
        }
        if let Some((channel, id)) = self.broadcast.take() {
            if let Err(err) = channel.unsubscribe(id) {
                tracing::warn!(error = %err, "failed to remove broadcast listener");
            }
        }
    }
}

pub struct EventNormalizer;

impl EventNormalizer {
    /// Registers on every wallet runtime the source exposes and funnels the
    /// normalized events into one channel.
    pub fn attach(
        source: &dyn WalletSource,
    ) -> Result<(EventSubscriptions, mpsc::UnboundedReceiver<WalletEvent>), PortError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subs = EventSubscriptions {
            evm: None,
            broadcast: None,
        };

        if let Some(provider) = source.evm_provider() {
            let sender = tx.clone();
            let id = provider.subscribe(Arc::new(move |notification| {
                if let Some(event) = normalize_provider_notification(notification) {
                    let _ = sender.send(event);
                }
            }))?;
            subs.evm = Some((provider, id));
        }

        if let Some(channel) = source.broadcast_channel() {
            let own = channel.context_id();
            let sender = tx;
            let id = channel.subscribe(Arc::new(move |message| {
                match normalize_broadcast(&own, &message) {
                    Some(event) => {
                        let _ = sender.send(event);
                    }
                    None => tracing::trace!(origin = %message.origin, "ignored broadcast message"),
                }
            }))?;
            subs.broadcast = Some((channel, id));
        }

        Ok((subs, rx))
    }
}
