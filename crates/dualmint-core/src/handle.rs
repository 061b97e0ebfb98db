use std::fmt;
use std::sync::Arc;

use crate::domain::ChainKind;
use crate::ports::{EvmProviderPort, LedgerInstancePort, PortError};

/// Capability-bearing object obtained from a wallet.
///
/// Its concrete shape depends on how it was obtained. Only the chain adapters
/// and `BalanceResolver` look inside it.
#[derive(Clone)]
pub enum ProviderHandle {
    /// Raw injected provider.
    Provider(Arc<dyn EvmProviderPort>),
    /// Signer wrapping a provider.
    Signer(SignerHandle),
    /// Injected ledger-chain instance.
    LedgerInstance(Arc<dyn LedgerInstancePort>),
    /// Anything else, described for diagnostics.
    Unrecognized(String),
}

#[derive(Clone)]
pub struct SignerHandle {
    pub address: String,
    pub provider: Option<Arc<dyn EvmProviderPort>>,
}

impl ProviderHandle {
    pub fn shape(&self) -> &'static str {
        match self {
            ProviderHandle::Provider(_) => "provider",
            ProviderHandle::Signer(_) => "signer",
            ProviderHandle::LedgerInstance(_) => "ledger-instance",
            ProviderHandle::Unrecognized(_) => "unrecognized",
        }
    }

    /// The EVM provider reachable from this handle, directly or one level down.
    pub fn evm_provider(&self) -> Option<Arc<dyn EvmProviderPort>> {
        match self {
            ProviderHandle::Provider(p) => Some(Arc::clone(p)),
            ProviderHandle::Signer(SignerHandle {
                provider: Some(p), ..
            }) => Some(Arc::clone(p)),
            _ => None,
        }
    }

    pub fn ledger_instance(&self) -> Option<Arc<dyn LedgerInstancePort>> {
        match self {
            ProviderHandle::LedgerInstance(i) => Some(Arc::clone(i)),
            _ => None,
        }
    }
}

impl fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderHandle::Signer(s) => f
                .debug_struct("Signer")
                .field("address", &s.address)
                .field("has_provider", &s.provider.is_some())
                .finish(),
            ProviderHandle::Unrecognized(desc) => f.debug_tuple("Unrecognized").field(desc).finish(),
            other => f.write_str(other.shape()),
        }
    }
}

/// Revision of the wallet context a capability was derived under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextStamp {
    pub epoch: u64,
    pub revision: u64,
}

#[derive(Clone)]
pub(crate) enum SigningChannel {
    Evm(Arc<dyn EvmProviderPort>),
    Ledger(Arc<dyn LedgerInstancePort>),
}

/// Authority to submit transactions as `address`.
///
/// Derived from the current provider handle at call time and only valid for
/// the context stamp it carries.
#[derive(Clone)]
pub struct SigningCapability {
    pub chain: ChainKind,
    pub address: String,
    pub(crate) stamp: ContextStamp,
    pub(crate) channel: SigningChannel,
}

impl SigningCapability {
    pub(crate) fn evm(address: String, provider: Arc<dyn EvmProviderPort>) -> Self {
        Self {
            chain: ChainKind::EvmChain,
            address,
            stamp: ContextStamp {
                epoch: 0,
                revision: 0,
            },
            channel: SigningChannel::Evm(provider),
        }
    }

    pub(crate) fn ledger(address: String, instance: Arc<dyn LedgerInstancePort>) -> Self {
        Self {
            chain: ChainKind::LedgerChain,
            address,
            stamp: ContextStamp {
                epoch: 0,
                revision: 0,
            },
            channel: SigningChannel::Ledger(instance),
        }
    }

    pub fn stamp(&self) -> ContextStamp {
        self.stamp
    }
}

impl fmt::Debug for SigningCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningCapability")
            .field("chain", &self.chain)
            .field("address", &self.address)
            .field("stamp", &self.stamp)
            .finish()
    }
}

pub(crate) fn stale(reason: impl Into<String>) -> PortError {
    PortError::StaleHandle(reason.into())
}

/// EVM addresses compare case-insensitively (checksum casing is cosmetic).
pub(crate) fn same_account(chain: ChainKind, a: &str, b: &str) -> bool {
    match chain {
        ChainKind::EvmChain => a.eq_ignore_ascii_case(b),
        ChainKind::LedgerChain => a == b,
    }
}
