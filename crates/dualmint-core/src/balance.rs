use std::sync::atomic::{AtomicU64, Ordering};

use alloy::primitives::{utils::format_units, U256};

use crate::handle::{ProviderHandle, SignerHandle};
use crate::ports::PortError;
use crate::profile::{EvmNetworkProfile, LedgerNetworkProfile};

/// How a provider handle was turned into a read capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionPath {
    Direct,
    NestedProvider,
    LedgerInstance,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBalance {
    pub raw: U256,
    pub display: String,
    pub path: ResolutionPath,
}

/// Integer split of a base-unit amount into `whole.fraction`, trailing
/// fractional zeros removed.
pub fn format_base_units(raw: U256, decimals: u8) -> String {
    if decimals == 0 {
        return raw.to_string();
    }
    let base = U256::from(10u64).pow(U256::from(decimals));
    let whole = raw / base;
    let fraction = raw % base;
    let padded = format!("{:0>width$}", fraction.to_string(), width = decimals as usize);
    let trimmed = padded.trim_end_matches('0');
    if trimmed.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{trimmed}")
    }
}

fn trim_decimal(formatted: String) -> String {
    match formatted.split_once('.') {
        Some((whole, fraction)) => {
            let fraction = fraction.trim_end_matches('0');
            if fraction.is_empty() {
                whole.to_owned()
            } else {
                format!("{whole}.{fraction}")
            }
        }
        None => formatted,
    }
}

#[derive(Debug, Clone)]
pub struct BalanceResolver {
    evm_token: String,
    evm_decimals: u8,
    ledger_token: String,
    ledger_decimals: u8,
}

impl BalanceResolver {
    pub fn new(evm: &EvmNetworkProfile, ledger: &LedgerNetworkProfile) -> Self {
        Self {
            evm_token: evm.token_contract.clone(),
            evm_decimals: evm.token_decimals,
            ledger_token: ledger.token_contract.clone(),
            ledger_decimals: ledger.token_decimals,
        }
    }

    /// Probes the handle's shape in fixed order.
    pub fn resolve(handle: &ProviderHandle) -> Result<ResolutionPath, PortError> {
        match handle {
            ProviderHandle::Provider(_) => Ok(ResolutionPath::Direct),
            ProviderHandle::Signer(SignerHandle {
                provider: Some(_), ..
            }) => Ok(ResolutionPath::NestedProvider),
            ProviderHandle::LedgerInstance(_) => Ok(ResolutionPath::LedgerInstance),
            other => Err(PortError::ResolutionFailure(format!("{other:?}"))),
        }
    }

    pub async fn read(&self, handle: &ProviderHandle, owner: &str) -> Result<TokenBalance, PortError> {
        let path = Self::resolve(handle)?;
        match path {
            ResolutionPath::Direct | ResolutionPath::NestedProvider => {
                let provider = handle
                    .evm_provider()
                    .ok_or_else(|| PortError::ResolutionFailure(format!("{handle:?}")))?;
                let raw = provider.token_balance(&self.evm_token, owner).await?;
                let display = format_units(raw, self.evm_decimals)
                    .map_err(|e| PortError::Validation(format!("cannot format balance: {e}")))?;
                Ok(TokenBalance {
                    raw,
                    display: trim_decimal(display),
                    path,
                })
            }
            ResolutionPath::LedgerInstance => {
                let instance = handle
                    .ledger_instance()
                    .ok_or_else(|| PortError::ResolutionFailure(format!("{handle:?}")))?;
                let raw = instance.contract_balance_of(&self.ledger_token, owner).await?;
                Ok(TokenBalance {
                    raw,
                    display: format_base_units(raw, self.ledger_decimals),
                    path,
                })
            }
        }
    }
}

/// Last-request-wins wrapper around [`BalanceResolver`].
#[derive(Debug)]
pub struct BalanceWatcher {
    resolver: BalanceResolver,
    latest: AtomicU64,
}

impl BalanceWatcher {
    pub fn new(resolver: BalanceResolver) -> Self {
        Self {
            resolver,
            latest: AtomicU64::new(0),
        }
    }

    /// Makes every in-flight refresh stale, e.g. after an account change.
    pub fn invalidate(&self) {
        self.latest.fetch_add(1, Ordering::SeqCst);
    }

    /// `None` when a newer refresh (or an invalidation) started meanwhile.
    pub async fn refresh(
        &self,
        handle: &ProviderHandle,
        owner: &str,
    ) -> Option<Result<TokenBalance, PortError>> {
        let ticket = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let result = self.resolver.read(handle, owner).await;
        if self.latest.load(Ordering::SeqCst) != ticket {
            tracing::debug!(ticket, "discarding superseded balance refresh");
            return None;
        }
        if let Err(err) = &result {
            tracing::warn!(error = %err, "balance read failed");
        }
        Some(result)
    }
}
