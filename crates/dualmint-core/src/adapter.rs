use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{ChainKind, NetworkIdentity};
use crate::handle::{same_account, stale, ProviderHandle, SigningCapability};
use crate::network_switch::{NetworkSwitchProtocol, SwitchOutcome};
use crate::ports::{EvmProviderPort, LedgerInstancePort, LedgerPermission, PortError, WalletSource};
use crate::profile::{EvmNetworkProfile, LedgerNetworkProfile};
use crate::retry::poll_until;

/// Account obtained from a wallet together with the handle it came through.
#[derive(Debug, Clone)]
pub struct AccountGrant {
    pub address: String,
    pub handle: ProviderHandle,
}

/// Per-chain wallet capabilities: detect, request an account, read and
/// switch the network, derive a signer.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn kind(&self) -> ChainKind;
    fn detect(&self) -> Result<(), PortError>;
    async fn request_account(&self) -> Result<AccountGrant, PortError>;
    async fn read_network(&self, handle: &ProviderHandle) -> Result<NetworkIdentity, PortError>;
    fn is_expected_network(&self, identity: &NetworkIdentity) -> bool;
    fn wrong_network_message(&self, identity: &NetworkIdentity) -> String;
    async fn request_switch(&self, handle: &ProviderHandle) -> Result<SwitchOutcome, PortError>;
    /// Fails with `StaleHandle` when the wallet no longer serves `address` and
    /// with `WrongNetwork` when it has left the expected network.
    async fn derive_signer(
        &self,
        handle: &ProviderHandle,
        address: &str,
    ) -> Result<SigningCapability, PortError>;
    /// Fresh handle for the wallet's current state after an account change.
    async fn refresh_handle(&self, address: &str) -> Result<ProviderHandle, PortError>;
}

pub struct EvmChainAdapter {
    wallets: Arc<dyn WalletSource>,
    profile: EvmNetworkProfile,
    switch: NetworkSwitchProtocol,
}

impl EvmChainAdapter {
    pub fn new(wallets: Arc<dyn WalletSource>, profile: EvmNetworkProfile) -> Self {
        let switch = NetworkSwitchProtocol::new(profile.clone());
        Self {
            wallets,
            profile,
            switch,
        }
    }

    fn provider(&self) -> Result<Arc<dyn EvmProviderPort>, PortError> {
        self.wallets.evm_provider().ok_or_else(|| {
            PortError::ProviderAbsent("EVM wallet not found. Please install the extension.".to_owned())
        })
    }

    fn provider_of(handle: &ProviderHandle) -> Result<Arc<dyn EvmProviderPort>, PortError> {
        handle
            .evm_provider()
            .ok_or_else(|| PortError::ResolutionFailure(format!("{handle:?}")))
    }
}

#[async_trait]
impl ChainAdapter for EvmChainAdapter {
    fn kind(&self) -> ChainKind {
        ChainKind::EvmChain
    }

    fn detect(&self) -> Result<(), PortError> {
        self.provider().map(|_| ())
    }

    async fn request_account(&self) -> Result<AccountGrant, PortError> {
        let provider = self.provider()?;
        let accounts = provider.request_accounts().await?;
        let address = accounts
            .into_iter()
            .find(|a| !a.trim().is_empty())
            .ok_or_else(|| PortError::UserRejected("No account was shared by the wallet.".to_owned()))?;
        Ok(AccountGrant {
            address,
            handle: ProviderHandle::Provider(provider),
        })
    }

    async fn read_network(&self, handle: &ProviderHandle) -> Result<NetworkIdentity, PortError> {
        let provider = Self::provider_of(handle)?;
        Ok(NetworkIdentity::ChainId(provider.chain_id().await?))
    }

    fn is_expected_network(&self, identity: &NetworkIdentity) -> bool {
        matches!(identity, NetworkIdentity::ChainId(id) if *id == self.profile.chain_id)
    }

    fn wrong_network_message(&self, identity: &NetworkIdentity) -> String {
        format!(
            "Wallet connected to wrong network (ID: {identity}). Please switch to {} (ID: {}).",
            self.profile.chain_name, self.profile.chain_id
        )
    }

    async fn request_switch(&self, handle: &ProviderHandle) -> Result<SwitchOutcome, PortError> {
        let provider = Self::provider_of(handle)?;
        self.switch.run(provider.as_ref()).await
    }

    async fn derive_signer(
        &self,
        handle: &ProviderHandle,
        address: &str,
    ) -> Result<SigningCapability, PortError> {
        let provider = Self::provider_of(handle)?;
        let accounts = provider.accounts().await?;
        if !accounts
            .iter()
            .any(|a| same_account(ChainKind::EvmChain, a, address))
        {
            return Err(stale(format!("wallet no longer exposes account {address}")));
        }
        let identity = NetworkIdentity::ChainId(provider.chain_id().await?);
        if !self.is_expected_network(&identity) {
            return Err(PortError::WrongNetwork(self.wrong_network_message(&identity)));
        }
        Ok(SigningCapability::evm(address.to_owned(), provider))
    }

    async fn refresh_handle(&self, _address: &str) -> Result<ProviderHandle, PortError> {
        Ok(ProviderHandle::Provider(self.provider()?))
    }
}

pub struct LedgerChainAdapter {
    wallets: Arc<dyn WalletSource>,
    profile: LedgerNetworkProfile,
}

impl LedgerChainAdapter {
    pub fn new(wallets: Arc<dyn WalletSource>, profile: LedgerNetworkProfile) -> Self {
        Self { wallets, profile }
    }

    pub fn profile(&self) -> &LedgerNetworkProfile {
        &self.profile
    }

    fn instance_of(handle: &ProviderHandle) -> Result<Arc<dyn LedgerInstancePort>, PortError> {
        handle
            .ledger_instance()
            .ok_or_else(|| PortError::ResolutionFailure(format!("{handle:?}")))
    }
}

/// Bare host of a node URL: scheme, path and port removed, lowercased.
pub(crate) fn node_host(url: &str) -> String {
    let trimmed = url.trim();
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);
    without_scheme
        .split(['/', ':'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

#[async_trait]
impl ChainAdapter for LedgerChainAdapter {
    fn kind(&self) -> ChainKind {
        ChainKind::LedgerChain
    }

    fn detect(&self) -> Result<(), PortError> {
        let extension = self.wallets.ledger_extension().ok_or_else(|| {
            PortError::ProviderAbsent(
                "Ledger wallet extension not found. Please install the extension.".to_owned(),
            )
        })?;
        if !extension.is_ready() {
            return Err(PortError::ProviderNotReady(
                "Wallet extension is not ready. Please log in or set it up.".to_owned(),
            ));
        }
        Ok(())
    }

    async fn request_account(&self) -> Result<AccountGrant, PortError> {
        self.detect()?;
        let extension = self
            .wallets
            .ledger_extension()
            .ok_or_else(|| PortError::ProviderAbsent("ledger wallet extension vanished".to_owned()))?;

        let permission = extension.request_accounts().await?;
        match permission.code {
            LedgerPermission::GRANTED => {}
            LedgerPermission::REJECTED => {
                return Err(PortError::UserRejected(
                    "Connection request was rejected in the wallet.".to_owned(),
                ))
            }
            code => {
                return Err(PortError::ProviderNotReady(format!(
                    "Wallet extension refused access ({code}): {}",
                    permission.message
                )))
            }
        }

        // The extension populates the injected instance shortly after granting.
        let injected = poll_until(self.profile.readiness, || {
            let found = extension
                .injected()
                .and_then(|instance| instance.default_address().map(|a| (a, instance)))
                .filter(|(a, _)| !a.is_empty());
            std::future::ready(found)
        })
        .await;

        let (address, instance) = injected.ok_or_else(|| {
            PortError::ProviderNotReady(
                "Failed to get account details after connecting. Try refreshing.".to_owned(),
            )
        })?;
        Ok(AccountGrant {
            address,
            handle: ProviderHandle::LedgerInstance(instance),
        })
    }

    async fn read_network(&self, handle: &ProviderHandle) -> Result<NetworkIdentity, PortError> {
        let instance = Self::instance_of(handle)?;
        let host = instance.full_node_host().ok_or_else(|| {
            PortError::ProviderNotReady("Wallet has no full node configured.".to_owned())
        })?;
        Ok(NetworkIdentity::Node(host.trim().to_ascii_lowercase()))
    }

    fn is_expected_network(&self, identity: &NetworkIdentity) -> bool {
        match identity {
            NetworkIdentity::Node(url) => {
                let host = node_host(url);
                self.profile
                    .allowed_hosts
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(&host))
            }
            NetworkIdentity::ChainId(_) => false,
        }
    }

    fn wrong_network_message(&self, identity: &NetworkIdentity) -> String {
        format!(
            "Wallet connected to wrong network (node: {identity}). Please switch to {}.",
            self.profile.network_tag
        )
    }

    async fn request_switch(&self, _handle: &ProviderHandle) -> Result<SwitchOutcome, PortError> {
        Err(PortError::SwitchUnsupported(format!(
            "Please switch network manually to {} in your wallet extension.",
            self.profile.network_tag
        )))
    }

    async fn derive_signer(
        &self,
        handle: &ProviderHandle,
        address: &str,
    ) -> Result<SigningCapability, PortError> {
        let identity = self.read_network(handle).await?;
        if !self.is_expected_network(&identity) {
            return Err(PortError::WrongNetwork(self.wrong_network_message(&identity)));
        }
        let instance = Self::instance_of(handle)?;
        match instance.default_address() {
            Some(current) if same_account(ChainKind::LedgerChain, &current, address) => {
                Ok(SigningCapability::ledger(address.to_owned(), instance))
            }
            Some(current) => Err(stale(format!(
                "wallet switched from {address} to {current}"
            ))),
            None => Err(stale("wallet no longer exposes an account")),
        }
    }

    async fn refresh_handle(&self, _address: &str) -> Result<ProviderHandle, PortError> {
        let extension = self
            .wallets
            .ledger_extension()
            .ok_or_else(|| PortError::ProviderAbsent("ledger wallet extension vanished".to_owned()))?;
        extension
            .injected()
            .map(ProviderHandle::LedgerInstance)
            .ok_or_else(|| PortError::ProviderNotReady("ledger instance not injected".to_owned()))
    }
}
