use std::sync::Arc;

use dualmint_core::{BroadcastChannelPort, EvmProviderPort, LedgerExtensionPort, WalletSource};

/// Whatever wallets are injected into the current execution context.
#[derive(Clone, Default)]
pub struct InjectedWalletSource {
    evm: Option<Arc<dyn EvmProviderPort>>,
    ledger: Option<Arc<dyn LedgerExtensionPort>>,
    channel: Option<Arc<dyn BroadcastChannelPort>>,
}

impl InjectedWalletSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_evm(mut self, provider: Arc<dyn EvmProviderPort>) -> Self {
        self.evm = Some(provider);
        self
    }

    pub fn with_ledger(mut self, extension: Arc<dyn LedgerExtensionPort>) -> Self {
        self.ledger = Some(extension);
        self
    }

    pub fn with_channel(mut self, channel: Arc<dyn BroadcastChannelPort>) -> Self {
        self.channel = Some(channel);
        self
    }
}

impl WalletSource for InjectedWalletSource {
    fn evm_provider(&self) -> Option<Arc<dyn EvmProviderPort>> {
        self.evm.clone()
    }

    fn ledger_extension(&self) -> Option<Arc<dyn LedgerExtensionPort>> {
        self.ledger.clone()
    }

    fn broadcast_channel(&self) -> Option<Arc<dyn BroadcastChannelPort>> {
        self.channel.clone()
    }
}
