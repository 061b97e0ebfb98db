use serde::{Deserialize, Serialize};

use crate::ports::{EvmProviderPort, PortError};
use crate::profile::{EvmNetworkProfile, NativeCurrency};

/// Wallet error code for "this chain is not known to the wallet".
pub const UNRECOGNIZED_CHAIN_ERROR_CODE: i64 = 4902;

/// `wallet_addEthereumChain` parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddChainParams {
    /// Hex with `0x` prefix.
    pub chain_id: String,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
}

impl From<&EvmNetworkProfile> for AddChainParams {
    fn from(profile: &EvmNetworkProfile) -> Self {
        Self {
            chain_id: format!("{:#x}", profile.chain_id),
            chain_name: profile.chain_name.clone(),
            native_currency: profile.native_currency.clone(),
            rpc_urls: profile.rpc_urls.clone(),
            block_explorer_urls: profile.explorer_urls.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The wallet accepted the switch request.
    Switched,
    /// The chain was unknown; an add-chain request was issued instead.
    AddRequested,
}

/// Two-step switch: ask for the chain, and when the wallet does not know it,
/// ask it to add the chain. The caller re-reads the network afterwards in
/// every case; neither step's success proves the wallet actually moved.
#[derive(Debug, Clone)]
pub struct NetworkSwitchProtocol {
    profile: EvmNetworkProfile,
}

impl NetworkSwitchProtocol {
    pub fn new(profile: EvmNetworkProfile) -> Self {
        Self { profile }
    }

    pub fn add_chain_params(&self) -> AddChainParams {
        AddChainParams::from(&self.profile)
    }

    pub async fn run(&self, provider: &dyn EvmProviderPort) -> Result<SwitchOutcome, PortError> {
        match provider.switch_chain(self.profile.chain_id).await {
            Ok(()) => Ok(SwitchOutcome::Switched),
            Err(err) if err.rpc_code() == Some(UNRECOGNIZED_CHAIN_ERROR_CODE) => {
                tracing::info!(
                    chain_id = self.profile.chain_id,
                    "wallet does not know the chain, requesting add"
                );
                provider.add_chain(&self.add_chain_params()).await?;
                Ok(SwitchOutcome::AddRequested)
            }
            Err(err) => Err(err),
        }
    }
}
