use std::str::FromStr;

use alloy::primitives::{utils::parse_units, Address, U256};
use serde::{Deserialize, Serialize};

use crate::domain::{ChainKind, RecordSubmission, RecordingReceipt, TokenAction};
use crate::handle::SigningChannel;
use crate::ports::{PortError, RecordingPort};
use crate::profile::{EvmNetworkProfile, LedgerNetworkProfile};
use crate::retry::{retry_async, RetryPolicy};
use crate::session::SessionManager;

/// Smallest amount the operator may mint or burn, in whole tokens.
pub const MIN_AMOUNT: f64 = 0.0001;
/// Energy fee ceiling attached to ledger contract calls.
pub const LEDGER_FEE_LIMIT: u64 = 150_000_000;
/// Ledger transaction ids are 64 hex chars; anything much shorter is bogus.
const MIN_LEDGER_TX_ID_LEN: usize = 60;
const LEDGER_ADDRESS_PREFIX: u8 = 0x41;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenMethod {
    Mint,
    BurnFrom,
}

impl TokenMethod {
    pub fn signature(self) -> &'static str {
        match self {
            TokenMethod::Mint => "mint(address,uint256)",
            TokenMethod::BurnFrom => "burnFrom(address,uint256)",
        }
    }

    pub fn action(self) -> TokenAction {
        match self {
            TokenMethod::Mint => TokenAction::Mint,
            TokenMethod::BurnFrom => TokenAction::Burn,
        }
    }
}

/// A state-changing token contract call, amount in base units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCall {
    pub contract: String,
    pub method: TokenMethod,
    pub counterparty: String,
    pub amount: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_limit: Option<u64>,
}

/// A transaction the wallet accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedTx {
    pub chain: ChainKind,
    pub action: TokenAction,
    pub tx_hash: String,
    pub counterparty: String,
    pub amount: f64,
    pub base_units: U256,
    pub initiator: String,
}

impl SubmittedTx {
    pub fn submission(&self, contact: Option<String>) -> RecordSubmission {
        RecordSubmission {
            chain: self.chain,
            action: self.action,
            tx_hash: self.tx_hash.clone(),
            counterparty_address: self.counterparty.clone(),
            amount: self.amount,
            contact: contact.filter(|c| !c.trim().is_empty()),
        }
    }
}

pub fn validate_address(chain: ChainKind, address: &str) -> Result<(), PortError> {
    let address = address.trim();
    let valid = match chain {
        ChainKind::EvmChain => address.starts_with("0x") && Address::from_str(address).is_ok(),
        ChainKind::LedgerChain => bs58::decode(address)
            .with_check(None)
            .into_vec()
            .map(|payload| payload.len() == 21 && payload[0] == LEDGER_ADDRESS_PREFIX)
            .unwrap_or(false),
    };
    if valid {
        Ok(())
    } else {
        Err(PortError::Validation(format!(
            "'{address}' is not a valid {chain} address"
        )))
    }
}

/// Decimal string to base units by integer arithmetic only.
pub fn parse_base_units(amount: &str, decimals: u8) -> Result<U256, PortError> {
    let invalid = || PortError::Validation(format!("invalid amount '{amount}'"));
    let trimmed = amount.trim();
    let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    if fraction.len() > decimals as usize {
        return Err(PortError::Validation(format!(
            "amount '{amount}' has more than {decimals} decimal places"
        )));
    }
    let digits = format!("{}{:0<width$}", whole, fraction, width = decimals as usize);
    let digits = if digits.is_empty() { "0" } else { digits.as_str() };
    U256::from_str_radix(digits, 10).map_err(|_| invalid())
}

fn parse_amount(amount: &str) -> Result<f64, PortError> {
    let value = amount
        .trim()
        .parse::<f64>()
        .map_err(|_| PortError::Validation(format!("invalid amount '{amount}'")))?;
    if !value.is_finite() || value < MIN_AMOUNT {
        return Err(PortError::Validation(format!(
            "Amount must be at least {MIN_AMOUNT}."
        )));
    }
    Ok(value)
}

fn map_submission_error(action: TokenAction, err: PortError) -> PortError {
    let verb = match action {
        TokenAction::Mint => "minting",
        TokenAction::Burn => "burning",
    };
    match err {
        PortError::UserRejected(_) => {
            PortError::UserRejected(format!("You have canceled the {verb} process."))
        }
        other => {
            let text = other.to_string();
            if text.contains("execution reverted") || text.contains("does not exist") {
                PortError::Reverted(format!("Only the owner can {action} tokens."))
            } else {
                other
            }
        }
    }
}

/// Executes mint/burn calls through the active session's wallet.
#[derive(Clone)]
pub struct TokenOperator {
    session: SessionManager,
    evm_token: String,
    evm_decimals: u8,
    ledger_token: String,
    ledger_decimals: u8,
}

impl TokenOperator {
    pub fn new(
        session: SessionManager,
        evm: &EvmNetworkProfile,
        ledger: &LedgerNetworkProfile,
    ) -> Self {
        Self {
            session,
            evm_token: evm.token_contract.clone(),
            evm_decimals: evm.token_decimals,
            ledger_token: ledger.token_contract.clone(),
            ledger_decimals: ledger.token_decimals,
        }
    }

    pub async fn mint(&self, recipient: &str, amount: &str) -> Result<SubmittedTx, PortError> {
        self.execute(TokenMethod::Mint, recipient, amount).await
    }

    pub async fn burn(&self, target: &str, amount: &str) -> Result<SubmittedTx, PortError> {
        self.execute(TokenMethod::BurnFrom, target, amount).await
    }

    async fn execute(
        &self,
        method: TokenMethod,
        counterparty: &str,
        amount: &str,
    ) -> Result<SubmittedTx, PortError> {
        let action = method.action();
        let value = parse_amount(amount)?;
        let signer = self.session.signer().await?;
        let counterparty = counterparty.trim();
        validate_address(signer.chain, counterparty)?;

        let (contract, base_units, fee_limit) = match signer.chain {
            ChainKind::EvmChain => {
                let units = parse_units(amount.trim(), self.evm_decimals)
                    .map_err(|e| PortError::Validation(format!("invalid amount '{amount}': {e}")))?
                    .get_absolute();
                (self.evm_token.clone(), units, None)
            }
            ChainKind::LedgerChain => (
                self.ledger_token.clone(),
                parse_base_units(amount, self.ledger_decimals)?,
                Some(LEDGER_FEE_LIMIT),
            ),
        };
        let call = TokenCall {
            contract,
            method,
            counterparty: counterparty.to_owned(),
            amount: base_units,
            fee_limit,
        };
        tracing::info!(
            chain = %signer.chain,
            %action,
            counterparty = %call.counterparty,
            amount = %call.amount,
            "submitting token call"
        );

        let submitted = match &signer.channel {
            SigningChannel::Evm(provider) => provider.send_token_call(&signer.address, &call).await,
            SigningChannel::Ledger(instance) => instance.contract_send(&call).await,
        };
        let tx_hash = submitted.map_err(|e| {
            let mapped = map_submission_error(action, e);
            tracing::warn!(chain = %signer.chain, %action, error = %mapped, "token call failed");
            mapped
        })?;

        if signer.chain == ChainKind::LedgerChain && tx_hash.len() < MIN_LEDGER_TX_ID_LEN {
            return Err(PortError::Validation(
                "Invalid or missing transaction ID received from the wallet.".to_owned(),
            ));
        }
        // The chain action already happened; a context change only gets noted.
        if let Err(err) = self.session.ensure_current(&signer) {
            tracing::warn!(%tx_hash, error = %err, "wallet context changed during submission");
        }

        Ok(SubmittedTx {
            chain: signer.chain,
            action,
            tx_hash,
            counterparty: call.counterparty,
            amount: value,
            base_units,
            initiator: signer.address,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlowOutcome {
    Recorded(RecordingReceipt),
    AlreadyRecorded(RecordingReceipt),
    /// On-chain action succeeded but the recording call did not.
    RecordingFailed { tx_hash: String, error: PortError },
}

/// Token operation followed by its recording call.
pub struct MintBurnFlow<R> {
    operator: TokenOperator,
    recorder: R,
    retry: RetryPolicy,
}

impl<R: RecordingPort> MintBurnFlow<R> {
    pub fn new(operator: TokenOperator, recorder: R, retry: RetryPolicy) -> Self {
        Self {
            operator,
            recorder,
            retry,
        }
    }

    pub async fn mint(
        &self,
        recipient: &str,
        amount: &str,
        contact: Option<String>,
    ) -> Result<FlowOutcome, PortError> {
        let tx = self.operator.mint(recipient, amount).await?;
        Ok(self.record(&tx, contact).await)
    }

    pub async fn burn(&self, target: &str, amount: &str) -> Result<FlowOutcome, PortError> {
        let tx = self.operator.burn(target, amount).await?;
        Ok(self.record(&tx, None).await)
    }

    /// Submits the same payload until it is stored or a non-transport error occurs.
    pub async fn record(&self, tx: &SubmittedTx, contact: Option<String>) -> FlowOutcome {
        let submission = tx.submission(contact);
        let payload = &submission;
        let recorder = &self.recorder;
        let result = retry_async(
            self.retry,
            move || recorder.submit(payload),
            |err| matches!(err, PortError::Transport(_)),
        )
        .await;
        match result {
            Ok(receipt) if receipt.already_existed => FlowOutcome::AlreadyRecorded(receipt),
            Ok(receipt) => FlowOutcome::Recorded(receipt),
            Err(error) => {
                tracing::error!(tx_hash = %tx.tx_hash, error = %error, "transaction recorded on-chain but not stored");
                FlowOutcome::RecordingFailed {
                    tx_hash: tx.tx_hash.clone(),
                    error,
                }
            }
        }
    }
}
