use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use serde::{Deserialize, Serialize};

use dualmint_core::{NotifierPort, PortError, RecordDetails, TransactionRecord};

use crate::AdapterConfig;

/// Message delivered to a mint recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintNotification {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub explorer_url: String,
    pub tx_hash: String,
}

impl MintNotification {
    pub fn build(record: &TransactionRecord, contact: &str, explorer_url: &str) -> Self {
        let expiry = match &record.details {
            RecordDetails::Mint { expiry_date, .. } => i64::try_from(expiry_date.0)
                .ok()
                .and_then(DateTime::from_timestamp_millis)
                .map(|d| d.format("%Y-%m-%d").to_string()),
            RecordDetails::Burn { .. } => None,
        };
        let mut body = format!(
            "{} tokens have been minted to your address {} on {}.\n",
            record.amount, record.counterparty_address, record.chain
        );
        if let Some(expiry) = expiry {
            body.push_str(&format!("The tokens expire on {expiry}.\n"));
        }
        body.push_str(&format!("Transaction: {explorer_url}\n"));
        Self {
            to: contact.to_owned(),
            subject: format!("You've Received {} Tokens!", record.amount),
            body,
            explorer_url: explorer_url.to_owned(),
            tx_hash: record.tx_hash.clone(),
        }
    }
}

#[derive(Clone)]
enum Delivery {
    Disabled,
    Webhook { url: String, client: reqwest::Client },
    Capture(Arc<Mutex<Vec<MintNotification>>>),
}

/// Sends mint notifications to a webhook relay, or captures them in memory.
#[derive(Clone)]
pub struct NotifierAdapter {
    delivery: Delivery,
    fail: Arc<AtomicBool>,
}

impl NotifierAdapter {
    pub fn disabled() -> Self {
        Self {
            delivery: Delivery::Disabled,
            fail: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn capture() -> Self {
        Self {
            delivery: Delivery::Capture(Arc::new(Mutex::new(Vec::new()))),
            fail: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn webhook(url: impl Into<String>, timeout: Duration) -> Result<Self, PortError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PortError::Transport(format!("notifier client: {e}")))?;
        Ok(Self {
            delivery: Delivery::Webhook {
                url: url.into(),
                client,
            },
            fail: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_config(config: &AdapterConfig) -> Result<Self, PortError> {
        match &config.notifier_webhook_url {
            Some(url) => Self::webhook(url.clone(), Duration::from_millis(config.notifier_timeout_ms)),
            None => Ok(Self::disabled()),
        }
    }

    /// Notifications delivered so far in capture mode.
    pub fn captured(&self) -> Vec<MintNotification> {
        match &self.delivery {
            Delivery::Capture(sent) => sent.lock().unwrap_or_else(PoisonError::into_inner).clone(),
            _ => Vec::new(),
        }
    }

    pub fn debug_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotifierPort for NotifierAdapter {
    fn is_configured(&self) -> bool {
        !matches!(self.delivery, Delivery::Disabled)
    }

    async fn notify_mint(
        &self,
        record: &TransactionRecord,
        contact: &str,
        explorer_url: &str,
    ) -> Result<(), PortError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PortError::Transport("notification relay refused the message".to_owned()));
        }
        let message = MintNotification::build(record, contact, explorer_url);
        match &self.delivery {
            Delivery::Disabled => Err(PortError::NotImplemented("notifier is not configured")),
            Delivery::Capture(sent) => {
                sent.lock()
                    .map_err(|e| PortError::Transport(format!("notifier lock poisoned: {e}")))?
                    .push(message);
                Ok(())
            }
            Delivery::Webhook { url, client } => {
                let response = client
                    .post(url)
                    .json(&message)
                    .send()
                    .await
                    .map_err(|e| PortError::Transport(format!("notification request failed: {e}")))?;
                let status = response.status();
                if !status.is_success() {
                    return Err(PortError::Transport(format!(
                        "notification relay returned {status}"
                    )));
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dualmint_core::{ChainKind, TimestampMs};

    fn mint() -> TransactionRecord {
        TransactionRecord {
            tx_hash: "0xabc".to_owned(),
            chain: ChainKind::EvmChain,
            counterparty_address: "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".to_owned(),
            amount: 100.0,
            initiator_identity: "ops".to_owned(),
            timestamp: TimestampMs(0),
            details: RecordDetails::Mint {
                expiry_date: TimestampMs(1_735_689_600_000),
                notification_sent: false,
                contact: Some("holder@example.com".to_owned()),
            },
        }
    }

    #[test]
    fn message_carries_amount_and_expiry() {
        let msg = MintNotification::build(&mint(), "holder@example.com", "https://scan/tx/0xabc");
        assert_eq!(msg.subject, "You've Received 100 Tokens!");
        assert!(msg.body.contains("2025-01-01"));
        assert!(msg.body.contains("https://scan/tx/0xabc"));
    }

    #[tokio::test]
    async fn capture_mode_keeps_messages() {
        let notifier = NotifierAdapter::capture();
        assert!(notifier.is_configured());
        notifier
            .notify_mint(&mint(), "holder@example.com", "https://scan/tx/0xabc")
            .await
            .expect("captured");
        assert_eq!(notifier.captured().len(), 1);
    }

    #[tokio::test]
    async fn disabled_notifier_reports_unconfigured() {
        let notifier = NotifierAdapter::disabled();
        assert!(!notifier.is_configured());
        assert!(notifier.notify_mint(&mint(), "a@b.co", "u").await.is_err());
    }
}
