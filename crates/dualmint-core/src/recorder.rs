//! Idempotent recording of on-chain mint/burn transactions.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;

use crate::domain::{
    AuditEntry, BurnReason, NotificationStatus, RecordDetails, RecordKey, RecordSubmission,
    RecordingReceipt, RequestOrigin, TimestampMs, TokenAction, TransactionRecord,
};
use crate::ports::{AuditPort, ClockPort, NotifierPort, PortError, RecordStorePort};
use crate::profile::ExplorerUrls;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderSettings {
    pub token_lifespan_days: u64,
    pub explorer: ExplorerUrls,
    /// Ceiling for each best-effort side effect (notification, audit append).
    pub side_effect_timeout: Duration,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            token_lifespan_days: 180,
            explorer: ExplorerUrls::default(),
            side_effect_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordOutcome {
    pub record: TransactionRecord,
    pub already_existed: bool,
    pub explorer_url: String,
    pub notification: NotificationStatus,
}

impl RecordOutcome {
    pub fn message(&self) -> String {
        if self.already_existed {
            "Transaction already recorded".to_owned()
        } else {
            match self.record.action() {
                TokenAction::Mint => "Mint recorded successfully".to_owned(),
                TokenAction::Burn => "Burn recorded successfully".to_owned(),
            }
        }
    }

    pub fn into_receipt(self) -> RecordingReceipt {
        RecordingReceipt {
            message: self.message(),
            record: self.record,
            already_existed: self.already_existed,
            explorer_url: self.explorer_url,
            notification_status: self.notification,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderHealth {
    pub store_ok: bool,
    pub store_error: Option<String>,
    pub notifier_configured: bool,
}

impl RecorderHealth {
    pub fn is_healthy(&self) -> bool {
        self.store_ok && self.notifier_configured
    }
}

fn is_plausible_email(contact: &str) -> bool {
    match contact.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !contact.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

/// Checks a submission and returns its normalized form.
pub fn validate_submission(submission: &RecordSubmission) -> Result<RecordSubmission, PortError> {
    let mut problems = Vec::new();
    let tx_hash = submission.tx_hash.trim();
    if tx_hash.is_empty() {
        problems.push("Transaction hash is required".to_owned());
    }
    let counterparty = submission.counterparty_address.trim();
    if counterparty.is_empty() {
        problems.push(match submission.action {
            TokenAction::Mint => "Recipient address is required".to_owned(),
            TokenAction::Burn => "Target address is required".to_owned(),
        });
    }
    if !submission.amount.is_finite() || submission.amount <= 0.0 {
        problems.push("Amount must be positive".to_owned());
    }
    let contact = match submission.action {
        TokenAction::Mint => submission
            .contact
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_owned),
        TokenAction::Burn => None,
    };
    if let Some(contact) = &contact {
        if !is_plausible_email(contact) {
            problems.push("Invalid email format".to_owned());
        }
    }
    if !problems.is_empty() {
        return Err(PortError::Validation(problems.join("; ")));
    }
    Ok(RecordSubmission {
        chain: submission.chain,
        action: submission.action,
        tx_hash: RecordKey::new(submission.chain, tx_hash).tx_hash,
        counterparty_address: counterparty.to_owned(),
        amount: submission.amount,
        contact,
    })
}

/// Server half of the recording contract, keyed by `(chain, tx_hash)`.
pub struct TransactionRecorder<S, N, A, C> {
    store: S,
    notifier: N,
    audit: A,
    clock: C,
    settings: RecorderSettings,
}

impl<S, N, A, C> TransactionRecorder<S, N, A, C>
where
    S: RecordStorePort,
    N: NotifierPort,
    A: AuditPort,
    C: ClockPort,
{
    pub fn new(store: S, notifier: N, audit: A, clock: C, settings: RecorderSettings) -> Self {
        Self {
            store,
            notifier,
            audit,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &RecorderSettings {
        &self.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn now(&self) -> Result<TimestampMs, PortError> {
        self.clock.now_ms().map(TimestampMs)
    }

    /// Stores the transaction once. Repeated calls with the same key return
    /// the stored record with `already_existed` and cause no side effects.
    pub async fn record(
        &self,
        submission: &RecordSubmission,
        initiator: &str,
        origin: &RequestOrigin,
    ) -> Result<RecordOutcome, PortError> {
        let submission = validate_submission(submission)?;
        let key = RecordKey::new(submission.chain, &submission.tx_hash);

        if let Some(existing) = self.store.find(&key).await? {
            tracing::warn!(%key, "duplicate transaction submission");
            return Ok(self.existing(existing));
        }

        let timestamp = self.now()?;
        let details = match submission.action {
            TokenAction::Mint => RecordDetails::Mint {
                expiry_date: timestamp.plus_days(self.settings.token_lifespan_days),
                notification_sent: false,
                contact: submission.contact.clone(),
            },
            TokenAction::Burn => RecordDetails::Burn {
                reason: BurnReason::Manual,
            },
        };
        let mut record = TransactionRecord {
            tx_hash: key.tx_hash.clone(),
            chain: key.chain,
            counterparty_address: submission.counterparty_address.clone(),
            amount: submission.amount,
            initiator_identity: initiator.to_owned(),
            timestamp,
            details,
        };

        match self.store.insert(&record).await {
            Ok(()) => {}
            Err(PortError::Conflict(_)) => {
                // A concurrent submission of the same key won the insert.
                tracing::warn!(%key, "insert lost to concurrent duplicate");
                return match self.store.find(&key).await? {
                    Some(existing) => Ok(self.existing(existing)),
                    None => Err(PortError::Persistence(format!(
                        "record {key} conflicted but cannot be read back"
                    ))),
                };
            }
            Err(err) => return Err(err),
        }
        tracing::info!(%key, action = %submission.action, amount = submission.amount, "transaction recorded");

        let explorer_url = self.settings.explorer.tx_url(key.chain, &key.tx_hash);
        if let Some(contact) = submission.contact.as_deref() {
            let sent = self.notify(&record, contact, &explorer_url).await;
            if let RecordDetails::Mint {
                notification_sent, ..
            } = &mut record.details
            {
                *notification_sent = sent;
            }
            if let Err(err) = self.store.set_notification_sent(&key, sent).await {
                tracing::warn!(%key, error = %err, "could not store notification outcome");
            }
        }

        let metadata = json!({
            "amount": record.amount,
            "chain": record.chain,
            "txHash": record.tx_hash,
            "notificationSent": matches!(record.notification_status(), NotificationStatus::Sent),
            "contact": submission.contact.as_deref().unwrap_or("N/A"),
        });
        self.append_audit(AuditEntry {
            action: submission.action.as_str().to_owned(),
            initiator: initiator.to_owned(),
            target: Some(record.counterparty_address.clone()),
            metadata,
            origin: origin.clone(),
            timestamp,
        })
        .await;

        Ok(RecordOutcome {
            notification: record.notification_status(),
            record,
            already_existed: false,
            explorer_url,
        })
    }

    fn existing(&self, record: TransactionRecord) -> RecordOutcome {
        RecordOutcome {
            explorer_url: self.settings.explorer.tx_url(record.chain, &record.tx_hash),
            notification: record.notification_status(),
            record,
            already_existed: true,
        }
    }

    async fn notify(&self, record: &TransactionRecord, contact: &str, explorer_url: &str) -> bool {
        if !self.notifier.is_configured() {
            tracing::warn!(tx_hash = %record.tx_hash, "notifier not configured, skipping notification");
            return false;
        }
        let sent = self
            .bounded("notification", self.notifier.notify_mint(record, contact, explorer_url))
            .await;
        if sent {
            tracing::info!(tx_hash = %record.tx_hash, "mint notification sent");
        }
        sent
    }

    async fn append_audit(&self, entry: AuditEntry) {
        let action = entry.action.clone();
        if !self.bounded("audit", self.audit.append(entry)).await {
            tracing::warn!(%action, "audit entry dropped");
        }
    }

    /// Runs a best-effort side effect under the configured timeout.
    async fn bounded<F>(&self, what: &'static str, effect: F) -> bool
    where
        F: Future<Output = Result<(), PortError>>,
    {
        match tokio::time::timeout(self.settings.side_effect_timeout, effect).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                tracing::error!(side_effect = what, error = %err, "side effect failed");
                false
            }
            Err(_) => {
                tracing::error!(side_effect = what, "side effect timed out");
                false
            }
        }
    }

    /// Best-effort `<action>_error` audit entry for a failed recording.
    pub async fn record_failure(
        &self,
        action: TokenAction,
        initiator: &str,
        origin: &RequestOrigin,
        error: &PortError,
    ) {
        let timestamp = match self.now() {
            Ok(ts) => ts,
            Err(err) => {
                tracing::warn!(error = %err, "clock unavailable for failure audit");
                TimestampMs(0)
            }
        };
        self.append_audit(AuditEntry {
            action: format!("{}_error", action.as_str()),
            initiator: initiator.to_owned(),
            target: None,
            metadata: json!({ "error": error.to_string(), "kind": error.kind() }),
            origin: origin.clone(),
            timestamp,
        })
        .await;
    }

    pub async fn health(&self) -> RecorderHealth {
        let store = self.store.ping().await;
        RecorderHealth {
            store_ok: store.is_ok(),
            store_error: store.err().map(|e| e.to_string()),
            notifier_configured: self.notifier.is_configured(),
        }
    }
}
