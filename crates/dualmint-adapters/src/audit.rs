use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use dualmint_core::{AuditEntry, AuditPort, PortError};

/// Audit trail kept in memory and mirrored to the tracing log.
#[derive(Clone, Default)]
pub struct AuditLogAdapter {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
    fail: Arc<AtomicBool>,
}

impl AuditLogAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn debug_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuditPort for AuditLogAdapter {
    async fn append(&self, entry: AuditEntry) -> Result<(), PortError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PortError::Persistence("audit log unavailable".to_owned()));
        }
        tracing::info!(
            target: "audit",
            action = %entry.action,
            initiator = %entry.initiator,
            target_address = entry.target.as_deref().unwrap_or("-"),
            client_ip = entry.origin.client_ip.as_deref().unwrap_or("-"),
            metadata = %entry.metadata,
            "audit"
        );
        self.entries
            .lock()
            .map_err(|e| PortError::Transport(format!("audit lock poisoned: {e}")))?
            .push(entry);
        Ok(())
    }
}
