use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use dualmint_core::{PortError, RecordDetails, RecordKey, RecordStorePort, TransactionRecord};

/// Transaction records keyed by `(chain, tx_hash)`, optionally mirrored to a
/// JSON snapshot file after every write.
#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    records: Arc<Mutex<BTreeMap<RecordKey, TransactionRecord>>>,
    snapshot: Option<PathBuf>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the snapshot at `path` if it exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PortError> {
        let path = path.as_ref().to_path_buf();
        let mut records = BTreeMap::new();
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let stored: Vec<TransactionRecord> = serde_json::from_slice(&bytes).map_err(|e| {
                    PortError::Persistence(format!("corrupt record snapshot {}: {e}", path.display()))
                })?;
                for record in stored {
                    records.insert(record.key(), record);
                }
                tracing::info!(path = %path.display(), count = records.len(), "record snapshot loaded");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(PortError::Persistence(format!(
                    "read {}: {e}",
                    path.display()
                )))
            }
        }
        Ok(Self {
            records: Arc::new(Mutex::new(records)),
            snapshot: Some(path),
            unavailable: Arc::new(AtomicBool::new(false)),
        })
    }

    pub async fn list(&self) -> Vec<TransactionRecord> {
        self.records.lock().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    /// Makes every operation fail as if the backing database were down.
    pub fn debug_set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), PortError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PortError::Persistence("record store unavailable".to_owned()));
        }
        Ok(())
    }

    async fn persist(&self, records: &BTreeMap<RecordKey, TransactionRecord>) -> Result<(), PortError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let all: Vec<&TransactionRecord> = records.values().collect();
        let bytes = serde_json::to_vec_pretty(&all)
            .map_err(|e| PortError::Persistence(format!("encode snapshot: {e}")))?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| PortError::Persistence(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| PortError::Persistence(format!("rename {}: {e}", path.display())))
    }
}

#[async_trait]
impl RecordStorePort for MemoryRecordStore {
    async fn find(&self, key: &RecordKey) -> Result<Option<TransactionRecord>, PortError> {
        self.check_available()?;
        Ok(self.records.lock().await.get(key).cloned())
    }

    async fn insert(&self, record: &TransactionRecord) -> Result<(), PortError> {
        self.check_available()?;
        let key = record.key();
        let mut records = self.records.lock().await;
        if records.contains_key(&key) {
            return Err(PortError::Conflict(format!("record {key} already exists")));
        }
        records.insert(key.clone(), record.clone());
        if let Err(err) = self.persist(&records).await {
            records.remove(&key);
            return Err(err);
        }
        Ok(())
    }

    async fn set_notification_sent(&self, key: &RecordKey, sent: bool) -> Result<(), PortError> {
        self.check_available()?;
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(key)
            .ok_or_else(|| PortError::NotFound(format!("record {key}")))?;
        match &mut record.details {
            RecordDetails::Mint {
                notification_sent, ..
            } => *notification_sent = sent,
            RecordDetails::Burn { .. } => {
                return Err(PortError::Validation(format!(
                    "record {key} is a burn and carries no notification"
                )))
            }
        }
        self.persist(&records).await
    }

    async fn ping(&self) -> Result<(), PortError> {
        self.check_available()
    }
}
