//! Append-only log of token consumption.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::model::{ActionType, UserId};

/// One completed, billed provider call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: u64,
    pub user_id: UserId,
    pub tokens_used: u64,
    pub action: ActionType,
    pub timestamp: DateTime<Utc>,
    /// Reported tokens the ledger could not charge. Present only on discrepancy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncharged_tokens: Option<u64>,
}

/// A record before the log assigns its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUsageRecord {
    pub user_id: UserId,
    pub tokens_used: u64,
    pub action: ActionType,
    pub timestamp: DateTime<Utc>,
    pub uncharged_tokens: Option<u64>,
}

impl NewUsageRecord {
    pub fn now(user_id: UserId, tokens_used: u64, action: ActionType) -> Self {
        Self {
            user_id,
            tokens_used,
            action,
            timestamp: Utc::now(),
            uncharged_tokens: None,
        }
    }

    pub fn with_uncharged(mut self, uncharged: u64) -> Self {
        self.uncharged_tokens = (uncharged > 0).then_some(uncharged);
        self
    }
}

#[derive(thiserror::Error, Debug)]
pub enum UsageError {
    #[error("usage journal I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("usage record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Sink for usage records. Failures are reported, never retried here.
#[async_trait::async_trait]
pub trait UsageRecorder: Send + Sync {
    async fn record(&self, record: NewUsageRecord) -> Result<UsageRecord, UsageError>;

    /// Most recent records for one user, newest first.
    async fn list_for_user(&self, user_id: UserId, limit: usize) -> Vec<UsageRecord>;
}

/// In-memory usage log with an optional JSON-lines journal on disk.
#[derive(Debug)]
pub struct UsageLog {
    records: RwLock<Vec<UsageRecord>>,
    journal: Option<Mutex<tokio::fs::File>>,
    journal_path: Option<PathBuf>,
    next_id: AtomicU64,
}

impl Default for UsageLog {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl UsageLog {
    pub fn in_memory() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            journal: None,
            journal_path: None,
            next_id: AtomicU64::new(1),
        }
    }

    /// Open (or create) a journal, replaying any records already in it.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, UsageError> {
        let path = path.as_ref().to_path_buf();
        let records = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => replay(&contents, &path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        let next_id = records.iter().map(|r| r.id).max().unwrap_or(0) + 1;

        let file = tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await?;
        debug!(path = %path.display(), replayed = records.len(), "Opened usage journal");

        Ok(Self {
            records: RwLock::new(records),
            journal: Some(Mutex::new(file)),
            journal_path: Some(path),
            next_id: AtomicU64::new(next_id),
        })
    }

    pub fn journal_path(&self) -> Option<&Path> {
        self.journal_path.as_deref()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn all(&self) -> Vec<UsageRecord> {
        self.records.read().await.clone()
    }
}

fn replay(contents: &str, path: &Path) -> Vec<UsageRecord> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(index, line)| match serde_json::from_str(line) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = %path.display(), line = index + 1, "Skipping malformed usage record: {}", e);
                None
            }
        })
        .collect()
}

#[async_trait::async_trait]
impl UsageRecorder for UsageLog {
    /// The in-memory copy is kept even when the journal write fails.
    ///
    /// Ids are handed out while the journal is held, so journal lines and the
    /// in-memory log share one order.
    async fn record(&self, new: NewUsageRecord) -> Result<UsageRecord, UsageError> {
        let mut journal = match &self.journal {
            Some(journal) => Some(journal.lock().await),
            None => None,
        };

        let record = {
            let mut records = self.records.write().await;
            let record = UsageRecord {
                id: self.next_id.fetch_add(1, Ordering::Relaxed),
                user_id: new.user_id,
                tokens_used: new.tokens_used,
                action: new.action,
                timestamp: new.timestamp,
                uncharged_tokens: new.uncharged_tokens,
            };
            records.push(record.clone());
            record
        };

        if let Some(file) = journal.as_mut() {
            let mut line = serde_json::to_vec(&record)?;
            line.push(b'\n');
            file.write_all(&line).await?;
            file.flush().await?;
        }

        debug!(user_id = %record.user_id, tokens = record.tokens_used, action = %record.action, "Recorded usage");
        Ok(record)
    }

    async fn list_for_user(&self, user_id: UserId, limit: usize) -> Vec<UsageRecord> {
        self.records
            .read()
            .await
            .iter()
            .rev()
            .filter(|record| record.user_id == user_id)
            .take(limit)
            .cloned()
            .collect()
    }
}
