//! Ledger persistence between restarts

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::error;

use crate::ledger::{Account, InMemoryLedger, QuotaLedger, Result as LedgerResult, Settlement};
use crate::model::UserId;

/// Ledger snapshot file inside the data directory
pub const LEDGER_SNAPSHOT: &str = "ledger.json";

/// Usage journal file inside the data directory
pub const USAGE_JOURNAL: &str = "usage.jsonl";

const SNAPSHOT_VERSION: u32 = 1;

#[derive(thiserror::Error, Debug)]
pub enum SnapshotError {
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),

    #[error("unsupported snapshot version {0}")]
    Version(u32),
}

#[derive(Debug, Serialize, Deserialize)]
struct LedgerSnapshot {
    version: u32,
    saved_at: DateTime<Utc>,
    accounts: Vec<Account>,
}

/// Get ledger snapshot file path
pub fn ledger_snapshot_path(data_dir: &Path) -> PathBuf {
    data_dir.join(LEDGER_SNAPSHOT)
}

/// Get usage journal file path
pub fn usage_journal_path(data_dir: &Path) -> PathBuf {
    data_dir.join(USAGE_JOURNAL)
}

/// Ensure data directory exists
pub fn ensure_data_dir(data_dir: &Path) -> std::io::Result<()> {
    if !data_dir.exists() {
        std::fs::create_dir_all(data_dir)?;
    }
    Ok(())
}

/// Write every account to the snapshot file.
///
/// The file is written next to its final location and renamed into place so
/// a crash mid-write leaves the previous snapshot intact.
pub fn save_ledger(ledger: &InMemoryLedger, data_dir: &Path) -> Result<(), SnapshotError> {
    ensure_data_dir(data_dir)?;
    let path = ledger_snapshot_path(data_dir);
    let (contents, accounts) = encode(ledger)?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, &path)?;

    tracing::debug!(path = %path.display(), accounts, "Ledger snapshot saved");
    Ok(())
}

fn encode(ledger: &InMemoryLedger) -> Result<(String, usize), SnapshotError> {
    let snapshot = LedgerSnapshot {
        version: SNAPSHOT_VERSION,
        saved_at: Utc::now(),
        accounts: ledger.snapshot(),
    };
    Ok((serde_json::to_string_pretty(&snapshot)?, snapshot.accounts.len()))
}

/// Load the ledger from its snapshot, or `None` when no snapshot exists yet.
pub fn load_ledger(data_dir: &Path) -> Result<Option<InMemoryLedger>, SnapshotError> {
    let path = ledger_snapshot_path(data_dir);
    if !path.exists() {
        return Ok(None);
    }

    let json_str = std::fs::read_to_string(&path)?;
    let snapshot: LedgerSnapshot = serde_json::from_str(&json_str)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(SnapshotError::Version(snapshot.version));
    }

    tracing::debug!(path = %path.display(), accounts = snapshot.accounts.len(), "Ledger snapshot loaded");
    Ok(Some(InMemoryLedger::from_accounts(snapshot.accounts)))
}

/// Ledger that rewrites its snapshot after every balance change.
///
/// The snapshot on disk always reflects every settled debit, so a process
/// that dies without a graceful shutdown cannot hand spent tokens back.
#[derive(Debug)]
pub struct DurableLedger {
    inner: InMemoryLedger,
    data_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl DurableLedger {
    /// Restore from `data_dir`, starting empty when no snapshot exists yet.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, SnapshotError> {
        let data_dir = data_dir.into();
        ensure_data_dir(&data_dir)?;
        let inner = load_ledger(&data_dir)?.unwrap_or_default();
        Ok(Self {
            inner,
            data_dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn ledger(&self) -> &InMemoryLedger {
        &self.inner
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Write the current state. Writers are serialized and each one encodes
    /// the ledger after taking the lock, so the last write is never stale.
    pub async fn persist(&self) -> Result<(), SnapshotError> {
        let _guard = self.write_lock.lock().await;
        let path = ledger_snapshot_path(&self.data_dir);
        let (contents, _) = encode(&self.inner)?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn persist_after(&self, user_id: UserId) {
        if let Err(e) = self.persist().await {
            error!(%user_id, path = %self.data_dir.display(), "Failed to persist ledger snapshot: {}", e);
        }
    }
}

#[async_trait::async_trait]
impl QuotaLedger for DurableLedger {
    async fn get_balance(&self, user_id: UserId) -> LedgerResult<u64> {
        self.inner.get_balance(user_id).await
    }

    async fn account(&self, user_id: UserId) -> LedgerResult<Account> {
        self.inner.account(user_id).await
    }

    async fn try_debit(&self, user_id: UserId, amount: u64) -> LedgerResult<u64> {
        let balance = self.inner.try_debit(user_id, amount).await?;
        if amount > 0 {
            self.persist_after(user_id).await;
        }
        Ok(balance)
    }

    async fn debit_up_to(&self, user_id: UserId, amount: u64) -> LedgerResult<Settlement> {
        let settlement = self.inner.debit_up_to(user_id, amount).await?;
        if settlement.charged > 0 {
            self.persist_after(user_id).await;
        }
        Ok(settlement)
    }

    async fn credit(&self, user_id: UserId, amount: u64) -> LedgerResult<u64> {
        let balance = self.inner.credit(user_id, amount).await?;
        if amount > 0 {
            self.persist_after(user_id).await;
        }
        Ok(balance)
    }

    async fn open_account(&self, user_id: UserId, plan: Option<String>, initial_tokens: u64) -> LedgerResult<Account> {
        let account = self.inner.open_account(user_id, plan, initial_tokens).await?;
        self.persist_after(user_id).await;
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::QuotaLedger;
    use crate::model::UserId;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_round_trip_preserves_balances() {
        let dir = TempDir::new().unwrap();
        let ledger = InMemoryLedger::new();
        ledger.open_account(UserId(1), Some("pro".into()), 1000).await.unwrap();
        ledger.open_account(UserId(2), None, 50).await.unwrap();
        ledger.try_debit(UserId(1), 400).await.unwrap();

        save_ledger(&ledger, dir.path()).unwrap();
        let restored = load_ledger(dir.path()).unwrap().expect("snapshot exists");

        assert_eq!(restored.len(), 2);
        let account = restored.account(UserId(1)).await.unwrap();
        assert_eq!(account.tokens_remaining, 600);
        assert_eq!(account.total_tokens_purchased, 1000);
        assert_eq!(account.plan.as_deref(), Some("pro"));
    }

    #[test]
    fn test_missing_snapshot() {
        let dir = TempDir::new().unwrap();
        assert!(load_ledger(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_rejects_unknown_version() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            ledger_snapshot_path(dir.path()),
            r#"{"version": 99, "saved_at": "2024-01-01T00:00:00Z", "accounts": []}"#,
        )
        .unwrap();
        assert!(matches!(load_ledger(dir.path()), Err(SnapshotError::Version(99))));
    }

    #[tokio::test]
    async fn test_durable_ledger_survives_without_shutdown_save() {
        let dir = TempDir::new().unwrap();
        {
            let ledger = DurableLedger::open(dir.path()).unwrap();
            ledger.open_account(UserId(1), None, 500).await.unwrap();
            ledger.try_debit(UserId(1), 120).await.unwrap();
            ledger.debit_up_to(UserId(1), 1000).await.unwrap();
            ledger.open_account(UserId(2), Some("pro".into()), 10).await.unwrap();
            ledger.credit(UserId(2), 40).await.unwrap();
            // Dropped without save_ledger, as after SIGKILL.
        }

        let reopened = DurableLedger::open(dir.path()).unwrap();
        assert_eq!(reopened.get_balance(UserId(1)).await.unwrap(), 0);
        assert_eq!(reopened.get_balance(UserId(2)).await.unwrap(), 50);
        assert_eq!(reopened.ledger().len(), 2);
    }

    #[tokio::test]
    async fn test_durable_ledger_failed_debit_leaves_snapshot_alone() {
        let dir = TempDir::new().unwrap();
        let ledger = DurableLedger::open(dir.path()).unwrap();
        ledger.open_account(UserId(1), None, 5).await.unwrap();
        assert!(ledger.try_debit(UserId(1), 6).await.is_err());

        let restored = load_ledger(dir.path()).unwrap().unwrap();
        assert_eq!(restored.get_balance(UserId(1)).await.unwrap(), 5);
    }

    #[test]
    fn test_creates_nested_data_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        save_ledger(&InMemoryLedger::new(), &nested).unwrap();
        assert!(ledger_snapshot_path(&nested).exists());
    }
}
