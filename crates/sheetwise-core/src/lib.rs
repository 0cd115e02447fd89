//! Sheetwise Core: accounts, the token ledger and the usage log

pub mod account;
pub mod config;
pub mod ledger;
pub mod model;
pub mod snapshot;
pub mod usage;

#[cfg(test)]
pub mod tests;

#[cfg(test)]
pub mod test_utils;

pub use account::{AccountSummary, UsageLevel, estimate_tokens};
pub use ledger::{Account, InMemoryLedger, LedgerError, QuotaLedger, Settlement};
pub use model::{ActionType, AnalysisRequest, ChatRole, ChatTurn, Dataset, Record, UserId};
pub use snapshot::{
    DurableLedger, LEDGER_SNAPSHOT, SnapshotError, USAGE_JOURNAL, ensure_data_dir, ledger_snapshot_path,
    load_ledger, save_ledger, usage_journal_path,
};
pub use usage::{NewUsageRecord, UsageError, UsageLog, UsageRecord, UsageRecorder};
