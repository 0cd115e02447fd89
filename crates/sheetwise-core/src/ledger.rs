//! Token ledger: the single owner of every account's remaining balance.
//!
//! All balance mutations go through [`QuotaLedger`]. The in-memory
//! implementation keeps one entry per user in a [`DashMap`]; every mutating
//! operation runs under that entry's write guard, so concurrent debits for the
//! same user are serialized and a balance can never be observed mid-update.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::UserId;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("account {0} not found")]
    NotFound(UserId),

    #[error("insufficient quota: requested {requested} tokens, {available} available")]
    InsufficientQuota { requested: u64, available: u64 },

    #[error("account {0} already exists")]
    AlreadyExists(UserId),

    #[error("crediting {amount} tokens would overflow account {user_id}")]
    Overflow { user_id: UserId, amount: u64 },
}

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;

/// A user's token account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: UserId,
    #[serde(default)]
    pub plan: Option<String>,
    pub tokens_remaining: u64,
    /// Cumulative tokens ever credited, used for usage-percentage reporting.
    pub total_tokens_purchased: u64,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(user_id: UserId, plan: Option<String>, initial_tokens: u64) -> Self {
        Self {
            user_id,
            plan,
            tokens_remaining: initial_tokens,
            total_tokens_purchased: initial_tokens,
            updated_at: Utc::now(),
        }
    }
}

/// Result of a saturating debit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Settlement {
    /// Tokens actually removed from the balance.
    pub charged: u64,
    /// Reported usage that could not be charged because the balance ran out.
    pub uncharged: u64,
    /// Balance after the debit.
    pub balance: u64,
}

/// Balance store with atomic, never-negative debits.
#[async_trait::async_trait]
pub trait QuotaLedger: Send + Sync {
    /// Current remaining tokens.
    async fn get_balance(&self, user_id: UserId) -> Result<u64>;

    /// Full account view.
    async fn account(&self, user_id: UserId) -> Result<Account>;

    /// Subtract `amount` if the balance covers it, returning the new balance.
    ///
    /// Fails with [`LedgerError::InsufficientQuota`] without touching state
    /// otherwise. `amount == 0` succeeds without mutation.
    async fn try_debit(&self, user_id: UserId, amount: u64) -> Result<u64>;

    /// Subtract as much of `amount` as the balance allows, flooring at zero.
    async fn debit_up_to(&self, user_id: UserId, amount: u64) -> Result<Settlement>;

    /// Administrative top-up. Also grows `total_tokens_purchased`.
    async fn credit(&self, user_id: UserId, amount: u64) -> Result<u64>;

    /// Provision a new account.
    async fn open_account(&self, user_id: UserId, plan: Option<String>, initial_tokens: u64) -> Result<Account>;
}

/// Process-local ledger backed by a concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    accounts: DashMap<UserId, Account>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from previously saved accounts.
    pub fn from_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let ledger = Self::new();
        for account in accounts {
            ledger.accounts.insert(account.user_id, account);
        }
        ledger
    }

    /// Point-in-time copy of every account, ordered by user id.
    pub fn snapshot(&self) -> Vec<Account> {
        let mut accounts: Vec<Account> = self.accounts.iter().map(|entry| entry.value().clone()).collect();
        accounts.sort_by_key(|account| account.user_id);
        accounts
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    fn debit_locked(&self, user_id: UserId, amount: u64) -> Result<u64> {
        let mut account = self.accounts.get_mut(&user_id).ok_or(LedgerError::NotFound(user_id))?;
        if amount == 0 {
            return Ok(account.tokens_remaining);
        }
        if account.tokens_remaining < amount {
            return Err(LedgerError::InsufficientQuota {
                requested: amount,
                available: account.tokens_remaining,
            });
        }
        account.tokens_remaining -= amount;
        account.updated_at = Utc::now();
        debug!(%user_id, amount, balance = account.tokens_remaining, "Debited tokens");
        Ok(account.tokens_remaining)
    }

    fn debit_up_to_locked(&self, user_id: UserId, amount: u64) -> Result<Settlement> {
        let mut account = self.accounts.get_mut(&user_id).ok_or(LedgerError::NotFound(user_id))?;
        let charged = amount.min(account.tokens_remaining);
        if charged > 0 {
            account.tokens_remaining -= charged;
            account.updated_at = Utc::now();
        }
        debug!(%user_id, charged, uncharged = amount - charged, "Saturating debit");
        Ok(Settlement {
            charged,
            uncharged: amount - charged,
            balance: account.tokens_remaining,
        })
    }

    fn credit_locked(&self, user_id: UserId, amount: u64) -> Result<u64> {
        let mut account = self.accounts.get_mut(&user_id).ok_or(LedgerError::NotFound(user_id))?;
        if amount == 0 {
            return Ok(account.tokens_remaining);
        }
        let overflow = || LedgerError::Overflow { user_id, amount };
        let remaining = account.tokens_remaining.checked_add(amount).ok_or_else(overflow)?;
        let purchased = account.total_tokens_purchased.checked_add(amount).ok_or_else(overflow)?;
        account.tokens_remaining = remaining;
        account.total_tokens_purchased = purchased;
        account.updated_at = Utc::now();
        info!(%user_id, amount, balance = remaining, "Credited tokens");
        Ok(remaining)
    }
}

#[async_trait::async_trait]
impl QuotaLedger for InMemoryLedger {
    async fn get_balance(&self, user_id: UserId) -> Result<u64> {
        self.accounts
            .get(&user_id)
            .map(|account| account.tokens_remaining)
            .ok_or(LedgerError::NotFound(user_id))
    }

    async fn account(&self, user_id: UserId) -> Result<Account> {
        self.accounts
            .get(&user_id)
            .map(|account| account.value().clone())
            .ok_or(LedgerError::NotFound(user_id))
    }

    async fn try_debit(&self, user_id: UserId, amount: u64) -> Result<u64> {
        self.debit_locked(user_id, amount)
    }

    async fn debit_up_to(&self, user_id: UserId, amount: u64) -> Result<Settlement> {
        self.debit_up_to_locked(user_id, amount)
    }

    async fn credit(&self, user_id: UserId, amount: u64) -> Result<u64> {
        self.credit_locked(user_id, amount)
    }

    async fn open_account(&self, user_id: UserId, plan: Option<String>, initial_tokens: u64) -> Result<Account> {
        match self.accounts.entry(user_id) {
            Entry::Occupied(_) => Err(LedgerError::AlreadyExists(user_id)),
            Entry::Vacant(slot) => {
                let account = Account::new(user_id, plan, initial_tokens);
                slot.insert(account.clone());
                info!(%user_id, initial_tokens, "Opened token account");
                Ok(account)
            }
        }
    }
}
