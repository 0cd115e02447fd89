//! Account usage reporting

use serde::Serialize;

use crate::ledger::Account;
use crate::model::UserId;

/// Read-only view of an account for the account page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountSummary {
    pub user_id: UserId,
    pub plan: Option<String>,
    pub tokens_remaining: u64,
    pub total_tokens_purchased: u64,
    /// Tokens consumed out of everything ever purchased
    pub tokens_used: u64,
    /// Share of purchased tokens already consumed (0.0 - 100.0)
    pub usage_percentage: f32,
    pub level: UsageLevel,
}

impl AccountSummary {
    pub fn is_exhausted(&self) -> bool {
        self.tokens_remaining == 0
    }
}

impl From<&Account> for AccountSummary {
    fn from(account: &Account) -> Self {
        let tokens_used = account.total_tokens_purchased.saturating_sub(account.tokens_remaining);
        let usage_percentage = usage_percentage(tokens_used, account.total_tokens_purchased);
        Self {
            user_id: account.user_id,
            plan: account.plan.clone(),
            tokens_remaining: account.tokens_remaining,
            total_tokens_purchased: account.total_tokens_purchased,
            tokens_used,
            usage_percentage,
            level: UsageLevel::from_percentage(usage_percentage, account.tokens_remaining),
        }
    }
}

fn usage_percentage(used: u64, total: u64) -> f32 {
    if total == 0 {
        return 0.0;
    }
    ((used as f64 / total as f64) * 100.0) as f32
}

/// Quota warning levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageLevel {
    /// Less than half consumed
    Healthy,
    /// 50-75% consumed
    Warning,
    /// 75-90% consumed, or more than 90% with tokens left
    Critical,
    /// No tokens left
    Exhausted,
}

impl UsageLevel {
    pub fn from_percentage(percentage: f32, tokens_remaining: u64) -> Self {
        if tokens_remaining == 0 {
            return UsageLevel::Exhausted;
        }
        match percentage {
            p if p < 50.0 => UsageLevel::Healthy,
            p if p < 75.0 => UsageLevel::Warning,
            _ => UsageLevel::Critical,
        }
    }
}

/// Estimate the token cost of a prompt.
/// Rough estimate: ~4 characters per token plus a fixed overhead.
pub fn estimate_tokens(prompt_chars: usize) -> u64 {
    ((prompt_chars / 4) as u64).saturating_add(500)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(remaining: u64, purchased: u64) -> Account {
        let mut account = Account::new(UserId(1), Some("starter".to_string()), purchased);
        account.tokens_remaining = remaining;
        account
    }

    #[test]
    fn test_summary_percentages() {
        let summary = AccountSummary::from(&account(750, 1000));
        assert_eq!(summary.tokens_used, 250);
        assert!((summary.usage_percentage - 25.0).abs() < f32::EPSILON);
        assert_eq!(summary.level, UsageLevel::Healthy);
        assert_eq!(summary.plan.as_deref(), Some("starter"));
    }

    #[test]
    fn test_levels() {
        assert_eq!(AccountSummary::from(&account(400, 1000)).level, UsageLevel::Warning);
        assert_eq!(AccountSummary::from(&account(200, 1000)).level, UsageLevel::Critical);
        assert_eq!(AccountSummary::from(&account(10, 1000)).level, UsageLevel::Critical);
        assert_eq!(AccountSummary::from(&account(0, 1000)).level, UsageLevel::Exhausted);
    }

    #[test]
    fn test_never_purchased() {
        let summary = AccountSummary::from(&account(0, 0));
        assert_eq!(summary.usage_percentage, 0.0);
        assert!(summary.is_exhausted());
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(0), 500);
        assert_eq!(estimate_tokens(4000), 1500);
    }
}
