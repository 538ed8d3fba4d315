//! Client account model
//!
//! Represents the prepaid credit account of one client within one tenant.
//! The balance is mutated exclusively through the ledger movement routine;
//! everything else on this type is read-only bookkeeping.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::AppError;

/// Statement dispatch frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StatementFrequency {
    Weekly,
    Biweekly,
    #[default]
    Monthly,
    /// Statements are only produced on demand
    Manual,
}

impl fmt::Display for StatementFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementFrequency::Weekly => write!(f, "weekly"),
            StatementFrequency::Biweekly => write!(f, "biweekly"),
            StatementFrequency::Monthly => write!(f, "monthly"),
            StatementFrequency::Manual => write!(f, "manual"),
        }
    }
}

impl StatementFrequency {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "weekly" => Some(StatementFrequency::Weekly),
            "biweekly" => Some(StatementFrequency::Biweekly),
            "monthly" => Some(StatementFrequency::Monthly),
            "manual" => Some(StatementFrequency::Manual),
            _ => None,
        }
    }

    /// Days between scheduled statements; None for manual-only accounts
    pub fn interval_days(&self) -> Option<i64> {
        match self {
            StatementFrequency::Weekly => Some(7),
            StatementFrequency::Biweekly => Some(14),
            StatementFrequency::Monthly => Some(30),
            StatementFrequency::Manual => None,
        }
    }
}

/// Client account entity
///
/// One per client per tenant, created lazily the first time a contract is
/// opened for the client. Never deleted. Invariant: `balance >= 0` at all
/// times; `total_consumed` and `total_reloaded` only ever grow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientAccount {
    /// Unique identifier
    pub id: Uuid,

    /// Owning tenant
    pub tenant_id: Uuid,

    /// Owning business unit within the tenant
    pub business_unit_id: Uuid,

    /// The client this account belongs to
    pub client_id: Uuid,

    /// Current usable credit
    pub balance: Decimal,

    /// Lifetime charges, audit-only
    pub total_consumed: Decimal,

    /// Lifetime reloads, audit-only
    pub total_reloaded: Decimal,

    /// Low-balance alert threshold; zero disables alerts
    pub alert_amount: Decimal,

    /// Whether the low-balance alert is currently raised
    pub alert_triggered: bool,

    /// Last time a low-balance alert was recorded
    pub last_alert_sent: Option<DateTime<Utc>>,

    /// How often statements are dispatched
    pub statement_frequency: StatementFrequency,

    /// Last statement dispatch time
    pub last_statement_sent: Option<DateTime<Utc>>,

    /// When the next scheduled statement is due
    pub next_statement_due: Option<DateTime<Utc>>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ClientAccount {
    /// Create a fresh zero-balance account for a client
    pub fn open(tenant_id: Uuid, business_unit_id: Uuid, client_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            business_unit_id,
            client_id,
            balance: Decimal::ZERO,
            total_consumed: Decimal::ZERO,
            total_reloaded: Decimal::ZERO,
            alert_amount: Decimal::ZERO,
            alert_triggered: false,
            last_alert_sent: None,
            statement_frequency: StatementFrequency::Monthly,
            last_statement_sent: None,
            next_statement_due: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Compute the before/after balances for a prospective movement.
    ///
    /// Rejects any movement that would take the balance below zero. Pure:
    /// the account itself is untouched, so a rejection leaves no trace.
    pub fn preview_movement(&self, amount: Decimal) -> Result<(Decimal, Decimal), AppError> {
        let balance_after = self.balance + amount;

        if balance_after < Decimal::ZERO {
            return Err(AppError::InsufficientBalance {
                required: amount.abs(),
                available: self.balance,
            });
        }

        Ok((self.balance, balance_after))
    }

    /// Whether the balance is at or below the configured alert threshold
    pub fn is_below_alert_threshold(&self) -> bool {
        self.alert_amount > Decimal::ZERO && self.balance <= self.alert_amount
    }

    /// Whether the low-balance alert should be raised now
    pub fn needs_alert(&self) -> bool {
        self.is_below_alert_threshold() && !self.alert_triggered
    }

    /// Whether the account can cover a given charge amount
    pub fn can_cover(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }

    /// Whether a scheduled statement is due at `now`
    pub fn statement_due(&self, now: DateTime<Utc>) -> bool {
        self.statement_frequency.interval_days().is_some()
            && self.next_statement_due.is_some_and(|due| due <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn account_with_balance(balance: Decimal) -> ClientAccount {
        let mut account = ClientAccount::open(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        account.balance = balance;
        account
    }

    #[test]
    fn test_preview_movement_credit() {
        let account = account_with_balance(dec!(100000));
        let (before, after) = account.preview_movement(dec!(50000)).unwrap();
        assert_eq!(before, dec!(100000));
        assert_eq!(after, dec!(150000));
    }

    #[test]
    fn test_preview_movement_rejects_overdraft() {
        let account = account_with_balance(dec!(150000));
        let err = account.preview_movement(dec!(-200000)).unwrap_err();

        match err {
            AppError::InsufficientBalance {
                required,
                available,
            } => {
                assert_eq!(required, dec!(200000));
                assert_eq!(available, dec!(150000));
            }
            other => panic!("unexpected error: {other}"),
        }

        // Rejection leaves the account untouched
        assert_eq!(account.balance, dec!(150000));
    }

    #[test]
    fn test_preview_movement_allows_exact_drain() {
        let account = account_with_balance(dec!(5000));
        let (_, after) = account.preview_movement(dec!(-5000)).unwrap();
        assert_eq!(after, Decimal::ZERO);
    }

    #[test]
    fn test_alert_threshold() {
        let mut account = account_with_balance(dec!(20000));
        account.alert_amount = dec!(25000);
        assert!(account.needs_alert());

        account.alert_triggered = true;
        assert!(!account.needs_alert());

        account.alert_amount = Decimal::ZERO; // disabled
        account.alert_triggered = false;
        assert!(!account.needs_alert());
    }

    #[test]
    fn test_statement_frequency_intervals() {
        assert_eq!(StatementFrequency::Weekly.interval_days(), Some(7));
        assert_eq!(StatementFrequency::Biweekly.interval_days(), Some(14));
        assert_eq!(StatementFrequency::Monthly.interval_days(), Some(30));
        assert_eq!(StatementFrequency::Manual.interval_days(), None);
    }

    #[test]
    fn test_statement_due() {
        let now = Utc::now();
        let mut account = account_with_balance(Decimal::ZERO);

        account.next_statement_due = Some(now - chrono::Duration::hours(1));
        assert!(account.statement_due(now));

        account.statement_frequency = StatementFrequency::Manual;
        assert!(!account.statement_due(now));
    }
}
