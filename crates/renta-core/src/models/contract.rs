//! Rental contract model
//!
//! Groups one or more asset rentals under a single client account and owns
//! the status state machine: active ⇄ suspended, active → completed (guarded
//! by open rentals), active|suspended → cancelled. Completed and cancelled
//! are terminal.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Contract status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContractStatus {
    #[default]
    Active,
    Suspended,
    Completed,
    Cancelled,
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractStatus::Active => write!(f, "active"),
            ContractStatus::Suspended => write!(f, "suspended"),
            ContractStatus::Completed => write!(f, "completed"),
            ContractStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl ContractStatus {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(ContractStatus::Active),
            "suspended" => Some(ContractStatus::Suspended),
            "completed" => Some(ContractStatus::Completed),
            "cancelled" => Some(ContractStatus::Cancelled),
            _ => None,
        }
    }

    /// Whether this status admits no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, ContractStatus::Completed | ContractStatus::Cancelled)
    }

    /// State machine check; the completion guard on open rentals is
    /// enforced separately by the lifecycle service.
    pub fn can_transition_to(&self, target: ContractStatus) -> bool {
        use ContractStatus::*;
        matches!(
            (self, target),
            (Active, Suspended)
                | (Suspended, Active)
                | (Active, Completed)
                | (Active, Cancelled)
                | (Suspended, Cancelled)
        )
    }
}

/// Rental contract entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RentalContract {
    /// Unique identifier
    pub id: Uuid,

    /// Owning tenant
    pub tenant_id: Uuid,

    /// Owning business unit
    pub business_unit_id: Uuid,

    /// Ledger account charged for this contract
    pub account_id: Uuid,

    /// The client who signed the contract
    pub client_id: Uuid,

    /// Current lifecycle status
    pub status: ContractStatus,

    /// Estimated total value quoted at signature
    pub estimated_total: Decimal,

    /// Ledger charges attributed to this contract so far
    pub total_consumed: Decimal,

    /// Contract start
    pub start_date: DateTime<Utc>,

    /// Stamped when the contract is completed
    pub actual_end_date: Option<DateTime<Utc>>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl RentalContract {
    /// Create a new active contract
    pub fn new(
        tenant_id: Uuid,
        business_unit_id: Uuid,
        account_id: Uuid,
        client_id: Uuid,
        estimated_total: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            business_unit_id,
            account_id,
            client_id,
            status: ContractStatus::Active,
            estimated_total,
            total_consumed: Decimal::ZERO,
            start_date: now,
            actual_end_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether new withdrawals and charges are allowed
    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == ContractStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use ContractStatus::*;

        assert!(Active.can_transition_to(Suspended));
        assert!(Suspended.can_transition_to(Active));
        assert!(Active.can_transition_to(Completed));
        assert!(Active.can_transition_to(Cancelled));
        assert!(Suspended.can_transition_to(Cancelled));

        // Guarded/forbidden edges
        assert!(!Suspended.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Active));
        assert!(!Cancelled.can_transition_to(Active));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Active.can_transition_to(Active));
    }

    #[test]
    fn test_terminal_states() {
        assert!(ContractStatus::Completed.is_terminal());
        assert!(ContractStatus::Cancelled.is_terminal());
        assert!(!ContractStatus::Active.is_terminal());
        assert!(!ContractStatus::Suspended.is_terminal());
    }

    #[test]
    fn test_new_contract_is_active() {
        let contract = RentalContract::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Decimal::ZERO,
        );
        assert!(contract.is_active());
        assert!(contract.actual_end_date.is_none());
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            ContractStatus::Active,
            ContractStatus::Suspended,
            ContractStatus::Completed,
            ContractStatus::Cancelled,
        ] {
            assert_eq!(ContractStatus::from_str(&status.to_string()), Some(status));
        }
    }
}
