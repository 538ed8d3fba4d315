//! Account movement model
//!
//! Immutable ledger entries. Every balance change is captured as one signed
//! movement with its before/after balances and full audit context.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Movement type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    /// Opening credit when an account is funded at creation
    InitialCredit,
    /// Client tops up the prepaid balance
    CreditReload,
    /// Usage-based or daily-rate charge
    DailyCharge,
    /// Manual correction by back-office staff
    Adjustment,
    /// Zero-amount audit marker written when an asset is withdrawn
    WithdrawalStart,
    /// Zero-amount audit marker written when an asset is returned
    ReturnEnd,
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MovementType::InitialCredit => write!(f, "initial_credit"),
            MovementType::CreditReload => write!(f, "credit_reload"),
            MovementType::DailyCharge => write!(f, "daily_charge"),
            MovementType::Adjustment => write!(f, "adjustment"),
            MovementType::WithdrawalStart => write!(f, "withdrawal_start"),
            MovementType::ReturnEnd => write!(f, "return_end"),
        }
    }
}

impl MovementType {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "initial_credit" => Some(MovementType::InitialCredit),
            "credit_reload" => Some(MovementType::CreditReload),
            "daily_charge" => Some(MovementType::DailyCharge),
            "adjustment" => Some(MovementType::Adjustment),
            "withdrawal_start" => Some(MovementType::WithdrawalStart),
            "return_end" => Some(MovementType::ReturnEnd),
            _ => None,
        }
    }

    /// Whether this type credits the balance
    pub fn is_credit(&self) -> bool {
        matches!(
            self,
            MovementType::InitialCredit | MovementType::CreditReload
        )
    }
}

/// Structured cost breakdown attached to charge movements
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub machinery_cost: Option<Decimal>,
    pub operator_cost: Option<Decimal>,
    pub tool_cost: Option<Decimal>,
}

impl CostBreakdown {
    pub fn machinery(machinery_cost: Decimal, operator_cost: Decimal) -> Self {
        Self {
            machinery_cost: Some(machinery_cost),
            operator_cost: Some(operator_cost),
            tool_cost: None,
        }
    }

    pub fn tool(tool_cost: Decimal) -> Self {
        Self {
            machinery_cost: None,
            operator_cost: None,
            tool_cost: Some(tool_cost),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.machinery_cost.is_none() && self.operator_cost.is_none() && self.tool_cost.is_none()
    }
}

/// Account movement entity
///
/// Append-only, immutable once written. Negative `amount` is a charge,
/// positive is a credit. `balance_after == balance_before + amount` always.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountMovement {
    /// Unique identifier
    pub id: Uuid,

    /// Account this movement belongs to
    pub account_id: Uuid,

    /// Contract attribution, if any
    pub contract_id: Option<Uuid>,

    /// Asset rental attribution, if any
    pub asset_rental_id: Option<Uuid>,

    /// Usage report that produced this movement, if any
    pub usage_report_id: Option<Uuid>,

    /// Type of movement
    pub movement_type: MovementType,

    /// Signed amount: negative = charge, positive = credit
    pub amount: Decimal,

    /// Balance before the movement was applied
    pub balance_before: Decimal,

    /// Balance after the movement was applied
    pub balance_after: Decimal,

    /// Structured cost breakdown for charges
    pub cost_breakdown: CostBreakdown,

    /// Human-readable explanation
    pub description: String,

    /// Evidence URIs (photos, signed tickets)
    pub evidence_urls: Vec<String>,

    /// Free-form audit notes; never interpreted by the engine
    pub metadata: serde_json::Value,

    /// Actor (user id) who caused this movement
    pub created_by: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl AccountMovement {
    /// Verify the arithmetic invariant of an applied movement
    pub fn is_consistent(&self) -> bool {
        self.balance_after == self.balance_before + self.amount
            && self.balance_after >= Decimal::ZERO
    }
}

/// Input for creating a movement through the ledger service
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub account_id: Uuid,
    pub contract_id: Option<Uuid>,
    pub asset_rental_id: Option<Uuid>,
    pub usage_report_id: Option<Uuid>,
    pub movement_type: MovementType,
    pub amount: Decimal,
    pub cost_breakdown: CostBreakdown,
    pub description: String,
    pub evidence_urls: Vec<String>,
    pub metadata: serde_json::Value,
    pub created_by: String,
}

impl NewMovement {
    /// Minimal movement with just the required fields
    pub fn new(
        account_id: Uuid,
        movement_type: MovementType,
        amount: Decimal,
        description: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            account_id,
            contract_id: None,
            asset_rental_id: None,
            usage_report_id: None,
            movement_type,
            amount,
            cost_breakdown: CostBreakdown::default(),
            description: description.into(),
            evidence_urls: Vec::new(),
            metadata: serde_json::Value::Null,
            created_by: created_by.into(),
        }
    }

    pub fn with_contract(mut self, contract_id: Uuid) -> Self {
        self.contract_id = Some(contract_id);
        self
    }

    pub fn with_rental(mut self, rental_id: Uuid) -> Self {
        self.asset_rental_id = Some(rental_id);
        self
    }

    pub fn with_usage_report(mut self, usage_id: Uuid) -> Self {
        self.usage_report_id = Some(usage_id);
        self
    }

    pub fn with_cost_breakdown(mut self, breakdown: CostBreakdown) -> Self {
        self.cost_breakdown = breakdown;
        self
    }

    pub fn with_evidence(mut self, urls: Vec<String>) -> Self {
        self.evidence_urls = urls;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Materialize the movement against known before/after balances
    pub fn into_movement(self, balance_before: Decimal, balance_after: Decimal) -> AccountMovement {
        AccountMovement {
            id: Uuid::new_v4(),
            account_id: self.account_id,
            contract_id: self.contract_id,
            asset_rental_id: self.asset_rental_id,
            usage_report_id: self.usage_report_id,
            movement_type: self.movement_type,
            amount: self.amount,
            balance_before,
            balance_after,
            cost_breakdown: self.cost_breakdown,
            description: self.description,
            evidence_urls: self.evidence_urls,
            metadata: self.metadata,
            created_by: self.created_by,
            created_at: Utc::now(),
        }
    }
}
