//! Asset rental model
//!
//! One physical withdrawal-to-return span for one asset under one contract.
//! The rate configuration is copied from the asset catalog at withdrawal
//! time and frozen: later catalog changes never affect open rentals.
//!
//! The billing math lives here as pure functions so the usage engine and the
//! projection service share one implementation of the standby floor and the
//! two operator-cost models.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::asset::AssetBillingProfile;

/// Asset billing model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingType {
    /// Metered hourly rate with a guaranteed daily minimum (standby floor)
    Machinery,
    /// Fixed daily rate, charged by the auto-charge batch job
    Tool,
}

impl fmt::Display for TrackingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackingType::Machinery => write!(f, "machinery"),
            TrackingType::Tool => write!(f, "tool"),
        }
    }
}

impl TrackingType {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "machinery" => Some(TrackingType::Machinery),
            "tool" => Some(TrackingType::Tool),
            _ => None,
        }
    }
}

/// Operator cost model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OperatorCostType {
    /// Flat daily charge regardless of hours (travel/lodging, far job site)
    PerDay,
    /// Charged per billed hour, standby floor included (near job site)
    #[default]
    PerHour,
}

impl fmt::Display for OperatorCostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatorCostType::PerDay => write!(f, "per_day"),
            OperatorCostType::PerHour => write!(f, "per_hour"),
        }
    }
}

impl OperatorCostType {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "per_day" => Some(OperatorCostType::PerDay),
            "per_hour" => Some(OperatorCostType::PerHour),
            _ => None,
        }
    }
}

/// Computed charges for one day of machinery usage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageCharges {
    /// Actual hours worked per the hourometer
    pub hours_worked: Decimal,
    /// Hours billed after applying the standby floor
    pub hours_billed: Decimal,
    /// `hours_billed * hourly_rate`
    pub machinery_cost: Decimal,
    /// Operator charge per the rental's cost model
    pub operator_cost: Decimal,
    /// `machinery_cost + operator_cost`
    pub total_cost: Decimal,
}

impl UsageCharges {
    /// Whether the standby floor lifted the billed hours above actual work
    pub fn standby_applied(&self) -> bool {
        self.hours_billed > self.hours_worked
    }
}

/// Asset rental entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRental {
    /// Unique identifier
    pub id: Uuid,

    /// Owning contract
    pub contract_id: Uuid,

    /// Ledger account charged for this rental (denormalized from contract)
    pub account_id: Uuid,

    /// Asset from the external catalog
    pub asset_id: Uuid,

    /// Billing model, fixed at creation from the asset configuration
    pub tracking_type: TrackingType,

    /// Hourly rate snapshot (machinery)
    pub hourly_rate: Decimal,

    /// Daily rate snapshot (tools)
    pub daily_rate: Decimal,

    /// Operator cost model snapshot
    pub operator_cost_type: OperatorCostType,

    /// Operator rate snapshot (per day or per hour)
    pub operator_cost_rate: Decimal,

    /// Guaranteed minimum billable hours per day (standby floor)
    pub min_daily_hours: Decimal,

    /// Latest hourometer reading
    pub current_hourometer: Decimal,

    /// Latest odometer reading
    pub current_odometer: Decimal,

    /// Days charged so far (tools)
    pub days_elapsed: i32,

    /// Cumulative worked hours (machinery)
    pub total_hours_used: Decimal,

    /// Cumulative kilometers traveled
    pub total_km_used: Decimal,

    /// Cumulative machinery charges
    pub total_machinery_cost: Decimal,

    /// Cumulative operator charges
    pub total_operator_cost: Decimal,

    /// Cumulative total charged against this rental
    pub total_cost: Decimal,

    /// Last day this rental was charged
    pub last_charge_date: Option<NaiveDate>,

    /// When the asset left the yard
    pub withdrawal_date: DateTime<Utc>,

    /// Agreed return date
    pub expected_return_date: Option<DateTime<Utc>>,

    /// Set exactly once on return; None means the rental is open
    pub actual_return_date: Option<DateTime<Utc>>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl AssetRental {
    /// Create a rental at withdrawal time, freezing the asset's rates.
    ///
    /// Fails `AssetNotConfigured` when the catalog profile carries no
    /// tracking type.
    pub fn from_profile(
        contract_id: Uuid,
        account_id: Uuid,
        asset_id: Uuid,
        profile: &AssetBillingProfile,
        expected_return_date: Option<DateTime<Utc>>,
    ) -> Result<Self, AppError> {
        let tracking_type = profile
            .tracking_type
            .ok_or_else(|| AppError::AssetNotConfigured(asset_id.to_string()))?;

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            contract_id,
            account_id,
            asset_id,
            tracking_type,
            hourly_rate: profile.hourly_rate,
            daily_rate: profile.daily_rate,
            operator_cost_type: profile.operator_cost_type,
            operator_cost_rate: profile.operator_cost_rate,
            min_daily_hours: profile.min_daily_hours,
            current_hourometer: Decimal::ZERO,
            current_odometer: Decimal::ZERO,
            days_elapsed: 0,
            total_hours_used: Decimal::ZERO,
            total_km_used: Decimal::ZERO,
            total_machinery_cost: Decimal::ZERO,
            total_operator_cost: Decimal::ZERO,
            total_cost: Decimal::ZERO,
            last_charge_date: None,
            withdrawal_date: now,
            expected_return_date,
            actual_return_date: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Whether the asset is still out with the client
    #[inline]
    pub fn is_open(&self) -> bool {
        self.actual_return_date.is_none()
    }

    /// Compute one day's machinery charges with the standby floor.
    ///
    /// `hours_billed = max(hours_worked, min_daily_hours)`: the client is
    /// always liable for at least the configured minimum even if the machine
    /// sat idle. The per-hour operator model bills the same floored hours;
    /// the per-day model is a flat rate independent of hours.
    pub fn usage_charges(&self, hours_worked: Decimal) -> UsageCharges {
        let hours_billed = hours_worked.max(self.min_daily_hours);
        let machinery_cost = hours_billed * self.hourly_rate;

        let operator_cost = match self.operator_cost_type {
            OperatorCostType::PerDay => self.operator_cost_rate,
            OperatorCostType::PerHour => hours_billed * self.operator_cost_rate,
        };

        UsageCharges {
            hours_worked,
            hours_billed,
            machinery_cost,
            operator_cost,
            total_cost: machinery_cost + operator_cost,
        }
    }

    /// Estimated daily cost assuming a pure-standby day. Used by projections
    /// when a machinery rental has no usage history yet.
    pub fn standby_daily_cost(&self) -> Decimal {
        match self.tracking_type {
            TrackingType::Tool => self.daily_rate,
            TrackingType::Machinery => self.usage_charges(Decimal::ZERO).total_cost,
        }
    }
}
