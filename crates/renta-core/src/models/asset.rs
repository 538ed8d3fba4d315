//! Asset billing profile
//!
//! The contract with the external asset catalog. The engine receives this
//! snapshot at withdrawal time and copies it onto the new rental; it never
//! mutates the catalog.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::rental::{OperatorCostType, TrackingType};

/// Billing configuration supplied by the asset catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetBillingProfile {
    /// Billing model; None means the asset was never configured for rental
    pub tracking_type: Option<TrackingType>,

    /// Hourly rate for machinery
    pub hourly_rate: Decimal,

    /// Daily rate for tools
    pub daily_rate: Decimal,

    /// Operator cost model
    pub operator_cost_type: OperatorCostType,

    /// Operator rate (per day or per hour depending on the model)
    pub operator_cost_rate: Decimal,

    /// Guaranteed minimum billable hours per day for machinery
    pub min_daily_hours: Decimal,
}

impl AssetBillingProfile {
    /// Whether the profile can be used to open a rental
    pub fn is_configured(&self) -> bool {
        self.tracking_type.is_some()
    }
}
