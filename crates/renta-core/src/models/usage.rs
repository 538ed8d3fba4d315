//! Daily usage report model (machinery only)
//!
//! One report per machine per day, carrying meter readings and the charges
//! derived from them. Evidence is mandatory: a report without at least one
//! evidence URI is never billable.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::rental::UsageCharges;

/// Which meters the report carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Hourometer,
    Odometer,
    Both,
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricType::Hourometer => write!(f, "hourometer"),
            MetricType::Odometer => write!(f, "odometer"),
            MetricType::Both => write!(f, "both"),
        }
    }
}

impl MetricType {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "hourometer" => Some(MetricType::Hourometer),
            "odometer" => Some(MetricType::Odometer),
            "both" => Some(MetricType::Both),
            _ => None,
        }
    }

    pub fn has_hourometer(&self) -> bool {
        matches!(self, MetricType::Hourometer | MetricType::Both)
    }

    pub fn has_odometer(&self) -> bool {
        matches!(self, MetricType::Odometer | MetricType::Both)
    }
}

/// Usage report status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UsageStatus {
    #[default]
    Pending,
    Processed,
    Rejected,
}

impl fmt::Display for UsageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsageStatus::Pending => write!(f, "pending"),
            UsageStatus::Processed => write!(f, "processed"),
            UsageStatus::Rejected => write!(f, "rejected"),
        }
    }
}

impl UsageStatus {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(UsageStatus::Pending),
            "processed" => Some(UsageStatus::Processed),
            "rejected" => Some(UsageStatus::Rejected),
            _ => None,
        }
    }
}

/// Raw meter readings submitted with a usage report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeterReadings {
    pub hourometer_start: Option<Decimal>,
    pub hourometer_end: Option<Decimal>,
    pub odometer_start: Option<Decimal>,
    pub odometer_end: Option<Decimal>,
}

impl MeterReadings {
    /// Classify which meters are present
    pub fn metric_type(&self) -> Result<MetricType, AppError> {
        let hourometer = self.hourometer_start.is_some() && self.hourometer_end.is_some();
        let odometer = self.odometer_start.is_some() && self.odometer_end.is_some();

        match (hourometer, odometer) {
            (true, true) => Ok(MetricType::Both),
            (true, false) => Ok(MetricType::Hourometer),
            (false, true) => Ok(MetricType::Odometer),
            (false, false) => Err(AppError::InvalidMeterReading(
                "no complete meter reading pair provided".to_string(),
            )),
        }
    }

    /// Hourometer delta; fails on a negative span
    pub fn hours_worked(&self) -> Result<Decimal, AppError> {
        match (self.hourometer_start, self.hourometer_end) {
            (Some(start), Some(end)) => {
                let delta = end - start;
                if delta < Decimal::ZERO {
                    return Err(AppError::InvalidMeterReading(format!(
                        "hourometer went backwards: {start} -> {end}"
                    )));
                }
                Ok(delta)
            }
            _ => Ok(Decimal::ZERO),
        }
    }

    /// Odometer delta; fails on a negative span. No floor is applied to
    /// distance.
    pub fn km_traveled(&self) -> Result<Decimal, AppError> {
        match (self.odometer_start, self.odometer_end) {
            (Some(start), Some(end)) => {
                let delta = end - start;
                if delta < Decimal::ZERO {
                    return Err(AppError::InvalidMeterReading(format!(
                        "odometer went backwards: {start} -> {end}"
                    )));
                }
                Ok(delta)
            }
            _ => Ok(Decimal::ZERO),
        }
    }
}

/// Daily usage report entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetUsage {
    /// Unique identifier
    pub id: Uuid,

    /// Rental this report belongs to
    pub asset_rental_id: Uuid,

    /// Ledger account charged (denormalized from the rental)
    pub account_id: Uuid,

    /// Day the usage occurred
    pub report_date: NaiveDate,

    /// Which meters the report carries
    pub metric_type: MetricType,

    pub hourometer_start: Option<Decimal>,
    pub hourometer_end: Option<Decimal>,
    pub odometer_start: Option<Decimal>,
    pub odometer_end: Option<Decimal>,

    /// Actual hours per the hourometer
    pub hours_worked: Decimal,

    /// Hours billed after the standby floor; always >= hours_worked
    pub hours_billed: Decimal,

    /// Distance traveled; no floor applied
    pub km_traveled: Decimal,

    pub machinery_cost: Decimal,
    pub operator_cost: Decimal,
    pub total_cost: Decimal,

    /// Evidence URIs; required, non-empty
    pub evidence_urls: Vec<String>,

    /// Report status
    pub status: UsageStatus,

    /// Actor who submitted the report
    pub created_by: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl AssetUsage {
    /// Build a processed usage record from readings and computed charges
    pub fn processed(
        asset_rental_id: Uuid,
        account_id: Uuid,
        report_date: NaiveDate,
        metric_type: MetricType,
        readings: &MeterReadings,
        charges: &UsageCharges,
        km_traveled: Decimal,
        evidence_urls: Vec<String>,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            asset_rental_id,
            account_id,
            report_date,
            metric_type,
            hourometer_start: readings.hourometer_start,
            hourometer_end: readings.hourometer_end,
            odometer_start: readings.odometer_start,
            odometer_end: readings.odometer_end,
            hours_worked: charges.hours_worked,
            hours_billed: charges.hours_billed,
            km_traveled,
            machinery_cost: charges.machinery_cost,
            operator_cost: charges.operator_cost,
            total_cost: charges.total_cost,
            evidence_urls,
            status: UsageStatus::Processed,
            created_by: created_by.into(),
            created_at: Utc::now(),
        }
    }
}
