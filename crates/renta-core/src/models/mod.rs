//! Domain models for RentaLedger
//!
//! This module contains all the core domain models used throughout the engine.

pub mod account;
pub mod asset;
pub mod contract;
pub mod movement;
pub mod rental;
pub mod usage;

pub use account::{ClientAccount, StatementFrequency};
pub use asset::AssetBillingProfile;
pub use contract::{ContractStatus, RentalContract};
pub use movement::{AccountMovement, CostBreakdown, MovementType, NewMovement};
pub use rental::{AssetRental, OperatorCostType, TrackingType, UsageCharges};
pub use usage::{AssetUsage, MeterReadings, MetricType, UsageStatus};
