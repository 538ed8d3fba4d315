//! Business logic services for RentaLedger
//!
//! This crate contains all the business logic services that orchestrate
//! billing operations: ledger mutation, contract/rental lifecycle, usage
//! billing, scheduled batch jobs, and consumption projections.
//!
//! # Architecture
//!
//! Services are designed to be composable and testable:
//! - Each service owns its dependencies (repositories, the ledger service)
//! - Services are generic over the `renta-core` traits so tests can swap in
//!   in-memory implementations
//! - Services are wrapped in Arc for safe sharing across async tasks
//! - All operations are instrumented with tracing
//! - Comprehensive error handling with AppError
//!
//! # Services
//!
//! - `AccountService` - the single atomic mutation path for balances
//! - `RentalLifecycle` - contract state machine, withdrawals and returns
//! - `UsageBillingEngine` - standby-floor billing for metered machinery
//! - `BatchRunner` - daily tool charges and companion scheduled jobs
//! - `ProjectionService` - consumption forecasting and reload advice

pub mod account_service;
pub mod batch;
pub mod projection;
pub mod rental_lifecycle;
pub mod usage_billing;

#[cfg(test)]
pub(crate) mod test_support;

pub use account_service::AccountService;
pub use batch::{BatchError, BatchRunner, BatchSummary, JobKind, LogNotificationSink};
pub use projection::{ConsumptionProjection, ProjectionService, RentalProjection};
pub use rental_lifecycle::{RentalLifecycle, ReturnRequest, WithdrawalRequest};
pub use usage_billing::{ProcessedUsage, UsageBillingEngine, UsageQuote, UsageReport};

/// Business logic constants
pub mod constants {
    /// Sentinel for `days_until_empty` when the daily cost is zero
    pub const DAYS_UNTIL_EMPTY_SENTINEL: i64 = 9999;
}
