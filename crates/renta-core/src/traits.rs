//! Common traits for repositories and services
//!
//! Defines abstractions for database access and business logic. Services are
//! generic over these traits so the engine can be exercised with in-memory
//! implementations in tests and Postgres-backed ones in production.

use crate::error::AppError;
use crate::models::{
    AccountMovement, AssetRental, AssetUsage, ClientAccount, NewMovement, RentalContract,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Generic repository trait for CRUD operations
#[async_trait]
pub trait Repository<T, ID>: Send + Sync {
    /// Find entity by ID
    async fn find_by_id(&self, id: ID) -> Result<Option<T>, AppError>;

    /// Find all entities with pagination
    async fn find_all(&self, limit: i64, offset: i64) -> Result<Vec<T>, AppError>;

    /// Count total entities
    async fn count(&self) -> Result<i64, AppError>;

    /// Create a new entity
    async fn create(&self, entity: &T) -> Result<T, AppError>;

    /// Update an existing entity
    async fn update(&self, entity: &T) -> Result<T, AppError>;
}

/// Account repository trait with specialized methods
#[async_trait]
pub trait AccountRepository: Repository<ClientAccount, Uuid> {
    /// Find the account of a client within a tenant
    async fn find_by_client(
        &self,
        tenant_id: Uuid,
        client_id: Uuid,
    ) -> Result<Option<ClientAccount>, AppError>;

    /// Accounts whose scheduled statement is due at `now`
    async fn find_statement_due(&self, now: DateTime<Utc>)
        -> Result<Vec<ClientAccount>, AppError>;

    /// Accounts at or below their alert threshold with no alert raised yet
    async fn find_alert_candidates(&self) -> Result<Vec<ClientAccount>, AppError>;

    /// Raise the low-balance alert flag and stamp the send time
    async fn mark_alert_sent(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError>;

    /// Stamp a dispatched statement and schedule the next one
    async fn record_statement_sent(
        &self,
        id: Uuid,
        sent_at: DateTime<Utc>,
        next_due: Option<DateTime<Utc>>,
    ) -> Result<(), AppError>;
}

/// Movement repository trait
///
/// Movements are append-only: there is deliberately no update or delete.
#[async_trait]
pub trait MovementRepository: Send + Sync {
    /// Find movement by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<AccountMovement>, AppError>;

    /// Movements for an account, newest first, optionally bounded in time
    async fn list_by_account(
        &self,
        account_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<AccountMovement>, AppError>;
}

/// Contract repository trait with specialized methods
#[async_trait]
pub trait ContractRepository: Repository<RentalContract, Uuid> {
    /// Update only the status (and end date for terminal transitions)
    async fn update_status(
        &self,
        id: Uuid,
        status: crate::models::ContractStatus,
        actual_end_date: Option<DateTime<Utc>>,
    ) -> Result<RentalContract, AppError>;
}

/// Rental repository trait with specialized methods
#[async_trait]
pub trait RentalRepository: Repository<AssetRental, Uuid> {
    /// Open rentals (no return date) under a contract
    async fn find_open_by_contract(&self, contract_id: Uuid)
        -> Result<Vec<AssetRental>, AppError>;

    /// Open TOOL rentals under active contracts, for the auto-charge batch
    async fn find_open_tool_rentals(&self) -> Result<Vec<AssetRental>, AppError>;

    /// Open MACHINERY rentals under active contracts, for report reminders
    async fn find_open_machinery_rentals(&self) -> Result<Vec<AssetRental>, AppError>;

    /// Close the rental, storing final readings. Fails if already returned.
    async fn mark_returned(
        &self,
        id: Uuid,
        returned_at: DateTime<Utc>,
        final_hourometer: Option<Decimal>,
        final_odometer: Option<Decimal>,
    ) -> Result<AssetRental, AppError>;
}

/// Usage report repository trait
///
/// Read-only: usage reports are written inside the ledger transaction that
/// charges for them, together with the rental's counter updates.
#[async_trait]
pub trait UsageRepository: Send + Sync {
    /// Most recent processed reports for a rental, newest first
    async fn find_recent_by_rental(
        &self,
        rental_id: Uuid,
        limit: i64,
    ) -> Result<Vec<AssetUsage>, AppError>;

    /// Whether a report exists for a rental on a given day
    async fn exists_for_date(&self, rental_id: Uuid, date: NaiveDate) -> Result<bool, AppError>;
}

/// Account statement, a read-only projection of the ledger
#[derive(Debug, Clone)]
pub struct AccountStatement {
    pub account_id: Uuid,
    pub balance: Decimal,
    pub total_consumed: Decimal,
    pub total_reloaded: Decimal,
    /// Sum of positive movements in the requested window
    pub period_credits: Decimal,
    /// Sum of absolute charge amounts in the requested window
    pub period_charges: Decimal,
    /// Movements newest-first
    pub movements: Vec<AccountMovement>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub generated_at: DateTime<Utc>,
}

/// Ledger service trait
///
/// The single mutation contract for account balances. Every balance change
/// in the system flows through `apply_movement`, which executes as one
/// atomic read-validate-write unit per account.
#[async_trait]
pub trait LedgerService: Send + Sync {
    /// Apply one movement atomically; rejects movements that would take the
    /// balance below zero, leaving all state untouched.
    async fn apply_movement(&self, movement: NewMovement) -> Result<AccountMovement, AppError>;

    /// Apply a usage charge and persist its report in the same atomic unit,
    /// rolling the report into the rental's running totals. A rejection or
    /// write failure leaves neither the charge nor the report.
    async fn apply_usage_charge(
        &self,
        movement: NewMovement,
        usage: AssetUsage,
    ) -> Result<(AccountMovement, AssetUsage), AppError>;

    /// Apply a daily tool charge and advance the rental's charge counters
    /// in the same atomic unit. The movement must reference the rental.
    async fn apply_tool_charge(
        &self,
        movement: NewMovement,
        charge_date: NaiveDate,
    ) -> Result<AccountMovement, AppError>;

    /// Find the account for a client, creating a zero-balance one if none
    /// exists yet. Idempotent per client within a tenant.
    async fn find_or_open_account(
        &self,
        tenant_id: Uuid,
        business_unit_id: Uuid,
        client_id: Uuid,
    ) -> Result<ClientAccount, AppError>;

    /// Credit the account and clear a triggered low-balance alert
    async fn reload_credit(
        &self,
        account_id: Uuid,
        amount: Decimal,
        description: String,
        actor: String,
    ) -> Result<AccountMovement, AppError>;

    /// Read-only statement projection; mutates nothing
    async fn get_statement(
        &self,
        account_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<AccountStatement, AppError>;
}

/// Cross-process mutual exclusion for batch jobs
///
/// Batch invocations run as separate one-shot processes, so an in-process
/// lock cannot see a sibling invocation. Implementations hold the lock
/// outside the process (Postgres advisory locks in production) and keep it
/// held until `release`.
#[async_trait]
pub trait JobCoordinator: Send + Sync {
    /// Try to take the lock for `key`; false when another holder has it
    async fn try_acquire(&self, key: i64) -> Result<bool, AppError>;

    /// Release a lock previously taken by `try_acquire`
    async fn release(&self, key: i64) -> Result<(), AppError>;
}

/// Delivery channel for alerts, statements, and reminders
///
/// Actual delivery (email, push, WhatsApp) is an external collaborator; the
/// engine only hands over payloads. Implementations must not panic; a
/// delivery failure is reported as an error and isolated per item by the
/// batch jobs.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Low-balance alert for an account
    async fn low_balance(&self, account: &ClientAccount) -> Result<(), AppError>;

    /// Periodic statement for an account
    async fn statement(
        &self,
        account: &ClientAccount,
        statement: &AccountStatement,
    ) -> Result<(), AppError>;

    /// Missing daily usage report for an open machinery rental
    async fn missing_report(&self, rental: &AssetRental, date: NaiveDate)
        -> Result<(), AppError>;
}
