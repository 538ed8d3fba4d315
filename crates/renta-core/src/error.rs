//! Unified error handling for RentaLedger
//!
//! This module provides a comprehensive error type that covers all possible
//! failure scenarios in the ledger engine. Outer layers (HTTP, messaging)
//! map these onto their own response formats via `error_code()`.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Main application error type
///
/// All errors in the engine should be converted to this type.
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Database Errors ====================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    // ==================== Ledger Errors ====================
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    // ==================== Contract/Rental Errors ====================
    #[error("Contract not found: {0}")]
    ContractNotFound(String),

    #[error("Contract {id} is not active (status: {status})")]
    ContractNotActive { id: Uuid, status: String },

    #[error("Invalid contract transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Contract {contract_id} has {count} active rental(s)")]
    ActiveRentalsExist {
        contract_id: Uuid,
        count: usize,
        rental_ids: Vec<Uuid>,
    },

    #[error("Rental not found: {0}")]
    RentalNotFound(String),

    #[error("Rental {0} was already returned")]
    AlreadyReturned(Uuid),

    #[error("Asset {0} has no tracking configuration")]
    AssetNotConfigured(String),

    // ==================== Usage Billing Errors ====================
    #[error("Wrong tracking type for rental {rental_id}: expected {expected}, found {found}")]
    WrongTrackingType {
        rental_id: Uuid,
        expected: String,
        found: String,
    },

    #[error("Invalid meter reading: {0}")]
    InvalidMeterReading(String),

    #[error("Missing evidence: {0}")]
    MissingEvidence(String),

    // ==================== Batch Errors ====================
    #[error("Job {0} is already running")]
    JobAlreadyRunning(String),

    // ==================== Validation Errors ====================
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ==================== Resource Errors ====================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    // ==================== Internal Errors ====================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Returns a stable machine-readable code for API/notification layers
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::Pool(_) => "pool_error",
            AppError::Transaction(_) => "transaction_error",
            AppError::InsufficientBalance { .. } => "insufficient_balance",
            AppError::AccountNotFound(_) => "account_not_found",
            AppError::ContractNotFound(_) => "contract_not_found",
            AppError::ContractNotActive { .. } => "contract_not_active",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::ActiveRentalsExist { .. } => "active_rentals_exist",
            AppError::RentalNotFound(_) => "rental_not_found",
            AppError::AlreadyReturned(_) => "already_returned",
            AppError::AssetNotConfigured(_) => "asset_not_configured",
            AppError::WrongTrackingType { .. } => "wrong_tracking_type",
            AppError::InvalidMeterReading(_) => "invalid_meter_reading",
            AppError::MissingEvidence(_) => "missing_evidence",
            AppError::JobAlreadyRunning(_) => "job_already_running",
            AppError::Validation(_) => "validation_error",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::NotFound(_) => "not_found",
            AppError::AlreadyExists(_) => "already_exists",
            AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
        }
    }

    /// Whether this error is a per-item business rejection rather than an
    /// infrastructure failure. Batch jobs use this to classify outcomes.
    pub fn is_business_rejection(&self) -> bool {
        matches!(
            self,
            AppError::InsufficientBalance { .. }
                | AppError::ContractNotActive { .. }
                | AppError::AlreadyReturned(_)
                | AppError::WrongTrackingType { .. }
                | AppError::InvalidMeterReading(_)
                | AppError::MissingEvidence(_)
        )
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}
