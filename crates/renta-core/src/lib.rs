//! RentaLedger Core Library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the RentaLedger billing engine. It includes:
//!
//! - Domain models (ClientAccount, AccountMovement, RentalContract, etc.)
//! - Common traits for repositories and services
//! - Unified error handling
//! - Application configuration

pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use error::AppError;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
