//! RentaLedger Database Layer
//!
//! This crate provides PostgreSQL database access and repository
//! implementations for the RentaLedger engine. It includes:
//!
//! - Connection pool management with sqlx
//! - Repository implementations for all domain entities
//! - Row locking (`SELECT ... FOR UPDATE`) for atomic ledger mutations
//! - Transaction support for atomic operations
//! - Advisory-lock job coordination for the batch runner

pub mod job_lock;
pub mod pool;
pub mod repositories;

pub use job_lock::PgJobCoordinator;
pub use pool::create_pool;
pub use repositories::*;

// Re-export commonly used types
pub use renta_core::{AppError, AppResult};
pub use sqlx::{PgPool, Postgres, Transaction};
