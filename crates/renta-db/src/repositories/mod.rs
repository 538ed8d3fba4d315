//! Repository implementations for PostgreSQL

pub mod account_repo;
pub mod contract_repo;
pub mod movement_repo;
pub mod rental_repo;
pub mod usage_repo;

pub use account_repo::PgAccountRepository;
pub use contract_repo::PgContractRepository;
pub use movement_repo::PgMovementRepository;
pub use rental_repo::PgRentalRepository;
pub use usage_repo::PgUsageRepository;
