//! RentaLedger batch runner
//!
//! One-shot entry point driven by an external scheduler (cron or a systemd
//! timer): `renta-billing <job>` runs a single batch job to completion,
//! logs its summary, and exits. Jobs: `charge-tools`, `missing-reports`,
//! `statements`, `low-balance`.

use renta_core::AppConfig;
use renta_db::{
    create_pool, PgAccountRepository, PgJobCoordinator, PgMovementRepository, PgRentalRepository,
    PgUsageRepository,
};
use renta_services::{AccountService, BatchRunner, JobKind, LogNotificationSink};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "renta_billing={},renta_services={},renta_db={},sqlx=warn",
            log_level, log_level, log_level
        ))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    let job = match env::args().nth(1).as_deref().and_then(JobKind::from_str) {
        Some(job) => job,
        None => {
            error!(
                "Usage: renta-billing <charge-tools|missing-reports|statements|low-balance>"
            );
            return ExitCode::from(2);
        }
    };

    info!(
        "Starting RentaLedger batch runner v{} (job: {})",
        env!("CARGO_PKG_VERSION"),
        job
    );

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(err) => {
            error!("Failed to load configuration: {}", err);
            return ExitCode::FAILURE;
        }
    };

    info!("Connecting to database...");
    let pool = match create_pool(&config.database).await {
        Ok(pool) => Arc::new(pool),
        Err(err) => {
            error!("Failed to create database pool: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let account_repo = Arc::new(PgAccountRepository::new(pool.as_ref().clone()));
    let movement_repo = Arc::new(PgMovementRepository::new(pool.as_ref().clone()));
    let rental_repo = Arc::new(PgRentalRepository::new(pool.as_ref().clone()));
    let usage_repo = Arc::new(PgUsageRepository::new(pool.as_ref().clone()));

    let ledger = Arc::new(AccountService::new(
        account_repo.clone(),
        movement_repo,
        pool.clone(),
    ));

    let coordinator = Arc::new(PgJobCoordinator::new(pool.as_ref().clone()));

    let runner = BatchRunner::new(
        rental_repo,
        account_repo,
        usage_repo,
        ledger,
        coordinator,
        Arc::new(LogNotificationSink),
        config.billing,
    );

    match runner.run(job).await {
        Ok(summary) => {
            info!(
                "Job {} done: {} processed, {} failed, {} insufficient balance",
                job, summary.processed, summary.failed, summary.insufficient_balance
            );
            for item in &summary.errors {
                error!("  {} [{}]: {}", item.item_id, item.code, item.message);
            }
            if summary.failed > 0 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(err) => {
            error!("Job {} aborted: {}", job, err);
            ExitCode::FAILURE
        }
    }
}
