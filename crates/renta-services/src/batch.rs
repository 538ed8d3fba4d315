//! Scheduled batch jobs
//!
//! Four jobs, each invoked once per run by an external scheduler through the
//! `renta-billing` binary: daily tool charges, missing-report reminders,
//! scheduled statements, and low-balance alerts.
//!
//! Failure isolation: one bad item never aborts a batch. Each item's error
//! is recorded in the summary and the run continues; only failure to
//! enumerate the candidates aborts. A second concurrent run of the same job
//! kind fails fast with `JobAlreadyRunning` - the guard is a
//! `JobCoordinator` lock held outside the process, because overlapping runs
//! arrive as separate one-shot invocations, not tasks in one runtime.

use chrono::{Duration, Utc};
use renta_core::{
    config::BillingConfig,
    models::{AssetRental, ClientAccount, CostBreakdown, MovementType, NewMovement},
    traits::{
        AccountRepository, AccountStatement, JobCoordinator, LedgerService, NotificationSink,
        RentalRepository, Repository, UsageRepository,
    },
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Batch job kinds, matching the binary's CLI argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Daily flat-rate charges for open tool rentals
    ChargeToolRentals,
    /// Remind about machinery rentals with no usage report for the day
    NotifyMissingReports,
    /// Periodic account statements
    SendScheduledStatements,
    /// Low-balance alert sweep
    CheckLowBalanceAlerts,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::ChargeToolRentals => write!(f, "charge-tools"),
            JobKind::NotifyMissingReports => write!(f, "missing-reports"),
            JobKind::SendScheduledStatements => write!(f, "statements"),
            JobKind::CheckLowBalanceAlerts => write!(f, "low-balance"),
        }
    }
}

impl JobKind {
    /// Parse from the CLI argument form
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "charge-tools" => Some(JobKind::ChargeToolRentals),
            "missing-reports" => Some(JobKind::NotifyMissingReports),
            "statements" => Some(JobKind::SendScheduledStatements),
            "low-balance" => Some(JobKind::CheckLowBalanceAlerts),
            _ => None,
        }
    }

    /// Coordinator lock key. Values must stay stable across releases:
    /// two versions disagreeing on a key could run the same job twice.
    pub fn lock_key(self) -> i64 {
        match self {
            JobKind::ChargeToolRentals => 7401,
            JobKind::NotifyMissingReports => 7402,
            JobKind::SendScheduledStatements => 7403,
            JobKind::CheckLowBalanceAlerts => 7404,
        }
    }
}

/// One failed item in a batch run
#[derive(Debug, Clone)]
pub struct BatchError {
    /// Rental or account the failure belongs to
    pub item_id: Uuid,
    pub code: &'static str,
    pub message: String,
}

/// Outcome of one batch run
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub job: JobKind,
    pub processed: usize,
    pub failed: usize,
    /// Items skipped because the account could not cover the charge
    pub insufficient_balance: usize,
    pub errors: Vec<BatchError>,
}

impl BatchSummary {
    fn new(job: JobKind) -> Self {
        Self {
            job,
            processed: 0,
            failed: 0,
            insufficient_balance: 0,
            errors: Vec::new(),
        }
    }

    fn record_failure(&mut self, item_id: Uuid, err: &AppError) {
        self.failed += 1;
        self.errors.push(BatchError {
            item_id,
            code: err.error_code(),
            message: err.to_string(),
        });
    }
}

/// Batch job runner
pub struct BatchRunner<R, A, U, L, J, N>
where
    R: RentalRepository,
    A: AccountRepository,
    U: UsageRepository,
    L: LedgerService,
    J: JobCoordinator,
    N: NotificationSink,
{
    rental_repo: Arc<R>,
    account_repo: Arc<A>,
    usage_repo: Arc<U>,
    ledger: Arc<L>,
    coordinator: Arc<J>,
    sink: Arc<N>,
    config: BillingConfig,
}

impl<R, A, U, L, J, N> BatchRunner<R, A, U, L, J, N>
where
    R: RentalRepository,
    A: AccountRepository,
    U: UsageRepository,
    L: LedgerService,
    J: JobCoordinator,
    N: NotificationSink,
{
    /// Create a new batch runner
    pub fn new(
        rental_repo: Arc<R>,
        account_repo: Arc<A>,
        usage_repo: Arc<U>,
        ledger: Arc<L>,
        coordinator: Arc<J>,
        sink: Arc<N>,
        config: BillingConfig,
    ) -> Self {
        Self {
            rental_repo,
            account_repo,
            usage_repo,
            ledger,
            coordinator,
            sink,
            config,
        }
    }

    /// Run one job to completion. Single-flight per job kind across
    /// processes: an overlapping run of the same kind, from this process
    /// or any other, fails with `JobAlreadyRunning` before touching
    /// anything.
    #[instrument(skip(self))]
    pub async fn run(&self, job: JobKind) -> AppResult<BatchSummary> {
        if !self.coordinator.try_acquire(job.lock_key()).await? {
            return Err(AppError::JobAlreadyRunning(job.to_string()));
        }

        info!("Starting batch job {}", job);
        let result = self.dispatch(job).await;

        if let Err(err) = self.coordinator.release(job.lock_key()).await {
            warn!("Failed to release lock for job {}: {}", job, err);
        }

        let summary = result?;
        info!(
            "Batch job {} finished: {} processed, {} failed, {} insufficient",
            job, summary.processed, summary.failed, summary.insufficient_balance
        );
        Ok(summary)
    }

    async fn dispatch(&self, job: JobKind) -> AppResult<BatchSummary> {
        match job {
            JobKind::ChargeToolRentals => self.charge_tool_rentals().await,
            JobKind::NotifyMissingReports => self.notify_missing_reports().await,
            JobKind::SendScheduledStatements => self.send_scheduled_statements().await,
            JobKind::CheckLowBalanceAlerts => self.check_low_balance_alerts().await,
        }
    }

    /// Daily flat-rate charge for every open tool rental under an active
    /// contract. Shortfalls are counted, not failed: the rental simply is
    /// not charged today and the batch moves on.
    async fn charge_tool_rentals(&self) -> AppResult<BatchSummary> {
        let mut summary = BatchSummary::new(JobKind::ChargeToolRentals);
        let rentals = self.rental_repo.find_open_tool_rentals().await?;
        let today = Utc::now().date_naive();

        for rental in rentals {
            if rental.daily_rate <= Decimal::ZERO {
                debug!("Skipping rental {}: zero daily rate", rental.id);
                continue;
            }

            match self.charge_one_tool(&rental, today).await {
                Ok(()) => summary.processed += 1,
                Err(AppError::InsufficientBalance { required, available }) => {
                    warn!(
                        "Rental {} not charged: required {}, available {}",
                        rental.id, required, available
                    );
                    summary.insufficient_balance += 1;
                }
                Err(err) => {
                    warn!("Failed to charge rental {}: {}", rental.id, err);
                    summary.record_failure(rental.id, &err);
                }
            }
        }
        Ok(summary)
    }

    async fn charge_one_tool(&self, rental: &AssetRental, today: NaiveDate) -> AppResult<()> {
        let account = self
            .account_repo
            .find_by_id(rental.account_id)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(rental.account_id.to_string()))?;

        // Pre-check keeps the expected shortfall off the error path; a
        // raced shortfall still surfaces from apply_movement.
        if !account.can_cover(rental.daily_rate) {
            return Err(AppError::InsufficientBalance {
                required: rental.daily_rate,
                available: account.balance,
            });
        }

        // Charge and rental counters commit together or not at all
        self.ledger
            .apply_tool_charge(
                NewMovement::new(
                    rental.account_id,
                    MovementType::DailyCharge,
                    -rental.daily_rate,
                    format!(
                        "Daily tool charge {} (day {})",
                        rental.asset_id,
                        rental.days_elapsed + 1
                    ),
                    "batch:charge-tools",
                )
                .with_contract(rental.contract_id)
                .with_rental(rental.id)
                .with_cost_breakdown(CostBreakdown::tool(rental.daily_rate)),
                today,
            )
            .await?;
        Ok(())
    }

    /// Remind about open machinery rentals with no usage report for the
    /// target date (yesterday by default).
    async fn notify_missing_reports(&self) -> AppResult<BatchSummary> {
        let mut summary = BatchSummary::new(JobKind::NotifyMissingReports);
        let rentals = self.rental_repo.find_open_machinery_rentals().await?;
        let target = Utc::now().date_naive() - Duration::days(self.config.missing_report_lookback_days);

        for rental in rentals {
            // Withdrawn after the target day: no report was expected
            if rental.withdrawal_date.date_naive() > target {
                continue;
            }

            let result = async {
                if self.usage_repo.exists_for_date(rental.id, target).await? {
                    return Ok(false);
                }
                self.sink.missing_report(&rental, target).await?;
                Ok(true)
            }
            .await;

            match result {
                Ok(true) => summary.processed += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!("Missing-report check failed for rental {}: {}", rental.id, err);
                    summary.record_failure(rental.id, &err);
                }
            }
        }
        Ok(summary)
    }

    /// Build and deliver statements for accounts whose schedule is due,
    /// then advance the schedule by the account's frequency.
    async fn send_scheduled_statements(&self) -> AppResult<BatchSummary> {
        let mut summary = BatchSummary::new(JobKind::SendScheduledStatements);
        let now = Utc::now();
        let accounts = self.account_repo.find_statement_due(now).await?;

        for account in accounts {
            match self.send_one_statement(&account).await {
                Ok(()) => summary.processed += 1,
                Err(err) => {
                    warn!("Failed to send statement for account {}: {}", account.id, err);
                    summary.record_failure(account.id, &err);
                }
            }
        }
        Ok(summary)
    }

    async fn send_one_statement(&self, account: &ClientAccount) -> AppResult<()> {
        let now = Utc::now();
        let statement: AccountStatement = self
            .ledger
            .get_statement(account.id, account.last_statement_sent, Some(now))
            .await?;

        self.sink.statement(account, &statement).await?;

        let next_due = account
            .statement_frequency
            .interval_days()
            .map(|days| now + Duration::days(days));
        self.account_repo
            .record_statement_sent(account.id, now, next_due)
            .await
    }

    /// Alert accounts that sit at or below their threshold and have not
    /// been alerted yet. Re-alerts are throttled by the configured
    /// interval.
    async fn check_low_balance_alerts(&self) -> AppResult<BatchSummary> {
        let mut summary = BatchSummary::new(JobKind::CheckLowBalanceAlerts);
        let now = Utc::now();
        let accounts = self.account_repo.find_alert_candidates().await?;

        for account in accounts {
            if let Some(last) = account.last_alert_sent {
                if now - last < Duration::hours(self.config.alert_interval_hours) {
                    debug!("Alert for account {} throttled", account.id);
                    continue;
                }
            }

            let result = async {
                self.sink.low_balance(&account).await?;
                self.account_repo.mark_alert_sent(account.id, now).await
            }
            .await;

            match result {
                Ok(()) => summary.processed += 1,
                Err(err) => {
                    warn!("Failed to alert account {}: {}", account.id, err);
                    summary.record_failure(account.id, &err);
                }
            }
        }
        Ok(summary)
    }
}

/// Notification sink that only logs. The production delivery channels
/// (email, WhatsApp) live outside this engine; deployments without them
/// run on this sink.
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn low_balance(&self, account: &ClientAccount) -> AppResult<()> {
        info!(
            "Low balance alert: account {} at {} (threshold {})",
            account.id, account.balance, account.alert_amount
        );
        Ok(())
    }

    async fn statement(
        &self,
        account: &ClientAccount,
        statement: &AccountStatement,
    ) -> AppResult<()> {
        info!(
            "Statement for account {}: balance {}, {} movements, credits {}, charges {}",
            account.id,
            statement.balance,
            statement.movements.len(),
            statement.period_credits,
            statement.period_charges
        );
        Ok(())
    }

    async fn missing_report(&self, rental: &AssetRental, date: NaiveDate) -> AppResult<()> {
        info!(
            "Missing usage report: rental {} (asset {}) for {}",
            rental.id, rental.asset_id, date
        );
        Ok(())
    }
}
