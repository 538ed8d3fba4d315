//! Usage billing engine (machinery)
//!
//! Turns daily meter reports into ledger charges. The standby floor and
//! operator cost math live on `AssetRental`; this engine validates the
//! report against the rental, charges the account, then persists the
//! processed report and rolls it into the rental's running totals.
//!
//! The charge, the report row, and the rental's counter updates commit as
//! one atomic unit through the ledger: a rejection or a write failure at
//! any step leaves no usage row and no change to the balance or rental.

use chrono::NaiveDate;
use renta_core::{
    models::{
        AccountMovement, AssetRental, AssetUsage, CostBreakdown, MeterReadings, MetricType,
        MovementType, NewMovement, TrackingType, UsageCharges,
    },
    traits::{LedgerService, RentalRepository, Repository, UsageRepository},
    AppError, AppResult,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// A daily usage report as submitted from the field
#[derive(Debug, Clone)]
pub struct UsageReport {
    pub rental_id: Uuid,
    pub report_date: NaiveDate,
    pub readings: MeterReadings,
    /// Photos of the meters; required
    pub evidence_urls: Vec<String>,
    pub actor: String,
}

/// What a report would cost, computed without mutating anything
#[derive(Debug, Clone)]
pub struct UsageQuote {
    pub metric_type: MetricType,
    pub charges: UsageCharges,
    pub km_traveled: Decimal,
}

/// Outcome of a processed report
#[derive(Debug, Clone)]
pub struct ProcessedUsage {
    pub usage: AssetUsage,
    pub movement: AccountMovement,
}

/// Usage billing engine
pub struct UsageBillingEngine<R, U, L>
where
    R: RentalRepository,
    U: UsageRepository,
    L: LedgerService,
{
    rental_repo: Arc<R>,
    usage_repo: Arc<U>,
    ledger: Arc<L>,
}

impl<R, U, L> UsageBillingEngine<R, U, L>
where
    R: RentalRepository,
    U: UsageRepository,
    L: LedgerService,
{
    /// Create a new usage billing engine
    pub fn new(rental_repo: Arc<R>, usage_repo: Arc<U>, ledger: Arc<L>) -> Self {
        Self {
            rental_repo,
            usage_repo,
            ledger,
        }
    }

    /// Validate a report and quote its charges. Read-only: callers use this
    /// to show the field crew what a report will cost before committing.
    #[instrument(skip(self, report), fields(rental_id = %report.rental_id))]
    pub async fn validate_usage_report(
        &self,
        report: &UsageReport,
    ) -> AppResult<(AssetRental, UsageQuote)> {
        let rental = self
            .rental_repo
            .find_by_id(report.rental_id)
            .await?
            .ok_or_else(|| AppError::RentalNotFound(report.rental_id.to_string()))?;

        if rental.tracking_type != TrackingType::Machinery {
            return Err(AppError::WrongTrackingType {
                rental_id: rental.id,
                expected: TrackingType::Machinery.to_string(),
                found: rental.tracking_type.to_string(),
            });
        }
        if !rental.is_open() {
            return Err(AppError::AlreadyReturned(rental.id));
        }
        if report.evidence_urls.is_empty() {
            return Err(AppError::MissingEvidence(format!(
                "usage report for rental {} carries no evidence",
                rental.id
            )));
        }
        if self
            .usage_repo
            .exists_for_date(rental.id, report.report_date)
            .await?
        {
            return Err(AppError::AlreadyExists(format!(
                "usage report for rental {} on {}",
                rental.id, report.report_date
            )));
        }

        let metric_type = report.readings.metric_type()?;
        let hours_worked = report.readings.hours_worked()?;
        let km_traveled = report.readings.km_traveled()?;
        let charges = rental.usage_charges(hours_worked);

        debug!(
            "Quoted rental {}: {}h worked, {}h billed, total {}",
            rental.id, charges.hours_worked, charges.hours_billed, charges.total_cost
        );

        Ok((
            rental,
            UsageQuote {
                metric_type,
                charges,
                km_traveled,
            },
        ))
    }

    /// Process a report: charge the account, persist the report, and roll
    /// it into the rental's totals.
    #[instrument(skip(self, report), fields(rental_id = %report.rental_id, date = %report.report_date))]
    pub async fn process_usage_report(&self, report: UsageReport) -> AppResult<ProcessedUsage> {
        let (rental, quote) = self.validate_usage_report(&report).await?;

        let usage = AssetUsage::processed(
            rental.id,
            rental.account_id,
            report.report_date,
            quote.metric_type,
            &report.readings,
            &quote.charges,
            quote.km_traveled,
            report.evidence_urls.clone(),
            report.actor.clone(),
        );

        let description = if quote.charges.standby_applied() {
            format!(
                "Machinery usage {} on {}: {}h worked, billed {}h (standby minimum)",
                rental.asset_id,
                report.report_date,
                quote.charges.hours_worked,
                quote.charges.hours_billed,
            )
        } else {
            format!(
                "Machinery usage {} on {}: {}h billed",
                rental.asset_id, report.report_date, quote.charges.hours_billed,
            )
        };

        // One atomic unit: charge, report row, rental totals
        let (movement, usage) = self
            .ledger
            .apply_usage_charge(
                NewMovement::new(
                    rental.account_id,
                    MovementType::DailyCharge,
                    -quote.charges.total_cost,
                    description,
                    report.actor,
                )
                .with_contract(rental.contract_id)
                .with_rental(rental.id)
                .with_usage_report(usage.id)
                .with_cost_breakdown(CostBreakdown::machinery(
                    quote.charges.machinery_cost,
                    quote.charges.operator_cost,
                ))
                .with_evidence(report.evidence_urls),
                usage,
            )
            .await?;

        info!(
            "Processed usage {} for rental {}: charged {} (balance {} -> {})",
            usage.id, rental.id, quote.charges.total_cost, movement.balance_before,
            movement.balance_after
        );

        Ok(ProcessedUsage { usage, movement })
    }
}
