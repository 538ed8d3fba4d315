//! Consumption projection service
//!
//! Read-only forecasting: estimates how fast a contract burns credit and
//! when the account runs dry. Tool rentals contribute their flat daily
//! rate; machinery rentals average their recent usage reports and fall
//! back to the pure-standby daily cost while no history exists.

use chrono::{DateTime, Utc};
use renta_core::{
    config::BillingConfig,
    models::TrackingType,
    traits::{AccountRepository, ContractRepository, RentalRepository, Repository, UsageRepository},
    AppError, AppResult,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::constants::DAYS_UNTIL_EMPTY_SENTINEL;

/// Per-rental slice of a projection
#[derive(Debug, Clone, Serialize)]
pub struct RentalProjection {
    pub rental_id: Uuid,
    pub asset_id: Uuid,
    pub tracking_type: TrackingType,
    pub estimated_daily_cost: Decimal,
    /// True when the estimate comes from averaged usage history rather
    /// than the standby fallback (always false for tools)
    pub from_history: bool,
}

/// Forecast of a contract's credit consumption
#[derive(Debug, Clone, Serialize)]
pub struct ConsumptionProjection {
    pub contract_id: Uuid,
    pub account_id: Uuid,
    pub horizon_days: i64,
    pub balance: Decimal,
    pub estimated_daily_cost: Decimal,
    pub projected_consumption: Decimal,
    pub projected_balance: Decimal,
    pub needs_reload: bool,
    /// Minimum reload that keeps the projected balance at zero or above
    pub recommended_reload: Decimal,
    /// Whole days until the balance runs out at the estimated rate;
    /// 9999 when the daily cost is zero
    pub days_until_empty: i64,
    pub rentals: Vec<RentalProjection>,
    pub generated_at: DateTime<Utc>,
}

/// Projection service
pub struct ProjectionService<C, R, U, A>
where
    C: ContractRepository,
    R: RentalRepository,
    U: UsageRepository,
    A: AccountRepository,
{
    contract_repo: Arc<C>,
    rental_repo: Arc<R>,
    usage_repo: Arc<U>,
    account_repo: Arc<A>,
    config: BillingConfig,
}

impl<C, R, U, A> ProjectionService<C, R, U, A>
where
    C: ContractRepository,
    R: RentalRepository,
    U: UsageRepository,
    A: AccountRepository,
{
    /// Create a new projection service
    pub fn new(
        contract_repo: Arc<C>,
        rental_repo: Arc<R>,
        usage_repo: Arc<U>,
        account_repo: Arc<A>,
        config: BillingConfig,
    ) -> Self {
        Self {
            contract_repo,
            rental_repo,
            usage_repo,
            account_repo,
            config,
        }
    }

    /// Project credit consumption over `days` (config default when None).
    /// Mutates nothing.
    #[instrument(skip(self))]
    pub async fn project_consumption(
        &self,
        contract_id: Uuid,
        days: Option<i64>,
    ) -> AppResult<ConsumptionProjection> {
        let horizon_days = days.unwrap_or(self.config.default_projection_days).max(1);

        let contract = self
            .contract_repo
            .find_by_id(contract_id)
            .await?
            .ok_or_else(|| AppError::ContractNotFound(contract_id.to_string()))?;
        let account = self
            .account_repo
            .find_by_id(contract.account_id)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(contract.account_id.to_string()))?;

        let open_rentals = self.rental_repo.find_open_by_contract(contract_id).await?;

        let mut rentals = Vec::with_capacity(open_rentals.len());
        let mut estimated_daily_cost = Decimal::ZERO;
        for rental in &open_rentals {
            let (daily_cost, from_history) = match rental.tracking_type {
                TrackingType::Tool => (rental.daily_rate, false),
                TrackingType::Machinery => self.machinery_daily_cost(rental.id).await?.map_or(
                    (rental.standby_daily_cost(), false),
                    |avg| (avg, true),
                ),
            };
            estimated_daily_cost += daily_cost;
            rentals.push(RentalProjection {
                rental_id: rental.id,
                asset_id: rental.asset_id,
                tracking_type: rental.tracking_type,
                estimated_daily_cost: daily_cost,
                from_history,
            });
        }

        let projected_consumption = estimated_daily_cost * Decimal::from(horizon_days);
        let projected_balance = account.balance - projected_consumption;
        let needs_reload = projected_balance < Decimal::ZERO;
        let recommended_reload = if needs_reload {
            -projected_balance
        } else {
            Decimal::ZERO
        };

        let days_until_empty = if estimated_daily_cost <= Decimal::ZERO {
            DAYS_UNTIL_EMPTY_SENTINEL
        } else {
            (account.balance / estimated_daily_cost)
                .floor()
                .to_i64()
                .unwrap_or(DAYS_UNTIL_EMPTY_SENTINEL)
        };

        debug!(
            "Projected contract {}: {}/day over {} days, balance {} -> {}",
            contract_id, estimated_daily_cost, horizon_days, account.balance, projected_balance
        );

        Ok(ConsumptionProjection {
            contract_id,
            account_id: account.id,
            horizon_days,
            balance: account.balance,
            estimated_daily_cost,
            projected_consumption,
            projected_balance,
            needs_reload,
            recommended_reload,
            days_until_empty,
            rentals,
            generated_at: Utc::now(),
        })
    }

    /// Average daily cost over the recent usage history; None when the
    /// rental has no processed reports yet.
    async fn machinery_daily_cost(&self, rental_id: Uuid) -> AppResult<Option<Decimal>> {
        let recent = self
            .usage_repo
            .find_recent_by_rental(rental_id, self.config.usage_history_window)
            .await?;
        if recent.is_empty() {
            return Ok(None);
        }

        let total: Decimal = recent.iter().map(|u| u.total_cost).sum();
        Ok(Some(total / Decimal::from(recent.len() as i64)))
    }
}
