//! Rental repository implementation
//!
//! Storage for asset rentals, including the batch-job candidate queries
//! (open tool/machinery rentals under active contracts). The cumulative
//! counter updates after a successful charge happen inside the ledger
//! transaction, not through this repository.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use renta_core::{
    models::{AssetRental, OperatorCostType, TrackingType},
    traits::{RentalRepository, Repository},
    AppError, AppResult,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

const RENTAL_COLUMNS: &str = r#"
    r.id, r.contract_id, r.account_id, r.asset_id,
    r.tracking_type, r.hourly_rate, r.daily_rate,
    r.operator_cost_type, r.operator_cost_rate, r.min_daily_hours,
    r.current_hourometer, r.current_odometer, r.days_elapsed,
    r.total_hours_used, r.total_km_used,
    r.total_machinery_cost, r.total_operator_cost, r.total_cost,
    r.last_charge_date, r.withdrawal_date, r.expected_return_date,
    r.actual_return_date, r.created_at, r.updated_at
"#;

/// PostgreSQL implementation of RentalRepository
pub struct PgRentalRepository {
    pool: PgPool,
}

impl PgRentalRepository {
    /// Create a new rental repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_open_by_tracking(&self, tracking: TrackingType) -> AppResult<Vec<AssetRental>> {
        let rows = sqlx::query_as::<sqlx::Postgres, RentalRow>(&format!(
            r#"
            SELECT {RENTAL_COLUMNS}
            FROM asset_rentals r
            INNER JOIN rental_contracts c ON r.contract_id = c.id
            WHERE r.actual_return_date IS NULL
              AND r.tracking_type = $1
              AND c.status = 'active'
            ORDER BY r.withdrawal_date
            "#
        ))
        .bind(tracking.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding open {} rentals: {}", tracking, e);
            AppError::Database(format!("Failed to fetch rentals: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl Repository<AssetRental, Uuid> for PgRentalRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<AssetRental>> {
        debug!("Finding rental by id: {}", id);

        let result = sqlx::query_as::<sqlx::Postgres, RentalRow>(&format!(
            "SELECT {RENTAL_COLUMNS} FROM asset_rentals r WHERE r.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding rental {}: {}", id, e);
            AppError::Database(format!("Failed to find rental: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<AssetRental>> {
        let rows = sqlx::query_as::<sqlx::Postgres, RentalRow>(&format!(
            "SELECT {RENTAL_COLUMNS} FROM asset_rentals r ORDER BY r.created_at DESC LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding rentals: {}", e);
            AppError::Database(format!("Failed to fetch rentals: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn count(&self) -> AppResult<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM asset_rentals")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error counting rentals: {}", e);
                AppError::Database(format!("Failed to count rentals: {}", e))
            })?;

        Ok(result.0)
    }

    #[instrument(skip(self, entity))]
    async fn create(&self, entity: &AssetRental) -> AppResult<AssetRental> {
        debug!("Creating rental for asset: {}", entity.asset_id);

        let row = sqlx::query_as::<sqlx::Postgres, RentalRow>(&format!(
            r#"
            INSERT INTO asset_rentals (
                id, contract_id, account_id, asset_id,
                tracking_type, hourly_rate, daily_rate,
                operator_cost_type, operator_cost_rate, min_daily_hours,
                current_hourometer, current_odometer,
                withdrawal_date, expected_return_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {RENTAL_COLUMNS}
            "#
        ))
        .bind(entity.id)
        .bind(entity.contract_id)
        .bind(entity.account_id)
        .bind(entity.asset_id)
        .bind(entity.tracking_type.to_string())
        .bind(entity.hourly_rate)
        .bind(entity.daily_rate)
        .bind(entity.operator_cost_type.to_string())
        .bind(entity.operator_cost_rate)
        .bind(entity.min_daily_hours)
        .bind(entity.current_hourometer)
        .bind(entity.current_odometer)
        .bind(entity.withdrawal_date)
        .bind(entity.expected_return_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error creating rental: {}", e);
            AppError::Database(format!("Failed to create rental: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self, entity))]
    async fn update(&self, entity: &AssetRental) -> AppResult<AssetRental> {
        debug!("Updating rental: {}", entity.id);

        let row = sqlx::query_as::<sqlx::Postgres, RentalRow>(&format!(
            r#"
            UPDATE asset_rentals r
            SET expected_return_date = $2,
                updated_at = NOW()
            WHERE r.id = $1
            RETURNING {RENTAL_COLUMNS}
            "#
        ))
        .bind(entity.id)
        .bind(entity.expected_return_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating rental {}: {}", entity.id, e);
            AppError::Database(format!("Failed to update rental: {}", e))
        })?;

        Ok(row.into())
    }
}

#[async_trait]
impl RentalRepository for PgRentalRepository {
    #[instrument(skip(self))]
    async fn find_open_by_contract(&self, contract_id: Uuid) -> AppResult<Vec<AssetRental>> {
        let rows = sqlx::query_as::<sqlx::Postgres, RentalRow>(&format!(
            r#"
            SELECT {RENTAL_COLUMNS}
            FROM asset_rentals r
            WHERE r.contract_id = $1 AND r.actual_return_date IS NULL
            ORDER BY r.withdrawal_date
            "#
        ))
        .bind(contract_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Database error finding open rentals for contract {}: {}",
                contract_id, e
            );
            AppError::Database(format!("Failed to fetch rentals: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn find_open_tool_rentals(&self) -> AppResult<Vec<AssetRental>> {
        self.find_open_by_tracking(TrackingType::Tool).await
    }

    #[instrument(skip(self))]
    async fn find_open_machinery_rentals(&self) -> AppResult<Vec<AssetRental>> {
        self.find_open_by_tracking(TrackingType::Machinery).await
    }

    #[instrument(skip(self))]
    async fn mark_returned(
        &self,
        id: Uuid,
        returned_at: DateTime<Utc>,
        final_hourometer: Option<Decimal>,
        final_odometer: Option<Decimal>,
    ) -> AppResult<AssetRental> {
        // The WHERE clause doubles as the already-returned guard: a second
        // return finds no open row to update.
        let row = sqlx::query_as::<sqlx::Postgres, RentalRow>(&format!(
            r#"
            UPDATE asset_rentals r
            SET actual_return_date = $2,
                current_hourometer = COALESCE($3, current_hourometer),
                current_odometer = COALESCE($4, current_odometer),
                updated_at = NOW()
            WHERE r.id = $1 AND r.actual_return_date IS NULL
            RETURNING {RENTAL_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(returned_at)
        .bind(final_hourometer)
        .bind(final_odometer)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error returning rental {}: {}", id, e);
            AppError::Database(format!("Failed to mark rental returned: {}", e))
        })?;

        match row {
            Some(row) => Ok(row.into()),
            None => match self.find_by_id(id).await? {
                Some(_) => Err(AppError::AlreadyReturned(id)),
                None => Err(AppError::RentalNotFound(id.to_string())),
            },
        }
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct RentalRow {
    id: Uuid,
    contract_id: Uuid,
    account_id: Uuid,
    asset_id: Uuid,
    tracking_type: String,
    hourly_rate: Decimal,
    daily_rate: Decimal,
    operator_cost_type: String,
    operator_cost_rate: Decimal,
    min_daily_hours: Decimal,
    current_hourometer: Decimal,
    current_odometer: Decimal,
    days_elapsed: i32,
    total_hours_used: Decimal,
    total_km_used: Decimal,
    total_machinery_cost: Decimal,
    total_operator_cost: Decimal,
    total_cost: Decimal,
    last_charge_date: Option<NaiveDate>,
    withdrawal_date: DateTime<Utc>,
    expected_return_date: Option<DateTime<Utc>>,
    actual_return_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RentalRow> for AssetRental {
    fn from(row: RentalRow) -> Self {
        Self {
            id: row.id,
            contract_id: row.contract_id,
            account_id: row.account_id,
            asset_id: row.asset_id,
            tracking_type: TrackingType::from_str(&row.tracking_type)
                .unwrap_or(TrackingType::Tool),
            hourly_rate: row.hourly_rate,
            daily_rate: row.daily_rate,
            operator_cost_type: OperatorCostType::from_str(&row.operator_cost_type)
                .unwrap_or_default(),
            operator_cost_rate: row.operator_cost_rate,
            min_daily_hours: row.min_daily_hours,
            current_hourometer: row.current_hourometer,
            current_odometer: row.current_odometer,
            days_elapsed: row.days_elapsed,
            total_hours_used: row.total_hours_used,
            total_km_used: row.total_km_used,
            total_machinery_cost: row.total_machinery_cost,
            total_operator_cost: row.total_operator_cost,
            total_cost: row.total_cost,
            last_charge_date: row.last_charge_date,
            withdrawal_date: row.withdrawal_date,
            expected_return_date: row.expected_return_date,
            actual_return_date: row.actual_return_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
