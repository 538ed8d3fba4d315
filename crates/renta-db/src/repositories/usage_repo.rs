//! Usage report repository implementation
//!
//! Read-only: usage reports are inserted inside the ledger transaction
//! that charges for them, so this repository only serves the projection
//! and batch-job queries.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use renta_core::{
    models::{AssetUsage, MetricType, UsageStatus},
    traits::UsageRepository,
    AppError, AppResult,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{error, instrument};
use uuid::Uuid;

const USAGE_COLUMNS: &str = r#"
    id, asset_rental_id, account_id, report_date, metric_type,
    hourometer_start, hourometer_end, odometer_start, odometer_end,
    hours_worked, hours_billed, km_traveled,
    machinery_cost, operator_cost, total_cost,
    evidence_urls, status, created_by, created_at
"#;

/// PostgreSQL implementation of UsageRepository
pub struct PgUsageRepository {
    pool: PgPool,
}

impl PgUsageRepository {
    /// Create a new usage repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageRepository for PgUsageRepository {
    #[instrument(skip(self))]
    async fn find_recent_by_rental(
        &self,
        rental_id: Uuid,
        limit: i64,
    ) -> AppResult<Vec<AssetUsage>> {
        let rows = sqlx::query_as::<sqlx::Postgres, UsageRow>(&format!(
            r#"
            SELECT {USAGE_COLUMNS}
            FROM asset_usages
            WHERE asset_rental_id = $1 AND status = 'processed'
            ORDER BY report_date DESC
            LIMIT $2
            "#
        ))
        .bind(rental_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Database error finding usage reports for rental {}: {}",
                rental_id, e
            );
            AppError::Database(format!("Failed to fetch usage reports: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn exists_for_date(&self, rental_id: Uuid, date: NaiveDate) -> AppResult<bool> {
        let result: (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM asset_usages
                WHERE asset_rental_id = $1 AND report_date = $2 AND status = 'processed'
            )
            "#,
        )
        .bind(rental_id)
        .bind(date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Database error checking usage report existence for {}: {}",
                rental_id, e
            );
            AppError::Database(format!("Failed to check usage report: {}", e))
        })?;

        Ok(result.0)
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct UsageRow {
    id: Uuid,
    asset_rental_id: Uuid,
    account_id: Uuid,
    report_date: NaiveDate,
    metric_type: String,
    hourometer_start: Option<Decimal>,
    hourometer_end: Option<Decimal>,
    odometer_start: Option<Decimal>,
    odometer_end: Option<Decimal>,
    hours_worked: Decimal,
    hours_billed: Decimal,
    km_traveled: Decimal,
    machinery_cost: Decimal,
    operator_cost: Decimal,
    total_cost: Decimal,
    evidence_urls: Vec<String>,
    status: String,
    created_by: String,
    created_at: DateTime<Utc>,
}

impl From<UsageRow> for AssetUsage {
    fn from(row: UsageRow) -> Self {
        Self {
            id: row.id,
            asset_rental_id: row.asset_rental_id,
            account_id: row.account_id,
            report_date: row.report_date,
            metric_type: MetricType::from_str(&row.metric_type).unwrap_or(MetricType::Hourometer),
            hourometer_start: row.hourometer_start,
            hourometer_end: row.hourometer_end,
            odometer_start: row.odometer_start,
            odometer_end: row.odometer_end,
            hours_worked: row.hours_worked,
            hours_billed: row.hours_billed,
            km_traveled: row.km_traveled,
            machinery_cost: row.machinery_cost,
            operator_cost: row.operator_cost,
            total_cost: row.total_cost,
            evidence_urls: row.evidence_urls,
            status: UsageStatus::from_str(&row.status).unwrap_or_default(),
            created_by: row.created_by,
            created_at: row.created_at,
        }
    }
}
