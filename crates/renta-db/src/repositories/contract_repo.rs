//! Contract repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use renta_core::{
    models::{ContractStatus, RentalContract},
    traits::{ContractRepository, Repository},
    AppError, AppResult,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

const CONTRACT_COLUMNS: &str = r#"
    id, tenant_id, business_unit_id, account_id, client_id,
    status, estimated_total, total_consumed,
    start_date, actual_end_date, created_at, updated_at
"#;

/// PostgreSQL implementation of ContractRepository
pub struct PgContractRepository {
    pool: PgPool,
}

impl PgContractRepository {
    /// Create a new contract repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<RentalContract, Uuid> for PgContractRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<RentalContract>> {
        debug!("Finding contract by id: {}", id);

        let result = sqlx::query_as::<sqlx::Postgres, ContractRow>(&format!(
            "SELECT {CONTRACT_COLUMNS} FROM rental_contracts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding contract {}: {}", id, e);
            AppError::Database(format!("Failed to find contract: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<RentalContract>> {
        let rows = sqlx::query_as::<sqlx::Postgres, ContractRow>(&format!(
            "SELECT {CONTRACT_COLUMNS} FROM rental_contracts ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding contracts: {}", e);
            AppError::Database(format!("Failed to fetch contracts: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn count(&self) -> AppResult<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rental_contracts")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error counting contracts: {}", e);
                AppError::Database(format!("Failed to count contracts: {}", e))
            })?;

        Ok(result.0)
    }

    #[instrument(skip(self, entity))]
    async fn create(&self, entity: &RentalContract) -> AppResult<RentalContract> {
        debug!("Creating contract for client: {}", entity.client_id);

        let row = sqlx::query_as::<sqlx::Postgres, ContractRow>(&format!(
            r#"
            INSERT INTO rental_contracts (
                id, tenant_id, business_unit_id, account_id, client_id,
                status, estimated_total, total_consumed, start_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {CONTRACT_COLUMNS}
            "#
        ))
        .bind(entity.id)
        .bind(entity.tenant_id)
        .bind(entity.business_unit_id)
        .bind(entity.account_id)
        .bind(entity.client_id)
        .bind(entity.status.to_string())
        .bind(entity.estimated_total)
        .bind(entity.total_consumed)
        .bind(entity.start_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error creating contract: {}", e);
            AppError::Database(format!("Failed to create contract: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self, entity))]
    async fn update(&self, entity: &RentalContract) -> AppResult<RentalContract> {
        debug!("Updating contract: {}", entity.id);

        let row = sqlx::query_as::<sqlx::Postgres, ContractRow>(&format!(
            r#"
            UPDATE rental_contracts
            SET status = $2,
                estimated_total = $3,
                actual_end_date = $4,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {CONTRACT_COLUMNS}
            "#
        ))
        .bind(entity.id)
        .bind(entity.status.to_string())
        .bind(entity.estimated_total)
        .bind(entity.actual_end_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating contract {}: {}", entity.id, e);
            AppError::Database(format!("Failed to update contract: {}", e))
        })?;

        Ok(row.into())
    }
}

#[async_trait]
impl ContractRepository for PgContractRepository {
    #[instrument(skip(self))]
    async fn update_status(
        &self,
        id: Uuid,
        status: ContractStatus,
        actual_end_date: Option<DateTime<Utc>>,
    ) -> AppResult<RentalContract> {
        debug!("Updating contract {} status to {}", id, status);

        let row = sqlx::query_as::<sqlx::Postgres, ContractRow>(&format!(
            r#"
            UPDATE rental_contracts
            SET status = $2,
                actual_end_date = COALESCE($3, actual_end_date),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {CONTRACT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status.to_string())
        .bind(actual_end_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating contract status {}: {}", id, e);
            AppError::Database(format!("Failed to update contract status: {}", e))
        })?
        .ok_or_else(|| AppError::ContractNotFound(id.to_string()))?;

        Ok(row.into())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct ContractRow {
    id: Uuid,
    tenant_id: Uuid,
    business_unit_id: Uuid,
    account_id: Uuid,
    client_id: Uuid,
    status: String,
    estimated_total: Decimal,
    total_consumed: Decimal,
    start_date: DateTime<Utc>,
    actual_end_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ContractRow> for RentalContract {
    fn from(row: ContractRow) -> Self {
        Self {
            id: row.id,
            tenant_id: row.tenant_id,
            business_unit_id: row.business_unit_id,
            account_id: row.account_id,
            client_id: row.client_id,
            status: ContractStatus::from_str(&row.status).unwrap_or_default(),
            estimated_total: row.estimated_total,
            total_consumed: row.total_consumed,
            start_date: row.start_date,
            actual_end_date: row.actual_end_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
