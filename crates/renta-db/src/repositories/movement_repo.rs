//! Movement repository implementation
//!
//! Read-only access to the append-only ledger. Movements are inserted
//! exclusively inside the ledger service's balance transaction; this
//! repository never writes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use renta_core::{
    models::{AccountMovement, CostBreakdown, MovementType},
    traits::MovementRepository,
    AppError, AppResult,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

const MOVEMENT_COLUMNS: &str = r#"
    id, account_id, contract_id, asset_rental_id, usage_report_id,
    movement_type, amount, balance_before, balance_after,
    machinery_cost, operator_cost, tool_cost,
    description, evidence_urls, metadata, created_by, created_at
"#;

/// PostgreSQL implementation of MovementRepository
pub struct PgMovementRepository {
    pool: PgPool,
}

impl PgMovementRepository {
    /// Create a new movement repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MovementRepository for PgMovementRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<AccountMovement>> {
        debug!("Finding movement by id: {}", id);

        let result = sqlx::query_as::<sqlx::Postgres, MovementRow>(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM account_movements WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding movement {}: {}", id, e);
            AppError::Database(format!("Failed to find movement: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn list_by_account(
        &self,
        account_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<AccountMovement>> {
        debug!(
            "Listing movements for account {} from {:?} to {:?}",
            account_id, from, to
        );

        let rows = sqlx::query_as::<sqlx::Postgres, MovementRow>(&format!(
            r#"
            SELECT {MOVEMENT_COLUMNS}
            FROM account_movements
            WHERE account_id = $1
              AND ($2::timestamptz IS NULL OR created_at >= $2)
              AND ($3::timestamptz IS NULL OR created_at <= $3)
            ORDER BY created_at DESC
            "#
        ))
        .bind(account_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Database error listing movements for account {}: {}",
                account_id, e
            );
            AppError::Database(format!("Failed to fetch movements: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct MovementRow {
    pub id: Uuid,
    pub account_id: Uuid,
    pub contract_id: Option<Uuid>,
    pub asset_rental_id: Option<Uuid>,
    pub usage_report_id: Option<Uuid>,
    pub movement_type: String,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub machinery_cost: Option<Decimal>,
    pub operator_cost: Option<Decimal>,
    pub tool_cost: Option<Decimal>,
    pub description: String,
    pub evidence_urls: Vec<String>,
    pub metadata: serde_json::Value,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl From<MovementRow> for AccountMovement {
    fn from(row: MovementRow) -> Self {
        Self {
            id: row.id,
            account_id: row.account_id,
            contract_id: row.contract_id,
            asset_rental_id: row.asset_rental_id,
            usage_report_id: row.usage_report_id,
            movement_type: MovementType::from_str(&row.movement_type)
                .unwrap_or(MovementType::Adjustment),
            amount: row.amount,
            balance_before: row.balance_before,
            balance_after: row.balance_after,
            cost_breakdown: CostBreakdown {
                machinery_cost: row.machinery_cost,
                operator_cost: row.operator_cost,
                tool_cost: row.tool_cost,
            },
            description: row.description,
            evidence_urls: row.evidence_urls,
            metadata: row.metadata,
            created_by: row.created_by,
            created_at: row.created_at,
        }
    }
}
