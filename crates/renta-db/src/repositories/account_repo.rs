//! Account repository implementation
//!
//! Provides PostgreSQL-backed storage for client accounts. Balance columns
//! are never written here: every balance change goes through the ledger
//! service's transactional movement routine. This repository only covers
//! lookups and the alert/statement bookkeeping columns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use renta_core::{
    models::{ClientAccount, StatementFrequency},
    traits::{AccountRepository, Repository},
    AppError, AppResult,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

const ACCOUNT_COLUMNS: &str = r#"
    id, tenant_id, business_unit_id, client_id,
    balance, total_consumed, total_reloaded,
    alert_amount, alert_triggered, last_alert_sent,
    statement_frequency, last_statement_sent, next_statement_due,
    created_at, updated_at
"#;

/// PostgreSQL implementation of AccountRepository
pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    /// Create a new account repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<ClientAccount, Uuid> for PgAccountRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<ClientAccount>> {
        debug!("Finding account by id: {}", id);

        let result = sqlx::query_as::<sqlx::Postgres, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM client_accounts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding account {}: {}", id, e);
            AppError::Database(format!("Failed to find account: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<ClientAccount>> {
        let rows = sqlx::query_as::<sqlx::Postgres, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM client_accounts ORDER BY created_at LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding accounts: {}", e);
            AppError::Database(format!("Failed to fetch accounts: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn count(&self) -> AppResult<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM client_accounts")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error counting accounts: {}", e);
                AppError::Database(format!("Failed to count accounts: {}", e))
            })?;

        Ok(result.0)
    }

    #[instrument(skip(self, entity))]
    async fn create(&self, entity: &ClientAccount) -> AppResult<ClientAccount> {
        debug!("Creating account for client: {}", entity.client_id);

        let row = sqlx::query_as::<sqlx::Postgres, AccountRow>(&format!(
            r#"
            INSERT INTO client_accounts (
                id, tenant_id, business_unit_id, client_id,
                balance, total_consumed, total_reloaded,
                alert_amount, alert_triggered, last_alert_sent,
                statement_frequency, last_statement_sent, next_statement_due
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(entity.id)
        .bind(entity.tenant_id)
        .bind(entity.business_unit_id)
        .bind(entity.client_id)
        .bind(entity.balance)
        .bind(entity.total_consumed)
        .bind(entity.total_reloaded)
        .bind(entity.alert_amount)
        .bind(entity.alert_triggered)
        .bind(entity.last_alert_sent)
        .bind(entity.statement_frequency.to_string())
        .bind(entity.last_statement_sent)
        .bind(entity.next_statement_due)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error creating account: {}", e);
            if e.to_string().contains("unique constraint") {
                AppError::AlreadyExists(format!(
                    "Account for client {} already exists",
                    entity.client_id
                ))
            } else {
                AppError::Database(format!("Failed to create account: {}", e))
            }
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self, entity))]
    async fn update(&self, entity: &ClientAccount) -> AppResult<ClientAccount> {
        debug!("Updating account settings: {}", entity.id);

        // Balance and the audit counters are deliberately absent: those
        // columns belong to the ledger movement transaction.
        let row = sqlx::query_as::<sqlx::Postgres, AccountRow>(&format!(
            r#"
            UPDATE client_accounts
            SET alert_amount = $2,
                statement_frequency = $3,
                next_statement_due = $4,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(entity.id)
        .bind(entity.alert_amount)
        .bind(entity.statement_frequency.to_string())
        .bind(entity.next_statement_due)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating account {}: {}", entity.id, e);
            AppError::Database(format!("Failed to update account: {}", e))
        })?;

        Ok(row.into())
    }
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    #[instrument(skip(self))]
    async fn find_by_client(
        &self,
        tenant_id: Uuid,
        client_id: Uuid,
    ) -> AppResult<Option<ClientAccount>> {
        debug!("Finding account for client {} in tenant {}", client_id, tenant_id);

        let result = sqlx::query_as::<sqlx::Postgres, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM client_accounts WHERE tenant_id = $1 AND client_id = $2"
        ))
        .bind(tenant_id)
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding account by client: {}", e);
            AppError::Database(format!("Failed to find account: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_statement_due(&self, now: DateTime<Utc>) -> AppResult<Vec<ClientAccount>> {
        let rows = sqlx::query_as::<sqlx::Postgres, AccountRow>(&format!(
            r#"
            SELECT {ACCOUNT_COLUMNS}
            FROM client_accounts
            WHERE statement_frequency <> 'manual'
              AND next_statement_due IS NOT NULL
              AND next_statement_due <= $1
            ORDER BY next_statement_due
            "#
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding statement-due accounts: {}", e);
            AppError::Database(format!("Failed to fetch accounts: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn find_alert_candidates(&self) -> AppResult<Vec<ClientAccount>> {
        let rows = sqlx::query_as::<sqlx::Postgres, AccountRow>(&format!(
            r#"
            SELECT {ACCOUNT_COLUMNS}
            FROM client_accounts
            WHERE alert_amount > 0
              AND balance <= alert_amount
              AND alert_triggered = false
            ORDER BY balance
            "#
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding alert candidates: {}", e);
            AppError::Database(format!("Failed to fetch accounts: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn mark_alert_sent(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE client_accounts
            SET alert_triggered = true,
                last_alert_sent = $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error marking alert for account {}: {}", id, e);
            AppError::Database(format!("Failed to mark alert: {}", e))
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn record_statement_sent(
        &self,
        id: Uuid,
        sent_at: DateTime<Utc>,
        next_due: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE client_accounts
            SET last_statement_sent = $2,
                next_statement_due = $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(sent_at)
        .bind(next_due)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error recording statement for account {}: {}", id, e);
            AppError::Database(format!("Failed to record statement: {}", e))
        })?;

        Ok(())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    id: Uuid,
    tenant_id: Uuid,
    business_unit_id: Uuid,
    client_id: Uuid,
    balance: Decimal,
    total_consumed: Decimal,
    total_reloaded: Decimal,
    alert_amount: Decimal,
    alert_triggered: bool,
    last_alert_sent: Option<DateTime<Utc>>,
    statement_frequency: String,
    last_statement_sent: Option<DateTime<Utc>>,
    next_statement_due: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AccountRow> for ClientAccount {
    fn from(row: AccountRow) -> Self {
        Self {
            id: row.id,
            tenant_id: row.tenant_id,
            business_unit_id: row.business_unit_id,
            client_id: row.client_id,
            balance: row.balance,
            total_consumed: row.total_consumed,
            total_reloaded: row.total_reloaded,
            alert_amount: row.alert_amount,
            alert_triggered: row.alert_triggered,
            last_alert_sent: row.last_alert_sent,
            statement_frequency: StatementFrequency::from_str(&row.statement_frequency)
                .unwrap_or_default(),
            last_statement_sent: row.last_statement_sent,
            next_statement_due: row.next_statement_due,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
