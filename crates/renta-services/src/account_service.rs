//! Account service
//!
//! The single mutation path for client account balances. Every balance
//! change in the system - reloads, daily charges, adjustments, audit
//! markers - flows through one transaction per account:
//!
//! 1. Lock the account row (`SELECT ... FOR UPDATE`)
//! 2. Validate the non-negative-balance invariant
//! 3. Insert the immutable movement record
//! 4. Update the balance, audit counters, and alert state
//!
//! Charges that carry companion writes (the usage report row, the tool
//! rental's charge counters) execute those in the same transaction, so a
//! failure at any step rolls the charge back with them.
//!
//! Concurrent movements on the same account serialize on the row lock;
//! movements on different accounts proceed in parallel. A rejected
//! movement leaves no observable state change.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use renta_core::{
    models::{
        AccountMovement, AssetUsage, ClientAccount, MovementType, NewMovement,
        StatementFrequency,
    },
    traits::{AccountRepository, AccountStatement, LedgerService, MovementRepository, Repository},
    AppError, AppResult,
};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// Account service
///
/// Postgres-backed implementation of the `LedgerService` contract.
pub struct AccountService<A: AccountRepository, M: MovementRepository> {
    account_repo: Arc<A>,
    movement_repo: Arc<M>,
    pool: Arc<PgPool>,
}

impl<A: AccountRepository, M: MovementRepository> AccountService<A, M> {
    /// Create a new account service
    pub fn new(account_repo: Arc<A>, movement_repo: Arc<M>, pool: Arc<PgPool>) -> Self {
        Self {
            account_repo,
            movement_repo,
            pool,
        }
    }

    async fn begin(&self) -> AppResult<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })
    }

    async fn commit(&self, tx: Transaction<'static, Postgres>) -> AppResult<()> {
        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })
    }

    /// Lock the account row, validate the invariant, append the movement,
    /// and update the balance/counter/alert state - all on the caller's
    /// transaction, uncommitted.
    async fn apply_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        movement: NewMovement,
    ) -> AppResult<AccountMovement> {
        // Lock account row
        let account = sqlx::query_as::<sqlx::Postgres, AccountRow>(
            r#"
            SELECT id, tenant_id, business_unit_id, client_id,
                   balance, total_consumed, total_reloaded,
                   alert_amount, alert_triggered, last_alert_sent,
                   statement_frequency, last_statement_sent, next_statement_due,
                   created_at, updated_at
            FROM client_accounts
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(movement.account_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| {
            error!("Failed to lock account: {}", e);
            AppError::Database(format!("Failed to lock account: {}", e))
        })?
        .ok_or_else(|| AppError::AccountNotFound(movement.account_id.to_string()))?;

        let account: ClientAccount = account.into();

        // Validate the invariant; a rejection rolls the transaction back
        // with nothing written.
        let (balance_before, balance_after) = account.preview_movement(movement.amount)?;

        let amount = movement.amount;
        let movement_type = movement.movement_type;
        let contract_id = movement.contract_id;
        let record = movement.into_movement(balance_before, balance_after);

        // Append the immutable ledger entry
        sqlx::query(
            r#"
            INSERT INTO account_movements (
                id, account_id, contract_id, asset_rental_id, usage_report_id,
                movement_type, amount, balance_before, balance_after,
                machinery_cost, operator_cost, tool_cost,
                description, evidence_urls, metadata, created_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(record.id)
        .bind(record.account_id)
        .bind(record.contract_id)
        .bind(record.asset_rental_id)
        .bind(record.usage_report_id)
        .bind(record.movement_type.to_string())
        .bind(record.amount)
        .bind(record.balance_before)
        .bind(record.balance_after)
        .bind(record.cost_breakdown.machinery_cost)
        .bind(record.cost_breakdown.operator_cost)
        .bind(record.cost_breakdown.tool_cost)
        .bind(&record.description)
        .bind(&record.evidence_urls)
        .bind(&record.metadata)
        .bind(&record.created_by)
        .bind(record.created_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            error!("Failed to insert movement: {}", e);
            AppError::Database(format!("Failed to insert movement: {}", e))
        })?;

        // Audit counters only ever grow
        let consumed_delta = if amount < Decimal::ZERO {
            amount.abs()
        } else {
            Decimal::ZERO
        };
        let reloaded_delta = if amount > Decimal::ZERO && movement_type.is_credit() {
            amount
        } else {
            Decimal::ZERO
        };

        // Alert threshold re-evaluation. A charge that crosses the
        // threshold raises the flag; a reload that climbs back above it
        // clears the flag.
        let mut alert_triggered = account.alert_triggered;
        let mut alert_sent_at: Option<DateTime<Utc>> = None;
        if amount < Decimal::ZERO
            && account.alert_amount > Decimal::ZERO
            && balance_after <= account.alert_amount
            && !alert_triggered
        {
            info!(
                "Account {} crossed alert threshold: balance {} <= {}",
                account.id, balance_after, account.alert_amount
            );
            alert_triggered = true;
            alert_sent_at = Some(Utc::now());
        }
        if movement_type == MovementType::CreditReload && balance_after > account.alert_amount {
            alert_triggered = false;
        }

        sqlx::query(
            r#"
            UPDATE client_accounts
            SET balance = $2,
                total_consumed = total_consumed + $3,
                total_reloaded = total_reloaded + $4,
                alert_triggered = $5,
                last_alert_sent = COALESCE($6, last_alert_sent),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(account.id)
        .bind(balance_after)
        .bind(consumed_delta)
        .bind(reloaded_delta)
        .bind(alert_triggered)
        .bind(alert_sent_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            error!("Failed to update account balance: {}", e);
            AppError::Database(format!("Failed to update balance: {}", e))
        })?;

        // Mirror charges onto the contract's consumption counter
        if let Some(contract_id) = contract_id {
            if consumed_delta > Decimal::ZERO {
                sqlx::query(
                    r#"
                    UPDATE rental_contracts
                    SET total_consumed = total_consumed + $2,
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(contract_id)
                .bind(consumed_delta)
                .execute(&mut **tx)
                .await
                .map_err(|e| {
                    error!("Failed to update contract consumption: {}", e);
                    AppError::Database(format!("Failed to update contract: {}", e))
                })?;
            }
        }

        Ok(record)
    }
}

#[async_trait]
impl<A: AccountRepository, M: MovementRepository> LedgerService for AccountService<A, M> {
    #[instrument(skip(self, movement), fields(account_id = %movement.account_id, amount = %movement.amount))]
    async fn apply_movement(&self, movement: NewMovement) -> AppResult<AccountMovement> {
        debug!(
            "Applying {} movement of {} to account {}",
            movement.movement_type, movement.amount, movement.account_id
        );

        let mut tx = self.begin().await?;
        let record = self.apply_in_tx(&mut tx, movement).await?;
        self.commit(tx).await?;

        info!(
            "Applied movement {} to account {}: {} ({} -> {})",
            record.id, record.account_id, record.amount, record.balance_before,
            record.balance_after
        );
        Ok(record)
    }

    #[instrument(skip(self, movement, usage), fields(account_id = %movement.account_id, rental_id = %usage.asset_rental_id))]
    async fn apply_usage_charge(
        &self,
        movement: NewMovement,
        usage: AssetUsage,
    ) -> AppResult<(AccountMovement, AssetUsage)> {
        let mut tx = self.begin().await?;
        let record = self.apply_in_tx(&mut tx, movement).await?;

        // The report row and the rental's totals commit with the charge or
        // not at all.
        sqlx::query(
            r#"
            INSERT INTO asset_usages (
                id, asset_rental_id, account_id, report_date, metric_type,
                hourometer_start, hourometer_end, odometer_start, odometer_end,
                hours_worked, hours_billed, km_traveled,
                machinery_cost, operator_cost, total_cost,
                evidence_urls, status, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(usage.id)
        .bind(usage.asset_rental_id)
        .bind(usage.account_id)
        .bind(usage.report_date)
        .bind(usage.metric_type.to_string())
        .bind(usage.hourometer_start)
        .bind(usage.hourometer_end)
        .bind(usage.odometer_start)
        .bind(usage.odometer_end)
        .bind(usage.hours_worked)
        .bind(usage.hours_billed)
        .bind(usage.km_traveled)
        .bind(usage.machinery_cost)
        .bind(usage.operator_cost)
        .bind(usage.total_cost)
        .bind(&usage.evidence_urls)
        .bind(usage.status.to_string())
        .bind(&usage.created_by)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to insert usage report: {}", e);
            AppError::Database(format!("Failed to insert usage report: {}", e))
        })?;

        sqlx::query(
            r#"
            UPDATE asset_rentals
            SET current_hourometer = COALESCE($2, current_hourometer),
                current_odometer = COALESCE($3, current_odometer),
                total_hours_used = total_hours_used + $4,
                total_km_used = total_km_used + $5,
                total_machinery_cost = total_machinery_cost + $6,
                total_operator_cost = total_operator_cost + $7,
                total_cost = total_cost + $8,
                last_charge_date = $9,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(usage.asset_rental_id)
        .bind(usage.hourometer_end)
        .bind(usage.odometer_end)
        .bind(usage.hours_worked)
        .bind(usage.km_traveled)
        .bind(usage.machinery_cost)
        .bind(usage.operator_cost)
        .bind(usage.total_cost)
        .bind(usage.report_date)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to update rental totals: {}", e);
            AppError::Database(format!("Failed to update rental totals: {}", e))
        })?;

        self.commit(tx).await?;

        info!(
            "Applied usage charge {} for rental {}: {} ({} -> {})",
            record.id, usage.asset_rental_id, record.amount, record.balance_before,
            record.balance_after
        );
        Ok((record, usage))
    }

    #[instrument(skip(self, movement), fields(account_id = %movement.account_id, amount = %movement.amount))]
    async fn apply_tool_charge(
        &self,
        movement: NewMovement,
        charge_date: NaiveDate,
    ) -> AppResult<AccountMovement> {
        let rental_id = movement.asset_rental_id.ok_or_else(|| {
            AppError::InvalidInput("tool charge movement must reference a rental".to_string())
        })?;
        let charged = movement.amount.abs();

        let mut tx = self.begin().await?;
        let record = self.apply_in_tx(&mut tx, movement).await?;

        sqlx::query(
            r#"
            UPDATE asset_rentals
            SET days_elapsed = days_elapsed + 1,
                total_cost = total_cost + $2,
                last_charge_date = $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(rental_id)
        .bind(charged)
        .bind(charge_date)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to advance rental charge counters: {}", e);
            AppError::Database(format!("Failed to advance rental counters: {}", e))
        })?;

        self.commit(tx).await?;

        info!(
            "Applied tool charge {} for rental {} on {}: {}",
            record.id, rental_id, charge_date, record.amount
        );
        Ok(record)
    }

    /// Find the account for a client, creating a zero-balance one if none
    /// exists yet. Contract creation calls this lazily.
    #[instrument(skip(self))]
    async fn find_or_open_account(
        &self,
        tenant_id: Uuid,
        business_unit_id: Uuid,
        client_id: Uuid,
    ) -> AppResult<ClientAccount> {
        if let Some(account) = self
            .account_repo
            .find_by_client(tenant_id, client_id)
            .await?
        {
            return Ok(account);
        }

        info!("Opening new account for client {}", client_id);
        let account = ClientAccount::open(tenant_id, business_unit_id, client_id);
        self.account_repo.create(&account).await
    }

    #[instrument(skip(self, description))]
    async fn reload_credit(
        &self,
        account_id: Uuid,
        amount: Decimal,
        description: String,
        actor: String,
    ) -> AppResult<AccountMovement> {
        if amount <= Decimal::ZERO {
            return Err(AppError::InvalidInput(format!(
                "reload amount must be positive, got {amount}"
            )));
        }

        self.apply_movement(NewMovement::new(
            account_id,
            MovementType::CreditReload,
            amount,
            description,
            actor,
        ))
        .await
    }

    #[instrument(skip(self))]
    async fn get_statement(
        &self,
        account_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> AppResult<AccountStatement> {
        let account = self
            .account_repo
            .find_by_id(account_id)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(account_id.to_string()))?;

        let movements = self
            .movement_repo
            .list_by_account(account_id, from, to)
            .await?;

        let mut period_credits = Decimal::ZERO;
        let mut period_charges = Decimal::ZERO;
        for movement in &movements {
            if movement.amount > Decimal::ZERO {
                period_credits += movement.amount;
            } else {
                period_charges += movement.amount.abs();
            }
        }

        Ok(AccountStatement {
            account_id,
            balance: account.balance,
            total_consumed: account.total_consumed,
            total_reloaded: account.total_reloaded,
            period_credits,
            period_charges,
            movements,
            from,
            to,
            generated_at: Utc::now(),
        })
    }
}

/// Helper struct for account row mapping
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

// Balance-invariant behavior is covered by the in-memory ledger tests in
// the sibling modules; the transactional path needs a live database.
#[cfg(test)]
mod tests {
    use super::*;
    use renta_db::{PgAccountRepository, PgMovementRepository};

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_apply_movement_roundtrip() {
        let url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/renta_ledger".to_string());
        let pool = sqlx::PgPool::connect(&url).await.unwrap();

        let service = AccountService::new(
            Arc::new(PgAccountRepository::new(pool.clone())),
            Arc::new(PgMovementRepository::new(pool.clone())),
            Arc::new(pool),
        );

        let account = service
            .find_or_open_account(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();

        let movement = service
            .reload_credit(
                account.id,
                rust_decimal_macros::dec!(50000),
                "Initial funding".to_string(),
                "test".to_string(),
            )
            .await
            .unwrap();

        assert!(movement.is_consistent());
        assert_eq!(movement.balance_before, Decimal::ZERO);
    }
}
