//! In-memory fakes for service tests
//!
//! One shared `MemoryStore` backs fake implementations of every repository
//! trait plus a ledger that mirrors the production balance semantics, so
//! the services can be exercised end to end without a database.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use renta_core::{
    models::{
        AccountMovement, AssetBillingProfile, AssetRental, AssetUsage, ClientAccount,
        ContractStatus, MeterReadings, MetricType, MovementType, NewMovement, OperatorCostType,
        RentalContract, StatementFrequency, TrackingType, UsageCharges, UsageStatus,
    },
    traits::{
        AccountRepository, AccountStatement, ContractRepository, JobCoordinator, LedgerService,
        NotificationSink, RentalRepository, Repository, UsageRepository,
    },
    AppError, AppResult,
};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use uuid::Uuid;

// ==================== store ====================

#[derive(Default)]
pub struct MemoryStore {
    accounts: Mutex<HashMap<Uuid, ClientAccount>>,
    contracts: Mutex<HashMap<Uuid, RentalContract>>,
    rentals: Mutex<HashMap<Uuid, AssetRental>>,
    usages: Mutex<Vec<AssetUsage>>,
    movements: Mutex<Vec<AccountMovement>>,
    /// One-shot failure injection for the next ledger write, standing in
    /// for a transaction that fails and rolls back
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account(&self, id: Uuid) -> ClientAccount {
        self.accounts.lock().unwrap()[&id].clone()
    }

    pub fn account_count(&self) -> usize {
        self.accounts.lock().unwrap().len()
    }

    pub fn rental(&self, id: Uuid) -> AssetRental {
        self.rentals.lock().unwrap()[&id].clone()
    }

    pub fn movements_for(&self, account_id: Uuid) -> Vec<AccountMovement> {
        self.movements
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.account_id == account_id)
            .cloned()
            .collect()
    }

    pub fn usage_count(&self) -> usize {
        self.usages.lock().unwrap().len()
    }

    pub fn seed_account(&self, balance: Decimal) -> Uuid {
        let mut account = ClientAccount::open(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        account.balance = balance;
        let id = account.id;
        self.accounts.lock().unwrap().insert(id, account);
        id
    }

    pub fn set_alert_threshold(&self, account_id: Uuid, amount: Decimal) {
        let mut accounts = self.accounts.lock().unwrap();
        accounts.get_mut(&account_id).unwrap().alert_amount = amount;
    }

    pub fn set_statement_schedule(
        &self,
        account_id: Uuid,
        frequency: StatementFrequency,
        next_due: Option<DateTime<Utc>>,
    ) {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts.get_mut(&account_id).unwrap();
        account.statement_frequency = frequency;
        account.next_statement_due = next_due;
    }

    pub fn close_rental(&self, rental_id: Uuid) {
        let mut rentals = self.rentals.lock().unwrap();
        rentals.get_mut(&rental_id).unwrap().actual_return_date = Some(Utc::now());
    }

    pub fn backdate_withdrawal(&self, rental_id: Uuid, days: i64) {
        let mut rentals = self.rentals.lock().unwrap();
        let rental = rentals.get_mut(&rental_id).unwrap();
        rental.withdrawal_date -= Duration::days(days);
    }

    /// Make the next ledger write fail as a rolled-back transaction would:
    /// an error back to the caller, no state changed.
    pub fn fail_next_ledger_write(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    fn take_write_failure(&self) -> bool {
        self.fail_writes.swap(false, Ordering::SeqCst)
    }

    pub fn seed_usage_for_date(&self, rental_id: Uuid, account_id: Uuid, date: NaiveDate) {
        self.seed_usage(rental_id, account_id, date, Decimal::ZERO);
    }

    pub fn seed_processed_usage(
        &self,
        rental_id: Uuid,
        account_id: Uuid,
        days_ago: i64,
        total_cost: Decimal,
    ) {
        let date = Utc::now().date_naive() - Duration::days(days_ago);
        self.seed_usage(rental_id, account_id, date, total_cost);
    }

    fn seed_usage(&self, rental_id: Uuid, account_id: Uuid, date: NaiveDate, total_cost: Decimal) {
        let charges = UsageCharges {
            hours_worked: Decimal::ZERO,
            hours_billed: Decimal::ZERO,
            machinery_cost: total_cost,
            operator_cost: Decimal::ZERO,
            total_cost,
        };
        let usage = AssetUsage::processed(
            rental_id,
            account_id,
            date,
            MetricType::Hourometer,
            &MeterReadings::default(),
            &charges,
            Decimal::ZERO,
            vec!["s3://evidence/seed.jpg".to_string()],
            "seed",
        );
        self.usages.lock().unwrap().push(usage);
    }
}

// ==================== profile/seed helpers ====================

pub fn machinery_profile(
    hourly_rate: Decimal,
    min_daily_hours: Decimal,
    operator_cost_rate: Decimal,
) -> AssetBillingProfile {
    AssetBillingProfile {
        tracking_type: Some(TrackingType::Machinery),
        hourly_rate,
        daily_rate: Decimal::ZERO,
        operator_cost_type: OperatorCostType::PerHour,
        operator_cost_rate,
        min_daily_hours,
    }
}

pub fn tool_profile(daily_rate: Decimal) -> AssetBillingProfile {
    AssetBillingProfile {
        tracking_type: Some(TrackingType::Tool),
        hourly_rate: Decimal::ZERO,
        daily_rate,
        operator_cost_type: OperatorCostType::PerHour,
        operator_cost_rate: Decimal::ZERO,
        min_daily_hours: Decimal::ZERO,
    }
}

/// Funded account plus an active contract on it
pub fn seeded_contract(store: &Arc<MemoryStore>, balance: Decimal) -> RentalContract {
    let account_id = store.seed_account(balance);
    let account = store.account(account_id);
    let contract = RentalContract::new(
        account.tenant_id,
        account.business_unit_id,
        account_id,
        account.client_id,
        Decimal::ZERO,
    );
    store
        .contracts
        .lock()
        .unwrap()
        .insert(contract.id, contract.clone());
    contract
}

/// Open rental under an existing contract
pub fn seeded_rental_under(
    store: &Arc<MemoryStore>,
    contract: &RentalContract,
    profile: AssetBillingProfile,
) -> AssetRental {
    let rental = AssetRental::from_profile(
        contract.id,
        contract.account_id,
        Uuid::new_v4(),
        &profile,
        None,
    )
    .unwrap();
    store
        .rentals
        .lock()
        .unwrap()
        .insert(rental.id, rental.clone());
    rental
}

/// Funded account, active contract, and one open rental in one call
pub fn seeded_rental(
    store: &Arc<MemoryStore>,
    profile: AssetBillingProfile,
    balance: Decimal,
) -> AssetRental {
    let contract = seeded_contract(store, balance);
    seeded_rental_under(store, &contract, profile)
}

// ==================== repositories ====================

pub struct MemoryAccountRepo {
    store: Arc<MemoryStore>,
}

impl MemoryAccountRepo {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Repository<ClientAccount, Uuid> for MemoryAccountRepo {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<ClientAccount>> {
        Ok(self.store.accounts.lock().unwrap().get(&id).cloned())
    }

    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<ClientAccount>> {
        Ok(self
            .store
            .accounts
            .lock()
            .unwrap()
            .values()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn count(&self) -> AppResult<i64> {
        Ok(self.store.accounts.lock().unwrap().len() as i64)
    }

    async fn create(&self, entity: &ClientAccount) -> AppResult<ClientAccount> {
        self.store
            .accounts
            .lock()
            .unwrap()
            .insert(entity.id, entity.clone());
        Ok(entity.clone())
    }

    async fn update(&self, entity: &ClientAccount) -> AppResult<ClientAccount> {
        self.store
            .accounts
            .lock()
            .unwrap()
            .insert(entity.id, entity.clone());
        Ok(entity.clone())
    }
}

#[async_trait]
impl AccountRepository for MemoryAccountRepo {
    async fn find_by_client(
        &self,
        tenant_id: Uuid,
        client_id: Uuid,
    ) -> AppResult<Option<ClientAccount>> {
        Ok(self
            .store
            .accounts
            .lock()
            .unwrap()
            .values()
            .find(|a| a.tenant_id == tenant_id && a.client_id == client_id)
            .cloned())
    }

    async fn find_statement_due(&self, now: DateTime<Utc>) -> AppResult<Vec<ClientAccount>> {
        Ok(self
            .store
            .accounts
            .lock()
            .unwrap()
            .values()
            .filter(|a| {
                a.statement_frequency != StatementFrequency::Manual
                    && a.next_statement_due.is_some_and(|due| due <= now)
            })
            .cloned()
            .collect())
    }

    async fn find_alert_candidates(&self) -> AppResult<Vec<ClientAccount>> {
        Ok(self
            .store
            .accounts
            .lock()
            .unwrap()
            .values()
            .filter(|a| {
                a.alert_amount > Decimal::ZERO
                    && a.balance <= a.alert_amount
                    && !a.alert_triggered
            })
            .cloned()
            .collect())
    }

    async fn mark_alert_sent(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        let mut accounts = self.store.accounts.lock().unwrap();
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| AppError::AccountNotFound(id.to_string()))?;
        account.alert_triggered = true;
        account.last_alert_sent = Some(at);
        Ok(())
    }

    async fn record_statement_sent(
        &self,
        id: Uuid,
        sent_at: DateTime<Utc>,
        next_due: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        let mut accounts = self.store.accounts.lock().unwrap();
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| AppError::AccountNotFound(id.to_string()))?;
        account.last_statement_sent = Some(sent_at);
        account.next_statement_due = next_due;
        Ok(())
    }
}

pub struct MemoryContractRepo {
    store: Arc<MemoryStore>,
}

impl MemoryContractRepo {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Repository<RentalContract, Uuid> for MemoryContractRepo {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<RentalContract>> {
        Ok(self.store.contracts.lock().unwrap().get(&id).cloned())
    }

    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<RentalContract>> {
        Ok(self
            .store
            .contracts
            .lock()
            .unwrap()
            .values()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn count(&self) -> AppResult<i64> {
        Ok(self.store.contracts.lock().unwrap().len() as i64)
    }

    async fn create(&self, entity: &RentalContract) -> AppResult<RentalContract> {
        self.store
            .contracts
            .lock()
            .unwrap()
            .insert(entity.id, entity.clone());
        Ok(entity.clone())
    }

    async fn update(&self, entity: &RentalContract) -> AppResult<RentalContract> {
        self.store
            .contracts
            .lock()
            .unwrap()
            .insert(entity.id, entity.clone());
        Ok(entity.clone())
    }
}

#[async_trait]
impl ContractRepository for MemoryContractRepo {
    async fn update_status(
        &self,
        id: Uuid,
        status: ContractStatus,
        actual_end_date: Option<DateTime<Utc>>,
    ) -> AppResult<RentalContract> {
        let mut contracts = self.store.contracts.lock().unwrap();
        let contract = contracts
            .get_mut(&id)
            .ok_or_else(|| AppError::ContractNotFound(id.to_string()))?;
        contract.status = status;
        if actual_end_date.is_some() {
            contract.actual_end_date = actual_end_date;
        }
        contract.updated_at = Utc::now();
        Ok(contract.clone())
    }
}

pub struct MemoryRentalRepo {
    store: Arc<MemoryStore>,
}

impl MemoryRentalRepo {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    fn contract_is_active(&self, contract_id: Uuid) -> bool {
        self.store
            .contracts
            .lock()
            .unwrap()
            .get(&contract_id)
            .is_some_and(|c| c.status == ContractStatus::Active)
    }

    fn open_by_tracking(&self, tracking: TrackingType) -> Vec<AssetRental> {
        self.store
            .rentals
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.is_open() && r.tracking_type == tracking)
            .cloned()
            .collect::<Vec<_>>()
            .into_iter()
            .filter(|r| self.contract_is_active(r.contract_id))
            .collect()
    }
}

#[async_trait]
impl Repository<AssetRental, Uuid> for MemoryRentalRepo {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<AssetRental>> {
        Ok(self.store.rentals.lock().unwrap().get(&id).cloned())
    }

    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<AssetRental>> {
        Ok(self
            .store
            .rentals
            .lock()
            .unwrap()
            .values()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn count(&self) -> AppResult<i64> {
        Ok(self.store.rentals.lock().unwrap().len() as i64)
    }

    async fn create(&self, entity: &AssetRental) -> AppResult<AssetRental> {
        self.store
            .rentals
            .lock()
            .unwrap()
            .insert(entity.id, entity.clone());
        Ok(entity.clone())
    }

    async fn update(&self, entity: &AssetRental) -> AppResult<AssetRental> {
        self.store
            .rentals
            .lock()
            .unwrap()
            .insert(entity.id, entity.clone());
        Ok(entity.clone())
    }
}

#[async_trait]
impl RentalRepository for MemoryRentalRepo {
    async fn find_open_by_contract(&self, contract_id: Uuid) -> AppResult<Vec<AssetRental>> {
        Ok(self
            .store
            .rentals
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.contract_id == contract_id && r.is_open())
            .cloned()
            .collect())
    }

    async fn find_open_tool_rentals(&self) -> AppResult<Vec<AssetRental>> {
        Ok(self.open_by_tracking(TrackingType::Tool))
    }

    async fn find_open_machinery_rentals(&self) -> AppResult<Vec<AssetRental>> {
        Ok(self.open_by_tracking(TrackingType::Machinery))
    }

    async fn mark_returned(
        &self,
        id: Uuid,
        returned_at: DateTime<Utc>,
        final_hourometer: Option<Decimal>,
        final_odometer: Option<Decimal>,
    ) -> AppResult<AssetRental> {
        let mut rentals = self.store.rentals.lock().unwrap();
        let rental = rentals
            .get_mut(&id)
            .ok_or_else(|| AppError::RentalNotFound(id.to_string()))?;
        if rental.actual_return_date.is_some() {
            return Err(AppError::AlreadyReturned(id));
        }
        rental.actual_return_date = Some(returned_at);
        if let Some(hourometer) = final_hourometer {
            rental.current_hourometer = hourometer;
        }
        if let Some(odometer) = final_odometer {
            rental.current_odometer = odometer;
        }
        rental.updated_at = Utc::now();
        Ok(rental.clone())
    }
}

pub struct MemoryUsageRepo {
    store: Arc<MemoryStore>,
}

impl MemoryUsageRepo {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl UsageRepository for MemoryUsageRepo {
    async fn find_recent_by_rental(
        &self,
        rental_id: Uuid,
        limit: i64,
    ) -> AppResult<Vec<AssetUsage>> {
        let mut recent: Vec<AssetUsage> = self
            .store
            .usages
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.asset_rental_id == rental_id && u.status == UsageStatus::Processed)
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.report_date.cmp(&a.report_date));
        recent.truncate(limit as usize);
        Ok(recent)
    }

    async fn exists_for_date(&self, rental_id: Uuid, date: NaiveDate) -> AppResult<bool> {
        Ok(self
            .store
            .usages
            .lock()
            .unwrap()
            .iter()
            .any(|u| u.asset_rental_id == rental_id && u.report_date == date))
    }
}

// ==================== ledger ====================

/// In-memory ledger with the production semantics: invariant check, audit
/// counters, alert flag, and contract consumption mirroring.
pub struct MemoryLedger {
    store: Arc<MemoryStore>,
}

impl MemoryLedger {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl LedgerService for MemoryLedger {
    async fn apply_movement(&self, movement: NewMovement) -> AppResult<AccountMovement> {
        if self.store.take_write_failure() {
            return Err(AppError::Database("write failed, rolled back".to_string()));
        }
        let mut accounts = self.store.accounts.lock().unwrap();
        let account = accounts
            .get_mut(&movement.account_id)
            .ok_or_else(|| AppError::AccountNotFound(movement.account_id.to_string()))?;

        let (balance_before, balance_after) = account.preview_movement(movement.amount)?;

        let amount = movement.amount;
        let movement_type = movement.movement_type;
        let contract_id = movement.contract_id;
        let record = movement.into_movement(balance_before, balance_after);

        account.balance = balance_after;
        if amount < Decimal::ZERO {
            account.total_consumed += amount.abs();
            if account.alert_amount > Decimal::ZERO
                && balance_after <= account.alert_amount
                && !account.alert_triggered
            {
                account.alert_triggered = true;
                account.last_alert_sent = Some(Utc::now());
            }
        } else if movement_type.is_credit() {
            account.total_reloaded += amount;
        }
        if movement_type == MovementType::CreditReload && balance_after > account.alert_amount {
            account.alert_triggered = false;
        }
        account.updated_at = Utc::now();
        drop(accounts);

        if let Some(contract_id) = contract_id {
            if amount < Decimal::ZERO {
                if let Some(contract) =
                    self.store.contracts.lock().unwrap().get_mut(&contract_id)
                {
                    contract.total_consumed += amount.abs();
                }
            }
        }

        self.store.movements.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn apply_usage_charge(
        &self,
        movement: NewMovement,
        usage: AssetUsage,
    ) -> AppResult<(AccountMovement, AssetUsage)> {
        let rental_id = usage.asset_rental_id;
        if !self.store.rentals.lock().unwrap().contains_key(&rental_id) {
            return Err(AppError::RentalNotFound(rental_id.to_string()));
        }

        let record = self.apply_movement(movement).await?;

        let mut rentals = self.store.rentals.lock().unwrap();
        let rental = rentals
            .get_mut(&rental_id)
            .ok_or_else(|| AppError::RentalNotFound(rental_id.to_string()))?;
        if let Some(end) = usage.hourometer_end {
            rental.current_hourometer = end;
        }
        if let Some(end) = usage.odometer_end {
            rental.current_odometer = end;
        }
        rental.total_hours_used += usage.hours_worked;
        rental.total_km_used += usage.km_traveled;
        rental.total_machinery_cost += usage.machinery_cost;
        rental.total_operator_cost += usage.operator_cost;
        rental.total_cost += usage.total_cost;
        rental.last_charge_date = Some(usage.report_date);
        rental.updated_at = Utc::now();
        drop(rentals);

        self.store.usages.lock().unwrap().push(usage.clone());
        Ok((record, usage))
    }

    async fn apply_tool_charge(
        &self,
        movement: NewMovement,
        charge_date: NaiveDate,
    ) -> AppResult<AccountMovement> {
        let rental_id = movement.asset_rental_id.ok_or_else(|| {
            AppError::InvalidInput("tool charge movement must reference a rental".to_string())
        })?;
        if !self.store.rentals.lock().unwrap().contains_key(&rental_id) {
            return Err(AppError::RentalNotFound(rental_id.to_string()));
        }

        let charged = movement.amount.abs();
        let record = self.apply_movement(movement).await?;

        let mut rentals = self.store.rentals.lock().unwrap();
        let rental = rentals
            .get_mut(&rental_id)
            .ok_or_else(|| AppError::RentalNotFound(rental_id.to_string()))?;
        rental.days_elapsed += 1;
        rental.total_cost += charged;
        rental.last_charge_date = Some(charge_date);
        rental.updated_at = Utc::now();
        Ok(record)
    }

    async fn find_or_open_account(
        &self,
        tenant_id: Uuid,
        business_unit_id: Uuid,
        client_id: Uuid,
    ) -> AppResult<ClientAccount> {
        let mut accounts = self.store.accounts.lock().unwrap();
        if let Some(existing) = accounts
            .values()
            .find(|a| a.tenant_id == tenant_id && a.client_id == client_id)
        {
            return Ok(existing.clone());
        }
        let account = ClientAccount::open(tenant_id, business_unit_id, client_id);
        accounts.insert(account.id, account.clone());
        Ok(account)
    }

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

    async fn get_statement(
        &self,
        account_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> AppResult<AccountStatement> {
        let account = self
            .store
            .accounts
            .lock()
            .unwrap()
            .get(&account_id)
            .cloned()
            .ok_or_else(|| AppError::AccountNotFound(account_id.to_string()))?;

        let mut movements: Vec<AccountMovement> = self
            .store
            .movements
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.account_id == account_id)
            .filter(|m| from.map_or(true, |f| m.created_at >= f))
            .filter(|m| to.map_or(true, |t| m.created_at <= t))
            .cloned()
            .collect();
        movements.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut period_credits = Decimal::ZERO;
        let mut period_charges = Decimal::ZERO;
        for m in &movements {
            if m.amount > Decimal::ZERO {
                period_credits += m.amount;
            } else {
                period_charges += m.amount.abs();
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

// ==================== job coordination ====================

/// Shared lock table standing in for the database advisory locks the
/// production coordinator takes.
#[derive(Default)]
pub struct MemoryJobCoordinator {
    held: Mutex<HashSet<i64>>,
}

#[async_trait]
impl JobCoordinator for MemoryJobCoordinator {
    async fn try_acquire(&self, key: i64) -> AppResult<bool> {
        Ok(self.held.lock().unwrap().insert(key))
    }

    async fn release(&self, key: i64) -> AppResult<()> {
        self.held.lock().unwrap().remove(&key);
        Ok(())
    }
}

// ==================== notification sink ====================

/// Test gate: lets a test park a batch run inside the sink and observe it
/// there before releasing it.
pub struct SinkGate {
    armed: AtomicBool,
    entered: Semaphore,
    released: Semaphore,
}

impl Default for SinkGate {
    fn default() -> Self {
        Self {
            armed: AtomicBool::new(false),
            entered: Semaphore::new(0),
            released: Semaphore::new(0),
        }
    }
}

impl SinkGate {
    pub async fn wait_blocked(&self) {
        self.entered.acquire().await.unwrap().forget();
    }

    pub fn release(&self) {
        self.released.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    async fn pass(&self) {
        if self.armed.load(Ordering::SeqCst) {
            self.entered.add_permits(1);
            self.released.acquire().await.unwrap().forget();
        }
    }
}

/// Records every delivery; optionally blocks on a gate
#[derive(Default)]
pub struct RecordingSink {
    low: Mutex<Vec<Uuid>>,
    stmts: Mutex<Vec<Uuid>>,
    missing: Mutex<Vec<(Uuid, NaiveDate)>>,
    gate: Arc<SinkGate>,
}

impl RecordingSink {
    pub fn low_balances(&self) -> Vec<Uuid> {
        self.low.lock().unwrap().clone()
    }

    pub fn statements(&self) -> Vec<Uuid> {
        self.stmts.lock().unwrap().clone()
    }

    pub fn missing_reports(&self) -> Vec<(Uuid, NaiveDate)> {
        self.missing.lock().unwrap().clone()
    }

    /// Arm the gate and hand back a handle to it
    pub fn gate(&self) -> Arc<SinkGate> {
        self.gate.armed.store(true, Ordering::SeqCst);
        self.gate.clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn low_balance(&self, account: &ClientAccount) -> AppResult<()> {
        self.low.lock().unwrap().push(account.id);
        self.gate.pass().await;
        Ok(())
    }

    async fn statement(
        &self,
        account: &ClientAccount,
        _statement: &AccountStatement,
    ) -> AppResult<()> {
        self.stmts.lock().unwrap().push(account.id);
        self.gate.pass().await;
        Ok(())
    }

    async fn missing_report(&self, rental: &AssetRental, date: NaiveDate) -> AppResult<()> {
        self.missing.lock().unwrap().push((rental.id, date));
        self.gate.pass().await;
        Ok(())
    }
}

// ==================== ledger-level scenario tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_reload_then_charge_then_rejection() {
        let store = Arc::new(MemoryStore::new());
        let ledger = MemoryLedger::new(store.clone());
        let account_id = store.seed_account(dec!(100000));

        // Reload 50000 -> 150000
        let reload = ledger
            .reload_credit(account_id, dec!(50000), "Top up".to_string(), "cx-1".to_string())
            .await
            .unwrap();
        assert_eq!(reload.balance_after, dec!(150000));
        assert!(reload.is_consistent());

        // A 200000 charge on 150000 is rejected, balance untouched
        let err = ledger
            .apply_movement(NewMovement::new(
                account_id,
                MovementType::DailyCharge,
                dec!(-200000),
                "Oversized charge",
                "batch",
            ))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "insufficient_balance");
        assert_eq!(store.account(account_id).balance, dec!(150000));
        assert_eq!(store.movements_for(account_id).len(), 1);
    }

    #[tokio::test]
    async fn test_charge_crossing_threshold_raises_alert() {
        let store = Arc::new(MemoryStore::new());
        let ledger = MemoryLedger::new(store.clone());
        let account_id = store.seed_account(dec!(12000));
        store.set_alert_threshold(account_id, dec!(10000));

        ledger
            .apply_movement(NewMovement::new(
                account_id,
                MovementType::DailyCharge,
                dec!(-5000),
                "Charge",
                "batch",
            ))
            .await
            .unwrap();

        let account = store.account(account_id);
        assert!(account.alert_triggered);
        assert!(account.last_alert_sent.is_some());
    }

    #[tokio::test]
    async fn test_reload_clears_triggered_alert() {
        let store = Arc::new(MemoryStore::new());
        let ledger = MemoryLedger::new(store.clone());
        let account_id = store.seed_account(dec!(5000));
        store.set_alert_threshold(account_id, dec!(10000));

        ledger
            .apply_movement(NewMovement::new(
                account_id,
                MovementType::DailyCharge,
                dec!(-1000),
                "Charge",
                "batch",
            ))
            .await
            .unwrap();
        assert!(store.account(account_id).alert_triggered);

        ledger
            .reload_credit(account_id, dec!(50000), "Top up".to_string(), "cx-1".to_string())
            .await
            .unwrap();
        let account = store.account(account_id);
        assert!(!account.alert_triggered);
        assert_eq!(account.balance, dec!(54000));
    }

    #[tokio::test]
    async fn test_audit_counters_accumulate() {
        let store = Arc::new(MemoryStore::new());
        let ledger = MemoryLedger::new(store.clone());
        let account_id = store.seed_account(dec!(0));

        ledger
            .reload_credit(account_id, dec!(100000), "A".to_string(), "cx".to_string())
            .await
            .unwrap();
        ledger
            .apply_movement(NewMovement::new(
                account_id,
                MovementType::DailyCharge,
                dec!(-30000),
                "B",
                "batch",
            ))
            .await
            .unwrap();
        ledger
            .apply_movement(NewMovement::new(
                account_id,
                MovementType::DailyCharge,
                dec!(-20000),
                "C",
                "batch",
            ))
            .await
            .unwrap();

        let account = store.account(account_id);
        assert_eq!(account.balance, dec!(50000));
        assert_eq!(account.total_reloaded, dec!(100000));
        assert_eq!(account.total_consumed, dec!(50000));

        let statement = ledger.get_statement(account_id, None, None).await.unwrap();
        assert_eq!(statement.period_credits, dec!(100000));
        assert_eq!(statement.period_charges, dec!(50000));
        assert_eq!(statement.movements.len(), 3);
    }

    #[tokio::test]
    async fn test_non_positive_reload_rejected() {
        let store = Arc::new(MemoryStore::new());
        let ledger = MemoryLedger::new(store.clone());
        let account_id = store.seed_account(dec!(0));

        let err = ledger
            .reload_credit(account_id, dec!(0), "Zero".to_string(), "cx".to_string())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "invalid_input");

        let err = ledger
            .reload_credit(account_id, dec!(-100), "Neg".to_string(), "cx".to_string())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "invalid_input");
    }
}
