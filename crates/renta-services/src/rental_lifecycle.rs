//! Contract and rental lifecycle service
//!
//! Owns the contract state machine and the withdrawal/return flow for
//! individual assets. Withdrawals and returns write zero-amount audit
//! markers to the ledger so an account statement shows the full story of
//! each rental, not just its charges.

use chrono::{DateTime, Utc};
use renta_core::{
    models::{
        AssetBillingProfile, AssetRental, ContractStatus, MovementType, NewMovement,
        RentalContract,
    },
    traits::{
        AccountRepository, ContractRepository, LedgerService, RentalRepository, Repository,
    },
    AppError, AppResult,
};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Input for withdrawing an asset under a contract
#[derive(Debug, Clone)]
pub struct WithdrawalRequest {
    pub contract_id: Uuid,
    pub asset_id: Uuid,
    /// Rate configuration from the asset catalog, frozen onto the rental
    pub profile: AssetBillingProfile,
    pub expected_return_date: Option<DateTime<Utc>>,
    pub initial_hourometer: Option<Decimal>,
    pub initial_odometer: Option<Decimal>,
    /// Photos or signed delivery tickets
    pub evidence_urls: Vec<String>,
    pub actor: String,
}

/// Input for returning an asset
#[derive(Debug, Clone)]
pub struct ReturnRequest {
    pub rental_id: Uuid,
    pub final_hourometer: Option<Decimal>,
    pub final_odometer: Option<Decimal>,
    pub evidence_urls: Vec<String>,
    pub actor: String,
}

/// Rental lifecycle service
pub struct RentalLifecycle<C, R, A, L>
where
    C: ContractRepository,
    R: RentalRepository,
    A: AccountRepository,
    L: LedgerService,
{
    contract_repo: Arc<C>,
    rental_repo: Arc<R>,
    account_repo: Arc<A>,
    ledger: Arc<L>,
}

impl<C, R, A, L> RentalLifecycle<C, R, A, L>
where
    C: ContractRepository,
    R: RentalRepository,
    A: AccountRepository,
    L: LedgerService,
{
    /// Create a new lifecycle service
    pub fn new(
        contract_repo: Arc<C>,
        rental_repo: Arc<R>,
        account_repo: Arc<A>,
        ledger: Arc<L>,
    ) -> Self {
        Self {
            contract_repo,
            rental_repo,
            account_repo,
            ledger,
        }
    }

    /// Create a contract for a client, opening their ledger account lazily
    /// if this is their first contract with the tenant.
    #[instrument(skip(self))]
    pub async fn create_contract(
        &self,
        tenant_id: Uuid,
        business_unit_id: Uuid,
        client_id: Uuid,
        estimated_total: Decimal,
    ) -> AppResult<RentalContract> {
        let account = self
            .ledger
            .find_or_open_account(tenant_id, business_unit_id, client_id)
            .await?;

        let contract = RentalContract::new(
            tenant_id,
            business_unit_id,
            account.id,
            client_id,
            estimated_total,
        );
        let contract = self.contract_repo.create(&contract).await?;

        info!(
            "Created contract {} for client {} on account {}",
            contract.id, client_id, account.id
        );
        Ok(contract)
    }

    /// Pause billing on a contract; open rentals stay open but accrue no
    /// new charges while suspended.
    pub async fn suspend_contract(&self, contract_id: Uuid) -> AppResult<RentalContract> {
        self.transition(contract_id, ContractStatus::Suspended).await
    }

    /// Resume billing on a suspended contract.
    pub async fn reactivate_contract(&self, contract_id: Uuid) -> AppResult<RentalContract> {
        self.transition(contract_id, ContractStatus::Active).await
    }

    /// Cancel a contract. Cancellation writes off the contract without the
    /// open-rentals guard; returns are still processed individually.
    pub async fn cancel_contract(&self, contract_id: Uuid) -> AppResult<RentalContract> {
        self.transition(contract_id, ContractStatus::Cancelled).await
    }

    /// Complete a contract. Refused while any rental under it is still
    /// open; the error lists the blocking rentals.
    #[instrument(skip(self))]
    pub async fn complete_contract(&self, contract_id: Uuid) -> AppResult<RentalContract> {
        let contract = self.load_contract(contract_id).await?;

        if !contract.status.can_transition_to(ContractStatus::Completed) {
            return Err(AppError::InvalidTransition {
                from: contract.status.to_string(),
                to: ContractStatus::Completed.to_string(),
            });
        }

        let open_rentals = self.rental_repo.find_open_by_contract(contract_id).await?;
        if !open_rentals.is_empty() {
            return Err(AppError::ActiveRentalsExist {
                contract_id,
                count: open_rentals.len(),
                rental_ids: open_rentals.iter().map(|r| r.id).collect(),
            });
        }

        let contract = self
            .contract_repo
            .update_status(contract_id, ContractStatus::Completed, Some(Utc::now()))
            .await?;

        info!("Completed contract {}", contract_id);
        Ok(contract)
    }

    /// Withdraw an asset under an active contract.
    ///
    /// Freezes the asset's current rates onto the new rental and writes a
    /// zero-amount `withdrawal_start` marker to the ledger. A zero balance
    /// does not block the withdrawal; billing rejects later charges
    /// instead.
    #[instrument(skip(self, request), fields(contract_id = %request.contract_id, asset_id = %request.asset_id))]
    pub async fn withdraw_asset(&self, request: WithdrawalRequest) -> AppResult<AssetRental> {
        let contract = self.load_contract(request.contract_id).await?;
        if !contract.is_active() {
            return Err(AppError::ContractNotActive {
                id: contract.id,
                status: contract.status.to_string(),
            });
        }

        let mut rental = AssetRental::from_profile(
            contract.id,
            contract.account_id,
            request.asset_id,
            &request.profile,
            request.expected_return_date,
        )?;
        if let Some(hourometer) = request.initial_hourometer {
            rental.current_hourometer = hourometer;
        }
        if let Some(odometer) = request.initial_odometer {
            rental.current_odometer = odometer;
        }

        if let Some(account) = self.account_repo.find_by_id(contract.account_id).await? {
            if account.balance <= Decimal::ZERO {
                warn!(
                    "Withdrawing asset {} against account {} with balance {}",
                    request.asset_id, account.id, account.balance
                );
            }
        }

        let rental = self.rental_repo.create(&rental).await?;

        self.ledger
            .apply_movement(
                NewMovement::new(
                    contract.account_id,
                    MovementType::WithdrawalStart,
                    Decimal::ZERO,
                    format!("Asset {} withdrawn", request.asset_id),
                    request.actor,
                )
                .with_contract(contract.id)
                .with_rental(rental.id)
                .with_evidence(request.evidence_urls)
                .with_metadata(json!({
                    "asset_id": request.asset_id,
                    "tracking_type": rental.tracking_type.to_string(),
                    "initial_hourometer": rental.current_hourometer,
                    "initial_odometer": rental.current_odometer,
                })),
            )
            .await?;

        info!(
            "Withdrew asset {} as {} rental {} under contract {}",
            request.asset_id, rental.tracking_type, rental.id, contract.id
        );
        Ok(rental)
    }

    /// Return an asset, closing its rental exactly once.
    ///
    /// Stores the final meter readings and writes a zero-amount
    /// `return_end` marker carrying the rental's aggregate cost.
    #[instrument(skip(self, request), fields(rental_id = %request.rental_id))]
    pub async fn return_asset(&self, request: ReturnRequest) -> AppResult<AssetRental> {
        let rental = self
            .rental_repo
            .mark_returned(
                request.rental_id,
                Utc::now(),
                request.final_hourometer,
                request.final_odometer,
            )
            .await?;

        self.ledger
            .apply_movement(
                NewMovement::new(
                    rental.account_id,
                    MovementType::ReturnEnd,
                    Decimal::ZERO,
                    format!("Asset {} returned", rental.asset_id),
                    request.actor,
                )
                .with_contract(rental.contract_id)
                .with_rental(rental.id)
                .with_evidence(request.evidence_urls)
                .with_metadata(json!({
                    "asset_id": rental.asset_id,
                    "days_elapsed": rental.days_elapsed,
                    "total_hours_used": rental.total_hours_used,
                    "total_km_used": rental.total_km_used,
                    "total_cost": rental.total_cost,
                })),
            )
            .await?;

        info!(
            "Returned rental {} (total charged {})",
            rental.id, rental.total_cost
        );
        Ok(rental)
    }

    async fn transition(
        &self,
        contract_id: Uuid,
        target: ContractStatus,
    ) -> AppResult<RentalContract> {
        let contract = self.load_contract(contract_id).await?;

        if !contract.status.can_transition_to(target) {
            return Err(AppError::InvalidTransition {
                from: contract.status.to_string(),
                to: target.to_string(),
            });
        }

        let contract = self
            .contract_repo
            .update_status(contract_id, target, None)
            .await?;
        info!("Contract {} is now {}", contract_id, target);
        Ok(contract)
    }

    async fn load_contract(&self, contract_id: Uuid) -> AppResult<RentalContract> {
        self.contract_repo
            .find_by_id(contract_id)
            .await?
            .ok_or_else(|| AppError::ContractNotFound(contract_id.to_string()))
    }
}
