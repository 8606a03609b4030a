//! Advertisers and plans.

use std::collections::BTreeSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::instrument;

use crate::models::{
    Advertiser, AdvertiserStatus, CoverageType, CreateAdvertiser, CreatePlan, Plan, PlanCoverage,
    UpdateBillingSettings,
};
use crate::services::engine::EngineContext;
use crate::services::error::ServiceError;
use crate::services::metrics::record_operation;
use crate::services::money::MoneyError;

fn validate_vat(percentage: Decimal) -> Result<(), ServiceError> {
    if percentage < Decimal::ZERO || percentage > Decimal::ONE_HUNDRED {
        return Err(MoneyError::InvalidVat(percentage).into());
    }
    Ok(())
}

#[derive(Clone)]
pub struct Catalog {
    ctx: Arc<EngineContext>,
}

impl Catalog {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_advertiser(
        &self,
        input: CreateAdvertiser,
    ) -> Result<Advertiser, ServiceError> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(ServiceError::Validation("name is required".to_string()));
        }
        validate_vat(input.vat_percentage)?;

        let now = self.ctx.now();
        let advertiser = Advertiser {
            advertiser_id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            phone: input.phone,
            email: input.email,
            status: AdvertiserStatus::Active,
            customer_type: input.customer_type,
            vat_enabled: input.vat_enabled,
            vat_percentage: input.vat_percentage,
            coverage_type: CoverageType::None,
            coverage_cities: Vec::new(),
            created_utc: now,
            updated_utc: now,
        };
        self.ctx.store.insert_advertiser(&advertiser).await?;

        record_operation("create_advertiser", "success");
        tracing::info!(advertiser_id = %advertiser.advertiser_id, "Advertiser created");
        Ok(advertiser)
    }

    pub async fn get_advertiser(&self, advertiser_id: &str) -> Result<Advertiser, ServiceError> {
        self.ctx
            .store
            .get_advertiser(advertiser_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Advertiser", advertiser_id))
    }

    /// Change tier, VAT or account status. Coverage is never taken from here.
    #[instrument(skip(self, update))]
    pub async fn update_billing_settings(
        &self,
        advertiser_id: &str,
        update: UpdateBillingSettings,
    ) -> Result<Advertiser, ServiceError> {
        let _guard = self.ctx.advertiser_locks.acquire(advertiser_id).await;
        let mut advertiser = self.get_advertiser(advertiser_id).await?;

        if let Some(percentage) = update.vat_percentage {
            validate_vat(percentage)?;
            advertiser.vat_percentage = percentage;
        }
        if let Some(enabled) = update.vat_enabled {
            advertiser.vat_enabled = enabled;
        }
        if let Some(customer_type) = update.customer_type {
            advertiser.customer_type = customer_type;
        }
        if let Some(status) = update.status {
            advertiser.status = status;
        }
        advertiser.updated_utc = self.ctx.now();
        self.ctx.store.replace_advertiser(&advertiser).await?;

        record_operation("update_advertiser", "success");
        Ok(advertiser)
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_plan(&self, input: CreatePlan) -> Result<Plan, ServiceError> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(ServiceError::Validation("name is required".to_string()));
        }
        if input.duration_days <= 0 {
            return Err(ServiceError::Validation(
                "duration_days must be greater than zero".to_string(),
            ));
        }
        if input.price < Decimal::ZERO {
            return Err(MoneyError::NegativeAmount {
                field: "price",
                value: input.price,
            }
            .into());
        }

        let cities: BTreeSet<String> = input
            .coverage_cities
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        match input.coverage_type {
            PlanCoverage::City if cities.is_empty() => {
                return Err(ServiceError::Validation(
                    "city plans need at least one city".to_string(),
                ));
            }
            PlanCoverage::Kingdom if !cities.is_empty() => {
                return Err(ServiceError::Validation(
                    "kingdom-wide plans cannot list cities".to_string(),
                ));
            }
            _ => {}
        }

        let now = self.ctx.now();
        let plan = Plan {
            plan_id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: input.description,
            duration_days: input.duration_days,
            price: input.price,
            coverage_type: input.coverage_type,
            coverage_cities: cities.into_iter().collect(),
            is_active: true,
            created_utc: now,
            updated_utc: now,
        };
        self.ctx.store.insert_plan(&plan).await?;

        record_operation("create_plan", "success");
        tracing::info!(plan_id = %plan.plan_id, "Plan created");
        Ok(plan)
    }

    pub async fn get_plan(&self, plan_id: &str) -> Result<Plan, ServiceError> {
        self.ctx
            .store
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Plan", plan_id))
    }

    /// Withdraw a plan from sale. Existing subscriptions keep their terms.
    #[instrument(skip(self))]
    pub async fn deactivate_plan(&self, plan_id: &str) -> Result<Plan, ServiceError> {
        let mut plan = self.get_plan(plan_id).await?;
        if plan.is_active {
            plan.is_active = false;
            plan.updated_utc = self.ctx.now();
            self.ctx.store.replace_plan(&plan).await?;
            record_operation("deactivate_plan", "success");
        }
        Ok(plan)
    }
}
