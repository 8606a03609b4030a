//! Advertiser deletion as a resumable saga.
//!
//! Children are deleted before the parent. Progress is persisted after every
//! step; a failure before anything was deleted restores the advertiser's
//! previous status.

use std::sync::Arc;

use tracing::instrument;

use crate::models::{
    AdvertiserStatus, CascadeRecord, CascadeStatus, CascadeStep, CascadeStepResult, CoverageType,
};
use crate::services::coverage::CoverageProjector;
use crate::services::engine::EngineContext;
use crate::services::error::ServiceError;
use crate::services::lifecycle::require_actor;
use crate::services::metrics::record_operation;

#[derive(Clone)]
pub struct DeletionCascade {
    ctx: Arc<EngineContext>,
    coverage: CoverageProjector,
}

impl DeletionCascade {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        let coverage = CoverageProjector::new(ctx.clone());
        Self { ctx, coverage }
    }

    /// Start deleting an advertiser and everything that belongs to it.
    #[instrument(skip(self), fields(advertiser_id = %advertiser_id, actor_id = %actor_id))]
    pub async fn delete_advertiser(
        &self,
        advertiser_id: &str,
        actor_id: &str,
    ) -> Result<CascadeRecord, ServiceError> {
        require_actor(actor_id)?;
        self.ctx
            .store
            .get_advertiser(advertiser_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Advertiser", advertiser_id))?;

        let now = self.ctx.now();
        let record = CascadeRecord {
            cascade_id: uuid::Uuid::new_v4().to_string(),
            advertiser_id: advertiser_id.to_string(),
            status: CascadeStatus::InProgress,
            completed_steps: Vec::new(),
            failed_step: None,
            error: None,
            previous_advertiser_status: None,
            requested_by: actor_id.to_string(),
            created_utc: now,
            updated_utc: now,
        };
        self.ctx.store.save_cascade(&record).await?;

        tracing::info!(cascade_id = %record.cascade_id, "Advertiser deletion started");
        self.run(record).await
    }

    pub async fn get_cascade(&self, cascade_id: &str) -> Result<CascadeRecord, ServiceError> {
        self.ctx
            .store
            .get_cascade(cascade_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Cascade", cascade_id))
    }

    /// Continue a failed or compensated cascade from its first incomplete step.
    #[instrument(skip(self))]
    pub async fn resume_cascade(&self, cascade_id: &str) -> Result<CascadeRecord, ServiceError> {
        let mut record = self.get_cascade(cascade_id).await?;
        if record.status == CascadeStatus::Completed {
            return Ok(record);
        }

        record.status = CascadeStatus::InProgress;
        record.failed_step = None;
        record.error = None;
        record.updated_utc = self.ctx.now();
        self.ctx.store.save_cascade(&record).await?;

        tracing::info!(
            cascade_id = %cascade_id,
            pending = record.pending_steps().len(),
            "Resuming advertiser deletion"
        );
        self.run(record).await
    }

    async fn run(&self, mut record: CascadeRecord) -> Result<CascadeRecord, ServiceError> {
        for step in record.pending_steps() {
            match self.execute(step, &mut record).await {
                Ok(deleted) => {
                    let now = self.ctx.now();
                    record.completed_steps.push(CascadeStepResult {
                        step,
                        deleted,
                        completed_utc: now,
                    });
                    record.updated_utc = now;
                    self.ctx.store.save_cascade(&record).await?;
                    tracing::info!(
                        cascade_id = %record.cascade_id,
                        step = step.as_str(),
                        deleted = deleted,
                        "Cascade step completed"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        cascade_id = %record.cascade_id,
                        step = step.as_str(),
                        error = %e,
                        "Cascade step failed"
                    );
                    record.failed_step = Some(step);
                    record.error = Some(e.to_string());
                    record.status = CascadeStatus::Failed;

                    let destroyed = record.completed_steps.iter().any(|r| r.step.is_destructive());
                    if !destroyed {
                        self.compensate(&mut record).await;
                    }

                    record.updated_utc = self.ctx.now();
                    self.ctx.store.save_cascade(&record).await?;
                    record_operation("delete_advertiser", record.status.as_str());
                    return Ok(record);
                }
            }
        }

        record.status = CascadeStatus::Completed;
        record.updated_utc = self.ctx.now();
        self.ctx.store.save_cascade(&record).await?;

        record_operation("delete_advertiser", "completed");
        tracing::info!(
            cascade_id = %record.cascade_id,
            advertiser_id = %record.advertiser_id,
            deleted = record.total_deleted(),
            "Advertiser deletion completed"
        );
        Ok(record)
    }

    async fn execute(
        &self,
        step: CascadeStep,
        record: &mut CascadeRecord,
    ) -> Result<u64, ServiceError> {
        let store = &self.ctx.store;
        let advertiser_id = record.advertiser_id.clone();
        let advertiser_id = advertiser_id.as_str();

        match step {
            CascadeStep::DeactivateAdvertiser => {
                let _guard = self.ctx.advertiser_locks.acquire(advertiser_id).await;
                let mut advertiser = store
                    .get_advertiser(advertiser_id)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Advertiser", advertiser_id))?;
                if record.previous_advertiser_status.is_none() {
                    record.previous_advertiser_status = Some(advertiser.status);
                }
                advertiser.status = AdvertiserStatus::Inactive;
                advertiser.coverage_type = CoverageType::None;
                advertiser.coverage_cities.clear();
                advertiser.updated_utc = self.ctx.now();
                store.replace_advertiser(&advertiser).await?;
                Ok(1)
            }
            CascadeStep::Payments => store.delete_payments_by_advertiser(advertiser_id).await,
            CascadeStep::Invoices => store.delete_invoices_by_advertiser(advertiser_id).await,
            CascadeStep::Refunds => store.delete_refunds_by_advertiser(advertiser_id).await,
            CascadeStep::StatusHistory => store.delete_history_by_advertiser(advertiser_id).await,
            CascadeStep::Subscriptions => {
                store.delete_subscriptions_by_advertiser(advertiser_id).await
            }
            CascadeStep::Advertiser => store.delete_advertiser(advertiser_id).await,
        }
    }

    /// Undo the deactivation so the advertiser is left as it was.
    async fn compensate(&self, record: &mut CascadeRecord) {
        if record.is_step_done(CascadeStep::DeactivateAdvertiser) {
            let Some(previous) = record.previous_advertiser_status else {
                return;
            };
            let guard = self.ctx.advertiser_locks.acquire(&record.advertiser_id).await;
            let restored = match self.ctx.store.get_advertiser(&record.advertiser_id).await {
                Ok(Some(mut advertiser)) => {
                    advertiser.status = previous;
                    advertiser.updated_utc = self.ctx.now();
                    self.ctx.store.replace_advertiser(&advertiser).await
                }
                Ok(None) => Err(ServiceError::not_found("Advertiser", &record.advertiser_id)),
                Err(e) => Err(e),
            };
            drop(guard);

            if let Err(e) = restored {
                tracing::error!(
                    cascade_id = %record.cascade_id,
                    error = %e,
                    "Compensation failed, advertiser left inactive"
                );
                return;
            }
            record
                .completed_steps
                .retain(|r| r.step != CascadeStep::DeactivateAdvertiser);
            self.coverage.refresh(&record.advertiser_id).await;
        }

        record.status = CascadeStatus::Compensated;
        tracing::warn!(
            cascade_id = %record.cascade_id,
            advertiser_id = %record.advertiser_id,
            "Advertiser deletion rolled back"
        );
    }
}
