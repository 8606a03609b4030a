//! Grace periods: admin-granted, cost-free extensions of a subscription's
//! visibility window.

use std::sync::Arc;

use tracing::instrument;

use crate::models::{
    ActionType, GracePeriodExtension, GraceState, Subscription, SubscriptionStatus,
};
use crate::services::clock::add_days;
use crate::services::coverage::CoverageProjector;
use crate::services::engine::EngineContext;
use crate::services::error::ServiceError;
use crate::services::lifecycle::{commit_transition, require_actor, LifecycleAction};
use crate::services::metrics::record_operation;

#[derive(Clone)]
pub struct GracePeriods {
    ctx: Arc<EngineContext>,
    coverage: CoverageProjector,
}

impl GracePeriods {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        let coverage = CoverageProjector::new(ctx.clone());
        Self { ctx, coverage }
    }

    /// Extend the subscription by `days`, stacking on an existing grace window.
    #[instrument(skip(self, reason), fields(subscription_id = %subscription_id, actor_id = %actor_id))]
    pub async fn activate(
        &self,
        subscription_id: &str,
        actor_id: &str,
        days: i64,
        reason: Option<&str>,
    ) -> Result<GraceState, ServiceError> {
        require_actor(actor_id)?;
        let guard = self.ctx.locks.acquire(subscription_id).await;
        let before = self.ctx.load_subscription(subscription_id).await?;
        let saved = self.activate_locked(&before, actor_id, days, reason).await?;
        drop(guard);

        record_operation("grace_activate", "success");
        self.coverage.refresh(&saved.advertiser_id).await;
        Ok(GraceState::from(&saved))
    }

    /// End the current grace window and expire the subscription.
    #[instrument(skip(self, reason), fields(subscription_id = %subscription_id, actor_id = %actor_id))]
    pub async fn end(
        &self,
        subscription_id: &str,
        actor_id: &str,
        reason: Option<&str>,
    ) -> Result<GraceState, ServiceError> {
        require_actor(actor_id)?;
        let guard = self.ctx.locks.acquire(subscription_id).await;
        let before = self.ctx.load_subscription(subscription_id).await?;
        let saved = self.end_locked(&before, actor_id, reason).await?;
        drop(guard);

        record_operation("grace_end", "success");
        self.coverage.refresh(&saved.advertiser_id).await;
        Ok(GraceState::from(&saved))
    }

    pub(crate) async fn activate_locked(
        &self,
        before: &Subscription,
        actor_id: &str,
        days: i64,
        reason: Option<&str>,
    ) -> Result<Subscription, ServiceError> {
        if days <= 0 {
            return Err(ServiceError::Validation(
                "grace period days must be greater than zero".to_string(),
            ));
        }
        LifecycleAction::ActivateGrace.ensure_allowed(before.status)?;

        let previous_end = match (before.is_in_grace_period, before.grace_period_end_date) {
            (true, Some(grace_end)) => grace_end,
            _ => before.end_date,
        };
        let new_end = add_days(previous_end, days);
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());

        let mut after = before.clone();
        after.status = SubscriptionStatus::Active;
        after.is_in_grace_period = true;
        after.grace_period_end_date = Some(new_end);
        after.end_date = new_end;
        after.actual_end_date = None;
        after.total_grace_extensions = before.total_grace_extensions + 1;
        after.grace_period_extensions.push(GracePeriodExtension {
            days_added: days,
            previous_end_date: previous_end,
            new_end_date: new_end,
            extended_by: actor_id.to_string(),
            reason: reason.map(str::to_string),
            extended_at: self.ctx.now(),
        });

        commit_transition(
            &self.ctx,
            before,
            after,
            ActionType::GraceActivate,
            actor_id,
            reason,
        )
        .await
    }

    pub(crate) async fn end_locked(
        &self,
        before: &Subscription,
        actor_id: &str,
        reason: Option<&str>,
    ) -> Result<Subscription, ServiceError> {
        LifecycleAction::EndGrace.ensure_allowed(before.status)?;
        if !before.is_in_grace_period {
            return Err(ServiceError::InvalidTransition {
                action: LifecycleAction::EndGrace.as_str(),
                from: before.status,
            });
        }

        let mut after = before.clone();
        after.status = SubscriptionStatus::Expired;
        after.is_in_grace_period = false;
        after.actual_end_date = Some(self.ctx.today());

        commit_transition(
            &self.ctx,
            before,
            after,
            ActionType::GraceEnd,
            actor_id,
            reason.map(str::trim).filter(|r| !r.is_empty()),
        )
        .await
    }
}
