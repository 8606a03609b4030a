//! Lifecycle state machine: pause, resume, stop, reactivate and automatic
//! expiry, with their day accounting and audit trail.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::instrument;

use crate::models::{
    ActionType, Subscription, SubscriptionStatus, SubscriptionStatusHistory, SubscriptionView,
    TransitionOutcome,
};
use crate::services::clock::{add_days, days_between};
use crate::services::coverage::CoverageProjector;
use crate::services::engine::EngineContext;
use crate::services::error::ServiceError;
use crate::services::metrics::record_operation;

use SubscriptionStatus::*;

/// Status-changing actions and the states each may start from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Pause,
    Resume,
    Stop,
    Reactivate,
    Expire,
    Cancel,
    ActivateGrace,
    EndGrace,
}

impl LifecycleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleAction::Pause => "pause",
            LifecycleAction::Resume => "resume",
            LifecycleAction::Stop => "stop",
            LifecycleAction::Reactivate => "reactivate",
            LifecycleAction::Expire => "expire",
            LifecycleAction::Cancel => "cancel",
            LifecycleAction::ActivateGrace => "activate grace period for",
            LifecycleAction::EndGrace => "end the grace period of",
        }
    }

    pub fn allowed_from(&self) -> &'static [SubscriptionStatus] {
        match self {
            LifecycleAction::Pause => &[Active],
            LifecycleAction::Resume => &[Paused],
            LifecycleAction::Stop => &[Active, Paused, PendingPayment],
            LifecycleAction::Reactivate => &[Stopped, Expired, Cancelled, PendingPayment],
            LifecycleAction::Expire => &[Active],
            LifecycleAction::Cancel => &[PendingPayment, Active, Paused, Stopped, Expired],
            LifecycleAction::ActivateGrace => &[Active, Expired],
            LifecycleAction::EndGrace => &[Active],
        }
    }

    pub fn ensure_allowed(&self, from: SubscriptionStatus) -> Result<(), ServiceError> {
        if self.allowed_from().contains(&from) {
            Ok(())
        } else {
            Err(ServiceError::InvalidTransition {
                action: self.as_str(),
                from,
            })
        }
    }
}

pub(crate) fn require_actor(actor_id: &str) -> Result<(), ServiceError> {
    if actor_id.trim().is_empty() {
        return Err(ServiceError::Validation("actor id is required".to_string()));
    }
    Ok(())
}

/// Audit entry describing the change from `before` to `after`.
pub(crate) fn history_entry(
    before: &Subscription,
    after: &Subscription,
    action: ActionType,
    actor_id: &str,
    reason: Option<&str>,
    changed_at: DateTime<Utc>,
    today: NaiveDate,
) -> SubscriptionStatusHistory {
    SubscriptionStatusHistory {
        history_id: uuid::Uuid::new_v4().to_string(),
        subscription_id: after.subscription_id.clone(),
        advertiser_id: after.advertiser_id.clone(),
        from_status: before.status,
        to_status: after.status,
        action_type: action,
        changed_at,
        end_date_before: before.end_date,
        end_date_after: after.end_date,
        remaining_days_before: before.remaining_days_on(today),
        remaining_days_after: after.remaining_days_on(today),
        paused_days_before: before.total_paused_days,
        paused_days_after: after.total_paused_days,
        paid_amount: after.paid_amount,
        remaining_amount: after.remaining_amount,
        changed_by: actor_id.to_string(),
        reason: reason.map(str::to_string),
    }
}

/// Persist `after` with a version check and append its history entry.
///
/// Callers must hold the subscription's lock.
pub(crate) async fn commit_transition(
    ctx: &EngineContext,
    before: &Subscription,
    mut after: Subscription,
    action: ActionType,
    actor_id: &str,
    reason: Option<&str>,
) -> Result<Subscription, ServiceError> {
    let now = ctx.now();
    after.updated_utc = now;
    let saved = ctx.store.replace_subscription(&after).await?;

    let entry = history_entry(before, &saved, action, actor_id, reason, now, ctx.today());
    ctx.store.insert_history(&entry).await?;

    tracing::info!(
        subscription_id = %saved.subscription_id,
        from = %before.status,
        to = %saved.status,
        action = %action,
        actor_id = %actor_id,
        "Subscription transitioned"
    );
    Ok(saved)
}

fn non_empty(reason: Option<&str>) -> Option<&str> {
    reason.map(str::trim).filter(|r| !r.is_empty())
}

#[derive(Clone)]
pub struct Lifecycle {
    ctx: Arc<EngineContext>,
    coverage: CoverageProjector,
}

impl Lifecycle {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        let coverage = CoverageProjector::new(ctx.clone());
        Self { ctx, coverage }
    }

    /// Subscription with its derived remaining days.
    pub async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionView, ServiceError> {
        let subscription = self.ctx.load_subscription(subscription_id).await?;
        Ok(SubscriptionView::new(subscription, self.ctx.today()))
    }

    /// Status history of a subscription, oldest first.
    pub async fn history(
        &self,
        subscription_id: &str,
    ) -> Result<Vec<SubscriptionStatusHistory>, ServiceError> {
        self.ctx.load_subscription(subscription_id).await?;
        self.ctx.store.list_history(subscription_id).await
    }

    #[instrument(skip(self, reason), fields(subscription_id = %subscription_id, actor_id = %actor_id))]
    pub async fn pause(
        &self,
        subscription_id: &str,
        actor_id: &str,
        reason: Option<&str>,
    ) -> Result<TransitionOutcome, ServiceError> {
        require_actor(actor_id)?;
        let guard = self.ctx.locks.acquire(subscription_id).await;
        let before = self.ctx.load_subscription(subscription_id).await?;
        LifecycleAction::Pause.ensure_allowed(before.status)?;

        let today = self.ctx.today();
        let mut after = before.clone();
        after.status = Paused;
        after.paused_at = Some(self.ctx.now());
        after.remaining_active_days = Some(days_between(today, before.end_date).max(0));
        after.active_days = Some(days_between(before.start_date, today).max(0));
        if after.original_start_date.is_none() {
            after.original_start_date = Some(before.start_date);
            after.original_end_date = Some(before.end_date);
            after.original_planned_days = Some(before.planned_days);
        }

        let saved = commit_transition(
            &self.ctx,
            &before,
            after,
            ActionType::Pause,
            actor_id,
            non_empty(reason),
        )
        .await?;
        drop(guard);

        record_operation("pause", "success");
        self.coverage.refresh(&saved.advertiser_id).await;
        Ok(TransitionOutcome::from_subscription(&saved, today))
    }

    #[instrument(skip(self, reason), fields(subscription_id = %subscription_id, actor_id = %actor_id))]
    pub async fn resume(
        &self,
        subscription_id: &str,
        actor_id: &str,
        reason: Option<&str>,
    ) -> Result<TransitionOutcome, ServiceError> {
        require_actor(actor_id)?;
        let guard = self.ctx.locks.acquire(subscription_id).await;
        let before = self.ctx.load_subscription(subscription_id).await?;
        LifecycleAction::Resume.ensure_allowed(before.status)?;

        let today = self.ctx.today();
        let paused_on = before
            .paused_at
            .map(|at| self.ctx.clock.local_date(at))
            .unwrap_or(today);
        let pause_days = days_between(paused_on, today).max(0);

        let mut after = before.clone();
        after.status = Active;
        after.end_date = add_days(before.end_date, pause_days);
        // A grace window pauses with the subscription it extends.
        if before.is_in_grace_period {
            after.grace_period_end_date = before
                .grace_period_end_date
                .map(|grace_end| add_days(grace_end, pause_days));
        }
        after.total_paused_days = before.total_paused_days + pause_days;
        after.paused_at = None;
        after.remaining_active_days = None;
        after.active_days = None;

        let saved = commit_transition(
            &self.ctx,
            &before,
            after,
            ActionType::Resume,
            actor_id,
            non_empty(reason),
        )
        .await?;
        drop(guard);

        record_operation("resume", "success");
        self.coverage.refresh(&saved.advertiser_id).await;
        Ok(TransitionOutcome::from_subscription(&saved, today))
    }

    #[instrument(skip(self, reason), fields(subscription_id = %subscription_id, actor_id = %actor_id))]
    pub async fn stop(
        &self,
        subscription_id: &str,
        actor_id: &str,
        reason: &str,
    ) -> Result<TransitionOutcome, ServiceError> {
        require_actor(actor_id)?;
        let reason = non_empty(Some(reason))
            .ok_or_else(|| ServiceError::Validation("a reason is required to stop".to_string()))?;

        let guard = self.ctx.locks.acquire(subscription_id).await;
        let before = self.ctx.load_subscription(subscription_id).await?;
        LifecycleAction::Stop.ensure_allowed(before.status)?;

        let today = self.ctx.today();
        let (days_used, days_wasted) = match before.status {
            Paused => (
                before.active_days.unwrap_or(0),
                before.remaining_active_days.unwrap_or(0),
            ),
            PendingPayment => (0, before.planned_days),
            _ => (
                days_between(before.start_date, today).clamp(0, before.planned_days.max(0)),
                days_between(today, before.end_date).max(0),
            ),
        };

        let mut after = before.clone();
        after.status = Stopped;
        after.actual_end_date = Some(today);
        after.days_used = Some(days_used);
        after.days_wasted = Some(days_wasted);
        after.stop_reason = Some(reason.to_string());
        after.paused_at = None;
        after.is_in_grace_period = false;

        let saved = commit_transition(
            &self.ctx,
            &before,
            after,
            ActionType::Stop,
            actor_id,
            Some(reason),
        )
        .await?;
        drop(guard);

        record_operation("stop", "success");
        self.coverage.refresh(&saved.advertiser_id).await;
        Ok(TransitionOutcome::from_subscription(&saved, today))
    }

    /// Start a new run of the same plan from `start_date` (default today).
    #[instrument(skip(self, reason), fields(subscription_id = %subscription_id, actor_id = %actor_id))]
    pub async fn reactivate(
        &self,
        subscription_id: &str,
        actor_id: &str,
        start_date: Option<NaiveDate>,
        reason: Option<&str>,
    ) -> Result<TransitionOutcome, ServiceError> {
        require_actor(actor_id)?;
        let guard = self.ctx.locks.acquire(subscription_id).await;
        let before = self.ctx.load_subscription(subscription_id).await?;
        LifecycleAction::Reactivate.ensure_allowed(before.status)?;

        let today = self.ctx.today();
        let start = start_date.unwrap_or(today);
        let planned_days = before.reactivation_days();

        let mut after = before.clone();
        after.status = Active;
        after.start_date = start;
        after.end_date = add_days(start, planned_days);
        after.planned_days = planned_days;
        after.paused_at = None;
        after.total_paused_days = 0;
        after.remaining_active_days = None;
        after.active_days = None;
        after.is_in_grace_period = false;
        after.grace_period_end_date = None;
        after.total_grace_extensions = 0;
        after.actual_end_date = None;
        after.days_used = None;
        after.days_wasted = None;
        after.stop_reason = None;
        after.reactivation_count = before.reactivation_count + 1;

        let saved = commit_transition(
            &self.ctx,
            &before,
            after,
            ActionType::Reactivate,
            actor_id,
            non_empty(reason),
        )
        .await?;
        drop(guard);

        record_operation("reactivate", "success");
        self.coverage.refresh(&saved.advertiser_id).await;
        Ok(TransitionOutcome::from_subscription(&saved, today))
    }

    /// Expire an active subscription. Callers must hold its lock.
    pub(crate) async fn expire_locked(
        &self,
        before: &Subscription,
        actor_id: &str,
        reason: Option<&str>,
    ) -> Result<Subscription, ServiceError> {
        LifecycleAction::Expire.ensure_allowed(before.status)?;

        let mut after = before.clone();
        after.status = Expired;
        after.actual_end_date = Some(self.ctx.today());
        after.is_in_grace_period = false;

        commit_transition(&self.ctx, before, after, ActionType::Expire, actor_id, reason).await
    }
}
