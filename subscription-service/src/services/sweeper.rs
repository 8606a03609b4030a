//! Automatic expiry sweep, driven by an external scheduler.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::instrument;

use crate::models::{Subscription, SubscriptionStatus, SweepReport};
use crate::services::coverage::CoverageProjector;
use crate::services::engine::EngineContext;
use crate::services::error::ServiceError;
use crate::services::grace::GracePeriods;
use crate::services::lifecycle::Lifecycle;
use crate::services::metrics::record_sweep_outcome;
use crate::services::notifier::{notify_best_effort, Notification, NotificationChannel};

const SYSTEM_ACTOR: &str = "system";

enum SweepOutcome {
    Expired,
    GraceActivated(i64),
    GraceEnded,
    /// Already handled by a concurrent sweep or admin action.
    Skipped,
}

#[derive(Clone)]
pub struct ExpirySweeper {
    ctx: Arc<EngineContext>,
    lifecycle: Lifecycle,
    grace: GracePeriods,
    coverage: CoverageProjector,
}

impl ExpirySweeper {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self {
            lifecycle: Lifecycle::new(ctx.clone()),
            grace: GracePeriods::new(ctx.clone()),
            coverage: CoverageProjector::new(ctx.clone()),
            ctx,
        }
    }

    /// Expire or grace every active subscription whose end date has passed.
    ///
    /// Paid subscriptions expire; unpaid ones get an automatic grace period
    /// sized by customer tier; lapsed grace periods end. Running it twice in a
    /// row changes nothing the second time.
    #[instrument(skip(self))]
    pub async fn sweep_expirations(&self) -> Result<SweepReport, ServiceError> {
        let today = self.ctx.today();
        let due = self.ctx.store.due_for_sweep(today).await?;
        let mut report = SweepReport::default();

        tracing::info!(due = due.len(), today = %today, "Starting expiry sweep");

        for candidate in due {
            let subscription_id = candidate.subscription_id.clone();
            match self.sweep_one(&candidate).await {
                Ok((outcome, subscription)) => {
                    match outcome {
                        SweepOutcome::Expired => {
                            report.expired.push(subscription_id);
                            self.notify(&subscription, "Your subscription has expired.")
                                .await;
                        }
                        SweepOutcome::GraceActivated(days) => {
                            report.grace_activated.push(subscription_id);
                            let message = format!(
                                "Your subscription ended without payment. It stays visible for a {}-day grace period.",
                                days
                            );
                            self.notify(&subscription, &message).await;
                        }
                        SweepOutcome::GraceEnded => {
                            report.grace_ended.push(subscription_id);
                            self.notify(&subscription, "Your grace period has ended.")
                                .await;
                        }
                        SweepOutcome::Skipped => continue,
                    }
                    self.coverage.refresh(&subscription.advertiser_id).await;
                }
                Err(e) => {
                    tracing::warn!(
                        subscription_id = %subscription_id,
                        error = %e,
                        "Sweep failed for subscription"
                    );
                    report.failed.push(subscription_id);
                }
            }
        }

        record_sweep_outcome("expired", report.expired.len());
        record_sweep_outcome("grace_activated", report.grace_activated.len());
        record_sweep_outcome("grace_ended", report.grace_ended.len());
        record_sweep_outcome("failed", report.failed.len());

        tracing::info!(
            expired = report.expired.len(),
            grace_activated = report.grace_activated.len(),
            grace_ended = report.grace_ended.len(),
            failed = report.failed.len(),
            "Expiry sweep finished"
        );
        Ok(report)
    }

    async fn sweep_one(
        &self,
        candidate: &Subscription,
    ) -> Result<(SweepOutcome, Subscription), ServiceError> {
        let _guard = self.ctx.locks.acquire(&candidate.subscription_id).await;
        let current = self.ctx.load_subscription(&candidate.subscription_id).await?;
        let today = self.ctx.today();

        if current.status != SubscriptionStatus::Active || current.end_date >= today {
            return Ok((SweepOutcome::Skipped, current));
        }

        if current.is_in_grace_period {
            let lapsed = current
                .grace_period_end_date
                .map_or(true, |grace_end| grace_end < today);
            if !lapsed {
                return Ok((SweepOutcome::Skipped, current));
            }
            let saved = self
                .grace
                .end_locked(&current, SYSTEM_ACTOR, Some("grace period elapsed"))
                .await?;
            return Ok((SweepOutcome::GraceEnded, saved));
        }

        if current.paid_amount > Decimal::ZERO {
            let saved = self
                .lifecycle
                .expire_locked(&current, SYSTEM_ACTOR, Some("end date passed"))
                .await?;
            return Ok((SweepOutcome::Expired, saved));
        }

        let customer_type = self
            .ctx
            .store
            .get_advertiser(&current.advertiser_id)
            .await?
            .map(|a| a.customer_type)
            .unwrap_or_default();
        let days = self.ctx.settings.grace_days.for_customer(customer_type);
        let reason = format!("automatic {} grace period", customer_type.as_str());
        let saved = self
            .grace
            .activate_locked(&current, SYSTEM_ACTOR, days, Some(reason.as_str()))
            .await?;
        Ok((SweepOutcome::GraceActivated(days), saved))
    }

    async fn notify(&self, subscription: &Subscription, message: &str) {
        let notification = Notification {
            advertiser_id: subscription.advertiser_id.clone(),
            channel: NotificationChannel::Sms,
            message: message.to_string(),
        };
        notify_best_effort(
            self.ctx.notifier.as_ref(),
            &notification,
            self.ctx.settings.notifier_timeout,
        )
        .await;
    }
}
