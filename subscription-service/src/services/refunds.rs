//! Manual refund decisions. Refunds never change subscription or invoice
//! balances.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::instrument;

use crate::models::{CreateRefund, Refund, RefundStatus};
use crate::services::engine::EngineContext;
use crate::services::error::ServiceError;
use crate::services::lifecycle::require_actor;
use crate::services::metrics::record_operation;

#[derive(Clone)]
pub struct Refunds {
    ctx: Arc<EngineContext>,
}

impl Refunds {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Open a pending refund of at most the paid amount not already claimed
    /// by other non-rejected refunds.
    #[instrument(skip(self, input), fields(subscription_id = %input.subscription_id, amount = %input.amount))]
    pub async fn create_refund(&self, input: CreateRefund) -> Result<Refund, ServiceError> {
        require_actor(&input.actor_id)?;
        if input.amount <= Decimal::ZERO {
            return Err(ServiceError::Validation(
                "refund amount must be greater than zero".to_string(),
            ));
        }
        let reason = input.reason.trim();
        if reason.is_empty() {
            return Err(ServiceError::Validation(
                "a reason is required for refunds".to_string(),
            ));
        }

        let _guard = self.ctx.locks.acquire(&input.subscription_id).await;
        let subscription = self.ctx.load_subscription(&input.subscription_id).await?;

        if let Some(invoice_id) = &input.invoice_id {
            let invoice = self
                .ctx
                .store
                .get_invoice(invoice_id)
                .await?
                .ok_or_else(|| ServiceError::not_found("Invoice", invoice_id))?;
            if invoice.subscription_id != subscription.subscription_id {
                return Err(ServiceError::Validation(format!(
                    "invoice '{}' does not belong to subscription '{}'",
                    invoice_id, subscription.subscription_id
                )));
            }
        }
        if let Some(payment_id) = &input.payment_id {
            let payments = self
                .ctx
                .store
                .list_payments_by_subscription(&subscription.subscription_id)
                .await?;
            let payment = payments
                .iter()
                .find(|p| &p.payment_id == payment_id)
                .ok_or_else(|| ServiceError::not_found("Payment", payment_id))?;
            if input.amount > payment.amount {
                return Err(ServiceError::ExceedsBalance {
                    amount: input.amount,
                    remaining: payment.amount,
                });
            }
        }

        let committed: Decimal = self
            .ctx
            .store
            .list_refunds_by_subscription(&subscription.subscription_id)
            .await?
            .iter()
            .filter(|r| r.status.is_committed())
            .map(|r| r.amount)
            .sum();
        let refundable = (subscription.paid_amount - committed).max(Decimal::ZERO);
        if input.amount > refundable {
            return Err(ServiceError::ExceedsBalance {
                amount: input.amount,
                remaining: refundable,
            });
        }

        let now = self.ctx.now();
        let refund = Refund {
            refund_id: uuid::Uuid::new_v4().to_string(),
            subscription_id: subscription.subscription_id.clone(),
            advertiser_id: subscription.advertiser_id.clone(),
            invoice_id: input.invoice_id,
            payment_id: input.payment_id,
            amount: input.amount,
            reason: reason.to_string(),
            status: RefundStatus::Pending,
            requested_by: input.actor_id,
            decided_by: None,
            created_utc: now,
            updated_utc: now,
        };
        self.ctx.store.insert_refund(&refund).await?;

        record_operation("create_refund", "success");
        tracing::info!(
            refund_id = %refund.refund_id,
            subscription_id = %refund.subscription_id,
            amount = %refund.amount,
            "Refund requested"
        );
        Ok(refund)
    }

    #[instrument(skip(self))]
    pub async fn get_refund(&self, refund_id: &str) -> Result<Refund, ServiceError> {
        self.ctx
            .store
            .get_refund(refund_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Refund", refund_id))
    }

    /// Move a refund along `pending -> approved | rejected`, `approved -> processed`.
    #[instrument(skip(self), fields(status = status.as_str()))]
    pub async fn update_status(
        &self,
        refund_id: &str,
        status: RefundStatus,
        actor_id: &str,
    ) -> Result<Refund, ServiceError> {
        require_actor(actor_id)?;
        let mut refund = self.get_refund(refund_id).await?;
        let _guard = self.ctx.locks.acquire(&refund.subscription_id).await;
        refund = self.get_refund(refund_id).await?;

        if !refund.status.can_move_to(status) {
            return Err(ServiceError::Validation(format!(
                "refund cannot move from '{}' to '{}'",
                refund.status.as_str(),
                status.as_str()
            )));
        }

        refund.status = status;
        refund.decided_by = Some(actor_id.to_string());
        refund.updated_utc = self.ctx.now();
        self.ctx.store.replace_refund(&refund).await?;

        record_operation("update_refund", status.as_str());
        tracing::info!(
            refund_id = %refund_id,
            status = status.as_str(),
            actor_id = %actor_id,
            "Refund status updated"
        );
        Ok(refund)
    }
}
