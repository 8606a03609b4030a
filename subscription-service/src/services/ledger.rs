//! Ledger coordinator: keeps a subscription's balance, its invoices and its
//! payment records consistent.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use backoff::future::retry;
use backoff::ExponentialBackoff;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::instrument;

use crate::models::{
    ActionType, CancellationOutcome, CreateSubscription, CreatedSubscription, FinancialSummary,
    Invoice, InvoiceStatus, Payment, PaymentStatus, PlanCoverage, RecordPayment, RefundStatus,
    Subscription, SubscriptionStatus,
};
use crate::services::clock::{add_days, days_between};
use crate::services::coverage::CoverageProjector;
use crate::services::engine::EngineContext;
use crate::services::error::ServiceError;
use crate::services::lifecycle::{commit_transition, history_entry, require_actor, LifecycleAction};
use crate::services::metrics::{record_operation, record_payment, record_side_effect_failure};
use crate::services::money::{
    calculate_discount, calculate_vat, paid_tolerance, payment_status, prorated_refund,
    remaining_balance,
};

#[derive(Clone)]
pub struct Ledger {
    ctx: Arc<EngineContext>,
    coverage: CoverageProjector,
}

impl Ledger {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        let coverage = CoverageProjector::new(ctx.clone());
        Self { ctx, coverage }
    }

    /// Create a subscription, its invoice and, when paid up front, its first
    /// payment.
    #[instrument(skip(self, input), fields(advertiser_id = %input.advertiser_id, plan_id = %input.plan_id))]
    pub async fn create_subscription(
        &self,
        input: CreateSubscription,
    ) -> Result<CreatedSubscription, ServiceError> {
        require_actor(&input.actor_id)?;

        let advertiser = self
            .ctx
            .store
            .get_advertiser(&input.advertiser_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Advertiser", &input.advertiser_id))?;
        let plan = self
            .ctx
            .store
            .get_plan(&input.plan_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Plan", &input.plan_id))?;
        if !plan.is_active {
            return Err(ServiceError::Validation(format!(
                "plan '{}' is no longer available",
                plan.plan_id
            )));
        }

        let coverage_cities = resolve_cities(
            plan.coverage_type,
            &plan.coverage_cities,
            input.coverage_cities.as_deref(),
        )?;

        let now = self.ctx.now();
        let today = self.ctx.today();
        let start_date = input.start_date.unwrap_or(today);
        let end_date = add_days(start_date, plan.duration_days);

        let (discount_type, discount_amount) = input
            .discount
            .map(|d| (d.discount_type, d.amount))
            .unwrap_or_default();
        let discount = calculate_discount(plan.price, discount_type, discount_amount)?;

        let vat_percentage = input
            .vat_override
            .unwrap_or_else(|| advertiser.effective_vat_percentage());
        let vat = calculate_vat(discount.total_amount, vat_percentage)?;
        let total_amount = vat.total_with_vat;

        let paid_amount = match &input.initial_payment {
            Some(payment) => {
                if payment.amount <= Decimal::ZERO {
                    return Err(ServiceError::Validation(
                        "initial payment must be greater than zero".to_string(),
                    ));
                }
                if payment.payment_method.trim().is_empty() {
                    return Err(ServiceError::Validation(
                        "payment_method is required".to_string(),
                    ));
                }
                if payment.amount > total_amount {
                    return Err(ServiceError::ExceedsBalance {
                        amount: payment.amount,
                        remaining: total_amount,
                    });
                }
                payment.amount
            }
            None => Decimal::ZERO,
        };

        let status = if paid_amount >= self.ctx.settings.activation_threshold {
            SubscriptionStatus::Active
        } else {
            SubscriptionStatus::PendingPayment
        };
        let sub_payment_status = payment_status(total_amount, paid_amount);

        let subscription = Subscription {
            subscription_id: uuid::Uuid::new_v4().to_string(),
            advertiser_id: advertiser.advertiser_id.clone(),
            plan_id: plan.plan_id.clone(),
            start_date,
            end_date,
            planned_days: plan.duration_days,
            base_price: plan.price,
            discount_type,
            discount_amount,
            discount_value: discount.discount_value,
            vat_percentage,
            vat_amount: vat.vat_amount,
            total_amount,
            paid_amount,
            remaining_amount: remaining_balance(total_amount, paid_amount),
            status,
            payment_status: sub_payment_status,
            coverage_type: plan.coverage_type,
            coverage_cities,
            paused_at: None,
            total_paused_days: 0,
            remaining_active_days: None,
            active_days: None,
            original_start_date: None,
            original_end_date: None,
            original_planned_days: None,
            actual_end_date: None,
            days_used: None,
            days_wasted: None,
            stop_reason: None,
            cancelled_at: None,
            cancellation_reason: None,
            reactivation_count: 0,
            is_in_grace_period: false,
            grace_period_end_date: None,
            grace_period_extensions: Vec::new(),
            total_grace_extensions: 0,
            version: 0,
            created_by: input.actor_id.clone(),
            created_utc: now,
            updated_utc: now,
        };

        let invoice_id = uuid::Uuid::new_v4().to_string();
        let invoice_status = match sub_payment_status {
            PaymentStatus::Paid => InvoiceStatus::Paid,
            PaymentStatus::Partial => InvoiceStatus::Partial,
            PaymentStatus::Pending => InvoiceStatus::Unpaid,
        };
        let invoice = Invoice {
            invoice_number: invoice_number(&invoice_id, today),
            invoice_id: invoice_id.clone(),
            subscription_id: subscription.subscription_id.clone(),
            advertiser_id: advertiser.advertiser_id.clone(),
            subtotal: discount.total_amount,
            vat_percentage,
            vat_amount: vat.vat_amount,
            amount: total_amount,
            status: invoice_status,
            issued_date: today,
            due_date: add_days(today, self.ctx.settings.invoice_due_days),
            paid_date: (invoice_status == InvoiceStatus::Paid).then_some(today),
            created_utc: now,
            updated_utc: now,
        };

        // Balance and its payment record go first; the invoice follows.
        self.ctx.store.insert_subscription(&subscription).await?;

        let payment = match input.initial_payment {
            Some(initial) => {
                let payment = Payment {
                    payment_id: uuid::Uuid::new_v4().to_string(),
                    subscription_id: subscription.subscription_id.clone(),
                    advertiser_id: advertiser.advertiser_id.clone(),
                    invoice_id: Some(invoice_id.clone()),
                    amount: initial.amount,
                    payment_date: today,
                    payment_method: initial.payment_method,
                    transaction_id: initial.transaction_id,
                    recorded_by: input.actor_id.clone(),
                    created_utc: now,
                };
                self.append_payment(&payment).await?;
                Some(payment)
            }
            None => None,
        };

        self.write_after_balance("insert_invoice", &subscription.subscription_id, || {
            self.ctx.store.insert_invoice(&invoice)
        })
        .await;

        record_operation("create_subscription", "success");
        tracing::info!(
            subscription_id = %subscription.subscription_id,
            invoice_id = %invoice_id,
            status = %subscription.status,
            total_amount = %total_amount,
            paid_amount = %paid_amount,
            "Subscription created"
        );

        self.coverage.refresh(&advertiser.advertiser_id).await;

        Ok(CreatedSubscription {
            subscription_id: subscription.subscription_id.clone(),
            invoice_id,
            payment_id: payment.map(|p| p.payment_id),
            subscription,
        })
    }

    /// Record a payment against a subscription and its open invoice.
    ///
    /// The subscription balance is written first, then the invoice, and the
    /// payment record last.
    #[instrument(skip(self, input), fields(subscription_id = %input.subscription_id, amount = %input.amount))]
    pub async fn record_payment(&self, input: RecordPayment) -> Result<Payment, ServiceError> {
        require_actor(&input.actor_id)?;
        if input.amount <= Decimal::ZERO {
            return Err(ServiceError::Validation(
                "payment amount must be greater than zero".to_string(),
            ));
        }
        if input.payment_method.trim().is_empty() {
            return Err(ServiceError::Validation(
                "payment method is required".to_string(),
            ));
        }

        let guard = self.ctx.locks.acquire(&input.subscription_id).await;
        let before = self.ctx.load_subscription(&input.subscription_id).await?;

        if before.status == SubscriptionStatus::Cancelled {
            return Err(ServiceError::InvalidTransition {
                action: "record a payment for",
                from: before.status,
            });
        }
        if input.amount > before.remaining_amount {
            return Err(ServiceError::ExceedsBalance {
                amount: input.amount,
                remaining: before.remaining_amount,
            });
        }

        let now = self.ctx.now();
        let today = self.ctx.today();
        let payment_date = input.payment_date.unwrap_or(today);

        let mut after = before.clone();
        after.paid_amount = before.paid_amount + input.amount;
        after.remaining_amount = remaining_balance(after.total_amount, after.paid_amount);
        after.payment_status = payment_status(after.total_amount, after.paid_amount);

        let activates = before.status == SubscriptionStatus::PendingPayment
            && after.paid_amount >= self.ctx.settings.activation_threshold;
        if activates {
            after.status = SubscriptionStatus::Active;
        }
        after.updated_utc = now;

        // Everything that can fail on a read happens before the balance moves.
        let invoice = self
            .resolve_invoice(&before.subscription_id, input.invoice_id.as_deref())
            .await?;
        let invoice = match invoice {
            Some(mut invoice) => {
                let previous: Decimal = self
                    .ctx
                    .store
                    .list_payments_by_invoice(&invoice.invoice_id)
                    .await?
                    .iter()
                    .map(|p| p.amount)
                    .sum();
                let cumulative = previous + input.amount;
                if cumulative >= invoice.amount - paid_tolerance() {
                    invoice.status = InvoiceStatus::Paid;
                    invoice.paid_date = Some(payment_date);
                } else {
                    invoice.status = InvoiceStatus::Partial;
                }
                invoice.updated_utc = now;
                Some(invoice)
            }
            None => {
                tracing::warn!(
                    subscription_id = %before.subscription_id,
                    "No open invoice for payment, recording it unlinked"
                );
                None
            }
        };

        let saved = self.ctx.store.replace_subscription(&after).await?;

        let payment = Payment {
            payment_id: uuid::Uuid::new_v4().to_string(),
            subscription_id: saved.subscription_id.clone(),
            advertiser_id: saved.advertiser_id.clone(),
            invoice_id: invoice.as_ref().map(|i| i.invoice_id.clone()),
            amount: input.amount,
            payment_date,
            payment_method: input.payment_method,
            transaction_id: input.transaction_id,
            recorded_by: input.actor_id.clone(),
            created_utc: now,
        };
        self.append_payment(&payment).await?;

        // The balance and its payment record agree from here on, so the
        // invoice status and audit entry never fail the payment.
        if let Some(invoice) = &invoice {
            self.write_after_balance("replace_invoice", &saved.subscription_id, || {
                self.ctx.store.replace_invoice(invoice)
            })
            .await;
        }
        if activates {
            let entry = history_entry(
                &before,
                &saved,
                ActionType::Activate,
                &input.actor_id,
                Some("payment received"),
                now,
                today,
            );
            self.write_after_balance("insert_history", &saved.subscription_id, || {
                self.ctx.store.insert_history(&entry)
            })
            .await;
        }
        drop(guard);

        record_operation("record_payment", "success");
        tracing::info!(
            subscription_id = %saved.subscription_id,
            payment_id = %payment.payment_id,
            paid_amount = %saved.paid_amount,
            remaining_amount = %saved.remaining_amount,
            payment_status = saved.payment_status.as_str(),
            "Payment recorded"
        );

        self.coverage.refresh(&saved.advertiser_id).await;
        Ok(payment)
    }

    /// Cancel a subscription and its unpaid invoices.
    ///
    /// The prorated refund in the outcome is advisory; no money is moved.
    #[instrument(skip(self, reason), fields(subscription_id = %subscription_id, actor_id = %actor_id))]
    pub async fn cancel_subscription(
        &self,
        subscription_id: &str,
        actor_id: &str,
        reason: Option<&str>,
    ) -> Result<CancellationOutcome, ServiceError> {
        require_actor(actor_id)?;
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());

        let guard = self.ctx.locks.acquire(subscription_id).await;
        let before = self.ctx.load_subscription(subscription_id).await?;
        LifecycleAction::Cancel.ensure_allowed(before.status)?;

        let now = self.ctx.now();
        let today = self.ctx.today();
        let elapsed = days_between(before.start_date, today).max(0);
        let remaining_days = (before.planned_days - elapsed).max(0);
        let suggested_refund =
            prorated_refund(before.total_amount, before.planned_days, remaining_days);

        let mut after = before.clone();
        after.status = SubscriptionStatus::Cancelled;
        after.actual_end_date = Some(today);
        after.cancelled_at = Some(now);
        after.cancellation_reason = reason.map(str::to_string);
        after.paused_at = None;
        after.is_in_grace_period = false;

        let saved = commit_transition(
            &self.ctx,
            &before,
            after,
            ActionType::Cancel,
            actor_id,
            reason,
        )
        .await?;

        let mut cancelled_invoice_ids = Vec::new();
        for mut invoice in self
            .ctx
            .store
            .list_invoices_by_subscription(subscription_id)
            .await?
        {
            if invoice.status == InvoiceStatus::Unpaid {
                invoice.status = InvoiceStatus::Cancelled;
                invoice.updated_utc = now;
                self.ctx.store.replace_invoice(&invoice).await?;
                cancelled_invoice_ids.push(invoice.invoice_id);
            }
        }
        drop(guard);

        record_operation("cancel", "success");
        tracing::info!(
            subscription_id = %subscription_id,
            suggested_refund = %suggested_refund,
            remaining_days = remaining_days,
            cancelled_invoices = cancelled_invoice_ids.len(),
            "Subscription cancelled"
        );

        self.coverage.refresh(&saved.advertiser_id).await;

        Ok(CancellationOutcome {
            subscription_id: saved.subscription_id,
            status: saved.status,
            suggested_refund,
            remaining_days,
            cancelled_invoice_ids,
        })
    }

    /// Billing totals and history for one advertiser.
    #[instrument(skip(self))]
    pub async fn financial_summary(
        &self,
        advertiser_id: &str,
    ) -> Result<FinancialSummary, ServiceError> {
        self.ctx
            .store
            .get_advertiser(advertiser_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Advertiser", advertiser_id))?;

        let store = &self.ctx.store;
        let subscriptions = store.list_subscriptions_by_advertiser(advertiser_id).await?;
        let mut invoices = store.list_invoices_by_advertiser(advertiser_id).await?;
        let mut payments = store.list_payments_by_advertiser(advertiser_id).await?;
        let refunds = store.list_refunds_by_advertiser(advertiser_id).await?;

        let total_billed: Decimal = invoices
            .iter()
            .filter(|i| i.status != InvoiceStatus::Cancelled)
            .map(|i| i.amount)
            .sum();
        let total_paid: Decimal = payments.iter().map(|p| p.amount).sum();
        let total_outstanding: Decimal = subscriptions
            .iter()
            .filter(|s| s.status != SubscriptionStatus::Cancelled)
            .map(|s| s.remaining_amount)
            .sum();
        let total_refunded: Decimal = refunds
            .iter()
            .filter(|r| r.status == RefundStatus::Processed)
            .map(|r| r.amount)
            .sum();

        let mut subscriptions_by_status = BTreeMap::new();
        for subscription in &subscriptions {
            *subscriptions_by_status
                .entry(subscription.status.as_str().to_string())
                .or_insert(0) += 1;
        }

        invoices.sort_by(|a, b| {
            b.issued_date
                .cmp(&a.issued_date)
                .then(b.created_utc.cmp(&a.created_utc))
        });
        payments.sort_by(|a, b| {
            b.payment_date
                .cmp(&a.payment_date)
                .then(b.created_utc.cmp(&a.created_utc))
        });

        Ok(FinancialSummary {
            advertiser_id: advertiser_id.to_string(),
            total_billed,
            total_paid,
            total_outstanding,
            total_refunded,
            subscription_count: subscriptions.len(),
            subscriptions_by_status,
            invoices,
            payments,
            refunds,
        })
    }

    /// Explicit invoice when it belongs to the subscription and is still
    /// open, otherwise the earliest open invoice.
    async fn resolve_invoice(
        &self,
        subscription_id: &str,
        requested: Option<&str>,
    ) -> Result<Option<Invoice>, ServiceError> {
        if let Some(invoice_id) = requested {
            match self.ctx.store.get_invoice(invoice_id).await? {
                Some(invoice)
                    if invoice.subscription_id == subscription_id && invoice.status.is_open() =>
                {
                    return Ok(Some(invoice));
                }
                _ => {
                    tracing::warn!(
                        subscription_id = %subscription_id,
                        invoice_id = %invoice_id,
                        "Requested invoice is not an open invoice of this subscription"
                    );
                }
            }
        }

        let mut open: Vec<Invoice> = self
            .ctx
            .store
            .list_invoices_by_subscription(subscription_id)
            .await?
            .into_iter()
            .filter(|i| i.status.is_open())
            .collect();
        open.sort_by(|a, b| {
            a.issued_date
                .cmp(&b.issued_date)
                .then(a.created_utc.cmp(&b.created_utc))
        });
        Ok(open.into_iter().next())
    }

    /// Idempotent payment write, retried on store failures.
    async fn append_payment(&self, payment: &Payment) -> Result<(), ServiceError> {
        let result = retry_store_write(|| self.ctx.store.upsert_payment(payment)).await;

        match result {
            Ok(()) => {
                record_payment(
                    &payment.payment_method,
                    payment.amount.to_f64().unwrap_or_default(),
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    payment_id = %payment.payment_id,
                    subscription_id = %payment.subscription_id,
                    amount = %payment.amount,
                    error = %e,
                    "Payment record could not be written after balance update"
                );
                Err(e)
            }
        }
    }

    /// Retried follow-up write for a committed balance; a final failure is
    /// logged and counted, never returned.
    async fn write_after_balance<F, Fut>(
        &self,
        write_name: &'static str,
        subscription_id: &str,
        write: F,
    ) where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), ServiceError>>,
    {
        if let Err(e) = retry_store_write(write).await {
            record_side_effect_failure(write_name);
            tracing::error!(
                subscription_id = %subscription_id,
                write = write_name,
                error = %e,
                "Follow-up write failed after balance update"
            );
        }
    }
}

/// Cities a new subscription covers.
///
/// City plans may be narrowed to a non-empty subset of their cities; kingdom
/// plans cover everything and take no cities.
fn resolve_cities(
    coverage: PlanCoverage,
    plan_cities: &[String],
    requested: Option<&[String]>,
) -> Result<Vec<String>, ServiceError> {
    match (coverage, requested) {
        (PlanCoverage::Kingdom, None) => Ok(Vec::new()),
        (PlanCoverage::Kingdom, Some(cities)) if cities.is_empty() => Ok(Vec::new()),
        (PlanCoverage::Kingdom, Some(_)) => Err(ServiceError::Validation(
            "kingdom-wide plans cannot be limited to cities".to_string(),
        )),
        (PlanCoverage::City, None) => Ok(plan_cities.to_vec()),
        (PlanCoverage::City, Some(cities)) => {
            let requested: BTreeSet<String> = cities
                .iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
            if requested.is_empty() {
                return Err(ServiceError::Validation(
                    "at least one city is required".to_string(),
                ));
            }
            if let Some(unknown) = requested.iter().find(|c| !plan_cities.contains(c)) {
                return Err(ServiceError::Validation(format!(
                    "city '{}' is not covered by this plan",
                    unknown
                )));
            }
            Ok(requested.into_iter().collect())
        }
    }
}

fn invoice_number(invoice_id: &str, issued: chrono::NaiveDate) -> String {
    let suffix: String = invoice_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect();
    format!("INV-{}-{}", issued.format("%Y%m%d"), suffix.to_uppercase())
}

/// Retry a store write with exponential backoff while it fails on the database.
async fn retry_store_write<F, Fut>(mut write: F) -> Result<(), ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), ServiceError>>,
{
    let backoff = ExponentialBackoff {
        initial_interval: Duration::from_millis(50),
        max_elapsed_time: Some(Duration::from_secs(5)),
        ..Default::default()
    };

    retry(backoff, || {
        let attempt = write();
        async move {
            attempt.await.map_err(|e| match e {
                ServiceError::Database(_) => backoff::Error::transient(e),
                other => backoff::Error::permanent(other),
            })
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn cities(names: &[&str]) -> Vec<String> {
        names.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn city_plan_can_be_narrowed() {
        let plan = cities(&["Riyadh", "Jeddah", "Dammam"]);
        let requested = cities(&[" Jeddah", "Riyadh", "Jeddah"]);
        let resolved = resolve_cities(PlanCoverage::City, &plan, Some(&requested)).unwrap();
        assert_eq!(resolved, cities(&["Jeddah", "Riyadh"]));

        let all = resolve_cities(PlanCoverage::City, &plan, None).unwrap();
        assert_eq!(all, plan);
    }

    #[test]
    fn unknown_or_kingdom_cities_are_rejected() {
        let plan = cities(&["Riyadh"]);
        assert!(matches!(
            resolve_cities(PlanCoverage::City, &plan, Some(&cities(&["Abha"]))),
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            resolve_cities(PlanCoverage::Kingdom, &[], Some(&cities(&["Riyadh"]))),
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            resolve_cities(PlanCoverage::City, &plan, Some(&cities(&[" "]))),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn invoice_numbers_embed_issue_date() {
        let issued = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        let number = invoice_number("1b4e28ba-2fa1-11d2-883f-0016d3cca427", issued);
        assert_eq!(number, "INV-20250309-1B4E28BA");
    }
}
