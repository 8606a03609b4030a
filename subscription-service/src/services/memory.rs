//! In-memory store used by tests and the `memory` storage backend.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::models::{
    Advertiser, CascadeRecord, CoverageType, Invoice, Payment, Plan, Refund, Subscription,
    SubscriptionStatus, SubscriptionStatusHistory,
};
use crate::services::error::ServiceError;
use crate::services::store::{StoreResult, SubscriptionStore};

#[derive(Default)]
pub struct InMemoryStore {
    advertisers: RwLock<HashMap<String, Advertiser>>,
    plans: RwLock<HashMap<String, Plan>>,
    subscriptions: RwLock<HashMap<String, Subscription>>,
    invoices: RwLock<Vec<Invoice>>,
    payments: RwLock<Vec<Payment>>,
    history: RwLock<Vec<SubscriptionStatusHistory>>,
    refunds: RwLock<Vec<Refund>>,
    cascades: RwLock<HashMap<String, CascadeRecord>>,
    failures: DashMap<&'static str, u32>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` calls of `operation` fail with a database error.
    pub fn fail_next(&self, operation: &'static str, times: u32) {
        self.failures.insert(operation, times);
    }

    fn check_fault(&self, operation: &'static str) -> StoreResult<()> {
        if let Some(mut remaining) = self.failures.get_mut(operation) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ServiceError::Database(anyhow::anyhow!(
                    "injected failure in {}",
                    operation
                )));
            }
        }
        Ok(())
    }
}

fn remove_where<T>(items: &mut Vec<T>, pred: impl Fn(&T) -> bool) -> u64 {
    let before = items.len();
    items.retain(|item| !pred(item));
    (before - items.len()) as u64
}

#[async_trait]
impl SubscriptionStore for InMemoryStore {
    async fn insert_advertiser(&self, advertiser: &Advertiser) -> StoreResult<()> {
        self.check_fault("insert_advertiser")?;
        self.advertisers
            .write()
            .await
            .insert(advertiser.advertiser_id.clone(), advertiser.clone());
        Ok(())
    }

    async fn get_advertiser(&self, advertiser_id: &str) -> StoreResult<Option<Advertiser>> {
        self.check_fault("get_advertiser")?;
        Ok(self.advertisers.read().await.get(advertiser_id).cloned())
    }

    async fn replace_advertiser(&self, advertiser: &Advertiser) -> StoreResult<()> {
        self.check_fault("replace_advertiser")?;
        let mut advertisers = self.advertisers.write().await;
        match advertisers.get_mut(&advertiser.advertiser_id) {
            Some(existing) => {
                *existing = advertiser.clone();
                Ok(())
            }
            None => Err(ServiceError::not_found("Advertiser", &advertiser.advertiser_id)),
        }
    }

    async fn set_advertiser_coverage(
        &self,
        advertiser_id: &str,
        coverage_type: CoverageType,
        coverage_cities: &[String],
        updated_utc: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.check_fault("set_advertiser_coverage")?;
        let mut advertisers = self.advertisers.write().await;
        let advertiser = advertisers
            .get_mut(advertiser_id)
            .ok_or_else(|| ServiceError::not_found("Advertiser", advertiser_id))?;
        advertiser.coverage_type = coverage_type;
        advertiser.coverage_cities = coverage_cities.to_vec();
        advertiser.updated_utc = updated_utc;
        Ok(())
    }

    async fn delete_advertiser(&self, advertiser_id: &str) -> StoreResult<u64> {
        self.check_fault("delete_advertiser")?;
        Ok(self.advertisers.write().await.remove(advertiser_id).map_or(0, |_| 1))
    }

    async fn insert_plan(&self, plan: &Plan) -> StoreResult<()> {
        self.check_fault("insert_plan")?;
        self.plans
            .write()
            .await
            .insert(plan.plan_id.clone(), plan.clone());
        Ok(())
    }

    async fn get_plan(&self, plan_id: &str) -> StoreResult<Option<Plan>> {
        self.check_fault("get_plan")?;
        Ok(self.plans.read().await.get(plan_id).cloned())
    }

    async fn replace_plan(&self, plan: &Plan) -> StoreResult<()> {
        self.check_fault("replace_plan")?;
        let mut plans = self.plans.write().await;
        match plans.get_mut(&plan.plan_id) {
            Some(existing) => {
                *existing = plan.clone();
                Ok(())
            }
            None => Err(ServiceError::not_found("Plan", &plan.plan_id)),
        }
    }

    async fn insert_subscription(&self, subscription: &Subscription) -> StoreResult<()> {
        self.check_fault("insert_subscription")?;
        self.subscriptions
            .write()
            .await
            .insert(subscription.subscription_id.clone(), subscription.clone());
        Ok(())
    }

    async fn get_subscription(&self, subscription_id: &str) -> StoreResult<Option<Subscription>> {
        self.check_fault("get_subscription")?;
        Ok(self.subscriptions.read().await.get(subscription_id).cloned())
    }

    async fn replace_subscription(
        &self,
        subscription: &Subscription,
    ) -> StoreResult<Subscription> {
        self.check_fault("replace_subscription")?;
        let mut subscriptions = self.subscriptions.write().await;
        let existing = subscriptions
            .get_mut(&subscription.subscription_id)
            .ok_or_else(|| ServiceError::not_found("Subscription", &subscription.subscription_id))?;

        if existing.version != subscription.version {
            return Err(ServiceError::Conflict(format!(
                "subscription '{}' was modified concurrently (expected version {}, found {})",
                subscription.subscription_id, subscription.version, existing.version
            )));
        }

        let mut next = subscription.clone();
        next.version += 1;
        *existing = next.clone();
        Ok(next)
    }

    async fn list_subscriptions_by_advertiser(
        &self,
        advertiser_id: &str,
    ) -> StoreResult<Vec<Subscription>> {
        self.check_fault("list_subscriptions_by_advertiser")?;
        let mut found: Vec<Subscription> = self
            .subscriptions
            .read()
            .await
            .values()
            .filter(|s| s.advertiser_id == advertiser_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_utc.cmp(&b.created_utc));
        Ok(found)
    }

    async fn due_for_sweep(&self, today: NaiveDate) -> StoreResult<Vec<Subscription>> {
        self.check_fault("due_for_sweep")?;
        let mut due: Vec<Subscription> = self
            .subscriptions
            .read()
            .await
            .values()
            .filter(|s| s.status == SubscriptionStatus::Active && s.end_date < today)
            .cloned()
            .collect();
        due.sort_by(|a, b| a.end_date.cmp(&b.end_date));
        Ok(due)
    }

    async fn delete_subscriptions_by_advertiser(&self, advertiser_id: &str) -> StoreResult<u64> {
        self.check_fault("delete_subscriptions_by_advertiser")?;
        let mut subscriptions = self.subscriptions.write().await;
        let before = subscriptions.len();
        subscriptions.retain(|_, s| s.advertiser_id != advertiser_id);
        Ok((before - subscriptions.len()) as u64)
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> StoreResult<()> {
        self.check_fault("insert_invoice")?;
        self.invoices.write().await.push(invoice.clone());
        Ok(())
    }

    async fn get_invoice(&self, invoice_id: &str) -> StoreResult<Option<Invoice>> {
        self.check_fault("get_invoice")?;
        Ok(self
            .invoices
            .read()
            .await
            .iter()
            .find(|i| i.invoice_id == invoice_id)
            .cloned())
    }

    async fn replace_invoice(&self, invoice: &Invoice) -> StoreResult<()> {
        self.check_fault("replace_invoice")?;
        let mut invoices = self.invoices.write().await;
        match invoices.iter_mut().find(|i| i.invoice_id == invoice.invoice_id) {
            Some(existing) => {
                *existing = invoice.clone();
                Ok(())
            }
            None => Err(ServiceError::not_found("Invoice", &invoice.invoice_id)),
        }
    }

    async fn list_invoices_by_subscription(
        &self,
        subscription_id: &str,
    ) -> StoreResult<Vec<Invoice>> {
        self.check_fault("list_invoices_by_subscription")?;
        Ok(self
            .invoices
            .read()
            .await
            .iter()
            .filter(|i| i.subscription_id == subscription_id)
            .cloned()
            .collect())
    }

    async fn list_invoices_by_advertiser(&self, advertiser_id: &str) -> StoreResult<Vec<Invoice>> {
        self.check_fault("list_invoices_by_advertiser")?;
        Ok(self
            .invoices
            .read()
            .await
            .iter()
            .filter(|i| i.advertiser_id == advertiser_id)
            .cloned()
            .collect())
    }

    async fn delete_invoices_by_advertiser(&self, advertiser_id: &str) -> StoreResult<u64> {
        self.check_fault("delete_invoices_by_advertiser")?;
        let mut invoices = self.invoices.write().await;
        Ok(remove_where(&mut invoices, |i| i.advertiser_id == advertiser_id))
    }

    async fn upsert_payment(&self, payment: &Payment) -> StoreResult<()> {
        self.check_fault("upsert_payment")?;
        let mut payments = self.payments.write().await;
        match payments.iter_mut().find(|p| p.payment_id == payment.payment_id) {
            Some(existing) => *existing = payment.clone(),
            None => payments.push(payment.clone()),
        }
        Ok(())
    }

    async fn list_payments_by_subscription(
        &self,
        subscription_id: &str,
    ) -> StoreResult<Vec<Payment>> {
        self.check_fault("list_payments_by_subscription")?;
        Ok(self
            .payments
            .read()
            .await
            .iter()
            .filter(|p| p.subscription_id == subscription_id)
            .cloned()
            .collect())
    }

    async fn list_payments_by_invoice(&self, invoice_id: &str) -> StoreResult<Vec<Payment>> {
        self.check_fault("list_payments_by_invoice")?;
        Ok(self
            .payments
            .read()
            .await
            .iter()
            .filter(|p| p.invoice_id.as_deref() == Some(invoice_id))
            .cloned()
            .collect())
    }

    async fn list_payments_by_advertiser(&self, advertiser_id: &str) -> StoreResult<Vec<Payment>> {
        self.check_fault("list_payments_by_advertiser")?;
        Ok(self
            .payments
            .read()
            .await
            .iter()
            .filter(|p| p.advertiser_id == advertiser_id)
            .cloned()
            .collect())
    }

    async fn delete_payments_by_advertiser(&self, advertiser_id: &str) -> StoreResult<u64> {
        self.check_fault("delete_payments_by_advertiser")?;
        let mut payments = self.payments.write().await;
        Ok(remove_where(&mut payments, |p| p.advertiser_id == advertiser_id))
    }

    async fn insert_history(&self, entry: &SubscriptionStatusHistory) -> StoreResult<()> {
        self.check_fault("insert_history")?;
        self.history.write().await.push(entry.clone());
        Ok(())
    }

    async fn list_history(
        &self,
        subscription_id: &str,
    ) -> StoreResult<Vec<SubscriptionStatusHistory>> {
        self.check_fault("list_history")?;
        Ok(self
            .history
            .read()
            .await
            .iter()
            .filter(|h| h.subscription_id == subscription_id)
            .cloned()
            .collect())
    }

    async fn delete_history_by_advertiser(&self, advertiser_id: &str) -> StoreResult<u64> {
        self.check_fault("delete_history_by_advertiser")?;
        let mut history = self.history.write().await;
        Ok(remove_where(&mut history, |h| h.advertiser_id == advertiser_id))
    }

    async fn insert_refund(&self, refund: &Refund) -> StoreResult<()> {
        self.check_fault("insert_refund")?;
        self.refunds.write().await.push(refund.clone());
        Ok(())
    }

    async fn get_refund(&self, refund_id: &str) -> StoreResult<Option<Refund>> {
        self.check_fault("get_refund")?;
        Ok(self
            .refunds
            .read()
            .await
            .iter()
            .find(|r| r.refund_id == refund_id)
            .cloned())
    }

    async fn replace_refund(&self, refund: &Refund) -> StoreResult<()> {
        self.check_fault("replace_refund")?;
        let mut refunds = self.refunds.write().await;
        match refunds.iter_mut().find(|r| r.refund_id == refund.refund_id) {
            Some(existing) => {
                *existing = refund.clone();
                Ok(())
            }
            None => Err(ServiceError::not_found("Refund", &refund.refund_id)),
        }
    }

    async fn list_refunds_by_subscription(
        &self,
        subscription_id: &str,
    ) -> StoreResult<Vec<Refund>> {
        self.check_fault("list_refunds_by_subscription")?;
        Ok(self
            .refunds
            .read()
            .await
            .iter()
            .filter(|r| r.subscription_id == subscription_id)
            .cloned()
            .collect())
    }

    async fn list_refunds_by_advertiser(&self, advertiser_id: &str) -> StoreResult<Vec<Refund>> {
        self.check_fault("list_refunds_by_advertiser")?;
        Ok(self
            .refunds
            .read()
            .await
            .iter()
            .filter(|r| r.advertiser_id == advertiser_id)
            .cloned()
            .collect())
    }

    async fn delete_refunds_by_advertiser(&self, advertiser_id: &str) -> StoreResult<u64> {
        self.check_fault("delete_refunds_by_advertiser")?;
        let mut refunds = self.refunds.write().await;
        Ok(remove_where(&mut refunds, |r| r.advertiser_id == advertiser_id))
    }

    async fn save_cascade(&self, record: &CascadeRecord) -> StoreResult<()> {
        self.check_fault("save_cascade")?;
        self.cascades
            .write()
            .await
            .insert(record.cascade_id.clone(), record.clone());
        Ok(())
    }

    async fn get_cascade(&self, cascade_id: &str) -> StoreResult<Option<CascadeRecord>> {
        self.check_fault("get_cascade")?;
        Ok(self.cascades.read().await.get(cascade_id).cloned())
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.check_fault("health_check")
    }
}
