//! Document store interface.
//!
//! The engine never assumes multi-document transactions; each method is
//! atomic on its own document only.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::models::{
    Advertiser, CascadeRecord, CoverageType, Invoice, Payment, Plan, Refund, Subscription,
    SubscriptionStatusHistory,
};
use crate::services::error::ServiceError;

pub type StoreResult<T> = Result<T, ServiceError>;

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    // Advertisers
    async fn insert_advertiser(&self, advertiser: &Advertiser) -> StoreResult<()>;
    async fn get_advertiser(&self, advertiser_id: &str) -> StoreResult<Option<Advertiser>>;
    async fn replace_advertiser(&self, advertiser: &Advertiser) -> StoreResult<()>;
    /// Update only the derived coverage fields, leaving billing settings alone.
    async fn set_advertiser_coverage(
        &self,
        advertiser_id: &str,
        coverage_type: CoverageType,
        coverage_cities: &[String],
        updated_utc: DateTime<Utc>,
    ) -> StoreResult<()>;
    async fn delete_advertiser(&self, advertiser_id: &str) -> StoreResult<u64>;

    // Plans
    async fn insert_plan(&self, plan: &Plan) -> StoreResult<()>;
    async fn get_plan(&self, plan_id: &str) -> StoreResult<Option<Plan>>;
    async fn replace_plan(&self, plan: &Plan) -> StoreResult<()>;

    // Subscriptions
    async fn insert_subscription(&self, subscription: &Subscription) -> StoreResult<()>;
    async fn get_subscription(&self, subscription_id: &str) -> StoreResult<Option<Subscription>>;

    /// Compare-and-swap replace: succeeds only if the stored `version` equals
    /// `subscription.version`, and returns the document with the bumped version.
    async fn replace_subscription(&self, subscription: &Subscription)
        -> StoreResult<Subscription>;

    async fn list_subscriptions_by_advertiser(
        &self,
        advertiser_id: &str,
    ) -> StoreResult<Vec<Subscription>>;

    /// Active subscriptions with `end_date < today`.
    async fn due_for_sweep(&self, today: NaiveDate) -> StoreResult<Vec<Subscription>>;

    async fn delete_subscriptions_by_advertiser(&self, advertiser_id: &str) -> StoreResult<u64>;

    // Invoices
    async fn insert_invoice(&self, invoice: &Invoice) -> StoreResult<()>;
    async fn get_invoice(&self, invoice_id: &str) -> StoreResult<Option<Invoice>>;
    async fn replace_invoice(&self, invoice: &Invoice) -> StoreResult<()>;
    /// Invoices of a subscription, oldest first.
    async fn list_invoices_by_subscription(
        &self,
        subscription_id: &str,
    ) -> StoreResult<Vec<Invoice>>;
    async fn list_invoices_by_advertiser(&self, advertiser_id: &str) -> StoreResult<Vec<Invoice>>;
    async fn delete_invoices_by_advertiser(&self, advertiser_id: &str) -> StoreResult<u64>;

    // Payments
    /// Idempotent on `payment_id`; repeating the call leaves one record.
    async fn upsert_payment(&self, payment: &Payment) -> StoreResult<()>;
    async fn list_payments_by_subscription(
        &self,
        subscription_id: &str,
    ) -> StoreResult<Vec<Payment>>;
    async fn list_payments_by_invoice(&self, invoice_id: &str) -> StoreResult<Vec<Payment>>;
    async fn list_payments_by_advertiser(&self, advertiser_id: &str) -> StoreResult<Vec<Payment>>;
    async fn delete_payments_by_advertiser(&self, advertiser_id: &str) -> StoreResult<u64>;

    // Status history
    async fn insert_history(&self, entry: &SubscriptionStatusHistory) -> StoreResult<()>;
    /// History of a subscription in the order it was written.
    async fn list_history(&self, subscription_id: &str)
        -> StoreResult<Vec<SubscriptionStatusHistory>>;
    async fn delete_history_by_advertiser(&self, advertiser_id: &str) -> StoreResult<u64>;

    // Refunds
    async fn insert_refund(&self, refund: &Refund) -> StoreResult<()>;
    async fn get_refund(&self, refund_id: &str) -> StoreResult<Option<Refund>>;
    async fn replace_refund(&self, refund: &Refund) -> StoreResult<()>;
    async fn list_refunds_by_subscription(&self, subscription_id: &str)
        -> StoreResult<Vec<Refund>>;
    async fn list_refunds_by_advertiser(&self, advertiser_id: &str) -> StoreResult<Vec<Refund>>;
    async fn delete_refunds_by_advertiser(&self, advertiser_id: &str) -> StoreResult<u64>;

    // Deletion cascades
    async fn save_cascade(&self, record: &CascadeRecord) -> StoreResult<()>;
    async fn get_cascade(&self, cascade_id: &str) -> StoreResult<Option<CascadeRecord>>;

    async fn health_check(&self) -> StoreResult<()>;
}
