//! MongoDB-backed store for subscription-service.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, to_bson, Document},
    options::{FindOptions, IndexOptions, ReplaceOptions},
    Client as MongoClient, Collection, Database, IndexModel,
};
use prometheus::HistogramTimer;
use serde::{de::DeserializeOwned, Serialize};
use service_core::error::AppError;
use tracing::{info, instrument};

use crate::models::{
    Advertiser, CascadeRecord, CoverageType, Invoice, Payment, Plan, Refund, Subscription,
    SubscriptionStatus, SubscriptionStatusHistory,
};
use crate::services::error::ServiceError;
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{StoreResult, SubscriptionStore};

const ADVERTISERS: &str = "advertisers";
const PLANS: &str = "plans";
const SUBSCRIPTIONS: &str = "subscriptions";
const INVOICES: &str = "invoices";
const PAYMENTS: &str = "payments";
const STATUS_HISTORY: &str = "subscription_status_history";
const REFUNDS: &str = "refunds";
const CASCADES: &str = "advertiser_cascades";

fn timer(operation: &str) -> HistogramTimer {
    DB_QUERY_DURATION
        .with_label_values(&[operation])
        .start_timer()
}

#[derive(Clone)]
pub struct MongoStore {
    client: MongoClient,
    db: Database,
}

impl MongoStore {
    #[instrument(skip(uri), fields(service = "subscription-service"))]
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        info!("Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to MongoDB");
            AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
        })?;
        let db = client.database(database);
        info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub fn client(&self) -> &MongoClient {
        &self.client
    }

    fn collection<T>(&self, name: &str) -> Collection<T> {
        self.db.collection(name)
    }

    /// Create the unique id indexes and the lookup indexes used by the engine.
    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        info!("Creating MongoDB indexes for subscription-service");

        let unique_ids = [
            (ADVERTISERS, "advertiser_id"),
            (PLANS, "plan_id"),
            (SUBSCRIPTIONS, "subscription_id"),
            (INVOICES, "invoice_id"),
            (PAYMENTS, "payment_id"),
            (STATUS_HISTORY, "history_id"),
            (REFUNDS, "refund_id"),
            (CASCADES, "cascade_id"),
        ];
        for (collection, key) in unique_ids {
            let mut keys = Document::new();
            keys.insert(key, 1);
            let index = IndexModel::builder()
                .keys(keys)
                .options(
                    IndexOptions::builder()
                        .name(format!("{}_unique", key))
                        .unique(true)
                        .build(),
                )
                .build();
            self.create_index(collection, index).await?;
        }

        let lookups: [(&str, Document, &str); 8] = [
            (SUBSCRIPTIONS, doc! { "advertiser_id": 1 }, "advertiser_idx"),
            (SUBSCRIPTIONS, doc! { "status": 1, "end_date": 1 }, "status_end_date_idx"),
            (INVOICES, doc! { "subscription_id": 1, "issued_date": 1 }, "subscription_idx"),
            (INVOICES, doc! { "advertiser_id": 1 }, "advertiser_idx"),
            (PAYMENTS, doc! { "subscription_id": 1 }, "subscription_idx"),
            (PAYMENTS, doc! { "invoice_id": 1 }, "invoice_idx"),
            (STATUS_HISTORY, doc! { "subscription_id": 1, "changed_at": 1 }, "subscription_idx"),
            (REFUNDS, doc! { "subscription_id": 1 }, "subscription_idx"),
        ];
        for (collection, keys, name) in lookups {
            let index = IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().name(name.to_string()).build())
                .build();
            self.create_index(collection, index).await?;
        }

        info!("MongoDB indexes created");
        Ok(())
    }

    async fn create_index(&self, collection: &str, index: IndexModel) -> Result<(), AppError> {
        self.collection::<Document>(collection)
            .create_index(index, None)
            .await
            .map_err(|e| {
                tracing::error!(collection = %collection, error = %e, "Failed to create index");
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;
        Ok(())
    }

    async fn find_one<T>(&self, collection: &str, filter: Document) -> StoreResult<Option<T>>
    where
        T: DeserializeOwned + Unpin + Send + Sync,
    {
        Ok(self
            .collection::<T>(collection)
            .find_one(filter, None)
            .await?)
    }

    async fn find_many<T>(
        &self,
        collection: &str,
        filter: Document,
        sort: Document,
    ) -> StoreResult<Vec<T>>
    where
        T: DeserializeOwned + Unpin + Send + Sync,
    {
        let options = FindOptions::builder().sort(sort).build();
        let cursor = self
            .collection::<T>(collection)
            .find(filter, options)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn insert<T>(&self, collection: &str, value: &T) -> StoreResult<()>
    where
        T: Serialize + Send + Sync,
    {
        self.collection::<T>(collection)
            .insert_one(value, None)
            .await?;
        Ok(())
    }

    async fn replace<T>(
        &self,
        collection: &str,
        filter: Document,
        value: &T,
        entity: &str,
        id: &str,
    ) -> StoreResult<()>
    where
        T: Serialize + Send + Sync,
    {
        let result = self
            .collection::<T>(collection)
            .replace_one(filter, value, None)
            .await?;
        if result.matched_count == 0 {
            return Err(ServiceError::not_found(entity, id));
        }
        Ok(())
    }

    async fn delete_by_advertiser(&self, collection: &str, advertiser_id: &str) -> StoreResult<u64> {
        let result = self
            .collection::<Document>(collection)
            .delete_many(doc! { "advertiser_id": advertiser_id }, None)
            .await?;
        Ok(result.deleted_count)
    }
}

#[async_trait]
impl SubscriptionStore for MongoStore {
    #[instrument(skip(self, advertiser), fields(advertiser_id = %advertiser.advertiser_id))]
    async fn insert_advertiser(&self, advertiser: &Advertiser) -> StoreResult<()> {
        let _timer = timer("insert_advertiser");
        self.insert(ADVERTISERS, advertiser).await
    }

    #[instrument(skip(self))]
    async fn get_advertiser(&self, advertiser_id: &str) -> StoreResult<Option<Advertiser>> {
        let _timer = timer("get_advertiser");
        self.find_one(ADVERTISERS, doc! { "advertiser_id": advertiser_id })
            .await
    }

    #[instrument(skip(self, advertiser), fields(advertiser_id = %advertiser.advertiser_id))]
    async fn replace_advertiser(&self, advertiser: &Advertiser) -> StoreResult<()> {
        let _timer = timer("replace_advertiser");
        self.replace(
            ADVERTISERS,
            doc! { "advertiser_id": advertiser.advertiser_id.as_str() },
            advertiser,
            "Advertiser",
            &advertiser.advertiser_id,
        )
        .await
    }

    #[instrument(skip(self, coverage_cities))]
    async fn set_advertiser_coverage(
        &self,
        advertiser_id: &str,
        coverage_type: CoverageType,
        coverage_cities: &[String],
        updated_utc: DateTime<Utc>,
    ) -> StoreResult<()> {
        let _timer = timer("set_advertiser_coverage");
        let update = doc! {
            "$set": {
                "coverage_type": to_bson(&coverage_type)?,
                "coverage_cities": to_bson(coverage_cities)?,
                "updated_utc": to_bson(&updated_utc)?,
            }
        };
        let result = self
            .collection::<Document>(ADVERTISERS)
            .update_one(doc! { "advertiser_id": advertiser_id }, update, None)
            .await?;
        if result.matched_count == 0 {
            return Err(ServiceError::not_found("Advertiser", advertiser_id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_advertiser(&self, advertiser_id: &str) -> StoreResult<u64> {
        let _timer = timer("delete_advertiser");
        let result = self
            .collection::<Document>(ADVERTISERS)
            .delete_one(doc! { "advertiser_id": advertiser_id }, None)
            .await?;
        Ok(result.deleted_count)
    }

    #[instrument(skip(self, plan), fields(plan_id = %plan.plan_id))]
    async fn insert_plan(&self, plan: &Plan) -> StoreResult<()> {
        let _timer = timer("insert_plan");
        self.insert(PLANS, plan).await
    }

    #[instrument(skip(self))]
    async fn get_plan(&self, plan_id: &str) -> StoreResult<Option<Plan>> {
        let _timer = timer("get_plan");
        self.find_one(PLANS, doc! { "plan_id": plan_id }).await
    }

    #[instrument(skip(self, plan), fields(plan_id = %plan.plan_id))]
    async fn replace_plan(&self, plan: &Plan) -> StoreResult<()> {
        let _timer = timer("replace_plan");
        self.replace(
            PLANS,
            doc! { "plan_id": plan.plan_id.as_str() },
            plan,
            "Plan",
            &plan.plan_id,
        )
        .await
    }

    #[instrument(skip(self, subscription), fields(subscription_id = %subscription.subscription_id))]
    async fn insert_subscription(&self, subscription: &Subscription) -> StoreResult<()> {
        let _timer = timer("insert_subscription");
        self.insert(SUBSCRIPTIONS, subscription).await
    }

    #[instrument(skip(self))]
    async fn get_subscription(&self, subscription_id: &str) -> StoreResult<Option<Subscription>> {
        let _timer = timer("get_subscription");
        self.find_one(SUBSCRIPTIONS, doc! { "subscription_id": subscription_id })
            .await
    }

    #[instrument(
        skip(self, subscription),
        fields(subscription_id = %subscription.subscription_id, version = subscription.version)
    )]
    async fn replace_subscription(
        &self,
        subscription: &Subscription,
    ) -> StoreResult<Subscription> {
        let _timer = timer("replace_subscription");
        let mut next = subscription.clone();
        next.version += 1;

        let filter = doc! {
            "subscription_id": subscription.subscription_id.as_str(),
            "version": subscription.version,
        };
        let result = self
            .collection::<Subscription>(SUBSCRIPTIONS)
            .replace_one(filter, &next, None)
            .await?;

        if result.matched_count == 0 {
            let exists = self
                .get_subscription(&subscription.subscription_id)
                .await?
                .is_some();
            return Err(if exists {
                ServiceError::Conflict(format!(
                    "subscription '{}' was modified concurrently (expected version {})",
                    subscription.subscription_id, subscription.version
                ))
            } else {
                ServiceError::not_found("Subscription", &subscription.subscription_id)
            });
        }
        Ok(next)
    }

    #[instrument(skip(self))]
    async fn list_subscriptions_by_advertiser(
        &self,
        advertiser_id: &str,
    ) -> StoreResult<Vec<Subscription>> {
        let _timer = timer("list_subscriptions_by_advertiser");
        self.find_many(
            SUBSCRIPTIONS,
            doc! { "advertiser_id": advertiser_id },
            doc! { "created_utc": 1 },
        )
        .await
    }

    #[instrument(skip(self))]
    async fn due_for_sweep(&self, today: NaiveDate) -> StoreResult<Vec<Subscription>> {
        let _timer = timer("due_for_sweep");
        // Dates are stored as ISO-8601 strings, so lexical order is date order.
        let filter = doc! {
            "status": to_bson(&SubscriptionStatus::Active)?,
            "end_date": { "$lt": today.to_string() },
        };
        self.find_many(SUBSCRIPTIONS, filter, doc! { "end_date": 1 })
            .await
    }

    #[instrument(skip(self))]
    async fn delete_subscriptions_by_advertiser(&self, advertiser_id: &str) -> StoreResult<u64> {
        let _timer = timer("delete_subscriptions_by_advertiser");
        self.delete_by_advertiser(SUBSCRIPTIONS, advertiser_id).await
    }

    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.invoice_id))]
    async fn insert_invoice(&self, invoice: &Invoice) -> StoreResult<()> {
        let _timer = timer("insert_invoice");
        self.insert(INVOICES, invoice).await
    }

    #[instrument(skip(self))]
    async fn get_invoice(&self, invoice_id: &str) -> StoreResult<Option<Invoice>> {
        let _timer = timer("get_invoice");
        self.find_one(INVOICES, doc! { "invoice_id": invoice_id }).await
    }

    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.invoice_id))]
    async fn replace_invoice(&self, invoice: &Invoice) -> StoreResult<()> {
        let _timer = timer("replace_invoice");
        self.replace(
            INVOICES,
            doc! { "invoice_id": invoice.invoice_id.as_str() },
            invoice,
            "Invoice",
            &invoice.invoice_id,
        )
        .await
    }

    #[instrument(skip(self))]
    async fn list_invoices_by_subscription(
        &self,
        subscription_id: &str,
    ) -> StoreResult<Vec<Invoice>> {
        let _timer = timer("list_invoices_by_subscription");
        self.find_many(
            INVOICES,
            doc! { "subscription_id": subscription_id },
            doc! { "issued_date": 1, "created_utc": 1 },
        )
        .await
    }

    #[instrument(skip(self))]
    async fn list_invoices_by_advertiser(&self, advertiser_id: &str) -> StoreResult<Vec<Invoice>> {
        let _timer = timer("list_invoices_by_advertiser");
        self.find_many(
            INVOICES,
            doc! { "advertiser_id": advertiser_id },
            doc! { "issued_date": 1, "created_utc": 1 },
        )
        .await
    }

    #[instrument(skip(self))]
    async fn delete_invoices_by_advertiser(&self, advertiser_id: &str) -> StoreResult<u64> {
        let _timer = timer("delete_invoices_by_advertiser");
        self.delete_by_advertiser(INVOICES, advertiser_id).await
    }

    #[instrument(skip(self, payment), fields(payment_id = %payment.payment_id))]
    async fn upsert_payment(&self, payment: &Payment) -> StoreResult<()> {
        let _timer = timer("upsert_payment");
        let options = ReplaceOptions::builder().upsert(true).build();
        self.collection::<Payment>(PAYMENTS)
            .replace_one(doc! { "payment_id": payment.payment_id.as_str() }, payment, options)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_payments_by_subscription(
        &self,
        subscription_id: &str,
    ) -> StoreResult<Vec<Payment>> {
        let _timer = timer("list_payments_by_subscription");
        self.find_many(
            PAYMENTS,
            doc! { "subscription_id": subscription_id },
            doc! { "created_utc": 1 },
        )
        .await
    }

    #[instrument(skip(self))]
    async fn list_payments_by_invoice(&self, invoice_id: &str) -> StoreResult<Vec<Payment>> {
        let _timer = timer("list_payments_by_invoice");
        self.find_many(
            PAYMENTS,
            doc! { "invoice_id": invoice_id },
            doc! { "created_utc": 1 },
        )
        .await
    }

    #[instrument(skip(self))]
    async fn list_payments_by_advertiser(&self, advertiser_id: &str) -> StoreResult<Vec<Payment>> {
        let _timer = timer("list_payments_by_advertiser");
        self.find_many(
            PAYMENTS,
            doc! { "advertiser_id": advertiser_id },
            doc! { "created_utc": 1 },
        )
        .await
    }

    #[instrument(skip(self))]
    async fn delete_payments_by_advertiser(&self, advertiser_id: &str) -> StoreResult<u64> {
        let _timer = timer("delete_payments_by_advertiser");
        self.delete_by_advertiser(PAYMENTS, advertiser_id).await
    }

    #[instrument(skip(self, entry), fields(subscription_id = %entry.subscription_id, action = %entry.action_type))]
    async fn insert_history(&self, entry: &SubscriptionStatusHistory) -> StoreResult<()> {
        let _timer = timer("insert_history");
        self.insert(STATUS_HISTORY, entry).await
    }

    #[instrument(skip(self))]
    async fn list_history(
        &self,
        subscription_id: &str,
    ) -> StoreResult<Vec<SubscriptionStatusHistory>> {
        let _timer = timer("list_history");
        self.find_many(
            STATUS_HISTORY,
            doc! { "subscription_id": subscription_id },
            doc! { "changed_at": 1, "_id": 1 },
        )
        .await
    }

    #[instrument(skip(self))]
    async fn delete_history_by_advertiser(&self, advertiser_id: &str) -> StoreResult<u64> {
        let _timer = timer("delete_history_by_advertiser");
        self.delete_by_advertiser(STATUS_HISTORY, advertiser_id).await
    }

    #[instrument(skip(self, refund), fields(refund_id = %refund.refund_id))]
    async fn insert_refund(&self, refund: &Refund) -> StoreResult<()> {
        let _timer = timer("insert_refund");
        self.insert(REFUNDS, refund).await
    }

    #[instrument(skip(self))]
    async fn get_refund(&self, refund_id: &str) -> StoreResult<Option<Refund>> {
        let _timer = timer("get_refund");
        self.find_one(REFUNDS, doc! { "refund_id": refund_id }).await
    }

    #[instrument(skip(self, refund), fields(refund_id = %refund.refund_id))]
    async fn replace_refund(&self, refund: &Refund) -> StoreResult<()> {
        let _timer = timer("replace_refund");
        self.replace(
            REFUNDS,
            doc! { "refund_id": refund.refund_id.as_str() },
            refund,
            "Refund",
            &refund.refund_id,
        )
        .await
    }

    #[instrument(skip(self))]
    async fn list_refunds_by_subscription(
        &self,
        subscription_id: &str,
    ) -> StoreResult<Vec<Refund>> {
        let _timer = timer("list_refunds_by_subscription");
        self.find_many(
            REFUNDS,
            doc! { "subscription_id": subscription_id },
            doc! { "created_utc": 1 },
        )
        .await
    }

    #[instrument(skip(self))]
    async fn list_refunds_by_advertiser(&self, advertiser_id: &str) -> StoreResult<Vec<Refund>> {
        let _timer = timer("list_refunds_by_advertiser");
        self.find_many(
            REFUNDS,
            doc! { "advertiser_id": advertiser_id },
            doc! { "created_utc": 1 },
        )
        .await
    }

    #[instrument(skip(self))]
    async fn delete_refunds_by_advertiser(&self, advertiser_id: &str) -> StoreResult<u64> {
        let _timer = timer("delete_refunds_by_advertiser");
        self.delete_by_advertiser(REFUNDS, advertiser_id).await
    }

    #[instrument(skip(self, record), fields(cascade_id = %record.cascade_id, status = record.status.as_str()))]
    async fn save_cascade(&self, record: &CascadeRecord) -> StoreResult<()> {
        let _timer = timer("save_cascade");
        let options = ReplaceOptions::builder().upsert(true).build();
        self.collection::<CascadeRecord>(CASCADES)
            .replace_one(doc! { "cascade_id": record.cascade_id.as_str() }, record, options)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_cascade(&self, cascade_id: &str) -> StoreResult<Option<CascadeRecord>> {
        let _timer = timer("get_cascade");
        self.find_one(CASCADES, doc! { "cascade_id": cascade_id }).await
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StoreResult<()> {
        let _timer = timer("health_check");
        self.db.run_command(doc! { "ping": 1 }, None).await?;
        Ok(())
    }
}
