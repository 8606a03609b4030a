//! Engine wiring: shared context and the component aggregate.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::models::{CustomerType, Subscription};
use crate::services::cascade::DeletionCascade;
use crate::services::catalog::Catalog;
use crate::services::clock::SharedClock;
use crate::services::coverage::CoverageProjector;
use crate::services::error::ServiceError;
use crate::services::grace::GracePeriods;
use crate::services::ledger::Ledger;
use crate::services::lifecycle::Lifecycle;
use crate::services::locks::KeyedLocks;
use crate::services::notifier::Notifier;
use crate::services::refunds::Refunds;
use crate::services::store::SubscriptionStore;
use crate::services::sweeper::ExpirySweeper;

/// Automatic grace period length per customer tier, in days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraceDays {
    pub vip: i64,
    pub trusted: i64,
    pub default: i64,
}

impl GraceDays {
    pub fn for_customer(&self, customer_type: CustomerType) -> i64 {
        match customer_type {
            CustomerType::Vip => self.vip,
            CustomerType::Trusted => self.trusted,
            CustomerType::New => self.default,
        }
    }
}

impl Default for GraceDays {
    fn default() -> Self {
        Self {
            vip: 14,
            trusted: 7,
            default: 3,
        }
    }
}

/// Tunables of the engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Minimum paid amount that makes a subscription active.
    pub activation_threshold: Decimal,
    pub invoice_due_days: i64,
    pub grace_days: GraceDays,
    pub notifier_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            activation_threshold: Decimal::ONE,
            invoice_due_days: 7,
            grace_days: GraceDays::default(),
            notifier_timeout: Duration::from_millis(2000),
        }
    }
}

/// Collaborators shared by every engine component.
pub struct EngineContext {
    pub store: Arc<dyn SubscriptionStore>,
    pub clock: SharedClock,
    pub notifier: Arc<dyn Notifier>,
    /// Per-subscription locks for balance and lifecycle writes.
    pub locks: KeyedLocks,
    /// Per-advertiser locks for advertiser document writes.
    pub advertiser_locks: KeyedLocks,
    pub settings: EngineSettings,
}

impl EngineContext {
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub async fn load_subscription(&self, subscription_id: &str) -> Result<Subscription, ServiceError> {
        self.store
            .get_subscription(subscription_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Subscription", subscription_id))
    }
}

/// All engine components over one shared context.
#[derive(Clone)]
pub struct Engine {
    pub catalog: Catalog,
    pub ledger: Ledger,
    pub lifecycle: Lifecycle,
    pub grace: GracePeriods,
    pub sweeper: ExpirySweeper,
    pub coverage: CoverageProjector,
    pub refunds: Refunds,
    pub cascade: DeletionCascade,
    ctx: Arc<EngineContext>,
}

impl Engine {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        clock: SharedClock,
        notifier: Arc<dyn Notifier>,
        settings: EngineSettings,
    ) -> Self {
        let ctx = Arc::new(EngineContext {
            store,
            clock,
            notifier,
            locks: KeyedLocks::new(),
            advertiser_locks: KeyedLocks::new(),
            settings,
        });

        Self {
            catalog: Catalog::new(ctx.clone()),
            ledger: Ledger::new(ctx.clone()),
            lifecycle: Lifecycle::new(ctx.clone()),
            grace: GracePeriods::new(ctx.clone()),
            sweeper: ExpirySweeper::new(ctx.clone()),
            coverage: CoverageProjector::new(ctx.clone()),
            refunds: Refunds::new(ctx.clone()),
            cascade: DeletionCascade::new(ctx.clone()),
            ctx,
        }
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    pub async fn health_check(&self) -> Result<(), ServiceError> {
        self.ctx.store.health_check().await
    }
}
