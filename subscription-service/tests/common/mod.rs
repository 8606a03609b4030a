//! Test helper module for subscription-service integration tests.
//!
//! Every test gets its own in-memory store, a manual clock in the +03:00
//! business timezone and a recording notifier.

#![allow(dead_code)]

use chrono::{FixedOffset, NaiveDate};
use rust_decimal::Decimal;
use std::sync::Arc;
use subscription_service::models::{
    Advertiser, CreateAdvertiser, CreatePlan, CreateSubscription, CreatedSubscription,
    CustomerType, DiscountInput, InitialPayment, Plan, PlanCoverage, RecordPayment,
};
use subscription_service::services::{
    init_metrics, Engine, EngineSettings, InMemoryStore, ManualClock, MockNotifier,
};
use subscription_service::startup::{build_router, AppState};
use tokio::net::TcpListener;

pub const ACTOR: &str = "admin-1";

pub fn business_offset() -> FixedOffset {
    FixedOffset::east_opt(3 * 3600).unwrap()
}

pub fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Engine wired to in-memory collaborators the test can inspect.
pub struct TestEngine {
    pub engine: Engine,
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<MockNotifier>,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_settings(EngineSettings::default())
    }

    pub fn with_settings(settings: EngineSettings) -> Self {
        init_metrics();
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::at_date(start_date(), business_offset()));
        let notifier = Arc::new(MockNotifier::new());
        let engine = Engine::new(store.clone(), clock.clone(), notifier.clone(), settings);

        Self {
            engine,
            store,
            clock,
            notifier,
        }
    }

    pub async fn advertiser(&self, customer_type: CustomerType) -> Advertiser {
        self.engine
            .catalog
            .create_advertiser(CreateAdvertiser {
                name: "Al Noor Trading".to_string(),
                phone: Some("+966500000001".to_string()),
                email: None,
                customer_type,
                vat_enabled: false,
                vat_percentage: Decimal::ZERO,
            })
            .await
            .expect("Failed to create advertiser")
    }

    pub async fn vat_advertiser(&self, vat_percentage: Decimal) -> Advertiser {
        self.engine
            .catalog
            .create_advertiser(CreateAdvertiser {
                name: "Gulf Motors".to_string(),
                phone: None,
                email: Some("billing@gulfmotors.example".to_string()),
                customer_type: CustomerType::Trusted,
                vat_enabled: true,
                vat_percentage,
            })
            .await
            .expect("Failed to create advertiser")
    }

    pub async fn kingdom_plan(&self, price: Decimal, duration_days: i64) -> Plan {
        self.engine
            .catalog
            .create_plan(CreatePlan {
                name: "Kingdom Gold".to_string(),
                description: None,
                duration_days,
                price,
                coverage_type: PlanCoverage::Kingdom,
                coverage_cities: Vec::new(),
            })
            .await
            .expect("Failed to create plan")
    }

    pub async fn city_plan(&self, price: Decimal, cities: &[&str]) -> Plan {
        self.engine
            .catalog
            .create_plan(CreatePlan {
                name: "City Silver".to_string(),
                description: Some("Listed in selected cities".to_string()),
                duration_days: 30,
                price,
                coverage_type: PlanCoverage::City,
                coverage_cities: cities.iter().map(|c| c.to_string()).collect(),
            })
            .await
            .expect("Failed to create plan")
    }

    /// Subscribe starting today, optionally paying `initial` up front.
    pub async fn subscribe(
        &self,
        advertiser: &Advertiser,
        plan: &Plan,
        initial: Option<Decimal>,
    ) -> CreatedSubscription {
        self.engine
            .ledger
            .create_subscription(subscription_input(advertiser, plan, None, initial))
            .await
            .expect("Failed to create subscription")
    }

    pub async fn pay(&self, subscription_id: &str, amount: Decimal) {
        self.engine
            .ledger
            .record_payment(payment_input(subscription_id, amount))
            .await
            .expect("Failed to record payment");
    }
}

pub fn subscription_input(
    advertiser: &Advertiser,
    plan: &Plan,
    discount: Option<DiscountInput>,
    initial: Option<Decimal>,
) -> CreateSubscription {
    CreateSubscription {
        advertiser_id: advertiser.advertiser_id.clone(),
        plan_id: plan.plan_id.clone(),
        start_date: None,
        discount,
        initial_payment: initial.map(|amount| InitialPayment {
            amount,
            payment_method: "bank_transfer".to_string(),
            transaction_id: None,
        }),
        vat_override: None,
        coverage_cities: None,
        actor_id: ACTOR.to_string(),
    }
}

pub fn payment_input(subscription_id: &str, amount: Decimal) -> RecordPayment {
    RecordPayment {
        subscription_id: subscription_id.to_string(),
        amount,
        invoice_id: None,
        payment_method: "cash".to_string(),
        payment_date: None,
        transaction_id: None,
        actor_id: ACTOR.to_string(),
    }
}

/// Test application serving the HTTP router on a random port.
pub struct TestApp {
    pub address: String,
    pub harness: TestEngine,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let harness = TestEngine::new();
        let router = build_router(AppState::new(harness.engine.clone()));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind random port");
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            axum::serve(listener, router)
                .await
                .expect("Test server failed");
        });

        Self {
            address: format!("http://127.0.0.1:{}", port),
            harness,
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn post_json(&self, path: &str, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .header("x-actor-id", ACTOR)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to execute request")
    }
}
