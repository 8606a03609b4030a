//! Advertiser coverage projection tests.

mod common;

use common::{subscription_input, TestEngine, ACTOR};
use rust_decimal_macros::dec;
use subscription_service::models::{CoverageType, CustomerType, UpdateBillingSettings};
use subscription_service::services::SubscriptionStore;

#[tokio::test]
async fn coverage_combines_active_kingdom_and_city_subscriptions() {
    let t = TestEngine::new();
    let advertiser = t.advertiser(CustomerType::New).await;
    let kingdom = t.kingdom_plan(dec!(1000), 30).await;
    let city = t.city_plan(dec!(200), &["Riyadh", "Jeddah", "Dammam"]).await;

    let mut narrowed = subscription_input(&advertiser, &city, None, Some(dec!(200)));
    narrowed.coverage_cities = Some(vec!["Jeddah".to_string(), "Riyadh".to_string()]);
    t.engine.ledger.create_subscription(narrowed).await.unwrap();

    let view = t.engine.catalog.get_advertiser(&advertiser.advertiser_id).await.unwrap();
    assert_eq!(view.coverage_type, CoverageType::City);
    assert_eq!(view.coverage_cities, vec!["Jeddah", "Riyadh"]);

    // A second city subscription overlapping the first is de-duplicated.
    let mut overlap = subscription_input(&advertiser, &city, None, Some(dec!(200)));
    overlap.coverage_cities = Some(vec!["Riyadh".to_string(), "Dammam".to_string()]);
    t.engine.ledger.create_subscription(overlap).await.unwrap();

    t.subscribe(&advertiser, &kingdom, Some(dec!(1000))).await;

    let view = t.engine.catalog.get_advertiser(&advertiser.advertiser_id).await.unwrap();
    assert_eq!(view.coverage_type, CoverageType::Both);
    assert_eq!(view.coverage_cities, vec!["Dammam", "Jeddah", "Riyadh"]);
}

#[tokio::test]
async fn unpaid_and_paused_subscriptions_grant_no_visibility() {
    let t = TestEngine::new();
    let advertiser = t.advertiser(CustomerType::New).await;
    let plan = t.kingdom_plan(dec!(1000), 30).await;

    t.subscribe(&advertiser, &plan, None).await;
    let view = t.engine.catalog.get_advertiser(&advertiser.advertiser_id).await.unwrap();
    assert_eq!(view.coverage_type, CoverageType::None);

    let paid = t.subscribe(&advertiser, &plan, Some(dec!(1000))).await;
    let view = t.engine.catalog.get_advertiser(&advertiser.advertiser_id).await.unwrap();
    assert_eq!(view.coverage_type, CoverageType::Kingdom);

    t.engine
        .lifecycle
        .pause(&paid.subscription_id, ACTOR, None)
        .await
        .unwrap();
    let view = t.engine.catalog.get_advertiser(&advertiser.advertiser_id).await.unwrap();
    assert_eq!(view.coverage_type, CoverageType::None);

    t.engine
        .lifecycle
        .resume(&paid.subscription_id, ACTOR, None)
        .await
        .unwrap();
    let view = t.engine.catalog.get_advertiser(&advertiser.advertiser_id).await.unwrap();
    assert_eq!(view.coverage_type, CoverageType::Kingdom);
}

#[tokio::test]
async fn coverage_failure_does_not_fail_the_payment() {
    let t = TestEngine::new();
    let advertiser = t.advertiser(CustomerType::New).await;
    let plan = t.kingdom_plan(dec!(1000), 30).await;
    let created = t.subscribe(&advertiser, &plan, None).await;

    t.store.fail_next("set_advertiser_coverage", 1);
    t.pay(&created.subscription_id, dec!(1000)).await;

    // The read model is stale until the next rebuild.
    let view = t.engine.catalog.get_advertiser(&advertiser.advertiser_id).await.unwrap();
    assert_eq!(view.coverage_type, CoverageType::None);

    let rebuilt = t
        .engine
        .coverage
        .rebuild(&advertiser.advertiser_id)
        .await
        .unwrap();
    assert_eq!(rebuilt.coverage_type, CoverageType::Kingdom);
}

#[tokio::test]
async fn billing_update_survives_concurrent_coverage_rebuilds() {
    let t = TestEngine::new();
    let advertiser = t.advertiser(CustomerType::New).await;
    let plan = t.kingdom_plan(dec!(400), 30).await;
    let created = t.subscribe(&advertiser, &plan, None).await;
    let id = advertiser.advertiser_id.as_str();

    let update = UpdateBillingSettings {
        customer_type: Some(CustomerType::Vip),
        vat_enabled: Some(true),
        vat_percentage: Some(dec!(15)),
        ..Default::default()
    };
    let (updated, _, first, second) = tokio::join!(
        t.engine.catalog.update_billing_settings(id, update),
        t.pay(&created.subscription_id, dec!(400)),
        t.engine.coverage.rebuild(id),
        t.engine.coverage.rebuild(id),
    );
    updated.unwrap();
    first.unwrap();
    second.unwrap();

    let view = t.engine.catalog.get_advertiser(id).await.unwrap();
    assert_eq!(view.customer_type, CustomerType::Vip);
    assert!(view.vat_enabled);
    assert_eq!(view.vat_percentage, dec!(15));
    assert_eq!(view.coverage_type, CoverageType::Kingdom);
    assert!(t.engine.context().advertiser_locks.is_empty());
}

#[tokio::test]
async fn rebuild_writes_only_coverage_fields() {
    let t = TestEngine::new();
    let advertiser = t.advertiser(CustomerType::New).await;
    let plan = t.kingdom_plan(dec!(100), 30).await;
    t.subscribe(&advertiser, &plan, Some(dec!(100))).await;

    // Billing changes made behind the projector must survive a rebuild.
    let mut stale = t.store.get_advertiser(&advertiser.advertiser_id).await.unwrap().unwrap();
    stale.customer_type = CustomerType::Trusted;
    stale.coverage_type = CoverageType::None;
    t.store.replace_advertiser(&stale).await.unwrap();

    let rebuilt = t.engine.coverage.rebuild(&advertiser.advertiser_id).await.unwrap();
    assert_eq!(rebuilt.coverage_type, CoverageType::Kingdom);

    let stored = t.store.get_advertiser(&advertiser.advertiser_id).await.unwrap().unwrap();
    assert_eq!(stored.customer_type, CustomerType::Trusted);
    assert_eq!(stored.coverage_type, CoverageType::Kingdom);
}

#[tokio::test]
async fn city_outside_the_plan_is_rejected() {
    let t = TestEngine::new();
    let advertiser = t.advertiser(CustomerType::New).await;
    let city = t.city_plan(dec!(200), &["Riyadh"]).await;

    let mut input = subscription_input(&advertiser, &city, None, None);
    input.coverage_cities = Some(vec!["Abha".to_string()]);
    assert!(t.engine.ledger.create_subscription(input).await.is_err());
}
