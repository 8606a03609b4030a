//! Expiry sweep integration tests.

mod common;

use common::{date, TestEngine, ACTOR};
use rust_decimal_macros::dec;
use std::time::Duration;
use subscription_service::models::{ActionType, CoverageType, CustomerType, SubscriptionStatus};
use subscription_service::services::{EngineSettings, SubscriptionStore};

#[tokio::test]
async fn unpaid_vip_subscription_gets_grace_then_expires() {
    let t = TestEngine::new();
    let advertiser = t.advertiser(CustomerType::Vip).await;
    let plan = t.kingdom_plan(dec!(300), 30).await;
    let created = t.subscribe(&advertiser, &plan, None).await;
    let id = created.subscription_id.clone();

    // Admin puts the unpaid order live.
    t.engine.lifecycle.reactivate(&id, ACTOR, None, None).await.unwrap();

    t.clock.advance_days(31);
    let report = t.engine.sweeper.sweep_expirations().await.unwrap();
    assert_eq!(report.grace_activated, vec![id.clone()]);
    assert!(report.expired.is_empty());

    let sub = t.store.get_subscription(&id).await.unwrap().unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert!(sub.is_in_grace_period);
    assert_eq!(sub.grace_period_end_date, Some(date(2025, 2, 14)));
    assert_eq!(sub.grace_period_extensions[0].days_added, 14);
    assert_eq!(sub.grace_period_extensions[0].extended_by, "system");

    let sent = t.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].advertiser_id, advertiser.advertiser_id);
    assert!(sent[0].message.contains("14-day"));

    t.clock.advance_days(14);
    let report = t.engine.sweeper.sweep_expirations().await.unwrap();
    assert_eq!(report.grace_ended, vec![id.clone()]);

    let sub = t.store.get_subscription(&id).await.unwrap().unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Expired);
    assert!(!sub.is_in_grace_period);
    assert_eq!(sub.actual_end_date, Some(date(2025, 2, 15)));

    let history = t.engine.lifecycle.history(&id).await.unwrap();
    let actions: Vec<ActionType> = history.iter().map(|h| h.action_type).collect();
    assert_eq!(
        actions,
        vec![
            ActionType::Reactivate,
            ActionType::GraceActivate,
            ActionType::GraceEnd
        ]
    );
    assert_eq!(history[2].changed_by, "system");
}

#[tokio::test]
async fn grace_length_follows_customer_tier() {
    let t = TestEngine::new();
    let plan = t.kingdom_plan(dec!(300), 30).await;

    let mut expected = Vec::new();
    for (tier, days) in [
        (CustomerType::Trusted, 7),
        (CustomerType::New, 3),
        (CustomerType::Vip, 14),
    ] {
        let advertiser = t.advertiser(tier).await;
        let created = t.subscribe(&advertiser, &plan, None).await;
        t.engine
            .lifecycle
            .reactivate(&created.subscription_id, ACTOR, None, None)
            .await
            .unwrap();
        expected.push((created.subscription_id, days));
    }

    t.clock.advance_days(31);
    let report = t.engine.sweeper.sweep_expirations().await.unwrap();
    assert_eq!(report.grace_activated.len(), 3);

    for (id, days) in expected {
        let sub = t.store.get_subscription(&id).await.unwrap().unwrap();
        assert_eq!(
            sub.grace_period_end_date,
            Some(date(2025, 1, 31) + chrono::Duration::days(days))
        );
    }
}

#[tokio::test]
async fn paid_subscription_expires_without_grace() {
    let t = TestEngine::new();
    let advertiser = t.advertiser(CustomerType::Vip).await;
    let plan = t.kingdom_plan(dec!(300), 30).await;
    let created = t.subscribe(&advertiser, &plan, Some(dec!(50))).await;

    let refreshed = t.engine.catalog.get_advertiser(&advertiser.advertiser_id).await.unwrap();
    assert_eq!(refreshed.coverage_type, CoverageType::Kingdom);

    t.clock.advance_days(31);
    let report = t.engine.sweeper.sweep_expirations().await.unwrap();
    assert_eq!(report.expired, vec![created.subscription_id.clone()]);
    assert!(report.grace_activated.is_empty());

    let sub = t
        .store
        .get_subscription(&created.subscription_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Expired);
    assert!(!sub.is_in_grace_period);
    assert_eq!(sub.actual_end_date, Some(date(2025, 2, 1)));

    let refreshed = t.engine.catalog.get_advertiser(&advertiser.advertiser_id).await.unwrap();
    assert_eq!(refreshed.coverage_type, CoverageType::None);
    assert_eq!(t.notifier.send_count(), 1);
}

#[tokio::test]
async fn sweeping_twice_changes_nothing_the_second_time() {
    let t = TestEngine::new();
    let advertiser = t.advertiser(CustomerType::Trusted).await;
    let plan = t.kingdom_plan(dec!(300), 30).await;
    let paid = t.subscribe(&advertiser, &plan, Some(dec!(300))).await;
    let unpaid = t.subscribe(&advertiser, &plan, None).await;
    t.engine
        .lifecycle
        .reactivate(&unpaid.subscription_id, ACTOR, None, None)
        .await
        .unwrap();

    t.clock.advance_days(31);
    let first = t.engine.sweeper.sweep_expirations().await.unwrap();
    assert_eq!(first.expired.len(), 1);
    assert_eq!(first.grace_activated.len(), 1);

    let snapshot = (
        t.store.get_subscription(&paid.subscription_id).await.unwrap().unwrap(),
        t.store.get_subscription(&unpaid.subscription_id).await.unwrap().unwrap(),
    );

    let second = t.engine.sweeper.sweep_expirations().await.unwrap();
    assert!(second.is_empty());

    let after = (
        t.store.get_subscription(&paid.subscription_id).await.unwrap().unwrap(),
        t.store.get_subscription(&unpaid.subscription_id).await.unwrap().unwrap(),
    );
    assert_eq!(snapshot.0.version, after.0.version);
    assert_eq!(snapshot.1.version, after.1.version);
    assert_eq!(snapshot.1.grace_period_end_date, after.1.grace_period_end_date);
    assert_eq!(t.notifier.send_count(), 2);
}

#[tokio::test]
async fn only_lapsed_active_subscriptions_are_swept() {
    let t = TestEngine::new();
    let advertiser = t.advertiser(CustomerType::New).await;
    let plan = t.kingdom_plan(dec!(300), 30).await;

    let ends_today = t.subscribe(&advertiser, &plan, Some(dec!(300))).await;
    let paused = t.subscribe(&advertiser, &plan, Some(dec!(300))).await;
    t.engine
        .lifecycle
        .pause(&paused.subscription_id, ACTOR, None)
        .await
        .unwrap();
    let pending = t.subscribe(&advertiser, &plan, None).await;

    // End date is today: still running.
    t.clock.advance_days(30);
    let report = t.engine.sweeper.sweep_expirations().await.unwrap();
    assert!(report.is_empty());

    t.clock.advance_days(1);
    let report = t.engine.sweeper.sweep_expirations().await.unwrap();
    assert_eq!(report.expired, vec![ends_today.subscription_id.clone()]);

    for id in [&paused.subscription_id, &pending.subscription_id] {
        let sub = t.store.get_subscription(id).await.unwrap().unwrap();
        assert_ne!(sub.status, SubscriptionStatus::Expired);
    }
}

#[tokio::test]
async fn notifier_failures_do_not_block_the_sweep() {
    let settings = EngineSettings {
        notifier_timeout: Duration::from_millis(50),
        ..EngineSettings::default()
    };
    let t = TestEngine::with_settings(settings);
    let advertiser = t.advertiser(CustomerType::New).await;
    let plan = t.kingdom_plan(dec!(300), 30).await;
    let failing = t.subscribe(&advertiser, &plan, Some(dec!(300))).await;

    t.notifier.set_failing(true);
    t.clock.advance_days(31);
    let report = t.engine.sweeper.sweep_expirations().await.unwrap();
    assert_eq!(report.expired, vec![failing.subscription_id]);

    t.notifier.set_failing(false);
    t.notifier.set_delay(Some(Duration::from_secs(5)));
    let slow = t.subscribe(&advertiser, &plan, Some(dec!(300))).await;
    t.clock.advance_days(31);

    let started = std::time::Instant::now();
    let report = t.engine.sweeper.sweep_expirations().await.unwrap();
    assert_eq!(report.expired, vec![slow.subscription_id]);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn store_failure_on_one_subscription_is_reported_and_retried() {
    let t = TestEngine::new();
    let advertiser = t.advertiser(CustomerType::New).await;
    let plan = t.kingdom_plan(dec!(300), 30).await;
    t.subscribe(&advertiser, &plan, Some(dec!(300))).await;
    t.subscribe(&advertiser, &plan, Some(dec!(300))).await;

    t.clock.advance_days(31);
    t.store.fail_next("replace_subscription", 1);
    let report = t.engine.sweeper.sweep_expirations().await.unwrap();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.expired.len(), 1);

    let retry = t.engine.sweeper.sweep_expirations().await.unwrap();
    assert_eq!(retry.expired, report.failed);
}
