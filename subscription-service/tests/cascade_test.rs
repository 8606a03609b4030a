//! Advertiser deletion saga tests.

mod common;

use common::{TestEngine, ACTOR};
use rust_decimal_macros::dec;
use subscription_service::models::{
    AdvertiserStatus, CascadeStatus, CascadeStep, CoverageType, CreateRefund, CustomerType,
};
use subscription_service::services::{ServiceError, SubscriptionStore};

/// Advertiser with one paid and one unpaid subscription, a refund and history.
async fn populated(t: &TestEngine) -> String {
    let advertiser = t.advertiser(CustomerType::Trusted).await;
    let plan = t.kingdom_plan(dec!(300), 30).await;

    let paid = t.subscribe(&advertiser, &plan, Some(dec!(100))).await;
    t.pay(&paid.subscription_id, dec!(200)).await;
    t.engine
        .lifecycle
        .pause(&paid.subscription_id, ACTOR, None)
        .await
        .unwrap();
    t.engine
        .refunds
        .create_refund(CreateRefund {
            subscription_id: paid.subscription_id.clone(),
            invoice_id: None,
            payment_id: None,
            amount: dec!(20),
            reason: "duplicate charge".to_string(),
            actor_id: ACTOR.to_string(),
        })
        .await
        .unwrap();
    t.subscribe(&advertiser, &plan, None).await;

    advertiser.advertiser_id
}

#[tokio::test]
async fn deletion_removes_children_before_the_advertiser() {
    let t = TestEngine::new();
    let advertiser_id = populated(&t).await;

    let record = t
        .engine
        .cascade
        .delete_advertiser(&advertiser_id, ACTOR)
        .await
        .unwrap();

    assert_eq!(record.status, CascadeStatus::Completed);
    let steps: Vec<CascadeStep> = record.completed_steps.iter().map(|r| r.step).collect();
    assert_eq!(steps, CascadeStep::ORDER.to_vec());

    let deleted = |step: CascadeStep| {
        record
            .completed_steps
            .iter()
            .find(|r| r.step == step)
            .map(|r| r.deleted)
    };
    assert_eq!(deleted(CascadeStep::Payments), Some(2));
    assert_eq!(deleted(CascadeStep::Invoices), Some(2));
    assert_eq!(deleted(CascadeStep::Refunds), Some(1));
    assert_eq!(deleted(CascadeStep::StatusHistory), Some(1));
    assert_eq!(deleted(CascadeStep::Subscriptions), Some(2));
    assert_eq!(deleted(CascadeStep::Advertiser), Some(1));

    assert!(t.store.get_advertiser(&advertiser_id).await.unwrap().is_none());
    assert!(t
        .store
        .list_subscriptions_by_advertiser(&advertiser_id)
        .await
        .unwrap()
        .is_empty());
    assert!(t
        .store
        .list_payments_by_advertiser(&advertiser_id)
        .await
        .unwrap()
        .is_empty());

    let stored = t.engine.cascade.get_cascade(&record.cascade_id).await.unwrap();
    assert_eq!(stored.status, CascadeStatus::Completed);
    assert_eq!(stored.requested_by, ACTOR);
    assert_eq!(stored.previous_advertiser_status, Some(AdvertiserStatus::Active));
}

#[tokio::test]
async fn failure_before_any_deletion_is_compensated() {
    let t = TestEngine::new();
    let advertiser_id = populated(&t).await;
    let plan = t.kingdom_plan(dec!(100), 30).await;
    let advertiser = t.engine.catalog.get_advertiser(&advertiser_id).await.unwrap();
    t.subscribe(&advertiser, &plan, Some(dec!(100))).await;

    t.store.fail_next("delete_payments_by_advertiser", 1);
    let record = t
        .engine
        .cascade
        .delete_advertiser(&advertiser_id, ACTOR)
        .await
        .unwrap();

    assert_eq!(record.status, CascadeStatus::Compensated);
    assert_eq!(record.failed_step, Some(CascadeStep::Payments));
    assert!(record.error.is_some());
    assert!(record.completed_steps.is_empty());

    let advertiser = t.engine.catalog.get_advertiser(&advertiser_id).await.unwrap();
    assert_eq!(advertiser.status, AdvertiserStatus::Active);
    assert_eq!(advertiser.coverage_type, CoverageType::Kingdom);
    assert_eq!(
        t.store
            .list_payments_by_advertiser(&advertiser_id)
            .await
            .unwrap()
            .len(),
        3
    );

    let resumed = t
        .engine
        .cascade
        .resume_cascade(&record.cascade_id)
        .await
        .unwrap();
    assert_eq!(resumed.status, CascadeStatus::Completed);
    assert!(t.store.get_advertiser(&advertiser_id).await.unwrap().is_none());
}

#[tokio::test]
async fn failure_after_deletions_is_resumable() {
    let t = TestEngine::new();
    let advertiser_id = populated(&t).await;

    t.store.fail_next("delete_subscriptions_by_advertiser", 1);
    let record = t
        .engine
        .cascade
        .delete_advertiser(&advertiser_id, ACTOR)
        .await
        .unwrap();

    assert_eq!(record.status, CascadeStatus::Failed);
    assert_eq!(record.failed_step, Some(CascadeStep::Subscriptions));
    assert_eq!(
        record.pending_steps(),
        vec![CascadeStep::Subscriptions, CascadeStep::Advertiser]
    );

    // Partial progress is visible: the advertiser is hidden but still present.
    let advertiser = t.store.get_advertiser(&advertiser_id).await.unwrap().unwrap();
    assert_eq!(advertiser.status, AdvertiserStatus::Inactive);
    assert_eq!(advertiser.coverage_type, CoverageType::None);
    assert!(t
        .store
        .list_invoices_by_advertiser(&advertiser_id)
        .await
        .unwrap()
        .is_empty());

    let stored = t.engine.cascade.get_cascade(&record.cascade_id).await.unwrap();
    assert_eq!(stored.status, CascadeStatus::Failed);

    let resumed = t
        .engine
        .cascade
        .resume_cascade(&record.cascade_id)
        .await
        .unwrap();
    assert_eq!(resumed.status, CascadeStatus::Completed);
    assert_eq!(resumed.completed_steps.len(), CascadeStep::ORDER.len());
    assert_eq!(resumed.failed_step, None);
    assert!(t.store.get_advertiser(&advertiser_id).await.unwrap().is_none());

    // Resuming a finished cascade is a no-op.
    let again = t
        .engine
        .cascade
        .resume_cascade(&record.cascade_id)
        .await
        .unwrap();
    assert_eq!(again.updated_utc, resumed.updated_utc);
}

#[tokio::test]
async fn deleting_unknown_advertiser_fails() {
    let t = TestEngine::new();
    let err = t
        .engine
        .cascade
        .delete_advertiser("missing", ACTOR)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    let err = t.engine.cascade.get_cascade("missing").await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}
