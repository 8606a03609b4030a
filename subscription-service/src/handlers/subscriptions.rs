use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use service_core::error::AppError;
use validator::Validate;

use crate::handlers::actor::ActorId;
use crate::models::{
    CancellationOutcome, CreateSubscription, CreatedSubscription, DiscountInput, DiscountType,
    GraceState, InitialPayment, Payment, RecordPayment, SubscriptionStatusHistory,
    SubscriptionView, TransitionOutcome,
};
use crate::startup::AppState;

#[derive(Debug, Deserialize)]
pub struct DiscountRequest {
    pub discount_type: DiscountType,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct InitialPaymentRequest {
    pub amount: Decimal,
    pub payment_method: String,
    pub transaction_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSubscriptionRequest {
    #[validate(length(min = 1, message = "advertiser_id is required"))]
    pub advertiser_id: String,
    #[validate(length(min = 1, message = "plan_id is required"))]
    pub plan_id: String,
    pub start_date: Option<NaiveDate>,
    pub discount: Option<DiscountRequest>,
    pub initial_payment: Option<InitialPaymentRequest>,
    pub vat_override: Option<Decimal>,
    pub coverage_cities: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RecordPaymentRequest {
    pub amount: Decimal,
    pub invoice_id: Option<String>,
    #[validate(length(min = 1, max = 50, message = "payment_method is required"))]
    pub payment_method: String,
    pub payment_date: Option<NaiveDate>,
    #[validate(length(max = 200, message = "transaction_id is too long"))]
    pub transaction_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ReasonRequest {
    #[validate(length(max = 1000, message = "Reason is too long"))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct StopRequest {
    #[validate(length(min = 1, max = 1000, message = "A reason is required"))]
    pub reason: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ReactivateRequest {
    pub start_date: Option<NaiveDate>,
    #[validate(length(max = 1000, message = "Reason is too long"))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct GraceRequest {
    #[validate(range(min = 1, max = 365, message = "Days must be 1-365"))]
    pub days: i64,
    #[validate(length(max = 1000, message = "Reason is too long"))]
    pub reason: Option<String>,
}

#[tracing::instrument(skip(state, actor, request))]
pub async fn create_subscription(
    State(state): State<AppState>,
    actor: ActorId,
    Json(request): Json<CreateSubscriptionRequest>,
) -> Result<(StatusCode, Json<CreatedSubscription>), AppError> {
    request.validate()?;

    let created = state
        .engine
        .ledger
        .create_subscription(CreateSubscription {
            advertiser_id: request.advertiser_id,
            plan_id: request.plan_id,
            start_date: request.start_date,
            discount: request.discount.map(|d| DiscountInput {
                discount_type: d.discount_type,
                amount: d.amount,
            }),
            initial_payment: request.initial_payment.map(|p| InitialPayment {
                amount: p.amount,
                payment_method: p.payment_method,
                transaction_id: p.transaction_id,
            }),
            vat_override: request.vat_override,
            coverage_cities: request.coverage_cities,
            actor_id: actor.0,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<String>,
) -> Result<Json<SubscriptionView>, AppError> {
    let view = state
        .engine
        .lifecycle
        .get_subscription(&subscription_id)
        .await?;
    Ok(Json(view))
}

pub async fn get_history(
    State(state): State<AppState>,
    Path(subscription_id): Path<String>,
) -> Result<Json<Vec<SubscriptionStatusHistory>>, AppError> {
    let history = state.engine.lifecycle.history(&subscription_id).await?;
    Ok(Json(history))
}

#[tracing::instrument(skip(state, actor, request))]
pub async fn record_payment(
    State(state): State<AppState>,
    actor: ActorId,
    Path(subscription_id): Path<String>,
    Json(request): Json<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<Payment>), AppError> {
    request.validate()?;

    let payment = state
        .engine
        .ledger
        .record_payment(RecordPayment {
            subscription_id,
            amount: request.amount,
            invoice_id: request.invoice_id,
            payment_method: request.payment_method,
            payment_date: request.payment_date,
            transaction_id: request.transaction_id,
            actor_id: actor.0,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(payment)))
}

#[tracing::instrument(skip(state, actor, request))]
pub async fn cancel_subscription(
    State(state): State<AppState>,
    actor: ActorId,
    Path(subscription_id): Path<String>,
    request: Option<Json<ReasonRequest>>,
) -> Result<Json<CancellationOutcome>, AppError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    request.validate()?;

    let outcome = state
        .engine
        .ledger
        .cancel_subscription(&subscription_id, &actor.0, request.reason.as_deref())
        .await?;
    Ok(Json(outcome))
}

#[tracing::instrument(skip(state, actor, request))]
pub async fn pause_subscription(
    State(state): State<AppState>,
    actor: ActorId,
    Path(subscription_id): Path<String>,
    request: Option<Json<ReasonRequest>>,
) -> Result<Json<TransitionOutcome>, AppError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    request.validate()?;

    let outcome = state
        .engine
        .lifecycle
        .pause(&subscription_id, &actor.0, request.reason.as_deref())
        .await?;
    Ok(Json(outcome))
}

#[tracing::instrument(skip(state, actor, request))]
pub async fn resume_subscription(
    State(state): State<AppState>,
    actor: ActorId,
    Path(subscription_id): Path<String>,
    request: Option<Json<ReasonRequest>>,
) -> Result<Json<TransitionOutcome>, AppError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    request.validate()?;

    let outcome = state
        .engine
        .lifecycle
        .resume(&subscription_id, &actor.0, request.reason.as_deref())
        .await?;
    Ok(Json(outcome))
}

#[tracing::instrument(skip(state, actor, request))]
pub async fn stop_subscription(
    State(state): State<AppState>,
    actor: ActorId,
    Path(subscription_id): Path<String>,
    Json(request): Json<StopRequest>,
) -> Result<Json<TransitionOutcome>, AppError> {
    request.validate()?;

    let outcome = state
        .engine
        .lifecycle
        .stop(&subscription_id, &actor.0, &request.reason)
        .await?;
    Ok(Json(outcome))
}

#[tracing::instrument(skip(state, actor, request))]
pub async fn reactivate_subscription(
    State(state): State<AppState>,
    actor: ActorId,
    Path(subscription_id): Path<String>,
    request: Option<Json<ReactivateRequest>>,
) -> Result<Json<TransitionOutcome>, AppError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    request.validate()?;

    let outcome = state
        .engine
        .lifecycle
        .reactivate(
            &subscription_id,
            &actor.0,
            request.start_date,
            request.reason.as_deref(),
        )
        .await?;
    Ok(Json(outcome))
}

#[tracing::instrument(skip(state, actor, request))]
pub async fn activate_grace(
    State(state): State<AppState>,
    actor: ActorId,
    Path(subscription_id): Path<String>,
    Json(request): Json<GraceRequest>,
) -> Result<Json<GraceState>, AppError> {
    request.validate()?;

    let grace = state
        .engine
        .grace
        .activate(
            &subscription_id,
            &actor.0,
            request.days,
            request.reason.as_deref(),
        )
        .await?;
    Ok(Json(grace))
}

#[tracing::instrument(skip(state, actor, request))]
pub async fn end_grace(
    State(state): State<AppState>,
    actor: ActorId,
    Path(subscription_id): Path<String>,
    request: Option<Json<ReasonRequest>>,
) -> Result<Json<GraceState>, AppError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    request.validate()?;

    let grace = state
        .engine
        .grace
        .end(&subscription_id, &actor.0, request.reason.as_deref())
        .await?;
    Ok(Json(grace))
}
