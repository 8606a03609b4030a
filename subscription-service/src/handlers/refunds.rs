use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use service_core::error::AppError;
use validator::Validate;

use crate::handlers::actor::ActorId;
use crate::models::{CreateRefund, Refund, RefundStatus};
use crate::startup::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRefundRequest {
    #[validate(length(min = 1, message = "subscription_id is required"))]
    pub subscription_id: String,
    pub invoice_id: Option<String>,
    pub payment_id: Option<String>,
    pub amount: Decimal,
    #[validate(length(min = 1, max = 1000, message = "A reason is required"))]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRefundStatusRequest {
    pub status: RefundStatus,
}

#[tracing::instrument(skip(state, actor, request))]
pub async fn create_refund(
    State(state): State<AppState>,
    actor: ActorId,
    Json(request): Json<CreateRefundRequest>,
) -> Result<(StatusCode, Json<Refund>), AppError> {
    request.validate()?;

    let refund = state
        .engine
        .refunds
        .create_refund(CreateRefund {
            subscription_id: request.subscription_id,
            invoice_id: request.invoice_id,
            payment_id: request.payment_id,
            amount: request.amount,
            reason: request.reason,
            actor_id: actor.0,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(refund)))
}

pub async fn get_refund(
    State(state): State<AppState>,
    Path(refund_id): Path<String>,
) -> Result<Json<Refund>, AppError> {
    let refund = state.engine.refunds.get_refund(&refund_id).await?;
    Ok(Json(refund))
}

#[tracing::instrument(skip(state, actor))]
pub async fn update_refund_status(
    State(state): State<AppState>,
    actor: ActorId,
    Path(refund_id): Path<String>,
    Json(request): Json<UpdateRefundStatusRequest>,
) -> Result<Json<Refund>, AppError> {
    let refund = state
        .engine
        .refunds
        .update_status(&refund_id, request.status, &actor.0)
        .await?;
    Ok(Json(refund))
}
