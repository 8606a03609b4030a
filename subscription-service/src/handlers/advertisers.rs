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
use crate::models::{
    Advertiser, AdvertiserStatus, CascadeRecord, CreateAdvertiser, CustomerType,
    FinancialSummary, UpdateBillingSettings,
};
use crate::startup::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAdvertiserRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,
    #[validate(length(min = 5, max = 20, message = "Invalid phone number"))]
    pub phone: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    #[serde(default)]
    pub customer_type: CustomerType,
    #[serde(default)]
    pub vat_enabled: bool,
    #[serde(default)]
    pub vat_percentage: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBillingRequest {
    pub customer_type: Option<CustomerType>,
    pub vat_enabled: Option<bool>,
    pub vat_percentage: Option<Decimal>,
    pub status: Option<AdvertiserStatus>,
}

#[tracing::instrument(skip(state, _actor, request))]
pub async fn create_advertiser(
    State(state): State<AppState>,
    _actor: ActorId,
    Json(request): Json<CreateAdvertiserRequest>,
) -> Result<(StatusCode, Json<Advertiser>), AppError> {
    request.validate()?;

    let advertiser = state
        .engine
        .catalog
        .create_advertiser(CreateAdvertiser {
            name: request.name,
            phone: request.phone,
            email: request.email,
            customer_type: request.customer_type,
            vat_enabled: request.vat_enabled,
            vat_percentage: request.vat_percentage,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(advertiser)))
}

pub async fn get_advertiser(
    State(state): State<AppState>,
    Path(advertiser_id): Path<String>,
) -> Result<Json<Advertiser>, AppError> {
    let advertiser = state.engine.catalog.get_advertiser(&advertiser_id).await?;
    Ok(Json(advertiser))
}

#[tracing::instrument(skip(state, _actor, request))]
pub async fn update_billing(
    State(state): State<AppState>,
    _actor: ActorId,
    Path(advertiser_id): Path<String>,
    Json(request): Json<UpdateBillingRequest>,
) -> Result<Json<Advertiser>, AppError> {
    let advertiser = state
        .engine
        .catalog
        .update_billing_settings(
            &advertiser_id,
            UpdateBillingSettings {
                customer_type: request.customer_type,
                vat_enabled: request.vat_enabled,
                vat_percentage: request.vat_percentage,
                status: request.status,
            },
        )
        .await?;
    Ok(Json(advertiser))
}

/// Start the deletion saga. The returned record shows how far it got.
#[tracing::instrument(skip(state, actor))]
pub async fn delete_advertiser(
    State(state): State<AppState>,
    actor: ActorId,
    Path(advertiser_id): Path<String>,
) -> Result<(StatusCode, Json<CascadeRecord>), AppError> {
    let record = state
        .engine
        .cascade
        .delete_advertiser(&advertiser_id, &actor.0)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(record)))
}

pub async fn financial_summary(
    State(state): State<AppState>,
    Path(advertiser_id): Path<String>,
) -> Result<Json<FinancialSummary>, AppError> {
    let summary = state.engine.ledger.financial_summary(&advertiser_id).await?;
    Ok(Json(summary))
}

pub async fn get_cascade(
    State(state): State<AppState>,
    Path(cascade_id): Path<String>,
) -> Result<Json<CascadeRecord>, AppError> {
    let record = state.engine.cascade.get_cascade(&cascade_id).await?;
    Ok(Json(record))
}

#[tracing::instrument(skip(state, _actor))]
pub async fn resume_cascade(
    State(state): State<AppState>,
    _actor: ActorId,
    Path(cascade_id): Path<String>,
) -> Result<Json<CascadeRecord>, AppError> {
    let record = state.engine.cascade.resume_cascade(&cascade_id).await?;
    Ok(Json(record))
}
