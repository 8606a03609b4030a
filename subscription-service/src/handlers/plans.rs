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
use crate::models::{CreatePlan, Plan, PlanCoverage};
use crate::startup::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePlanRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(range(min = 1, max = 3650, message = "Duration must be 1-3650 days"))]
    pub duration_days: i64,
    pub price: Decimal,
    pub coverage_type: PlanCoverage,
    #[serde(default)]
    pub coverage_cities: Vec<String>,
}

#[tracing::instrument(skip(state, _actor, request))]
pub async fn create_plan(
    State(state): State<AppState>,
    _actor: ActorId,
    Json(request): Json<CreatePlanRequest>,
) -> Result<(StatusCode, Json<Plan>), AppError> {
    request.validate()?;

    let plan = state
        .engine
        .catalog
        .create_plan(CreatePlan {
            name: request.name,
            description: request.description,
            duration_days: request.duration_days,
            price: request.price,
            coverage_type: request.coverage_type,
            coverage_cities: request.coverage_cities,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(plan)))
}

pub async fn get_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
) -> Result<Json<Plan>, AppError> {
    let plan = state.engine.catalog.get_plan(&plan_id).await?;
    Ok(Json(plan))
}

#[tracing::instrument(skip(state, _actor))]
pub async fn deactivate_plan(
    State(state): State<AppState>,
    _actor: ActorId,
    Path(plan_id): Path<String>,
) -> Result<Json<Plan>, AppError> {
    let plan = state.engine.catalog.deactivate_plan(&plan_id).await?;
    Ok(Json(plan))
}
