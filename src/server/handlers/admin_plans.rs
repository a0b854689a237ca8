use axum::{
    Json,
    extract::{Path, Query, State},
};
use std::sync::Arc;

use crate::error::AppError;
use crate::server::AppState;
use crate::server::util::Paginate;
use crate::subscription::{
    CreatePlanPayload, LedgerStore as _, Plan, PlanStore as _, SubscriberRecord, UpdatePlanPayload,
};

pub async fn list_plans(
    State(app_state): State<Arc<AppState>>,
    Query(paginate): Query<Paginate>,
) -> Result<Json<Vec<Plan>>, AppError> {
    Ok(Json(
        app_state
            .plans
            .list_plans(paginate.page, paginate.limit)
            .await?,
    ))
}

pub async fn create_plan(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreatePlanPayload>,
) -> Result<Json<Plan>, AppError> {
    Ok(Json(app_state.plans.create_plan(payload).await?))
}

pub async fn update_plan(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdatePlanPayload>,
) -> Result<Json<Plan>, AppError> {
    let plan = app_state
        .plans
        .update_plan(&id, payload)
        .await?
        .ok_or_else(|| AppError::NotFound("Plan not found!".into()))?;
    Ok(Json(plan))
}

pub async fn delete_plan(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Plan>, AppError> {
    let plan = app_state
        .plans
        .soft_delete_plan(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Plan not found for delete!".into()))?;
    Ok(Json(plan))
}

pub async fn list_subscribers(
    State(app_state): State<Arc<AppState>>,
    Query(paginate): Query<Paginate>,
) -> Result<Json<Vec<SubscriberRecord>>, AppError> {
    Ok(Json(
        app_state
            .ledger
            .list_subscribers(paginate.page, paginate.limit)
            .await?,
    ))
}

pub async fn get_subscriber(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SubscriberRecord>, AppError> {
    let record = app_state
        .ledger
        .get_entry(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Subscriber not found!".into()))?;
    Ok(Json(record))
}
