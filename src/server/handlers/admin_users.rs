use axum::{
    Json,
    extract::{Path, Query, State},
};
use std::sync::Arc;

use crate::error::AppError;
use crate::server::AppState;
use crate::server::util::Paginate;
use crate::users::{User, UserStatus, UserStore as _};

pub async fn list_users(
    State(app_state): State<Arc<AppState>>,
    Query(paginate): Query<Paginate>,
) -> Result<Json<Vec<User>>, AppError> {
    let users = app_state
        .users
        .list_users(paginate.page, paginate.limit)
        .await?;
    Ok(Json(users))
}

pub async fn get_user(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<User>, AppError> {
    let user = app_state
        .users
        .get_user(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found!".into()))?;
    Ok(Json(user))
}

pub async fn delete_user(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !app_state.users.delete_user(&id).await? {
        return Err(AppError::NotFound("User not found!".into()));
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}

pub async fn block_user(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<User>, AppError> {
    let user = app_state
        .users
        .set_status(&id, UserStatus::Blocked)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found!".into()))?;
    Ok(Json(user))
}

pub async fn unblock_user(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<User>, AppError> {
    let user = app_state
        .users
        .set_status(&id, UserStatus::Active)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found!".into()))?;
    Ok(Json(user))
}
