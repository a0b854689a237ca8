use axum::{Json, extract::State, http::HeaderMap};
use serde::Deserialize;
use std::sync::Arc;

use crate::blobstore::delete_quietly;
use crate::error::AppError;
use crate::server::AppState;
use crate::server::util::user_id;
use crate::users::{
    CreateUserPayload, DEFAULT_PROFILE_IMAGE, UpdateProfilePayload, User, UserStore as _,
};

pub async fn create_user(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateUserPayload>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = app_state.users.create_user(payload).await?;
    Ok(Json(serde_json::json!({
        "name": user.name,
        "email": user.email,
        "image": user.image,
    })))
}

pub async fn get_profile(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<User>, AppError> {
    let id = user_id(&headers)?;
    let user = app_state
        .users
        .get_user(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("User doesn't exist!".into()))?;
    Ok(Json(user))
}

pub async fn update_profile(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<UpdateProfilePayload>,
) -> Result<Json<User>, AppError> {
    let id = user_id(&headers)?;
    let existing = app_state
        .users
        .get_user(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("User doesn't exist!".into()))?;

    // Replacing the profile image orphans the previous upload.
    if let Some(image) = &payload.image {
        if *image != existing.image && existing.image != DEFAULT_PROFILE_IMAGE {
            delete_quietly(app_state.blobs.as_ref(), &existing.image).await;
        }
    }

    let user = app_state
        .users
        .update_profile(&id, payload)
        .await?
        .ok_or_else(|| AppError::NotFound("User doesn't exist!".into()))?;
    Ok(Json(user))
}

#[derive(Debug, Deserialize)]
pub struct ChangeLanguagePayload {
    pub language: String,
}

pub async fn change_language(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<ChangeLanguagePayload>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = user_id(&headers)?;
    let language = crate::users::Language::parse(&payload.language)
        .ok_or_else(|| AppError::InvalidState(format!("Unknown language: {}!", payload.language)))?;
    let user = app_state
        .users
        .set_language(&id, language)
        .await?
        .ok_or_else(|| AppError::NotFound("User doesn't exist!".into()))?;
    Ok(Json(serde_json::json!({ "language": user.language })))
}

pub async fn get_language(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = user_id(&headers)?;
    let user = app_state
        .users
        .get_user(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("User doesn't exist!".into()))?;
    Ok(Json(serde_json::json!({ "language": user.language })))
}
