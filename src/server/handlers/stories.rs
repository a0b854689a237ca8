use axum::{
    Json,
    extract::{Path, Query, State},
    http::HeaderMap,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::catalog::{Story, StoryCategory, StoryFilter, StoryStore as _, Timer};
use crate::error::AppError;
use crate::server::AppState;
use crate::server::util::user_id;
use crate::users::UserStore as _;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowseQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub timer: Option<String>,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    10
}

impl BrowseQuery {
    fn filter(&self) -> Result<StoryFilter, AppError> {
        let category = match self.category.as_deref() {
            Some(s) => Some(
                StoryCategory::parse(s)
                    .ok_or_else(|| AppError::InvalidState(format!("Unknown category: {s}!")))?,
            ),
            None => None,
        };
        // "0" asks for any length, i.e. no timer filter at all.
        let timer = match self.timer.as_deref() {
            Some("0") | None => None,
            Some(s) => Some(
                Timer::parse(s)
                    .ok_or_else(|| AppError::InvalidState(format!("Unknown timer: {s}!")))?,
            ),
        };
        Ok(StoryFilter { category, timer })
    }
}

pub async fn guest_stories(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<BrowseQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let filter = query.filter()?;
    let stories = app_state
        .catalog
        .guest_sample(query.page, query.limit, &filter)
        .await?;
    Ok(Json(serde_json::json!({ "stories": stories })))
}

pub async fn gated_stories(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BrowseQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = user_id(&headers)?;
    let filter = query.filter()?;
    let stories = app_state
        .entitlements
        .gated_stories(&id, &filter, query.page, query.limit)
        .await?;
    Ok(Json(serde_json::json!({ "stories": stories })))
}

pub async fn toggle_loved(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(story_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = user_id(&headers)?;
    app_state
        .users
        .get_user(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("User doesn't exist!".into()))?;
    app_state
        .stories
        .get_story(&story_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Story doesn't exist!".into()))?;

    let loved = app_state.users.toggle_favorite(&id, &story_id).await?;
    Ok(Json(serde_json::json!({ "loved": loved })))
}

pub async fn list_loved(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = user_id(&headers)?;
    app_state
        .users
        .get_user(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("User doesn't exist!".into()))?;

    let mut stories: Vec<Story> = Vec::new();
    for story_id in app_state.users.list_favorites(&id).await? {
        // Favorites may reference stories deleted since; skip them.
        if let Some(story) = app_state.stories.get_story(&story_id).await? {
            stories.push(story);
        }
    }
    Ok(Json(serde_json::json!({ "stories": stories })))
}
