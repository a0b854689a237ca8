use axum::{
    Json,
    extract::{Path, Query, State},
};
use std::sync::Arc;

use crate::blobstore::delete_quietly;
use crate::catalog::{
    Category, CategoryPayload, CategoryStore as _, CreateStoryPayload, MediaTracksUpdate,
    NewPartPayload, Sherpa, SherpaPayload, SherpaStore as _, Story, StoryFilter, StoryPart,
    StoryStore as _, UpdateStoryPayload,
};
use crate::error::AppError;
use crate::server::AppState;
use crate::server::util::Paginate;

// ---- sherpas ----

pub async fn list_sherpas(
    State(app_state): State<Arc<AppState>>,
    Query(paginate): Query<Paginate>,
) -> Result<Json<Vec<Sherpa>>, AppError> {
    Ok(Json(
        app_state
            .sherpas
            .list_sherpas(paginate.page, paginate.limit)
            .await?,
    ))
}

pub async fn create_sherpa(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<SherpaPayload>,
) -> Result<Json<Sherpa>, AppError> {
    Ok(Json(app_state.sherpas.create_sherpa(payload).await?))
}

pub async fn update_sherpa(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<SherpaPayload>,
) -> Result<Json<Sherpa>, AppError> {
    let existing = app_state
        .sherpas
        .get_sherpa(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Sherpa not found!".into()))?;
    if payload.image != existing.image {
        delete_quietly(app_state.blobs.as_ref(), &existing.image).await;
    }
    let sherpa = app_state
        .sherpas
        .update_sherpa(&id, payload)
        .await?
        .ok_or_else(|| AppError::NotFound("Sherpa not found!".into()))?;
    Ok(Json(sherpa))
}

pub async fn delete_sherpa(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Sherpa>, AppError> {
    let sherpa = app_state
        .sherpas
        .delete_sherpa(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Sherpa not found for delete!".into()))?;
    delete_quietly(app_state.blobs.as_ref(), &sherpa.image).await;
    Ok(Json(sherpa))
}

// ---- categories ----

pub async fn list_categories(
    State(app_state): State<Arc<AppState>>,
    Query(paginate): Query<Paginate>,
) -> Result<Json<Vec<Category>>, AppError> {
    Ok(Json(
        app_state
            .categories
            .list_categories(paginate.page, paginate.limit)
            .await?,
    ))
}

pub async fn create_category(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CategoryPayload>,
) -> Result<Json<Category>, AppError> {
    Ok(Json(app_state.categories.create_category(payload).await?))
}

pub async fn update_category(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<CategoryPayload>,
) -> Result<Json<Category>, AppError> {
    let existing = app_state
        .categories
        .get_category(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Category not found!".into()))?;
    if payload.image != existing.image {
        delete_quietly(app_state.blobs.as_ref(), &existing.image).await;
    }
    let category = app_state
        .categories
        .update_category(&id, payload)
        .await?
        .ok_or_else(|| AppError::NotFound("Category not found!".into()))?;
    Ok(Json(category))
}

pub async fn delete_category(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Category>, AppError> {
    let category = app_state
        .categories
        .delete_category(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Category not found for delete!".into()))?;
    delete_quietly(app_state.blobs.as_ref(), &category.image).await;
    Ok(Json(category))
}

// ---- stories & parts ----

pub async fn list_stories(
    State(app_state): State<Arc<AppState>>,
    Query(paginate): Query<Paginate>,
) -> Result<Json<Vec<Story>>, AppError> {
    Ok(Json(
        app_state
            .stories
            .list_stories(&StoryFilter::default(), paginate.page, paginate.limit)
            .await?,
    ))
}

pub async fn get_story(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let story = app_state
        .stories
        .get_story(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Story not found!".into()))?;
    let parts = app_state.stories.parts_of_story(&id).await?;
    Ok(Json(serde_json::json!({ "story": story, "parts": parts })))
}

pub async fn create_story(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateStoryPayload>,
) -> Result<Json<Story>, AppError> {
    Ok(Json(app_state.catalog.create_story(payload).await?))
}

pub async fn update_story(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateStoryPayload>,
) -> Result<Json<Story>, AppError> {
    Ok(Json(app_state.catalog.update_story(&id, payload).await?))
}

pub async fn delete_story(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Story>, AppError> {
    Ok(Json(app_state.catalog.delete_story(&id).await?))
}

pub async fn add_part(
    State(app_state): State<Arc<AppState>>,
    Path(story_id): Path<String>,
    Json(payload): Json<NewPartPayload>,
) -> Result<Json<StoryPart>, AppError> {
    Ok(Json(app_state.catalog.add_part(&story_id, payload).await?))
}

pub async fn update_part(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<MediaTracksUpdate>,
) -> Result<Json<StoryPart>, AppError> {
    Ok(Json(app_state.catalog.update_part(&id, payload).await?))
}

pub async fn delete_part(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StoryPart>, AppError> {
    Ok(Json(app_state.catalog.delete_part(&id).await?))
}
