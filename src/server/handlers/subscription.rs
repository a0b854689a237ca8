use axum::response::{Html, IntoResponse, Response};
use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;
use std::sync::Arc;

use crate::entitlement::WebhookEvent;
use crate::error::AppError;
use crate::server::AppState;
use crate::server::pages::{PAYMENT_CANCEL_PAGE, PAYMENT_FAILED_PAGE, payment_success_page};
use crate::server::util::user_id;
use crate::subscription::{Plan, PlanStore as _};

pub async fn list_plans(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let plans: Vec<Plan> = app_state
        .plans
        .list_plans(1, i64::MAX)
        .await?
        .into_iter()
        .filter(|p| !p.is_deleted)
        .collect();
    Ok(Json(serde_json::json!({ "plans": plans })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub plan_id: String,
}

pub async fn subscribe(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<SubscribeRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = user_id(&headers)?;
    let redirect_url = app_state.entitlements.initiate(&id, &payload.plan_id).await?;
    Ok(Json(serde_json::json!({ "url": redirect_url })))
}

#[derive(Debug, Deserialize)]
pub struct SuccessQuery {
    #[serde(default)]
    pub session_id: Option<String>,
}

pub async fn payment_success(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<SuccessQuery>,
) -> Result<Response, AppError> {
    let session_id = query
        .session_id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::InvalidState("Session ID is required!".into()))?;

    match app_state.entitlements.confirm(&session_id).await {
        Ok(confirmation) => Ok(Html(payment_success_page(&confirmation.plan.price)).into_response()),
        // Incomplete payment or a stale token renders the failure shell; the
        // entitlement state was left untouched.
        Err(AppError::InvalidState(reason)) => {
            tracing::warn!("payment confirmation rejected: {}", reason);
            Ok((StatusCode::BAD_REQUEST, Html(PAYMENT_FAILED_PAGE)).into_response())
        }
        Err(e) => Err(e),
    }
}

pub async fn payment_failure() -> Html<&'static str> {
    Html(PAYMENT_CANCEL_PAGE)
}

/// Gateway deliveries are acknowledged with 200 regardless; a failed
/// acknowledgement is our problem to log, not the gateway's to retry into
/// entitlement changes.
pub async fn webhook(
    State(app_state): State<Arc<AppState>>,
    Json(event): Json<WebhookEvent>,
) -> Json<serde_json::Value> {
    if let Err(e) = app_state.entitlements.handle_webhook(event).await {
        tracing::warn!("webhook processing failed: {}", e);
    }
    Json(serde_json::json!({ "received": true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blobstore::FsBlobStore;
    use crate::checkout::HttpCheckoutGateway;
    use crate::config::Settings;
    use crate::consistency::CatalogManager;
    use crate::db::Database;
    use crate::entitlement::EntitlementManager;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tempfile::tempdir;
    use tower::ServiceExt;

    async fn test_state(dir: &tempfile::TempDir) -> Arc<AppState> {
        let settings: Settings = toml::from_str("").unwrap();
        let db_path = dir.path().join("test.db");
        let db = Arc::new(Database::new(db_path.to_str().unwrap()).await.unwrap());
        let blobs = Arc::new(FsBlobStore::new(dir.path().join("uploads")).unwrap());
        let gateway = Arc::new(HttpCheckoutGateway::new(
            settings.checkout.base_url.clone(),
            None,
        ));
        let entitlements = Arc::new(EntitlementManager::new(
            db.clone(),
            db.clone(),
            db.clone(),
            db.clone(),
            gateway,
            settings.checkout.clone(),
        ));
        let catalog = Arc::new(CatalogManager::new(db.clone(), blobs.clone()));
        Arc::new(AppState {
            config: settings,
            users: db.clone(),
            plans: db.clone(),
            ledger: db.clone(),
            stories: db.clone(),
            categories: db.clone(),
            sherpas: db.clone(),
            blobs,
            entitlements,
            catalog,
        })
    }

    #[tokio::test]
    async fn public_routes_respond() {
        let dir = tempdir().unwrap();
        let app = crate::server::handlers::routes().with_state(test_state(&dir).await);

        let res = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/subscription/plans")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let res = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/stories/guest")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let res = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/user/payment/failure")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        // Success redirect without a session id is a client error.
        let res = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/user/payment/success")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn gated_route_requires_identity() {
        let dir = tempdir().unwrap();
        let app = crate::server::handlers::routes().with_state(test_state(&dir).await);

        let res = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/user/stories")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }
}
