pub mod handlers;
pub(crate) mod pages;
pub(crate) mod util;

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::blobstore::{BlobStore, FsBlobStore};
use crate::catalog::{CategoryStore, SherpaStore, StoryStore};
use crate::checkout::{CheckoutGateway, HttpCheckoutGateway};
use crate::config::Settings;
use crate::consistency::CatalogManager;
use crate::db::Database;
use crate::entitlement::EntitlementManager;
use crate::error::Result as AppResult;
use crate::subscription::{LedgerStore, PlanStore};
use crate::users::UserStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Settings,
    pub users: Arc<dyn UserStore>,
    pub plans: Arc<dyn PlanStore>,
    pub ledger: Arc<dyn LedgerStore>,
    pub stories: Arc<dyn StoryStore>,
    pub categories: Arc<dyn CategoryStore>,
    pub sherpas: Arc<dyn SherpaStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub entitlements: Arc<EntitlementManager>,
    pub catalog: Arc<CatalogManager>,
}

pub async fn create_app(config: Settings) -> AppResult<Router> {
    let db = Arc::new(Database::new(&config.storage.database_path).await?);
    let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(config.storage.upload_dir.clone())?);
    let gateway: Arc<dyn CheckoutGateway> = Arc::new(HttpCheckoutGateway::new(
        config.checkout.base_url.clone(),
        config.checkout.secret_key.clone(),
    ));

    let entitlements = Arc::new(EntitlementManager::new(
        db.clone(),
        db.clone(),
        db.clone(),
        db.clone(),
        gateway,
        config.checkout.clone(),
    ));
    let catalog = Arc::new(CatalogManager::new(db.clone(), blobs.clone()));

    let app_state = AppState {
        config,
        users: db.clone(),
        plans: db.clone(),
        ledger: db.clone(),
        stories: db.clone(),
        categories: db.clone(),
        sherpas: db.clone(),
        blobs,
        entitlements,
        catalog,
    };

    let mut app = handlers::routes().with_state(Arc::new(app_state));

    // CORS（开发环境便于前端联调；生产应收敛来源并仅 HTTPS）
    use axum::http::{Method, header};
    use tower_http::cors::{AllowOrigin, CorsLayer};
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true);
    app = app.layer(cors);
    app = app.layer(TraceLayer::new_for_http());

    Ok(app)
}
