use axum::{
    Router,
    routing::{get, post, put},
};
use std::sync::Arc;

use crate::server::AppState;

mod admin_catalog;
mod admin_plans;
mod admin_users;
mod overview;
mod stories;
mod subscription;
mod users;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        // User account & profile
        .route("/user", post(users::create_user))
        .route(
            "/user/profile",
            get(users::get_profile).put(users::update_profile),
        )
        .route(
            "/user/language",
            get(users::get_language).put(users::change_language),
        )
        // Subscription flow
        .route("/subscription/plans", get(subscription::list_plans))
        .route("/user/subscribe", post(subscription::subscribe))
        .route("/user/payment/success", get(subscription::payment_success))
        .route("/user/payment/failure", get(subscription::payment_failure))
        .route("/user/payment/webhook", post(subscription::webhook))
        // Content reads
        .route("/stories/guest", get(stories::guest_stories))
        .route("/user/stories", get(stories::gated_stories))
        .route("/user/loved", get(stories::list_loved))
        .route("/user/loved/{story_id}", post(stories::toggle_loved))
        // Admin: overview & users
        .route("/admin/overview", get(overview::overview))
        .route("/admin/users", get(admin_users::list_users))
        .route(
            "/admin/users/{id}",
            get(admin_users::get_user).delete(admin_users::delete_user),
        )
        .route("/admin/users/{id}/block", post(admin_users::block_user))
        .route("/admin/users/{id}/unblock", post(admin_users::unblock_user))
        // Admin: taxonomy
        .route(
            "/admin/sherpas",
            get(admin_catalog::list_sherpas).post(admin_catalog::create_sherpa),
        )
        .route(
            "/admin/sherpas/{id}",
            put(admin_catalog::update_sherpa).delete(admin_catalog::delete_sherpa),
        )
        .route(
            "/admin/categories",
            get(admin_catalog::list_categories).post(admin_catalog::create_category),
        )
        .route(
            "/admin/categories/{id}",
            put(admin_catalog::update_category).delete(admin_catalog::delete_category),
        )
        // Admin: stories & parts
        .route(
            "/admin/stories",
            get(admin_catalog::list_stories).post(admin_catalog::create_story),
        )
        .route(
            "/admin/stories/{id}",
            get(admin_catalog::get_story)
                .put(admin_catalog::update_story)
                .delete(admin_catalog::delete_story),
        )
        .route("/admin/stories/{id}/parts", post(admin_catalog::add_part))
        .route(
            "/admin/parts/{id}",
            put(admin_catalog::update_part).delete(admin_catalog::delete_part),
        )
        // Admin: plans & subscribers
        .route(
            "/admin/plans",
            get(admin_plans::list_plans).post(admin_plans::create_plan),
        )
        .route(
            "/admin/plans/{id}",
            put(admin_plans::update_plan).delete(admin_plans::delete_plan),
        )
        .route("/admin/subscribers", get(admin_plans::list_subscribers))
        .route("/admin/subscribers/{id}", get(admin_plans::get_subscriber))
        .route("/health", get(health))
}

async fn health() -> &'static str {
    "ok"
}
