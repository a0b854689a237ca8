use axum::http::HeaderMap;
use serde::Deserialize;

use crate::error::AppError;

/// Caller identity as resolved by the auth layer in front of this service.
pub fn user_id(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or_else(|| AppError::Forbidden("Missing user identity!".into()))
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Paginate {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    10
}

impl Default for Paginate {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
        }
    }
}
