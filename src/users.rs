use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DEFAULT_PROFILE_IMAGE: &str = "https://i.ibb.co/z5YHLV9/profile.png";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Blocked,
    Deleted,
}

impl UserStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Blocked => "blocked",
            UserStatus::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(UserStatus::Active),
            "blocked" => Some(UserStatus::Blocked),
            "deleted" => Some(UserStatus::Deleted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    English,
    Deutsch,
    Francais,
    Espanol,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::English => "english",
            Language::Deutsch => "deutsch",
            Language::Francais => "francais",
            Language::Espanol => "espanol",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "english" => Some(Language::English),
            "deutsch" => Some(Language::Deutsch),
            "francais" => Some(Language::Francais),
            "espanol" => Some(Language::Espanol),
            _ => None,
        }
    }
}

/// Paid-access state of one user. The plan reference and the expiry are
/// meaningful only as a pair: the plan is set iff the expiry is set and in the
/// future. The pending session id correlates an in-flight checkout and is
/// independent of the other two. Written only through
/// `UserStore::set_entitlement` — never field by field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementState {
    pub plan_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub pending_session_id: Option<String>,
}

impl EntitlementState {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        match (&self.plan_id, self.expires_at) {
            (Some(_), Some(expires_at)) => expires_at > now,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub image: String,
    pub status: UserStatus,
    pub language: Language,
    #[serde(flatten)]
    pub entitlement: EntitlementState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserPayload {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default = "default_language_english")]
    pub language: Language,
}

fn default_language_english() -> Language {
    Language::English
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProfilePayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

/// Per-year, per-month bucket used by the admin overview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthlyCount {
    pub year: i32,
    pub month: u32,
    pub count: i64,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, payload: CreateUserPayload) -> Result<User, AppError>;
    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError>;
    async fn list_users(&self, page: i64, limit: i64) -> Result<Vec<User>, AppError>;
    async fn update_profile(
        &self,
        id: &str,
        payload: UpdateProfilePayload,
    ) -> Result<Option<User>, AppError>;
    async fn set_status(&self, id: &str, status: UserStatus) -> Result<Option<User>, AppError>;
    async fn set_language(&self, id: &str, language: Language) -> Result<Option<User>, AppError>;
    async fn delete_user(&self, id: &str) -> Result<bool, AppError>;

    /// Sole writer of the entitlement triple; replaces all three fields in one
    /// row-level update.
    async fn set_entitlement(&self, id: &str, state: &EntitlementState) -> Result<(), AppError>;

    async fn toggle_favorite(&self, user_id: &str, story_id: &str) -> Result<bool, AppError>;
    async fn list_favorites(&self, user_id: &str) -> Result<Vec<String>, AppError>;

    async fn count_users(&self) -> Result<i64, AppError>;
    async fn monthly_signup_counts(&self) -> Result<Vec<MonthlyCount>, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn user_status_roundtrip() {
        for (s, expected) in [
            ("active", UserStatus::Active),
            ("blocked", UserStatus::Blocked),
            ("deleted", UserStatus::Deleted),
        ] {
            assert_eq!(UserStatus::parse(s).unwrap().as_str(), expected.as_str());
        }
        assert!(UserStatus::parse("nope").is_none());
    }

    #[test]
    fn language_roundtrip() {
        for (s, expected) in [
            ("english", Language::English),
            ("deutsch", Language::Deutsch),
            ("francais", Language::Francais),
            ("espanol", Language::Espanol),
        ] {
            assert_eq!(Language::parse(s).unwrap().as_str(), expected.as_str());
        }
        assert!(Language::parse("klingon").is_none());
    }

    #[test]
    fn entitlement_active_requires_plan_and_future_expiry() {
        let now = Utc::now();
        let active = EntitlementState {
            plan_id: Some("p1".into()),
            expires_at: Some(now + Duration::days(1)),
            pending_session_id: None,
        };
        assert!(active.is_active_at(now));

        let expired = EntitlementState {
            plan_id: Some("p1".into()),
            expires_at: Some(now - Duration::seconds(1)),
            pending_session_id: None,
        };
        assert!(!expired.is_active_at(now));

        // A pending checkout alone grants nothing.
        let pending_only = EntitlementState {
            plan_id: None,
            expires_at: None,
            pending_session_id: Some("sess_1".into()),
        };
        assert!(!pending_only.is_active_at(now));
    }
}
