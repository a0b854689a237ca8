use async_trait::async_trait;
use chrono::Utc;
use rusqlite::OptionalExtension;
use uuid::Uuid;

use crate::db::Database;
use crate::db::time::{parse_utc_column, parse_utc_string, to_utc_string};
use crate::error::AppError;
use crate::users::{
    CreateUserPayload, DEFAULT_PROFILE_IMAGE, EntitlementState, Language, MonthlyCount,
    UpdateProfilePayload, User, UserStatus, UserStore,
};

const USER_COLUMNS: &str = "id, name, email, image, status, language, plan_id, \
     subscription_expires_at, pending_session_id, created_at, updated_at";

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let status_s: String = row.get(4)?;
    let language_s: String = row.get(5)?;
    let expires_s: Option<String> = row.get(7)?;
    let created_at_s: String = row.get(9)?;
    let updated_at_s: String = row.get(10)?;
    let expires_at = match expires_s {
        Some(s) => Some(parse_utc_column(7, &s)?),
        None => None,
    };
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        image: row.get(3)?,
        status: UserStatus::parse(&status_s).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(4, "status".into(), rusqlite::types::Type::Text)
        })?,
        language: Language::parse(&language_s).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(5, "language".into(), rusqlite::types::Type::Text)
        })?,
        entitlement: EntitlementState {
            plan_id: row.get(6)?,
            expires_at,
            pending_session_id: row.get(8)?,
        },
        created_at: parse_utc_column(9, &created_at_s)?,
        updated_at: parse_utc_column(10, &updated_at_s)?,
    })
}

#[async_trait]
impl UserStore for Database {
    async fn create_user(&self, payload: CreateUserPayload) -> Result<User, AppError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let image = payload
            .image
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PROFILE_IMAGE.to_string());

        let conn = self.connection.lock().await;
        let exists: Option<String> = conn
            .query_row(
                "SELECT id FROM users WHERE email = ?1",
                [&payload.email],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(AppError::Conflict("Email already exist!".into()));
        }

        conn.execute(
            "INSERT INTO users (id, name, email, image, status, language, plan_id, \
             subscription_expires_at, pending_session_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, NULL, NULL, ?7, ?8)",
            rusqlite::params![
                &id,
                &payload.name,
                &payload.email,
                &image,
                UserStatus::Active.as_str(),
                payload.language.as_str(),
                to_utc_string(&now),
                to_utc_string(&now),
            ],
        )?;

        Ok(User {
            id,
            name: payload.name,
            email: payload.email,
            image,
            status: UserStatus::Active,
            language: payload.language,
            entitlement: EntitlementState::none(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let conn = self.connection.lock().await;
        let mut stmt =
            conn.prepare(&format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS))?;
        let row = stmt.query_row([id], row_to_user).optional()?;
        Ok(row)
    }

    async fn list_users(&self, page: i64, limit: i64) -> Result<Vec<User>, AppError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
            USER_COLUMNS
        ))?;
        let rows = stmt.query_map([limit, (page - 1) * limit], row_to_user)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    async fn update_profile(
        &self,
        id: &str,
        payload: UpdateProfilePayload,
    ) -> Result<Option<User>, AppError> {
        let conn = self.connection.lock().await;
        let mut stmt =
            conn.prepare(&format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS))?;
        let Some(mut user) = stmt.query_row([id], row_to_user).optional()? else {
            return Ok(None);
        };

        if let Some(v) = payload.name {
            user.name = v;
        }
        if let Some(v) = payload.image {
            user.image = v;
        }
        user.updated_at = Utc::now();

        conn.execute(
            "UPDATE users SET name = ?2, image = ?3, updated_at = ?4 WHERE id = ?1",
            rusqlite::params![&user.id, &user.name, &user.image, to_utc_string(&user.updated_at)],
        )?;

        Ok(Some(user))
    }

    async fn set_status(&self, id: &str, status: UserStatus) -> Result<Option<User>, AppError> {
        let now = Utc::now();
        let conn = self.connection.lock().await;
        let changed = conn.execute(
            "UPDATE users SET status = ?2, updated_at = ?3 WHERE id = ?1",
            rusqlite::params![id, status.as_str(), to_utc_string(&now)],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        let mut stmt =
            conn.prepare(&format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS))?;
        Ok(stmt.query_row([id], row_to_user).optional()?)
    }

    async fn set_language(&self, id: &str, language: Language) -> Result<Option<User>, AppError> {
        let now = Utc::now();
        let conn = self.connection.lock().await;
        let changed = conn.execute(
            "UPDATE users SET language = ?2, updated_at = ?3 WHERE id = ?1",
            rusqlite::params![id, language.as_str(), to_utc_string(&now)],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        let mut stmt =
            conn.prepare(&format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS))?;
        Ok(stmt.query_row([id], row_to_user).optional()?)
    }

    async fn delete_user(&self, id: &str) -> Result<bool, AppError> {
        let conn = self.connection.lock().await;
        let rows = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
        conn.execute("DELETE FROM favorites WHERE user_id = ?1", [id])?;
        Ok(rows > 0)
    }

    async fn set_entitlement(&self, id: &str, state: &EntitlementState) -> Result<(), AppError> {
        let now = Utc::now();
        let conn = self.connection.lock().await;
        // 三个字段一次写入，单行更新保证原子性
        conn.execute(
            "UPDATE users SET plan_id = ?2, subscription_expires_at = ?3, \
             pending_session_id = ?4, updated_at = ?5 WHERE id = ?1",
            rusqlite::params![
                id,
                &state.plan_id,
                state.expires_at.map(|dt| to_utc_string(&dt)),
                &state.pending_session_id,
                to_utc_string(&now),
            ],
        )?;
        Ok(())
    }

    async fn toggle_favorite(&self, user_id: &str, story_id: &str) -> Result<bool, AppError> {
        let conn = self.connection.lock().await;
        let removed = conn.execute(
            "DELETE FROM favorites WHERE user_id = ?1 AND story_id = ?2",
            rusqlite::params![user_id, story_id],
        )?;
        if removed > 0 {
            return Ok(false);
        }
        conn.execute(
            "INSERT INTO favorites (user_id, story_id) VALUES (?1, ?2)",
            rusqlite::params![user_id, story_id],
        )?;
        Ok(true)
    }

    async fn list_favorites(&self, user_id: &str) -> Result<Vec<String>, AppError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare("SELECT story_id FROM favorites WHERE user_id = ?1")?;
        let rows = stmt.query_map([user_id], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    async fn count_users(&self) -> Result<i64, AppError> {
        let conn = self.connection.lock().await;
        Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
    }

    async fn monthly_signup_counts(&self) -> Result<Vec<MonthlyCount>, AppError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(
            "SELECT CAST(strftime('%Y', created_at) AS INTEGER),
                    CAST(strftime('%m', created_at) AS INTEGER),
                    COUNT(*)
             FROM users GROUP BY 1, 2 ORDER BY 1, 2",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(MonthlyCount {
                year: row.get(0)?,
                month: row.get(1)?,
                count: row.get(2)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    async fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
        (dir, db)
    }

    fn payload(name: &str, email: &str) -> CreateUserPayload {
        CreateUserPayload {
            name: name.into(),
            email: email.into(),
            image: None,
            language: Language::English,
        }
    }

    #[tokio::test]
    async fn user_crud_works() {
        let (_dir, db) = test_db().await;

        let created = db.create_user(payload("Alice", "alice@example.com")).await.unwrap();
        assert_eq!(created.status, UserStatus::Active);
        assert_eq!(created.image, DEFAULT_PROFILE_IMAGE);
        assert!(created.entitlement.plan_id.is_none());

        let fetched = db.get_user(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched.email, "alice@example.com");

        let blocked = db
            .set_status(&created.id, UserStatus::Blocked)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(blocked.status, UserStatus::Blocked);

        let updated = db
            .update_profile(
                &created.id,
                UpdateProfilePayload {
                    name: Some("Alicia".into()),
                    image: None,
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "Alicia");
        assert_eq!(updated.image, DEFAULT_PROFILE_IMAGE);

        assert!(db.delete_user(&created.id).await.unwrap());
        assert!(db.get_user(&created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let (_dir, db) = test_db().await;
        db.create_user(payload("A", "dup@example.com")).await.unwrap();
        let err = db.create_user(payload("B", "dup@example.com")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn entitlement_is_written_as_a_unit() {
        let (_dir, db) = test_db().await;
        let user = db.create_user(payload("A", "a@example.com")).await.unwrap();

        let expires = Utc::now() + Duration::days(30);
        db.set_entitlement(
            &user.id,
            &EntitlementState {
                plan_id: Some("plan-1".into()),
                expires_at: Some(expires),
                pending_session_id: None,
            },
        )
        .await
        .unwrap();

        let fetched = db.get_user(&user.id).await.unwrap().unwrap();
        assert_eq!(fetched.entitlement.plan_id.as_deref(), Some("plan-1"));
        // RFC3339 storage truncates to whole seconds.
        let stored = fetched.entitlement.expires_at.unwrap();
        assert!((stored - expires).num_seconds().abs() <= 1);

        db.set_entitlement(&user.id, &EntitlementState::none()).await.unwrap();
        let cleared = db.get_user(&user.id).await.unwrap().unwrap();
        assert_eq!(cleared.entitlement, EntitlementState::none());
    }

    #[tokio::test]
    async fn favorites_toggle_and_list() {
        let (_dir, db) = test_db().await;
        let user = db.create_user(payload("A", "a@example.com")).await.unwrap();

        assert!(db.toggle_favorite(&user.id, "story-1").await.unwrap());
        assert!(db.toggle_favorite(&user.id, "story-2").await.unwrap());
        let mut favs = db.list_favorites(&user.id).await.unwrap();
        favs.sort();
        assert_eq!(favs, vec!["story-1".to_string(), "story-2".to_string()]);

        // Second toggle removes.
        assert!(!db.toggle_favorite(&user.id, "story-1").await.unwrap());
        assert_eq!(db.list_favorites(&user.id).await.unwrap(), vec!["story-2".to_string()]);
    }

    #[tokio::test]
    async fn signup_counts_bucket_by_month() {
        let (_dir, db) = test_db().await;
        db.create_user(payload("A", "a@example.com")).await.unwrap();
        db.create_user(payload("B", "b@example.com")).await.unwrap();
        let buckets = db.monthly_signup_counts().await.unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].count, 2);
    }
}
