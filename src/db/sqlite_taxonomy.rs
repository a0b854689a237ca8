use async_trait::async_trait;
use chrono::Utc;
use rusqlite::OptionalExtension;
use uuid::Uuid;

use crate::catalog::{
    Category, CategoryPayload, CategoryStore, Sherpa, SherpaPayload, SherpaStore,
};
use crate::db::Database;
use crate::db::time::{parse_utc_column, to_utc_string};
use crate::error::AppError;

fn row_to_category(row: &rusqlite::Row<'_>) -> rusqlite::Result<Category> {
    let created_at_s: String = row.get(4)?;
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        image: row.get(3)?,
        created_at: parse_utc_column(4, &created_at_s)?,
    })
}

fn row_to_sherpa(row: &rusqlite::Row<'_>) -> rusqlite::Result<Sherpa> {
    let created_at_s: String = row.get(4)?;
    Ok(Sherpa {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        image: row.get(3)?,
        created_at: parse_utc_column(4, &created_at_s)?,
    })
}

#[async_trait]
impl CategoryStore for Database {
    async fn create_category(&self, payload: CategoryPayload) -> Result<Category, AppError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let conn = self.connection.lock().await;
        let exists: Option<String> = conn
            .query_row(
                "SELECT id FROM categories WHERE name = ?1",
                [&payload.name],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(AppError::Conflict("Name already exist!".into()));
        }
        conn.execute(
            "INSERT INTO categories (id, name, description, image, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                &id,
                &payload.name,
                &payload.description,
                &payload.image,
                to_utc_string(&now)
            ],
        )?;
        Ok(Category {
            id,
            name: payload.name,
            description: payload.description,
            image: payload.image,
            created_at: now,
        })
    }

    async fn get_category(&self, id: &str) -> Result<Option<Category>, AppError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, name, description, image, created_at FROM categories WHERE id = ?1",
        )?;
        Ok(stmt.query_row([id], row_to_category).optional()?)
    }

    async fn list_categories(&self, page: i64, limit: i64) -> Result<Vec<Category>, AppError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, name, description, image, created_at FROM categories
             ORDER BY created_at LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map([limit, (page - 1) * limit], row_to_category)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    async fn update_category(
        &self,
        id: &str,
        payload: CategoryPayload,
    ) -> Result<Option<Category>, AppError> {
        let conn = self.connection.lock().await;
        let changed = conn.execute(
            "UPDATE categories SET name = ?2, description = ?3, image = ?4 WHERE id = ?1",
            rusqlite::params![id, &payload.name, &payload.description, &payload.image],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        let mut stmt = conn.prepare(
            "SELECT id, name, description, image, created_at FROM categories WHERE id = ?1",
        )?;
        Ok(stmt.query_row([id], row_to_category).optional()?)
    }

    async fn delete_category(&self, id: &str) -> Result<Option<Category>, AppError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, name, description, image, created_at FROM categories WHERE id = ?1",
        )?;
        let Some(category) = stmt.query_row([id], row_to_category).optional()? else {
            return Ok(None);
        };
        conn.execute("DELETE FROM categories WHERE id = ?1", [id])?;
        Ok(Some(category))
    }
}

#[async_trait]
impl SherpaStore for Database {
    async fn create_sherpa(&self, payload: SherpaPayload) -> Result<Sherpa, AppError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let conn = self.connection.lock().await;
        let exists: Option<String> = conn
            .query_row(
                "SELECT id FROM sherpas WHERE title = ?1",
                [&payload.title],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(AppError::Conflict("Title already exist!".into()));
        }
        conn.execute(
            "INSERT INTO sherpas (id, title, description, image, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                &id,
                &payload.title,
                &payload.description,
                &payload.image,
                to_utc_string(&now)
            ],
        )?;
        Ok(Sherpa {
            id,
            title: payload.title,
            description: payload.description,
            image: payload.image,
            created_at: now,
        })
    }

    async fn get_sherpa(&self, id: &str) -> Result<Option<Sherpa>, AppError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, title, description, image, created_at FROM sherpas WHERE id = ?1",
        )?;
        Ok(stmt.query_row([id], row_to_sherpa).optional()?)
    }

    async fn list_sherpas(&self, page: i64, limit: i64) -> Result<Vec<Sherpa>, AppError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, title, description, image, created_at FROM sherpas
             ORDER BY created_at LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map([limit, (page - 1) * limit], row_to_sherpa)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    async fn update_sherpa(
        &self,
        id: &str,
        payload: SherpaPayload,
    ) -> Result<Option<Sherpa>, AppError> {
        let conn = self.connection.lock().await;
        let changed = conn.execute(
            "UPDATE sherpas SET title = ?2, description = ?3, image = ?4 WHERE id = ?1",
            rusqlite::params![id, &payload.title, &payload.description, &payload.image],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        let mut stmt = conn.prepare(
            "SELECT id, title, description, image, created_at FROM sherpas WHERE id = ?1",
        )?;
        Ok(stmt.query_row([id], row_to_sherpa).optional()?)
    }

    async fn delete_sherpa(&self, id: &str) -> Result<Option<Sherpa>, AppError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, title, description, image, created_at FROM sherpas WHERE id = ?1",
        )?;
        let Some(sherpa) = stmt.query_row([id], row_to_sherpa).optional()? else {
            return Ok(None);
        };
        conn.execute("DELETE FROM sherpas WHERE id = ?1", [id])?;
        Ok(Some(sherpa))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn category_names_are_unique() {
        let (_dir, db) = test_db().await;
        let payload = CategoryPayload {
            name: "Hushabies".into(),
            description: "gentle".into(),
            image: "image/h.png".into(),
        };
        db.create_category(payload.clone()).await.unwrap();
        let err = db.create_category(payload).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn sherpa_crud_works() {
        let (_dir, db) = test_db().await;
        let created = db
            .create_sherpa(SherpaPayload {
                title: "Maya".into(),
                description: "calm voice".into(),
                image: "image/maya.png".into(),
            })
            .await
            .unwrap();

        let updated = db
            .update_sherpa(
                &created.id,
                SherpaPayload {
                    title: "Maya".into(),
                    description: "calm voice".into(),
                    image: "image/maya2.png".into(),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.image, "image/maya2.png");

        let deleted = db.delete_sherpa(&created.id).await.unwrap().unwrap();
        assert_eq!(deleted.id, created.id);
        assert!(db.get_sherpa(&created.id).await.unwrap().is_none());
        assert!(db.delete_sherpa(&created.id).await.unwrap().is_none());
    }
}
