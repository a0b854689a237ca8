use async_trait::async_trait;
use chrono::Utc;
use rusqlite::OptionalExtension;
use uuid::Uuid;

use crate::catalog::{
    MediaTracks, NewPart, NewStory, Story, StoryCategory, StoryFilter, StoryPart, StoryStore,
    StoryUpdate, Timer,
};
use crate::db::Database;
use crate::db::time::{parse_utc_column, to_utc_string};
use crate::error::AppError;

const STORY_COLUMNS: &str =
    "id, name, cover_image, category, sherpa, timer, part_ids, created_at, updated_at";

const PART_COLUMNS: &str = "id, story_id, part_idx, english_file, deutsch_file, francais_file, \
     espanol_file, english_lrc, deutsch_lrc, francais_lrc, espanol_lrc, created_at";

fn row_to_story(row: &rusqlite::Row<'_>) -> rusqlite::Result<Story> {
    let category_s: String = row.get(3)?;
    let timer_s: String = row.get(5)?;
    let part_ids_s: String = row.get(6)?;
    let created_at_s: String = row.get(7)?;
    let updated_at_s: String = row.get(8)?;
    Ok(Story {
        id: row.get(0)?,
        name: row.get(1)?,
        cover_image: row.get(2)?,
        category: StoryCategory::parse(&category_s).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(3, "category".into(), rusqlite::types::Type::Text)
        })?,
        sherpa: row.get(4)?,
        timer: Timer::parse(&timer_s).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(5, "timer".into(), rusqlite::types::Type::Text)
        })?,
        part_ids: serde_json::from_str(&part_ids_s).unwrap_or_default(),
        created_at: parse_utc_column(7, &created_at_s)?,
        updated_at: parse_utc_column(8, &updated_at_s)?,
    })
}

fn row_to_part(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoryPart> {
    let created_at_s: String = row.get(11)?;
    Ok(StoryPart {
        id: row.get(0)?,
        story_id: row.get(1)?,
        part_idx: row.get(2)?,
        tracks: MediaTracks {
            english_file: row.get(3)?,
            deutsch_file: row.get(4)?,
            francais_file: row.get(5)?,
            espanol_file: row.get(6)?,
            english_lrc: row.get(7)?,
            deutsch_lrc: row.get(8)?,
            francais_lrc: row.get(9)?,
            espanol_lrc: row.get(10)?,
        },
        created_at: parse_utc_column(11, &created_at_s)?,
    })
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[async_trait]
impl StoryStore for Database {
    async fn insert_story(&self, story: NewStory) -> Result<Story, AppError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let conn = self.connection.lock().await;
        conn.execute(
            "INSERT INTO stories (id, name, cover_image, category, sherpa, timer, part_ids, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, '[]', ?7, ?8)",
            rusqlite::params![
                &id,
                &story.name,
                &story.cover_image,
                story.category.as_str(),
                &story.sherpa,
                story.timer.as_str(),
                to_utc_string(&now),
                to_utc_string(&now),
            ],
        )?;
        Ok(Story {
            id,
            name: story.name,
            cover_image: story.cover_image,
            category: story.category,
            sherpa: story.sherpa,
            timer: story.timer,
            part_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_story(&self, id: &str) -> Result<Option<Story>, AppError> {
        let conn = self.connection.lock().await;
        let mut stmt =
            conn.prepare(&format!("SELECT {} FROM stories WHERE id = ?1", STORY_COLUMNS))?;
        Ok(stmt.query_row([id], row_to_story).optional()?)
    }

    async fn list_stories(
        &self,
        filter: &StoryFilter,
        page: i64,
        limit: i64,
    ) -> Result<Vec<Story>, AppError> {
        let conn = self.connection.lock().await;
        let mut sql = format!("SELECT {} FROM stories WHERE 1=1", STORY_COLUMNS);
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(category) = filter.category {
            sql.push_str(" AND category = ?");
            params.push(Box::new(category.as_str().to_string()));
        }
        if let Some(timer) = filter.timer {
            sql.push_str(" AND timer = ?");
            params.push(Box::new(timer.as_str().to_string()));
        }
        // rowid tie-break keeps same-second inserts in creation order
        sql.push_str(" ORDER BY created_at, rowid LIMIT ? OFFSET ?");
        params.push(Box::new(limit));
        params.push(Box::new((page - 1) * limit));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())),
            row_to_story,
        )?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    async fn list_story_ids(&self) -> Result<Vec<String>, AppError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare("SELECT id FROM stories ORDER BY created_at, rowid")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    async fn update_story(&self, id: &str, update: StoryUpdate) -> Result<Option<Story>, AppError> {
        let conn = self.connection.lock().await;
        let mut stmt =
            conn.prepare(&format!("SELECT {} FROM stories WHERE id = ?1", STORY_COLUMNS))?;
        let Some(mut story) = stmt.query_row([id], row_to_story).optional()? else {
            return Ok(None);
        };

        story.name = update.name;
        story.cover_image = update.cover_image;
        story.category = update.category;
        story.sherpa = update.sherpa;
        if let Some(timer) = update.timer {
            story.timer = timer;
        }
        story.updated_at = Utc::now();

        conn.execute(
            "UPDATE stories SET name = ?2, cover_image = ?3, category = ?4, sherpa = ?5, \
             timer = ?6, updated_at = ?7 WHERE id = ?1",
            rusqlite::params![
                &story.id,
                &story.name,
                &story.cover_image,
                story.category.as_str(),
                &story.sherpa,
                story.timer.as_str(),
                to_utc_string(&story.updated_at),
            ],
        )?;

        Ok(Some(story))
    }

    async fn delete_story(&self, id: &str) -> Result<Option<Story>, AppError> {
        let conn = self.connection.lock().await;
        let mut stmt =
            conn.prepare(&format!("SELECT {} FROM stories WHERE id = ?1", STORY_COLUMNS))?;
        let Some(story) = stmt.query_row([id], row_to_story).optional()? else {
            return Ok(None);
        };
        conn.execute("DELETE FROM stories WHERE id = ?1", [id])?;
        Ok(Some(story))
    }

    async fn insert_part(&self, part: NewPart) -> Result<StoryPart, AppError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let conn = self.connection.lock().await;

        let part_ids_s: Option<String> = conn
            .query_row(
                "SELECT part_ids FROM stories WHERE id = ?1",
                [&part.story_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(part_ids_s) = part_ids_s else {
            return Err(AppError::NotFound("Story not found!".into()));
        };

        let insert = conn.execute(
            "INSERT INTO story_parts (id, story_id, part_idx, english_file, deutsch_file, \
             francais_file, espanol_file, english_lrc, deutsch_lrc, francais_lrc, espanol_lrc, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            rusqlite::params![
                &id,
                &part.story_id,
                part.part_idx,
                &part.tracks.english_file,
                &part.tracks.deutsch_file,
                &part.tracks.francais_file,
                &part.tracks.espanol_file,
                &part.tracks.english_lrc,
                &part.tracks.deutsch_lrc,
                &part.tracks.francais_lrc,
                &part.tracks.espanol_lrc,
                to_utc_string(&now),
            ],
        );
        if let Err(e) = insert {
            if is_unique_violation(&e) {
                return Err(AppError::Conflict(format!(
                    "Part index {} already in use!",
                    part.part_idx
                )));
            }
            return Err(e.into());
        }

        // 同一把锁内追加父 story 的有序 part 列表
        let mut part_ids: Vec<String> = serde_json::from_str(&part_ids_s).unwrap_or_default();
        part_ids.push(id.clone());
        conn.execute(
            "UPDATE stories SET part_ids = ?2, updated_at = ?3 WHERE id = ?1",
            rusqlite::params![
                &part.story_id,
                serde_json::to_string(&part_ids)?,
                to_utc_string(&now)
            ],
        )?;

        Ok(StoryPart {
            id,
            story_id: part.story_id,
            part_idx: part.part_idx,
            tracks: part.tracks,
            created_at: now,
        })
    }

    async fn get_part(&self, id: &str) -> Result<Option<StoryPart>, AppError> {
        let conn = self.connection.lock().await;
        let mut stmt =
            conn.prepare(&format!("SELECT {} FROM story_parts WHERE id = ?1", PART_COLUMNS))?;
        Ok(stmt.query_row([id], row_to_part).optional()?)
    }

    async fn parts_of_story(&self, story_id: &str) -> Result<Vec<StoryPart>, AppError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM story_parts WHERE story_id = ?1 ORDER BY part_idx",
            PART_COLUMNS
        ))?;
        let rows = stmt.query_map([story_id], row_to_part)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    async fn update_part_tracks(&self, id: &str, tracks: &MediaTracks) -> Result<(), AppError> {
        let conn = self.connection.lock().await;
        conn.execute(
            "UPDATE story_parts SET english_file = ?2, deutsch_file = ?3, francais_file = ?4, \
             espanol_file = ?5, english_lrc = ?6, deutsch_lrc = ?7, francais_lrc = ?8, \
             espanol_lrc = ?9 WHERE id = ?1",
            rusqlite::params![
                id,
                &tracks.english_file,
                &tracks.deutsch_file,
                &tracks.francais_file,
                &tracks.espanol_file,
                &tracks.english_lrc,
                &tracks.deutsch_lrc,
                &tracks.francais_lrc,
                &tracks.espanol_lrc,
            ],
        )?;
        Ok(())
    }

    async fn delete_part(&self, id: &str) -> Result<Option<StoryPart>, AppError> {
        let conn = self.connection.lock().await;
        let mut stmt =
            conn.prepare(&format!("SELECT {} FROM story_parts WHERE id = ?1", PART_COLUMNS))?;
        let Some(part) = stmt.query_row([id], row_to_part).optional()? else {
            return Ok(None);
        };
        conn.execute("DELETE FROM story_parts WHERE id = ?1", [id])?;
        Ok(Some(part))
    }

    async fn delete_parts_of_story(&self, story_id: &str) -> Result<Vec<StoryPart>, AppError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM story_parts WHERE story_id = ?1 ORDER BY part_idx",
            PART_COLUMNS
        ))?;
        let rows = stmt.query_map([story_id], row_to_part)?;
        let mut parts = Vec::new();
        for r in rows {
            parts.push(r?);
        }
        conn.execute("DELETE FROM story_parts WHERE story_id = ?1", [story_id])?;
        Ok(parts)
    }

    async fn count_parts(&self) -> Result<i64, AppError> {
        let conn = self.connection.lock().await;
        Ok(conn.query_row("SELECT COUNT(*) FROM story_parts", [], |row| row.get(0))?)
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

    fn hushaby(name: &str) -> NewStory {
        NewStory {
            name: name.into(),
            cover_image: "whisperCoverImage/cover.png".into(),
            category: StoryCategory::Hushabies,
            sherpa: "Maya".into(),
            timer: Timer::Min7,
        }
    }

    fn full_tracks(tag: &str) -> MediaTracks {
        MediaTracks {
            english_file: format!("EnglishFile/{tag}.mp3"),
            deutsch_file: format!("DeutschFile/{tag}.mp3"),
            francais_file: format!("FrancaisFile/{tag}.mp3"),
            espanol_file: format!("EspanolFile/{tag}.mp3"),
            english_lrc: format!("lrc/EnglishLRC/{tag}.lrc"),
            deutsch_lrc: format!("lrc/DeutschLRC/{tag}.lrc"),
            francais_lrc: format!("lrc/FrancaisLRC/{tag}.lrc"),
            espanol_lrc: format!("lrc/EspanolLRC/{tag}.lrc"),
        }
    }

    #[tokio::test]
    async fn story_names_need_not_be_unique() {
        let (_dir, db) = test_db().await;
        db.insert_story(hushaby("Same Name")).await.unwrap();
        db.insert_story(hushaby("Same Name")).await.unwrap();
        let stories = db.list_stories(&StoryFilter::default(), 1, 10).await.unwrap();
        assert_eq!(stories.len(), 2);
    }

    #[tokio::test]
    async fn insert_part_appends_to_parent_list() {
        let (_dir, db) = test_db().await;
        let story = db.insert_story(hushaby("Night Train")).await.unwrap();

        let p1 = db
            .insert_part(NewPart {
                story_id: story.id.clone(),
                part_idx: 1,
                tracks: full_tracks("a"),
            })
            .await
            .unwrap();
        let p2 = db
            .insert_part(NewPart {
                story_id: story.id.clone(),
                part_idx: 2,
                tracks: full_tracks("b"),
            })
            .await
            .unwrap();

        let parent = db.get_story(&story.id).await.unwrap().unwrap();
        assert_eq!(parent.part_ids, vec![p1.id.clone(), p2.id.clone()]);

        let parts = db.parts_of_story(&story.id).await.unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].part_idx, 1);
    }

    #[tokio::test]
    async fn part_index_is_globally_unique() {
        let (_dir, db) = test_db().await;
        let s1 = db.insert_story(hushaby("One")).await.unwrap();
        let s2 = db.insert_story(hushaby("Two")).await.unwrap();

        db.insert_part(NewPart {
            story_id: s1.id.clone(),
            part_idx: 1,
            tracks: full_tracks("a"),
        })
        .await
        .unwrap();

        // Same index under a different parent still collides.
        let err = db
            .insert_part(NewPart {
                story_id: s2.id.clone(),
                part_idx: 1,
                tracks: full_tracks("b"),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn insert_part_requires_parent() {
        let (_dir, db) = test_db().await;
        let err = db
            .insert_part(NewPart {
                story_id: "missing".into(),
                part_idx: 1,
                tracks: full_tracks("a"),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_part_leaves_parent_list_untouched() {
        let (_dir, db) = test_db().await;
        let story = db.insert_story(hushaby("Dangling")).await.unwrap();
        let part = db
            .insert_part(NewPart {
                story_id: story.id.clone(),
                part_idx: 1,
                tracks: full_tracks("a"),
            })
            .await
            .unwrap();

        let deleted = db.delete_part(&part.id).await.unwrap().unwrap();
        assert_eq!(deleted.id, part.id);

        // The parent keeps the now-dangling id; readers resolve and skip.
        let parent = db.get_story(&story.id).await.unwrap().unwrap();
        assert_eq!(parent.part_ids, vec![part.id]);
        assert!(db.get_part(&deleted.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn filtered_listing_matches_category_and_timer() {
        let (_dir, db) = test_db().await;
        db.insert_story(hushaby("H7")).await.unwrap();
        let mut other = hushaby("F12");
        other.category = StoryCategory::FeatherStories;
        other.timer = Timer::Min12;
        db.insert_story(other).await.unwrap();

        let filter = StoryFilter {
            category: Some(StoryCategory::FeatherStories),
            timer: None,
        };
        let stories = db.list_stories(&filter, 1, 10).await.unwrap();
        assert_eq!(stories.len(), 1);
        assert_eq!(stories[0].name, "F12");

        let filter = StoryFilter {
            category: Some(StoryCategory::Hushabies),
            timer: Some(Timer::Min12),
        };
        assert!(db.list_stories(&filter, 1, 10).await.unwrap().is_empty());
    }
}
