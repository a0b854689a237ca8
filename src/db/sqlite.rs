use rusqlite::{Connection, Result};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Single SQLite handle behind an async mutex; every store trait in the crate
/// is implemented on this type. One document collection per table.
#[derive(Clone)]
pub struct Database {
    pub(crate) connection: Arc<Mutex<Connection>>,
}

impl Database {
    pub async fn new(database_path: &str) -> Result<Self> {
        // 确保数据库文件的目录存在
        if let Some(parent) = std::path::Path::new(database_path).parent() {
            if !parent.exists() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    return Err(rusqlite::Error::SqliteFailure(
                        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                        Some(format!("Failed to create directory: {}", e)),
                    ));
                }
                tracing::info!("Created database directory: {}", parent.display());
            }
        }

        let conn = Connection::open(database_path)?;
        tracing::info!("Database initialized at: {}", database_path);

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                image TEXT NOT NULL,
                status TEXT NOT NULL,
                language TEXT NOT NULL,
                plan_id TEXT,
                subscription_expires_at TEXT,
                pending_session_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS favorites (
                user_id TEXT NOT NULL,
                story_id TEXT NOT NULL,
                PRIMARY KEY (user_id, story_id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS plans (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                price TEXT NOT NULL,
                billing TEXT NOT NULL,
                details TEXT NOT NULL,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        // 订阅购买流水：只追加，正常流程不改不删
        conn.execute(
            "CREATE TABLE IF NOT EXISTS ledger (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                plan_id TEXT NOT NULL,
                purchased_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS stories (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                cover_image TEXT NOT NULL,
                category TEXT NOT NULL,
                sherpa TEXT NOT NULL,
                timer TEXT NOT NULL,
                part_ids TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        // part_idx 全局唯一（跨所有 story）
        conn.execute(
            "CREATE TABLE IF NOT EXISTS story_parts (
                id TEXT PRIMARY KEY,
                story_id TEXT NOT NULL,
                part_idx INTEGER NOT NULL UNIQUE,
                english_file TEXT NOT NULL DEFAULT '',
                deutsch_file TEXT NOT NULL DEFAULT '',
                francais_file TEXT NOT NULL DEFAULT '',
                espanol_file TEXT NOT NULL DEFAULT '',
                english_lrc TEXT NOT NULL DEFAULT '',
                deutsch_lrc TEXT NOT NULL DEFAULT '',
                francais_lrc TEXT NOT NULL DEFAULT '',
                espanol_lrc TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS categories (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL,
                image TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sherpas (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL,
                image TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(Self {
            connection: Arc::new(Mutex::new(conn)),
        })
    }
}
