use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::core::error::ImportResult;
use crate::core::mapping::MappingStore;
use crate::core::traits::SqlSource;
use crate::modules::adapters::SqliteAdapter;
use crate::modules::destinations::SqliteDestination;

/// Tables converters write and the importer reads, keyed by the source's IDs.
const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS "groups" (
        original_id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        full_name TEXT,
        bio TEXT,
        visibility_level INTEGER,
        created_at DATETIME
    )"#,
    r#"CREATE TABLE IF NOT EXISTS users (
        original_id INTEGER PRIMARY KEY,
        username TEXT NOT NULL,
        name TEXT,
        email TEXT,
        admin BOOLEAN NOT NULL DEFAULT 0,
        moderator BOOLEAN NOT NULL DEFAULT 0,
        active BOOLEAN NOT NULL DEFAULT 1,
        trust_level INTEGER,
        created_at DATETIME,
        last_seen_at DATETIME
    )"#,
    r#"CREATE TABLE IF NOT EXISTS group_users (
        group_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        owner BOOLEAN NOT NULL DEFAULT 0,
        created_at DATETIME,
        PRIMARY KEY (group_id, user_id)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS categories (
        original_id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT,
        parent_id INTEGER,
        position INTEGER,
        created_at DATETIME
    )"#,
    r#"CREATE TABLE IF NOT EXISTS topics (
        original_id INTEGER PRIMARY KEY,
        title TEXT NOT NULL,
        category_id INTEGER,
        user_id INTEGER NOT NULL,
        archetype TEXT,
        views INTEGER NOT NULL DEFAULT 0,
        closed BOOLEAN NOT NULL DEFAULT 0,
        created_at DATETIME
    )"#,
    r#"CREATE TABLE IF NOT EXISTS posts (
        original_id INTEGER PRIMARY KEY,
        topic_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        raw TEXT NOT NULL,
        post_type INTEGER,
        created_at DATETIME
    )"#,
    r#"CREATE TABLE IF NOT EXISTS uploads (
        original_id INTEGER PRIMARY KEY,
        user_id INTEGER,
        post_id INTEGER,
        filename TEXT NOT NULL,
        path TEXT,
        url TEXT,
        filesize INTEGER,
        created_at DATETIME
    )"#,
    "CREATE INDEX IF NOT EXISTS topics_by_user ON topics (user_id)",
    "CREATE INDEX IF NOT EXISTS posts_by_topic ON posts (topic_id, created_at)",
];

/// Intermediate SQLite database shared by both phases.
///
/// It receives converted rows and hosts `mapped_ids`, so importer queries can
/// join source rows against the mappings directly.
#[derive(Clone)]
pub struct IntermediateDb {
    path: PathBuf,
    pool: SqlitePool,
}

impl IntermediateDb {
    /// Open (creating if needed) the database at `path` and its schema.
    pub async fn open<P: AsRef<Path>>(path: P) -> ImportResult<Self> {
        let path = path.as_ref().to_path_buf();
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let db = Self { path, pool };
        db.create_schema().await?;
        info!("Opened intermediate database {}", db.path.display());
        Ok(db)
    }

    pub async fn create_schema(&self) -> ImportResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        self.mapping_store().create_schema().await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn mapping_store(&self) -> MappingStore {
        MappingStore::new(self.pool.clone())
    }

    /// The database as the source of importer steps.
    pub fn source(&self) -> Arc<SqlSource> {
        Arc::new(SqlSource::new(Arc::new(SqliteAdapter::new(self.pool.clone()))))
    }

    /// The database as the destination of converter steps.
    pub fn destination(&self) -> SqliteDestination {
        SqliteDestination::new("intermediate", self.pool.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_creation_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intermediate.db");

        let db = IntermediateDb::open(&path).await.unwrap();
        db.create_schema().await.unwrap();
        drop(db);

        let reopened = IntermediateDb::open(&path).await.unwrap();
        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
             ('groups', 'users', 'group_users', 'categories', 'topics', 'posts', 'uploads', 'mapped_ids')",
        )
        .fetch_one(reopened.pool())
        .await
        .unwrap();
        assert_eq!(tables, 8);
    }
}
