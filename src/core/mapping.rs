use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use sqlx::{QueryBuilder, Sqlite};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::core::error::{ImportError, ImportResult};

/// Entity category used as the discriminator of `mapped_ids` rows and as the
/// key of the step dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingType {
    Groups,
    Users,
    Categories,
    Topics,
    Posts,
}

impl MappingType {
    pub const ALL: [MappingType; 5] = [
        MappingType::Groups,
        MappingType::Users,
        MappingType::Categories,
        MappingType::Topics,
        MappingType::Posts,
    ];

    /// Discriminator stored in the `type` column. Never renumber.
    pub fn id(&self) -> i64 {
        match self {
            MappingType::Groups => 1,
            MappingType::Users => 2,
            MappingType::Categories => 3,
            MappingType::Topics => 4,
            MappingType::Posts => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MappingType::Groups => "groups",
            MappingType::Users => "users",
            MappingType::Categories => "categories",
            MappingType::Topics => "topics",
            MappingType::Posts => "posts",
        }
    }

    /// Name under which queries reference this type, e.g. `:users_type`.
    pub fn param_name(&self) -> String {
        format!("{}_type", self.as_str())
    }
}

impl fmt::Display for MappingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MappingType {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MappingType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ImportError::config(format!("Unknown mapping type '{}'", s)))
    }
}

/// Source ID to destination ID translation for one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdMapping {
    pub mapping_type: MappingType,
    pub original_id: i64,
    pub discourse_id: i64,
}

impl IdMapping {
    pub fn new(mapping_type: MappingType, original_id: i64, discourse_id: i64) -> Self {
        Self {
            mapping_type,
            original_id,
            discourse_id,
        }
    }
}

/// Durable `mapped_ids` table inside the intermediate database.
///
/// Rows are append-only; `(type, original_id)` is the primary key and a second
/// record for the same pair is ignored.
#[derive(Debug, Clone)]
pub struct MappingStore {
    pool: SqlitePool,
}

// Three bound values per row, kept under SQLite's variable limit.
const RECORD_CHUNK: usize = 10_000;

impl MappingStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_schema(&self) -> ImportResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS mapped_ids (
                type INTEGER NOT NULL,
                original_id INTEGER NOT NULL,
                discourse_id INTEGER NOT NULL,
                PRIMARY KEY (type, original_id)
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert mappings in bulk; returns how many were new.
    pub async fn record(&self, mappings: &[IdMapping]) -> ImportResult<u64> {
        let mut inserted = 0;
        for chunk in mappings.chunks(RECORD_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("INSERT OR IGNORE INTO mapped_ids (type, original_id, discourse_id) ");
            builder.push_values(chunk, |mut row, mapping| {
                row.push_bind(mapping.mapping_type.id())
                    .push_bind(mapping.original_id)
                    .push_bind(mapping.discourse_id);
            });
            inserted += builder.build().execute(&self.pool).await?.rows_affected();
        }
        debug!("Recorded {} of {} id mappings", inserted, mappings.len());
        Ok(inserted)
    }

    pub async fn lookup(
        &self,
        mapping_type: MappingType,
        original_id: i64,
    ) -> ImportResult<Option<i64>> {
        let discourse_id = sqlx::query_scalar(
            "SELECT discourse_id FROM mapped_ids WHERE type = ? AND original_id = ?",
        )
        .bind(mapping_type.id())
        .bind(original_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(discourse_id)
    }

    pub async fn count(&self, mapping_type: MappingType) -> ImportResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM mapped_ids WHERE type = ?")
            .bind(mapping_type.id())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Lowest and highest destination ID mapped for `mapping_type`.
    pub async fn id_range(&self, mapping_type: MappingType) -> ImportResult<Option<(i64, i64)>> {
        let (first, last): (Option<i64>, Option<i64>) = sqlx::query_as(
            "SELECT MIN(discourse_id), MAX(discourse_id) FROM mapped_ids WHERE type = ?",
        )
        .bind(mapping_type.id())
        .fetch_one(&self.pool)
        .await?;
        Ok(first.zip(last))
    }

    /// Forget every mapping. Only used for a full pipeline reset.
    pub async fn reset(&self) -> ImportResult<u64> {
        let result = sqlx::query("DELETE FROM mapped_ids")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::intermediate::IntermediateDb;

    #[test]
    fn test_mapping_type_names() {
        assert_eq!(MappingType::Users.param_name(), "users_type");
        assert_eq!("topics".parse::<MappingType>().unwrap(), MappingType::Topics);
        assert!("badges".parse::<MappingType>().is_err());
    }

    #[tokio::test]
    async fn test_record_is_unique_per_type_and_original_id() {
        let dir = tempfile::tempdir().unwrap();
        let db = IntermediateDb::open(dir.path().join("mappings.db"))
            .await
            .unwrap();
        let store = db.mapping_store();

        let first = store
            .record(&[
                IdMapping::new(MappingType::Users, 1, 201),
                IdMapping::new(MappingType::Users, 2, 202),
                IdMapping::new(MappingType::Groups, 1, 101),
            ])
            .await
            .unwrap();
        assert_eq!(first, 3);

        let second = store
            .record(&[
                IdMapping::new(MappingType::Users, 1, 999),
                IdMapping::new(MappingType::Users, 3, 203),
            ])
            .await
            .unwrap();
        assert_eq!(second, 1);

        assert_eq!(store.lookup(MappingType::Users, 1).await.unwrap(), Some(201));
        assert_eq!(store.lookup(MappingType::Groups, 1).await.unwrap(), Some(101));
        assert_eq!(store.lookup(MappingType::Groups, 2).await.unwrap(), None);
        assert_eq!(store.count(MappingType::Users).await.unwrap(), 3);
        assert_eq!(
            store.id_range(MappingType::Users).await.unwrap(),
            Some((201, 203))
        );
        assert_eq!(store.id_range(MappingType::Posts).await.unwrap(), None);

        assert_eq!(store.reset().await.unwrap(), 4);
        assert_eq!(store.count(MappingType::Users).await.unwrap(), 0);
    }
}
