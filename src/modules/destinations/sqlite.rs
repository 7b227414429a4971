use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use sqlx::{QueryBuilder, Sqlite};

use crate::core::error::ImportResult;
use crate::core::traits::{Destination, SourceAdapter};
use crate::core::value::Value;
use crate::modules::adapters::SqliteAdapter;
use crate::modules::destinations::{column_list, quote_ident};

// SQLite allows 32766 bound variables per statement.
const MAX_VARIABLES: usize = 32_000;

/// Writes rows with multi-row `INSERT` statements.
pub struct SqliteDestination {
    name: String,
    reader: SqliteAdapter,
}

impl SqliteDestination {
    pub fn new(name: &str, pool: SqlitePool) -> Self {
        Self {
            name: name.to_string(),
            reader: SqliteAdapter::new(pool),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        self.reader.pool()
    }
}

#[async_trait]
impl Destination for SqliteDestination {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert_rows(
        &self,
        table: &str,
        columns: &[&str],
        rows: Vec<Vec<Value>>,
    ) -> ImportResult<u64> {
        let chunk_size = (MAX_VARIABLES / columns.len().max(1)).max(1);
        let prefix = format!("INSERT INTO {} ({}) ", quote_ident(table), column_list(columns));

        let mut inserted = 0;
        let mut tx = self.pool().begin().await?;
        for chunk in rows.chunks(chunk_size) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(&prefix);
            builder.push_values(chunk, |mut row, values| {
                for value in values {
                    match value.clone() {
                        Value::Null => row.push_bind(None::<String>),
                        Value::Integer(v) => row.push_bind(v),
                        Value::Text(v) => row.push_bind(v),
                        Value::Timestamp(v) => row.push_bind(v),
                        Value::Boolean(v) => row.push_bind(v),
                    };
                }
            });
            inserted += builder.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn max_id(&self, table: &str) -> ImportResult<i64> {
        let sql = format!("SELECT COALESCE(MAX(id), 0) FROM {}", quote_ident(table));
        self.reader.count(&sql, Vec::new()).await
    }

    fn reader(&self) -> &dyn SourceAdapter {
        &self.reader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn destination() -> SqliteDestination {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(r#"CREATE TABLE "groups" (id INTEGER PRIMARY KEY, name TEXT, "primary" BOOLEAN)"#)
            .execute(&pool)
            .await
            .unwrap();
        SqliteDestination::new("test", pool)
    }

    #[tokio::test]
    async fn test_insert_rows_and_max_id() {
        let destination = destination().await;
        assert_eq!(destination.max_id("groups").await.unwrap(), 0);

        let inserted = destination
            .insert_rows(
                "groups",
                &["id", "name", "primary"],
                vec![
                    vec![Value::Integer(4), "staff".into(), Value::Boolean(true)],
                    vec![Value::Integer(9), Value::Null, Value::Boolean(false)],
                ],
            )
            .await
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(destination.max_id("groups").await.unwrap(), 9);

        let rows = destination
            .reader()
            .query(r#"SELECT name FROM "groups" ORDER BY id"#, Vec::new())
            .await
            .unwrap();
        assert_eq!(rows[0].get("name"), Some(&Value::Text("staff".to_string())));
        assert_eq!(rows[1].get("name"), Some(&Value::Null));
    }
}
