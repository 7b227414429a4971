use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolCopyExt};

use crate::core::error::ImportResult;
use crate::core::traits::{Destination, SourceAdapter};
use crate::core::value::Value;
use crate::modules::adapters::PostgresAdapter;
use crate::modules::destinations::{column_list, quote_ident};

/// Writes rows to PostgreSQL with `COPY ... FROM STDIN` in text format.
pub struct PostgresDestination {
    reader: PostgresAdapter,
}

impl PostgresDestination {
    pub async fn connect(url: &str, max_connections: u32) -> ImportResult<Self> {
        Ok(Self {
            reader: PostgresAdapter::connect(url, max_connections).await?,
        })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            reader: PostgresAdapter::from_pool(pool),
        }
    }
}

#[async_trait]
impl Destination for PostgresDestination {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn insert_rows(
        &self,
        table: &str,
        columns: &[&str],
        rows: Vec<Vec<Value>>,
    ) -> ImportResult<u64> {
        let statement = format!(
            "COPY {} ({}) FROM STDIN",
            quote_ident(table),
            column_list(columns)
        );
        let mut copy = self.reader.pool().copy_in_raw(&statement).await?;
        copy.send(encode_rows(&rows).into_bytes()).await?;
        Ok(copy.finish().await?)
    }

    async fn max_id(&self, table: &str) -> ImportResult<i64> {
        let sql = format!("SELECT COALESCE(MAX(id), 0)::bigint FROM {}", quote_ident(table));
        self.reader.count(&sql, Vec::new()).await
    }

    async fn reset_sequence(&self, table: &str) -> ImportResult<()> {
        let quoted = quote_ident(table);
        let sql = format!(
            "SELECT setval(pg_get_serial_sequence($1, 'id'), (SELECT COALESCE(MAX(id), 0) + 1 FROM {}), false)",
            quoted
        );
        sqlx::query(&sql)
            .bind(quoted)
            .execute(self.reader.pool())
            .await?;
        Ok(())
    }

    fn reader(&self) -> &dyn SourceAdapter {
        &self.reader
    }
}

/// Rows in COPY text format: tab separated, one line per row.
fn encode_rows(rows: &[Vec<Value>]) -> String {
    let mut out = String::new();
    for row in rows {
        for (i, value) in row.iter().enumerate() {
            if i > 0 {
                out.push('\t');
            }
            encode_value(value, &mut out);
        }
        out.push('\n');
    }
    out
}

fn encode_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("\\N"),
        Value::Boolean(v) => out.push(if *v { 't' } else { 'f' }),
        Value::Text(v) => {
            for c in v.chars() {
                match c {
                    '\\' => out.push_str("\\\\"),
                    '\t' => out.push_str("\\t"),
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    c => out.push(c),
                }
            }
        }
        other => out.push_str(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sql::Dialect;
    use crate::core::traits::DestinationRef;
    use chrono::{TimeZone, Utc};
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;

    #[test]
    fn test_copy_text_encoding() {
        let rows = vec![
            vec![
                Value::Integer(1),
                Value::Text("a\tb\\c\nd\re".to_string()),
                Value::Null,
                Value::Boolean(true),
            ],
            vec![
                Value::Integer(2),
                Value::Timestamp(Utc.with_ymd_and_hms(2020, 5, 17, 8, 30, 0).unwrap()),
                Value::Text(String::new()),
                Value::Boolean(false),
            ],
        ];
        assert_eq!(
            encode_rows(&rows),
            "1\ta\\tb\\\\c\\nd\\re\t\\N\tt\n\
             2\t2020-05-17 08:30:00.000000+00\t\tf\n"
        );
    }

    #[tokio::test]
    async fn test_destination_over_lazy_pool() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://forum@localhost/forum")
            .unwrap();
        let destination: DestinationRef = Arc::new(PostgresDestination::from_pool(pool));

        assert_eq!(destination.name(), "postgres");
        assert_eq!(destination.reader().dialect(), Dialect::Postgres);
    }
}
