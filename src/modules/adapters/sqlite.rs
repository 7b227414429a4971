use async_stream::stream;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::StreamExt;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqlitePool, SqliteRow};
use sqlx::{Column, Row as _, Sqlite, TypeInfo, ValueRef};

use crate::core::error::ImportResult;
use crate::core::sql::Dialect;
use crate::core::traits::{RowStream, SourceAdapter};
use crate::core::value::{Row, Value};
use crate::modules::adapters::first_integer;

/// Adapter over a SQLite database, used for the intermediate database and
/// for SQLite destinations.
#[derive(Clone)]
pub struct SqliteAdapter {
    pool: SqlitePool,
}

impl SqliteAdapter {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl SourceAdapter for SqliteAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn query(&self, sql: &str, params: Vec<Value>) -> ImportResult<Vec<Row>> {
        let rows = bind_all(sqlx::query(sql), params)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_row).collect()
    }

    async fn count(&self, sql: &str, params: Vec<Value>) -> ImportResult<i64> {
        let row = bind_all(sqlx::query(sql), params)
            .fetch_one(&self.pool)
            .await?;
        first_integer(&decode_row(&row)?)
    }

    fn stream(&self, sql: String, params: Vec<Value>) -> RowStream<'_> {
        Box::pin(stream! {
            let mut rows = bind_all(sqlx::query(&sql), params).fetch(&self.pool);
            while let Some(next) = rows.next().await {
                let decoded: ImportResult<Row> = match next {
                    Ok(row) => decode_row(&row),
                    Err(e) => Err(e.into()),
                };
                let failed = decoded.is_err();
                yield decoded;
                if failed {
                    break;
                }
            }
        })
    }
}

pub(crate) fn bind_all<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: Vec<Value>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in params {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Integer(v) => query.bind(v),
            Value::Text(v) => query.bind(v),
            Value::Timestamp(v) => query.bind(v),
            Value::Boolean(v) => query.bind(v),
        };
    }
    query
}

fn decode_row(row: &SqliteRow) -> ImportResult<Row> {
    row.columns()
        .iter()
        .map(|column| -> ImportResult<(String, Value)> {
            let value = decode_column(row, column.ordinal())?;
            Ok((column.name().to_string(), value))
        })
        .collect()
}

// SQLite is dynamically typed; the declared column type decides how
// timestamps and booleans are read back.
fn decode_column(row: &SqliteRow, index: usize) -> Result<Value, sqlx::Error> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Value::Null);
    }

    let declared = row.column(index).type_info().name().to_ascii_uppercase();
    if declared == "DATETIME" || declared == "TIMESTAMP" {
        if let Ok(v) = row.try_get::<DateTime<Utc>, _>(index) {
            return Ok(Value::Timestamp(v));
        }
        if let Ok(v) = row.try_get::<NaiveDateTime, _>(index) {
            return Ok(Value::Timestamp(v.and_utc()));
        }
    }
    if declared == "BOOLEAN" {
        if let Ok(v) = row.try_get::<bool, _>(index) {
            return Ok(Value::Boolean(v));
        }
    }

    row.try_get::<i64, _>(index)
        .map(Value::Integer)
        .or_else(|_| row.try_get::<String, _>(index).map(Value::Text))
        .or_else(|_| row.try_get::<f64, _>(index).map(|v| Value::Text(v.to_string())))
        .or_else(|_| {
            row.try_get::<Vec<u8>, _>(index)
                .map(|bytes| Value::Text(String::from_utf8_lossy(&bytes).into_owned()))
        })
}
