use async_stream::stream;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::StreamExt;
use sqlx::mysql::{MySqlArguments, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, MySql, Row as _, ValueRef};

use crate::core::error::ImportResult;
use crate::core::sql::Dialect;
use crate::core::traits::{RowStream, SourceAdapter};
use crate::core::value::{Row, Value};
use crate::modules::adapters::first_integer;

/// Source adapter for MySQL and MariaDB, using `?` placeholders.
pub struct MySqlAdapter {
    pool: MySqlPool,
}

impl MySqlAdapter {
    pub async fn connect(url: &str, max_connections: u32) -> ImportResult<Self> {
        tracing::info!("Connecting to MySQL source");
        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SourceAdapter for MySqlAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
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

fn bind_all(
    mut query: Query<'_, MySql, MySqlArguments>,
    params: Vec<Value>,
) -> Query<'_, MySql, MySqlArguments> {
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

fn decode_row(row: &MySqlRow) -> ImportResult<Row> {
    row.columns()
        .iter()
        .map(|column| -> ImportResult<(String, Value)> {
            let value = decode_column(row, column.ordinal())?;
            Ok((column.name().to_string(), value))
        })
        .collect()
}

// phpBB ids are unsigned and several text columns use binary collations,
// so unsigned integers and raw bytes are tried as well.
fn decode_column(row: &MySqlRow, index: usize) -> Result<Value, sqlx::Error> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Value::Null);
    }

    row.try_get::<i64, _>(index)
        .map(Value::Integer)
        .or_else(|_| {
            row.try_get::<u64, _>(index).and_then(|v| {
                i64::try_from(v)
                    .map(Value::Integer)
                    .map_err(|e| sqlx::Error::Decode(Box::new(e)))
            })
        })
        .or_else(|_| row.try_get::<bool, _>(index).map(Value::Boolean))
        .or_else(|_| row.try_get::<String, _>(index).map(Value::Text))
        .or_else(|_| row.try_get::<DateTime<Utc>, _>(index).map(Value::Timestamp))
        .or_else(|_| {
            row.try_get::<NaiveDateTime, _>(index)
                .map(|v| Value::Timestamp(v.and_utc()))
        })
        .or_else(|_| row.try_get::<f64, _>(index).map(|v| Value::Text(v.to_string())))
        .or_else(|_| {
            row.try_get::<Vec<u8>, _>(index)
                .map(|bytes| Value::Text(String::from_utf8_lossy(&bytes).into_owned()))
        })
}
