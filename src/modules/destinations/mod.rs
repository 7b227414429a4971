pub mod postgres;
pub mod sqlite;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;

use crate::core::config::DatabaseConfig;
use crate::core::error::{ImportError, ImportResult};
use crate::core::traits::DestinationRef;

pub use postgres::PostgresDestination;
pub use sqlite::SqliteDestination;

/// Open the destination described by `config`.
pub async fn connect_destination(config: &DatabaseConfig) -> ImportResult<DestinationRef> {
    let destination: DestinationRef = match config.db_type.as_str() {
        "postgres" => {
            Arc::new(PostgresDestination::connect(&config.url, config.max_connections).await?)
        }
        "sqlite" => {
            let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);
            let pool = SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .connect_with(options)
                .await?;
            Arc::new(SqliteDestination::new("sqlite", pool))
        }
        other => {
            return Err(ImportError::config(format!(
                "Unknown destination type '{}'",
                other
            )))
        }
    };
    Ok(destination)
}

/// Double-quoted SQL identifier.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub(crate) fn column_list(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}
