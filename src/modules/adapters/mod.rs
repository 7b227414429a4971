pub mod mysql;
pub mod postgres;
pub mod sqlite;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::core::config::DatabaseConfig;
use crate::core::error::{ImportError, ImportResult};
use crate::core::traits::SourceAdapterRef;
use crate::core::value::{Row, Value};

pub use mysql::MySqlAdapter;
pub use postgres::PostgresAdapter;
pub use sqlite::SqliteAdapter;

/// Engine of a third-party source database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    MySql,
    Postgres,
}

impl FromStr for SourceType {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(SourceType::MySql),
            "postgres" | "postgresql" => Ok(SourceType::Postgres),
            _ => Err(ImportError::UnknownSourceType(s.to_string())),
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::MySql => write!(f, "mysql"),
            SourceType::Postgres => write!(f, "postgres"),
        }
    }
}

/// Open the adapter matching `config.db_type`.
pub async fn connect_source(config: &DatabaseConfig) -> ImportResult<SourceAdapterRef> {
    let source_type: SourceType = config.db_type.parse()?;
    let adapter: SourceAdapterRef = match source_type {
        SourceType::MySql => {
            Arc::new(MySqlAdapter::connect(&config.url, config.max_connections).await?)
        }
        SourceType::Postgres => {
            Arc::new(PostgresAdapter::connect(&config.url, config.max_connections).await?)
        }
    };
    Ok(adapter)
}

/// First column of a single-row result as an integer.
pub(crate) fn first_integer(row: &Row) -> ImportResult<i64> {
    row.values()
        .next()
        .and_then(Value::as_i64)
        .ok_or_else(|| ImportError::invalid_value("count", "an integer"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_type_parsing() {
        assert_eq!("mysql".parse::<SourceType>().unwrap(), SourceType::MySql);
        assert_eq!("MariaDB".parse::<SourceType>().unwrap(), SourceType::MySql);
        assert_eq!(
            "postgresql".parse::<SourceType>().unwrap(),
            SourceType::Postgres
        );
        assert!(matches!(
            "oracle".parse::<SourceType>(),
            Err(ImportError::UnknownSourceType(name)) if name == "oracle"
        ));
    }
}
