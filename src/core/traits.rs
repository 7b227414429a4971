use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

use crate::core::error::ImportResult;
use crate::core::sql::{Dialect, Params, SqlTransformer};
use crate::core::value::{Row, Value};

pub type RowStream<'a> = BoxStream<'a, ImportResult<Row>>;

/// Query access to one database engine. Adapters only move rows; driver
/// errors are passed through unchanged.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Run `sql` with positional `params` and collect every row.
    async fn query(&self, sql: &str, params: Vec<Value>) -> ImportResult<Vec<Row>>;

    /// Run a query returning a single integer, such as `SELECT COUNT(*)`.
    async fn count(&self, sql: &str, params: Vec<Value>) -> ImportResult<i64>;

    /// Stream the rows of `sql` without materialising the whole result.
    fn stream(&self, sql: String, params: Vec<Value>) -> RowStream<'_>;
}

pub type SourceAdapterRef = Arc<dyn SourceAdapter>;

/// A source adapter paired with the transformer for its dialect.
///
/// Steps hand this named-parameter SQL; it is rewritten into the adapter's
/// native form before execution.
#[derive(Clone)]
pub struct SqlSource {
    adapter: SourceAdapterRef,
    transformer: SqlTransformer,
}

impl SqlSource {
    pub fn new(adapter: SourceAdapterRef) -> Self {
        let transformer = SqlTransformer::new(adapter.dialect());
        Self {
            adapter,
            transformer,
        }
    }

    pub fn with_table_prefix(mut self, default_prefix: &str, configured_prefix: &str) -> Self {
        self.transformer = self
            .transformer
            .with_table_prefix(default_prefix, configured_prefix);
        self
    }

    pub async fn query(&self, sql: &str, params: &Params) -> ImportResult<Vec<Row>> {
        let (sql, values) = self.transformer.transform(sql, params)?;
        self.adapter.query(&sql, values).await
    }

    pub async fn count(&self, sql: &str, params: &Params) -> ImportResult<i64> {
        let (sql, values) = self.transformer.transform(sql, params)?;
        tracing::debug!("count: {}", sql);
        self.adapter.count(&sql, values).await
    }

    pub fn stream(&self, sql: &str, params: &Params) -> ImportResult<RowStream<'_>> {
        let (sql, values) = self.transformer.transform(sql, params)?;
        tracing::debug!("rows: {}", sql);
        Ok(self.adapter.stream(sql, values))
    }
}

/// Bulk writer for the tables a step fills.
#[async_trait]
pub trait Destination: Send + Sync {
    fn name(&self) -> &str;

    /// Insert `rows`, each holding one value per entry of `columns`.
    async fn insert_rows(
        &self,
        table: &str,
        columns: &[&str],
        rows: Vec<Vec<Value>>,
    ) -> ImportResult<u64>;

    /// Highest `id` currently in `table`, or 0 when it is empty.
    async fn max_id(&self, table: &str) -> ImportResult<i64>;

    /// Move the table's id sequence past IDs that were inserted explicitly.
    async fn reset_sequence(&self, _table: &str) -> ImportResult<()> {
        Ok(())
    }

    /// Read access to the destination, used to bootstrap existing-key sets.
    fn reader(&self) -> &dyn SourceAdapter;
}

pub type DestinationRef = Arc<dyn Destination>;
