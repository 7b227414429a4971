use futures::stream::{TryChunksError, TryStreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::core::error::{ImportError, ImportResult};
use crate::core::mapping::{IdMapping, MappingStore, MappingType};
use crate::core::set_store::{ExistingKeySet, SimpleSet};
use crate::core::sql::{params, Params, SqlTransformer};
use crate::core::step::{
    CopyStep, IdSequence, SetDeclaration, StepDescriptor, StepReport, StepState, TransformContext,
};
use crate::core::traits::DestinationRef;
use crate::core::value::{Row, Value};

// Tuples handed to the set store per bulk load.
const SET_CHUNK: usize = 10_000;

/// Shared resources for running copy steps against one destination.
#[derive(Clone)]
pub struct CopyEngine {
    destination: DestinationRef,
    mappings: MappingStore,
    batch_size: usize,
}

impl CopyEngine {
    pub fn new(destination: DestinationRef, mappings: MappingStore, batch_size: usize) -> Self {
        Self {
            destination,
            mappings,
            batch_size: batch_size.max(1),
        }
    }

    pub fn destination(&self) -> &DestinationRef {
        &self.destination
    }

    pub fn mappings(&self) -> &MappingStore {
        &self.mappings
    }

    /// Run one step to completion, updating `report` as it goes.
    ///
    /// Any failure leaves the report in `Failed` and is returned wrapped with
    /// the step name. Rows already written stay written.
    pub async fn run(&self, step: &mut dyn CopyStep, report: &mut StepReport) -> ImportResult<()> {
        let descriptor = step.descriptor();
        let started = Instant::now();
        info!("Starting step '{}'", descriptor.name);

        let result = self.copy(step, descriptor, report).await;
        report.elapsed = started.elapsed();

        match result {
            Ok(()) => {
                report.state = StepState::Done;
                info!(
                    "Step '{}' finished: {} inserted, {} skipped in {:.2?}",
                    descriptor.name, report.inserted, report.skipped, report.elapsed
                );
                Ok(())
            }
            Err(e) => {
                report.state = StepState::Failed;
                Err(ImportError::step_failed(descriptor.name, e))
            }
        }
    }

    async fn copy(
        &self,
        step: &mut dyn CopyStep,
        descriptor: &'static StepDescriptor,
        report: &mut StepReport,
    ) -> ImportResult<()> {
        let mut params = descriptor.mapping_params();
        params.extend(step.params());

        let existing = match &descriptor.requires_set {
            Some(declaration) => Some(self.load_existing(declaration, &params).await?),
            None => None,
        };
        let mut cx = match descriptor.produces {
            Some(mapping_type) => {
                self.producing_context(descriptor, mapping_type, existing)
                    .await?
            }
            None => TransformContext::new(descriptor.name, existing, None),
        };

        let source = Arc::clone(step.source());

        report.state = StepState::Counting;
        report.expected = source.count(descriptor.total_rows_query, &params).await?;
        info!("{}: {} rows to copy", descriptor.name, report.expected);

        report.state = StepState::Copying;
        let mut batches = source
            .stream(descriptor.rows_query, &params)?
            .try_chunks(self.batch_size);

        let mut next = batches.try_next().await.map_err(chunk_error)?;
        while let Some(batch) = next {
            report.read += batch.len() as u64;
            let (rows, mappings) = transform_batch(step, descriptor, batch, &mut cx, report)?;

            // Write this batch while the following one is being read.
            let (written, following) = tokio::join!(
                self.write_batch(descriptor, rows, mappings),
                batches.try_next()
            );
            report.inserted += written?;
            next = following.map_err(chunk_error)?;

            info!(
                "{}: {}/{} rows read, {} inserted",
                descriptor.name, report.read, report.expected, report.inserted
            );
        }

        if report.read as i64 != report.expected {
            debug!(
                "{}: counted {} rows but read {}; the difference was filtered by the row query",
                descriptor.name, report.expected, report.read
            );
        }
        if report.skipped > 0 {
            debug!("{}: skipped {} rows", descriptor.name, report.skipped);
        }

        if descriptor.produces.is_some() && report.inserted > 0 {
            self.destination.reset_sequence(descriptor.table).await?;
        }

        Ok(())
    }

    /// Context for a step that allocates `mapping_type` IDs.
    ///
    /// New IDs start after both the table's maximum and the highest ID mapped
    /// so far. Mapped IDs already in the table are loaded so their rows are
    /// skipped, while mapped rows whose batch never landed keep their ID.
    async fn producing_context(
        &self,
        descriptor: &'static StepDescriptor,
        mapping_type: MappingType,
        existing: Option<ExistingKeySet>,
    ) -> ImportResult<TransformContext> {
        let mut last = self.destination.max_id(descriptor.table).await?;
        let mut landed = SimpleSet::new();
        if let Some((first_mapped, last_mapped)) = self.mappings.id_range(mapping_type).await? {
            landed = self.load_landed_ids(descriptor.table, first_mapped).await?;
            last = last.max(last_mapped);
        }
        debug!(
            "{}: {} mapped ids present, allocating ids after {}",
            descriptor.name,
            landed.len(),
            last
        );

        let sequence = IdSequence::starting_after(last);
        Ok(
            TransformContext::new(descriptor.name, existing, Some((mapping_type, sequence)))
                .with_landed_ids(landed),
        )
    }

    async fn load_landed_ids(&self, table: &str, first_id: i64) -> ImportResult<SimpleSet<i64>> {
        let reader = self.destination.reader();
        let query = format!(r#"SELECT id FROM "{}" WHERE id >= :first_id"#, table);
        let (sql, values) = SqlTransformer::new(reader.dialect())
            .transform(&query, &params([("first_id", first_id)]))?;

        let mut ids = SimpleSet::new();
        let mut rows = reader.stream(sql, values);
        while let Some(row) = rows.try_next().await? {
            ids.add(row.i64("id")?);
        }
        Ok(ids)
    }

    /// Bootstrap the step's existing-key set from the destination.
    async fn load_existing(
        &self,
        declaration: &SetDeclaration,
        params: &Params,
    ) -> ImportResult<ExistingKeySet> {
        let reader = self.destination.reader();
        let (sql, values) = SqlTransformer::new(reader.dialect()).transform(declaration.query, params)?;

        let mut set = ExistingKeySet::with_arity(declaration.name, declaration.arity)?;
        let mut chunks = reader
            .stream(sql, values)
            .map_ok(Row::into_values)
            .try_chunks(SET_CHUNK);
        while let Some(tuples) = chunks.try_next().await.map_err(chunk_error)? {
            set.bulk_add(tuples)?;
        }

        debug!("Loaded {} keys into set '{}'", set.len(), declaration.name);
        Ok(set)
    }

    async fn write_batch(
        &self,
        descriptor: &StepDescriptor,
        rows: Vec<Vec<Value>>,
        mappings: Vec<IdMapping>,
    ) -> ImportResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        // Mappings first: a batch cut short after this point is re-inserted
        // under the same IDs by the next run.
        if !mappings.is_empty() {
            self.mappings.record(&mappings).await?;
        }
        self.destination
            .insert_rows(descriptor.table, descriptor.column_names, rows)
            .await
    }
}

fn chunk_error<T>(error: TryChunksError<T, ImportError>) -> ImportError {
    error.1
}

fn transform_batch(
    step: &mut dyn CopyStep,
    descriptor: &StepDescriptor,
    batch: Vec<Row>,
    cx: &mut TransformContext,
    report: &mut StepReport,
) -> ImportResult<(Vec<Vec<Value>>, Vec<IdMapping>)> {
    let mut rows = Vec::with_capacity(batch.len());
    for row in batch {
        let queued = cx.pending_len();
        match step.transform_row(row, cx)? {
            Some(row) => rows.push(ordered_values(descriptor, row)?),
            None => {
                cx.discard_pending_from(queued);
                report.skipped += 1;
            }
        }
    }
    Ok((rows, cx.take_pending()))
}

/// Values of `row` in the descriptor's column order.
fn ordered_values(descriptor: &StepDescriptor, mut row: Row) -> ImportResult<Vec<Value>> {
    descriptor
        .column_names
        .iter()
        .map(|&column| {
            if row.get(column).is_none() {
                return Err(ImportError::MissingColumn {
                    step: descriptor.name.to_string(),
                    column: column.to_string(),
                });
            }
            Ok(row.take(column))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: StepDescriptor = StepDescriptor {
        name: "test.users",
        table: "users",
        produces: None,
        depends_on: &[],
        ordered_after: &[],
        column_names: &["id", "username"],
        total_rows_query: "SELECT COUNT(*) FROM users",
        rows_query: "SELECT * FROM users",
        requires_set: None,
    };

    #[test]
    fn test_ordered_values_follow_column_names() {
        let row = Row::new()
            .with("username", "alice")
            .with("extra", 5)
            .with("id", 7);
        assert_eq!(
            ordered_values(&DESCRIPTOR, row).unwrap(),
            vec![Value::Integer(7), Value::Text("alice".to_string())]
        );
    }

    #[test]
    fn test_ordered_values_missing_column() {
        let row = Row::new().with("id", 7);
        match ordered_values(&DESCRIPTOR, row) {
            Err(ImportError::MissingColumn { step, column }) => {
                assert_eq!(step, "test.users");
                assert_eq!(column, "username");
            }
            other => panic!("expected a missing column error, got {:?}", other),
        }
    }

    #[test]
    fn test_null_column_is_not_missing() {
        let row = Row::new().with("id", 7).with("username", Value::Null);
        assert_eq!(
            ordered_values(&DESCRIPTOR, row).unwrap(),
            vec![Value::Integer(7), Value::Null]
        );
    }
}
