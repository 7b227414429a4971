//! Converters read a third-party forum database and fill the intermediate
//! database, keeping the source's own IDs.

pub mod discourse;
pub mod phpbb;

use std::sync::Arc;

use crate::core::config::Settings;
use crate::core::error::{ImportError, ImportResult};
use crate::core::registry::StepRegistry;
use crate::core::sql::Params;
use crate::core::step::{CopyStep, StepDescriptor, TransformContext};
use crate::core::traits::SqlSource;
use crate::core::value::{Row, Value};
use crate::modules::adapters::connect_source;

pub use discourse::DiscourseConverter;
pub use phpbb::PhpBbConverter;

/// Composition root for one source platform.
pub trait Converter {
    fn name(&self) -> &'static str;

    /// Register this platform's copy steps, each sharing the converter's source.
    fn register_steps(&self, registry: &mut StepRegistry) -> ImportResult<()>;
}

/// Descriptors of a converter's steps, available without connecting.
pub fn converter_descriptors(name: &str) -> ImportResult<&'static [&'static StepDescriptor]> {
    match name {
        "phpbb" => Ok(phpbb::DESCRIPTORS),
        "discourse" => Ok(discourse::DESCRIPTORS),
        other => Err(ImportError::config(format!("Unknown converter '{}'", other))),
    }
}

/// Connect to the configured source and build its converter.
pub async fn build_converter(settings: &Settings) -> ImportResult<Box<dyn Converter>> {
    let adapter = connect_source(&settings.source_db).await?;
    let converter: Box<dyn Converter> = match settings.pipeline.converter.as_str() {
        "phpbb" => Box::new(PhpBbConverter::new(adapter, &settings.phpbb)),
        "discourse" => Box::new(DiscourseConverter::new(adapter)),
        other => return Err(ImportError::config(format!("Unknown converter '{}'", other))),
    };
    tracing::info!("Using the {} converter", converter.name());
    Ok(converter)
}

type RowConversion = Box<dyn Fn(Row) -> ImportResult<Row> + Send>;

/// Copies one source table into its intermediate table.
///
/// The leading `arity` columns of the descriptor's set declaration are the
/// row's key; rows whose key is already in the intermediate table are skipped.
pub struct ConvertStep {
    descriptor: &'static StepDescriptor,
    source: Arc<SqlSource>,
    params: Params,
    convert: RowConversion,
}

impl ConvertStep {
    pub fn new<F>(descriptor: &'static StepDescriptor, source: Arc<SqlSource>, convert: F) -> Self
    where
        F: Fn(Row) -> ImportResult<Row> + Send + 'static,
    {
        Self {
            descriptor,
            source,
            params: Params::new(),
            convert: Box::new(convert),
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }
}

impl CopyStep for ConvertStep {
    fn descriptor(&self) -> &'static StepDescriptor {
        self.descriptor
    }

    fn source(&self) -> &Arc<SqlSource> {
        &self.source
    }

    fn params(&self) -> Params {
        self.params.clone()
    }

    fn transform_row(&mut self, row: Row, cx: &mut TransformContext) -> ImportResult<Option<Row>> {
        let converted = (self.convert)(row)?;
        let arity = self.descriptor.requires_set.map_or(0, |set| set.arity);
        if arity > 0 {
            let key: Vec<Value> = self.descriptor.column_names[..arity]
                .iter()
                .map(|column| converted.get(column).cloned().unwrap_or(Value::Null))
                .collect();
            if !cx.add_if_absent(key)? {
                return Ok(None);
            }
        }
        Ok(Some(converted))
    }
}

/// Text column with surrounding whitespace removed; empty becomes NULL.
pub(crate) fn trimmed(row: &Row, column: &str) -> ImportResult<Value> {
    Ok(row
        .opt_text(column)?
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .into())
}
