use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::core::error::{ImportError, ImportResult};
use crate::core::mapping::{IdMapping, MappingType};
use crate::core::set_store::{ExistingKeySet, SimpleSet};
use crate::core::sql::Params;
use crate::core::traits::SqlSource;
use crate::core::value::{Row, Value};

/// Query that loads the keys already present at the destination.
///
/// `query` must return `arity` columns, ordered by those columns.
#[derive(Debug, Clone, Copy)]
pub struct SetDeclaration {
    pub name: &'static str,
    pub query: &'static str,
    pub arity: usize,
}

/// Static declaration of a copy step. One constant per step type.
#[derive(Debug, Clone, Copy)]
pub struct StepDescriptor {
    /// Unique step name, e.g. "import.users"
    pub name: &'static str,
    /// Destination table rows are inserted into
    pub table: &'static str,
    /// Mapping type whose IDs this step allocates and records
    pub produces: Option<MappingType>,
    /// Mapping types whose rows must exist before this step can run
    pub depends_on: &'static [MappingType],
    /// Types whose producers run first when registered, but may be absent
    pub ordered_after: &'static [MappingType],
    /// Insertable destination columns, in the order values are written
    pub column_names: &'static [&'static str],
    pub total_rows_query: &'static str,
    pub rows_query: &'static str,
    pub requires_set: Option<SetDeclaration>,
}

impl StepDescriptor {
    /// Mapping types bound as `:<type>_type` parameters in both queries.
    pub fn mapping_params(&self) -> Params {
        self.depends_on
            .iter()
            .chain(self.ordered_after)
            .chain(self.produces.iter())
            .map(|t| (t.param_name(), Value::Integer(t.id())))
            .collect()
    }
}

/// One unit of migration work: a destination table filled from a source query.
///
/// Steps receive their source from the converter that builds them and are
/// executed by the copy engine in dependency order.
pub trait CopyStep: Send {
    fn descriptor(&self) -> &'static StepDescriptor;

    fn source(&self) -> &Arc<SqlSource>;

    /// Parameters besides the mapping types, e.g. source-specific constants.
    fn params(&self) -> Params {
        Params::new()
    }

    /// Turn a source row into a destination row, or `None` to skip it.
    ///
    /// Any error aborts the whole step.
    fn transform_row(&mut self, row: Row, cx: &mut TransformContext) -> ImportResult<Option<Row>>;
}

pub type BoxedStep = Box<dyn CopyStep>;

/// Lifecycle of a step inside one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    Pending,
    Counting,
    Copying,
    Done,
    Failed,
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepState::Pending => "pending",
            StepState::Counting => "counting",
            StepState::Copying => "copying",
            StepState::Done => "done",
            StepState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub name: String,
    pub state: StepState,
    /// Rows the counting query expected; progress only
    pub expected: i64,
    pub read: u64,
    pub inserted: u64,
    /// Rows `transform_row` dropped, usually duplicates
    pub skipped: u64,
    pub elapsed: Duration,
}

impl StepReport {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: StepState::Pending,
            expected: 0,
            read: 0,
            inserted: 0,
            skipped: 0,
            elapsed: Duration::ZERO,
        }
    }
}

/// Consecutive destination IDs starting after the current maximum.
#[derive(Debug, Clone)]
pub struct IdSequence {
    last: i64,
}

impl IdSequence {
    pub fn starting_after(last: i64) -> Self {
        Self { last }
    }

    pub fn next_id(&mut self) -> i64 {
        self.last += 1;
        self.last
    }
}

/// Per-step state handed to `transform_row`.
pub struct TransformContext {
    step: &'static str,
    existing: Option<ExistingKeySet>,
    produces: Option<(MappingType, IdSequence)>,
    // mapped destination ids already present in the step's table
    landed: SimpleSet<i64>,
    pending: Vec<IdMapping>,
}

impl TransformContext {
    pub fn new(
        step: &'static str,
        existing: Option<ExistingKeySet>,
        produces: Option<(MappingType, IdSequence)>,
    ) -> Self {
        Self {
            step,
            existing,
            produces,
            landed: SimpleSet::new(),
            pending: Vec::new(),
        }
    }

    pub fn with_landed_ids(mut self, landed: SimpleSet<i64>) -> Self {
        self.landed = landed;
        self
    }

    /// Record `tuple` in the step's existing-key set; `false` means it was
    /// already imported and the row should be skipped.
    pub fn add_if_absent(&mut self, tuple: Vec<Value>) -> ImportResult<bool> {
        let step = self.step;
        self.existing
            .as_mut()
            .ok_or_else(|| {
                ImportError::config(format!("Step '{}' declares no existing-key set", step))
            })?
            .add_if_absent(tuple)
    }

    /// Allocate the destination ID for `original_id` and queue its mapping.
    pub fn map_id(&mut self, original_id: i64) -> ImportResult<i64> {
        let (mapping_type, sequence) = self.produces.as_mut().ok_or_else(|| {
            ImportError::config(format!("Step '{}' does not produce a mapping type", self.step))
        })?;
        let discourse_id = sequence.next_id();
        self.pending
            .push(IdMapping::new(*mapping_type, original_id, discourse_id));
        Ok(discourse_id)
    }

    /// Destination ID for a row that an earlier run may already have mapped
    /// to `mapped_id`.
    ///
    /// Unmapped rows get a fresh ID. A mapped row keeps its ID, or yields
    /// `None` when it already reached the destination and must be skipped.
    pub fn resume_id(&mut self, original_id: i64, mapped_id: Option<i64>) -> ImportResult<Option<i64>> {
        match mapped_id {
            Some(id) if !self.landed.add_if_absent(id) => Ok(None),
            Some(id) => Ok(Some(id)),
            None => self.map_id(original_id).map(Some),
        }
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop mappings queued for a row that was skipped after all.
    pub(crate) fn discard_pending_from(&mut self, len: usize) {
        self.pending.truncate(len);
    }

    pub(crate) fn take_pending(&mut self) -> Vec<IdMapping> {
        std::mem::take(&mut self.pending)
    }
}

/// `value` if it is one of `allowed`, otherwise `default`.
pub fn ensure_valid_value<T: PartialEq + Clone>(value: Option<T>, allowed: &[T], default: T) -> T {
    match value {
        Some(v) if allowed.contains(&v) => v,
        _ => default,
    }
}

/// URL-friendly form of a name: lowercase ASCII words joined by dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_valid_value_falls_back() {
        assert_eq!(ensure_valid_value(Some(3), &[0, 1, 2, 3, 4], 0), 3);
        assert_eq!(ensure_valid_value(Some(9), &[0, 1, 2, 3, 4], 0), 0);
        assert_eq!(ensure_valid_value(None, &[1, 2], 1), 1);
        assert_eq!(
            ensure_valid_value(Some("banner"), &["regular", "private_message"], "regular"),
            "regular"
        );
    }

    #[test]
    fn test_map_id_allocates_after_current_max() {
        let mut cx = TransformContext::new(
            "import.users",
            None,
            Some((MappingType::Users, IdSequence::starting_after(41))),
        );
        assert_eq!(cx.map_id(7).unwrap(), 42);
        assert_eq!(cx.map_id(8).unwrap(), 43);

        let pending = cx.take_pending();
        assert_eq!(
            pending,
            vec![
                IdMapping::new(MappingType::Users, 7, 42),
                IdMapping::new(MappingType::Users, 8, 43),
            ]
        );
    }

    #[test]
    fn test_context_without_set_or_mapping_is_an_error() {
        let mut cx = TransformContext::new("import.posts", None, None);
        assert!(cx.map_id(1).is_err());
        assert!(cx.add_if_absent(vec![Value::Integer(1)]).is_err());
    }

    #[test]
    fn test_discard_pending() {
        let mut cx = TransformContext::new(
            "import.groups",
            None,
            Some((MappingType::Groups, IdSequence::starting_after(0))),
        );
        cx.map_id(1).unwrap();
        let before = cx.pending_len();
        cx.map_id(2).unwrap();
        cx.discard_pending_from(before);
        assert_eq!(cx.take_pending().len(), 1);
    }

    #[test]
    fn test_resume_id_reuses_mapped_ids() {
        let mut landed = SimpleSet::new();
        landed.add(11);
        let mut cx = TransformContext::new(
            "import.topics",
            None,
            Some((MappingType::Topics, IdSequence::starting_after(12))),
        )
        .with_landed_ids(landed);

        // mapped and inserted
        assert_eq!(cx.resume_id(1, Some(11)).unwrap(), None);
        // mapped, but its batch never reached the table
        assert_eq!(cx.resume_id(2, Some(12)).unwrap(), Some(12));
        assert_eq!(cx.resume_id(3, None).unwrap(), Some(13));
        // the same mapped row is only written once per run
        assert_eq!(cx.resume_id(2, Some(12)).unwrap(), None);

        assert_eq!(
            cx.take_pending(),
            vec![IdMapping::new(MappingType::Topics, 3, 13)]
        );
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("General Discussion"), "general-discussion");
        assert_eq!(slugify("  Q&A / Help!  "), "q-a-help");
        assert_eq!(slugify("Ünïcode"), "n-code");
    }

    #[test]
    fn test_mapping_params() {
        const DESCRIPTOR: StepDescriptor = StepDescriptor {
            name: "test",
            table: "posts",
            produces: Some(MappingType::Posts),
            depends_on: &[MappingType::Topics],
            ordered_after: &[MappingType::Users],
            column_names: &["id"],
            total_rows_query: "SELECT 1",
            rows_query: "SELECT 1",
            requires_set: None,
        };
        let params = DESCRIPTOR.mapping_params();
        assert_eq!(params.len(), 3);
        assert_eq!(params.get("posts_type"), Some(&Value::Integer(5)));
        assert_eq!(params.get("users_type"), Some(&Value::Integer(2)));
    }
}
