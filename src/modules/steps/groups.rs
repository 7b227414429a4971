use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::core::error::ImportResult;
use crate::core::mapping::MappingType;
use crate::core::step::{ensure_valid_value, CopyStep, SetDeclaration, StepDescriptor, TransformContext};
use crate::core::traits::SqlSource;
use crate::core::value::Row;
use crate::modules::steps::{timestamp_or, unique_name};

const VISIBILITY_LEVELS: [i64; 5] = [0, 1, 2, 3, 4];
const DEFAULT_VISIBILITY: i64 = 0;

pub static DESCRIPTOR: StepDescriptor = StepDescriptor {
    name: "import.groups",
    table: "groups",
    produces: Some(MappingType::Groups),
    depends_on: &[],
    ordered_after: &[],
    column_names: &[
        "id",
        "name",
        "full_name",
        "bio_raw",
        "visibility_level",
        "created_at",
        "updated_at",
    ],
    total_rows_query: r#"SELECT COUNT(*) FROM "groups""#,
    rows_query: r#"SELECT g.original_id, g.name, g.full_name, g.bio, g.visibility_level, g.created_at,
                          m.discourse_id AS mapped_id
                   FROM "groups" g
                     LEFT JOIN mapped_ids m ON m.type = :groups_type AND m.original_id = g.original_id
                   ORDER BY g.original_id"#,
    requires_set: Some(SetDeclaration {
        name: "group_names",
        query: r#"SELECT lower(name) FROM "groups" ORDER BY 1"#,
        arity: 1,
    }),
};

pub struct GroupsStep {
    source: Arc<SqlSource>,
    imported_at: DateTime<Utc>,
}

impl GroupsStep {
    pub fn new(source: Arc<SqlSource>, imported_at: DateTime<Utc>) -> Self {
        Self {
            source,
            imported_at,
        }
    }
}

impl CopyStep for GroupsStep {
    fn descriptor(&self) -> &'static StepDescriptor {
        &DESCRIPTOR
    }

    fn source(&self) -> &Arc<SqlSource> {
        &self.source
    }

    fn transform_row(&mut self, row: Row, cx: &mut TransformContext) -> ImportResult<Option<Row>> {
        let Some(id) = cx.resume_id(row.i64("original_id")?, row.opt_i64("mapped_id")?)? else {
            return Ok(None);
        };
        let name = unique_name(cx, &row.text("name")?)?;
        let created_at = timestamp_or(&row, "created_at", self.imported_at)?;
        let visibility = ensure_valid_value(
            row.opt_i64("visibility_level")?,
            &VISIBILITY_LEVELS,
            DEFAULT_VISIBILITY,
        );

        Ok(Some(
            Row::new()
                .with("id", id)
                .with("name", name)
                .with("full_name", row.opt_text("full_name")?)
                .with("bio_raw", row.opt_text("bio")?)
                .with("visibility_level", visibility)
                .with("created_at", created_at)
                .with("updated_at", created_at),
        ))
    }
}
