use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::core::error::ImportResult;
use crate::core::mapping::MappingType;
use crate::core::step::{ensure_valid_value, CopyStep, StepDescriptor, TransformContext};
use crate::core::traits::SqlSource;
use crate::core::value::Row;
use crate::modules::steps::timestamp_or;

const ARCHETYPES: [&str; 2] = ["regular", "private_message"];
const DEFAULT_ARCHETYPE: &str = "regular";

// Topics without an author mapping are dropped by the join; topics without a
// category mapping stay uncategorised.
pub static DESCRIPTOR: StepDescriptor = StepDescriptor {
    name: "import.topics",
    table: "topics",
    produces: Some(MappingType::Topics),
    depends_on: &[MappingType::Users],
    ordered_after: &[MappingType::Categories],
    column_names: &[
        "id",
        "title",
        "category_id",
        "user_id",
        "archetype",
        "views",
        "closed",
        "visible",
        "created_at",
        "updated_at",
        "bumped_at",
    ],
    total_rows_query: "SELECT COUNT(*) FROM topics",
    rows_query: "SELECT t.original_id, t.title, t.archetype, t.views, t.closed, t.created_at,
                        mc.discourse_id AS discourse_category_id,
                        mu.discourse_id AS discourse_user_id,
                        m.discourse_id AS mapped_id
                 FROM topics t
                   JOIN mapped_ids mu ON mu.type = :users_type AND mu.original_id = t.user_id
                   LEFT JOIN mapped_ids mc ON mc.type = :categories_type AND mc.original_id = t.category_id
                   LEFT JOIN mapped_ids m ON m.type = :topics_type AND m.original_id = t.original_id
                 ORDER BY t.original_id",
    requires_set: None,
};

pub struct TopicsStep {
    source: Arc<SqlSource>,
    imported_at: DateTime<Utc>,
}

impl TopicsStep {
    pub fn new(source: Arc<SqlSource>, imported_at: DateTime<Utc>) -> Self {
        Self {
            source,
            imported_at,
        }
    }
}

impl CopyStep for TopicsStep {
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
        let created_at = timestamp_or(&row, "created_at", self.imported_at)?;
        let archetype = row.opt_text("archetype")?;
        let archetype = ensure_valid_value(archetype.as_deref(), &ARCHETYPES, DEFAULT_ARCHETYPE);

        Ok(Some(
            Row::new()
                .with("id", id)
                .with("title", row.text("title")?)
                .with("category_id", row.opt_i64("discourse_category_id")?)
                .with("user_id", row.i64("discourse_user_id")?)
                .with("archetype", archetype)
                .with("views", row.opt_i64("views")?.unwrap_or(0))
                .with("closed", row.bool("closed")?)
                .with("visible", true)
                .with("created_at", created_at)
                .with("updated_at", created_at)
                .with("bumped_at", created_at),
        ))
    }
}
