use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::core::error::ImportResult;
use crate::core::mapping::MappingType;
use crate::core::step::{ensure_valid_value, CopyStep, StepDescriptor, TransformContext};
use crate::core::traits::SqlSource;
use crate::core::value::Row;
use crate::modules::steps::timestamp_or;

// regular, moderator_action, small_action, whisper
const POST_TYPES: [i64; 4] = [1, 2, 3, 4];
const DEFAULT_POST_TYPE: i64 = 1;

// Post numbers are computed over every intermediate post of a topic, so a
// rerun assigns the same number to the same post.
pub static DESCRIPTOR: StepDescriptor = StepDescriptor {
    name: "import.posts",
    table: "posts",
    produces: Some(MappingType::Posts),
    depends_on: &[MappingType::Topics, MappingType::Users],
    ordered_after: &[],
    column_names: &[
        "id",
        "topic_id",
        "user_id",
        "post_number",
        "sort_order",
        "post_type",
        "raw",
        "cooked",
        "created_at",
        "updated_at",
    ],
    total_rows_query: "SELECT COUNT(*) FROM posts",
    rows_query: "SELECT p.original_id, p.raw, p.post_type, p.created_at, p.post_number,
                        mt.discourse_id AS discourse_topic_id,
                        mu.discourse_id AS discourse_user_id,
                        m.discourse_id AS mapped_id
                 FROM (
                     SELECT original_id, topic_id, user_id, raw, post_type, created_at,
                            ROW_NUMBER() OVER (PARTITION BY topic_id ORDER BY created_at, original_id) AS post_number
                     FROM posts
                 ) p
                   JOIN mapped_ids mt ON mt.type = :topics_type AND mt.original_id = p.topic_id
                   JOIN mapped_ids mu ON mu.type = :users_type AND mu.original_id = p.user_id
                   LEFT JOIN mapped_ids m ON m.type = :posts_type AND m.original_id = p.original_id
                 ORDER BY p.original_id",
    requires_set: None,
};

pub struct PostsStep {
    source: Arc<SqlSource>,
    imported_at: DateTime<Utc>,
}

impl PostsStep {
    pub fn new(source: Arc<SqlSource>, imported_at: DateTime<Utc>) -> Self {
        Self {
            source,
            imported_at,
        }
    }
}

impl CopyStep for PostsStep {
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
        let post_number = row.i64("post_number")?;
        let post_type = ensure_valid_value(row.opt_i64("post_type")?, &POST_TYPES, DEFAULT_POST_TYPE);
        let raw = row.opt_text("raw")?.unwrap_or_default();
        let created_at = timestamp_or(&row, "created_at", self.imported_at)?;

        // cooked is regenerated from raw once the import is done
        Ok(Some(
            Row::new()
                .with("id", id)
                .with("topic_id", row.i64("discourse_topic_id")?)
                .with("user_id", row.i64("discourse_user_id")?)
                .with("post_number", post_number)
                .with("sort_order", post_number)
                .with("post_type", post_type)
                .with("cooked", raw.clone())
                .with("raw", raw)
                .with("created_at", created_at)
                .with("updated_at", created_at),
        ))
    }
}
