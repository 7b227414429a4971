use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::error::ImportResult;
use crate::core::mapping::MappingType;
use crate::core::sql::{params, Params};
use crate::core::step::{slugify, CopyStep, StepDescriptor, TransformContext};
use crate::core::traits::SqlSource;
use crate::core::value::Row;
use crate::modules::steps::{timestamp_or, SYSTEM_USER_ID};

/// Category levels the platform displays.
pub const MAX_NESTING: i64 = 3;

// Categories are read parents first. Rows whose parent does not exist are
// treated as top level. Below the nesting limit a category is attached to its
// deepest allowed ancestor. Rows on a parent cycle are never reached.
pub static DESCRIPTOR: StepDescriptor = StepDescriptor {
    name: "import.categories",
    table: "categories",
    produces: Some(MappingType::Categories),
    depends_on: &[],
    ordered_after: &[],
    column_names: &[
        "id",
        "name",
        "slug",
        "description",
        "parent_category_id",
        "position",
        "user_id",
        "created_at",
        "updated_at",
    ],
    total_rows_query: "SELECT COUNT(*) FROM categories",
    rows_query: "WITH RECURSIVE tree (original_id, depth, level, parent_id) AS (
                     SELECT original_id, 0, 0, NULL
                     FROM categories
                     WHERE parent_id IS NULL
                        OR parent_id NOT IN (SELECT original_id FROM categories)
                     UNION ALL
                     SELECT c.original_id, tree.depth + 1,
                            CASE WHEN tree.level + 1 < :max_nesting THEN tree.level + 1 ELSE tree.level END,
                            CASE WHEN tree.level + 1 < :max_nesting THEN tree.original_id ELSE tree.parent_id END
                     FROM categories c
                       JOIN tree ON c.parent_id = tree.original_id
                 )
                 SELECT c.original_id, c.name, c.description, tree.parent_id, c.position, c.created_at,
                        mp.discourse_id AS discourse_parent_id,
                        m.discourse_id AS mapped_id
                 FROM categories c
                   JOIN tree ON tree.original_id = c.original_id
                   LEFT JOIN mapped_ids m ON m.type = :categories_type AND m.original_id = c.original_id
                   LEFT JOIN mapped_ids mp ON mp.type = :categories_type AND mp.original_id = tree.parent_id
                 ORDER BY tree.depth, c.position, c.original_id",
    requires_set: None,
};

/// Categories, with parents resolved to categories created earlier.
pub struct CategoriesStep {
    source: Arc<SqlSource>,
    imported_at: DateTime<Utc>,
    // original id to new id, for parents created during this run
    created: HashMap<i64, i64>,
}

impl CategoriesStep {
    pub fn new(source: Arc<SqlSource>, imported_at: DateTime<Utc>) -> Self {
        Self {
            source,
            imported_at,
            created: HashMap::new(),
        }
    }
}

impl CopyStep for CategoriesStep {
    fn descriptor(&self) -> &'static StepDescriptor {
        &DESCRIPTOR
    }

    fn source(&self) -> &Arc<SqlSource> {
        &self.source
    }

    fn params(&self) -> Params {
        params([("max_nesting", MAX_NESTING)])
    }

    fn transform_row(&mut self, row: Row, cx: &mut TransformContext) -> ImportResult<Option<Row>> {
        let original_id = row.i64("original_id")?;
        let parent_id = match row.opt_i64("discourse_parent_id")? {
            Some(id) => Some(id),
            None => row
                .opt_i64("parent_id")?
                .and_then(|parent| self.created.get(&parent).copied()),
        };

        let Some(id) = cx.resume_id(original_id, row.opt_i64("mapped_id")?)? else {
            return Ok(None);
        };
        self.created.insert(original_id, id);

        let name = row.text("name")?;
        let created_at = timestamp_or(&row, "created_at", self.imported_at)?;
        Ok(Some(
            Row::new()
                .with("id", id)
                .with("slug", slugify(&name))
                .with("name", name)
                .with("description", row.opt_text("description")?)
                .with("parent_category_id", parent_id)
                .with("position", row.opt_i64("position")?)
                .with("user_id", SYSTEM_USER_ID)
                .with("created_at", created_at)
                .with("updated_at", created_at),
        ))
    }
}
