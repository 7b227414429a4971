use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::core::error::ImportResult;
use crate::core::mapping::MappingType;
use crate::core::step::{ensure_valid_value, CopyStep, SetDeclaration, StepDescriptor, TransformContext};
use crate::core::traits::SqlSource;
use crate::core::value::Row;
use crate::modules::steps::{timestamp_or, unique_name};

const TRUST_LEVELS: [i64; 5] = [0, 1, 2, 3, 4];
const DEFAULT_TRUST_LEVEL: i64 = 0;

pub static DESCRIPTOR: StepDescriptor = StepDescriptor {
    name: "import.users",
    table: "users",
    produces: Some(MappingType::Users),
    depends_on: &[],
    ordered_after: &[],
    column_names: &[
        "id",
        "username",
        "username_lower",
        "name",
        "active",
        "admin",
        "moderator",
        "trust_level",
        "created_at",
        "updated_at",
        "last_seen_at",
    ],
    total_rows_query: "SELECT COUNT(*) FROM users",
    rows_query: "SELECT u.original_id, u.username, u.name, u.admin, u.moderator, u.active,
                        u.trust_level, u.created_at, u.last_seen_at,
                        m.discourse_id AS mapped_id
                 FROM users u
                   LEFT JOIN mapped_ids m ON m.type = :users_type AND m.original_id = u.original_id
                 ORDER BY u.original_id",
    requires_set: Some(SetDeclaration {
        name: "usernames",
        query: "SELECT username_lower FROM users ORDER BY username_lower",
        arity: 1,
    }),
};

pub struct UsersStep {
    source: Arc<SqlSource>,
    imported_at: DateTime<Utc>,
}

impl UsersStep {
    pub fn new(source: Arc<SqlSource>, imported_at: DateTime<Utc>) -> Self {
        Self {
            source,
            imported_at,
        }
    }
}

impl CopyStep for UsersStep {
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
        let username = unique_name(cx, &row.text("username")?)?;
        let username_lower = username.to_lowercase();
        let created_at = timestamp_or(&row, "created_at", self.imported_at)?;
        let trust_level = ensure_valid_value(
            row.opt_i64("trust_level")?,
            &TRUST_LEVELS,
            DEFAULT_TRUST_LEVEL,
        );

        Ok(Some(
            Row::new()
                .with("id", id)
                .with("username", username)
                .with("username_lower", username_lower)
                .with("name", row.opt_text("name")?)
                .with("active", row.bool("active")?)
                .with("admin", row.bool("admin")?)
                .with("moderator", row.bool("moderator")?)
                .with("trust_level", trust_level)
                .with("created_at", created_at)
                .with("updated_at", created_at)
                .with("last_seen_at", row.opt_timestamp("last_seen_at")?),
        ))
    }
}
