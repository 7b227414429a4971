use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::core::error::ImportResult;
use crate::core::mapping::MappingType;
use crate::core::step::{CopyStep, SetDeclaration, StepDescriptor, TransformContext};
use crate::core::traits::SqlSource;
use crate::core::value::{Row, Value};
use crate::modules::steps::timestamp_or;

pub static DESCRIPTOR: StepDescriptor = StepDescriptor {
    name: "import.group_users",
    table: "group_users",
    produces: None,
    depends_on: &[MappingType::Groups, MappingType::Users],
    ordered_after: &[],
    column_names: &["group_id", "user_id", "owner", "created_at", "updated_at"],
    total_rows_query: "SELECT COUNT(*) FROM group_users",
    rows_query: "SELECT mg.discourse_id AS discourse_group_id, mu.discourse_id AS discourse_user_id,
                        gu.owner, gu.created_at
                 FROM group_users gu
                   JOIN mapped_ids mg ON mg.type = :groups_type AND mg.original_id = gu.group_id
                   JOIN mapped_ids mu ON mu.type = :users_type AND mu.original_id = gu.user_id
                 ORDER BY mg.discourse_id, mu.discourse_id",
    requires_set: Some(SetDeclaration {
        name: "group_users",
        query: "SELECT group_id, user_id FROM group_users ORDER BY group_id, user_id",
        arity: 2,
    }),
};

/// Group memberships between imported groups and users.
pub struct GroupUsersStep {
    source: Arc<SqlSource>,
    imported_at: DateTime<Utc>,
}

impl GroupUsersStep {
    pub fn new(source: Arc<SqlSource>, imported_at: DateTime<Utc>) -> Self {
        Self {
            source,
            imported_at,
        }
    }
}

impl CopyStep for GroupUsersStep {
    fn descriptor(&self) -> &'static StepDescriptor {
        &DESCRIPTOR
    }

    fn source(&self) -> &Arc<SqlSource> {
        &self.source
    }

    fn transform_row(&mut self, row: Row, cx: &mut TransformContext) -> ImportResult<Option<Row>> {
        let group_id = row.i64("discourse_group_id")?;
        let user_id = row.i64("discourse_user_id")?;
        if !cx.add_if_absent(vec![Value::Integer(group_id), Value::Integer(user_id)])? {
            return Ok(None);
        }

        let created_at = timestamp_or(&row, "created_at", self.imported_at)?;
        Ok(Some(
            Row::new()
                .with("group_id", group_id)
                .with("user_id", user_id)
                .with("owner", row.bool("owner")?)
                .with("created_at", created_at)
                .with("updated_at", created_at),
        ))
    }
}
