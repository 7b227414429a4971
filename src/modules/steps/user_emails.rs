use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::core::error::ImportResult;
use crate::core::mapping::MappingType;
use crate::core::step::{CopyStep, SetDeclaration, StepDescriptor, TransformContext};
use crate::core::traits::SqlSource;
use crate::core::value::{Row, Value};
use crate::modules::steps::timestamp_or;

pub static DESCRIPTOR: StepDescriptor = StepDescriptor {
    name: "import.user_emails",
    table: "user_emails",
    produces: None,
    depends_on: &[MappingType::Users],
    ordered_after: &[],
    column_names: &["user_id", "email", "primary", "created_at", "updated_at"],
    total_rows_query: "SELECT COUNT(*)
                       FROM users u
                         JOIN mapped_ids mu ON mu.type = :users_type AND mu.original_id = u.original_id
                       WHERE u.email IS NOT NULL",
    rows_query: "SELECT mu.discourse_id AS discourse_user_id, u.email, u.created_at
                 FROM users u
                   JOIN mapped_ids mu ON mu.type = :users_type AND mu.original_id = u.original_id
                 WHERE u.email IS NOT NULL
                 ORDER BY mu.discourse_id",
    requires_set: Some(SetDeclaration {
        name: "emails",
        query: "SELECT lower(email) FROM user_emails ORDER BY 1",
        arity: 1,
    }),
};

/// Primary email of every imported user.
pub struct UserEmailsStep {
    source: Arc<SqlSource>,
    imported_at: DateTime<Utc>,
}

impl UserEmailsStep {
    pub fn new(source: Arc<SqlSource>, imported_at: DateTime<Utc>) -> Self {
        Self {
            source,
            imported_at,
        }
    }
}

impl CopyStep for UserEmailsStep {
    fn descriptor(&self) -> &'static StepDescriptor {
        &DESCRIPTOR
    }

    fn source(&self) -> &Arc<SqlSource> {
        &self.source
    }

    fn transform_row(&mut self, row: Row, cx: &mut TransformContext) -> ImportResult<Option<Row>> {
        let user_id = row.i64("discourse_user_id")?;
        let email = row.text("email")?.trim().to_lowercase();
        if email.is_empty() || !cx.add_if_absent(vec![Value::Text(email.clone())])? {
            return Ok(None);
        }

        let created_at = timestamp_or(&row, "created_at", self.imported_at)?;
        Ok(Some(
            Row::new()
                .with("user_id", user_id)
                .with("email", email)
                .with("primary", true)
                .with("created_at", created_at)
                .with("updated_at", created_at),
        ))
    }
}
