//! Importer steps: copy the intermediate database into the platform's tables,
//! allocating new IDs and translating references through `mapped_ids`.

pub mod categories;
pub mod group_users;
pub mod groups;
pub mod posts;
pub mod topics;
pub mod user_emails;
pub mod users;

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::core::error::ImportResult;
use crate::core::registry::StepRegistry;
use crate::core::step::{StepDescriptor, TransformContext};
use crate::core::traits::SqlSource;
use crate::core::value::{Row, Value};

pub use categories::CategoriesStep;
pub use group_users::GroupUsersStep;
pub use groups::GroupsStep;
pub use posts::PostsStep;
pub use topics::TopicsStep;
pub use user_emails::UserEmailsStep;
pub use users::UsersStep;

/// Owner of rows that have no importable author.
pub const SYSTEM_USER_ID: i64 = -1;

// Usernames and group names share the platform's length limit.
const MAX_NAME_LENGTH: usize = 60;

pub static DESCRIPTORS: &[&StepDescriptor] = &[
    &groups::DESCRIPTOR,
    &users::DESCRIPTOR,
    &user_emails::DESCRIPTOR,
    &group_users::DESCRIPTOR,
    &categories::DESCRIPTOR,
    &topics::DESCRIPTOR,
    &posts::DESCRIPTOR,
];

/// Register every importer step, reading from `source`.
pub fn register_import_steps(registry: &mut StepRegistry, source: Arc<SqlSource>) -> ImportResult<()> {
    let imported_at = Utc::now();
    registry.register(Box::new(GroupsStep::new(Arc::clone(&source), imported_at)))?;
    registry.register(Box::new(UsersStep::new(Arc::clone(&source), imported_at)))?;
    registry.register(Box::new(UserEmailsStep::new(Arc::clone(&source), imported_at)))?;
    registry.register(Box::new(GroupUsersStep::new(Arc::clone(&source), imported_at)))?;
    registry.register(Box::new(CategoriesStep::new(Arc::clone(&source), imported_at)))?;
    registry.register(Box::new(TopicsStep::new(Arc::clone(&source), imported_at)))?;
    registry.register(Box::new(PostsStep::new(source, imported_at)))?;
    Ok(())
}

/// Timestamp of `column`, or `fallback` when it is NULL.
pub(crate) fn timestamp_or(
    row: &Row,
    column: &str,
    fallback: DateTime<Utc>,
) -> ImportResult<DateTime<Utc>> {
    Ok(row.opt_timestamp(column)?.unwrap_or(fallback))
}

/// Name restricted to the characters the platform accepts for usernames and
/// group names.
pub(crate) fn sanitize_name(name: &str) -> String {
    let mut sanitized: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_LENGTH)
        .collect();
    if sanitized.is_empty() {
        sanitized.push('_');
    }
    sanitized
}

/// Sanitised `name`, claimed in the step's existing-key set. A name already
/// taken, case-insensitively, gets the lowest free numeric suffix.
pub(crate) fn unique_name(cx: &mut TransformContext, name: &str) -> ImportResult<String> {
    let base = sanitize_name(name);
    if cx.add_if_absent(vec![Value::Text(base.to_lowercase())])? {
        return Ok(base);
    }

    let mut suffix: u64 = 1;
    loop {
        let suffix_text = suffix.to_string();
        // sanitised names are ASCII
        let keep = MAX_NAME_LENGTH.saturating_sub(suffix_text.len()).min(base.len());
        let candidate = format!("{}{}", &base[..keep], suffix_text);
        if cx.add_if_absent(vec![Value::Text(candidate.to_lowercase())])? {
            return Ok(candidate);
        }
        suffix += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::plan;
    use crate::core::set_store::ExistingKeySet;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("  Jane Doe "), "Jane_Doe");
        assert_eq!(sanitize_name("björn.k"), "bj_rn.k");
        assert_eq!(sanitize_name(""), "_");
        assert_eq!(sanitize_name(&"x".repeat(80)).len(), 60);
    }

    #[test]
    fn test_unique_name_appends_lowest_free_suffix() {
        let mut taken = ExistingKeySet::with_arity("usernames", 1).unwrap();
        taken
            .bulk_add(vec![
                vec![Value::from("jane_doe")],
                vec![Value::from("jane_doe1")],
            ])
            .unwrap();
        let mut cx = TransformContext::new("import.users", Some(taken), None);

        assert_eq!(unique_name(&mut cx, "Jane Doe").unwrap(), "Jane_Doe2");
        assert_eq!(unique_name(&mut cx, "jane_doe").unwrap(), "jane_doe3");
        assert_eq!(unique_name(&mut cx, "bob").unwrap(), "bob");

        let long = "x".repeat(70);
        assert_eq!(unique_name(&mut cx, &long).unwrap(), "x".repeat(60));
        assert_eq!(
            unique_name(&mut cx, &long).unwrap(),
            format!("{}1", "x".repeat(59))
        );
    }

    #[test]
    fn test_import_plan_orders_parents_first() {
        let plan = plan(DESCRIPTORS).unwrap();
        let position = |name: &str| plan.order.iter().position(|d| d.name == name).unwrap();

        assert!(plan.external.is_empty());
        assert!(position("import.users") < position("import.user_emails"));
        assert!(position("import.groups") < position("import.group_users"));
        assert!(position("import.users") < position("import.group_users"));
        assert!(position("import.categories") < position("import.topics"));
        assert!(position("import.topics") < position("import.posts"));
    }
}
