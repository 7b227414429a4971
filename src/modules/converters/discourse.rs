use std::sync::Arc;

use crate::core::error::ImportResult;
use crate::core::registry::StepRegistry;
use crate::core::sql::params;
use crate::core::step::{SetDeclaration, StepDescriptor};
use crate::core::traits::{SourceAdapterRef, SqlSource};
use crate::core::value::{Row, Value};
use crate::modules::converters::{trimmed, ConvertStep, Converter};

pub static GROUPS: StepDescriptor = StepDescriptor {
    name: "discourse.groups",
    table: "groups",
    produces: None,
    depends_on: &[],
    ordered_after: &[],
    column_names: &["original_id", "name", "full_name", "bio", "visibility_level", "created_at"],
    total_rows_query: "SELECT COUNT(*) FROM groups WHERE NOT automatic",
    rows_query: "SELECT id, name, full_name, bio_raw, visibility_level, created_at
                 FROM groups
                 WHERE NOT automatic
                 ORDER BY id",
    requires_set: Some(SetDeclaration {
        name: "groups",
        query: r#"SELECT original_id FROM "groups" ORDER BY original_id"#,
        arity: 1,
    }),
};

pub static USERS: StepDescriptor = StepDescriptor {
    name: "discourse.users",
    table: "users",
    produces: None,
    depends_on: &[],
    ordered_after: &[],
    column_names: &[
        "original_id",
        "username",
        "name",
        "email",
        "admin",
        "moderator",
        "active",
        "trust_level",
        "created_at",
        "last_seen_at",
    ],
    total_rows_query: "SELECT COUNT(*) FROM users WHERE id > 0 AND NOT staged",
    rows_query: "SELECT u.id, u.username, u.name, e.email, u.admin, u.moderator, u.active,
                        u.trust_level, u.created_at, u.last_seen_at
                 FROM users u
                   LEFT JOIN user_emails e ON e.user_id = u.id AND e.primary
                 WHERE u.id > 0 AND NOT u.staged
                 ORDER BY u.id",
    requires_set: Some(SetDeclaration {
        name: "users",
        query: "SELECT original_id FROM users ORDER BY original_id",
        arity: 1,
    }),
};

pub static GROUP_USERS: StepDescriptor = StepDescriptor {
    name: "discourse.group_users",
    table: "group_users",
    produces: None,
    depends_on: &[],
    ordered_after: &[],
    column_names: &["group_id", "user_id", "owner", "created_at"],
    total_rows_query: "SELECT COUNT(*)
                       FROM group_users gu
                         JOIN groups g ON g.id = gu.group_id
                       WHERE NOT g.automatic AND gu.user_id > 0",
    rows_query: "SELECT gu.group_id, gu.user_id, gu.owner, gu.created_at
                 FROM group_users gu
                   JOIN groups g ON g.id = gu.group_id
                 WHERE NOT g.automatic AND gu.user_id > 0
                 ORDER BY gu.group_id, gu.user_id",
    requires_set: Some(SetDeclaration {
        name: "group_users",
        query: "SELECT group_id, user_id FROM group_users ORDER BY group_id, user_id",
        arity: 2,
    }),
};

pub static CATEGORIES: StepDescriptor = StepDescriptor {
    name: "discourse.categories",
    table: "categories",
    produces: None,
    depends_on: &[],
    ordered_after: &[],
    column_names: &["original_id", "name", "description", "parent_id", "position", "created_at"],
    total_rows_query: "SELECT COUNT(*) FROM categories WHERE slug <> :uncategorized_slug",
    rows_query: "SELECT id, name, description, parent_category_id, position, created_at
                 FROM categories
                 WHERE slug <> :uncategorized_slug
                 ORDER BY id",
    requires_set: Some(SetDeclaration {
        name: "categories",
        query: "SELECT original_id FROM categories ORDER BY original_id",
        arity: 1,
    }),
};

pub static TOPICS: StepDescriptor = StepDescriptor {
    name: "discourse.topics",
    table: "topics",
    produces: None,
    depends_on: &[],
    ordered_after: &[],
    column_names: &[
        "original_id",
        "title",
        "category_id",
        "user_id",
        "archetype",
        "views",
        "closed",
        "created_at",
    ],
    total_rows_query: "SELECT COUNT(*) FROM topics
                       WHERE deleted_at IS NULL AND archetype = :regular AND user_id > 0",
    rows_query: "SELECT id, title, category_id, user_id, archetype, views, closed, created_at
                 FROM topics
                 WHERE deleted_at IS NULL AND archetype = :regular AND user_id > 0
                 ORDER BY id",
    requires_set: Some(SetDeclaration {
        name: "topics",
        query: "SELECT original_id FROM topics ORDER BY original_id",
        arity: 1,
    }),
};

pub static POSTS: StepDescriptor = StepDescriptor {
    name: "discourse.posts",
    table: "posts",
    produces: None,
    depends_on: &[],
    ordered_after: &[],
    column_names: &["original_id", "topic_id", "user_id", "raw", "post_type", "created_at"],
    total_rows_query: "SELECT COUNT(*)
                       FROM posts p
                         JOIN topics t ON t.id = p.topic_id
                       WHERE p.deleted_at IS NULL AND t.deleted_at IS NULL
                         AND t.archetype = :regular AND p.user_id > 0",
    rows_query: "SELECT p.id, p.topic_id, p.user_id, p.raw, p.post_type, p.created_at
                 FROM posts p
                   JOIN topics t ON t.id = p.topic_id
                 WHERE p.deleted_at IS NULL AND t.deleted_at IS NULL
                   AND t.archetype = :regular AND p.user_id > 0
                 ORDER BY p.id",
    requires_set: Some(SetDeclaration {
        name: "posts",
        query: "SELECT original_id FROM posts ORDER BY original_id",
        arity: 1,
    }),
};

pub static UPLOADS: StepDescriptor = StepDescriptor {
    name: "discourse.uploads",
    table: "uploads",
    produces: None,
    depends_on: &[],
    ordered_after: &[],
    column_names: &[
        "original_id",
        "user_id",
        "post_id",
        "filename",
        "path",
        "url",
        "filesize",
        "created_at",
    ],
    total_rows_query: "SELECT COUNT(*) FROM uploads WHERE id > 0",
    rows_query: "SELECT id, user_id, original_filename, url, filesize, created_at
                 FROM uploads
                 WHERE id > 0
                 ORDER BY id",
    requires_set: Some(SetDeclaration {
        name: "uploads",
        query: "SELECT original_id FROM uploads ORDER BY original_id",
        arity: 1,
    }),
};

pub static DESCRIPTORS: &[&StepDescriptor] = &[
    &GROUPS,
    &USERS,
    &GROUP_USERS,
    &CATEGORIES,
    &TOPICS,
    &POSTS,
    &UPLOADS,
];

/// Converter for another installation of the platform, on PostgreSQL.
pub struct DiscourseConverter {
    source: Arc<SqlSource>,
}

impl DiscourseConverter {
    pub fn new(adapter: SourceAdapterRef) -> Self {
        Self {
            source: Arc::new(SqlSource::new(adapter)),
        }
    }

    fn step<F>(&self, descriptor: &'static StepDescriptor, convert: F) -> ConvertStep
    where
        F: Fn(Row) -> ImportResult<Row> + Send + 'static,
    {
        ConvertStep::new(descriptor, Arc::clone(&self.source), convert)
    }
}

impl Converter for DiscourseConverter {
    fn name(&self) -> &'static str {
        "discourse"
    }

    fn register_steps(&self, registry: &mut StepRegistry) -> ImportResult<()> {
        let regular = params([("regular", "regular")]);

        registry.register(Box::new(self.step(&GROUPS, convert_group)))?;
        registry.register(Box::new(self.step(&USERS, convert_user)))?;
        registry.register(Box::new(self.step(&GROUP_USERS, convert_membership)))?;
        registry.register(Box::new(
            self.step(&CATEGORIES, convert_category)
                .with_params(params([("uncategorized_slug", "uncategorized")])),
        ))?;
        registry.register(Box::new(
            self.step(&TOPICS, convert_topic).with_params(regular.clone()),
        ))?;
        registry.register(Box::new(
            self.step(&POSTS, convert_post).with_params(regular),
        ))?;
        registry.register(Box::new(self.step(&UPLOADS, convert_upload)))?;
        Ok(())
    }
}

fn convert_group(row: Row) -> ImportResult<Row> {
    Ok(Row::new()
        .with("original_id", row.i64("id")?)
        .with("name", row.text("name")?)
        .with("full_name", trimmed(&row, "full_name")?)
        .with("bio", trimmed(&row, "bio_raw")?)
        .with("visibility_level", row.opt_i64("visibility_level")?)
        .with("created_at", row.opt_timestamp("created_at")?))
}

fn convert_user(row: Row) -> ImportResult<Row> {
    Ok(Row::new()
        .with("original_id", row.i64("id")?)
        .with("username", row.text("username")?)
        .with("name", trimmed(&row, "name")?)
        .with("email", trimmed(&row, "email")?)
        .with("admin", row.bool("admin")?)
        .with("moderator", row.bool("moderator")?)
        .with("active", row.bool("active")?)
        .with("trust_level", row.opt_i64("trust_level")?)
        .with("created_at", row.opt_timestamp("created_at")?)
        .with("last_seen_at", row.opt_timestamp("last_seen_at")?))
}

fn convert_membership(row: Row) -> ImportResult<Row> {
    Ok(Row::new()
        .with("group_id", row.i64("group_id")?)
        .with("user_id", row.i64("user_id")?)
        .with("owner", row.bool("owner")?)
        .with("created_at", row.opt_timestamp("created_at")?))
}

fn convert_category(row: Row) -> ImportResult<Row> {
    Ok(Row::new()
        .with("original_id", row.i64("id")?)
        .with("name", row.text("name")?)
        .with("description", trimmed(&row, "description")?)
        .with("parent_id", row.opt_i64("parent_category_id")?)
        .with("position", row.opt_i64("position")?)
        .with("created_at", row.opt_timestamp("created_at")?))
}

fn convert_topic(row: Row) -> ImportResult<Row> {
    Ok(Row::new()
        .with("original_id", row.i64("id")?)
        .with("title", row.text("title")?)
        .with("category_id", row.opt_i64("category_id")?)
        .with("user_id", row.i64("user_id")?)
        .with("archetype", row.opt_text("archetype")?)
        .with("views", row.opt_i64("views")?.unwrap_or(0))
        .with("closed", row.bool("closed")?)
        .with("created_at", row.opt_timestamp("created_at")?))
}

fn convert_post(row: Row) -> ImportResult<Row> {
    Ok(Row::new()
        .with("original_id", row.i64("id")?)
        .with("topic_id", row.i64("topic_id")?)
        .with("user_id", row.i64("user_id")?)
        .with("raw", row.opt_text("raw")?.unwrap_or_default())
        .with("post_type", row.opt_i64("post_type")?)
        .with("created_at", row.opt_timestamp("created_at")?))
}

fn convert_upload(row: Row) -> ImportResult<Row> {
    Ok(Row::new()
        .with("original_id", row.i64("id")?)
        .with("user_id", row.opt_i64("user_id")?)
        .with("post_id", Value::Null)
        .with("filename", row.text("original_filename")?)
        .with("path", Value::Null)
        .with("url", row.text("url")?)
        .with("filesize", row.opt_i64("filesize")?)
        .with("created_at", row.opt_timestamp("created_at")?))
}
