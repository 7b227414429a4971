use chrono::DateTime;
use std::sync::Arc;

use crate::core::config::PhpBbSettings;
use crate::core::error::ImportResult;
use crate::core::registry::StepRegistry;
use crate::core::sql::params;
use crate::core::step::{SetDeclaration, StepDescriptor};
use crate::core::traits::{SourceAdapterRef, SqlSource};
use crate::core::value::{Row, Value};
use crate::modules::converters::{trimmed, ConvertStep, Converter};

/// Prefix the queries below are written against.
pub const DEFAULT_TABLE_PREFIX: &str = "phpbb_";

// phpBB constants
const USER_INACTIVE: i64 = 1;
const USER_IGNORE: i64 = 2;
const USER_FOUNDER: i64 = 3;
const GROUP_HIDDEN: i64 = 2;
const GROUP_SPECIAL: i64 = 3;
const FORUM_LINK: i64 = 2;
const ITEM_APPROVED: i64 = 1;
const ITEM_LOCKED: i64 = 1;

const VISIBILITY_PUBLIC: i64 = 0;
const VISIBILITY_MEMBERS: i64 = 2;

pub static GROUPS: StepDescriptor = StepDescriptor {
    name: "phpbb.groups",
    table: "groups",
    produces: None,
    depends_on: &[],
    ordered_after: &[],
    column_names: &["original_id", "name", "full_name", "bio", "visibility_level", "created_at"],
    total_rows_query: "SELECT COUNT(*) FROM phpbb_groups WHERE group_type <> :special_group_type",
    rows_query: "SELECT group_id, group_name, group_desc, group_type
                 FROM phpbb_groups
                 WHERE group_type <> :special_group_type
                 ORDER BY group_id",
    requires_set: Some(SetDeclaration {
        name: "groups",
        query: r#"SELECT original_id FROM "groups" ORDER BY original_id"#,
        arity: 1,
    }),
};

pub static USERS: StepDescriptor = StepDescriptor {
    name: "phpbb.users",
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
    total_rows_query: "SELECT COUNT(*) FROM phpbb_users WHERE user_type <> :ignored_user_type",
    rows_query: "SELECT user_id, user_type, username, user_email, user_regdate, user_lastvisit
                 FROM phpbb_users
                 WHERE user_type <> :ignored_user_type
                 ORDER BY user_id",
    requires_set: Some(SetDeclaration {
        name: "users",
        query: "SELECT original_id FROM users ORDER BY original_id",
        arity: 1,
    }),
};

pub static GROUP_USERS: StepDescriptor = StepDescriptor {
    name: "phpbb.group_users",
    table: "group_users",
    produces: None,
    depends_on: &[],
    ordered_after: &[],
    column_names: &["group_id", "user_id", "owner", "created_at"],
    total_rows_query: "SELECT COUNT(*)
                       FROM phpbb_user_group ug
                         JOIN phpbb_groups g ON g.group_id = ug.group_id
                       WHERE g.group_type <> :special_group_type AND ug.user_pending = 0",
    rows_query: "SELECT ug.group_id, ug.user_id, ug.group_leader
                 FROM phpbb_user_group ug
                   JOIN phpbb_groups g ON g.group_id = ug.group_id
                 WHERE g.group_type <> :special_group_type AND ug.user_pending = 0
                 ORDER BY ug.group_id, ug.user_id",
    requires_set: Some(SetDeclaration {
        name: "group_users",
        query: "SELECT group_id, user_id FROM group_users ORDER BY group_id, user_id",
        arity: 2,
    }),
};

pub static CATEGORIES: StepDescriptor = StepDescriptor {
    name: "phpbb.categories",
    table: "categories",
    produces: None,
    depends_on: &[],
    ordered_after: &[],
    column_names: &["original_id", "name", "description", "parent_id", "position", "created_at"],
    total_rows_query: "SELECT COUNT(*) FROM phpbb_forums WHERE forum_type <> :link_forum_type",
    rows_query: "SELECT forum_id, parent_id, forum_name, forum_desc, left_id
                 FROM phpbb_forums
                 WHERE forum_type <> :link_forum_type
                 ORDER BY left_id",
    requires_set: Some(SetDeclaration {
        name: "categories",
        query: "SELECT original_id FROM categories ORDER BY original_id",
        arity: 1,
    }),
};

pub static TOPICS: StepDescriptor = StepDescriptor {
    name: "phpbb.topics",
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
    total_rows_query: "SELECT COUNT(*) FROM phpbb_topics
                       WHERE topic_visibility = :approved AND topic_moved_id = 0",
    rows_query: "SELECT topic_id, forum_id, topic_poster, topic_title, topic_time, topic_views, topic_status
                 FROM phpbb_topics
                 WHERE topic_visibility = :approved AND topic_moved_id = 0
                 ORDER BY topic_id",
    requires_set: Some(SetDeclaration {
        name: "topics",
        query: "SELECT original_id FROM topics ORDER BY original_id",
        arity: 1,
    }),
};

pub static POSTS: StepDescriptor = StepDescriptor {
    name: "phpbb.posts",
    table: "posts",
    produces: None,
    depends_on: &[],
    ordered_after: &[],
    column_names: &["original_id", "topic_id", "user_id", "raw", "post_type", "created_at"],
    total_rows_query: "SELECT COUNT(*) FROM phpbb_posts WHERE post_visibility = :approved",
    rows_query: "SELECT post_id, topic_id, poster_id, post_time, post_text
                 FROM phpbb_posts
                 WHERE post_visibility = :approved
                 ORDER BY post_id",
    requires_set: Some(SetDeclaration {
        name: "posts",
        query: "SELECT original_id FROM posts ORDER BY original_id",
        arity: 1,
    }),
};

pub static UPLOADS: StepDescriptor = StepDescriptor {
    name: "phpbb.uploads",
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
    total_rows_query: "SELECT COUNT(*) FROM phpbb_attachments WHERE is_orphan = 0 AND in_message = 0",
    rows_query: "SELECT attach_id, post_msg_id, poster_id, physical_filename, real_filename, filesize, filetime
                 FROM phpbb_attachments
                 WHERE is_orphan = 0 AND in_message = 0
                 ORDER BY attach_id",
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

/// Converter for phpBB 3 on MySQL or PostgreSQL.
pub struct PhpBbConverter {
    source: Arc<SqlSource>,
    attachment_path: String,
}

impl PhpBbConverter {
    pub fn new(adapter: SourceAdapterRef, settings: &PhpBbSettings) -> Self {
        let source =
            SqlSource::new(adapter).with_table_prefix(DEFAULT_TABLE_PREFIX, &settings.table_prefix);
        Self {
            source: Arc::new(source),
            attachment_path: settings.attachment_path.trim_end_matches('/').to_string(),
        }
    }

    fn step<F>(&self, descriptor: &'static StepDescriptor, convert: F) -> ConvertStep
    where
        F: Fn(Row) -> ImportResult<Row> + Send + 'static,
    {
        ConvertStep::new(descriptor, Arc::clone(&self.source), convert)
    }
}

impl Converter for PhpBbConverter {
    fn name(&self) -> &'static str {
        "phpbb"
    }

    fn register_steps(&self, registry: &mut StepRegistry) -> ImportResult<()> {
        let special = params([("special_group_type", GROUP_SPECIAL)]);
        let approved = params([("approved", ITEM_APPROVED)]);

        registry.register(Box::new(
            self.step(&GROUPS, convert_group).with_params(special.clone()),
        ))?;
        registry.register(Box::new(
            self.step(&USERS, convert_user)
                .with_params(params([("ignored_user_type", USER_IGNORE)])),
        ))?;
        registry.register(Box::new(
            self.step(&GROUP_USERS, convert_membership).with_params(special),
        ))?;
        registry.register(Box::new(
            self.step(&CATEGORIES, convert_forum)
                .with_params(params([("link_forum_type", FORUM_LINK)])),
        ))?;
        registry.register(Box::new(
            self.step(&TOPICS, convert_topic).with_params(approved.clone()),
        ))?;
        registry.register(Box::new(
            self.step(&POSTS, convert_post).with_params(approved),
        ))?;

        let attachment_path = self.attachment_path.clone();
        registry.register(Box::new(self.step(&UPLOADS, move |row| {
            convert_attachment(row, &attachment_path)
        })))?;
        Ok(())
    }
}

/// phpBB stores Unix seconds, with 0 meaning never.
fn unix_time(row: &Row, column: &str) -> ImportResult<Value> {
    Ok(row
        .opt_i64(column)?
        .filter(|&secs| secs > 0)
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .into())
}

fn convert_group(row: Row) -> ImportResult<Row> {
    let visibility = if row.i64("group_type")? == GROUP_HIDDEN {
        VISIBILITY_MEMBERS
    } else {
        VISIBILITY_PUBLIC
    };
    Ok(Row::new()
        .with("original_id", row.i64("group_id")?)
        .with("name", row.text("group_name")?)
        .with("full_name", trimmed(&row, "group_name")?)
        .with("bio", trimmed(&row, "group_desc")?)
        .with("visibility_level", visibility)
        .with("created_at", Value::Null))
}

fn convert_user(row: Row) -> ImportResult<Row> {
    let user_type = row.i64("user_type")?;
    Ok(Row::new()
        .with("original_id", row.i64("user_id")?)
        .with("username", row.text("username")?)
        .with("name", Value::Null)
        .with("email", trimmed(&row, "user_email")?)
        .with("admin", user_type == USER_FOUNDER)
        .with("moderator", false)
        .with("active", user_type != USER_INACTIVE)
        .with("trust_level", Value::Null)
        .with("created_at", unix_time(&row, "user_regdate")?)
        .with("last_seen_at", unix_time(&row, "user_lastvisit")?))
}

fn convert_membership(row: Row) -> ImportResult<Row> {
    Ok(Row::new()
        .with("group_id", row.i64("group_id")?)
        .with("user_id", row.i64("user_id")?)
        .with("owner", row.bool("group_leader")?)
        .with("created_at", Value::Null))
}

fn convert_forum(row: Row) -> ImportResult<Row> {
    let parent_id = row.opt_i64("parent_id")?.filter(|&id| id > 0);
    Ok(Row::new()
        .with("original_id", row.i64("forum_id")?)
        .with("name", row.text("forum_name")?)
        .with("description", trimmed(&row, "forum_desc")?)
        .with("parent_id", parent_id)
        .with("position", row.opt_i64("left_id")?)
        .with("created_at", Value::Null))
}

fn convert_topic(row: Row) -> ImportResult<Row> {
    Ok(Row::new()
        .with("original_id", row.i64("topic_id")?)
        .with("title", row.text("topic_title")?)
        .with("category_id", row.opt_i64("forum_id")?)
        .with("user_id", row.i64("topic_poster")?)
        .with("archetype", "regular")
        .with("views", row.opt_i64("topic_views")?.unwrap_or(0))
        .with("closed", row.i64("topic_status")? == ITEM_LOCKED)
        .with("created_at", unix_time(&row, "topic_time")?))
}

fn convert_post(row: Row) -> ImportResult<Row> {
    Ok(Row::new()
        .with("original_id", row.i64("post_id")?)
        .with("topic_id", row.i64("topic_id")?)
        .with("user_id", row.i64("poster_id")?)
        .with("raw", row.opt_text("post_text")?.unwrap_or_default())
        .with("post_type", 1)
        .with("created_at", unix_time(&row, "post_time")?))
}

fn convert_attachment(row: Row, attachment_path: &str) -> ImportResult<Row> {
    let path = format!("{}/{}", attachment_path, row.text("physical_filename")?);
    Ok(Row::new()
        .with("original_id", row.i64("attach_id")?)
        .with("user_id", row.opt_i64("poster_id")?)
        .with("post_id", row.opt_i64("post_msg_id")?)
        .with("filename", row.text("real_filename")?)
        .with("path", path)
        .with("url", Value::Null)
        .with("filesize", row.opt_i64("filesize")?)
        .with("created_at", unix_time(&row, "filetime")?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_founder_is_admin_and_inactive_is_inactive() {
        let founder = convert_user(
            Row::new()
                .with("user_id", 2)
                .with("user_type", USER_FOUNDER)
                .with("username", "admin")
                .with("user_email", " admin@example.com ")
                .with("user_regdate", 1_500_000_000)
                .with("user_lastvisit", 0),
        )
        .unwrap();
        assert_eq!(founder.get("admin"), Some(&Value::Boolean(true)));
        assert_eq!(founder.get("active"), Some(&Value::Boolean(true)));
        assert_eq!(
            founder.get("email"),
            Some(&Value::Text("admin@example.com".to_string()))
        );
        assert_eq!(founder.get("last_seen_at"), Some(&Value::Null));
        assert!(matches!(founder.get("created_at"), Some(Value::Timestamp(_))));

        let inactive = convert_user(
            Row::new()
                .with("user_id", 3)
                .with("user_type", USER_INACTIVE)
                .with("username", "lurker")
                .with("user_email", Value::Null)
                .with("user_regdate", 1_500_000_000)
                .with("user_lastvisit", 1_500_000_100),
        )
        .unwrap();
        assert_eq!(inactive.get("admin"), Some(&Value::Boolean(false)));
        assert_eq!(inactive.get("active"), Some(&Value::Boolean(false)));
    }

    #[test]
    fn test_root_forum_has_no_parent() {
        let forum = convert_forum(
            Row::new()
                .with("forum_id", 5)
                .with("parent_id", 0)
                .with("forum_name", "News")
                .with("forum_desc", "")
                .with("left_id", 3),
        )
        .unwrap();
        assert_eq!(forum.get("parent_id"), Some(&Value::Null));
        assert_eq!(forum.get("description"), Some(&Value::Null));
        assert_eq!(forum.get("position"), Some(&Value::Integer(3)));
    }

    #[test]
    fn test_attachment_path() {
        let upload = convert_attachment(
            Row::new()
                .with("attach_id", 1)
                .with("post_msg_id", 10)
                .with("poster_id", 2)
                .with("physical_filename", "2_abcdef")
                .with("real_filename", "photo.jpg")
                .with("filesize", 2048)
                .with("filetime", 1_500_000_000),
            "/var/www/phpbb/files",
        )
        .unwrap();
        assert_eq!(
            upload.get("path"),
            Some(&Value::Text("/var/www/phpbb/files/2_abcdef".to_string()))
        );
    }

    #[test]
    fn test_hidden_group_is_members_only() {
        let group = convert_group(
            Row::new()
                .with("group_id", 8)
                .with("group_name", "Secret Club")
                .with("group_desc", "")
                .with("group_type", GROUP_HIDDEN),
        )
        .unwrap();
        assert_eq!(group.get("visibility_level"), Some(&Value::Integer(2)));
    }

    #[test]
    fn test_every_step_is_described() {
        let names: Vec<_> = DESCRIPTORS.iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec![
                "phpbb.groups",
                "phpbb.users",
                "phpbb.group_users",
                "phpbb.categories",
                "phpbb.topics",
                "phpbb.posts",
                "phpbb.uploads",
            ]
        );
    }
}
