mod common;

use anyhow::Result;
use pretty_assertions::assert_eq;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::sync::Arc;

use forum_import::core::config::PhpBbSettings;
use forum_import::core::sql::params;
use forum_import::modules::adapters::SqliteAdapter;
use forum_import::modules::converters::{Converter, PhpBbConverter};
use forum_import::{CopyEngine, PipelineRunner, StepRegistry, Value};

use common::{count, execute_all, open_intermediate};

// A phpBB board installed with the "forum_" table prefix.
const PHPBB_BOARD: &[&str] = &[
    "CREATE TABLE forum_groups (
        group_id INTEGER PRIMARY KEY,
        group_type INTEGER NOT NULL,
        group_name TEXT NOT NULL,
        group_desc TEXT NOT NULL
    )",
    "CREATE TABLE forum_users (
        user_id INTEGER PRIMARY KEY,
        user_type INTEGER NOT NULL,
        username TEXT NOT NULL,
        user_email TEXT,
        user_regdate INTEGER NOT NULL,
        user_lastvisit INTEGER NOT NULL
    )",
    "CREATE TABLE forum_user_group (
        group_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        group_leader INTEGER NOT NULL,
        user_pending INTEGER NOT NULL
    )",
    "CREATE TABLE forum_forums (
        forum_id INTEGER PRIMARY KEY,
        parent_id INTEGER NOT NULL,
        left_id INTEGER NOT NULL,
        forum_name TEXT NOT NULL,
        forum_desc TEXT NOT NULL,
        forum_type INTEGER NOT NULL
    )",
    "CREATE TABLE forum_topics (
        topic_id INTEGER PRIMARY KEY,
        forum_id INTEGER NOT NULL,
        topic_poster INTEGER NOT NULL,
        topic_title TEXT NOT NULL,
        topic_time INTEGER NOT NULL,
        topic_views INTEGER NOT NULL,
        topic_status INTEGER NOT NULL,
        topic_visibility INTEGER NOT NULL,
        topic_moved_id INTEGER NOT NULL
    )",
    "CREATE TABLE forum_posts (
        post_id INTEGER PRIMARY KEY,
        topic_id INTEGER NOT NULL,
        poster_id INTEGER NOT NULL,
        post_time INTEGER NOT NULL,
        post_text TEXT NOT NULL,
        post_visibility INTEGER NOT NULL
    )",
    "CREATE TABLE forum_attachments (
        attach_id INTEGER PRIMARY KEY,
        post_msg_id INTEGER NOT NULL,
        poster_id INTEGER NOT NULL,
        physical_filename TEXT NOT NULL,
        real_filename TEXT NOT NULL,
        filesize INTEGER NOT NULL,
        filetime INTEGER NOT NULL,
        is_orphan INTEGER NOT NULL,
        in_message INTEGER NOT NULL
    )",
    "INSERT INTO forum_groups VALUES
        (1, 3, 'REGISTERED', ''),
        (5, 0, 'Moderators', ' Keep the peace '),
        (6, 2, 'Secret Club', '')",
    "INSERT INTO forum_users VALUES
        (1, 2, 'Anonymous', NULL, 0, 0),
        (2, 3, 'admin', 'admin@example.com', 1500000000, 1600000000),
        (3, 2, 'Googlebot', '', 1500000000, 0),
        (4, 1, 'lurker', 'lurker@example.com', 1500000100, 0),
        (5, 0, 'regular', 'regular@example.com', 1500000200, 1600000200)",
    "INSERT INTO forum_user_group VALUES
        (1, 2, 0, 0),
        (5, 2, 1, 0),
        (5, 4, 0, 1),
        (6, 5, 0, 0)",
    "INSERT INTO forum_forums VALUES
        (1, 0, 1, 'General', 'Everything else', 0),
        (2, 1, 2, 'Chat', '', 1),
        (3, 0, 5, 'Homepage', '', 2)",
    "INSERT INTO forum_topics VALUES
        (1, 2, 2, 'Welcome', 1500001000, 42, 1, 1, 0),
        (2, 2, 5, 'Awaiting approval', 1500002000, 0, 0, 0, 0),
        (3, 1, 2, 'Welcome', 1500001000, 0, 0, 1, 1)",
    "INSERT INTO forum_posts VALUES
        (1, 1, 2, 1500001000, 'Hello everyone', 1),
        (2, 1, 5, 1500001100, 'Hi!', 1),
        (3, 1, 4, 1500001200, 'Spam', 0)",
    "INSERT INTO forum_attachments VALUES
        (1, 1, 2, '2_a1b2c3', 'photo.jpg', 2048, 1500001000, 0, 0),
        (2, 0, 2, '2_d4e5f6', 'draft.png', 100, 1500001000, 1, 0)",
];

async fn open_board(dir: &Path) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(dir.join("phpbb.db"))
                .create_if_missing(true),
        )
        .await?;
    execute_all(&pool, PHPBB_BOARD).await?;
    Ok(pool)
}

fn converter(board: SqlitePool) -> PhpBbConverter {
    PhpBbConverter::new(
        Arc::new(SqliteAdapter::new(board)),
        &PhpBbSettings {
            table_prefix: "forum_".to_string(),
            attachment_path: "/srv/phpbb/files/".to_string(),
        },
    )
}

#[tokio::test]
async fn test_phpbb_board_converts_into_intermediate_tables() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let board = open_board(dir.path()).await?;
    let intermediate = open_intermediate(dir.path()).await?;
    let engine = CopyEngine::new(
        Arc::new(intermediate.destination()),
        intermediate.mapping_store(),
        2,
    );
    let runner = PipelineRunner::new(engine);

    let mut registry = StepRegistry::new();
    converter(board.clone()).register_steps(&mut registry)?;
    let summary = runner.run(registry).await?;

    let pool = intermediate.pool();
    assert_eq!(count(pool, "groups").await?, 2);
    assert_eq!(count(pool, "users").await?, 3);
    assert_eq!(count(pool, "group_users").await?, 2);
    assert_eq!(count(pool, "categories").await?, 2);
    assert_eq!(count(pool, "topics").await?, 1);
    assert_eq!(count(pool, "posts").await?, 2);
    assert_eq!(count(pool, "uploads").await?, 1);
    assert_eq!(summary.total_inserted(), 13);

    // bots and the anonymous account are not users
    let users: Vec<(i64, String, bool, bool)> =
        sqlx::query_as("SELECT original_id, username, admin, active FROM users ORDER BY original_id")
            .fetch_all(pool)
            .await?;
    assert_eq!(
        users,
        vec![
            (2, "admin".to_string(), true, true),
            (4, "lurker".to_string(), false, false),
            (5, "regular".to_string(), false, true),
        ]
    );

    let groups: Vec<(i64, Option<String>, i64)> = sqlx::query_as(
        r#"SELECT original_id, bio, visibility_level FROM "groups" ORDER BY original_id"#,
    )
    .fetch_all(pool)
    .await?;
    assert_eq!(
        groups,
        vec![
            (5, Some("Keep the peace".to_string()), 0),
            (6, None, 2),
        ]
    );

    // pending members are left out, leaders own the group
    let memberships: Vec<(i64, i64, bool)> =
        sqlx::query_as("SELECT group_id, user_id, owner FROM group_users ORDER BY group_id")
            .fetch_all(pool)
            .await?;
    assert_eq!(memberships, vec![(5, 2, true), (6, 5, false)]);

    let forums: Vec<(i64, Option<i64>)> =
        sqlx::query_as("SELECT original_id, parent_id FROM categories ORDER BY original_id")
            .fetch_all(pool)
            .await?;
    assert_eq!(forums, vec![(1, None), (2, Some(1))]);

    let (title, closed, views): (String, bool, i64) =
        sqlx::query_as("SELECT title, closed, views FROM topics")
            .fetch_one(pool)
            .await?;
    assert_eq!((title.as_str(), closed, views), ("Welcome", true, 42));

    let uploads = intermediate
        .source()
        .query(
            "SELECT path, filename FROM uploads WHERE post_id = :post",
            &params([("post", 1)]),
        )
        .await?;
    assert_eq!(uploads.len(), 1);
    assert_eq!(
        uploads[0].get("path"),
        Some(&Value::Text("/srv/phpbb/files/2_a1b2c3".to_string()))
    );
    assert_eq!(uploads[0].text("filename")?, "photo.jpg");

    Ok(())
}

#[tokio::test]
async fn test_converting_twice_adds_nothing() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let board = open_board(dir.path()).await?;
    let intermediate = open_intermediate(dir.path()).await?;
    let runner = PipelineRunner::new(CopyEngine::new(
        Arc::new(intermediate.destination()),
        intermediate.mapping_store(),
        100,
    ));

    let mut registry = StepRegistry::new();
    converter(board.clone()).register_steps(&mut registry)?;
    runner.run(registry).await?;

    // a post approved after the first run is picked up by the second
    execute_all(&board, &["UPDATE forum_posts SET post_visibility = 1 WHERE post_id = 3"]).await?;

    let mut registry = StepRegistry::new();
    converter(board).register_steps(&mut registry)?;
    let rerun = runner.run(registry).await?;

    assert_eq!(rerun.total_inserted(), 1);
    assert_eq!(rerun.report("phpbb.posts").map(|r| r.inserted), Some(1));
    assert_eq!(rerun.report("phpbb.users").map(|r| r.skipped), Some(3));
    assert_eq!(count(intermediate.pool(), "posts").await?, 3);
    Ok(())
}
