#![allow(dead_code)]

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;

use forum_import::core::config::DatabaseConfig;
use forum_import::core::traits::DestinationRef;
use forum_import::modules::destinations::connect_destination;
use forum_import::IntermediateDb;

/// The platform tables the importer writes, reduced to the imported columns.
const DESTINATION_SCHEMA: &[&str] = &[
    r#"CREATE TABLE "groups" (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        full_name TEXT,
        bio_raw TEXT,
        visibility_level INTEGER NOT NULL,
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL
    )"#,
    "CREATE TABLE users (
        id INTEGER PRIMARY KEY,
        username TEXT NOT NULL,
        username_lower TEXT NOT NULL UNIQUE,
        name TEXT,
        active BOOLEAN NOT NULL,
        admin BOOLEAN NOT NULL,
        moderator BOOLEAN NOT NULL,
        trust_level INTEGER NOT NULL,
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL,
        last_seen_at DATETIME
    )",
    r#"CREATE TABLE user_emails (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        email TEXT NOT NULL UNIQUE,
        "primary" BOOLEAN NOT NULL,
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL
    )"#,
    "CREATE TABLE group_users (
        group_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        owner BOOLEAN NOT NULL,
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL,
        PRIMARY KEY (group_id, user_id)
    )",
    "CREATE TABLE categories (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        slug TEXT NOT NULL,
        description TEXT,
        parent_category_id INTEGER,
        position INTEGER,
        user_id INTEGER NOT NULL,
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL
    )",
    "CREATE TABLE topics (
        id INTEGER PRIMARY KEY,
        title TEXT NOT NULL,
        category_id INTEGER,
        user_id INTEGER NOT NULL,
        archetype TEXT NOT NULL,
        views INTEGER NOT NULL,
        closed BOOLEAN NOT NULL,
        visible BOOLEAN NOT NULL,
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL,
        bumped_at DATETIME NOT NULL
    )",
    "CREATE TABLE posts (
        id INTEGER PRIMARY KEY,
        topic_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        post_number INTEGER NOT NULL,
        sort_order INTEGER NOT NULL,
        post_type INTEGER NOT NULL,
        raw TEXT NOT NULL,
        cooked TEXT NOT NULL,
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL,
        UNIQUE (topic_id, post_number)
    )",
];

pub async fn open_intermediate(dir: &Path) -> Result<IntermediateDb> {
    Ok(IntermediateDb::open(dir.join("intermediate.db")).await?)
}

/// A SQLite destination with the platform schema, plus a pool for assertions.
pub async fn open_destination(dir: &Path) -> Result<(DestinationRef, SqlitePool)> {
    let path = dir.join("destination.db");
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(SqliteConnectOptions::new().filename(&path).create_if_missing(true))
        .await?;
    execute_all(&pool, DESTINATION_SCHEMA).await?;

    let destination = connect_destination(&DatabaseConfig {
        db_type: "sqlite".to_string(),
        url: format!("sqlite://{}", path.display()),
        max_connections: 2,
    })
    .await?;
    Ok((destination, pool))
}

pub async fn execute_all(pool: &SqlitePool, statements: &[&str]) -> Result<()> {
    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

pub async fn count(pool: &SqlitePool, table: &str) -> Result<i64> {
    let sql = format!(r#"SELECT COUNT(*) FROM "{}""#, table);
    Ok(sqlx::query_scalar(&sql).fetch_one(pool).await?)
}
