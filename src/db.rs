use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub async fn connect_sqlite(database_url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

/// Device-local tables. Idempotent, runs on every start.
pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS kv_store (
            key        TEXT PRIMARY KEY,
            value      TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS local_notification (
            handle       TEXT PRIMARY KEY,
            channel      TEXT NOT NULL,
            title        TEXT NOT NULL,
            body         TEXT NOT NULL,
            data         TEXT NOT NULL,
            fire_at      TEXT NOT NULL,
            created_at   TEXT NOT NULL,
            delivered_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_local_notification_due
            ON local_notification (delivered_at, fire_at)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS session_token (
            session_token_id   TEXT PRIMARY KEY,
            session_token_hash TEXT NOT NULL UNIQUE,
            user_id            TEXT NOT NULL,
            role               TEXT NOT NULL,
            display_name       TEXT NOT NULL,
            email              TEXT NOT NULL,
            phone              TEXT,
            is_guest           INTEGER NOT NULL DEFAULT 0,
            device_name        TEXT,
            created_at         TEXT NOT NULL,
            expires_at         TEXT NOT NULL,
            last_seen_at       TEXT,
            revoked_at         TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
