//! Schema versions
//!
//! Each entry in `MIGRATIONS` runs at most once, inside a transaction that
//! also records it in `_migrations`. A failing step leaves the database at
//! the previous version.

use anyhow::Context;
use sqlx::SqlitePool;

struct Migration {
    version: i32,
    name: &'static str,
    sql: &'static str,
}

/// Ordered by version, no gaps
const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "sequences and fruits",
    // SQLite has no CREATE SEQUENCE; one row per named generator instead
    sql: r#"
        CREATE TABLE sequences (
            name TEXT PRIMARY KEY NOT NULL,
            next_value INTEGER NOT NULL,
            increment INTEGER NOT NULL DEFAULT 1 CHECK (increment > 0)
        );

        INSERT INTO sequences (name, next_value, increment) VALUES ('FRUIT_SEQ', 10, 1);

        CREATE TABLE fruits (
            id INTEGER PRIMARY KEY NOT NULL,
            name TEXT NOT NULL UNIQUE CHECK (length(name) <= 40)
        );
    "#,
}];

/// Schema version a fully migrated database is at
pub const CURRENT_VERSION: i32 = MIGRATIONS[MIGRATIONS.len() - 1].version;

/// Where we are and where we would go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub current_version: i32,
    pub target_version: i32,
    pub needs_migration: bool,
}

async fn applied_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await?;

    // NULL until the first migration lands
    let (version,): (Option<i32>,) = sqlx::query_as("SELECT MAX(version) FROM _migrations")
        .fetch_one(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

/// Apply every migration newer than the database
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let current = applied_version(pool).await?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let mut tx = pool.begin().await?;
        sqlx::raw_sql(migration.sql)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Migration v{} ({}) failed", migration.version, migration.name))?;
        sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
            .bind(migration.version)
            .bind(migration.name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(version = migration.version, name = migration.name, "Applied migration");
    }
    Ok(())
}

pub async fn needs_migration(pool: &SqlitePool) -> anyhow::Result<bool> {
    Ok(applied_version(pool).await? < CURRENT_VERSION)
}

pub async fn migration_status(pool: &SqlitePool) -> anyhow::Result<MigrationStatus> {
    let current_version = applied_version(pool).await?;
    Ok(MigrationStatus {
        current_version,
        target_version: CURRENT_VERSION,
        needs_migration: current_version < CURRENT_VERSION,
    })
}
