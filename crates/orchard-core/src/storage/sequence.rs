//! Named integer sequences
//!
//! Emulates database sequences on SQLite. Each sequence is one row in the
//! `sequences` table; allocation bumps `next_value` by `increment` and hands
//! back the previous value in a single statement, so callers inside a
//! transaction either consume a value together with their insert or not at
//! all.

use sqlx::{SqliteConnection, SqlitePool};

use crate::error::{Error, Result};

/// Sequence backing fruit ids
pub const FRUIT_SEQUENCE: &str = "FRUIT_SEQ";

/// First id handed out by [`FRUIT_SEQUENCE`]
pub const FRUIT_SEQUENCE_INITIAL_VALUE: i64 = 10;

/// Step between consecutive fruit ids
pub const FRUIT_SEQUENCE_INCREMENT: i64 = 1;

/// Allocate the next value of a sequence
pub async fn next_value(conn: &mut SqliteConnection, name: &str) -> Result<i64> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        UPDATE sequences
        SET next_value = next_value + increment
        WHERE name = ?
        RETURNING next_value - increment
        "#,
    )
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some((value,)) => {
            tracing::debug!(sequence = name, value, "Allocated sequence value");
            Ok(value)
        }
        None => Err(Error::Other(format!("Sequence '{}' does not exist", name))),
    }
}

/// Read the value the next allocation will return, without consuming it
pub async fn peek(pool: &SqlitePool, name: &str) -> Result<i64> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT next_value FROM sequences WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;

    row.map(|(v,)| v)
        .ok_or_else(|| Error::Other(format!("Sequence '{}' does not exist", name)))
}
