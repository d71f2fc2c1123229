//! Fruit record commands
//!
//! A fruit is a named record whose id comes from the `FRUIT_SEQ` sequence.
//! A fruit without an id is transient; [`FruitRepository::persist`] is the
//! only way to give it one. Names are unique and at most
//! [`MAX_NAME_LENGTH`] characters, both enforced by the storage layer.

use serde::Serialize;
use sqlx::Row;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::storage::Database;
use crate::storage::sequence::{self, FRUIT_SEQUENCE};

/// Longest name the `fruits.name` column accepts, in characters
pub const MAX_NAME_LENGTH: usize = 40;

/// A fruit record
///
/// Serialize-only: a persistent `Fruit` can only come out of the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fruit {
    id: Option<i64>,
    name: String,
}

impl Fruit {
    /// Create a transient fruit. Length is checked when it is persisted.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }

    /// Store-assigned id, `None` while transient
    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the fruit has been assigned an id
    pub fn is_persistent(&self) -> bool {
        self.id.is_some()
    }
}

impl std::fmt::Display for Fruit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.id {
            Some(id) => write!(f, "{} - {}", id, self.name),
            None => write!(f, "(transient) - {}", self.name),
        }
    }
}

/// Fruit repository for database operations
pub struct FruitRepository<'a> {
    db: &'a Database,
}

impl<'a> FruitRepository<'a> {
    /// Create a new fruit repository
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Persist a transient fruit, assigning it the next `FRUIT_SEQ` value
    ///
    /// The id allocation and the insert share a transaction, so a rejected
    /// name does not consume a sequence value.
    pub async fn persist(&self, fruit: Fruit) -> Result<Fruit> {
        if let Some(id) = fruit.id {
            return Err(Error::AlreadyPersistent(id));
        }

        let mut tx = self.db.pool().begin().await?;
        let id = sequence::next_value(&mut tx, FRUIT_SEQUENCE).await?;

        let inserted = sqlx::query("INSERT INTO fruits (id, name) VALUES (?, ?)")
            .bind(id)
            .bind(&fruit.name)
            .execute(&mut *tx)
            .await;

        if let Err(e) = inserted {
            tx.rollback().await?;
            return Err(constraint_error(e, &fruit.name));
        }

        tx.commit().await?;
        info!(id, name = %fruit.name, "Persisted fruit");

        Ok(Fruit {
            id: Some(id),
            name: fruit.name,
        })
    }

    /// Every persisted fruit, sorted by name then id
    pub async fn find_all_ordered_by_name(&self) -> Result<Vec<Fruit>> {
        let rows = sqlx::query("SELECT id, name FROM fruits ORDER BY name ASC, id ASC")
            .fetch_all(self.db.pool())
            .await?;

        debug!(count = rows.len(), "Listed fruits");
        Ok(rows.into_iter().map(row_to_fruit).collect())
    }

    /// Get a fruit by id
    pub async fn find_by_id(&self, id: i64) -> Result<Option<Fruit>> {
        let row = sqlx::query("SELECT id, name FROM fruits WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.map(row_to_fruit))
    }

    /// Get a fruit by its exact name
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Fruit>> {
        let row = sqlx::query("SELECT id, name FROM fruits WHERE name = ?")
            .bind(name)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.map(row_to_fruit))
    }

    /// Change the name of a persisted fruit. The id never changes.
    pub async fn rename(&self, id: i64, new_name: &str) -> Result<Fruit> {
        let result = sqlx::query("UPDATE fruits SET name = ? WHERE id = ?")
            .bind(new_name)
            .bind(id)
            .execute(self.db.pool())
            .await
            .map_err(|e| constraint_error(e, new_name))?;

        if result.rows_affected() == 0 {
            return Err(Error::FruitNotFound(id));
        }

        info!(id, name = %new_name, "Renamed fruit");
        Ok(Fruit {
            id: Some(id),
            name: new_name.to_string(),
        })
    }

    /// Delete a fruit. Its id is not handed out again.
    pub async fn delete(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM fruits WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::FruitNotFound(id));
        }

        info!(id, "Deleted fruit");
        Ok(())
    }

    /// Number of persisted fruits
    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM fruits")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }
}

/// Convert a database row to a Fruit
fn row_to_fruit(row: sqlx::sqlite::SqliteRow) -> Fruit {
    Fruit {
        id: Some(row.get("id")),
        name: row.get("name"),
    }
}

/// Map storage constraint failures on `name` to typed errors
fn constraint_error(err: sqlx::Error, name: &str) -> Error {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return Error::UniquenessViolation(name.to_string());
        }
        if db_err.is_check_violation() {
            return Error::LengthViolation {
                name: name.to_string(),
                max: MAX_NAME_LENGTH,
            };
        }
    }
    Error::DatabaseError(err)
}

/// Create a fruit and save it to the database
pub async fn create_with_db(db: &Database, name: &str) -> Result<Fruit> {
    FruitRepository::new(db).persist(Fruit::new(name)).await
}

/// List all fruits from the database in name order
pub async fn list_with_db(db: &Database) -> Result<Vec<Fruit>> {
    FruitRepository::new(db).find_all_ordered_by_name().await
}

/// Get a fruit by id, failing if it does not exist
pub async fn get_with_db(db: &Database, id: i64) -> Result<Fruit> {
    FruitRepository::new(db)
        .find_by_id(id)
        .await?
        .ok_or(Error::FruitNotFound(id))
}

/// Rename a fruit in the database
pub async fn rename_with_db(db: &Database, id: i64, name: &str) -> Result<Fruit> {
    FruitRepository::new(db).rename(id, name).await
}

/// Delete a fruit from the database
pub async fn delete_with_db(db: &Database, id: i64) -> Result<()> {
    FruitRepository::new(db).delete(id).await
}
