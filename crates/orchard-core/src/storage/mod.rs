//! Storage layer - SQLite
//!
//! Provides database management, migrations, and sequences for orchard.
//!
//! # Architecture
//!
//! - `database`: Connection pool management and initialization
//! - `migrations`: Schema versioning and automatic migration
//! - `sequence`: Named id generators (SQLite has no native sequences)
//!
//! # Usage
//!
//! ```ignore
//! use orchard_core::storage::{Database, DatabaseConfig};
//!
//! // Create an in-memory database for testing
//! let db = Database::in_memory().await?;
//!
//! // Or open a file-backed database
//! let db = Database::new(DatabaseConfig::with_path("fruits.db")).await?;
//! ```

pub mod database;
pub mod migrations;
pub mod sequence;

pub use database::{Database, DatabaseConfig, default_database_path};
pub use migrations::{CURRENT_VERSION, MigrationStatus, migration_status, run_migrations};
pub use sequence::{FRUIT_SEQUENCE, FRUIT_SEQUENCE_INCREMENT, FRUIT_SEQUENCE_INITIAL_VALUE};
