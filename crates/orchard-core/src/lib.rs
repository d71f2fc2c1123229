//! Orchard Core Library
//!
//! This crate provides the core functionality for Orchard, including:
//! - Fruit records (SQLite store with sequence-assigned ids)
//! - Prompt templates with explicit parameter substitution
//! - LLM integration (OpenAI-compatible chat completions)
//! - Poem generation on top of any `TextGenerator`
//! - Configuration management

pub mod commands;
pub mod config;
pub mod error;
pub mod llm;
pub mod prompt;
pub mod storage;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::commands::fruit::{Fruit, FruitRepository};
    pub use crate::commands::poem::PoemService;
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::llm::{LlmClient, TextGenerator};
    pub use crate::storage::Database;
}
