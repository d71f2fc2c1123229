//! Error types for Orchard

use thiserror::Error;

/// Result type alias using Orchard's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Orchard error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Record errors (E001-E099)
    #[error("A fruit named '{0}' already exists.")]
    UniquenessViolation(String),

    #[error("Fruit name '{name}' is longer than {max} characters.")]
    LengthViolation { name: String, max: usize },

    #[error("Fruit '{0}' not found. Run `orchard fruits list` to see all fruits.")]
    FruitNotFound(i64),

    #[error("Fruit is already persistent with id {0}.")]
    AlreadyPersistent(i64),

    // Network errors (E100-E199)
    #[error("Network error: {0}. Check your internet connection.")]
    NetworkError(#[from] reqwest::Error),

    #[error("LLM API error: {0}. Check your API key with `orchard config get llm.api_key`.")]
    LLMError(String),

    #[error("Rate limited. Waiting {0} seconds before retry.")]
    RateLimited(u64),

    #[error("Model '{model}' is unavailable: {reason}")]
    ModelUnavailable { model: String, reason: String },

    #[error("No suitable model found: {0}")]
    NoSuitableModel(String),

    // Prompt errors (E200-E299)
    #[error("Prompt template error: {0}")]
    TemplateError(String),

    // Database errors (E400-E499)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::UniquenessViolation(_) => "E001",
            Self::LengthViolation { .. } => "E002",
            Self::FruitNotFound(_) => "E003",
            Self::AlreadyPersistent(_) => "E004",
            Self::NetworkError(_) => "E100",
            Self::LLMError(_) => "E101",
            Self::RateLimited(_) => "E102",
            Self::NoSuitableModel(_) => "E103",
            Self::ModelUnavailable { .. } => "E104",
            Self::TemplateError(_) => "E200",
            Self::DatabaseError(_) => "E400",
            Self::ConfigError(_) => "E600",
            Self::InvalidInput(_) => "E800",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::UniquenessViolation(_) => Some("orchard fruits list".to_string()),
            Self::LengthViolation { max, .. } => {
                Some(format!("Use a name of at most {} characters", max))
            }
            Self::FruitNotFound(_) => Some("orchard fruits list".to_string()),
            Self::NetworkError(_) => Some("Check internet connection".to_string()),
            Self::LLMError(_) => Some("orchard config get llm.api_key".to_string()),
            Self::ModelUnavailable { .. } | Self::NoSuitableModel(_) => {
                Some("orchard config set llm.fallback_models <models>".to_string())
            }
            Self::ConfigError(_) => Some("orchard config list".to_string()),
            _ => None,
        }
    }

    /// Whether this error came from a storage-level constraint
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::UniquenessViolation(_) | Self::LengthViolation { .. }
        )
    }
}
