//! Text generation seam
//!
//! Services that need generated text depend on [`TextGenerator`] rather
//! than on a concrete client, and receive it at construction time.

use async_trait::async_trait;

use crate::error::Result;

/// Produces text from a system instruction and a user prompt
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}
