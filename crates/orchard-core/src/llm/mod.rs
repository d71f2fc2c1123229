//! Generated text
//!
//! [`TextGenerator`] is what services depend on. [`LlmClient`] implements
//! it against an OpenAI-compatible chat completions endpoint (OpenRouter by
//! default), with rate-limit retries and model fallback.

mod client;
mod generator;
mod types;

pub use client::{LlmClient, LlmClientBuilder};
pub use generator::TextGenerator;
pub use types::{ChatMessage, Completion, Role};
