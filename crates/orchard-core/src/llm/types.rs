//! Wire format for a single chat completion
//!
//! Only what a one-shot system + user exchange needs is modelled. Unknown
//! response fields are ignored so any OpenAI-compatible server works.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of the exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Body POSTed to `{base_url}/chat/completions`
#[derive(Debug, Serialize)]
pub(crate) struct CompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub temperature: f32,
    pub max_tokens: usize,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompletionResponse {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompletionChoice {
    pub message: ChatMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenUsage {
    #[serde(default)]
    pub total_tokens: u32,
}

/// Text produced by one successful call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    /// Model that answered, as reported by the server
    pub model: String,
    pub total_tokens: u32,
    /// The server stopped at `max_tokens`
    pub truncated: bool,
}

impl Completion {
    /// First choice of a response, or `None` when the server sent no choices
    pub(crate) fn from_response(response: CompletionResponse) -> Option<Self> {
        let choice = response.choices.into_iter().next()?;
        Some(Self {
            text: choice.message.content,
            model: response.model,
            total_tokens: response.usage.map_or(0, |u| u.total_tokens),
            truncated: choice.finish_reason.as_deref() == Some("length"),
        })
    }
}
