//! Poem generation
//!
//! A professional-poet prompt rendered from an explicit template and sent to
//! whichever [`TextGenerator`] the service was built with.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::llm::TextGenerator;
use crate::prompt::{PromptParams, PromptTemplate};

/// Role instruction sent as the system message
pub const SYSTEM_PROMPT: &str = "You are a professional poet";

/// User message template; expects `topic` and `lines`
///
/// Each line carries a four-space indent, which is part of the prompt text.
pub const USER_TEMPLATE: &str =
    "    Write a poem about {topic}.\n    The poem should be {lines} lines long.\n";

/// Topic used when none is given
pub const DEFAULT_TOPIC: &str = "Quarkus and GraalVM";

/// Poem length used when none is given
pub const DEFAULT_LINES: u32 = 4;

/// Render `user_template` with `params` and ask `generator` for text
pub async fn generate_text(
    generator: &dyn TextGenerator,
    system_prompt: &str,
    user_template: &str,
    params: &PromptParams,
) -> Result<String> {
    let user_prompt = PromptTemplate::new(user_template)?.render(params)?;
    debug!(chars = user_prompt.len(), "Rendered user prompt");
    generator.generate(system_prompt, &user_prompt).await
}

/// Writes poems through an injected text generator
#[derive(Clone)]
pub struct PoemService {
    generator: Arc<dyn TextGenerator>,
    template: PromptTemplate,
}

impl std::fmt::Debug for PoemService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoemService")
            .field("template", &self.template.source())
            .finish_non_exhaustive()
    }
}

impl PoemService {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Result<Self> {
        Ok(Self {
            generator,
            template: PromptTemplate::new(USER_TEMPLATE)?,
        })
    }

    /// The prompt that would be sent for this topic and length
    pub fn user_prompt(&self, topic: &str, lines: u32) -> Result<String> {
        self.template.render(&poem_params(topic, lines))
    }

    /// Write a poem of `lines` lines about `topic`
    ///
    /// Stricter than a plain pass-through of the count: `lines` is unsigned,
    /// and `0` fails with [`Error::InvalidInput`] before the generator is
    /// called, so a zero-line request never costs a completion.
    pub async fn write_a_poem(&self, topic: &str, lines: u32) -> Result<String> {
        if lines == 0 {
            return Err(Error::InvalidInput(
                "A poem needs at least one line".to_string(),
            ));
        }

        info!(topic = %topic, lines, "Writing poem");
        let user_prompt = self.user_prompt(topic, lines)?;
        self.generator.generate(SYSTEM_PROMPT, &user_prompt).await
    }
}

fn poem_params(topic: &str, lines: u32) -> PromptParams {
    PromptParams::new().with("topic", topic).with("lines", lines)
}
