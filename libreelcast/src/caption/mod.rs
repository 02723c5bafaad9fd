//! Caption generation
//!
//! Generators produce the caption body (usually hashtags) from a topic hint.
//! The pipeline prepends the configured credit line.

use async_trait::async_trait;

use crate::config::{CaptionConfig, CaptionProvider};
use crate::error::{CaptionError, Result};

pub mod ollama;

pub use ollama::OllamaCaptioner;

#[async_trait]
pub trait CaptionGenerator: Send + Sync {
    async fn generate(&self, topic_hint: &str) -> std::result::Result<String, CaptionError>;

    fn name(&self) -> &str;
}

/// Always returns the configured text
pub struct FixedCaption {
    text: String,
}

impl FixedCaption {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait]
impl CaptionGenerator for FixedCaption {
    async fn generate(&self, _topic_hint: &str) -> std::result::Result<String, CaptionError> {
        if self.text.trim().is_empty() {
            return Err(CaptionError::Empty);
        }
        Ok(self.text.clone())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// Build the generator selected by `caption.provider`
pub fn create_generator(config: &CaptionConfig) -> Result<Box<dyn CaptionGenerator>> {
    Ok(match config.provider {
        CaptionProvider::Ollama => Box::new(OllamaCaptioner::new(
            &config.endpoint,
            &config.model,
            &config.prompt,
            config.timeout()?,
        )?),
        CaptionProvider::Fixed => Box::new(FixedCaption::new(config.text.clone())),
    })
}

/// Join the credit line and the generated body
pub fn compose_caption(prefix_template: &str, creator: &str, body: &str) -> String {
    let prefix = prefix_template.replace("{creator}", creator);
    match (prefix.trim().is_empty(), body.trim().is_empty()) {
        (true, _) => body.trim().to_string(),
        (false, true) => prefix.trim().to_string(),
        (false, false) => format!("{}\n\n{}", prefix.trim(), body.trim()),
    }
}
