//! Ollama caption generator
//!
//! Calls `POST {endpoint}/api/generate` with `stream: false` and uses the
//! `response` field as the caption body.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::caption::CaptionGenerator;
use crate::error::CaptionError;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

pub struct OllamaCaptioner {
    http_client: reqwest::Client,
    endpoint: String,
    model: String,
    prompt_template: String,
}

impl OllamaCaptioner {
    pub fn new(
        endpoint: &str,
        model: &str,
        prompt_template: &str,
        timeout: Duration,
    ) -> Result<Self, CaptionError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("reelcast/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| CaptionError::Unreachable(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            prompt_template: prompt_template.to_string(),
        })
    }

    fn prompt(&self, topic_hint: &str) -> String {
        self.prompt_template.replace("{topic}", topic_hint)
    }
}

#[async_trait]
impl CaptionGenerator for OllamaCaptioner {
    async fn generate(&self, topic_hint: &str) -> Result<String, CaptionError> {
        let url = format!("{}/api/generate", self.endpoint);
        let request = GenerateRequest {
            model: &self.model,
            prompt: self.prompt(topic_hint),
            stream: false,
        };

        debug!(%url, model = %self.model, "Requesting caption");
        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| CaptionError::Unreachable(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(CaptionError::Unreachable(format!(
                "{} answered HTTP {}",
                url,
                response.status()
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| CaptionError::Unreachable(format!("unexpected response: {}", e)))?;

        clean_caption(&body.response).ok_or(CaptionError::Empty)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Strip wrapping quotes and blank lines models like to add
fn clean_caption(raw: &str) -> Option<String> {
    let lines: Vec<&str> = raw
        .lines()
        .map(|l| l.trim().trim_matches('"').trim())
        .filter(|l| !l.is_empty())
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}
