//! Mastodon publisher
//!
//! Uploads the edited video with the megalodon client and posts a status that
//! carries it. Works with any instance implementing the Mastodon API.

use async_trait::async_trait;
use megalodon::entities::UploadMedia;
use megalodon::megalodon::{PostStatusInputOptions, PostStatusOutput};
use megalodon::{Megalodon, SNS};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::{expand_path, MastodonConfig};
use crate::error::{PublishError, Result};
use crate::platforms::Publisher;
use crate::types::ProcessedMedia;

/// Attempts at posting while the instance is still processing the video
const PROCESSING_ATTEMPTS: u32 = 5;
const PROCESSING_DELAY: Duration = Duration::from_secs(5);

pub struct MastodonPublisher {
    client: Box<dyn Megalodon + Send + Sync>,
    instance_url: String,
}

impl MastodonPublisher {
    pub fn new(instance_url: String, access_token: SecretString) -> std::result::Result<Self, PublishError> {
        let client = megalodon::generator(
            SNS::Mastodon,
            instance_url.clone(),
            Some(access_token.expose_secret().to_string()),
            None,
        )
        .map_err(|e| {
            PublishError::AuthChallenge(format!("Failed to create Mastodon client: {:?}", e))
        })?;

        Ok(Self {
            client,
            instance_url,
        })
    }

    /// Create a publisher from configuration, reading the token file
    ///
    /// # Errors
    ///
    /// Returns `PublishError::AuthChallenge` if the token file is missing or empty.
    pub fn from_config(config: &MastodonConfig) -> Result<Self> {
        let token_path = expand_path(&config.token_file)?;

        let token = std::fs::read_to_string(&token_path)
            .map_err(|e| {
                PublishError::AuthChallenge(format!(
                    "Failed to read Mastodon token file {}: {}",
                    token_path.display(),
                    e
                ))
            })?
            .trim()
            .to_string();

        if token.is_empty() {
            return Err(
                PublishError::AuthChallenge("Mastodon token file is empty".to_string()).into(),
            );
        }

        Ok(Self::new(normalize_instance_url(&config.instance), SecretString::from(token))?)
    }

    async fn upload(&self, media: &ProcessedMedia) -> std::result::Result<(String, bool), PublishError> {
        let response = self
            .client
            .upload_media(media.path().to_string_lossy().into_owned(), None)
            .await
            .map_err(|e| map_megalodon_error(e, "upload media"))?;

        Ok(match response.json {
            UploadMedia::Attachment(attachment) => (attachment.id, false),
            UploadMedia::AsyncAttachment(attachment) => (attachment.id, true),
        })
    }
}

#[async_trait]
impl Publisher for MastodonPublisher {
    async fn publish(
        &self,
        media: &ProcessedMedia,
        caption: &str,
    ) -> std::result::Result<String, PublishError> {
        let (media_id, processing) = self.upload(media).await?;
        if processing {
            sleep(PROCESSING_DELAY).await;
        }

        let options = PostStatusInputOptions {
            media_ids: Some(vec![media_id.clone()]),
            ..Default::default()
        };

        let mut attempt = 1;
        let response = loop {
            match self
                .client
                .post_status(caption.to_string(), Some(&options))
                .await
            {
                Ok(response) => break response,
                Err(e) => {
                    let error = map_megalodon_error(e, "post status");
                    // 422 while the attachment is still being transcoded
                    let still_processing = matches!(&error, PublishError::Rejected(msg) if msg.contains("422"));
                    if still_processing && attempt < PROCESSING_ATTEMPTS {
                        warn!(attempt, media_id = %media_id, "Media still processing, retrying post");
                        attempt += 1;
                        sleep(PROCESSING_DELAY).await;
                        continue;
                    }
                    return Err(error);
                }
            }
        };

        let post_id = match response.json {
            PostStatusOutput::Status(status) => status.id,
            PostStatusOutput::ScheduledStatus(scheduled) => scheduled.id,
        };

        info!(platform = "mastodon", instance = %self.instance_url, post_id = %post_id, "Posted status");
        Ok(post_id)
    }

    fn name(&self) -> &str {
        "mastodon"
    }
}

fn normalize_instance_url(instance: &str) -> String {
    if instance.starts_with("http://") || instance.starts_with("https://") {
        instance.trim_end_matches('/').to_string()
    } else {
        format!("https://{}", instance.trim_end_matches('/'))
    }
}

/// Map megalodon errors to PublishError
///
/// - HTTP 401/403 → `AuthChallenge`
/// - HTTP 5xx and transport failures → `Network`
/// - everything else the server answered → `Rejected`
fn map_megalodon_error(error: megalodon::error::Error, context: &str) -> PublishError {
    let error_str = error.to_string();
    let error_lower = error_str.to_lowercase();

    match extract_http_status(&error_str) {
        Some(401) | Some(403) => PublishError::AuthChallenge(format!(
            "Mastodon refused the token ({}): {}. Check the configured token file.",
            context, error_str
        )),
        Some(status @ 500..=599) => PublishError::Network(format!(
            "Mastodon server error {} ({}): {}",
            status, context, error_str
        )),
        Some(status) => PublishError::Rejected(format!(
            "Mastodon HTTP {} ({}): {}",
            status, context, error_str
        )),
        None if error_lower.contains("unauthorized")
            || error_lower.contains("forbidden")
            || error_lower.contains("token") =>
        {
            PublishError::AuthChallenge(format!(
                "Mastodon authentication failed ({}): {}",
                context, error_str
            ))
        }
        None => PublishError::Network(format!("Mastodon error ({}): {}", context, error_str)),
    }
}

/// Extract an HTTP status code from an error message
///
/// Looks for patterns like "HTTP 401", "status 403", or a standalone "422:".
fn extract_http_status(error_str: &str) -> Option<u16> {
    let prefixes = ["HTTP ", "status ", "code: ", "status_code: "];

    for prefix in &prefixes {
        if let Some(pos) = error_str.find(prefix) {
            let after_prefix = &error_str[pos + prefix.len()..];
            if let Some(code) = after_prefix.get(0..3).and_then(|s| s.parse::<u16>().ok()) {
                if (100..=599).contains(&code) {
                    return Some(code);
                }
            }
        }
    }

    let bytes = error_str.as_bytes();
    for (i, window) in bytes.windows(4).enumerate() {
        let is_code = window[..3].iter().all(u8::is_ascii_digit)
            && (window[3] == b':' || window[3] == b' ')
            && (i == 0 || !bytes[i - 1].is_ascii_digit());
        if is_code {
            if let Some(code) = std::str::from_utf8(&window[..3])
                .ok()
                .and_then(|s| s.parse::<u16>().ok())
                .filter(|c| (100..=599).contains(c))
            {
                return Some(code);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_http_status() {
        assert_eq!(extract_http_status("HTTP 401 Unauthorized"), Some(401));
        assert_eq!(extract_http_status("request failed with status 503"), Some(503));
        assert_eq!(extract_http_status("422: Validation failed"), Some(422));
        assert_eq!(extract_http_status("connection reset by peer"), None);
        assert_eq!(extract_http_status("id 12345: not a status"), None);
    }

    #[test]
    fn test_normalize_instance_url() {
        assert_eq!(normalize_instance_url("mastodon.social"), "https://mastodon.social");
        assert_eq!(normalize_instance_url("https://fosstodon.org/"), "https://fosstodon.org");
        assert_eq!(normalize_instance_url("http://localhost:3000"), "http://localhost:3000");
    }

    #[test]
    fn test_missing_token_file_is_auth_challenge() {
        let config = MastodonConfig {
            instance: "mastodon.social".to_string(),
            token_file: "/definitely/not/here/mastodon.token".to_string(),
        };

        let err = MastodonPublisher::from_config(&config).err().unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::AuthChallenge);
    }

    #[test]
    fn test_empty_token_file_is_auth_challenge() {
        let dir = tempfile::TempDir::new().unwrap();
        let token_file = dir.path().join("mastodon.token");
        std::fs::write(&token_file, "  \n").unwrap();

        let config = MastodonConfig {
            instance: "mastodon.social".to_string(),
            token_file: token_file.to_string_lossy().into_owned(),
        };

        let err = MastodonPublisher::from_config(&config).err().unwrap();
        assert!(err.to_string().contains("empty"));
    }
}
