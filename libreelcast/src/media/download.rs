//! HTTP media download
//!
//! The locator is either a direct video URL or a post page. Pages are scanned
//! for a `<video src>` or `og:video` URL, which is then streamed to disk.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{CONTENT_TYPE, COOKIE, USER_AGENT};
use reqwest::{Response, Url};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::{expand_path, SourceConfig};
use crate::error::{AcquisitionError, Result};
use crate::media::MediaAcquirer;
use crate::session::SessionStore;
use crate::types::RawMedia;

pub struct HttpMediaAcquirer {
    client: reqwest::Client,
    user_agent: String,
    session: Option<SessionStore>,
}

impl HttpMediaAcquirer {
    pub fn new(
        user_agent: &str,
        timeout: Duration,
        session: Option<SessionStore>,
    ) -> std::result::Result<Self, AcquisitionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AcquisitionError::Network(e.to_string()))?;

        Ok(Self {
            client,
            user_agent: user_agent.to_string(),
            session,
        })
    }

    /// Share the scraper's browser session and user agent
    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        let session = SessionStore::new(expand_path(&config.session_file)?, None);
        // Downloads of whole videos need far longer than a page fetch.
        let timeout = config.timeout()?.saturating_mul(10);
        Ok(Self::new(&config.user_agent, timeout, Some(session))?)
    }

    async fn get(&self, url: &Url) -> std::result::Result<Response, AcquisitionError> {
        let mut request = self
            .client
            .get(url.clone())
            .header(USER_AGENT, &self.user_agent);

        if let Some(store) = &self.session {
            // Public posts download fine without a session.
            if let Ok(session) = store.acquire().await {
                if let Some(cookies) = session.cookie_header(url.host_str().unwrap_or_default()) {
                    request = request.header(COOKIE, cookies);
                }
            }
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(AcquisitionError::Network(format!(
                "{} answered HTTP {}",
                url,
                response.status()
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl MediaAcquirer for HttpMediaAcquirer {
    async fn acquire(
        &self,
        locator: &str,
        dest: &Path,
    ) -> std::result::Result<RawMedia, AcquisitionError> {
        let url = Url::parse(locator)
            .map_err(|e| AcquisitionError::Unparseable(format!("locator {}: {}", locator, e)))?;

        let response = self.get(&url).await?;
        let response = if is_video(&response) {
            response
        } else {
            let page_url = response.url().clone();
            let html = response.text().await?;
            let video_url = extract_video_url(&html, &page_url).ok_or_else(|| {
                AcquisitionError::MissingMedia(format!("no video found on {}", locator))
            })?;
            debug!(%video_url, "Resolved video source");
            self.get(&video_url).await?
        };

        let bytes = stream_to_file(response, dest).await?;
        info!(path = %dest.display(), bytes, "Downloaded media");
        Ok(RawMedia::new(dest))
    }
}

fn is_video(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("video/"))
}

/// Stream the body into `<dest>.part`, then rename into place
///
/// The part file is removed whenever this fails.
async fn stream_to_file(response: Response, dest: &Path) -> std::result::Result<u64, AcquisitionError> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    let part_path = PathBuf::from(format!("{}.part", dest.display()));
    let result = write_part(response, &part_path, dest).await;
    if result.is_err() {
        tokio::fs::remove_file(&part_path).await.ok();
    }
    result
}

async fn write_part(
    response: Response,
    part_path: &Path,
    dest: &Path,
) -> std::result::Result<u64, AcquisitionError> {
    let mut file = tokio::fs::File::create(part_path).await.map_err(io_err)?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await.map_err(io_err)?;
        downloaded += chunk.len() as u64;
    }

    file.flush().await.map_err(io_err)?;
    drop(file);

    if downloaded == 0 {
        return Err(AcquisitionError::MissingMedia("empty response body".to_string()));
    }

    tokio::fs::rename(part_path, dest).await.map_err(io_err)?;
    Ok(downloaded)
}

fn io_err(e: std::io::Error) -> AcquisitionError {
    AcquisitionError::Io(e.to_string())
}

/// Find the playable video URL on a post page
pub fn extract_video_url(html: &str, page_url: &Url) -> Option<Url> {
    let candidate = tag_attribute(html, "<video", "src=\"")
        .or_else(|| tag_attribute(html, "property=\"og:video\"", "content=\""))
        .or_else(|| tag_attribute(html, "property=\"og:video:secure_url\"", "content=\""))
        .or_else(|| json_string_after(html, "\"video_url\":\""))?;

    page_url.join(&unescape(&candidate)).ok()
}

/// Value of `attr` inside the tag that contains `anchor`
fn tag_attribute(html: &str, anchor: &str, attr: &str) -> Option<String> {
    let pos = html.find(anchor)?;
    let start = html[..pos].rfind('<').unwrap_or(pos);
    let end = html[pos..].find('>').map(|e| pos + e)?;
    let tag = &html[start..end];

    let value_start = tag.find(attr)? + attr.len();
    let value_end = tag[value_start..].find('"')? + value_start;
    let value = &tag[value_start..value_end];
    (!value.is_empty() && !value.starts_with("blob:")).then(|| value.to_string())
}

fn json_string_after(html: &str, key: &str) -> Option<String> {
    let start = html.find(key)? + key.len();
    let end = html[start..].find('"')? + start;
    Some(html[start..end].to_string())
}

fn unescape(value: &str) -> String {
    value
        .replace("&amp;", "&")
        .replace("\\u0026", "&")
        .replace("\\/", "/")
}
