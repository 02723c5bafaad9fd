//! Profile page scraper
//!
//! Fetches `{base_url}/{handle}/reels/` with the saved browser session and
//! collects the `/reel/<code>/` links in page order.

use async_trait::async_trait;
use reqwest::header::{COOKIE, USER_AGENT};
use reqwest::{StatusCode, Url};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{expand_path, SourceConfig};
use crate::error::{AcquisitionError, Result};
use crate::session::SessionStore;
use crate::source::CandidateSource;
use crate::types::{CandidateItem, Creator};

const REEL_MARKER: &str = "/reel/";

pub struct ProfileScraper {
    client: reqwest::Client,
    base_url: Url,
    user_agent: String,
    session: Option<SessionStore>,
}

impl ProfileScraper {
    pub fn new(
        base_url: &str,
        user_agent: &str,
        timeout: Duration,
        session: Option<SessionStore>,
    ) -> std::result::Result<Self, AcquisitionError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AcquisitionError::Unparseable(format!("base url {}: {}", base_url, e)))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AcquisitionError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            user_agent: user_agent.to_string(),
            session,
        })
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        let session = SessionStore::new(expand_path(&config.session_file)?, None);
        Ok(Self::new(
            &config.base_url,
            &config.user_agent,
            config.timeout()?,
            Some(session),
        )?)
    }

    fn profile_url(&self, creator: &Creator) -> std::result::Result<Url, AcquisitionError> {
        self.base_url
            .join(&format!("{}/reels/", creator.as_str().trim_matches('/')))
            .map_err(|e| AcquisitionError::Unparseable(e.to_string()))
    }
}

#[async_trait]
impl CandidateSource for ProfileScraper {
    async fn fetch_candidates(
        &self,
        creator: &Creator,
    ) -> std::result::Result<Vec<CandidateItem>, AcquisitionError> {
        let url = self.profile_url(creator)?;
        let mut request = self
            .client
            .get(url.clone())
            .header(USER_AGENT, &self.user_agent);

        if let Some(store) = &self.session {
            let session = store.acquire().await?;
            if let Some(cookies) = session.cookie_header(url.host_str().unwrap_or_default()) {
                request = request.header(COOKIE, cookies);
            }
        }

        debug!(%url, "Fetching profile page");
        let response = request.send().await?;

        if response.url().path().starts_with("/accounts/login") {
            return Err(AcquisitionError::SessionExpired(format!(
                "{} redirected to the login page",
                url
            )));
        }

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(AcquisitionError::SessionExpired(format!(
                    "{} answered HTTP {}",
                    url,
                    response.status()
                )));
            }
            status if !status.is_success() => {
                return Err(AcquisitionError::Network(format!("{} answered HTTP {}", url, status)));
            }
            _ => {}
        }

        let html = response.text().await?;
        let items = extract_reel_links(&html, &self.base_url);
        if items.is_empty() {
            // Script-only shells and 200-status login walls look like this.
            return Err(AcquisitionError::Unparseable(format!(
                "no reel links on {}",
                url
            )));
        }
        info!(creator = %creator, count = items.len(), "Scraped candidate reels");
        Ok(items)
    }

    fn name(&self) -> &str {
        "profile"
    }
}

/// Collect reel shortcodes in order of first appearance
pub fn extract_reel_links(html: &str, base_url: &Url) -> Vec<CandidateItem> {
    let mut seen = HashSet::new();
    let mut items = Vec::new();

    for (pos, _) in html.match_indices(REEL_MARKER) {
        let rest = &html[pos + REEL_MARKER.len()..];
        let code: String = rest
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
            .collect();

        if code.is_empty() || !seen.insert(code.clone()) {
            continue;
        }

        let locator = base_url
            .join(&format!("reel/{}/", code))
            .map(|u| u.to_string())
            .unwrap_or_else(|_| format!("{}reel/{}/", base_url, code));
        items.push(CandidateItem::new(code, locator));
    }

    items
}
