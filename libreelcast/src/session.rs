//! Login session capability
//!
//! Sessions are established out of band (an interactive browser login or an
//! uploader's own login flow) and saved as a browser storage-state document:
//!
//! ```json
//! { "cookies": [{ "name": "sessionid", "value": "...", "domain": ".example.com",
//!                 "path": "/", "expires": 1767225600 }],
//!   "origins": [] }
//! ```
//!
//! Collaborators acquire a [`Session`] at the start of a stage and drop it when
//! the stage returns. Nothing here performs a login.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::SessionError;

/// One stored cookie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    /// Unix seconds; negative or absent means a session cookie
    #[serde(default)]
    pub expires: Option<f64>,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

impl Cookie {
    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires {
            Some(expires) if expires > 0.0 => (expires as i64) <= now.timestamp(),
            _ => false,
        }
    }

    fn matches_host(&self, host: &str) -> bool {
        let domain = self.domain.trim_start_matches('.');
        domain.is_empty() || host == domain || host.ends_with(&format!(".{}", domain))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StorageState {
    #[serde(default)]
    cookies: Vec<Cookie>,
}

/// Where a session lives and how old it may get
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
    max_age: Option<Duration>,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>, max_age: Option<Duration>) -> Self {
        Self {
            path: path.into(),
            max_age,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored session and check that it is still usable
    ///
    /// # Errors
    ///
    /// - `SessionError::NotFound` if no session has been saved
    /// - `SessionError::Unreadable` if the file is not a storage-state document
    /// - `SessionError::Expired` if the session is too old or all cookies expired
    pub async fn acquire(&self) -> Result<Session, SessionError> {
        let mut session = Session {
            path: self.path.clone(),
            max_age: self.max_age,
            cookies: Vec::new(),
            saved_at: None,
        };
        session.refresh().await?;

        if !session.is_valid() {
            return Err(SessionError::Expired(format!(
                "{} needs a fresh login",
                self.path.display()
            )));
        }
        Ok(session)
    }
}

/// A loaded login session
#[derive(Debug, Clone)]
pub struct Session {
    path: PathBuf,
    max_age: Option<Duration>,
    cookies: Vec<Cookie>,
    saved_at: Option<SystemTime>,
}

impl Session {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    /// True while the session has at least one live cookie and is within `max_age`
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if let (Some(max_age), Some(saved_at)) = (self.max_age, self.saved_at) {
            let saved_at: DateTime<Utc> = saved_at.into();
            if now.signed_duration_since(saved_at).to_std().unwrap_or_default() > max_age {
                return false;
            }
        }
        self.cookies.iter().any(|c| !c.is_expired_at(now))
    }

    /// Re-read the session file, picking up a login done since `acquire`
    pub async fn refresh(&mut self) -> Result<(), SessionError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SessionError::NotFound(self.path.display().to_string()));
            }
            Err(e) => return Err(SessionError::Unreadable(e.to_string())),
        };

        let state: StorageState = serde_json::from_str(&content)
            .map_err(|e| SessionError::Unreadable(format!("{}: {}", self.path.display(), e)))?;

        self.saved_at = tokio::fs::metadata(&self.path)
            .await
            .ok()
            .and_then(|m| m.modified().ok());
        self.cookies = state.cookies;
        Ok(())
    }

    /// `Cookie` header value for requests to `host`
    pub fn cookie_header(&self, host: &str) -> Option<String> {
        let now = Utc::now();
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .filter(|c| c.matches_host(host) && !c.is_expired_at(now))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();

        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }
}
