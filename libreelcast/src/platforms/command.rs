//! External uploader publisher
//!
//! Runs a configured program once per publish. The program receives the video
//! path, the caption and the session file through argument placeholders and
//! prints the new post id as the last line of stdout.
//!
//! Exit status 2, or a login/challenge message on stderr, is reported as an
//! authentication challenge.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::{expand_path, CommandPublisherConfig};
use crate::error::{ConfigError, PublishError, Result};
use crate::platforms::Publisher;
use crate::session::SessionStore;
use crate::types::ProcessedMedia;

const AUTH_EXIT_CODE: i32 = 2;
const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(600);
const AUTH_MARKERS: [&str; 5] = [
    "login_required",
    "challenge_required",
    "checkpoint",
    "unauthorized",
    "please log in",
];

pub struct CommandPublisher {
    program: String,
    args: Vec<String>,
    session: SessionStore,
    timeout: Duration,
}

impl CommandPublisher {
    pub fn new(program: impl Into<String>, args: Vec<String>, session: SessionStore) -> Self {
        Self {
            program: program.into(),
            args,
            session,
            timeout: DEFAULT_UPLOAD_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn from_config(config: &CommandPublisherConfig) -> Result<Self> {
        let max_age = config
            .session_max_age
            .as_deref()
            .map(|age| {
                humantime::parse_duration(age).map_err(|e| ConfigError::InvalidValue {
                    field: "publisher.session_max_age".to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        Ok(Self::new(
            config.program.clone(),
            config.args.clone(),
            SessionStore::new(expand_path(&config.session_file)?, max_age),
        ))
    }

    fn render_args(&self, media: &ProcessedMedia, caption: &str) -> Vec<String> {
        let video = media.path().to_string_lossy();
        let session = self.session.path().to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{video}", &video)
                    .replace("{session}", &session)
                    .replace("{caption}", caption)
            })
            .collect()
    }
}

#[async_trait]
impl Publisher for CommandPublisher {
    async fn publish(
        &self,
        media: &ProcessedMedia,
        caption: &str,
    ) -> std::result::Result<String, PublishError> {
        // Refuse early rather than let the uploader attempt a fresh login.
        let session = self.session.acquire().await?;
        debug!(session = %session.path().display(), "Upload session loaded");

        let args = self.render_args(media, caption);
        let run = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| {
                PublishError::Network(format!(
                    "{} did not finish within {}",
                    self.program,
                    humantime::format_duration(self.timeout)
                ))
            })?
            .map_err(|e| {
                PublishError::Rejected(format!("could not run uploader {}: {}", self.program, e))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let detail = last_line(&stderr).unwrap_or("no output").to_string();
            let lower = stderr.to_lowercase();
            if output.status.code() == Some(AUTH_EXIT_CODE)
                || AUTH_MARKERS.iter().any(|m| lower.contains(m))
            {
                return Err(PublishError::AuthChallenge(format!(
                    "{} needs a fresh login: {}",
                    self.program, detail
                )));
            }
            return Err(PublishError::Rejected(format!(
                "{} exited with {}: {}",
                self.program, output.status, detail
            )));
        }

        let post_id = last_line(&stdout).ok_or_else(|| {
            PublishError::Rejected(format!("{} printed no post id", self.program))
        })?;

        info!(platform = "command", post_id, "Upload finished");
        Ok(post_id.to_string())
    }

    fn name(&self) -> &str {
        "command"
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty()).last()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn session_file(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("upload_session.json");
        std::fs::write(
            &path,
            r#"{"cookies":[{"name":"sessionid","value":"abc","domain":"instagram.com"}]}"#,
        )
        .unwrap();
        path
    }

    fn shell(dir: &TempDir, script: &str) -> CommandPublisher {
        CommandPublisher::new(
            "sh",
            vec![
                "-c".to_string(),
                script.to_string(),
                "uploader".to_string(),
                "{video}".to_string(),
                "{caption}".to_string(),
            ],
            SessionStore::new(session_file(dir), None),
        )
    }

    #[tokio::test]
    async fn test_publish_returns_last_stdout_line() {
        let dir = TempDir::new().unwrap();
        let publisher = shell(&dir, "echo uploading \"$1\"; echo 3301234567");

        let id = publisher
            .publish(&ProcessedMedia::new("/tmp/a.mp4"), "#gg")
            .await
            .unwrap();
        assert_eq!(id, "3301234567");
    }

    #[tokio::test]
    async fn test_placeholders_are_substituted() {
        let dir = TempDir::new().unwrap();
        let publisher = shell(&dir, "echo \"$1|$2\"");

        let id = publisher
            .publish(&ProcessedMedia::new("/tmp/a.mp4"), "Repost from @alice")
            .await
            .unwrap();
        assert_eq!(id, "/tmp/a.mp4|Repost from @alice");
    }

    #[tokio::test]
    async fn test_exit_code_two_is_auth_challenge() {
        let dir = TempDir::new().unwrap();
        let publisher = shell(&dir, "echo 'session invalid' >&2; exit 2");

        let err = publisher
            .publish(&ProcessedMedia::new("/tmp/a.mp4"), "#gg")
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::AuthChallenge(_)));
    }

    #[tokio::test]
    async fn test_challenge_message_is_auth_challenge() {
        let dir = TempDir::new().unwrap();
        let publisher = shell(&dir, "echo 'ChallengeRequired: challenge_required' >&2; exit 1");

        let err = publisher
            .publish(&ProcessedMedia::new("/tmp/a.mp4"), "#gg")
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::AuthChallenge(_)));
    }

    #[tokio::test]
    async fn test_other_failures_are_rejections() {
        let dir = TempDir::new().unwrap();
        let publisher = shell(&dir, "echo 'video too long' >&2; exit 1");

        let err = publisher
            .publish(&ProcessedMedia::new("/tmp/a.mp4"), "#gg")
            .await
            .unwrap_err();
        match err {
            PublishError::Rejected(msg) => assert!(msg.contains("video too long")),
            other => panic!("Expected Rejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_session_is_auth_challenge_without_running() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ran");
        let publisher = CommandPublisher::new(
            "touch",
            vec![marker.to_string_lossy().into_owned()],
            SessionStore::new(dir.path().join("absent.json"), None),
        );

        let err = publisher
            .publish(&ProcessedMedia::new("/tmp/a.mp4"), "#gg")
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::AuthChallenge(_)));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_slow_uploader_times_out() {
        let dir = TempDir::new().unwrap();
        let publisher = shell(&dir, "sleep 5").with_timeout(Duration::from_millis(100));

        let err = publisher
            .publish(&ProcessedMedia::new("/tmp/a.mp4"), "#gg")
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Network(_)));
    }

    #[tokio::test]
    async fn test_empty_stdout_is_rejection() {
        let dir = TempDir::new().unwrap();
        let publisher = shell(&dir, "true");

        let err = publisher
            .publish(&ProcessedMedia::new("/tmp/a.mp4"), "#gg")
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Rejected(_)));
    }
}
