//! Configuration management for Reelcast

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::types::Creator;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Handles to repost from, in preference order
    pub creators: Vec<String>,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub caption: CaptionConfig,
    pub publisher: PublisherConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub path: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: "~/.local/share/reelcast/progress.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Once,
    Loop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    pub mode: RunMode,
    /// Delay between the end of one cycle and the start of the next
    pub interval: String,
    /// Fixed pause after a successful publish
    pub publish_cooldown: String,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Loop,
            interval: "30m".to_string(),
            publish_cooldown: "10s".to_string(),
        }
    }
}

impl SchedulingConfig {
    pub fn interval(&self) -> Result<Duration> {
        parse_duration_field("scheduling.interval", &self.interval)
    }

    pub fn publish_cooldown(&self) -> Result<Duration> {
        parse_duration_field("scheduling.publish_cooldown", &self.publish_cooldown)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    /// Browser storage-state file holding the scraping session cookies
    pub session_file: String,
    pub user_agent: String,
    pub timeout: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.instagram.com".to_string(),
            session_file: "~/.config/reelcast/session.json".to_string(),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
                         Chrome/124.0 Safari/537.36"
                .to_string(),
            timeout: "30s".to_string(),
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Result<Duration> {
        parse_duration_field("source.timeout", &self.timeout)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub work_dir: String,
    pub keep_artifacts: bool,
    pub ffmpeg: String,
    /// Text burned into the video. Empty disables the overlay.
    pub branding_text: String,
    pub font_size: u32,
    pub font_color: String,
    pub bottom_margin: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intro: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outro: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub music: Option<String>,
    pub music_volume: f32,
    pub width: u32,
    pub height: u32,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            work_dir: "~/.cache/reelcast/work".to_string(),
            keep_artifacts: false,
            ffmpeg: "ffmpeg".to_string(),
            branding_text: "BGMI_MASTERS".to_string(),
            font_size: 48,
            font_color: "white".to_string(),
            bottom_margin: 100,
            intro: None,
            outro: None,
            music: None,
            music_volume: 0.2,
            width: 1080,
            height: 1920,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionProvider {
    Ollama,
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    pub provider: CaptionProvider,
    pub endpoint: String,
    pub model: String,
    /// Prompt template; `{topic}` is replaced with the topic hint
    pub prompt: String,
    /// Caption header; `{creator}` is replaced with the creator handle
    pub prefix: String,
    /// Caption body used by the `fixed` provider
    pub text: String,
    pub timeout: String,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            provider: CaptionProvider::Ollama,
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            prompt: "Create engaging Instagram hashtags for a funny gaming short about {topic}. \
                     Include exactly 5 trending gaming hashtags. Output only hashtags, nothing else."
                .to_string(),
            prefix: "Repost from @{creator}".to_string(),
            text: String::new(),
            timeout: "60s".to_string(),
        }
    }
}

impl CaptionConfig {
    pub fn timeout(&self) -> Result<Duration> {
        parse_duration_field("caption.timeout", &self.timeout)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PublisherConfig {
    Command(CommandPublisherConfig),
    Mastodon(MastodonConfig),
}

/// External uploader invoked once per publish
///
/// `args` may contain `{video}`, `{caption}` and `{session}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandPublisherConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub session_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_max_age: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MastodonConfig {
    pub instance: String,
    pub token_file: String,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load and validate configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Check everything that would otherwise fail mid-cycle
    pub fn validate(&self) -> Result<()> {
        if self.creators.iter().all(|c| c.trim().is_empty()) {
            return Err(ConfigError::EmptyCreators.into());
        }

        self.scheduling.interval()?;
        self.scheduling.publish_cooldown()?;
        self.source.timeout()?;
        self.caption.timeout()?;

        if let PublisherConfig::Command(command) = &self.publisher {
            if command.program.trim().is_empty() {
                return Err(ConfigError::MissingField("publisher.program".to_string()).into());
            }
            if let Some(max_age) = &command.session_max_age {
                parse_duration_field("publisher.session_max_age", max_age)?;
            }
        }

        if !(0.0..=4.0).contains(&self.media.music_volume) {
            return Err(ConfigError::InvalidValue {
                field: "media.music_volume".to_string(),
                reason: format!("{} is outside 0.0..=4.0", self.media.music_volume),
            }
            .into());
        }

        Ok(())
    }

    /// Configured creators, skipping blank entries
    pub fn creators(&self) -> Vec<Creator> {
        self.creators
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(Creator::new)
            .collect()
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            creators: vec!["s8ul_reacts".to_string(), "gamezy.meme".to_string()],
            ledger: LedgerConfig::default(),
            scheduling: SchedulingConfig::default(),
            source: SourceConfig::default(),
            media: MediaConfig::default(),
            caption: CaptionConfig::default(),
            publisher: PublisherConfig::Command(CommandPublisherConfig {
                program: "ig-upload".to_string(),
                args: vec![
                    "--video".to_string(),
                    "{video}".to_string(),
                    "--caption".to_string(),
                    "{caption}".to_string(),
                    "--session".to_string(),
                    "{session}".to_string(),
                ],
                session_file: "~/.config/reelcast/upload_session.json".to_string(),
                session_max_age: None,
            }),
        }
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self).map_err(ConfigError::SerializeError)?)
    }
}

/// Expand `~` and environment variables in a configured path
pub fn expand_path(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path).map_err(|e| ConfigError::InvalidValue {
        field: path.to_string(),
        reason: e.to_string(),
    })?;
    Ok(PathBuf::from(expanded.as_ref()))
}

fn parse_duration_field(field: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value).map_err(|e| {
        ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("'{}': {}", value, e),
        }
        .into()
    })
}

/// Resolve the configuration file path using the XDG config directory
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("REELCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("reelcast").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReelcastError;
    use serial_test::serial;

    const MINIMAL: &str = r#"
creators = ["alice", "bob"]

[publisher]
kind = "command"
program = "ig-upload"
session_file = "/tmp/upload_session.json"
"#;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = Config::from_toml_str(MINIMAL).unwrap();

        assert_eq!(config.creators(), vec![Creator::new("alice"), Creator::new("bob")]);
        assert_eq!(config.scheduling.mode, RunMode::Loop);
        assert_eq!(config.scheduling.interval().unwrap(), Duration::from_secs(30 * 60));
        assert_eq!(config.media.font_size, 48);
        assert!(config.media.intro.is_none());
        assert_eq!(config.caption.provider, CaptionProvider::Ollama);
    }

    #[test]
    fn test_empty_creators_is_config_error() {
        let content = MINIMAL.replace(r#"["alice", "bob"]"#, "[]");
        let err = Config::from_toml_str(&content).unwrap_err();
        assert!(matches!(err, ReelcastError::Config(ConfigError::EmptyCreators)));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_blank_creators_are_skipped() {
        let content = MINIMAL.replace(r#"["alice", "bob"]"#, r#"["", " carol "]"#);
        let config = Config::from_toml_str(&content).unwrap();
        assert_eq!(config.creators(), vec![Creator::new("carol")]);
    }

    #[test]
    fn test_invalid_interval_is_rejected() {
        let content = format!("{}\n[scheduling]\ninterval = \"soon\"\n", MINIMAL);
        let err = Config::from_toml_str(&content).unwrap_err();
        assert!(err.to_string().contains("scheduling.interval"));
    }

    #[test]
    fn test_mastodon_publisher_section() {
        let content = r#"
creators = ["alice"]

[publisher]
kind = "mastodon"
instance = "mastodon.social"
token_file = "~/.config/reelcast/mastodon.token"
"#;
        let config = Config::from_toml_str(content).unwrap();
        match config.publisher {
            PublisherConfig::Mastodon(m) => assert_eq!(m.instance, "mastodon.social"),
            other => panic!("Expected mastodon publisher, got {:?}", other),
        }
    }

    #[test]
    fn test_optional_assets_parse() {
        let content = format!(
            "{}\n[media]\nintro = \"/nowhere/intro.mp4\"\nmusic = \"~/music.mp3\"\n",
            MINIMAL
        );
        let config = Config::from_toml_str(&content).unwrap();
        assert_eq!(config.media.intro.as_deref(), Some("/nowhere/intro.mp4"));
        assert!(config.media.outro.is_none());
    }

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let rendered = Config::default_config().to_toml_string().unwrap();
        let parsed = Config::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed.creators, Config::default_config().creators);
    }

    #[test]
    #[serial]
    fn test_config_path_from_env() {
        std::env::set_var("REELCAST_CONFIG", "/tmp/reelcast-test/config.toml");
        let path = resolve_config_path().unwrap();
        std::env::remove_var("REELCAST_CONFIG");
        assert_eq!(path, PathBuf::from("/tmp/reelcast-test/config.toml"));
    }

    #[test]
    #[serial]
    fn test_expand_path_uses_env() {
        std::env::set_var("REELCAST_TEST_DIR", "/srv/reels");
        let path = expand_path("$REELCAST_TEST_DIR/intro.mp4").unwrap();
        std::env::remove_var("REELCAST_TEST_DIR");
        assert_eq!(path, PathBuf::from("/srv/reels/intro.mp4"));
    }
}
