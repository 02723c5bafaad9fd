//! Publishing platforms
//!
//! A [`Publisher`] takes an edited video and its caption and returns the id the
//! platform assigned to the new post. Authentication problems are reported as
//! `PublishError::AuthChallenge` so callers can tell "log in again" apart from
//! an ordinary failed upload.
//!
//! # Examples
//!
//! ```no_run
//! use libreelcast::platforms::{create_publisher, Publisher};
//! use libreelcast::types::ProcessedMedia;
//! use libreelcast::Config;
//!
//! # async fn example() -> libreelcast::Result<()> {
//! let config = Config::load()?;
//! let publisher = create_publisher(&config.publisher)?;
//!
//! let media = ProcessedMedia::new("/tmp/work/alice_C9xYz_edited.mp4");
//! let post_id = publisher.publish(&media, "Repost from @alice\n\n#gg").await?;
//! println!("Published on {}: {}", publisher.name(), post_id);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::config::PublisherConfig;
use crate::error::{PublishError, Result};
use crate::types::ProcessedMedia;

pub mod command;
pub mod mastodon;

pub use command::CommandPublisher;
pub use mastodon::MastodonPublisher;

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish `media` with `caption`, returning the platform's post id
    ///
    /// # Errors
    ///
    /// - `PublishError::AuthChallenge` when the session or token is missing,
    ///   expired, or refused
    /// - `PublishError::Rejected` when the platform refuses the upload
    /// - `PublishError::Network` for transport failures
    async fn publish(
        &self,
        media: &ProcessedMedia,
        caption: &str,
    ) -> std::result::Result<String, PublishError>;

    /// Lowercase platform identifier (e.g. "command", "mastodon")
    fn name(&self) -> &str;
}

/// Build the publisher selected by the `[publisher]` section
pub fn create_publisher(config: &PublisherConfig) -> Result<Box<dyn Publisher>> {
    Ok(match config {
        PublisherConfig::Command(command) => Box::new(CommandPublisher::from_config(command)?),
        PublisherConfig::Mastodon(mastodon) => Box::new(MastodonPublisher::from_config(mastodon)?),
    })
}
