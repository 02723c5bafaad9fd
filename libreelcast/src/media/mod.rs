//! Media acquisition and editing
//!
//! Both collaborators work on files: the acquirer writes the raw download to a
//! destination chosen by the pipeline, the transformer reads it and writes an
//! edited copy next to it.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::config::{expand_path, MediaConfig};
use crate::error::{AcquisitionError, Result, TransformError};
use crate::types::{ProcessedMedia, RawMedia};

pub mod download;
pub mod ffmpeg;

pub use download::HttpMediaAcquirer;
pub use ffmpeg::{EditPlan, EditStep, FfmpegTransformer};

#[async_trait]
pub trait MediaAcquirer: Send + Sync {
    /// Download the media behind `locator` into `dest`
    async fn acquire(&self, locator: &str, dest: &Path) -> std::result::Result<RawMedia, AcquisitionError>;
}

#[async_trait]
pub trait MediaTransformer: Send + Sync {
    /// Apply `style` to `raw`, writing the result to `dest`
    ///
    /// When every step of the style is disabled the raw media is returned
    /// unchanged and `dest` is not written.
    async fn transform(
        &self,
        raw: &RawMedia,
        style: &StyleConfig,
        dest: &Path,
    ) -> std::result::Result<ProcessedMedia, TransformError>;
}

/// Edit settings applied to every repost
#[derive(Debug, Clone, PartialEq)]
pub struct StyleConfig {
    pub branding_text: String,
    pub font_size: u32,
    pub font_color: String,
    pub bottom_margin: u32,
    pub intro: Option<PathBuf>,
    pub outro: Option<PathBuf>,
    pub music: Option<PathBuf>,
    pub music_volume: f32,
    pub width: u32,
    pub height: u32,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            branding_text: String::new(),
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

impl StyleConfig {
    pub fn from_config(config: &MediaConfig) -> Result<Self> {
        let optional = |path: &Option<String>| -> Result<Option<PathBuf>> {
            path.as_deref().map(expand_path).transpose()
        };

        Ok(Self {
            branding_text: config.branding_text.clone(),
            font_size: config.font_size,
            font_color: config.font_color.clone(),
            bottom_margin: config.bottom_margin,
            intro: optional(&config.intro)?,
            outro: optional(&config.outro)?,
            music: optional(&config.music)?,
            music_volume: config.music_volume,
            width: config.width,
            height: config.height,
        })
    }
}
