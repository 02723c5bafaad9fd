//! Scriptable collaborators for exercising the repost pipeline
//!
//! Each mock shares its recorded calls through `Arc<Mutex<..>>`, so a test
//! keeps a clone and hands the other to the pipeline. Nothing here touches the
//! network or spawns processes.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::caption::CaptionGenerator;
use crate::error::{AcquisitionError, CaptionError, PublishError, TransformError};
use crate::media::{MediaAcquirer, MediaTransformer, StyleConfig};
use crate::platforms::Publisher;
use crate::source::CandidateSource;
use crate::types::{CandidateItem, Creator, ProcessedMedia, RawMedia};

/// Candidate lists keyed by creator; unknown creators have no posts
#[derive(Clone, Default)]
pub struct MockSource {
    responses: Arc<Mutex<HashMap<Creator, Result<Vec<CandidateItem>, AcquisitionError>>>>,
    fetched: Arc<Mutex<Vec<Creator>>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve items with the given ids, in order
    pub fn with_items(self, creator: &str, ids: &[&str]) -> Self {
        let items = ids
            .iter()
            .map(|id| CandidateItem::new(*id, format!("mock://{}/{}", creator, id)))
            .collect();
        self.responses
            .lock()
            .unwrap()
            .insert(Creator::new(creator), Ok(items));
        self
    }

    pub fn with_error(self, creator: &str, error: AcquisitionError) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(Creator::new(creator), Err(error));
        self
    }

    /// Creators fetched so far, in call order
    pub fn fetched(&self) -> Vec<Creator> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl CandidateSource for MockSource {
    async fn fetch_candidates(
        &self,
        creator: &Creator,
    ) -> Result<Vec<CandidateItem>, AcquisitionError> {
        self.fetched.lock().unwrap().push(creator.clone());
        self.responses
            .lock()
            .unwrap()
            .get(creator)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Writes a small placeholder file for every locator
#[derive(Clone, Default)]
pub struct MockAcquirer {
    error: Option<AcquisitionError>,
    locators: Arc<Mutex<Vec<String>>>,
}

impl MockAcquirer {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn failure(error: AcquisitionError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.locators.lock().unwrap().len()
    }

    pub fn locators(&self) -> Vec<String> {
        self.locators.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaAcquirer for MockAcquirer {
    async fn acquire(&self, locator: &str, dest: &Path) -> Result<RawMedia, AcquisitionError> {
        self.locators.lock().unwrap().push(locator.to_string());
        if let Some(error) = &self.error {
            return Err(error.clone());
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AcquisitionError::Io(e.to_string()))?;
        }
        tokio::fs::write(dest, format!("raw:{}", locator))
            .await
            .map_err(|e| AcquisitionError::Io(e.to_string()))?;
        Ok(RawMedia::new(dest))
    }
}

/// Copies the raw file to the destination, or fails
#[derive(Clone, Default)]
pub struct MockTransformer {
    error: Option<TransformError>,
    calls: Arc<Mutex<usize>>,
}

impl MockTransformer {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn failure(error: TransformError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl MediaTransformer for MockTransformer {
    async fn transform(
        &self,
        raw: &RawMedia,
        _style: &StyleConfig,
        dest: &Path,
    ) -> Result<ProcessedMedia, TransformError> {
        *self.calls.lock().unwrap() += 1;
        if let Some(error) = &self.error {
            return Err(error.clone());
        }

        tokio::fs::copy(&raw.path, dest)
            .await
            .map_err(|e| TransformError::Io(e.to_string()))?;
        Ok(ProcessedMedia::new(dest))
    }
}

#[derive(Clone)]
pub struct MockCaptioner {
    result: Result<String, CaptionError>,
    topics: Arc<Mutex<Vec<String>>>,
}

impl MockCaptioner {
    pub fn success(text: &str) -> Self {
        Self {
            result: Ok(text.to_string()),
            topics: Arc::default(),
        }
    }

    pub fn failure(error: CaptionError) -> Self {
        Self {
            result: Err(error),
            topics: Arc::default(),
        }
    }

    /// Topic hints received so far
    pub fn topics(&self) -> Vec<String> {
        self.topics.lock().unwrap().clone()
    }
}

#[async_trait]
impl CaptionGenerator for MockCaptioner {
    async fn generate(&self, topic_hint: &str) -> Result<String, CaptionError> {
        self.topics.lock().unwrap().push(topic_hint.to_string());
        self.result.clone()
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// One call to [`MockPublisher::publish`]
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedPost {
    pub media: PathBuf,
    pub caption: String,
    /// Whether the media file existed when publish was called
    pub media_existed: bool,
}

/// Returns fresh uuids as post ids, or a scripted error
#[derive(Clone, Default)]
pub struct MockPublisher {
    error: Option<PublishError>,
    posts: Arc<Mutex<Vec<PublishedPost>>>,
}

impl MockPublisher {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn failure(error: PublishError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }

    pub fn posts(&self) -> Vec<PublishedPost> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    async fn publish(&self, media: &ProcessedMedia, caption: &str) -> Result<String, PublishError> {
        self.posts.lock().unwrap().push(PublishedPost {
            media: media.path().to_path_buf(),
            caption: caption.to_string(),
            media_existed: media.path().exists(),
        });

        match &self.error {
            Some(error) => Err(error.clone()),
            None => Ok(uuid::Uuid::new_v4().to_string()),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
