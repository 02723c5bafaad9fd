//! The repost cycle
//!
//! One cycle walks the stages in [`Stage`] order: pick a creator, list their
//! posts, pick the first one not in the ledger, download it, edit it, caption
//! it, publish it, and finally record it. The first failing stage ends the
//! cycle with [`CycleOutcome::Failed`].
//!
//! The ledger is only written in the commit stage, and commit only runs after
//! the publisher returned a post id. A crash between the two can repost an
//! item on the next cycle, but an unpublished item is never recorded.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::caption::{compose_caption, create_generator, CaptionGenerator};
use crate::config::{expand_path, Config};
use crate::error::{ConfigError, ReelcastError, Result};
use crate::ledger::{Ledger, LedgerStore};
use crate::media::{FfmpegTransformer, HttpMediaAcquirer, MediaAcquirer, MediaTransformer, StyleConfig};
use crate::platforms::{create_publisher, Publisher};
use crate::scheduler::Shutdown;
use crate::source::{CandidateSource, ProfileScraper};
use crate::types::{CandidateItem, Creator, CycleOutcome, ProcessedMedia, RawMedia, Stage};

/// The external systems a cycle talks to
pub struct Collaborators {
    pub source: Box<dyn CandidateSource>,
    pub acquirer: Box<dyn MediaAcquirer>,
    pub transformer: Box<dyn MediaTransformer>,
    pub captioner: Box<dyn CaptionGenerator>,
    pub publisher: Box<dyn Publisher>,
}

impl Collaborators {
    /// Build the real implementations selected by `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            source: Box::new(ProfileScraper::from_config(&config.source)?),
            acquirer: Box::new(HttpMediaAcquirer::from_config(&config.source)?),
            transformer: Box::new(FfmpegTransformer::new(config.media.ffmpeg.clone())),
            captioner: create_generator(&config.caption)?,
            publisher: create_publisher(&config.publisher)?,
        })
    }
}

/// Per-cycle settings that do not change between cycles
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub creators: Vec<Creator>,
    pub style: StyleConfig,
    /// Credit line placed above the generated caption; `{creator}` is replaced
    pub caption_prefix: String,
    pub work_dir: PathBuf,
    pub keep_artifacts: bool,
    /// Pause after a successful commit before the cycle returns
    pub publish_cooldown: Duration,
}

impl PipelineSettings {
    pub fn new(creators: Vec<Creator>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            creators,
            style: StyleConfig::default(),
            caption_prefix: String::new(),
            work_dir: work_dir.into(),
            keep_artifacts: false,
            publish_cooldown: Duration::ZERO,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            creators: config.creators(),
            style: StyleConfig::from_config(&config.media)?,
            caption_prefix: config.caption.prefix.clone(),
            work_dir: expand_path(&config.media.work_dir)?,
            keep_artifacts: config.media.keep_artifacts,
            publish_cooldown: config.scheduling.publish_cooldown()?,
        })
    }
}

/// What a cycle has produced so far, once an item is chosen
///
/// Stages take the state by value and hand back an extended copy.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleState {
    pub creator: Creator,
    pub item: CandidateItem,
    pub raw_path: PathBuf,
    pub edited_path: PathBuf,
    pub raw: Option<RawMedia>,
    pub processed: Option<ProcessedMedia>,
    pub caption: Option<String>,
    pub platform_id: Option<String>,
}

impl CycleState {
    pub fn new(creator: Creator, item: CandidateItem, work_dir: &Path) -> Self {
        let stem = format!("{}_{}", sanitize(creator.as_str()), sanitize(&item.id));
        Self {
            raw_path: work_dir.join(format!("{}.mp4", stem)),
            edited_path: work_dir.join(format!("{}_edited.mp4", stem)),
            creator,
            item,
            raw: None,
            processed: None,
            caption: None,
            platform_id: None,
        }
    }

    /// Files a cycle may leave in the work directory
    pub fn artifacts(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.raw_path.clone(), self.edited_path.clone()];
        for produced in [
            self.raw.as_ref().map(|r| r.path.clone()),
            self.processed.as_ref().map(|p| p.path.clone()),
        ]
        .into_iter()
        .flatten()
        {
            if !paths.contains(&produced) {
                paths.push(produced);
            }
        }
        paths
    }
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Pick a creator uniformly at random
///
/// # Errors
///
/// `ConfigError::EmptyCreators` if there is nobody to pick.
pub fn choose_creator<'a, R: Rng + ?Sized>(
    creators: &'a [Creator],
    rng: &mut R,
) -> std::result::Result<&'a Creator, ConfigError> {
    creators.choose(rng).ok_or(ConfigError::EmptyCreators)
}

/// First candidate, in source order, that the ledger has not seen for `creator`
pub fn select_item<'a>(
    ledger: &Ledger,
    creator: &Creator,
    candidates: &'a [CandidateItem],
) -> Option<&'a CandidateItem> {
    candidates
        .iter()
        .find(|item| !ledger.contains(creator, &item.id))
}

fn failed_at(stage: Stage) -> impl Fn(ReelcastError) -> CycleOutcome {
    move |error| CycleOutcome::failed(stage, &error)
}

fn out_of_order(stage: Stage, missing: &str) -> ReelcastError {
    ReelcastError::InvalidInput(format!("{} stage reached without {}", stage, missing))
}

pub struct RepostPipeline {
    collaborators: Collaborators,
    settings: PipelineSettings,
    store: LedgerStore,
    ledger: Ledger,
    rng: StdRng,
    shutdown: Shutdown,
    cycles: u64,
}

impl RepostPipeline {
    /// Create a pipeline, loading the ledger from `store`
    ///
    /// # Errors
    ///
    /// `PersistenceError` if the ledger file exists but cannot be read or parsed.
    pub fn new(
        collaborators: Collaborators,
        settings: PipelineSettings,
        store: LedgerStore,
    ) -> Result<Self> {
        let ledger = store.load()?;
        info!(
            path = %store.path().display(),
            entries = ledger.len(),
            "Ledger loaded"
        );

        Ok(Self {
            collaborators,
            settings,
            store,
            ledger,
            rng: StdRng::from_entropy(),
            shutdown: Shutdown::new(),
            cycles: 0,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let store = LedgerStore::new(expand_path(&config.ledger.path)?);
        Self::new(
            Collaborators::from_config(config)?,
            PipelineSettings::from_config(config)?,
            store,
        )
    }

    /// Make creator selection reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run one full cycle. Never panics and never returns an error: every
    /// failure is folded into the outcome.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.cycles += 1;
        let span = info_span!("cycle", cycle = self.cycles);

        async {
            let outcome = match self.execute().await {
                Ok(outcome) | Err(outcome) => outcome,
            };
            report(&outcome);
            outcome
        }
        .instrument(span)
        .await
    }

    async fn execute(&mut self) -> std::result::Result<CycleOutcome, CycleOutcome> {
        self.checkpoint(Stage::SelectCreator)?;
        let creator = choose_creator(&self.settings.creators, &mut self.rng)
            .map(Creator::clone)
            .map_err(|e| CycleOutcome::failed(Stage::SelectCreator, &ReelcastError::from(e)))?;
        info!(creator = %creator, "Selected creator");

        self.checkpoint(Stage::FetchCandidates)?;
        let candidates = self
            .fetch_candidates(&creator)
            .await
            .map_err(failed_at(Stage::FetchCandidates))?;

        self.checkpoint(Stage::SelectItem)?;
        let Some(item) = select_item(&self.ledger, &creator, &candidates).cloned() else {
            return Ok(CycleOutcome::NoNewContent { creator });
        };
        info!(creator = %creator, item_id = %item.id, "Selected item");

        let state = CycleState::new(creator, item, &self.settings.work_dir);
        let mut artifacts = state.artifacts();
        let result = self.produce(state, &mut artifacts).await;
        self.discard_artifacts(&artifacts).await;
        let state = result?;

        let outcome = CycleOutcome::Published {
            creator: state.creator,
            item_id: state.item.id,
            platform_id: state.platform_id.unwrap_or_default(),
        };

        if !self.settings.publish_cooldown.is_zero() {
            debug!(cooldown = %humantime::format_duration(self.settings.publish_cooldown), "Cooling down after publish");
            self.shutdown.sleep(self.settings.publish_cooldown).await;
        }

        Ok(outcome)
    }

    /// Acquire through commit. `artifacts` collects every file written on the way.
    async fn produce(
        &mut self,
        state: CycleState,
        artifacts: &mut Vec<PathBuf>,
    ) -> std::result::Result<CycleState, CycleOutcome> {
        let mut track = |state: &CycleState| {
            for path in state.artifacts() {
                if !artifacts.contains(&path) {
                    artifacts.push(path);
                }
            }
        };

        self.checkpoint(Stage::Acquire)?;
        let state = self.acquire(state).await.map_err(failed_at(Stage::Acquire))?;
        track(&state);

        self.checkpoint(Stage::Transform)?;
        let state = self
            .transform(state)
            .await
            .map_err(failed_at(Stage::Transform))?;
        track(&state);

        self.checkpoint(Stage::Caption)?;
        let state = self.caption(state).await.map_err(failed_at(Stage::Caption))?;

        self.checkpoint(Stage::Publish)?;
        let state = self.publish(state).await.map_err(failed_at(Stage::Publish))?;

        // Published: commit even if shutdown arrived meanwhile.
        self.commit(&state).map_err(failed_at(Stage::Commit))?;
        Ok(state)
    }

    fn checkpoint(&self, next: Stage) -> std::result::Result<(), CycleOutcome> {
        if self.shutdown.is_triggered() {
            return Err(CycleOutcome::Interrupted { before: next });
        }
        Ok(())
    }

    async fn fetch_candidates(&self, creator: &Creator) -> Result<Vec<CandidateItem>> {
        let candidates = self.collaborators.source.fetch_candidates(creator).await?;
        debug!(
            creator = %creator,
            source = self.collaborators.source.name(),
            count = candidates.len(),
            "Fetched candidates"
        );
        Ok(candidates)
    }

    async fn acquire(&self, state: CycleState) -> Result<CycleState> {
        if let Some(parent) = state.raw_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| crate::error::AcquisitionError::Io(e.to_string()))?;
        }

        let raw = self
            .collaborators
            .acquirer
            .acquire(&state.item.locator, &state.raw_path)
            .await?;
        debug!(path = %raw.path.display(), "Media acquired");

        Ok(CycleState {
            raw: Some(raw),
            ..state
        })
    }

    async fn transform(&self, state: CycleState) -> Result<CycleState> {
        let raw = state
            .raw
            .as_ref()
            .ok_or_else(|| out_of_order(Stage::Transform, "raw media"))?;

        let processed = self
            .collaborators
            .transformer
            .transform(raw, &self.settings.style, &state.edited_path)
            .await?;
        debug!(path = %processed.path.display(), "Media transformed");

        Ok(CycleState {
            processed: Some(processed),
            ..state
        })
    }

    async fn caption(&self, state: CycleState) -> Result<CycleState> {
        let body = self
            .collaborators
            .captioner
            .generate(state.creator.as_str())
            .await?;
        let caption = compose_caption(&self.settings.caption_prefix, state.creator.as_str(), &body);

        Ok(CycleState {
            caption: Some(caption),
            ..state
        })
    }

    async fn publish(&self, state: CycleState) -> Result<CycleState> {
        let processed = state
            .processed
            .as_ref()
            .ok_or_else(|| out_of_order(Stage::Publish, "processed media"))?;
        let caption = state.caption.as_deref().unwrap_or_default();

        let platform_id = self
            .collaborators
            .publisher
            .publish(processed, caption)
            .await?;
        info!(
            platform = self.collaborators.publisher.name(),
            platform_id = %platform_id,
            "Published"
        );

        Ok(CycleState {
            platform_id: Some(platform_id),
            ..state
        })
    }

    /// The only stage that touches durable state
    ///
    /// On a failed save the in-memory ledger keeps the entry, so later cycles
    /// still skip the item and the next successful save persists it.
    fn commit(&mut self, state: &CycleState) -> Result<()> {
        if state.platform_id.is_none() {
            return Err(out_of_order(Stage::Commit, "a publish result"));
        }

        if !self.ledger.record(&state.creator, &state.item.id) {
            debug!(item_id = %state.item.id, "Item already in ledger");
        }
        self.store.save(&self.ledger)?;
        debug!(path = %self.store.path().display(), "Ledger saved");
        Ok(())
    }

    async fn discard_artifacts(&self, artifacts: &[PathBuf]) {
        if self.settings.keep_artifacts {
            return;
        }
        for path in artifacts {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!(path = %path.display(), "Removed artifact"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Could not remove artifact"),
            }
        }
    }
}

fn report(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Published {
            creator,
            item_id,
            platform_id,
        } => info!(creator = %creator, item_id = %item_id, platform_id = %platform_id, "Cycle published"),
        CycleOutcome::NoNewContent { creator } => {
            info!(creator = %creator, "No new content")
        }
        CycleOutcome::Failed {
            stage,
            kind,
            message,
        } => warn!(stage = %stage, kind = %kind, "Cycle failed: {}", message),
        CycleOutcome::Interrupted { before } => info!(stage = %before, "Cycle interrupted"),
    }
}
