//! End-to-end repost cycles against mock collaborators

use libreelcast::error::{AcquisitionError, CaptionError, ErrorKind, PublishError, TransformError};
use libreelcast::media::{FfmpegTransformer, StyleConfig};
use libreelcast::mock::{MockAcquirer, MockCaptioner, MockPublisher, MockSource, MockTransformer};
use libreelcast::{
    Collaborators, Creator, CycleOutcome, Ledger, LedgerStore, PipelineSettings, RepostPipeline,
    Shutdown, Stage,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Harness {
    dir: TempDir,
    source: MockSource,
    acquirer: MockAcquirer,
    transformer: MockTransformer,
    captioner: MockCaptioner,
    publisher: MockPublisher,
    keep_artifacts: bool,
}

impl Harness {
    fn new(source: MockSource) -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            source,
            acquirer: MockAcquirer::success(),
            transformer: MockTransformer::success(),
            captioner: MockCaptioner::success("#bgmi #gaming"),
            publisher: MockPublisher::success(),
            keep_artifacts: false,
        }
    }

    fn ledger_path(&self) -> PathBuf {
        self.dir.path().join("progress.json")
    }

    fn work_dir(&self) -> PathBuf {
        self.dir.path().join("work")
    }

    fn seed_ledger(&self, contents: &str) {
        fs::write(self.ledger_path(), contents).unwrap();
    }

    fn pipeline(&self, creators: &[&str]) -> RepostPipeline {
        let collaborators = Collaborators {
            source: Box::new(self.source.clone()),
            acquirer: Box::new(self.acquirer.clone()),
            transformer: Box::new(self.transformer.clone()),
            captioner: Box::new(self.captioner.clone()),
            publisher: Box::new(self.publisher.clone()),
        };

        let mut settings = PipelineSettings::new(
            creators.iter().map(|c| Creator::new(*c)).collect(),
            self.work_dir(),
        );
        settings.caption_prefix = "Repost from @{creator}".to_string();
        settings.keep_artifacts = self.keep_artifacts;

        RepostPipeline::new(collaborators, settings, LedgerStore::new(self.ledger_path()))
            .unwrap()
            .with_seed(42)
    }

    fn saved_ledger(&self) -> Ledger {
        LedgerStore::new(self.ledger_path()).load().unwrap()
    }
}

fn work_files(dir: &Path) -> Vec<PathBuf> {
    match fs::read_dir(dir) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
async fn test_first_unseen_item_is_published_and_recorded() {
    let harness = Harness::new(MockSource::new().with_items("alice", &["id1", "id2"]));
    harness.seed_ledger(r#"{"alice": ["id1"]}"#);

    let mut pipeline = harness.pipeline(&["alice"]);
    let outcome = pipeline.run_cycle().await;

    match &outcome {
        CycleOutcome::Published {
            creator, item_id, ..
        } => {
            assert_eq!(creator.as_str(), "alice");
            assert_eq!(item_id, "id2");
        }
        other => panic!("Expected Published, got {}", other),
    }

    let alice = Creator::new("alice");
    assert_eq!(harness.saved_ledger().items(&alice), ["id1", "id2"]);
    assert_eq!(harness.acquirer.locators(), vec!["mock://alice/id2".to_string()]);
    assert_eq!(outcome.exit_code(), 0);
}

#[tokio::test]
async fn test_all_seen_is_no_new_content() {
    let harness = Harness::new(MockSource::new().with_items("alice", &["id1", "id2"]));
    harness.seed_ledger(r#"{"alice": ["id1", "id2"]}"#);
    let before = fs::read(harness.ledger_path()).unwrap();

    let mut pipeline = harness.pipeline(&["alice"]);
    let outcome = pipeline.run_cycle().await;

    assert_eq!(
        outcome,
        CycleOutcome::NoNewContent {
            creator: Creator::new("alice")
        }
    );
    assert!(!outcome.is_failure());
    assert_eq!(fs::read(harness.ledger_path()).unwrap(), before);
    assert_eq!(harness.acquirer.call_count(), 0);
    assert_eq!(harness.publisher.call_count(), 0);
}

#[tokio::test]
async fn test_publish_failure_leaves_ledger_untouched() {
    let mut harness = Harness::new(MockSource::new().with_items("alice", &["id1", "id2"]));
    harness.publisher = MockPublisher::failure(PublishError::Rejected("video too long".into()));
    harness.seed_ledger(r#"{"alice": ["id1"]}"#);
    let before = fs::read(harness.ledger_path()).unwrap();

    let mut pipeline = harness.pipeline(&["alice"]);
    let outcome = pipeline.run_cycle().await;

    match &outcome {
        CycleOutcome::Failed {
            stage,
            kind,
            message,
        } => {
            assert_eq!(*stage, Stage::Publish);
            assert_eq!(*kind, ErrorKind::PublishError);
            assert!(message.contains("video too long"));
        }
        other => panic!("Expected Failed, got {}", other),
    }
    assert_eq!(fs::read(harness.ledger_path()).unwrap(), before);
    assert!(!pipeline.ledger().contains(&Creator::new("alice"), "id2"));
}

#[tokio::test]
async fn test_always_failing_publisher_never_creates_ledger() {
    let mut harness = Harness::new(MockSource::new().with_items("alice", &["id1"]));
    harness.publisher = MockPublisher::failure(PublishError::Network("reset".into()));

    let mut pipeline = harness.pipeline(&["alice"]);
    for _ in 0..3 {
        assert!(pipeline.run_cycle().await.is_failure());
    }

    assert!(!harness.ledger_path().exists());
    assert_eq!(harness.publisher.call_count(), 3);
}

#[tokio::test]
async fn test_auth_challenge_is_distinct_kind() {
    let mut harness = Harness::new(MockSource::new().with_items("alice", &["id1"]));
    harness.publisher =
        MockPublisher::failure(PublishError::AuthChallenge("challenge_required".into()));

    let outcome = harness.pipeline(&["alice"]).run_cycle().await;

    match outcome {
        CycleOutcome::Failed { kind, .. } => assert_eq!(kind, ErrorKind::AuthChallenge),
        other => panic!("Expected Failed, got {}", other),
    }
}

#[tokio::test]
async fn test_missing_intro_passes_media_through() {
    let harness = Harness::new(MockSource::new().with_items("alice", &["id1"]));
    let collaborators = Collaborators {
        source: Box::new(harness.source.clone()),
        acquirer: Box::new(harness.acquirer.clone()),
        // Never spawned: an empty plan short-circuits before ffmpeg runs.
        transformer: Box::new(FfmpegTransformer::new("/nonexistent/ffmpeg")),
        captioner: Box::new(harness.captioner.clone()),
        publisher: Box::new(harness.publisher.clone()),
    };
    let mut settings = PipelineSettings::new(vec![Creator::new("alice")], harness.work_dir());
    settings.style = StyleConfig {
        intro: Some(harness.dir.path().join("missing_intro.mp4")),
        ..StyleConfig::default()
    };

    let mut pipeline =
        RepostPipeline::new(collaborators, settings, LedgerStore::new(harness.ledger_path()))
            .unwrap();
    let outcome = pipeline.run_cycle().await;

    assert!(matches!(outcome, CycleOutcome::Published { .. }), "{}", outcome);
    let posts = harness.publisher.posts();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].media, harness.work_dir().join("alice_id1.mp4"));
    assert!(posts[0].media_existed);
}

#[tokio::test]
async fn test_empty_candidate_list_is_no_new_content() {
    let harness = Harness::new(MockSource::new().with_items("alice", &[]));

    let outcome = harness.pipeline(&["alice"]).run_cycle().await;

    assert_eq!(
        outcome,
        CycleOutcome::NoNewContent {
            creator: Creator::new("alice")
        }
    );
    assert!(!harness.ledger_path().exists());
}

#[tokio::test]
async fn test_source_failure_aborts_at_fetch() {
    let harness = Harness::new(
        MockSource::new().with_error("alice", AcquisitionError::SessionExpired("login".into())),
    );

    let outcome = harness.pipeline(&["alice"]).run_cycle().await;

    match outcome {
        CycleOutcome::Failed { stage, kind, .. } => {
            assert_eq!(stage, Stage::FetchCandidates);
            assert_eq!(kind, ErrorKind::AcquisitionError);
        }
        other => panic!("Expected Failed, got {}", other),
    }
    assert_eq!(harness.acquirer.call_count(), 0);
}

#[tokio::test]
async fn test_stage_failures_report_their_stage() {
    let mut harness = Harness::new(MockSource::new().with_items("alice", &["id1"]));
    harness.acquirer = MockAcquirer::failure(AcquisitionError::MissingMedia("no video".into()));
    let outcome = harness.pipeline(&["alice"]).run_cycle().await;
    assert!(matches!(outcome, CycleOutcome::Failed { stage: Stage::Acquire, .. }));

    let mut harness = Harness::new(MockSource::new().with_items("alice", &["id1"]));
    harness.transformer = MockTransformer::failure(TransformError::Io("disk full".into()));
    let outcome = harness.pipeline(&["alice"]).run_cycle().await;
    assert!(matches!(outcome, CycleOutcome::Failed { stage: Stage::Transform, .. }));
    assert_eq!(harness.publisher.call_count(), 0);
}

#[tokio::test]
async fn test_caption_failure_aborts_before_publish() {
    let mut harness = Harness::new(MockSource::new().with_items("alice", &["id1"]));
    harness.captioner = MockCaptioner::failure(CaptionError::Unreachable("ollama down".into()));

    let outcome = harness.pipeline(&["alice"]).run_cycle().await;

    match outcome {
        CycleOutcome::Failed { stage, kind, .. } => {
            assert_eq!(stage, Stage::Caption);
            assert_eq!(kind, ErrorKind::CaptionError);
        }
        other => panic!("Expected Failed, got {}", other),
    }
    assert_eq!(harness.publisher.call_count(), 0);
}

#[tokio::test]
async fn test_caption_combines_credit_and_generated_text() {
    let harness = Harness::new(MockSource::new().with_items("gamezy.meme", &["id1"]));

    harness.pipeline(&["gamezy.meme"]).run_cycle().await;

    let posts = harness.publisher.posts();
    assert_eq!(posts[0].caption, "Repost from @gamezy.meme\n\n#bgmi #gaming");
    assert_eq!(harness.captioner.topics(), vec!["gamezy.meme".to_string()]);
}

#[tokio::test]
async fn test_consecutive_cycles_walk_the_candidate_list() {
    let harness = Harness::new(MockSource::new().with_items("alice", &["id1", "id2"]));
    let mut pipeline = harness.pipeline(&["alice"]);

    let first = pipeline.run_cycle().await;
    let second = pipeline.run_cycle().await;
    let third = pipeline.run_cycle().await;

    assert!(matches!(first, CycleOutcome::Published { ref item_id, .. } if item_id == "id1"));
    assert!(matches!(second, CycleOutcome::Published { ref item_id, .. } if item_id == "id2"));
    assert!(matches!(third, CycleOutcome::NoNewContent { .. }));
    assert_eq!(
        harness.saved_ledger().items(&Creator::new("alice")),
        ["id1", "id2"]
    );
}

#[tokio::test]
async fn test_artifacts_removed_after_cycle() {
    let harness = Harness::new(MockSource::new().with_items("alice", &["id1"]));

    harness.pipeline(&["alice"]).run_cycle().await;

    assert!(harness.publisher.posts()[0].media_existed);
    assert!(work_files(&harness.work_dir()).is_empty());
}

#[tokio::test]
async fn test_artifacts_removed_after_failure() {
    let mut harness = Harness::new(MockSource::new().with_items("alice", &["id1"]));
    harness.publisher = MockPublisher::failure(PublishError::Rejected("nope".into()));

    harness.pipeline(&["alice"]).run_cycle().await;

    assert!(work_files(&harness.work_dir()).is_empty());
}

#[tokio::test]
async fn test_keep_artifacts_leaves_files() {
    let mut harness = Harness::new(MockSource::new().with_items("alice", &["id1"]));
    harness.keep_artifacts = true;

    harness.pipeline(&["alice"]).run_cycle().await;

    let files = work_files(&harness.work_dir());
    assert!(files.contains(&harness.work_dir().join("alice_id1.mp4")));
    assert!(files.contains(&harness.work_dir().join("alice_id1_edited.mp4")));
}

#[tokio::test]
async fn test_unwritable_ledger_fails_commit_but_remembers_item() {
    let harness = Harness::new(MockSource::new().with_items("alice", &["id1"]));
    let mut pipeline = harness.pipeline(&["alice"]);
    // A directory in place of the ledger file makes the final rename fail.
    fs::create_dir_all(harness.ledger_path()).unwrap();

    let outcome = pipeline.run_cycle().await;

    match outcome {
        CycleOutcome::Failed { stage, kind, .. } => {
            assert_eq!(stage, Stage::Commit);
            assert_eq!(kind, ErrorKind::PersistenceError);
            assert_eq!(kind.exit_code(), 4);
        }
        other => panic!("Expected Failed, got {}", other),
    }
    assert_eq!(harness.publisher.call_count(), 1);
    assert!(pipeline.ledger().contains(&Creator::new("alice"), "id1"));

    // The in-memory ledger keeps the next cycle from reposting.
    let next = pipeline.run_cycle().await;
    assert!(matches!(next, CycleOutcome::NoNewContent { .. }));
    assert_eq!(harness.publisher.call_count(), 1);
}

#[tokio::test]
async fn test_corrupt_ledger_refuses_to_start() {
    let harness = Harness::new(MockSource::new());
    harness.seed_ledger("{ not json");

    let collaborators = Collaborators {
        source: Box::new(harness.source.clone()),
        acquirer: Box::new(harness.acquirer.clone()),
        transformer: Box::new(harness.transformer.clone()),
        captioner: Box::new(harness.captioner.clone()),
        publisher: Box::new(harness.publisher.clone()),
    };
    let settings = PipelineSettings::new(vec![Creator::new("alice")], harness.work_dir());

    let err = RepostPipeline::new(collaborators, settings, LedgerStore::new(harness.ledger_path()))
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::PersistenceError);
}

#[tokio::test]
async fn test_empty_creator_list_fails_select() {
    let harness = Harness::new(MockSource::new());

    let outcome = harness.pipeline(&[]).run_cycle().await;

    match outcome {
        CycleOutcome::Failed { stage, kind, .. } => {
            assert_eq!(stage, Stage::SelectCreator);
            assert_eq!(kind, ErrorKind::ConfigError);
        }
        other => panic!("Expected Failed, got {}", other),
    }
}

#[tokio::test]
async fn test_shutdown_interrupts_before_first_stage() {
    let harness = Harness::new(MockSource::new().with_items("alice", &["id1"]));
    let shutdown = Shutdown::new();
    shutdown.trigger();

    let mut pipeline = harness.pipeline(&["alice"]).with_shutdown(shutdown);
    let outcome = pipeline.run_cycle().await;

    assert_eq!(
        outcome,
        CycleOutcome::Interrupted {
            before: Stage::SelectCreator
        }
    );
    assert_eq!(outcome.exit_code(), 130);
    assert!(harness.source.fetched().is_empty());
}

#[tokio::test]
async fn test_seeded_creator_selection_covers_all_creators() {
    let harness = Harness::new(
        MockSource::new()
            .with_items("alice", &[])
            .with_items("bob", &[]),
    );
    let mut pipeline = harness.pipeline(&["alice", "bob"]);

    for _ in 0..40 {
        pipeline.run_cycle().await;
    }

    let fetched = harness.source.fetched();
    assert!(fetched.contains(&Creator::new("alice")));
    assert!(fetched.contains(&Creator::new("bob")));
}
