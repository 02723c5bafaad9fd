//! Reelcast - repost short-form videos without reposting twice
//!
//! A cycle picks a creator, finds their newest post that is not in the repost
//! ledger, downloads and brands it, captions it, publishes it, and records it.
//! The [`Scheduler`] runs cycles once or on a fixed interval.

pub mod caption;
pub mod config;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod media;
pub mod mock;
pub mod pipeline;
pub mod platforms;
pub mod scheduler;
pub mod session;
pub mod source;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{ErrorKind, ReelcastError, Result};
pub use ledger::{Ledger, LedgerStore};
pub use pipeline::{Collaborators, PipelineSettings, RepostPipeline};
pub use scheduler::{RunSummary, Scheduler, Shutdown};
pub use types::{CandidateItem, Creator, CycleOutcome, Stage};
