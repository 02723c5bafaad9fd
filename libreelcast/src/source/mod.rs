//! Candidate sources
//!
//! A candidate source lists a creator's public posts, newest first as the
//! platform presents them. The repost pipeline picks the first one that is not
//! in the ledger, so the order returned here is the order of preference.

use async_trait::async_trait;

use crate::error::AcquisitionError;
use crate::types::{CandidateItem, Creator};

pub mod profile;

pub use profile::ProfileScraper;

#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// List candidate items for `creator`, in preference order
    ///
    /// An account that loads but has no posts yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns `AcquisitionError` if the source is unreachable, the session was
    /// refused, or the response cannot be parsed.
    async fn fetch_candidates(
        &self,
        creator: &Creator,
    ) -> Result<Vec<CandidateItem>, AcquisitionError>;

    fn name(&self) -> &str;
}
