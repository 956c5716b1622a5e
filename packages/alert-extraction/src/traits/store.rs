//! Storage trait for extracted hits and their canonicalization state.
//!
//! The store is the single shared mutable resource: the parse runner
//! writes extracted records, the batch driver is the sole writer of the
//! canonicalization fields. Implementations must make `apply_outcomes`
//! atomic per call; that is the whole crash-safety story, since a restart
//! simply re-runs batch selection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::retry::CanonicalOutcome;
use crate::types::hit::{JobHit, StoredHit};
use crate::types::message::MessageOutcome;

/// A hit selected for canonicalization.
#[derive(Debug, Clone)]
pub struct DueHit {
    /// Row identifier
    pub hit_id: i64,

    /// Tracking URL to resolve
    pub tracking_url: String,
}

/// Persistence contract for job hits and parse bookkeeping.
#[async_trait]
pub trait HitStore: Send + Sync {
    /// Idempotently upsert hits for a message, keyed on
    /// `(message_id, tracking_url)`.
    ///
    /// On conflict the extracted fields are overwritten with the latest
    /// values; the canonicalization state is left untouched. Returns the
    /// number of hits written.
    async fn upsert_hits(&self, message_id: &str, source: &str, hits: &[JobHit])
        -> Result<usize>;

    /// Record the aggregate parse outcome for a message (latest wins).
    async fn record_message_outcome(&self, outcome: &MessageOutcome) -> Result<()>;

    /// Select one batch of rows due for canonicalization.
    ///
    /// Eligible rows have status pending or retry, fewer than
    /// `attempt_ceiling` attempts, a due (or absent) `next_retry_at`, and a
    /// non-blank tracking URL. Never-attempted rows come first
    /// (oldest-created first), then retries by ascending `next_retry_at`,
    /// with the row id as the final tie-break.
    async fn batch_due_for_canonicalization(
        &self,
        limit: usize,
        attempt_ceiling: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<DueHit>>;

    /// Count rows currently due for canonicalization.
    async fn count_due_for_canonicalization(
        &self,
        attempt_ceiling: u32,
        now: DateTime<Utc>,
    ) -> Result<usize>;

    /// Atomically apply one batch of attempt outcomes.
    ///
    /// For every row: `attempt_count` increments and `last_attempt_at` is
    /// set to `now`, regardless of outcome. Field semantics per outcome:
    /// ok sets the canonical URL and job id and clears the error and retry
    /// deadline; retry sets `next_retry_at` from the backoff schedule;
    /// error clears the retry deadline. Either all mutations commit or
    /// none do.
    async fn apply_outcomes(
        &self,
        outcomes: &[(i64, CanonicalOutcome)],
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Read one stored hit back (inspection and tests).
    async fn get_hit(&self, hit_id: i64) -> Result<Option<StoredHit>>;
}
