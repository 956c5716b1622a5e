//! In-memory storage implementation for testing and development.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{EngineError, Result};
use crate::retry::{self, CanonicalOutcome};
use crate::traits::store::{DueHit, HitStore};
use crate::types::hit::{CanonicalStatus, JobHit, StoredHit};
use crate::types::message::MessageOutcome;

/// In-memory hit store.
///
/// Useful for testing and development. Not suitable for production as
/// data is lost on restart.
pub struct MemoryHitStore {
    hits: RwLock<Vec<StoredHit>>,
    messages: RwLock<HashMap<String, MessageOutcome>>,
    next_id: AtomicI64,
}

impl Default for MemoryHitStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHitStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            hits: RwLock::new(Vec::new()),
            messages: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Number of stored hits.
    pub fn hit_count(&self) -> usize {
        self.hits.read().unwrap().len()
    }

    /// Number of recorded message outcomes.
    pub fn message_count(&self) -> usize {
        self.messages.read().unwrap().len()
    }

    /// All hits for a message (tests).
    pub fn hits_for_message(&self, message_id: &str) -> Vec<StoredHit> {
        self.hits
            .read()
            .unwrap()
            .iter()
            .filter(|h| h.message_id == message_id)
            .cloned()
            .collect()
    }

    /// The recorded outcome for a message (tests).
    pub fn message_outcome(&self, message_id: &str) -> Option<MessageOutcome> {
        self.messages.read().unwrap().get(message_id).cloned()
    }
}

fn is_due(row: &StoredHit, attempt_ceiling: u32, now: DateTime<Utc>) -> bool {
    matches!(
        row.canonical_status,
        CanonicalStatus::Pending | CanonicalStatus::Retry
    ) && row.attempt_count < attempt_ceiling
        && row.next_retry_at.map_or(true, |t| t <= now)
        && !row.hit.tracking_url.trim().is_empty()
}

/// Apply one attempt outcome to a row (shared transition semantics).
pub(crate) fn apply_outcome_to(row: &mut StoredHit, outcome: &CanonicalOutcome, now: DateTime<Utc>) {
    row.attempt_count += 1;
    row.last_attempt_at = Some(now);

    match outcome {
        CanonicalOutcome::Ok {
            job_id,
            canonical_url,
            http_status,
        } => {
            row.canonical_status = CanonicalStatus::Ok;
            row.canonical_url = Some(canonical_url.clone());
            row.resolved_job_id = Some(job_id.clone());
            row.http_status = Some(*http_status);
            row.canon_error = None;
            row.next_retry_at = None;
        }
        CanonicalOutcome::Retry { http_status, error } => {
            row.canonical_status = CanonicalStatus::Retry;
            row.canonical_url = None;
            row.resolved_job_id = None;
            row.http_status = *http_status;
            row.canon_error = Some(error.clone());
            row.next_retry_at = Some(retry::next_retry_at(now, row.attempt_count));
        }
        CanonicalOutcome::Error { http_status, error } => {
            row.canonical_status = CanonicalStatus::Error;
            row.canonical_url = None;
            row.resolved_job_id = None;
            row.http_status = *http_status;
            row.canon_error = Some(error.clone());
            row.next_retry_at = None;
        }
    }
}

#[async_trait]
impl HitStore for MemoryHitStore {
    async fn upsert_hits(
        &self,
        message_id: &str,
        source: &str,
        hits: &[JobHit],
    ) -> Result<usize> {
        let mut rows = self.hits.write().unwrap();
        for hit in hits {
            if let Some(existing) = rows
                .iter_mut()
                .find(|r| r.message_id == message_id && r.hit.tracking_url == hit.tracking_url)
            {
                existing.source = source.to_string();
                existing.hit = hit.clone();
            } else {
                rows.push(StoredHit {
                    hit_id: self.next_id.fetch_add(1, Ordering::SeqCst),
                    message_id: message_id.to_string(),
                    source: source.to_string(),
                    hit: hit.clone(),
                    canonical_status: CanonicalStatus::Pending,
                    canonical_url: None,
                    resolved_job_id: None,
                    http_status: None,
                    attempt_count: 0,
                    next_retry_at: None,
                    last_attempt_at: None,
                    canon_error: None,
                    created_at: Utc::now(),
                });
            }
        }
        Ok(hits.len())
    }

    async fn record_message_outcome(&self, outcome: &MessageOutcome) -> Result<()> {
        self.messages
            .write()
            .unwrap()
            .insert(outcome.message_id.clone(), outcome.clone());
        Ok(())
    }

    async fn batch_due_for_canonicalization(
        &self,
        limit: usize,
        attempt_ceiling: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<DueHit>> {
        let rows = self.hits.read().unwrap();
        let mut due: Vec<&StoredHit> = rows
            .iter()
            .filter(|r| is_due(r, attempt_ceiling, now))
            .collect();

        due.sort_by_key(|r| (r.attempt_count > 0, r.next_retry_at, r.hit_id));

        Ok(due
            .into_iter()
            .take(limit)
            .map(|r| DueHit {
                hit_id: r.hit_id,
                tracking_url: r.hit.tracking_url.clone(),
            })
            .collect())
    }

    async fn count_due_for_canonicalization(
        &self,
        attempt_ceiling: u32,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let rows = self.hits.read().unwrap();
        Ok(rows.iter().filter(|r| is_due(r, attempt_ceiling, now)).count())
    }

    async fn apply_outcomes(
        &self,
        outcomes: &[(i64, CanonicalOutcome)],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut rows = self.hits.write().unwrap();

        // Validate before mutating so the batch applies all-or-nothing.
        for (hit_id, _) in outcomes {
            if !rows.iter().any(|r| r.hit_id == *hit_id) {
                return Err(EngineError::Storage(
                    format!("hit {hit_id} not found while applying outcome").into(),
                ));
            }
        }

        for (hit_id, outcome) in outcomes {
            if let Some(row) = rows.iter_mut().find(|r| r.hit_id == *hit_id) {
                apply_outcome_to(row, outcome, now);
            }
        }
        Ok(())
    }

    async fn get_hit(&self, hit_id: i64) -> Result<Option<StoredHit>> {
        Ok(self
            .hits
            .read()
            .unwrap()
            .iter()
            .find(|r| r.hit_id == hit_id)
            .cloned())
    }
}
