//! Canonicalization batch driver.
//!
//! Selects due rows from the store, resolves each tracking URL, feeds the
//! result through the retry state machine, and commits the whole batch of
//! outcomes at once. Sequential by design: one HTTP round trip at a time
//! with a jittered politeness pause between items.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::resolver::UrlResolver;
use crate::retry::{self, CanonicalOutcome};
use crate::traits::store::HitStore;
use crate::types::config::EnrichConfig;
use crate::types::hit::CanonicalStatus;

/// Counters from one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Rows resolved to a canonical URL
    pub ok: usize,

    /// Rows scheduled for another attempt
    pub retried: usize,

    /// Rows failed terminally
    pub errored: usize,

    /// Rows selected for this batch
    pub selected: usize,
}

/// Cumulative counters from a full enrichment run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichResult {
    /// Rows resolved to a canonical URL
    pub ok: usize,

    /// Rows scheduled for another attempt
    pub retried: usize,

    /// Rows failed terminally
    pub errored: usize,

    /// Batches processed
    pub batches: usize,
}

impl EnrichResult {
    fn absorb(&mut self, batch: BatchStats) {
        self.ok += batch.ok;
        self.retried += batch.retried;
        self.errored += batch.errored;
        self.batches += 1;
    }
}

/// Process one batch of due rows.
///
/// Per-row failures become state-machine outcomes and never abort the
/// batch; all outcomes commit together at the end. Only a storage failure
/// propagates, in which case nothing from the batch is persisted.
pub async fn run_enrich_batch<S: HitStore>(
    store: &S,
    resolver: &UrlResolver,
    config: &EnrichConfig,
) -> Result<BatchStats> {
    let due = store
        .batch_due_for_canonicalization(config.batch_size, config.attempt_ceiling, Utc::now())
        .await?;

    let mut stats = BatchStats {
        selected: due.len(),
        ..Default::default()
    };
    if due.is_empty() {
        return Ok(stats);
    }
    debug!(selected = due.len(), "Enrichment batch selected");

    let mut outcomes = Vec::with_capacity(due.len());
    for row in &due {
        let outcome = if row.tracking_url.trim().is_empty() {
            CanonicalOutcome::blank_url()
        } else {
            retry::outcome_for(resolver.resolve(&row.tracking_url).await)
        };

        match outcome.status() {
            CanonicalStatus::Ok => stats.ok += 1,
            CanonicalStatus::Retry => {
                warn!(hit_id = row.hit_id, url = %row.tracking_url, "Retryable resolution failure");
                stats.retried += 1;
            }
            _ => {
                info!(hit_id = row.hit_id, url = %row.tracking_url, "Unresolvable tracking URL");
                stats.errored += 1;
            }
        }

        let after_retry = outcome.status() == CanonicalStatus::Retry;
        outcomes.push((row.hit_id, outcome));
        tokio::time::sleep(config.politeness_delay(after_retry)).await;
    }

    store.apply_outcomes(&outcomes, Utc::now()).await?;
    Ok(stats)
}

/// Drain the canonicalization queue, batch by batch.
///
/// Stops when a batch selects zero rows or the configured batch ceiling is
/// reached. Returns cumulative counters.
pub async fn run_enrich_all<S: HitStore>(
    store: &S,
    resolver: &UrlResolver,
    config: &EnrichConfig,
) -> Result<EnrichResult> {
    let total = store
        .count_due_for_canonicalization(config.attempt_ceiling, Utc::now())
        .await?;
    if total == 0 {
        info!("Enrichment: queue is empty, nothing to do");
        return Ok(EnrichResult::default());
    }
    info!(total, "Enrichment starting");

    let mut result = EnrichResult::default();
    loop {
        if let Some(max) = config.max_batches {
            if result.batches >= max {
                break;
            }
        }

        let batch = run_enrich_batch(store, resolver, config).await?;
        if batch.selected == 0 {
            break;
        }
        result.absorb(batch);

        info!(
            batch = result.batches - 1,
            ok = batch.ok,
            retry = batch.retried,
            error = batch.errored,
            "Enrichment batch complete"
        );
    }

    info!(
        ok = result.ok,
        retry = result.retried,
        error = result.errored,
        batches = result.batches,
        "Enrichment finished"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryHitStore;
    use crate::types::hit::JobHit;
    use std::time::Duration;

    fn test_config() -> EnrichConfig {
        EnrichConfig::default().without_delays()
    }

    fn unreachable_resolver() -> UrlResolver {
        UrlResolver::with_timeout(Duration::from_millis(300))
    }

    #[tokio::test]
    async fn test_empty_queue_is_noop() {
        let store = MemoryHitStore::new();
        let result = run_enrich_all(&store, &unreachable_resolver(), &test_config())
            .await
            .unwrap();
        assert_eq!(result, EnrichResult::default());
    }

    #[tokio::test]
    async fn test_connection_failure_schedules_retry() {
        let store = MemoryHitStore::new();
        // Nothing listens on this port; the connection is refused.
        store
            .upsert_hits("m1", "seek", &[JobHit::new("http://127.0.0.1:9/x")])
            .await
            .unwrap();

        let before = Utc::now();
        let batch = run_enrich_batch(&store, &unreachable_resolver(), &test_config())
            .await
            .unwrap();

        assert_eq!(batch.selected, 1);
        assert_eq!(batch.retried, 1);

        let row = store.hits_for_message("m1").pop().unwrap();
        assert_eq!(row.canonical_status, CanonicalStatus::Retry);
        assert_eq!(row.attempt_count, 1);
        assert!(row.next_retry_at.unwrap() > before);
        assert!(row.canon_error.is_some());
    }

    #[tokio::test]
    async fn test_retried_row_not_reselected_until_due() {
        let store = MemoryHitStore::new();
        store
            .upsert_hits("m1", "seek", &[JobHit::new("http://127.0.0.1:9/x")])
            .await
            .unwrap();

        let config = test_config();
        let resolver = unreachable_resolver();
        run_enrich_batch(&store, &resolver, &config).await.unwrap();

        // The retry deadline is minutes away; the queue reads as drained.
        let batch = run_enrich_batch(&store, &resolver, &config).await.unwrap();
        assert_eq!(batch.selected, 0);

        let result = run_enrich_all(&store, &resolver, &config).await.unwrap();
        assert_eq!(result.batches, 0);
    }

    #[tokio::test]
    async fn test_run_respects_max_batches() {
        let store = MemoryHitStore::new();
        let hits: Vec<JobHit> = (0..4)
            .map(|i| JobHit::new(format!("http://127.0.0.1:9/{i}")))
            .collect();
        store.upsert_hits("m1", "seek", &hits).await.unwrap();

        let config = test_config().with_batch_size(1).with_max_batches(2);
        let result = run_enrich_all(&store, &unreachable_resolver(), &config)
            .await
            .unwrap();

        assert_eq!(result.batches, 2);
        assert_eq!(result.retried, 2);

        // The two untouched rows are still pending.
        let pending = store
            .hits_for_message("m1")
            .into_iter()
            .filter(|r| r.canonical_status == CanonicalStatus::Pending)
            .count();
        assert_eq!(pending, 2);
    }
}
