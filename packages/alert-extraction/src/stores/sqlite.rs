//! SQLite storage implementation.
//!
//! A file-based backend using SQLite. Hits live in one table keyed by
//! `(message_id, tracking_url)`; parse bookkeeping lives in a second
//! table keyed by message id. Outcome batches commit in one transaction,
//! which is what makes enrichment runs resumable after a crash.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;

use crate::error::{EngineError, Result};
use crate::retry::{self, CanonicalOutcome};
use crate::traits::store::{DueHit, HitStore};
use crate::types::hit::{CanonicalStatus, JobHit, SalaryPeriod, StoredHit};
use crate::types::message::{MessageOutcome, ParseStatus};

/// SQLite-backed hit store.
pub struct SqliteHitStore {
    pool: SqlitePool,
}

impl SqliteHitStore {
    /// Create a store with the given connection URL.
    ///
    /// # Example URLs
    /// - `sqlite::memory:` - In-memory database (ephemeral)
    /// - `sqlite:./alerts.db?mode=rwc` - File-based, create if not exists
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::with_pool_size(database_url, 5).await
    }

    /// Create an in-memory store (for testing).
    pub async fn in_memory() -> Result<Self> {
        // A single connection: each pooled connection would otherwise get
        // its own private in-memory database.
        Self::with_pool_size("sqlite::memory:", 1).await
    }

    async fn with_pool_size(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| EngineError::Storage(e.to_string().into()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                message_id       TEXT PRIMARY KEY,
                from_address     TEXT NOT NULL,
                parser_name      TEXT,
                parser_version   TEXT,
                parse_status     TEXT NOT NULL,
                parse_confidence INTEGER,
                hit_count        INTEGER NOT NULL DEFAULT 0,
                error            TEXT,
                parsed_at        TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Storage(e.to_string().into()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS job_hits (
                hit_id           INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id       TEXT NOT NULL,
                source           TEXT NOT NULL,
                title            TEXT,
                company          TEXT,
                suburb           TEXT,
                city             TEXT,
                state            TEXT,
                location_raw     TEXT,
                salary_min       REAL,
                salary_max       REAL,
                salary_period    TEXT,
                salary_raw       TEXT,
                debug_lines      TEXT NOT NULL DEFAULT '[]',
                fingerprint      TEXT,
                hit_confidence   INTEGER NOT NULL DEFAULT 0,
                tracking_url     TEXT NOT NULL,
                canonical_status TEXT NOT NULL DEFAULT 'pending',
                canonical_url    TEXT,
                resolved_job_id  TEXT,
                http_status      INTEGER,
                attempt_count    INTEGER NOT NULL DEFAULT 0,
                next_retry_at    TEXT,
                last_attempt_at  TEXT,
                canon_error      TEXT,
                created_at       TEXT NOT NULL,
                UNIQUE(message_id, tracking_url)
            );

            CREATE INDEX IF NOT EXISTS idx_job_hits_due
                ON job_hits(canonical_status, attempt_count, next_retry_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Storage(e.to_string().into()))?;

        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// Row type for sqlx queries
#[derive(Debug, FromRow)]
struct HitRow {
    hit_id: i64,
    message_id: String,
    source: String,
    title: Option<String>,
    company: Option<String>,
    suburb: Option<String>,
    city: Option<String>,
    state: Option<String>,
    location_raw: Option<String>,
    salary_min: Option<f64>,
    salary_max: Option<f64>,
    salary_period: Option<String>,
    salary_raw: Option<String>,
    debug_lines: String,
    fingerprint: Option<String>,
    hit_confidence: i64,
    tracking_url: String,
    canonical_status: String,
    canonical_url: Option<String>,
    resolved_job_id: Option<String>,
    http_status: Option<i64>,
    attempt_count: i64,
    next_retry_at: Option<String>,
    last_attempt_at: Option<String>,
    canon_error: Option<String>,
    created_at: String,
}

fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| EngineError::Storage(format!("Invalid date: {e}").into()))
}

impl HitRow {
    fn into_stored_hit(self) -> Result<StoredHit> {
        let debug_lines: Vec<String> = serde_json::from_str(&self.debug_lines)?;

        let canonical_status = CanonicalStatus::parse(&self.canonical_status).ok_or_else(|| {
            EngineError::Storage(
                format!("Invalid canonical status: {}", self.canonical_status).into(),
            )
        })?;

        Ok(StoredHit {
            hit_id: self.hit_id,
            message_id: self.message_id,
            source: self.source,
            hit: JobHit {
                tracking_url: self.tracking_url,
                title: self.title,
                company: self.company,
                suburb: self.suburb,
                city: self.city,
                state: self.state,
                location_raw: self.location_raw,
                salary_min: self.salary_min,
                salary_max: self.salary_max,
                salary_period: self.salary_period.as_deref().and_then(SalaryPeriod::parse),
                salary_raw: self.salary_raw,
                debug_lines,
                fingerprint: self.fingerprint,
                hit_confidence: self.hit_confidence.clamp(0, 100) as u8,
            },
            canonical_status,
            canonical_url: self.canonical_url,
            resolved_job_id: self.resolved_job_id,
            http_status: self.http_status.map(|s| s as u16),
            attempt_count: self.attempt_count.max(0) as u32,
            next_retry_at: self.next_retry_at.as_deref().map(parse_date).transpose()?,
            last_attempt_at: self.last_attempt_at.as_deref().map(parse_date).transpose()?,
            canon_error: self.canon_error,
            created_at: parse_date(&self.created_at)?,
        })
    }
}

const HIT_COLUMNS: &str = "hit_id, message_id, source, title, company, suburb, city, state, \
     location_raw, salary_min, salary_max, salary_period, salary_raw, debug_lines, fingerprint, \
     hit_confidence, tracking_url, canonical_status, canonical_url, resolved_job_id, http_status, \
     attempt_count, next_retry_at, last_attempt_at, canon_error, created_at";

#[async_trait]
impl HitStore for SqliteHitStore {
    async fn upsert_hits(
        &self,
        message_id: &str,
        source: &str,
        hits: &[JobHit],
    ) -> Result<usize> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EngineError::Storage(e.to_string().into()))?;

        let now = Utc::now().to_rfc3339();
        for hit in hits {
            let debug_lines = serde_json::to_string(&hit.debug_lines)?;

            sqlx::query(
                r#"
                INSERT INTO job_hits (
                    message_id, source, title, company, suburb, city, state, location_raw,
                    salary_min, salary_max, salary_period, salary_raw, debug_lines,
                    fingerprint, hit_confidence, tracking_url, created_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(message_id, tracking_url) DO UPDATE SET
                    source = excluded.source,
                    title = excluded.title,
                    company = excluded.company,
                    suburb = excluded.suburb,
                    city = excluded.city,
                    state = excluded.state,
                    location_raw = excluded.location_raw,
                    salary_min = excluded.salary_min,
                    salary_max = excluded.salary_max,
                    salary_period = excluded.salary_period,
                    salary_raw = excluded.salary_raw,
                    debug_lines = excluded.debug_lines,
                    fingerprint = excluded.fingerprint,
                    hit_confidence = excluded.hit_confidence
                "#,
            )
            .bind(message_id)
            .bind(source)
            .bind(&hit.title)
            .bind(&hit.company)
            .bind(&hit.suburb)
            .bind(&hit.city)
            .bind(&hit.state)
            .bind(&hit.location_raw)
            .bind(hit.salary_min)
            .bind(hit.salary_max)
            .bind(hit.salary_period.map(|p| p.as_str()))
            .bind(&hit.salary_raw)
            .bind(&debug_lines)
            .bind(&hit.fingerprint)
            .bind(hit.hit_confidence as i64)
            .bind(&hit.tracking_url)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(|e| EngineError::Storage(e.to_string().into()))?;
        }

        tx.commit()
            .await
            .map_err(|e| EngineError::Storage(e.to_string().into()))?;

        Ok(hits.len())
    }

    async fn record_message_outcome(&self, outcome: &MessageOutcome) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (
                message_id, from_address, parser_name, parser_version,
                parse_status, parse_confidence, hit_count, error, parsed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(message_id) DO UPDATE SET
                from_address = excluded.from_address,
                parser_name = excluded.parser_name,
                parser_version = excluded.parser_version,
                parse_status = excluded.parse_status,
                parse_confidence = excluded.parse_confidence,
                hit_count = excluded.hit_count,
                error = excluded.error,
                parsed_at = excluded.parsed_at
            "#,
        )
        .bind(&outcome.message_id)
        .bind(&outcome.from_address)
        .bind(&outcome.parser_name)
        .bind(&outcome.parser_version)
        .bind(outcome.status.as_str())
        .bind(outcome.confidence.map(|c| c as i64))
        .bind(outcome.hit_count as i64)
        .bind(&outcome.error)
        .bind(outcome.parsed_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Storage(e.to_string().into()))?;

        Ok(())
    }

    async fn batch_due_for_canonicalization(
        &self,
        limit: usize,
        attempt_ceiling: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<DueHit>> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            r#"
            SELECT hit_id, tracking_url FROM job_hits
            WHERE canonical_status IN ('pending', 'retry')
              AND attempt_count < ?
              AND (next_retry_at IS NULL OR next_retry_at <= ?)
              AND TRIM(tracking_url) <> ''
            ORDER BY (attempt_count > 0), next_retry_at, hit_id
            LIMIT ?
            "#,
        )
        .bind(attempt_ceiling as i64)
        .bind(now.to_rfc3339())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::Storage(e.to_string().into()))?;

        Ok(rows
            .into_iter()
            .map(|(hit_id, tracking_url)| DueHit {
                hit_id,
                tracking_url,
            })
            .collect())
    }

    async fn count_due_for_canonicalization(
        &self,
        attempt_ceiling: u32,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM job_hits
            WHERE canonical_status IN ('pending', 'retry')
              AND attempt_count < ?
              AND (next_retry_at IS NULL OR next_retry_at <= ?)
              AND TRIM(tracking_url) <> ''
            "#,
        )
        .bind(attempt_ceiling as i64)
        .bind(now.to_rfc3339())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| EngineError::Storage(e.to_string().into()))?;

        Ok(count.0 as usize)
    }

    async fn apply_outcomes(
        &self,
        outcomes: &[(i64, CanonicalOutcome)],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EngineError::Storage(e.to_string().into()))?;

        let now_text = now.to_rfc3339();
        for (hit_id, outcome) in outcomes {
            let row: Option<(i64,)> =
                sqlx::query_as("SELECT attempt_count FROM job_hits WHERE hit_id = ?")
                    .bind(hit_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| EngineError::Storage(e.to_string().into()))?;

            let Some((attempts,)) = row else {
                return Err(EngineError::Storage(
                    format!("hit {hit_id} not found while applying outcome").into(),
                ));
            };
            let attempts_after = attempts.max(0) as u32 + 1;

            let query = match outcome {
                CanonicalOutcome::Ok {
                    job_id,
                    canonical_url,
                    http_status,
                } => sqlx::query(
                    r#"
                    UPDATE job_hits SET
                        canonical_status = 'ok',
                        canonical_url = ?,
                        resolved_job_id = ?,
                        http_status = ?,
                        canon_error = NULL,
                        next_retry_at = NULL,
                        attempt_count = ?,
                        last_attempt_at = ?
                    WHERE hit_id = ?
                    "#,
                )
                .bind(canonical_url)
                .bind(job_id)
                .bind(*http_status as i64)
                .bind(attempts_after as i64)
                .bind(&now_text)
                .bind(hit_id),

                CanonicalOutcome::Retry { http_status, error } => sqlx::query(
                    r#"
                    UPDATE job_hits SET
                        canonical_status = 'retry',
                        canonical_url = NULL,
                        resolved_job_id = NULL,
                        http_status = ?,
                        canon_error = ?,
                        next_retry_at = ?,
                        attempt_count = ?,
                        last_attempt_at = ?
                    WHERE hit_id = ?
                    "#,
                )
                .bind(http_status.map(|s| s as i64))
                .bind(error)
                .bind(retry::next_retry_at(now, attempts_after).to_rfc3339())
                .bind(attempts_after as i64)
                .bind(&now_text)
                .bind(hit_id),

                CanonicalOutcome::Error { http_status, error } => sqlx::query(
                    r#"
                    UPDATE job_hits SET
                        canonical_status = 'error',
                        canonical_url = NULL,
                        resolved_job_id = NULL,
                        http_status = ?,
                        canon_error = ?,
                        next_retry_at = NULL,
                        attempt_count = ?,
                        last_attempt_at = ?
                    WHERE hit_id = ?
                    "#,
                )
                .bind(http_status.map(|s| s as i64))
                .bind(error)
                .bind(attempts_after as i64)
                .bind(&now_text)
                .bind(hit_id),
            };

            query
                .execute(&mut *tx)
                .await
                .map_err(|e| EngineError::Storage(e.to_string().into()))?;
        }

        tx.commit()
            .await
            .map_err(|e| EngineError::Storage(e.to_string().into()))?;

        Ok(())
    }

    async fn get_hit(&self, hit_id: i64) -> Result<Option<StoredHit>> {
        let row = sqlx::query_as::<_, HitRow>(&format!(
            "SELECT {HIT_COLUMNS} FROM job_hits WHERE hit_id = ?"
        ))
        .bind(hit_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| EngineError::Storage(e.to_string().into()))?;

        match row {
            Some(r) => Ok(Some(r.into_stored_hit()?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteHitStore {
        SqliteHitStore::in_memory().await.unwrap()
    }

    fn hit(url: &str) -> JobHit {
        JobHit {
            title: Some("Data Engineer".into()),
            company: Some("Acme".into()),
            location_raw: Some("Sydney NSW".into()),
            debug_lines: vec!["Data Engineer".into(), "Acme".into(), "Sydney NSW".into()],
            ..JobHit::new(url)
        }
    }

    async fn first_due_id(store: &SqliteHitStore) -> i64 {
        store
            .batch_due_for_canonicalization(1, 10, Utc::now())
            .await
            .unwrap()[0]
            .hit_id
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = test_store().await;

        store.upsert_hits("m1", "seek", &[hit("u1")]).await.unwrap();
        store.upsert_hits("m1", "seek", &[hit("u1")]).await.unwrap();

        let count = store
            .count_due_for_canonicalization(10, Utc::now())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_latest_fields() {
        let store = test_store().await;
        store.upsert_hits("m1", "seek", &[hit("u1")]).await.unwrap();

        let mut updated = hit("u1");
        updated.title = Some("Senior Data Engineer".into());
        updated.salary_min = Some(150000.0);
        store.upsert_hits("m1", "seek", &[updated]).await.unwrap();

        let id = first_due_id(&store).await;
        let row = store.get_hit(id).await.unwrap().unwrap();
        assert_eq!(row.hit.title.as_deref(), Some("Senior Data Engineer"));
        assert_eq!(row.hit.salary_min, Some(150000.0));
        assert_eq!(row.canonical_status, CanonicalStatus::Pending);
    }

    #[tokio::test]
    async fn test_round_trip_all_fields() {
        let store = test_store().await;
        let mut full = hit("u1");
        full.suburb = Some("Parramatta".into());
        full.city = Some("Sydney".into());
        full.state = Some("NSW".into());
        full.salary_min = Some(90000.0);
        full.salary_max = Some(110000.0);
        full.salary_period = Some(SalaryPeriod::Year);
        full.salary_raw = Some("$90,000 - $110,000".into());
        full.fingerprint = Some("abcd1234abcd1234".into());
        full.hit_confidence = 93;

        store.upsert_hits("m1", "seek", &[full]).await.unwrap();

        let id = first_due_id(&store).await;
        let row = store.get_hit(id).await.unwrap().unwrap();
        assert_eq!(row.hit.suburb.as_deref(), Some("Parramatta"));
        assert_eq!(row.hit.salary_period, Some(SalaryPeriod::Year));
        assert_eq!(row.hit.hit_confidence, 93);
        assert_eq!(row.hit.debug_lines.len(), 3);
        assert_eq!(row.source, "seek");
    }

    #[tokio::test]
    async fn test_selection_orders_fresh_before_due_retries() {
        let store = test_store().await;
        store
            .upsert_hits("m1", "seek", &[hit("u1"), hit("u2")])
            .await
            .unwrap();

        // Fail u1 with a deadline in the past.
        let past = Utc::now() - chrono::Duration::hours(6);
        let id1 = first_due_id(&store).await;
        store
            .apply_outcomes(
                &[(
                    id1,
                    CanonicalOutcome::Retry {
                        http_status: None,
                        error: "timeout".into(),
                    },
                )],
                past,
            )
            .await
            .unwrap();

        let due = store
            .batch_due_for_canonicalization(10, 10, Utc::now())
            .await
            .unwrap();
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].tracking_url, "u2");
        assert_eq!(due[1].hit_id, id1);
    }

    #[tokio::test]
    async fn test_selection_excludes_blank_and_undue() {
        let store = test_store().await;
        store
            .upsert_hits("m1", "seek", &[hit("u1"), hit("  ")])
            .await
            .unwrap();

        let now = Utc::now();
        let due = store
            .batch_due_for_canonicalization(10, 10, now)
            .await
            .unwrap();
        assert_eq!(due.len(), 1);

        // Push u1 into retry; its deadline is in the future.
        store
            .apply_outcomes(
                &[(
                    due[0].hit_id,
                    CanonicalOutcome::Retry {
                        http_status: Some(503),
                        error: "unavailable".into(),
                    },
                )],
                now,
            )
            .await
            .unwrap();

        let due = store
            .batch_due_for_canonicalization(10, 10, now)
            .await
            .unwrap();
        assert!(due.is_empty());

        let count = store.count_due_for_canonicalization(10, now).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_outcome_transitions_round_trip() {
        let store = test_store().await;
        store
            .upsert_hits("m1", "seek", &[hit("u1"), hit("u2"), hit("u3")])
            .await
            .unwrap();

        let now = Utc::now();
        let due = store
            .batch_due_for_canonicalization(10, 10, now)
            .await
            .unwrap();

        store
            .apply_outcomes(
                &[
                    (
                        due[0].hit_id,
                        CanonicalOutcome::Ok {
                            job_id: "86545675".into(),
                            canonical_url: "https://www.seek.com.au/job/86545675".into(),
                            http_status: 301,
                        },
                    ),
                    (
                        due[1].hit_id,
                        CanonicalOutcome::Retry {
                            http_status: Some(429),
                            error: "throttled".into(),
                        },
                    ),
                    (
                        due[2].hit_id,
                        CanonicalOutcome::Error {
                            http_status: Some(200),
                            error: "no Location header".into(),
                        },
                    ),
                ],
                now,
            )
            .await
            .unwrap();

        let ok = store.get_hit(due[0].hit_id).await.unwrap().unwrap();
        assert_eq!(ok.canonical_status, CanonicalStatus::Ok);
        assert_eq!(ok.resolved_job_id.as_deref(), Some("86545675"));
        assert_eq!(
            ok.canonical_url.as_deref(),
            Some("https://www.seek.com.au/job/86545675")
        );
        assert_eq!(ok.http_status, Some(301));
        assert_eq!(ok.attempt_count, 1);
        assert!(ok.next_retry_at.is_none());
        assert!(ok.canon_error.is_none());

        let retry = store.get_hit(due[1].hit_id).await.unwrap().unwrap();
        assert_eq!(retry.canonical_status, CanonicalStatus::Retry);
        assert!(retry.next_retry_at.unwrap() > now);
        assert_eq!(retry.canon_error.as_deref(), Some("throttled"));

        let error = store.get_hit(due[2].hit_id).await.unwrap().unwrap();
        assert_eq!(error.canonical_status, CanonicalStatus::Error);
        assert_eq!(error.http_status, Some(200));
        assert!(error.next_retry_at.is_none());
    }

    #[tokio::test]
    async fn test_message_outcome_recorded_latest_wins() {
        let store = test_store().await;

        let first = MessageOutcome::parsed("m1", "jobmail@s.seek.com.au", "p", "v1", 40, 2);
        store.record_message_outcome(&first).await.unwrap();

        let second = MessageOutcome::parsed("m1", "jobmail@s.seek.com.au", "p", "v1", 85, 14);
        store.record_message_outcome(&second).await.unwrap();

        let row: (String, i64, i64) = sqlx::query_as(
            "SELECT parse_status, parse_confidence, hit_count FROM messages WHERE message_id = ?",
        )
        .bind("m1")
        .fetch_one(store.pool())
        .await
        .unwrap();

        assert_eq!(ParseStatus::parse(&row.0), Some(ParseStatus::Parsed));
        assert_eq!(row.1, 85);
        assert_eq!(row.2, 14);
    }
}
