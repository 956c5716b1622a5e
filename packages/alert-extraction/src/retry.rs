//! Retry state machine: outcome classification and the backoff schedule.
//!
//! Resolution attempts end in one of three outcomes. Transient causes
//! (network failures, server-side statuses, anything unclassified) go to
//! retry with an exponential backoff deadline; structural causes go to a
//! terminal error. The classification switches on the failure variant,
//! never on downcast exception types.

use chrono::{DateTime, Duration, Utc};

use crate::error::ResolveError;
use crate::resolver::Resolved;
use crate::types::hit::CanonicalStatus;

/// HTTP statuses treated as transient (server-side or throttling).
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Backoff cap, minutes (one day).
const BACKOFF_CAP_MINUTES: i64 = 1440;

/// Outcome of one canonicalization attempt, as applied to the stored row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalOutcome {
    /// Resolution succeeded; the row becomes terminal `ok`.
    Ok {
        /// Stable job identifier
        job_id: String,
        /// Canonical job URL
        canonical_url: String,
        /// HTTP status observed on the successful probe
        http_status: u16,
    },

    /// Transient failure; the row is due again after backoff.
    Retry {
        /// HTTP status, when one was observed
        http_status: Option<u16>,
        /// Failure description persisted on the row
        error: String,
    },

    /// Permanent failure; the row becomes terminal `error`.
    Error {
        /// HTTP status, when one was observed
        http_status: Option<u16>,
        /// Failure description persisted on the row
        error: String,
    },
}

impl CanonicalOutcome {
    /// The status the row transitions to under this outcome.
    pub fn status(&self) -> CanonicalStatus {
        match self {
            CanonicalOutcome::Ok { .. } => CanonicalStatus::Ok,
            CanonicalOutcome::Retry { .. } => CanonicalStatus::Retry,
            CanonicalOutcome::Error { .. } => CanonicalStatus::Error,
        }
    }

    /// Outcome for a blank tracking URL; no HTTP attempt is made.
    pub fn blank_url() -> Self {
        CanonicalOutcome::Error {
            http_status: None,
            error: "empty tracking URL".to_string(),
        }
    }
}

/// Classify a resolution result into an outcome.
pub fn outcome_for(result: Result<Resolved, ResolveError>) -> CanonicalOutcome {
    match result {
        Ok(resolved) => CanonicalOutcome::Ok {
            job_id: resolved.job_id,
            canonical_url: resolved.canonical_url,
            http_status: resolved.http_status,
        },
        Err(err) => outcome_for_failure(err),
    }
}

fn outcome_for_failure(err: ResolveError) -> CanonicalOutcome {
    match &err {
        ResolveError::Network { .. } => CanonicalOutcome::Retry {
            http_status: None,
            error: err.to_string(),
        },
        ResolveError::Unclassified { .. } => CanonicalOutcome::Retry {
            http_status: None,
            error: format!("unexpected: {err}"),
        },
        ResolveError::NoRedirect { status, .. }
        | ResolveError::UnrecognizedTarget { status, .. } => {
            if RETRYABLE_STATUSES.contains(status) {
                CanonicalOutcome::Retry {
                    http_status: Some(*status),
                    error: err.to_string(),
                }
            } else {
                CanonicalOutcome::Error {
                    http_status: Some(*status),
                    error: err.to_string(),
                }
            }
        }
    }
}

/// Backoff before the nth retry: `min(2^n, 1440)` minutes.
pub fn backoff(attempt_count: u32) -> Duration {
    let minutes = if attempt_count >= 11 {
        BACKOFF_CAP_MINUTES
    } else {
        1i64 << attempt_count
    };
    Duration::minutes(minutes)
}

/// The retry deadline for a row that just finished its nth attempt.
pub fn next_retry_at(now: DateTime<Utc>, attempt_count: u32) -> DateTime<Utc> {
    now + backoff(attempt_count)
}
