//! Hit types - extracted job-ad candidates and their persisted form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Pay period detected on a salary line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SalaryPeriod {
    /// Hourly rate
    Hour,
    /// Daily rate
    Day,
    /// Annual salary
    Year,
}

impl SalaryPeriod {
    /// Stable text form used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            SalaryPeriod::Hour => "hour",
            SalaryPeriod::Day => "day",
            SalaryPeriod::Year => "year",
        }
    }

    /// Parse the stored text form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hour" => Some(SalaryPeriod::Hour),
            "day" => Some(SalaryPeriod::Day),
            "year" => Some(SalaryPeriod::Year),
            _ => None,
        }
    }
}

/// Canonicalization state of a persisted hit.
///
/// `Pending → {Ok | Retry | Error}`, `Retry → {Ok | Retry | Error}`;
/// `Ok` and `Error` are terminal for this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalStatus {
    /// Never attempted
    #[default]
    Pending,
    /// Failed with a transient cause; due again at `next_retry_at`
    Retry,
    /// Resolved to a canonical URL and job id
    Ok,
    /// Failed with a permanent cause
    Error,
}

impl CanonicalStatus {
    /// Stable text form used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalStatus::Pending => "pending",
            CanonicalStatus::Retry => "retry",
            CanonicalStatus::Ok => "ok",
            CanonicalStatus::Error => "error",
        }
    }

    /// Parse the stored text form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CanonicalStatus::Pending),
            "retry" => Some(CanonicalStatus::Retry),
            "ok" => Some(CanonicalStatus::Ok),
            "error" => Some(CanonicalStatus::Error),
            _ => None,
        }
    }
}

/// One candidate job advertisement extracted from one message.
///
/// Identity is `(message_id, tracking_url)`; the message id is supplied at
/// persistence time, so the extracted record carries only the URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobHit {
    /// Tracking URL from the job-card anchor
    pub tracking_url: String,

    /// Job title, when a title-styled block was found
    pub title: Option<String>,

    /// Company name, when a company-styled block was found
    pub company: Option<String>,

    /// Parsed suburb (from `Suburb, City STATE`)
    pub suburb: Option<String>,

    /// Parsed city
    pub city: Option<String>,

    /// Parsed state abbreviation
    pub state: Option<String>,

    /// The full location line as selected, before structural parsing
    pub location_raw: Option<String>,

    /// Lower bound of the salary range
    pub salary_min: Option<f64>,

    /// Upper bound of the salary range (equals min for a single amount)
    pub salary_max: Option<f64>,

    /// Detected pay period
    pub salary_period: Option<SalaryPeriod>,

    /// The salary line as selected, whitespace-normalized
    pub salary_raw: Option<String>,

    /// The candidate text lines the extractor considered (debug evidence)
    pub debug_lines: Vec<String>,

    /// Content fingerprint over normalized title|company|location, for
    /// future dedup; absent unless all three fields are present
    pub fingerprint: Option<String>,

    /// Extraction confidence, 0..=100
    pub hit_confidence: u8,
}

impl JobHit {
    /// Create a hit for a tracking URL with all fields empty.
    pub fn new(tracking_url: impl Into<String>) -> Self {
        Self {
            tracking_url: tracking_url.into(),
            ..Default::default()
        }
    }

    /// Compute the content fingerprint for a title/company/location triple.
    ///
    /// Returns `None` unless all three are present. The fingerprint is the
    /// first 16 hex chars of a SHA-256 over the normalized (lowercased,
    /// whitespace-collapsed) fields joined with `|`.
    pub fn fingerprint_of(
        title: Option<&str>,
        company: Option<&str>,
        location_raw: Option<&str>,
    ) -> Option<String> {
        let (title, company, location) = (title?, company?, location_raw?);
        let mut hasher = Sha256::new();
        hasher.update(
            format!(
                "{}|{}|{}",
                normalize(title),
                normalize(company),
                normalize(location)
            )
            .as_bytes(),
        );
        let digest = format!("{:x}", hasher.finalize());
        Some(digest[..16].to_string())
    }
}

/// Lowercase and collapse whitespace.
pub fn normalize(s: &str) -> String {
    s.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// A persisted hit row: the extracted record plus the canonicalization
/// state owned by the retry state machine.
#[derive(Debug, Clone)]
pub struct StoredHit {
    /// Row identifier
    pub hit_id: i64,

    /// Message the hit was extracted from
    pub message_id: String,

    /// Source name from the parser configuration (e.g. `"seek"`)
    pub source: String,

    /// The extracted record
    pub hit: JobHit,

    /// Current canonicalization state
    pub canonical_status: CanonicalStatus,

    /// Canonical job URL; set only when status is `Ok`
    pub canonical_url: Option<String>,

    /// Stable job identifier; set only when status is `Ok`
    pub resolved_job_id: Option<String>,

    /// HTTP status observed on the last attempt, when one was observed
    pub http_status: Option<u16>,

    /// Number of resolution attempts so far (monotonic non-decreasing)
    pub attempt_count: u32,

    /// Due time of the next attempt; non-null iff status is `Retry`
    pub next_retry_at: Option<DateTime<Utc>>,

    /// Time of the last attempt, regardless of outcome
    pub last_attempt_at: Option<DateTime<Utc>>,

    /// Failure description from the last attempt; cleared on `Ok`
    pub canon_error: Option<String>,

    /// Row creation time
    pub created_at: DateTime<Utc>,
}
