//! Job-Alert Hit Extraction & Canonicalization Engine
//!
//! Extracts structured job-ad "hits" from semi-structured job-alert HTML
//! and resolves each hit's tracking link to a stable canonical identifier
//! via HTTP redirect inspection. Both the extracted record and the
//! resolution outcome are persisted, so re-runs are cheap, idempotent, and
//! resumable.
//!
//! # Design
//!
//! - Layout heuristics, not semantics: inline style markers and penalty
//!   scoring pick fields out of job-card anchors.
//! - Every extracted hit gets a 0..=100 confidence; every message parse
//!   gets an aggregate confidence against the parser's expected hit count.
//! - Canonicalization is a persistent state machine
//!   (`pending → {ok | retry | error}`) with exponential backoff, driven in
//!   bounded batches that commit atomically.
//!
//! # Usage
//!
//! ```rust,ignore
//! use alert_extraction::{run_enrich_all, run_parse, EnrichConfig, SqliteHitStore, UrlResolver};
//!
//! let store = SqliteHitStore::new("sqlite:./alerts.db?mode=rwc").await?;
//!
//! // Messages come from the mail-source collaborator.
//! run_parse(&store, &messages).await?;
//!
//! // Resolve tracking URLs, batch by batch, until the queue drains.
//! let resolver = UrlResolver::new();
//! let result = run_enrich_all(&store, &resolver, &EnrichConfig::default()).await?;
//! println!("ok={} retry={} error={}", result.ok, result.retried, result.errored);
//! ```
//!
//! # Modules
//!
//! - [`parsers`] - Layout extractors and the sender-keyed registry
//! - [`scoring`] - Hit and message confidence scoring
//! - [`resolver`] - HTTP redirect probing and URL canonicalization
//! - [`retry`] - Outcome classification and the backoff schedule
//! - [`pipeline`] - Parse runner and the enrichment batch driver
//! - [`traits`] - The `HitStore` persistence contract
//! - [`stores`] - Storage implementations (SQLite, in-memory)

pub mod error;
pub mod parsers;
pub mod pipeline;
pub mod resolver;
pub mod retry;
pub mod scoring;
pub mod stores;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{EngineError, ResolveError, Result};
pub use parsers::{config_for_sender, SourceConfig};
pub use resolver::{Resolved, UrlResolver};
pub use retry::{backoff, CanonicalOutcome};
pub use traits::store::{DueHit, HitStore};
pub use types::{
    config::EnrichConfig,
    hit::{CanonicalStatus, JobHit, SalaryPeriod, StoredHit},
    message::{MailMessage, MessageOutcome, ParseStatus},
};

// Re-export pipeline runners
pub use pipeline::{run_enrich_all, run_enrich_batch, run_parse, EnrichResult, ParseRunResult};

// Re-export stores
pub use stores::{MemoryHitStore, SqliteHitStore};
