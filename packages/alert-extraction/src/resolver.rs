//! Canonical URL resolution via HTTP redirect inspection.
//!
//! Tracking links in alert emails redirect to the real job posting. The
//! resolver probes a tracking URL with a single HEAD request (no redirect
//! following), falls back to GET for endpoints that only redirect on GET,
//! and validates the redirect target against the `/job/<id>` path shape.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::redirect::Policy;
use tracing::debug;
use url::Url;

use crate::error::ResolveError;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; AlertExtraction/0.1; +https://example.invalid)";

static JOB_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/job/(\d+)(?:/.*)?$").unwrap());

/// A successful resolution: stable job identity plus the canonical URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Numeric job identifier extracted from the redirect target
    pub job_id: String,

    /// Canonical job URL: scheme + host + `/job/<id>`, tracking query
    /// parameters and path suffixes stripped
    pub canonical_url: String,

    /// HTTP status observed on the probe that produced the target
    pub http_status: u16,
}

/// Resolves tracking URLs by inspecting redirect responses.
pub struct UrlResolver {
    client: reqwest::Client,
}

impl Default for UrlResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlResolver {
    /// Create a resolver with the default 15 second timeout.
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(15))
    }

    /// Create a resolver with a custom timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }

    /// Use a pre-built HTTP client.
    ///
    /// The client must have redirect following disabled.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Resolve a tracking URL to its canonical job URL and identifier.
    pub async fn resolve(&self, tracking_url: &str) -> Result<Resolved, ResolveError> {
        let (status, location) = self.probe_location(tracking_url).await?;
        debug!(url = %tracking_url, status, location = location.as_deref().unwrap_or("-"), "redirect probe");

        let location = location.ok_or_else(|| ResolveError::NoRedirect {
            status,
            url: tracking_url.to_string(),
        })?;

        canonicalize_job_location(&location, status)
    }

    /// HEAD the URL without following redirects; when no `Location` header
    /// comes back, retry with GET (some tracking endpoints only redirect
    /// on GET). Returns the last observed status and the header, if any.
    async fn probe_location(
        &self,
        tracking_url: &str,
    ) -> Result<(u16, Option<String>), ResolveError> {
        let response = self
            .client
            .head(tracking_url)
            .send()
            .await
            .map_err(|e| transport_error(tracking_url, &e))?;

        if let Some(location) = location_header(&response) {
            return Ok((response.status().as_u16(), Some(location)));
        }

        let response = self
            .client
            .get(tracking_url)
            .send()
            .await
            .map_err(|e| transport_error(tracking_url, &e))?;

        Ok((response.status().as_u16(), location_header(&response)))
    }
}

fn location_header(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

fn transport_error(url: &str, err: &reqwest::Error) -> ResolveError {
    if err.is_timeout() || err.is_connect() {
        ResolveError::Network {
            url: url.to_string(),
            message: err.to_string(),
        }
    } else {
        ResolveError::Unclassified {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

/// Validate a redirect target and derive the canonical job URL.
///
/// The target must carry a `/job/<numeric id>` path; everything after the
/// id, the query string, and the fragment are dropped.
pub fn canonicalize_job_location(
    location: &str,
    http_status: u16,
) -> Result<Resolved, ResolveError> {
    let unrecognized = || ResolveError::UnrecognizedTarget {
        status: http_status,
        location: location.to_string(),
    };

    let parsed = Url::parse(location).map_err(|_| unrecognized())?;
    let caps = JOB_PATH_RE.captures(parsed.path()).ok_or_else(unrecognized)?;
    let job_id = caps[1].to_string();

    let mut canonical = parsed;
    canonical.set_path(&format!("/job/{job_id}"));
    canonical.set_query(None);
    canonical.set_fragment(None);

    Ok(Resolved {
        job_id,
        canonical_url: canonical.to_string(),
        http_status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_strips_tracking_noise() {
        let resolved = canonicalize_job_location(
            "https://www.seek.com.au/job/86545675/apply?tracking=alert&ref=email#top",
            301,
        )
        .unwrap();

        assert_eq!(resolved.job_id, "86545675");
        assert_eq!(resolved.canonical_url, "https://www.seek.com.au/job/86545675");
        assert_eq!(resolved.http_status, 301);
    }

    #[test]
    fn test_canonicalize_plain_job_url() {
        let resolved =
            canonicalize_job_location("https://www.seek.com.au/job/123", 302).unwrap();
        assert_eq!(resolved.job_id, "123");
        assert_eq!(resolved.canonical_url, "https://www.seek.com.au/job/123");
    }

    #[test]
    fn test_canonicalize_rejects_non_job_path() {
        let err = canonicalize_job_location("https://www.seek.com.au/browse/data", 301)
            .unwrap_err();
        match err {
            ResolveError::UnrecognizedTarget { status, .. } => assert_eq!(status, 301),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_canonicalize_rejects_non_numeric_id() {
        assert!(canonicalize_job_location("https://www.seek.com.au/job/abc", 301).is_err());
    }

    #[test]
    fn test_canonicalize_rejects_relative_target() {
        assert!(canonicalize_job_location("/job/123", 301).is_err());
    }
}
