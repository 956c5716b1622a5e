//! Configuration for the canonicalization batch driver.

use std::time::Duration;

use rand::Rng;

/// Configuration for enrichment (canonicalization) runs.
#[derive(Debug, Clone)]
pub struct EnrichConfig {
    /// Maximum rows selected per batch
    pub batch_size: usize,

    /// Attempts at or above this count exclude a row from selection
    pub attempt_ceiling: u32,

    /// Stop after this many batches; `None` runs until the queue drains
    pub max_batches: Option<usize>,

    /// Politeness delay range between items, milliseconds
    pub base_delay_ms: (u64, u64),

    /// Politeness delay range after a retry outcome, milliseconds
    pub retry_delay_ms: (u64, u64),
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            batch_size: 200,
            attempt_ceiling: 10,
            max_batches: None,
            base_delay_ms: (200, 400),
            retry_delay_ms: (2000, 4000),
        }
    }
}

impl EnrichConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the attempt ceiling.
    pub fn with_attempt_ceiling(mut self, ceiling: u32) -> Self {
        self.attempt_ceiling = ceiling;
        self
    }

    /// Bound the run to a maximum number of batches.
    pub fn with_max_batches(mut self, max_batches: usize) -> Self {
        self.max_batches = Some(max_batches);
        self
    }

    /// Set the baseline politeness delay range, milliseconds.
    pub fn with_base_delay_ms(mut self, lo: u64, hi: u64) -> Self {
        self.base_delay_ms = (lo, hi);
        self
    }

    /// Set the after-retry politeness delay range, milliseconds.
    pub fn with_retry_delay_ms(mut self, lo: u64, hi: u64) -> Self {
        self.retry_delay_ms = (lo, hi);
        self
    }

    /// Disable politeness delays (tests).
    pub fn without_delays(self) -> Self {
        self.with_base_delay_ms(0, 0).with_retry_delay_ms(0, 0)
    }

    /// Draw a jittered politeness delay.
    ///
    /// The extended range applies after a retry outcome, backing off harder
    /// under transient failure.
    pub fn politeness_delay(&self, after_retry: bool) -> Duration {
        let (lo, hi) = if after_retry {
            self.retry_delay_ms
        } else {
            self.base_delay_ms
        };
        let ms = rand::thread_rng().gen_range(lo..=hi.max(lo));
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_within_range() {
        let config = EnrichConfig::default();
        for _ in 0..50 {
            let base = config.politeness_delay(false).as_millis() as u64;
            assert!((200..=400).contains(&base));

            let retry = config.politeness_delay(true).as_millis() as u64;
            assert!((2000..=4000).contains(&retry));
        }
    }

    #[test]
    fn test_without_delays() {
        let config = EnrichConfig::default().without_delays();
        assert_eq!(config.politeness_delay(false), Duration::ZERO);
        assert_eq!(config.politeness_delay(true), Duration::ZERO);
    }
}
