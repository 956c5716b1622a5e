//! Layout parsers and the sender-keyed registry that dispatches to them.
//!
//! Each supported alert source is one table entry: sender address, parser
//! identity, the expected hit-count range, and the extraction function.
//! Supporting a new source means adding an entry, not a type.

pub mod seek;

use crate::types::hit::JobHit;

/// Configuration for one alert source.
pub struct SourceConfig {
    /// Sender address this parser handles
    pub sender: &'static str,

    /// Source name recorded on every hit (e.g. `"seek"`)
    pub source: &'static str,

    /// Parser identity, recorded on the message outcome
    pub parser_name: &'static str,

    /// Parser version, recorded on the message outcome
    pub parser_version: &'static str,

    /// Expected hit count range `[lo, hi]` for a typical alert
    pub hits_expected: (usize, usize),

    /// Extraction function producing a lazy hit sequence
    pub parse: fn(&str) -> Box<dyn Iterator<Item = JobHit>>,
}

/// The parser registry. Extended by adding entries.
pub static PARSER_CONFIGS: &[SourceConfig] = &[SourceConfig {
    sender: "jobmail@s.seek.com.au",
    source: "seek",
    parser_name: "seek_alert_parser",
    parser_version: "v1",
    hits_expected: (12, 20),
    parse: |html| Box::new(seek::parse_seek_alert(html)),
}];

/// Look up the parser configuration for a sender address.
pub fn config_for_sender(sender: &str) -> Option<&'static SourceConfig> {
    PARSER_CONFIGS.iter().find(|c| c.sender == sender)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seek_sender_registered() {
        let config = config_for_sender("jobmail@s.seek.com.au").unwrap();
        assert_eq!(config.source, "seek");
        assert_eq!(config.hits_expected, (12, 20));
    }

    #[test]
    fn test_unknown_sender_unsupported() {
        assert!(config_for_sender("noreply@example.com").is_none());
    }
}
