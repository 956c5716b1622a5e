//! Message types - the input tuple from the mail source and the per-message
//! parse outcome this engine records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One message as supplied by the mail-source collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailMessage {
    /// Unique message identifier
    pub message_id: String,

    /// Sender address, used for parser dispatch
    pub from_address: String,

    /// Raw HTML body
    pub html_body: String,
}

impl MailMessage {
    /// Create a new message tuple.
    pub fn new(
        message_id: impl Into<String>,
        from_address: impl Into<String>,
        html_body: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            from_address: from_address.into(),
            html_body: html_body.into(),
        }
    }
}

/// Aggregate outcome of parsing one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    /// No parser is registered for the sender
    Unsupported,
    /// A parser ran but persisted zero hits
    Empty,
    /// A parser ran and persisted at least one hit
    Parsed,
    /// Parsing or persistence failed for this message
    ParseError,
}

impl ParseStatus {
    /// Stable text form used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseStatus::Unsupported => "unsupported",
            ParseStatus::Empty => "empty",
            ParseStatus::Parsed => "parsed",
            ParseStatus::ParseError => "parse_error",
        }
    }

    /// Parse the stored text form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unsupported" => Some(ParseStatus::Unsupported),
            "empty" => Some(ParseStatus::Empty),
            "parsed" => Some(ParseStatus::Parsed),
            "parse_error" => Some(ParseStatus::ParseError),
            _ => None,
        }
    }
}

/// Per-message parse bookkeeping persisted by the store.
#[derive(Debug, Clone)]
pub struct MessageOutcome {
    /// Message this outcome belongs to
    pub message_id: String,

    /// Sender address
    pub from_address: String,

    /// Parser that handled the message, when one was registered
    pub parser_name: Option<String>,

    /// Version of that parser
    pub parser_version: Option<String>,

    /// Aggregate status
    pub status: ParseStatus,

    /// Message-level confidence, 0..=100; absent when unsupported or errored
    pub confidence: Option<u8>,

    /// Number of hits persisted for this message
    pub hit_count: usize,

    /// Failure description for `ParseError`
    pub error: Option<String>,

    /// When the outcome was recorded
    pub parsed_at: DateTime<Utc>,
}

impl MessageOutcome {
    /// Outcome for a sender with no registered parser.
    pub fn unsupported(message_id: impl Into<String>, from_address: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            from_address: from_address.into(),
            parser_name: None,
            parser_version: None,
            status: ParseStatus::Unsupported,
            confidence: None,
            hit_count: 0,
            error: None,
            parsed_at: Utc::now(),
        }
    }

    /// Outcome for a successfully parsed message.
    ///
    /// Status is `Empty` when zero hits were persisted, `Parsed` otherwise.
    pub fn parsed(
        message_id: impl Into<String>,
        from_address: impl Into<String>,
        parser_name: &str,
        parser_version: &str,
        confidence: u8,
        hit_count: usize,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            from_address: from_address.into(),
            parser_name: Some(parser_name.to_string()),
            parser_version: Some(parser_version.to_string()),
            status: if hit_count == 0 {
                ParseStatus::Empty
            } else {
                ParseStatus::Parsed
            },
            confidence: Some(confidence),
            hit_count,
            error: None,
            parsed_at: Utc::now(),
        }
    }

    /// Outcome for a message whose parse or persistence failed.
    pub fn parse_error(
        message_id: impl Into<String>,
        from_address: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            from_address: from_address.into(),
            parser_name: None,
            parser_version: None,
            status: ParseStatus::ParseError,
            confidence: None,
            hit_count: 0,
            error: Some(error.into()),
            parsed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parsed_outcome_empty_vs_parsed() {
        let empty = MessageOutcome::parsed("m1", "a@b", "p", "v1", 10, 0);
        assert_eq!(empty.status, ParseStatus::Empty);

        let parsed = MessageOutcome::parsed("m1", "a@b", "p", "v1", 80, 4);
        assert_eq!(parsed.status, ParseStatus::Parsed);
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            ParseStatus::Unsupported,
            ParseStatus::Empty,
            ParseStatus::Parsed,
            ParseStatus::ParseError,
        ] {
            assert_eq!(ParseStatus::parse(status.as_str()), Some(status));
        }
    }
}
