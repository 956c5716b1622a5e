//! Message parse runner: extract, score, and persist hits per message.

use tracing::{info, warn};

use crate::error::Result;
use crate::parsers;
use crate::scoring;
use crate::traits::store::HitStore;
use crate::types::message::{MailMessage, MessageOutcome};

/// Counters from one parse run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseRunResult {
    /// Messages seen
    pub messages: usize,

    /// Messages with no registered parser
    pub unsupported: usize,

    /// Hits persisted across all messages
    pub hits: usize,

    /// Messages that parsed to zero hits
    pub empty: usize,

    /// Messages whose parse or persistence failed
    pub errors: usize,
}

/// Parse a batch of messages, scoring and persisting the extracted hits.
///
/// Each message is dispatched through the parser registry by sender
/// address. A failure on one message records a `parse_error` outcome and
/// moves on; it never aborts the run.
pub async fn run_parse<S: HitStore>(store: &S, messages: &[MailMessage]) -> Result<ParseRunResult> {
    let mut result = ParseRunResult::default();

    for message in messages {
        result.messages += 1;

        let Some(config) = parsers::config_for_sender(&message.from_address) else {
            store
                .record_message_outcome(&MessageOutcome::unsupported(
                    &message.message_id,
                    &message.from_address,
                ))
                .await?;
            result.unsupported += 1;
            continue;
        };

        let hits: Vec<_> = (config.parse)(&message.html_body)
            .filter(|h| !h.tracking_url.trim().is_empty())
            .collect();

        let confidences: Vec<u8> = hits.iter().map(|h| h.hit_confidence).collect();
        let message_confidence =
            scoring::score_message(&confidences, Some(config.hits_expected));

        match store
            .upsert_hits(&message.message_id, config.source, &hits)
            .await
        {
            Ok(persisted) => {
                store
                    .record_message_outcome(&MessageOutcome::parsed(
                        &message.message_id,
                        &message.from_address,
                        config.parser_name,
                        config.parser_version,
                        message_confidence,
                        persisted,
                    ))
                    .await?;

                result.hits += persisted;
                if persisted == 0 {
                    result.empty += 1;
                }
            }
            Err(e) => {
                warn!(message_id = %message.message_id, error = %e, "Failed to persist hits");
                store
                    .record_message_outcome(&MessageOutcome::parse_error(
                        &message.message_id,
                        &message.from_address,
                        e.to_string(),
                    ))
                    .await?;
                result.errors += 1;
            }
        }
    }

    info!(
        messages = result.messages,
        hits = result.hits,
        empty = result.empty,
        errors = result.errors,
        unsupported = result.unsupported,
        "Parse run complete"
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryHitStore;
    use crate::types::message::ParseStatus;

    const TITLE_STYLE: &str = "color:#2e3849;font-size:16px;font-weight:700";
    const COMPANY_STYLE: &str = "color:#5a6881;font-size:14px;font-weight:400";

    fn seek_card(path: &str, title: &str) -> String {
        format!(
            r#"<a href="https://email.s.seek.com.au/uni/ss/c/{path}">
                <div style="{TITLE_STYLE}">{title}</div>
                <div style="{COMPANY_STYLE}">Acme</div>
                <div>Sydney NSW</div>
            </a>"#
        )
    }

    fn seek_message(id: &str, cards: &[String]) -> MailMessage {
        MailMessage::new(
            id,
            "jobmail@s.seek.com.au",
            format!("<html><body>{}</body></html>", cards.join("")),
        )
    }

    #[tokio::test]
    async fn test_unsupported_sender_recorded() {
        let store = MemoryHitStore::new();
        let message = MailMessage::new("m1", "noreply@example.com", "<html></html>");

        let result = run_parse(&store, &[message]).await.unwrap();

        assert_eq!(result.unsupported, 1);
        assert_eq!(result.hits, 0);
        let outcome = store.message_outcome("m1").unwrap();
        assert_eq!(outcome.status, ParseStatus::Unsupported);
    }

    #[tokio::test]
    async fn test_parses_and_persists_hits() {
        let store = MemoryHitStore::new();
        let message = seek_message(
            "m1",
            &[seek_card("a", "First Role"), seek_card("b", "Second Role")],
        );

        let result = run_parse(&store, &[message]).await.unwrap();

        assert_eq!(result.hits, 2);
        assert_eq!(store.hit_count(), 2);

        let outcome = store.message_outcome("m1").unwrap();
        assert_eq!(outcome.status, ParseStatus::Parsed);
        assert_eq!(outcome.hit_count, 2);
        assert_eq!(outcome.parser_name.as_deref(), Some("seek_alert_parser"));
        assert!(outcome.confidence.is_some());
    }

    #[tokio::test]
    async fn test_supported_but_empty_message() {
        let store = MemoryHitStore::new();
        let message = seek_message("m1", &[]);

        let result = run_parse(&store, &[message]).await.unwrap();

        assert_eq!(result.empty, 1);
        let outcome = store.message_outcome("m1").unwrap();
        assert_eq!(outcome.status, ParseStatus::Empty);
        // The parser matched the sender but found nothing: suspicious, not zero.
        assert_eq!(outcome.confidence, Some(10));
    }

    #[tokio::test]
    async fn test_reparse_is_idempotent() {
        let store = MemoryHitStore::new();
        let message = seek_message("m1", &[seek_card("a", "First Role")]);

        run_parse(&store, std::slice::from_ref(&message)).await.unwrap();
        run_parse(&store, &[message]).await.unwrap();

        assert_eq!(store.hit_count(), 1);
    }
}
