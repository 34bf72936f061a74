//! Outcome assembly: aggregate counters over the normalized messages.

use crate::config::ParserConfig;
use skald_core::{
    CanonicalMessage, FormatDialect, ParseError, ParseMetadata, ParseOutcome, Role, TokenUsage,
};
use std::collections::BTreeSet;
use std::time::Duration;

pub(crate) fn assemble_outcome(
    messages: Vec<CanonicalMessage>,
    errors: Vec<ParseError>,
    error_count: usize,
    dialect: FormatDialect,
    config: &ParserConfig,
    elapsed: Duration,
) -> ParseOutcome {
    let mut metadata = ParseMetadata {
        message_count: messages.len(),
        error_count,
        processing_time_ms: elapsed.as_millis() as u64,
        ..Default::default()
    };

    if config.include_metadata {
        let mut token_totals = TokenUsage::default();
        let mut participants: BTreeSet<Role> = BTreeSet::new();
        let mut tool_call_count = 0;
        for msg in &messages {
            participants.insert(msg.role);
            tool_call_count += msg.tool_calls.len();
            if let Some(usage) = &msg.token_usage {
                token_totals.add(usage);
            }
        }
        metadata.token_totals = token_totals;
        metadata.participant_count = participants.len();
        metadata.tool_call_count = tool_call_count;
    }

    ParseOutcome {
        messages,
        dialect,
        errors,
        metadata,
    }
}
