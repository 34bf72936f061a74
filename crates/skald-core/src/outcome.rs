use crate::dialect::FormatDialect;
use crate::error::ParseError;
use crate::message::{CanonicalMessage, TokenUsage};
use serde::{Deserialize, Serialize};

/// Aggregate analytics for one parsed source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseMetadata {
    pub message_count: usize,
    pub tool_call_count: usize,
    pub token_totals: TokenUsage,
    /// Distinct roles with at least one message.
    pub participant_count: usize,
    /// Total record-level errors seen, including those the skip policy did
    /// not retain in `errors`.
    pub error_count: usize,
    pub processing_time_ms: u64,
}

/// Everything one parse of one source produced. Immutable once assembled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseOutcome {
    pub messages: Vec<CanonicalMessage>,
    pub dialect: FormatDialect,
    pub errors: Vec<ParseError>,
    pub metadata: ParseMetadata,
}

impl ParseOutcome {
    pub fn empty(dialect: FormatDialect) -> Self {
        Self {
            messages: Vec::new(),
            dialect,
            errors: Vec::new(),
            metadata: ParseMetadata::default(),
        }
    }

    /// Rough in-memory footprint, used as the cache size estimate.
    pub fn size_estimate_bytes(&self) -> u64 {
        let msg_bytes: usize = self
            .messages
            .iter()
            .map(|m| {
                m.id.len()
                    + m.content.len()
                    + m.timestamp.len()
                    + m.extra
                        .iter()
                        .map(|(k, v)| k.len() + v.to_string().len())
                        .sum::<usize>()
                    + m.tool_calls.len() * 64
                    + 96
            })
            .sum();
        let err_bytes: usize = self.errors.iter().map(|e| e.snippet.len() + 48).sum();
        (msg_bytes + err_bytes) as u64
    }
}
