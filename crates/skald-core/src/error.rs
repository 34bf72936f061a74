use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Retained error snippets are truncated to this many bytes, at a char
/// boundary.
pub const MAX_SNIPPET_BYTES: usize = 160;

/// Closed taxonomy of record-level failures. Callers branch on the code,
/// not on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    MalformedJson,
    MissingRequiredField,
    InvalidFieldValue,
    UnlinkableToolResult,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MalformedJson => "malformed_json",
            ErrorCode::MissingRequiredField => "missing_required_field",
            ErrorCode::InvalidFieldValue => "invalid_field_value",
            ErrorCode::UnlinkableToolResult => "unlinkable_tool_result",
        }
    }

    pub fn default_severity(&self) -> Severity {
        match self {
            ErrorCode::UnlinkableToolResult => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// A record-level parse failure. Whether it aborts, is retained, or is only
/// counted depends on the active error policy.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{} at line {line_number} (offset {byte_offset}): {snippet}", .code.as_str())]
pub struct ParseError {
    pub code: ErrorCode,
    pub line_number: u64,
    pub byte_offset: u64,
    pub severity: Severity,
    /// Offending record text, truncated to [`MAX_SNIPPET_BYTES`].
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ParseError {
    pub fn new(code: ErrorCode, line_number: u64, byte_offset: u64, raw: &str) -> Self {
        Self {
            code,
            line_number,
            byte_offset,
            severity: code.default_severity(),
            snippet: truncate_snippet(raw, MAX_SNIPPET_BYTES),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Source-level failures. Always fatal for the whole source and surfaced to
/// the caller regardless of error policy.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no dialect matched the sample records from `{source_name}`")]
    UnrecognizedFormat { source_name: String },
    #[error("source `{source_name}` is {size} bytes, over the {limit}-byte limit")]
    SourceTooLarge {
        source_name: String,
        size: u64,
        limit: u64,
    },
    #[error("i/o failure reading `{source_name}`")]
    Io {
        source_name: String,
        #[source]
        cause: std::io::Error,
    },
}

/// Return the largest byte index `<= i` that is a valid char boundary.
/// Equivalent to `str::floor_char_boundary` (unstable nightly API).
pub fn floor_char_boundary(s: &str, i: usize) -> usize {
    if i >= s.len() {
        return s.len();
    }
    let mut pos = i;
    while pos > 0 && !s.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// Truncate to at most `max` bytes without splitting a char.
pub fn truncate_snippet(s: &str, max: usize) -> String {
    let end = floor_char_boundary(s, max);
    s[..end].to_string()
}
