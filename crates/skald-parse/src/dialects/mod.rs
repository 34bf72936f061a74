pub(crate) mod current;
pub(crate) mod generic;
pub(crate) mod legacy;
pub(crate) mod tool_result;

use crate::policy::ErrorPolicy;
use serde_json::{Map, Value};
use skald_core::timeutil;
use skald_core::{
    synthetic_message_id, CanonicalMessage, ErrorCode, Fingerprint, FormatDialect, ParseError,
    RawRecord,
};

/// What one raw record parsed into: at most one canonical message, plus any
/// tool-result payloads answering calls made earlier in the stream.
#[derive(Debug)]
pub(crate) struct ParsedRecord {
    pub message: Option<CanonicalMessage>,
    pub resolutions: Vec<ToolResolution>,
}

impl ParsedRecord {
    pub(crate) fn message(message: CanonicalMessage) -> Self {
        Self {
            message: Some(message),
            resolutions: Vec::new(),
        }
    }
}

/// A tool result to be correlated back to its originating call.
#[derive(Debug, Clone)]
pub(crate) struct ToolResolution {
    /// Explicit correlation id; `None` means positional pairing within the
    /// carrying message.
    pub call_id: Option<String>,
    pub output: Value,
    pub is_error: bool,
    pub duration_ms: Option<u64>,
    /// The raw result payload, retained in `extra` when unlinkable.
    pub raw: Value,
}

/// Per-parse context shared by all dialect parsers.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RecordCx<'a> {
    pub id_seed: &'a Fingerprint,
    pub policy: ErrorPolicy,
    pub extract_tools: bool,
}

/// Closed dispatch: one parsing strategy per dialect, selected once per
/// source by the detector.
pub(crate) fn parse_record(
    dialect: FormatDialect,
    record: &RawRecord,
    cx: RecordCx<'_>,
) -> Result<ParsedRecord, ParseError> {
    let value: Value = serde_json::from_str(&record.raw).map_err(|_| {
        ParseError::new(
            ErrorCode::MalformedJson,
            record.line_number,
            record.byte_offset,
            &record.raw,
        )
        .with_suggestion("record is not valid JSON")
    })?;
    let Value::Object(obj) = value else {
        return Err(ParseError::new(
            ErrorCode::MalformedJson,
            record.line_number,
            record.byte_offset,
            &record.raw,
        )
        .with_suggestion("top-level JSON must be an object"));
    };

    match dialect {
        FormatDialect::CurrentV2 | FormatDialect::CurrentV1 => {
            current::parse(&obj, record, cx, dialect)
        }
        FormatDialect::ToolResult => tool_result::parse(&obj, record, cx),
        FormatDialect::Legacy => legacy::parse(&obj, record, cx),
        FormatDialect::Generic => generic::parse(&obj, record, cx),
    }
}

/// Pull a required timestamp. Missing timestamps are rejected under
/// strict/lenient but defaulted to arrival order under skip; present but
/// unparseable values are always rejected.
pub(crate) fn required_timestamp(
    obj: &Map<String, Value>,
    key: &str,
    record: &RawRecord,
    cx: RecordCx<'_>,
) -> Result<String, ParseError> {
    match obj.get(key) {
        None | Some(Value::Null) => {
            if cx.policy == ErrorPolicy::Skip {
                Ok(timeutil::arrival_order_timestamp(record.line_number))
            } else {
                Err(ParseError::new(
                    ErrorCode::MissingRequiredField,
                    record.line_number,
                    record.byte_offset,
                    &record.raw,
                )
                .with_suggestion(format!("record has no `{key}` field")))
            }
        }
        Some(value) => timeutil::parse_timestamp(value).ok_or_else(|| {
            ParseError::new(
                ErrorCode::InvalidFieldValue,
                record.line_number,
                record.byte_offset,
                &record.raw,
            )
            .with_suggestion(format!("`{key}` is not an RFC3339 or unix timestamp"))
        }),
    }
}

pub(crate) fn missing_field(record: &RawRecord, field: &str) -> ParseError {
    ParseError::new(
        ErrorCode::MissingRequiredField,
        record.line_number,
        record.byte_offset,
        &record.raw,
    )
    .with_suggestion(format!("record has no `{field}` field"))
}

pub(crate) fn invalid_field(record: &RawRecord, detail: impl Into<String>) -> ParseError {
    ParseError::new(
        ErrorCode::InvalidFieldValue,
        record.line_number,
        record.byte_offset,
        &record.raw,
    )
    .with_suggestion(detail)
}

/// First string value among `keys`, else a deterministic synthesized id.
pub(crate) fn record_id(
    obj: &Map<String, Value>,
    keys: &[&str],
    record: &RawRecord,
    cx: RecordCx<'_>,
) -> String {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| synthetic_message_id(cx.id_seed, record.line_number))
}

/// Preserve every top-level field without a canonical slot in `extra`, so
/// no information is lost even for fields the model does not understand.
pub(crate) fn stash_unmapped(
    message: &mut CanonicalMessage,
    obj: &Map<String, Value>,
    mapped: &[&str],
) {
    for (key, value) in obj {
        if mapped.contains(&key.as_str()) {
            continue;
        }
        message.push_extra(key.clone(), value.clone());
    }
}

/// Collapse a JSON value to display text: strings verbatim, everything else
/// compact JSON.
pub(crate) fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
