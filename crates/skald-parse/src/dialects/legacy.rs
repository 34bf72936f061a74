//! Parser for the flat early format: `role`/`content`/`timestamp` at top
//! level, optional `id`/`parent_id` threading, and tool invocations embedded
//! whole (call and result in one record) under `tool_calls`.

use super::{
    invalid_field, missing_field, record_id, required_timestamp, stash_unmapped, ParsedRecord,
    RecordCx,
};
use serde_json::{Map, Value};
use skald_core::{
    CanonicalMessage, FormatDialect, ParseError, RawRecord, Role, TokenUsage, ToolCallRecord,
    ToolStatus,
};

const MAPPED: &[&str] = &[
    "role",
    "content",
    "timestamp",
    "id",
    "parent_id",
    "tool_calls",
    "tokens",
];

pub(crate) fn parse(
    obj: &Map<String, Value>,
    record: &RawRecord,
    cx: RecordCx<'_>,
) -> Result<ParsedRecord, ParseError> {
    let role = match obj.get("role") {
        None => return Err(missing_field(record, "role")),
        Some(Value::String(s)) => match s.as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "system" => Role::System,
            "tool" => Role::Tool,
            other => {
                return Err(invalid_field(record, format!("unknown role `{other}`")));
            }
        },
        Some(_) => return Err(invalid_field(record, "`role` must be a string")),
    };

    let content = match obj.get("content") {
        None => return Err(missing_field(record, "content")),
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(invalid_field(record, "`content` must be a string")),
    };

    let timestamp = required_timestamp(obj, "timestamp", record, cx)?;
    let id = record_id(obj, &["id"], record, cx);
    let mut message = CanonicalMessage::new(
        id.clone(),
        role,
        content,
        timestamp.clone(),
        FormatDialect::Legacy,
    );
    message.parent_id = obj
        .get("parent_id")
        .and_then(Value::as_str)
        .map(str::to_string);

    if cx.extract_tools {
        if let Some(calls) = obj.get("tool_calls").and_then(Value::as_array) {
            for call in calls {
                message
                    .tool_calls
                    .push(embedded_call(call, &id, &timestamp));
            }
        }
    }

    if let Some(tokens) = obj.get("tokens").and_then(Value::as_object) {
        let count = |key: &str| tokens.get(key).and_then(Value::as_u64).unwrap_or(0);
        message.token_usage = Some(TokenUsage {
            input: count("input"),
            output: count("output"),
            cache_read: count("cache_read"),
            cache_write: count("cache_write"),
        });
    }

    stash_unmapped(&mut message, obj, MAPPED);
    Ok(ParsedRecord::message(message))
}

/// Embedded invocations carry call and result together; there is nothing to
/// correlate later. Status comes from the record, else from whether an
/// output is present.
fn embedded_call(call: &Value, message_id: &str, timestamp: &str) -> ToolCallRecord {
    let output = call.get("output").cloned();
    let status = match call.get("status").and_then(Value::as_str) {
        Some("error" | "failed") => ToolStatus::Error,
        Some("success" | "ok" | "completed") => ToolStatus::Success,
        Some("pending") | None if output.is_none() => ToolStatus::Pending,
        _ => ToolStatus::Success,
    };
    ToolCallRecord {
        tool_name: call
            .get("name")
            .or_else(|| call.get("tool_name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
        input: call
            .get("input")
            .or_else(|| call.get("arguments"))
            .cloned()
            .unwrap_or(Value::Null),
        output,
        status,
        started_at: Some(timestamp.to_string()),
        duration_ms: call.get("duration_ms").and_then(Value::as_u64),
        linked_message_id: message_id.to_string(),
        call_id: call.get("id").and_then(Value::as_str).map(str::to_string),
    }
}
