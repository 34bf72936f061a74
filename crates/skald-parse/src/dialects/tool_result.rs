//! Parser for the tool-centric call/result stream dialect. Invocations are
//! split across records: a `function_call` opens the invocation and a later
//! `function_call_output` answers it via `call_id`. Plain `message` records
//! carry the conversation around the calls.

use super::{
    invalid_field, missing_field, record_id, required_timestamp, stash_unmapped, value_to_text,
    ParsedRecord, RecordCx, ToolResolution,
};
use serde_json::{Map, Value};
use skald_core::{
    CanonicalMessage, FormatDialect, ParseError, RawRecord, Role, ToolCallRecord, ToolStatus,
};

const MAPPED_CALL: &[&str] = &["type", "id", "call_id", "name", "arguments", "timestamp"];
const MAPPED_MESSAGE: &[&str] = &["type", "id", "role", "content", "timestamp"];

pub(crate) fn parse(
    obj: &Map<String, Value>,
    record: &RawRecord,
    cx: RecordCx<'_>,
) -> Result<ParsedRecord, ParseError> {
    let record_type = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| missing_field(record, "type"))?;

    match record_type {
        "function_call" => parse_call(obj, record, cx),
        "function_call_output" => parse_output(obj, record, cx),
        "message" => parse_message(obj, record, cx),
        other => Err(invalid_field(
            record,
            format!("unknown record type `{other}`"),
        )),
    }
}

fn parse_call(
    obj: &Map<String, Value>,
    record: &RawRecord,
    cx: RecordCx<'_>,
) -> Result<ParsedRecord, ParseError> {
    let timestamp = required_timestamp(obj, "timestamp", record, cx)?;
    let id = record_id(obj, &["id"], record, cx);
    let mut message =
        CanonicalMessage::new(id.clone(), Role::Assistant, "", timestamp.clone(), FormatDialect::ToolResult);

    if cx.extract_tools {
        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| missing_field(record, "name"))?;
        let call_id = obj
            .get("call_id")
            .and_then(Value::as_str)
            .ok_or_else(|| missing_field(record, "call_id"))?;
        message.tool_calls.push(ToolCallRecord {
            tool_name: name.to_string(),
            input: parse_arguments(obj.get("arguments")),
            output: None,
            status: ToolStatus::Pending,
            started_at: Some(timestamp),
            duration_ms: None,
            linked_message_id: id,
            call_id: Some(call_id.to_string()),
        });
    }
    stash_unmapped(&mut message, obj, MAPPED_CALL);
    Ok(ParsedRecord::message(message))
}

fn parse_output(
    obj: &Map<String, Value>,
    record: &RawRecord,
    cx: RecordCx<'_>,
) -> Result<ParsedRecord, ParseError> {
    if !cx.extract_tools {
        // Without tool extraction there is nothing to resolve; the record
        // contributes nothing rather than failing.
        return Ok(ParsedRecord {
            message: None,
            resolutions: Vec::new(),
        });
    }
    let output_raw = obj.get("output").cloned().unwrap_or(Value::Null);
    // Outputs often arrive as JSON serialized into a string; unwrap one level.
    let output = match &output_raw {
        Value::String(s) => serde_json::from_str::<Value>(s).unwrap_or(output_raw.clone()),
        other => other.clone(),
    };
    let is_error = matches!(
        obj.get("status").and_then(Value::as_str),
        Some("failed" | "error")
    );
    Ok(ParsedRecord {
        message: None,
        resolutions: vec![ToolResolution {
            call_id: obj
                .get("call_id")
                .and_then(Value::as_str)
                .map(str::to_string),
            output,
            is_error,
            duration_ms: obj.get("duration_ms").and_then(Value::as_u64),
            raw: Value::Object(obj.clone()),
        }],
    })
}

fn parse_message(
    obj: &Map<String, Value>,
    record: &RawRecord,
    cx: RecordCx<'_>,
) -> Result<ParsedRecord, ParseError> {
    let role = match obj.get("role").and_then(Value::as_str) {
        Some("user") => Role::User,
        Some("assistant") | None => Role::Assistant,
        Some("system") => Role::System,
        Some("tool") => Role::Tool,
        Some(other) => {
            return Err(invalid_field(record, format!("unknown role `{other}`")));
        }
    };
    let timestamp = required_timestamp(obj, "timestamp", record, cx)?;
    let id = record_id(obj, &["id"], record, cx);
    let content = obj
        .get("content")
        .map(|c| match c {
            Value::Array(blocks) => blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n"),
            other => value_to_text(other),
        })
        .unwrap_or_default();

    let mut message =
        CanonicalMessage::new(id, role, content, timestamp, FormatDialect::ToolResult);
    stash_unmapped(&mut message, obj, MAPPED_MESSAGE);
    Ok(ParsedRecord::message(message))
}

fn parse_arguments(value: Option<&Value>) -> Value {
    match value {
        Some(Value::String(s)) => {
            serde_json::from_str::<Value>(s).unwrap_or_else(|_| Value::String(s.clone()))
        }
        Some(other) => other.clone(),
        None => Value::Null,
    }
}
