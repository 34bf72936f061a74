//! Parsers for the nested-envelope dialects: block-structured content
//! (`CurrentV2`) and plain-string content (`CurrentV1`). Both wrap the
//! message body under a `message` object with camelCase metadata around it.

use super::{
    invalid_field, missing_field, record_id, required_timestamp, stash_unmapped, value_to_text,
    ParsedRecord, RecordCx, ToolResolution,
};
use serde_json::{json, Map, Value};
use skald_core::{
    CanonicalMessage, FormatDialect, ParseError, RawRecord, Role, TokenUsage, ToolCallRecord,
    ToolStatus,
};

/// Top-level fields with a canonical slot; everything else lands in `extra`.
const MAPPED: &[&str] = &["type", "uuid", "parentUuid", "timestamp", "message"];

pub(crate) fn parse(
    obj: &Map<String, Value>,
    record: &RawRecord,
    cx: RecordCx<'_>,
    dialect: FormatDialect,
) -> Result<ParsedRecord, ParseError> {
    let record_type = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| missing_field(record, "type"))?;
    let envelope = match obj.get("message") {
        Some(Value::Object(envelope)) => envelope,
        Some(_) => return Err(invalid_field(record, "`message` must be an object")),
        None => return Err(missing_field(record, "message")),
    };

    // The envelope role wins when it disagrees with the record type (tool
    // results arrive as `user` records with a `user` envelope either way).
    let role = match envelope.get("role").and_then(Value::as_str) {
        Some(r) => role_from(r).ok_or_else(|| {
            invalid_field(record, format!("unknown message role `{r}`"))
        })?,
        None => role_from(record_type)
            .ok_or_else(|| invalid_field(record, format!("unknown record type `{record_type}`")))?,
    };

    let timestamp = required_timestamp(obj, "timestamp", record, cx)?;
    let id = record_id(obj, &["uuid"], record, cx);
    let mut message = CanonicalMessage::new(id.clone(), role, "", timestamp.clone(), dialect);
    message.parent_id = obj
        .get("parentUuid")
        .and_then(Value::as_str)
        .map(str::to_string);

    let mut resolutions = Vec::new();
    match envelope.get("content") {
        Some(Value::String(text)) => message.content = text.clone(),
        Some(Value::Array(blocks)) => {
            let text = collect_blocks(blocks, cx, &id, &timestamp, &mut message, &mut resolutions);
            message.content = text;
        }
        Some(other) => message.content = value_to_text(other),
        None => {}
    }

    if let Some(usage) = envelope.get("usage").and_then(Value::as_object) {
        message.token_usage = Some(usage_from(usage));
    }
    // Envelope fields beyond role/content/usage (model, stop_reason, ...)
    // have no canonical slot.
    for (key, value) in envelope {
        if matches!(key.as_str(), "role" | "content" | "usage") {
            continue;
        }
        message.push_extra(format!("message.{key}"), value.clone());
    }
    stash_unmapped(&mut message, obj, MAPPED);

    Ok(ParsedRecord {
        message: Some(message),
        resolutions,
    })
}

/// Walk the content blocks: text joins into `content`, tool_use becomes a
/// pending invocation, tool_result becomes a resolution for an earlier call,
/// thinking and unknown blocks are preserved in `extra`.
fn collect_blocks(
    blocks: &[Value],
    cx: RecordCx<'_>,
    message_id: &str,
    timestamp: &str,
    message: &mut CanonicalMessage,
    resolutions: &mut Vec<ToolResolution>,
) -> String {
    let mut texts: Vec<&str> = Vec::new();
    let mut thinking: Vec<&str> = Vec::new();
    let mut unmapped: Vec<Value> = Vec::new();

    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    texts.push(text);
                }
            }
            Some("thinking") => {
                if let Some(text) = block.get("thinking").and_then(Value::as_str) {
                    thinking.push(text);
                }
            }
            Some("tool_use") if cx.extract_tools => {
                message.tool_calls.push(ToolCallRecord {
                    tool_name: block
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown")
                        .to_string(),
                    input: block.get("input").cloned().unwrap_or(Value::Null),
                    output: None,
                    status: ToolStatus::Pending,
                    started_at: Some(timestamp.to_string()),
                    duration_ms: None,
                    linked_message_id: message_id.to_string(),
                    call_id: block
                        .get("id")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                });
            }
            Some("tool_result") if cx.extract_tools => {
                resolutions.push(ToolResolution {
                    call_id: block
                        .get("tool_use_id")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    output: block.get("content").cloned().unwrap_or(Value::Null),
                    is_error: block
                        .get("is_error")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                    duration_ms: None,
                    raw: block.clone(),
                });
            }
            Some("tool_use") | Some("tool_result") => {}
            _ => unmapped.push(block.clone()),
        }
    }

    if !thinking.is_empty() {
        message.push_extra("thinking", json!(thinking.join("\n")));
    }
    if !unmapped.is_empty() {
        message.push_extra("unmapped_blocks", Value::Array(unmapped));
    }
    texts.join("\n")
}

fn role_from(raw: &str) -> Option<Role> {
    match raw {
        "user" => Some(Role::User),
        "assistant" => Some(Role::Assistant),
        "system" => Some(Role::System),
        _ => None,
    }
}

fn usage_from(usage: &Map<String, Value>) -> TokenUsage {
    let count = |key: &str| usage.get(key).and_then(Value::as_u64).unwrap_or(0);
    TokenUsage {
        input: count("input_tokens"),
        output: count("output_tokens"),
        cache_read: count("cache_read_input_tokens"),
        cache_write: count("cache_creation_input_tokens"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialects::parse_record;
    use crate::policy::ErrorPolicy;
    use skald_core::{ErrorCode, Fingerprint};

    fn cx(seed: &Fingerprint) -> RecordCx<'_> {
        RecordCx {
            id_seed: seed,
            policy: ErrorPolicy::Lenient,
            extract_tools: true,
        }
    }

    fn rec(raw: &str) -> RawRecord {
        RawRecord::new(raw, 1, 0)
    }

    #[test]
    fn v2_blocks_map_to_text_and_tool_calls() {
        let seed = Fingerprint::of_bytes(b"t");
        let raw = r#"{"type":"assistant","uuid":"a1","parentUuid":"u1","sessionId":"s1","timestamp":"2024-05-01T10:00:00Z","message":{"role":"assistant","content":[{"type":"text","text":"Let me check"},{"type":"tool_use","id":"toolu_1","name":"Bash","input":{"cmd":"ls"}}],"usage":{"input_tokens":9,"output_tokens":5,"cache_read_input_tokens":2,"cache_creation_input_tokens":1}}}"#;
        let record = rec(raw);
        let parsed = parse_record(FormatDialect::CurrentV2, &record, cx(&seed)).unwrap();
        let msg = parsed.message.unwrap();

        assert_eq!(msg.id, "a1");
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content, "Let me check");
        assert_eq!(msg.parent_id.as_deref(), Some("u1"));
        assert_eq!(msg.tool_calls.len(), 1);
        assert_eq!(msg.tool_calls[0].tool_name, "Bash");
        assert_eq!(msg.tool_calls[0].status, ToolStatus::Pending);
        assert_eq!(msg.tool_calls[0].call_id.as_deref(), Some("toolu_1"));
        let usage = msg.token_usage.unwrap();
        assert_eq!(usage.input, 9);
        assert_eq!(usage.cache_write, 1);
        // Unmapped top-level fields survive in extra.
        assert_eq!(msg.extra["sessionId"], serde_json::json!("s1"));
    }

    #[test]
    fn tool_result_blocks_become_resolutions() {
        let seed = Fingerprint::of_bytes(b"t");
        let raw = r#"{"type":"user","uuid":"u2","timestamp":"2024-05-01T10:00:05Z","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"toolu_1","content":"file.txt","is_error":false}]}}"#;
        let record = rec(raw);
        let parsed = parse_record(FormatDialect::CurrentV2, &record, cx(&seed)).unwrap();
        assert!(parsed.message.is_some());
        assert_eq!(parsed.resolutions.len(), 1);
        assert_eq!(parsed.resolutions[0].call_id.as_deref(), Some("toolu_1"));
        assert!(!parsed.resolutions[0].is_error);
    }

    #[test]
    fn v1_string_content_maps_directly() {
        let seed = Fingerprint::of_bytes(b"t");
        let raw = r#"{"type":"user","uuid":"u1","timestamp":"2024-05-01T10:00:00Z","message":{"role":"user","content":"plain question"}}"#;
        let record = rec(raw);
        let parsed = parse_record(FormatDialect::CurrentV1, &record, cx(&seed)).unwrap();
        let msg = parsed.message.unwrap();
        assert_eq!(msg.content, "plain question");
        assert_eq!(msg.raw_format, FormatDialect::CurrentV1);
    }

    #[test]
    fn missing_timestamp_rejected_under_lenient() {
        let seed = Fingerprint::of_bytes(b"t");
        let raw = r#"{"type":"user","uuid":"u1","message":{"role":"user","content":"hi"}}"#;
        let record = rec(raw);
        let err = parse_record(FormatDialect::CurrentV2, &record, cx(&seed)).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingRequiredField);
    }

    #[test]
    fn missing_timestamp_defaulted_under_skip() {
        let seed = Fingerprint::of_bytes(b"t");
        let raw = r#"{"type":"user","uuid":"u1","message":{"role":"user","content":"hi"}}"#;
        let record = RawRecord::new(raw, 7, 0);
        let skip_cx = RecordCx {
            id_seed: &seed,
            policy: ErrorPolicy::Skip,
            extract_tools: true,
        };
        let parsed = parse_record(FormatDialect::CurrentV2, &record, skip_cx).unwrap();
        let msg = parsed.message.unwrap();
        assert!(msg.timestamp.starts_with("1970-01-01T00:00:07"));
    }

    #[test]
    fn thinking_blocks_preserved_in_extra() {
        let seed = Fingerprint::of_bytes(b"t");
        let raw = r#"{"type":"assistant","uuid":"a1","timestamp":"2024-05-01T10:00:00Z","message":{"role":"assistant","content":[{"type":"thinking","thinking":"hmm"},{"type":"text","text":"answer"}]}}"#;
        let record = rec(raw);
        let parsed = parse_record(FormatDialect::CurrentV2, &record, cx(&seed)).unwrap();
        let msg = parsed.message.unwrap();
        assert_eq!(msg.content, "answer");
        assert_eq!(msg.extra["thinking"], serde_json::json!("hmm"));
    }

    #[test]
    fn tool_extraction_can_be_disabled() {
        let seed = Fingerprint::of_bytes(b"t");
        let raw = r#"{"type":"assistant","uuid":"a1","timestamp":"2024-05-01T10:00:00Z","message":{"role":"assistant","content":[{"type":"tool_use","id":"toolu_1","name":"Bash","input":{}}]}}"#;
        let record = rec(raw);
        let no_tools = RecordCx {
            id_seed: &seed,
            policy: ErrorPolicy::Lenient,
            extract_tools: false,
        };
        let parsed = parse_record(FormatDialect::CurrentV2, &record, no_tools).unwrap();
        assert!(parsed.message.unwrap().tool_calls.is_empty());
        assert!(parsed.resolutions.is_empty());
    }

    #[test]
    fn invalid_role_rejected() {
        let seed = Fingerprint::of_bytes(b"t");
        let raw = r#"{"type":"user","uuid":"u1","timestamp":"2024-05-01T10:00:00Z","message":{"role":"robot","content":"hi"}}"#;
        let record = rec(raw);
        let err = parse_record(FormatDialect::CurrentV2, &record, cx(&seed)).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidFieldValue);
    }
}
