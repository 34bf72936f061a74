//! Dialect of last resort: best-effort mapping for any JSON object via
//! role/content/timestamp field-name heuristics. Never fails on an object;
//! records that defeat the heuristics become `system` messages carrying the
//! raw JSON as content.

use super::{record_id, ParsedRecord, RecordCx};
use serde_json::{json, Map, Value};
use skald_core::timeutil;
use skald_core::{CanonicalMessage, FormatDialect, ParseError, RawRecord, Role};

const ROLE_KEYS: &[&str] = &["role", "sender", "author", "speaker"];
const CONTENT_KEYS: &[&str] = &["content", "text", "message", "body"];
const TIME_KEYS: &[&str] = &["timestamp", "ts", "time", "created_at", "date"];
const ID_KEYS: &[&str] = &["id", "uuid", "message_id"];
const PARENT_KEYS: &[&str] = &["parent_id", "parentId", "parentUuid"];

pub(crate) fn parse(
    obj: &Map<String, Value>,
    record: &RawRecord,
    cx: RecordCx<'_>,
) -> Result<ParsedRecord, ParseError> {
    let mut consumed: Vec<&str> = Vec::new();

    let (role, raw_role) = match first_string(obj, ROLE_KEYS, &mut consumed) {
        Some(value) => match role_from(&value) {
            Some(role) => (role, None),
            None => (Role::System, Some(value)),
        },
        None => (Role::System, None),
    };

    let content = match first_present(obj, CONTENT_KEYS, &mut consumed) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        // No recognizable body: the whole record is the content.
        None => Value::Object(obj.clone()).to_string(),
    };

    // The fallback never rejects a record over its timestamp; an absent or
    // unreadable one degrades to arrival order.
    let timestamp = first_present(obj, TIME_KEYS, &mut consumed)
        .and_then(timeutil::parse_timestamp)
        .unwrap_or_else(|| timeutil::arrival_order_timestamp(record.line_number));

    let id = record_id(obj, ID_KEYS, record, cx);
    consumed.extend(ID_KEYS.iter().copied().filter(|k| obj.contains_key(*k)));

    let mut message =
        CanonicalMessage::new(id, role, content, timestamp, FormatDialect::Generic);
    message.parent_id = first_string(obj, PARENT_KEYS, &mut consumed);

    if let Some(raw_role) = raw_role {
        message.push_extra("raw_role", json!(raw_role));
    }
    for (key, value) in obj {
        if consumed.contains(&key.as_str()) {
            continue;
        }
        message.push_extra(key.clone(), value.clone());
    }
    Ok(ParsedRecord::message(message))
}

fn first_present<'a>(
    obj: &'a Map<String, Value>,
    keys: &[&'static str],
    consumed: &mut Vec<&'static str>,
) -> Option<&'a Value> {
    for key in keys {
        if let Some(value) = obj.get(*key) {
            if !value.is_null() {
                consumed.push(key);
                return Some(value);
            }
        }
    }
    None
}

fn first_string(
    obj: &Map<String, Value>,
    keys: &[&'static str],
    consumed: &mut Vec<&'static str>,
) -> Option<String> {
    for key in keys {
        if let Some(s) = obj.get(*key).and_then(Value::as_str) {
            consumed.push(key);
            return Some(s.to_string());
        }
    }
    None
}

fn role_from(raw: &str) -> Option<Role> {
    match raw.to_ascii_lowercase().as_str() {
        "user" | "human" => Some(Role::User),
        "assistant" | "ai" | "bot" | "model" => Some(Role::Assistant),
        "system" => Some(Role::System),
        "tool" | "function" => Some(Role::Tool),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialects::parse_record;
    use crate::policy::ErrorPolicy;
    use skald_core::Fingerprint;

    fn cx(seed: &Fingerprint) -> RecordCx<'_> {
        RecordCx {
            id_seed: seed,
            policy: ErrorPolicy::Lenient,
            extract_tools: true,
        }
    }

    #[test]
    fn field_name_heuristics_apply() {
        let seed = Fingerprint::of_bytes(b"t");
        let record = RawRecord::new(
            r#"{"sender":"human","text":"hi there","ts":1700000000}"#,
            1,
            0,
        );
        let parsed = parse_record(FormatDialect::Generic, &record, cx(&seed)).unwrap();
        let msg = parsed.message.unwrap();
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "hi there");
        assert!(msg.timestamp.starts_with("2023-11-14T"));
    }

    #[test]
    fn defeated_heuristics_fall_back_to_sentinel() {
        let seed = Fingerprint::of_bytes(b"t");
        let record = RawRecord::new(r#"{"not":"a message"}"#, 5, 0);
        let parsed = parse_record(FormatDialect::Generic, &record, cx(&seed)).unwrap();
        let msg = parsed.message.unwrap();
        assert_eq!(msg.role, Role::System);
        assert_eq!(msg.content, r#"{"not":"a message"}"#);
        assert!(msg.timestamp.starts_with("1970-01-01T00:00:05"));
        assert!(msg.id.starts_with("msg_"));
    }

    #[test]
    fn unknown_role_string_preserved() {
        let seed = Fingerprint::of_bytes(b"t");
        let record = RawRecord::new(r#"{"role":"narrator","content":"once upon"}"#, 1, 0);
        let parsed = parse_record(FormatDialect::Generic, &record, cx(&seed)).unwrap();
        let msg = parsed.message.unwrap();
        assert_eq!(msg.role, Role::System);
        assert_eq!(msg.extra["raw_role"], json!("narrator"));
    }

    #[test]
    fn non_object_json_is_malformed() {
        let seed = Fingerprint::of_bytes(b"t");
        for raw in [r#""just a string""#, "[1,2]", "42"] {
            let record = RawRecord::new(raw, 1, 0);
            let err = parse_record(FormatDialect::Generic, &record, cx(&seed)).unwrap_err();
            assert_eq!(err.code, skald_core::ErrorCode::MalformedJson);
        }
    }

    #[test]
    fn unconsumed_fields_survive_in_extra() {
        let seed = Fingerprint::of_bytes(b"t");
        let record = RawRecord::new(
            r#"{"role":"user","content":"hi","custom_field":{"a":1}}"#,
            1,
            0,
        );
        let parsed = parse_record(FormatDialect::Generic, &record, cx(&seed)).unwrap();
        let msg = parsed.message.unwrap();
        assert_eq!(msg.extra["custom_field"], json!({"a":1}));
        assert!(!msg.extra.contains_key("role"));
        assert!(!msg.extra.contains_key("content"));
    }

    #[test]
    fn object_content_serialized_compactly() {
        let seed = Fingerprint::of_bytes(b"t");
        let record = RawRecord::new(r#"{"role":"user","content":{"k":"v"}}"#, 1, 0);
        let parsed = parse_record(FormatDialect::Generic, &record, cx(&seed)).unwrap();
        assert_eq!(parsed.message.unwrap().content, r#"{"k":"v"}"#);
    }
}
