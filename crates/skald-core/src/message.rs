use crate::dialect::FormatDialect;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Cap on `extra` entries per message. Inserts past the cap are dropped in
/// arrival order so the canonical model stays bounded.
pub const MAX_EXTRA_FIELDS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Pending,
    Success,
    Error,
}

/// Token accounting for one message, and (summed) for a whole parse.
/// Absent counts are zero, never null.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input: u64,
    #[serde(default)]
    pub output: u64,
    #[serde(default)]
    pub cache_read: u64,
    #[serde(default)]
    pub cache_write: u64,
}

impl TokenUsage {
    pub fn is_zero(&self) -> bool {
        self.input == 0 && self.output == 0 && self.cache_read == 0 && self.cache_write == 0
    }

    pub fn add(&mut self, other: &TokenUsage) {
        self.input += other.input;
        self.output += other.output;
        self.cache_read += other.cache_read;
        self.cache_write += other.cache_write;
    }
}

/// One logical tool invocation, call and (once correlated) result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    pub status: ToolStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Id of the message this invocation belongs to.
    pub linked_message_id: String,
    /// Correlation id used to pair the result record, when the dialect
    /// carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
}

/// The normalized, dialect-independent representation of one log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// RFC3339 timestamp, kept verbatim when the source already carried one.
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Number of ancestors reachable via `parent_id`; 0 for roots.
    #[serde(default)]
    pub depth: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    pub raw_format: FormatDialect,
    /// Dialect-specific fields with no canonical slot, preserved verbatim.
    /// Bounded by [`MAX_EXTRA_FIELDS`].
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl CanonicalMessage {
    pub fn new(
        id: impl Into<String>,
        role: Role,
        content: impl Into<String>,
        timestamp: impl Into<String>,
        raw_format: FormatDialect,
    ) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            timestamp: timestamp.into(),
            parent_id: None,
            depth: 0,
            tool_calls: Vec::new(),
            token_usage: None,
            raw_format,
            extra: BTreeMap::new(),
        }
    }

    /// Insert into `extra`, honoring [`MAX_EXTRA_FIELDS`]. Returns `false`
    /// when the bag is full and the value was dropped.
    pub fn push_extra(&mut self, key: impl Into<String>, value: Value) -> bool {
        let key = key.into();
        if self.extra.len() >= MAX_EXTRA_FIELDS && !self.extra.contains_key(&key) {
            return false;
        }
        self.extra.insert(key, value);
        true
    }

    pub fn has_pending_tool_calls(&self) -> bool {
        self.tool_calls
            .iter()
            .any(|tc| tc.status == ToolStatus::Pending)
    }
}
