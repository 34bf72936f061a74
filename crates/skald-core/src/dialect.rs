use serde::{Deserialize, Serialize};

/// One historical schema for a conversation-log record.
///
/// Declaration order doubles as detection priority: the newest/most specific
/// dialect first, `Generic` last. Ties in evidence score resolve to the
/// earlier variant, and the derived `Ord` follows the same order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FormatDialect {
    /// Current nested-envelope format, block-structured `message.content`.
    CurrentV2,
    /// Earlier nested-envelope format, plain-string `message.content`.
    CurrentV1,
    /// Tool-centric call/result stream; invocations split across records
    /// and correlated by `call_id`.
    ToolResult,
    /// Flat early format: `role`/`content`/`timestamp` at top level.
    Legacy,
    /// Best-effort fallback for any JSON object.
    Generic,
}

/// Detection and tie-break priority order. Kept as an explicit constant so
/// tests can pin it.
pub const DIALECT_PRIORITY: [FormatDialect; 5] = [
    FormatDialect::CurrentV2,
    FormatDialect::CurrentV1,
    FormatDialect::ToolResult,
    FormatDialect::Legacy,
    FormatDialect::Generic,
];

/// How a dialect arranges one logical record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeShape {
    /// Message body nested under a `message` envelope.
    Nested,
    /// All fields at the top level of the record.
    Flat,
    /// Record stream where calls and results are separate records.
    Stream,
}

impl FormatDialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormatDialect::CurrentV2 => "current_v2",
            FormatDialect::CurrentV1 => "current_v1",
            FormatDialect::ToolResult => "tool_result",
            FormatDialect::Legacy => "legacy",
            FormatDialect::Generic => "generic",
        }
    }

    pub fn envelope_shape(&self) -> EnvelopeShape {
        match self {
            FormatDialect::CurrentV2 | FormatDialect::CurrentV1 => EnvelopeShape::Nested,
            FormatDialect::ToolResult => EnvelopeShape::Stream,
            FormatDialect::Legacy | FormatDialect::Generic => EnvelopeShape::Flat,
        }
    }

    /// Discriminating fields that must all be present on a record for a
    /// Fast-mode short-circuit. `Generic` has none and never short-circuits.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            FormatDialect::CurrentV2 | FormatDialect::CurrentV1 => {
                &["type", "uuid", "message"]
            }
            FormatDialect::ToolResult => &["type", "call_id"],
            FormatDialect::Legacy => &["role", "content"],
            FormatDialect::Generic => &[],
        }
    }

    /// Every top-level field the dialect understands and maps (or carries
    /// through). Drives detection evidence and migration diagnostics.
    pub fn known_fields(&self) -> &'static [&'static str] {
        match self {
            FormatDialect::CurrentV2 => &[
                "type",
                "uuid",
                "parentUuid",
                "sessionId",
                "timestamp",
                "message",
                "requestId",
                "isSidechain",
                "userType",
                "cwd",
                "version",
                "toolUseResult",
            ],
            FormatDialect::CurrentV1 => &[
                "type",
                "uuid",
                "parentUuid",
                "sessionId",
                "timestamp",
                "message",
                "cwd",
                "version",
            ],
            FormatDialect::ToolResult => &[
                "type",
                "call_id",
                "name",
                "arguments",
                "output",
                "status",
                "timestamp",
                "id",
                "role",
                "content",
            ],
            FormatDialect::Legacy => &[
                "role",
                "content",
                "timestamp",
                "id",
                "parent_id",
                "tool_calls",
                "model",
                "tokens",
            ],
            FormatDialect::Generic => &[
                "role",
                "sender",
                "author",
                "speaker",
                "content",
                "text",
                "message",
                "body",
                "timestamp",
                "ts",
                "time",
                "created_at",
                "date",
            ],
        }
    }
}

impl std::fmt::Display for FormatDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
