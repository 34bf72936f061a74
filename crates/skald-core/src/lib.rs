pub mod dialect;
pub mod error;
pub mod fingerprint;
pub mod message;
pub mod outcome;
pub mod record;
pub mod timeutil;

pub use dialect::{FormatDialect, DIALECT_PRIORITY};
pub use error::{ErrorCode, ParseError, Severity, SourceError, MAX_SNIPPET_BYTES};
pub use fingerprint::{synthetic_message_id, Fingerprint};
pub use message::{CanonicalMessage, Role, TokenUsage, ToolCallRecord, ToolStatus};
pub use outcome::{ParseMetadata, ParseOutcome};
pub use record::RawRecord;
