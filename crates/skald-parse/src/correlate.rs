//! Record-order threading: depth computation, tool-call correlation across
//! records, and the error-policy gate. One pipeline instance drives both the
//! buffered and the streaming parse, so the two paths cannot diverge.

use crate::dialects::{parse_record, ParsedRecord, RecordCx, ToolResolution};
use crate::policy::ErrorPolicy;
use serde_json::{json, Value};
use skald_core::{
    CanonicalMessage, ErrorCode, Fingerprint, FormatDialect, ParseError, RawRecord, ToolStatus,
};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Where a pending invocation lives, so a later result record can land on it.
#[derive(Debug, Clone)]
struct PendingCall {
    message_id: String,
    call_index: usize,
}

/// Pairs result records with their originating calls via the correlation id.
#[derive(Debug, Default)]
struct ToolCorrelator {
    pending: HashMap<String, PendingCall>,
}

impl ToolCorrelator {
    fn register(&mut self, call_id: String, message_id: String, call_index: usize) {
        self.pending.insert(
            call_id,
            PendingCall {
                message_id,
                call_index,
            },
        );
    }

    fn resolve(&mut self, call_id: &str) -> Option<PendingCall> {
        self.pending.remove(call_id)
    }
}

/// What `feed` tells the caller to do next.
pub(crate) enum Feed {
    /// Record consumed; pull ready messages and continue.
    Continue,
    /// Record failed under lenient policy; surface the error and continue.
    RecordError(ParseError),
    /// Strict policy: abandon the parse, discarding partial output.
    Abort(ParseError),
}

pub(crate) struct RecordPipeline {
    dialect: FormatDialect,
    policy: ErrorPolicy,
    id_seed: Fingerprint,
    extract_tools: bool,
    /// id → depth for every message seen, for the depth invariant.
    depths: HashMap<String, u32>,
    correlator: ToolCorrelator,
    /// Messages held back until their tool calls resolve; FIFO order.
    hold: VecDeque<CanonicalMessage>,
    ready: VecDeque<CanonicalMessage>,
    /// Errors retained for the outcome (lenient only).
    pub(crate) errors: Vec<ParseError>,
    /// All record-level errors seen, whatever the policy retained.
    pub(crate) error_count: usize,
}

impl RecordPipeline {
    pub(crate) fn new(
        dialect: FormatDialect,
        policy: ErrorPolicy,
        id_seed: Fingerprint,
        extract_tools: bool,
    ) -> Self {
        Self {
            dialect,
            policy,
            id_seed,
            extract_tools,
            depths: HashMap::new(),
            correlator: ToolCorrelator::default(),
            hold: VecDeque::new(),
            ready: VecDeque::new(),
            errors: Vec::new(),
            error_count: 0,
        }
    }

    pub(crate) fn feed(&mut self, record: &RawRecord) -> Feed {
        let cx = RecordCx {
            id_seed: &self.id_seed,
            policy: self.policy,
            extract_tools: self.extract_tools,
        };
        let parsed = match parse_record(self.dialect, record, cx) {
            Ok(parsed) => parsed,
            Err(err) => return self.record_error(err),
        };

        let ParsedRecord {
            message,
            resolutions,
        } = parsed;
        let carrier_id = message.as_ref().map(|m| m.id.clone());

        if let Some(mut msg) = message {
            self.assign_depth(&mut msg);
            if self.extract_tools {
                for (idx, call) in msg.tool_calls.iter().enumerate() {
                    if call.status == ToolStatus::Pending {
                        if let Some(call_id) = &call.call_id {
                            self.correlator
                                .register(call_id.clone(), msg.id.clone(), idx);
                        }
                    }
                }
            }
            self.hold.push_back(msg);
        }

        for resolution in resolutions {
            if let Some(err) = self.apply_resolution(record, &resolution, carrier_id.as_deref()) {
                return self.record_error(err);
            }
        }

        self.drain_ready();
        Feed::Continue
    }

    /// End of input: remaining held messages flush in order. Invocations
    /// whose result never arrived stay pending.
    pub(crate) fn finish(&mut self) {
        self.ready.extend(self.hold.drain(..));
    }

    pub(crate) fn pop_ready(&mut self) -> Option<CanonicalMessage> {
        self.ready.pop_front()
    }

    pub(crate) fn take_all_ready(&mut self) -> Vec<CanonicalMessage> {
        self.ready.drain(..).collect()
    }

    fn record_error(&mut self, err: ParseError) -> Feed {
        self.error_count += 1;
        match self.policy {
            ErrorPolicy::Strict => {
                self.hold.clear();
                self.ready.clear();
                Feed::Abort(err)
            }
            ErrorPolicy::Lenient => {
                self.errors.push(err.clone());
                Feed::RecordError(err)
            }
            ErrorPolicy::Skip => {
                debug!(code = err.code.as_str(), line = err.line_number, "record skipped");
                Feed::Continue
            }
        }
    }

    /// Depth invariant: `depth == parent.depth + 1` when the parent is known,
    /// else 0. A dangling parent reference is demoted to `extra` so chains
    /// never point outside the conversation.
    fn assign_depth(&mut self, msg: &mut CanonicalMessage) {
        if let Some(parent_id) = msg.parent_id.clone() {
            match self.depths.get(&parent_id) {
                Some(parent_depth) => msg.depth = parent_depth + 1,
                None => {
                    msg.push_extra("orphaned_parent_id", json!(parent_id));
                    msg.parent_id = None;
                    msg.depth = 0;
                }
            }
        } else {
            msg.depth = 0;
        }
        self.depths.insert(msg.id.clone(), msg.depth);
    }

    /// Land a tool result on its originating call: explicit `call_id` first,
    /// positional pairing within the carrying message as fallback. Unlinkable
    /// results are kept in `extra` and reported as a warning.
    fn apply_resolution(
        &mut self,
        record: &RawRecord,
        resolution: &ToolResolution,
        carrier_id: Option<&str>,
    ) -> Option<ParseError> {
        let target = match &resolution.call_id {
            Some(call_id) => self.correlator.resolve(call_id),
            None => carrier_id.and_then(|id| self.first_pending_in(id)),
        };

        let Some(target) = target else {
            self.retain_unlinked(resolution, carrier_id);
            return Some(
                ParseError::new(
                    ErrorCode::UnlinkableToolResult,
                    record.line_number,
                    record.byte_offset,
                    &record.raw,
                )
                .with_suggestion("no prior tool call matches this result"),
            );
        };

        if let Some(msg) = self.held_mut(&target.message_id) {
            if let Some(call) = msg.tool_calls.get_mut(target.call_index) {
                call.output = Some(resolution.output.clone());
                call.status = if resolution.is_error {
                    ToolStatus::Error
                } else {
                    ToolStatus::Success
                };
                if call.duration_ms.is_none() {
                    call.duration_ms = resolution.duration_ms;
                }
            }
        }
        None
    }

    /// Positional fallback: first still-pending call of the carrying message.
    fn first_pending_in(&self, message_id: &str) -> Option<PendingCall> {
        let msg = self.hold.iter().find(|m| m.id == message_id)?;
        msg.tool_calls
            .iter()
            .position(|c| c.status == ToolStatus::Pending)
            .map(|call_index| PendingCall {
                message_id: message_id.to_string(),
                call_index,
            })
    }

    fn held_mut(&mut self, message_id: &str) -> Option<&mut CanonicalMessage> {
        self.hold.iter_mut().find(|m| m.id == message_id)
    }

    fn retain_unlinked(&mut self, resolution: &ToolResolution, carrier_id: Option<&str>) {
        // Best effort: the carrying message if the result was embedded, else
        // the most recent message still in the pipeline.
        let target = match carrier_id {
            Some(id) => self.held_mut(id),
            None => self.hold.back_mut().or(self.ready.back_mut()),
        };
        if let Some(msg) = target {
            let entry = msg
                .extra
                .entry("unlinked_tool_results".to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(list) = entry {
                list.push(resolution.raw.clone());
            }
        }
    }

    /// Release held messages in FIFO order, stopping at the first one still
    /// waiting on a tool result. This is the stream's small read-ahead: a
    /// message is yielded as soon as nothing before it can change anymore.
    fn drain_ready(&mut self) {
        while let Some(head) = self.hold.front() {
            if head.has_pending_tool_calls() {
                break;
            }
            let msg = self.hold.pop_front().expect("front checked above");
            self.ready.push_back(msg);
        }
    }
}
