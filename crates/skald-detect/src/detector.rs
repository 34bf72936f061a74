use crate::evidence::{DetectionEvidence, DialectEvidence};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use skald_core::{FormatDialect, RawRecord, DIALECT_PRIORITY};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

/// Hard clamp on how many leading records detection may examine.
const MIN_SAMPLES: usize = 5;
const MAX_SAMPLES: usize = 20;

fn uuid_re() -> &'static Regex {
    static UUID_RE: OnceLock<Regex> = OnceLock::new();
    UUID_RE.get_or_init(|| {
        Regex::new(
            r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$",
        )
        .expect("valid uuid regex")
    })
}

fn timestampish_re() -> &'static Regex {
    static TS_RE: OnceLock<Regex> = OnceLock::new();
    TS_RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}[T ]").expect("valid timestamp regex"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    /// Score every dialect against every sample.
    Enhanced,
    /// Short-circuit on the first dialect whose required fields all appear
    /// in the first sample; falls back to Enhanced below the threshold.
    Fast,
}

impl Default for DetectionMode {
    fn default() -> Self {
        DetectionMode::Enhanced
    }
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Leading records to examine, clamped to 5–20.
    pub max_samples: usize,
    /// Minimum single-sample score for a Fast-mode short-circuit.
    pub fast_threshold: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_samples: 10,
            fast_threshold: 0.5,
        }
    }
}

impl DetectorConfig {
    pub fn sample_budget(&self) -> usize {
        self.max_samples.clamp(MIN_SAMPLES, MAX_SAMPLES)
    }
}

/// A ranked detection decision with its supporting evidence.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub dialect: FormatDialect,
    pub evidence: DetectionEvidence,
    /// Winning score normalized against the runner-up margin, in [0, 1].
    pub confidence: f64,
}

impl Detection {
    /// Defined result for a source with no records: `Generic`, confidence 0.
    pub fn empty_source() -> Self {
        Self {
            dialect: FormatDialect::Generic,
            evidence: DetectionEvidence::default(),
            confidence: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetectError {
    /// No sample parsed as a JSON object; the source is not a record stream
    /// any dialect (including `Generic`) can handle.
    #[error("no dialect matched any sample record")]
    UnrecognizedFormat,
}

/// Decide which dialect a source speaks from its leading records.
///
/// Pure function of its inputs; callers cache results keyed on a sample
/// fingerprint. Zero samples is a defined non-fatal case.
pub fn detect(
    samples: &[RawRecord],
    mode: DetectionMode,
    config: &DetectorConfig,
) -> Result<Detection, DetectError> {
    if samples.is_empty() {
        return Ok(Detection::empty_source());
    }
    let window = &samples[..samples.len().min(config.sample_budget())];

    if mode == DetectionMode::Fast {
        if let Some(detection) = fast_probe(window, config) {
            return Ok(detection);
        }
        // No confident single-sample match; do the full scan.
    }

    enhanced(window)
}

/// Fast path: first dialect (priority order) whose required discriminators
/// are all present in the first sample and whose single-sample score clears
/// the threshold.
fn fast_probe(window: &[RawRecord], config: &DetectorConfig) -> Option<Detection> {
    let first = parse_object(&window[0].raw)?;
    for dialect in DIALECT_PRIORITY {
        if dialect == FormatDialect::Generic {
            continue;
        }
        let required = dialect.required_fields();
        if !required.iter().all(|f| first.contains_key(*f)) {
            continue;
        }
        let (score, matched) = score_sample(dialect, &first);
        if score < config.fast_threshold {
            continue;
        }
        debug!(dialect = %dialect, score, "fast detection short-circuit");
        let mut evidence = DetectionEvidence::default();
        evidence.by_dialect.insert(
            dialect,
            DialectEvidence {
                score,
                matched_fields: matched.into_iter().map(str::to_string).collect(),
                sample_count: 1,
            },
        );
        return Some(Detection {
            dialect,
            evidence,
            confidence: score,
        });
    }
    None
}

fn enhanced(window: &[RawRecord]) -> Result<Detection, DetectError> {
    let objects: Vec<Map<String, Value>> = window
        .iter()
        .filter_map(|r| parse_object(&r.raw))
        .collect();
    if objects.is_empty() {
        return Err(DetectError::UnrecognizedFormat);
    }

    let mut evidence = DetectionEvidence::default();
    for dialect in DIALECT_PRIORITY {
        let mut entry = DialectEvidence {
            sample_count: objects.len(),
            ..Default::default()
        };
        let mut sum = 0.0;
        for obj in &objects {
            let (score, matched) = score_sample(dialect, obj);
            sum += score;
            entry
                .matched_fields
                .extend(matched.into_iter().map(str::to_string));
        }
        entry.score = sum / objects.len() as f64;
        evidence.by_dialect.insert(dialect, entry);
    }

    let ranked = evidence.ranked();
    let (dialect, win) = ranked[0];
    let runner_up = ranked.get(1).map_or(0.0, |(_, s)| *s);
    let confidence = ((win + (win - runner_up)) / 2.0).clamp(0.0, 1.0);
    debug!(dialect = %dialect, win, runner_up, confidence, "enhanced detection");
    Ok(Detection {
        dialect,
        evidence,
        confidence,
    })
}

fn parse_object(raw: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}

fn is_timestampish(obj: &Map<String, Value>, key: &str) -> bool {
    match obj.get(key) {
        Some(Value::String(s)) => timestampish_re().is_match(s),
        Some(Value::Number(_)) => true,
        _ => false,
    }
}

/// Score one sample against one dialect: matched weight over total weight,
/// plus the names of the discriminating fields that matched.
fn score_sample(
    dialect: FormatDialect,
    obj: &Map<String, Value>,
) -> (f64, Vec<&'static str>) {
    let mut matched: Vec<&'static str> = Vec::new();
    let mut won = 0u32;
    let mut hit = |weight: u32, field: &'static str, m: &mut Vec<&'static str>| {
        won += weight;
        m.push(field);
    };

    let total: u32 = match dialect {
        FormatDialect::CurrentV2 | FormatDialect::CurrentV1 => {
            if matches!(str_field(obj, "type"), Some("user" | "assistant" | "system")) {
                hit(2, "type", &mut matched);
            }
            match str_field(obj, "uuid") {
                Some(s) if uuid_re().is_match(s) => hit(2, "uuid", &mut matched),
                Some(_) => hit(1, "uuid", &mut matched),
                None => {}
            }
            if let Some(message) = obj.get("message").and_then(Value::as_object) {
                hit(2, "message", &mut matched);
                let want_blocks = dialect == FormatDialect::CurrentV2;
                match message.get("content") {
                    Some(Value::Array(_)) if want_blocks => {
                        hit(3, "message.content", &mut matched)
                    }
                    Some(Value::String(_)) if !want_blocks => {
                        hit(3, "message.content", &mut matched)
                    }
                    _ => {}
                }
            }
            if is_timestampish(obj, "timestamp") {
                hit(1, "timestamp", &mut matched);
            }
            if obj.contains_key("parentUuid") {
                hit(1, "parentUuid", &mut matched);
            }
            if obj.contains_key("sessionId") {
                hit(1, "sessionId", &mut matched);
            }
            12
        }
        FormatDialect::ToolResult => {
            match str_field(obj, "type") {
                Some("function_call" | "function_call_output") => {
                    hit(3, "type", &mut matched)
                }
                Some("message") => hit(1, "type", &mut matched),
                _ => {}
            }
            if str_field(obj, "call_id").is_some() {
                hit(3, "call_id", &mut matched);
            }
            if obj.contains_key("name") || obj.contains_key("arguments") {
                hit(1, "arguments", &mut matched);
            }
            if obj.contains_key("output") {
                hit(1, "output", &mut matched);
            }
            if is_timestampish(obj, "timestamp") {
                hit(1, "timestamp", &mut matched);
            }
            9
        }
        FormatDialect::Legacy => {
            if matches!(
                str_field(obj, "role"),
                Some("user" | "assistant" | "system" | "tool")
            ) {
                hit(3, "role", &mut matched);
            }
            if matches!(obj.get("content"), Some(Value::String(_))) {
                hit(3, "content", &mut matched);
            }
            if is_timestampish(obj, "timestamp") {
                hit(1, "timestamp", &mut matched);
            }
            if obj.contains_key("id") {
                hit(1, "id", &mut matched);
            }
            if obj.contains_key("parent_id") {
                hit(1, "parent_id", &mut matched);
            }
            9
        }
        FormatDialect::Generic => {
            // Baseline for any object, plus a little for each heuristic
            // family, capped well below the specific dialects.
            let mut score = 0.2f64;
            if ["role", "sender", "author", "speaker"]
                .iter()
                .any(|k| obj.contains_key(*k))
            {
                score += 0.05;
                matched.push("role");
            }
            if ["content", "text", "message", "body"]
                .iter()
                .any(|k| obj.contains_key(*k))
            {
                score += 0.05;
                matched.push("content");
            }
            if ["timestamp", "ts", "time", "created_at", "date"]
                .iter()
                .any(|k| obj.contains_key(*k))
            {
                score += 0.05;
                matched.push("timestamp");
            }
            return (score, matched);
        }
    };

    (won as f64 / total as f64, matched)
}
