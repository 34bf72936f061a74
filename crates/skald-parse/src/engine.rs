//! The orchestrator: fingerprint, cache lookup, detection, the per-record
//! loop under the configured error policy, analytics, and cache store.
//! Buffered (`parse`) and streaming (`parse_stream`) share one pipeline
//! implementation, so a cache hit or a stream can never diverge from a
//! fresh buffered parse.

use crate::analytics::assemble_outcome;
use crate::config::ParserConfig;
use crate::correlate::{Feed, RecordPipeline};
use crate::source::{split_records, LogSource, RecordReader};
use skald_cache::{CacheConfig, ResultCache};
use skald_core::{
    CanonicalMessage, Fingerprint, FormatDialect, ParseError, ParseOutcome, RawRecord, SourceError,
};
use skald_detect::{detect, Detection, DetectorConfig};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::debug;

/// How a parse call can fail: a fatal source-level problem, or (strict
/// policy only) the record error that aborted it.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Record(#[from] ParseError),
}

pub type OutcomeCache = ResultCache<Fingerprint, Arc<ParseOutcome>>;
pub type DetectionCache = ResultCache<Fingerprint, Detection>;

/// Rough footprint of a cached detection result.
const DETECTION_SIZE_ESTIMATE: u64 = 512;

pub struct ParseEngine {
    config: ParserConfig,
    outcome_cache: Arc<OutcomeCache>,
    detection_cache: Arc<DetectionCache>,
}

impl ParseEngine {
    /// Engine with its own private caches sized from the config. Two engines
    /// built this way never observe each other's entries.
    pub fn new(config: ParserConfig) -> Self {
        let cache_config = CacheConfig {
            max_entries: config.cache_size,
            max_bytes: None,
            default_ttl: Some(config.cache_ttl),
            sweep_interval: config.cache_ttl,
        };
        let outcome_cache = Arc::new(ResultCache::new(cache_config.clone()));
        let detection_cache = Arc::new(ResultCache::new(cache_config));
        Self::with_shared_caches(config, outcome_cache, detection_cache)
    }

    /// Engine over caches the caller owns, for deliberate sharing across
    /// engines parsing in parallel.
    pub fn with_shared_caches(
        config: ParserConfig,
        outcome_cache: Arc<OutcomeCache>,
        detection_cache: Arc<DetectionCache>,
    ) -> Self {
        Self {
            config,
            outcome_cache,
            detection_cache,
        }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn outcome_cache(&self) -> &Arc<OutcomeCache> {
        &self.outcome_cache
    }

    pub fn detection_cache(&self) -> &Arc<DetectionCache> {
        &self.detection_cache
    }

    /// Buffered parse of one source.
    ///
    /// Cached outcomes are returned verbatim; the cache is an optimization,
    /// never a source of different behavior. Under the strict policy the
    /// first record error aborts and nothing partial is returned or cached.
    pub fn parse(&self, source: LogSource) -> Result<Arc<ParseOutcome>, EngineError> {
        let started = Instant::now();
        let (name, bytes) = source.read_all(self.config.max_file_size)?;
        let fingerprint = Fingerprint::of_bytes(&bytes);

        if self.config.enable_caching {
            if let Some(hit) = self.outcome_cache.get(&fingerprint) {
                debug!(source = %name, "outcome cache hit");
                return Ok(hit);
            }
        }

        let records = split_records(&bytes);
        if records.is_empty() {
            let mut outcome = ParseOutcome::empty(FormatDialect::Generic);
            outcome.metadata.processing_time_ms = started.elapsed().as_millis() as u64;
            let outcome = Arc::new(outcome);
            self.store_outcome(&fingerprint, &outcome);
            return Ok(outcome);
        }

        let sample_len = records.len().min(self.detector_config().sample_budget());
        let samples = &records[..sample_len];
        let detection = self.detect_records(samples, &name)?;
        let id_seed = Fingerprint::of_lines(samples.iter().map(|r| r.raw.as_str()));

        let mut pipeline = RecordPipeline::new(
            detection.dialect,
            self.config.error_handling,
            id_seed,
            self.config.extract_tool_usage,
        );
        for record in &records {
            match pipeline.feed(record) {
                Feed::Abort(err) => return Err(EngineError::Record(err)),
                Feed::Continue | Feed::RecordError(_) => {}
            }
        }
        pipeline.finish();

        let messages = pipeline.take_all_ready();
        let errors = std::mem::take(&mut pipeline.errors);
        let outcome = Arc::new(assemble_outcome(
            messages,
            errors,
            pipeline.error_count,
            detection.dialect,
            &self.config,
            started.elapsed(),
        ));
        self.store_outcome(&fingerprint, &outcome);
        Ok(outcome)
    }

    /// Streaming parse: detection runs up front over the leading records,
    /// then messages are produced one pull at a time. The stream is finite
    /// and non-restartable; dropping it releases the underlying source.
    ///
    /// The outcome cache is not consulted here — the content hash of an
    /// unread stream is unknown — only the detection cache is.
    pub fn parse_stream(&self, source: LogSource) -> Result<MessageStream, EngineError> {
        let mut reader = RecordReader::new(source, self.config.max_file_size)?;
        let budget = self.detector_config().sample_budget();
        let mut samples: Vec<RawRecord> = Vec::with_capacity(budget);
        while samples.len() < budget {
            match reader.next_record()? {
                Some(record) => samples.push(record),
                None => break,
            }
        }

        if samples.is_empty() {
            return Ok(MessageStream::empty(FormatDialect::Generic));
        }

        let detection = self.detect_records(&samples, reader.name())?;
        let id_seed = Fingerprint::of_lines(samples.iter().map(|r| r.raw.as_str()));
        let pipeline = RecordPipeline::new(
            detection.dialect,
            self.config.error_handling,
            id_seed,
            self.config.extract_tool_usage,
        );
        Ok(MessageStream {
            dialect: detection.dialect,
            reader: Some(reader),
            buffered: samples.into(),
            pipeline,
            queued_error: None,
            strict: self.config.error_handling.aborts_on_error(),
            done: false,
        })
    }

    /// Detection, cache-checked by a fingerprint of the sample window.
    fn detect_records(
        &self,
        samples: &[RawRecord],
        source_name: &str,
    ) -> Result<Detection, SourceError> {
        let sample_fp = Fingerprint::of_lines(samples.iter().map(|r| r.raw.as_str()));
        if self.config.enable_caching {
            if let Some(hit) = self.detection_cache.get(&sample_fp) {
                debug!(source = %source_name, dialect = %hit.dialect, "detection cache hit");
                return Ok(hit);
            }
        }
        let detection = detect(samples, self.config.detection_mode, &self.detector_config())
            .map_err(|_| SourceError::UnrecognizedFormat {
                source_name: source_name.to_string(),
            })?;
        debug!(
            source = %source_name,
            dialect = %detection.dialect,
            confidence = detection.confidence,
            "dialect detected"
        );
        if self.config.enable_caching {
            self.detection_cache
                .put(sample_fp, detection.clone(), DETECTION_SIZE_ESTIMATE);
        }
        Ok(detection)
    }

    fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            max_samples: self.config.max_samples,
            ..DetectorConfig::default()
        }
    }

    fn store_outcome(&self, fingerprint: &Fingerprint, outcome: &Arc<ParseOutcome>) {
        if !self.config.enable_caching {
            return;
        }
        self.outcome_cache.put(
            fingerprint.clone(),
            Arc::clone(outcome),
            outcome.size_estimate_bytes(),
        );
    }
}

/// Lazy, finite, non-restartable message sequence (the streaming parse).
///
/// Record-level errors surface inline per the policy: lenient yields
/// `Err` items and keeps going, skip never yields them, strict yields one
/// `Err` and then the stream is fused.
pub struct MessageStream {
    dialect: FormatDialect,
    reader: Option<RecordReader>,
    buffered: VecDeque<RawRecord>,
    pipeline: RecordPipeline,
    queued_error: Option<ParseError>,
    strict: bool,
    done: bool,
}

impl MessageStream {
    fn empty(dialect: FormatDialect) -> Self {
        Self {
            dialect,
            reader: None,
            buffered: VecDeque::new(),
            pipeline: RecordPipeline::new(
                dialect,
                crate::policy::ErrorPolicy::Lenient,
                Fingerprint::of_bytes(&[]),
                false,
            ),
            queued_error: None,
            strict: false,
            done: true,
        }
    }

    /// The dialect detection settled on before the first message.
    pub fn dialect(&self) -> FormatDialect {
        self.dialect
    }

    /// Record-level errors seen so far, including ones not yielded.
    pub fn error_count(&self) -> usize {
        self.pipeline.error_count
    }
}

impl Iterator for MessageStream {
    type Item = Result<CanonicalMessage, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(msg) = self.pipeline.pop_ready() {
                return Some(Ok(msg));
            }
            if let Some(err) = self.queued_error.take() {
                if self.strict {
                    self.done = true;
                    self.reader = None;
                }
                return Some(Err(EngineError::Record(err)));
            }
            if self.done {
                return None;
            }

            let next = match self.buffered.pop_front() {
                Some(record) => Some(record),
                None => match self.reader.as_mut() {
                    Some(reader) => match reader.next_record() {
                        Ok(record) => record,
                        Err(err) => {
                            self.done = true;
                            self.reader = None;
                            return Some(Err(EngineError::Source(err)));
                        }
                    },
                    None => None,
                },
            };

            match next {
                None => {
                    self.done = true;
                    self.reader = None;
                    self.pipeline.finish();
                }
                Some(record) => match self.pipeline.feed(&record) {
                    Feed::Continue => {}
                    Feed::RecordError(err) | Feed::Abort(err) => {
                        self.queued_error = Some(err);
                    }
                },
            }
        }
    }
}
