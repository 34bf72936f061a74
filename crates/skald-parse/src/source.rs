use skald_core::{RawRecord, SourceError};
use std::io::{BufRead, BufReader, Cursor, Read};
use std::path::Path;

/// A readable line-delimited source: an open file, an in-memory buffer, or
/// any byte stream. The engine treats it as an opaque line producer; opening
/// and watching paths is the caller's concern.
pub struct LogSource {
    name: String,
    reader: Box<dyn Read + Send>,
    known_len: Option<u64>,
}

impl LogSource {
    pub fn from_path(path: &Path) -> Result<Self, SourceError> {
        let name = path.display().to_string();
        let file = std::fs::File::open(path).map_err(|cause| SourceError::Io {
            source_name: name.clone(),
            cause,
        })?;
        let known_len = file.metadata().ok().map(|m| m.len());
        Ok(Self {
            name,
            reader: Box::new(file),
            known_len,
        })
    }

    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let known_len = Some(bytes.len() as u64);
        Self {
            name: name.into(),
            reader: Box::new(Cursor::new(bytes)),
            known_len,
        }
    }

    pub fn from_str(name: impl Into<String>, text: &str) -> Self {
        Self::from_bytes(name, text.as_bytes().to_vec())
    }

    /// Wrap an already-open reader of unknown length. The size limit is then
    /// enforced while reading instead of up front.
    pub fn from_reader(name: impl Into<String>, reader: impl Read + Send + 'static) -> Self {
        Self {
            name: name.into(),
            reader: Box::new(reader),
            known_len: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn known_len(&self) -> Option<u64> {
        self.known_len
    }

    /// Buffer the whole source, rejecting anything over `limit` — before
    /// reading when the length is known, otherwise as soon as the budget is
    /// crossed.
    pub(crate) fn read_all(self, limit: u64) -> Result<(String, Vec<u8>), SourceError> {
        let name = self.name;
        if let Some(len) = self.known_len {
            if len > limit {
                return Err(SourceError::SourceTooLarge {
                    source_name: name,
                    size: len,
                    limit,
                });
            }
        }
        let mut bytes = Vec::new();
        let mut reader = self.reader.take(limit.saturating_add(1));
        reader
            .read_to_end(&mut bytes)
            .map_err(|cause| SourceError::Io {
                source_name: name.clone(),
                cause,
            })?;
        if bytes.len() as u64 > limit {
            return Err(SourceError::SourceTooLarge {
                source_name: name,
                size: bytes.len() as u64,
                limit,
            });
        }
        Ok((name, bytes))
    }
}

/// Split buffered bytes into records, skipping blank lines but keeping
/// physical line numbers and byte offsets.
pub(crate) fn split_records(bytes: &[u8]) -> Vec<RawRecord> {
    let mut records = Vec::new();
    let mut offset: u64 = 0;
    let mut line_number: u64 = 0;
    for line in bytes.split(|&b| b == b'\n') {
        line_number += 1;
        let line_offset = offset;
        offset += line.len() as u64 + 1;
        let trimmed = trim_cr(line);
        if trimmed.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let raw = String::from_utf8_lossy(trimmed).into_owned();
        records.push(RawRecord::new(raw, line_number, line_offset));
    }
    records
}

fn trim_cr(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}

/// Pull-based record reader for the streaming path. Tracks offsets the same
/// way `split_records` does and enforces the byte budget incrementally.
pub(crate) struct RecordReader {
    name: String,
    reader: BufReader<Box<dyn Read + Send>>,
    line_number: u64,
    byte_offset: u64,
    limit: u64,
}

impl RecordReader {
    pub(crate) fn new(source: LogSource, limit: u64) -> Result<Self, SourceError> {
        if let Some(len) = source.known_len {
            if len > limit {
                return Err(SourceError::SourceTooLarge {
                    source_name: source.name,
                    size: len,
                    limit,
                });
            }
        }
        Ok(Self {
            name: source.name,
            reader: BufReader::new(source.reader),
            line_number: 0,
            byte_offset: 0,
            limit,
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Next non-blank record, or `None` at end of input.
    pub(crate) fn next_record(&mut self) -> Result<Option<RawRecord>, SourceError> {
        loop {
            let mut line = String::new();
            let start = self.byte_offset;
            let n = self
                .reader
                .read_line(&mut line)
                .map_err(|cause| SourceError::Io {
                    source_name: self.name.clone(),
                    cause,
                })?;
            if n == 0 {
                return Ok(None);
            }
            self.line_number += 1;
            self.byte_offset += n as u64;
            if self.byte_offset > self.limit {
                return Err(SourceError::SourceTooLarge {
                    source_name: self.name.clone(),
                    size: self.byte_offset,
                    limit: self.limit,
                });
            }
            let trimmed = line.trim_end_matches(['\n', '\r']);
            if trimmed.trim().is_empty() {
                continue;
            }
            return Ok(Some(RawRecord::new(trimmed, self.line_number, start)));
        }
    }
}
