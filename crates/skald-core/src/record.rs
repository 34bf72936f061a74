/// One line of input as read from a source: the raw text plus where it was
/// found. Immutable once read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub raw: String,
    /// 1-based physical line number within the source.
    pub line_number: u64,
    /// Byte offset of the first byte of this line within the source.
    pub byte_offset: u64,
}

impl RawRecord {
    pub fn new(raw: impl Into<String>, line_number: u64, byte_offset: u64) -> Self {
        Self {
            raw: raw.into(),
            line_number,
            byte_offset,
        }
    }
}
