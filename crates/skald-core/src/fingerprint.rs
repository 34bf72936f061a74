use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Deterministic content digest used as a cache key: BLAKE3 over a byte-length
/// frame plus the SHA-256 content hash. Two sources with identical bytes map
/// to the same fingerprint no matter where they were read from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of_bytes(content: &[u8]) -> Self {
        let content_hash = sha256_hex(content);
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(content.len() as u64).to_le_bytes());
        hasher.update(content_hash.as_bytes());
        Fingerprint(hasher.finalize().to_hex()[..32].to_string())
    }

    /// Fingerprint of a sample window: each line length-framed so that
    /// `["ab", "c"]` and `["a", "bc"]` stay distinct.
    pub fn of_lines<'a, I>(lines: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut hasher = blake3::Hasher::new();
        let mut total: u64 = 0;
        for line in lines {
            hasher.update(&(line.len() as u64).to_le_bytes());
            hasher.update(line.as_bytes());
            total += line.len() as u64;
        }
        hasher.update(&total.to_le_bytes());
        Fingerprint(hasher.finalize().to_hex()[..32].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute SHA-256 hash of bytes, returning lowercase hex string.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Deterministic id for a record that carries none of its own: UUIDv5 over
/// the source fingerprint and line number, so reparsing the same source
/// synthesizes the same ids.
pub fn synthetic_message_id(fingerprint: &Fingerprint, line_number: u64) -> String {
    let material = format!("{}:{}", fingerprint.as_str(), line_number);
    format!(
        "msg_{}",
        Uuid::new_v5(&Uuid::NAMESPACE_OID, material.as_bytes())
    )
}
