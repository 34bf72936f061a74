use crate::policy::ErrorPolicy;
use serde::{Deserialize, Deserializer};
use skald_detect::DetectionMode;
use std::time::Duration;

pub const DEFAULT_CACHE_SIZE: usize = 1000;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;
pub const DEFAULT_MAX_SAMPLES: usize = 10;

/// Recognized parser options. Every field has a default, so partial config
/// files (YAML or JSON) only name what they change.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "snake_case", deny_unknown_fields)]
pub struct ParserConfig {
    pub enable_caching: bool,
    /// Entry bound shared by the outcome and detection caches.
    pub cache_size: usize,
    /// Seconds in config files.
    #[serde(deserialize_with = "duration_from_secs", rename = "cache_ttl_secs")]
    pub cache_ttl: Duration,
    pub detection_mode: DetectionMode,
    pub error_handling: ErrorPolicy,
    /// Sources over this many bytes are rejected before parsing begins.
    pub max_file_size: u64,
    pub extract_tool_usage: bool,
    pub include_metadata: bool,
    /// Leading records offered to the detector (clamped 5–20 there).
    pub max_samples: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            enable_caching: true,
            cache_size: DEFAULT_CACHE_SIZE,
            cache_ttl: DEFAULT_CACHE_TTL,
            detection_mode: DetectionMode::Enhanced,
            error_handling: ErrorPolicy::Lenient,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            extract_tool_usage: true,
            include_metadata: true,
            max_samples: DEFAULT_MAX_SAMPLES,
        }
    }
}

impl ParserConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(s)
    }
}

fn duration_from_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = u64::deserialize(deserializer)?;
    Ok(Duration::from_secs(secs))
}
