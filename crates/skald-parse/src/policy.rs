use serde::{Deserialize, Serialize};

/// What to do with a malformed record. Governs record-level errors only;
/// source-level failures always abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// First record error aborts the whole parse; partial output discarded.
    Strict,
    /// Record the error and continue; the record yields no message.
    Lenient,
    /// Continue and keep only aggregate counts, not the error list.
    Skip,
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        ErrorPolicy::Lenient
    }
}

impl ErrorPolicy {
    pub fn aborts_on_error(&self) -> bool {
        matches!(self, ErrorPolicy::Strict)
    }

    pub fn retains_errors(&self) -> bool {
        matches!(self, ErrorPolicy::Lenient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_lenient() {
        assert_eq!(ErrorPolicy::default(), ErrorPolicy::Lenient);
    }

    #[test]
    fn only_strict_aborts() {
        assert!(ErrorPolicy::Strict.aborts_on_error());
        assert!(!ErrorPolicy::Lenient.aborts_on_error());
        assert!(!ErrorPolicy::Skip.aborts_on_error());
    }

    #[test]
    fn only_lenient_retains() {
        assert!(ErrorPolicy::Lenient.retains_errors());
        assert!(!ErrorPolicy::Skip.retains_errors());
    }

    #[test]
    fn serde_names_are_lowercase() {
        let p: ErrorPolicy = serde_json::from_str("\"skip\"").unwrap();
        assert_eq!(p, ErrorPolicy::Skip);
    }
}
