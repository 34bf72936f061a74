use skald_core::FormatDialect;
use std::collections::{BTreeMap, BTreeSet};

/// Accumulated support for one dialect across the sample window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DialectEvidence {
    /// Aggregate match score in [0, 1]: mean per-sample field coverage.
    pub score: f64,
    /// Union of discriminating fields seen across samples.
    pub matched_fields: BTreeSet<String>,
    /// Number of samples that parsed as JSON objects and were scored.
    pub sample_count: usize,
}

/// Per-dialect evidence justifying a detection decision.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionEvidence {
    pub by_dialect: BTreeMap<FormatDialect, DialectEvidence>,
}

impl DetectionEvidence {
    pub fn score_of(&self, dialect: FormatDialect) -> f64 {
        self.by_dialect.get(&dialect).map_or(0.0, |e| e.score)
    }

    /// Best and runner-up scores, in dialect priority order on ties.
    pub fn ranked(&self) -> Vec<(FormatDialect, f64)> {
        let mut ranked: Vec<(FormatDialect, f64)> = skald_core::DIALECT_PRIORITY
            .iter()
            .map(|d| (*d, self.score_of(*d)))
            .collect();
        // Stable sort keeps priority order among equal scores.
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranking_breaks_ties_by_priority() {
        let mut evidence = DetectionEvidence::default();
        for d in [FormatDialect::CurrentV1, FormatDialect::Legacy] {
            evidence.by_dialect.insert(
                d,
                DialectEvidence {
                    score: 0.8,
                    matched_fields: BTreeSet::new(),
                    sample_count: 1,
                },
            );
        }
        let ranked = evidence.ranked();
        assert_eq!(ranked[0].0, FormatDialect::CurrentV1);
        assert_eq!(ranked[1].0, FormatDialect::Legacy);
    }

    #[test]
    fn missing_dialect_scores_zero() {
        let evidence = DetectionEvidence::default();
        assert_eq!(evidence.score_of(FormatDialect::CurrentV2), 0.0);
    }
}
