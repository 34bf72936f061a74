use skald_core::dialect::EnvelopeShape;
use skald_core::FormatDialect;
use std::collections::BTreeSet;

/// Diagnostic estimate of how hard moving records between two dialects is.
/// Reporting only; never consulted on the parse hot path.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationComplexity {
    /// Share of the source dialect's fields the target also understands.
    pub field_overlap: f64,
    /// Source fields with no slot in the target; they survive only in
    /// `extra`. Sorted for stable output.
    pub lossy_fields: Vec<String>,
    /// 0 (trivial) to 1 (structural rework): field loss plus an envelope
    /// reshaping penalty.
    pub effort_score: f64,
}

pub fn assess_migration_complexity(
    from: FormatDialect,
    to: FormatDialect,
) -> MigrationComplexity {
    let from_fields: BTreeSet<&str> = from.known_fields().iter().copied().collect();
    let to_fields: BTreeSet<&str> = to.known_fields().iter().copied().collect();

    let overlap_count = from_fields.intersection(&to_fields).count();
    let field_overlap = if from_fields.is_empty() {
        1.0
    } else {
        overlap_count as f64 / from_fields.len() as f64
    };

    let lossy_fields: Vec<String> = from_fields
        .difference(&to_fields)
        .map(|f| f.to_string())
        .collect();

    let reshaping = if from.envelope_shape() == to.envelope_shape() {
        0.0
    } else {
        0.3
    };
    let effort_score = ((1.0 - field_overlap) * 0.7 + reshaping).clamp(0.0, 1.0);

    MigrationComplexity {
        field_overlap,
        lossy_fields,
        effort_score,
    }
}
