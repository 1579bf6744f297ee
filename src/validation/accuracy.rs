use super::{round2, SortingAccuracy};
use crate::models::Record;

/// Share of adjacent pairs with `current.timestamp >= next.timestamp`.
///
/// Pairs where either side lacks a timestamp count toward neither side. A
/// sequence with no comparable pair is vacuously 100% sorted.
pub fn calculate_sorting_accuracy(records: &[Record]) -> SortingAccuracy {
    let mut correct = 0usize;
    let mut incorrect = 0usize;
    let mut skipped = 0usize;

    for pair in records.windows(2) {
        match (pair[0].timestamp, pair[1].timestamp) {
            (Some(current), Some(next)) if current >= next => correct += 1,
            (Some(_), Some(_)) => incorrect += 1,
            _ => skipped += 1,
        }
    }

    let total = correct + incorrect;
    let (accuracy, error_rate) = if total == 0 {
        (100.0, 0.0)
    } else {
        (
            round2(correct as f64 / total as f64 * 100.0),
            round2(incorrect as f64 / total as f64 * 100.0),
        )
    };

    SortingAccuracy {
        accuracy,
        total_pairs: total,
        correct_pairs: correct,
        incorrect_pairs: incorrect,
        error_rate,
        skipped_pairs: skipped,
    }
}
