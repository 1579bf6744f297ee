use std::collections::HashMap;

use super::{gap_minutes, Anomaly, AnomalyKind, AnomalyPatterns, AnomalyReport, Severity, LARGE_JUMP_MINUTES};
use crate::models::Record;

/// Single left-to-right pass over the sequence.
///
/// - `sorting_error`: current strictly older than the next entry
/// - `large_time_jump`: adjacent gap above `LARGE_JUMP_MINUTES`, either direction
/// - `duplicate_timestamp`: same minute as an earlier record
pub fn detect_anomalies(records: &[Record]) -> AnomalyReport {
    let mut anomalies = Vec::new();
    let mut patterns = AnomalyPatterns::default();
    let mut first_seen_minute: HashMap<i64, usize> = HashMap::with_capacity(records.len());
    let mut run = 0usize;

    for (i, record) in records.iter().enumerate() {
        if let Some(ts) = record.timestamp {
            let minute = ts.timestamp().div_euclid(60);
            match first_seen_minute.get(&minute) {
                Some(&first) => {
                    patterns.duplicate_timestamps += 1;
                    anomalies.push(Anomaly {
                        kind: AnomalyKind::DuplicateTimestamp,
                        severity: Severity::Low,
                        index: i,
                        id: record.id.clone(),
                        related_index: Some(first),
                        gap_minutes: None,
                        message: format!(
                            "record {} shares minute {} with position {}",
                            record.id,
                            ts.format("%Y-%m-%d %H:%M"),
                            first
                        ),
                    });
                }
                None => {
                    first_seen_minute.insert(minute, i);
                }
            }
        }

        let Some(next) = records.get(i + 1) else {
            break;
        };
        let (Some(current_ts), Some(next_ts)) = (record.timestamp, next.timestamp) else {
            run = 0;
            continue;
        };
        let gap = gap_minutes(current_ts, next_ts);

        if current_ts < next_ts {
            run += 1;
            patterns.consecutive_errors = patterns.consecutive_errors.max(run);
            anomalies.push(Anomaly {
                kind: AnomalyKind::SortingError,
                severity: Severity::High,
                index: i,
                id: record.id.clone(),
                related_index: Some(i + 1),
                gap_minutes: Some(gap),
                message: format!(
                    "record {} at position {} is {:.1} min older than {} at position {}",
                    record.id,
                    i,
                    -gap,
                    next.id,
                    i + 1
                ),
            });
        } else {
            run = 0;
        }

        if gap.abs() > LARGE_JUMP_MINUTES {
            patterns.large_time_jumps += 1;
            anomalies.push(Anomaly {
                kind: AnomalyKind::LargeTimeJump,
                severity: Severity::Medium,
                index: i,
                id: record.id.clone(),
                related_index: Some(i + 1),
                gap_minutes: Some(gap),
                message: format!(
                    "{:.1} min gap between positions {} and {}",
                    gap.abs(),
                    i,
                    i + 1
                ),
            });
        }
    }

    AnomalyReport { anomalies, patterns }
}
