use chrono::{DateTime, Duration, Utc};

use super::{BucketCounts, TimestampDistribution};
use crate::models::Record;

/// Bucket every timestamp by its age at `generated_at` and summarise the
/// gaps between consecutive timestamped records.
pub fn timestamp_distribution(records: &[Record], generated_at: DateTime<Utc>) -> TimestampDistribution {
    let timestamps: Vec<DateTime<Utc>> = records.iter().filter_map(|r| r.timestamp).collect();

    let mut buckets = BucketCounts::default();
    for ts in &timestamps {
        let age = generated_at - *ts;
        if age <= Duration::hours(1) {
            buckets.last_hour += 1;
        } else if age <= Duration::hours(6) {
            buckets.last_6_hours += 1;
        } else if age <= Duration::hours(24) {
            buckets.last_24_hours += 1;
        } else if age <= Duration::days(7) {
            buckets.last_week += 1;
        } else {
            buckets.older += 1;
        }
    }

    let gaps: Vec<f64> = timestamps
        .windows(2)
        .map(|w| super::gap_minutes(w[0], w[1]).abs())
        .collect();

    let (average, min, max) = if gaps.is_empty() {
        (None, None, None)
    } else {
        let sum: f64 = gaps.iter().sum();
        (
            Some(super::round2(sum / gaps.len() as f64)),
            gaps.iter().copied().reduce(f64::min),
            gaps.iter().copied().reduce(f64::max),
        )
    };

    TimestampDistribution {
        bucket_counts: buckets,
        average_gap_minutes: average,
        min_gap_minutes: min,
        max_gap_minutes: max,
        oldest: timestamps.iter().min().copied(),
        newest: timestamps.iter().max().copied(),
    }
}
