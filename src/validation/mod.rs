//! Sorting Validation Engine
//!
//! Pure functions from an ordered record sequence to a `ValidationResult`:
//! pairwise accuracy, an anomaly catalogue, a timestamp-distribution profile
//! and a completeness check. No I/O; inputs are never mutated.
//!
//! The engine measures. Whether a given accuracy passes is decided by the
//! caller against an externally configured threshold.

pub mod accuracy;
pub mod anomalies;
pub mod completeness;
pub mod distribution;


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Record, RunResult};

pub use accuracy::calculate_sorting_accuracy;
pub use anomalies::detect_anomalies;
pub use completeness::validate_completeness;
pub use distribution::timestamp_distribution;

/// Gap between adjacent records above which entries are likely missing.
pub const LARGE_JUMP_MINUTES: f64 = 60.0;

// =============================================================================
// RESULT TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortingAccuracy {
    /// Percentage of comparable adjacent pairs in non-increasing order
    pub accuracy: f64,
    pub total_pairs: usize,
    pub correct_pairs: usize,
    pub incorrect_pairs: usize,
    pub error_rate: f64,
    /// Adjacent pairs excluded because a timestamp was missing
    pub skipped_pairs: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    SortingError,
    LargeTimeJump,
    DuplicateTimestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub severity: Severity,
    /// Position of the record the anomaly is reported on
    pub index: usize,
    pub id: String,
    /// The other record involved: the following entry for pair anomalies,
    /// the first occurrence for duplicates
    pub related_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gap_minutes: Option<f64>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyPatterns {
    /// Longest run of adjacent sorting errors
    pub consecutive_errors: usize,
    pub large_time_jumps: usize,
    pub duplicate_timestamps: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub anomalies: Vec<Anomaly>,
    pub patterns: AnomalyPatterns,
}

impl AnomalyReport {
    pub fn count(&self, kind: AnomalyKind) -> usize {
        self.anomalies.iter().filter(|a| a.kind == kind).count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketCounts {
    pub last_hour: usize,
    pub last_6_hours: usize,
    pub last_24_hours: usize,
    pub last_week: usize,
    pub older: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimestampDistribution {
    pub bucket_counts: BucketCounts,
    pub average_gap_minutes: Option<f64>,
    pub min_gap_minutes: Option<f64>,
    pub max_gap_minutes: Option<f64>,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordField {
    Title,
    Timestamp,
    Author,
    Score,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "field", rename_all = "snake_case")]
pub enum DataIssueKind {
    MissingTimestamp,
    MissingField(RecordField),
    DuplicateId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataIssue {
    pub index: usize,
    pub id: String,
    pub kind: DataIssueKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMissingCounts {
    pub title: usize,
    pub timestamp: usize,
    pub author: usize,
    pub score: usize,
}

impl FieldMissingCounts {
    pub fn get(&self, field: RecordField) -> usize {
        match field {
            RecordField::Title => self.title,
            RecordField::Timestamp => self.timestamp,
            RecordField::Author => self.author,
            RecordField::Score => self.score,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataValidation {
    pub total_records: usize,
    pub complete_records: usize,
    /// complete / total × 100
    pub completeness_ratio: f64,
    pub missing: FieldMissingCounts,
    pub issues: Vec<DataIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub generated_at: DateTime<Utc>,
    pub record_count: usize,
    pub sorting_accuracy: SortingAccuracy,
    pub anomalies: AnomalyReport,
    pub timestamp_distribution: TimestampDistribution,
    pub data_validation: DataValidation,
}

// =============================================================================
// ENTRY POINTS
// =============================================================================

/// Validate `records` as collected at `generated_at`.
pub fn validate(records: &[Record], generated_at: DateTime<Utc>) -> ValidationResult {
    ValidationResult {
        generated_at,
        record_count: records.len(),
        sorting_accuracy: calculate_sorting_accuracy(records),
        anomalies: detect_anomalies(records),
        timestamp_distribution: timestamp_distribution(records, generated_at),
        data_validation: validate_completeness(records),
    }
}

/// Validate a run against the instant its collection finished.
pub fn validate_run(run: &RunResult) -> ValidationResult {
    let generated_at = run.started_at + chrono::Duration::milliseconds(run.duration_ms as i64);
    validate(&run.records, generated_at)
}

#[inline]
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Signed gap in minutes, positive when `current` is newer than `next`.
#[inline]
pub(crate) fn gap_minutes(current: DateTime<Utc>, next: DateTime<Utc>) -> f64 {
    (current - next).num_seconds() as f64 / 60.0
}
