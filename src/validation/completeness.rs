use std::collections::HashMap;

use super::{round2, DataIssue, DataIssueKind, DataValidation, FieldMissingCounts, RecordField};
use crate::models::Record;

/// Per-field missing counts and the share of records with every field.
pub fn validate_completeness(records: &[Record]) -> DataValidation {
    let mut missing = FieldMissingCounts::default();
    let mut issues = Vec::new();
    let mut complete = 0usize;
    let mut first_index: HashMap<&str, usize> = HashMap::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        let mut record_complete = true;
        let mut flag = |kind: DataIssueKind| {
            record_complete = false;
            issues.push(DataIssue {
                index,
                id: record.id.clone(),
                kind,
            });
        };

        if !record.has_title() {
            missing.title += 1;
            flag(DataIssueKind::MissingField(RecordField::Title));
        }
        if record.timestamp.is_none() {
            missing.timestamp += 1;
            flag(DataIssueKind::MissingTimestamp);
        }
        if record.author.as_deref().map_or(true, |a| a.trim().is_empty()) {
            missing.author += 1;
            flag(DataIssueKind::MissingField(RecordField::Author));
        }
        if record.score.is_none() {
            missing.score += 1;
            flag(DataIssueKind::MissingField(RecordField::Score));
        }

        if record_complete {
            complete += 1;
        }

        if first_index.insert(record.id.as_str(), index).is_some() {
            issues.push(DataIssue {
                index,
                id: record.id.clone(),
                kind: DataIssueKind::DuplicateId,
            });
        }
    }

    let completeness_ratio = if records.is_empty() {
        0.0
    } else {
        round2(complete as f64 / records.len() as f64 * 100.0)
    };

    DataValidation {
        total_records: records.len(),
        complete_records: complete,
        completeness_ratio,
        missing,
        issues,
    }
}
