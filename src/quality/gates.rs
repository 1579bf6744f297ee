//! PASS / WARN / FAIL verdicts for a scored run.
//!
//! Pass bars come from configuration; the validation engine itself never
//! decides what accuracy is acceptable.

use serde::{Deserialize, Serialize};

use super::{Metric, QualityMetricsSnapshot};
use crate::config::QualityThresholds;
use crate::validation::ValidationResult;

/// Points below the completeness threshold that still only warn.
const COMPLETENESS_WARN_MARGIN: f64 = 10.0;
const CATEGORY_PASS: f64 = 80.0;
const CATEGORY_WARN: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Warn,
    Fail,
}

impl Verdict {
    pub fn as_str(&self) -> &str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Warn => "WARN",
            Verdict::Fail => "FAIL",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub name: String,
    pub verdict: Verdict,
    pub value: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateReport {
    pub gates: Vec<GateResult>,
    /// Worst verdict across all gates
    pub overall: Verdict,
}

impl GateReport {
    pub fn gate(&self, name: &str) -> Option<&GateResult> {
        self.gates.iter().find(|g| g.name == name)
    }

    pub fn failures(&self) -> impl Iterator<Item = &GateResult> {
        self.gates.iter().filter(|g| g.verdict == Verdict::Fail)
    }
}

pub fn evaluate(
    validation: &ValidationResult,
    snapshot: &QualityMetricsSnapshot,
    thresholds: &QualityThresholds,
) -> GateReport {
    let mut gates = Vec::with_capacity(2 + Metric::CATEGORIES.len());

    let accuracy = validation.sorting_accuracy.accuracy;
    gates.push(GateResult {
        name: "sorting_accuracy".to_string(),
        verdict: if accuracy >= thresholds.sorting_accuracy {
            Verdict::Pass
        } else {
            Verdict::Fail
        },
        value: accuracy,
        threshold: thresholds.sorting_accuracy,
    });

    let completeness = validation.data_validation.completeness_ratio;
    gates.push(GateResult {
        name: "completeness".to_string(),
        verdict: if completeness >= thresholds.completeness {
            Verdict::Pass
        } else if completeness >= thresholds.completeness - COMPLETENESS_WARN_MARGIN {
            Verdict::Warn
        } else {
            Verdict::Fail
        },
        value: completeness,
        threshold: thresholds.completeness,
    });

    for metric in Metric::CATEGORIES {
        let value = snapshot.value(metric);
        gates.push(GateResult {
            name: metric.as_str().to_string(),
            verdict: category_verdict(value),
            value,
            threshold: CATEGORY_PASS,
        });
    }

    let overall = gates
        .iter()
        .map(|g| g.verdict)
        .max()
        .unwrap_or(Verdict::Pass);

    GateReport { gates, overall }
}

#[inline]
fn category_verdict(score: f64) -> Verdict {
    if score >= CATEGORY_PASS {
        Verdict::Pass
    } else if score >= CATEGORY_WARN {
        Verdict::Warn
    } else {
        Verdict::Fail
    }
}
