//! Quality Metrics Aggregator
//!
//! Folds a run, its validation result and optional peripheral signals into a
//! weighted five-category score with a letter grade, a status band and a
//! per-metric trend against the retained history.
//!
//! History is owned here: it is read once when the aggregator is built and
//! appended once per recorded run through an injected `HistoryRepository`.

pub mod gates;
pub mod history;
pub mod signals;


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::RunResult;
use crate::validation::{round2, ValidationResult};

use history::HistoryRepository;
use signals::{performance_score, ExternalSignals};

// =============================================================================
// CONSTANTS
// =============================================================================

pub const FUNCTIONAL_WEIGHT: f64 = 0.35;
pub const PERFORMANCE_WEIGHT: f64 = 0.20;
pub const SECURITY_WEIGHT: f64 = 0.15;
pub const DATA_QUALITY_WEIGHT: f64 = 0.20;
pub const API_QUALITY_WEIGHT: f64 = 0.10;

/// Consistency points lost per adjacent sorting error in the longest run.
const CONSECUTIVE_ERROR_PENALTY: f64 = 10.0;
const DUPLICATE_TIMESTAMP_PENALTY: f64 = 2.0;
const DUPLICATE_ID_PENALTY: f64 = 10.0;

/// Snapshots averaged for the trend window, current run included.
const TREND_WINDOW: usize = 3;
/// Prior snapshots required before a trend is reported.
const TREND_MIN_HISTORY: usize = 2;
/// Relative change (%) separating stable from improving/declining.
const TREND_THRESHOLD_PCT: f64 = 5.0;

/// Categories below this score get a recommendation.
const RECOMMENDATION_FLOOR: f64 = 80.0;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Functional,
    Performance,
    Security,
    DataQuality,
    ApiQuality,
    Overall,
}

impl Metric {
    pub const CATEGORIES: [Metric; 5] = [
        Metric::Functional,
        Metric::Performance,
        Metric::Security,
        Metric::DataQuality,
        Metric::ApiQuality,
    ];

    pub const ALL: [Metric; 6] = [
        Metric::Functional,
        Metric::Performance,
        Metric::Security,
        Metric::DataQuality,
        Metric::ApiQuality,
        Metric::Overall,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Metric::Functional => "functional",
            Metric::Performance => "performance",
            Metric::Security => "security",
            Metric::DataQuality => "data_quality",
            Metric::ApiQuality => "api_quality",
            Metric::Overall => "overall",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryScores {
    pub functional: f64,
    pub performance: f64,
    pub security: f64,
    pub data_quality: f64,
    pub api_quality: f64,
}

impl CategoryScores {
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Functional => Some(self.functional),
            Metric::Performance => Some(self.performance),
            Metric::Security => Some(self.security),
            Metric::DataQuality => Some(self.data_quality),
            Metric::ApiQuality => Some(self.api_quality),
            Metric::Overall => None,
        }
    }

    pub fn weighted(&self) -> f64 {
        self.functional * FUNCTIONAL_WEIGHT
            + self.performance * PERFORMANCE_WEIGHT
            + self.security * SECURITY_WEIGHT
            + self.data_quality * DATA_QUALITY_WEIGHT
            + self.api_quality * API_QUALITY_WEIGHT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    A,
    #[serde(rename = "B+")]
    BPlus,
    B,
    #[serde(rename = "C+")]
    CPlus,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 95.0 => Grade::APlus,
            s if s >= 90.0 => Grade::A,
            s if s >= 85.0 => Grade::BPlus,
            s if s >= 80.0 => Grade::B,
            s if s >= 75.0 => Grade::CPlus,
            s if s >= 70.0 => Grade::C,
            s if s >= 60.0 => Grade::D,
            _ => Grade::F,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityStatus {
    Excellent,
    Good,
    Fair,
    NeedsImprovement,
    Poor,
}

impl QualityStatus {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 90.0 => QualityStatus::Excellent,
            s if s >= 80.0 => QualityStatus::Good,
            s if s >= 70.0 => QualityStatus::Fair,
            s if s >= 60.0 => QualityStatus::NeedsImprovement,
            _ => QualityStatus::Poor,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    #[default]
    Stable,
    Declining,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricTrends {
    pub functional: Trend,
    pub performance: Trend,
    pub security: Trend,
    pub data_quality: Trend,
    pub api_quality: Trend,
    pub overall: Trend,
}

impl MetricTrends {
    pub fn get(&self, metric: Metric) -> Trend {
        match metric {
            Metric::Functional => self.functional,
            Metric::Performance => self.performance,
            Metric::Security => self.security,
            Metric::DataQuality => self.data_quality,
            Metric::ApiQuality => self.api_quality,
            Metric::Overall => self.overall,
        }
    }

    fn set(&mut self, metric: Metric, trend: Trend) {
        let slot = match metric {
            Metric::Functional => &mut self.functional,
            Metric::Performance => &mut self.performance,
            Metric::Security => &mut self.security,
            Metric::DataQuality => &mut self.data_quality,
            Metric::ApiQuality => &mut self.api_quality,
            Metric::Overall => &mut self.overall,
        };
        *slot = trend;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallScore {
    pub value: f64,
    pub grade: Grade,
    pub status: QualityStatus,
    pub trend: MetricTrends,
}

/// One scored run as persisted in the rolling history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetricsSnapshot {
    #[serde(default)]
    pub run_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub scores: CategoryScores,
    pub overall: OverallScore,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl QualityMetricsSnapshot {
    pub fn value(&self, metric: Metric) -> f64 {
        self.scores.get(metric).unwrap_or(self.overall.value)
    }
}

/// Aggregate view over retained history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub runs: usize,
    pub mean_overall: Option<f64>,
    pub best_overall: Option<f64>,
    pub worst_overall: Option<f64>,
    pub latest_grade: Option<Grade>,
    pub since: Option<DateTime<Utc>>,
}

// =============================================================================
// CATEGORY SCORING
// =============================================================================

/// 0.4·sorting accuracy + 0.3·extraction completeness + 0.3·consistency.
pub fn functional_score(run: &RunResult, validation: &ValidationResult) -> f64 {
    let consistency = (100.0
        - validation.anomalies.patterns.consecutive_errors as f64 * CONSECUTIVE_ERROR_PENALTY)
        .max(0.0);
    0.4 * validation.sorting_accuracy.accuracy + 0.3 * run.collection_ratio() + 0.3 * consistency
}

/// Completeness blended with an integrity score penalising duplicates.
pub fn data_quality_score(validation: &ValidationResult) -> f64 {
    let duplicate_ids = validation
        .data_validation
        .issues
        .iter()
        .filter(|i| i.kind == crate::validation::DataIssueKind::DuplicateId)
        .count();
    let integrity = (100.0
        - validation.anomalies.patterns.duplicate_timestamps as f64 * DUPLICATE_TIMESTAMP_PENALTY
        - duplicate_ids as f64 * DUPLICATE_ID_PENALTY)
        .max(0.0);
    0.7 * validation.data_validation.completeness_ratio + 0.3 * integrity
}

pub fn category_scores(
    run: &RunResult,
    validation: &ValidationResult,
    signals: &ExternalSignals,
) -> CategoryScores {
    CategoryScores {
        functional: round2(functional_score(run, validation)),
        performance: round2(performance_score(&run.performance)),
        security: round2(signals.security_score()),
        data_quality: round2(data_quality_score(validation)),
        api_quality: round2(signals.api_score()),
    }
}

// =============================================================================
// TREND
// =============================================================================

/// Trend of `current` against `prior` values (oldest first).
///
/// Mean of the last `TREND_WINDOW` values (current included) against the
/// value just before that window, or the oldest value when the window spans
/// the whole series.
pub fn trend(prior: &[f64], current: f64) -> Trend {
    if prior.len() < TREND_MIN_HISTORY {
        return Trend::Stable;
    }
    let mut series = prior.to_vec();
    series.push(current);

    let window_start = series.len().saturating_sub(TREND_WINDOW);
    let window = &series[window_start..];
    let mean = window.iter().sum::<f64>() / window.len() as f64;
    let baseline = series[window_start.saturating_sub(1)];

    if baseline.abs() < f64::EPSILON {
        return if mean > 0.0 { Trend::Improving } else { Trend::Stable };
    }
    let change_pct = (mean - baseline) / baseline.abs() * 100.0;
    if change_pct > TREND_THRESHOLD_PCT {
        Trend::Improving
    } else if change_pct < -TREND_THRESHOLD_PCT {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

// =============================================================================
// AGGREGATOR
// =============================================================================

pub struct QualityAggregator {
    repository: Box<dyn HistoryRepository>,
    history: Vec<QualityMetricsSnapshot>,
}

impl QualityAggregator {
    /// Load (and prune) history once.
    pub fn new(repository: Box<dyn HistoryRepository>) -> anyhow::Result<Self> {
        Self::load_at(repository, Utc::now())
    }

    pub fn load_at(repository: Box<dyn HistoryRepository>, now: DateTime<Utc>) -> anyhow::Result<Self> {
        let history = repository.load(now)?;
        info!(entries = history.len(), "loaded quality history");
        Ok(Self {
            repository,
            history,
        })
    }

    pub fn history(&self) -> &[QualityMetricsSnapshot] {
        &self.history
    }

    /// Score a run without touching history.
    pub fn score(
        &self,
        run: &RunResult,
        validation: &ValidationResult,
        signals: &ExternalSignals,
    ) -> QualityMetricsSnapshot {
        let scores = category_scores(run, validation, signals);
        let value = round2(scores.weighted());

        let mut trends = MetricTrends::default();
        for metric in Metric::ALL {
            let prior: Vec<f64> = self.history.iter().map(|s| s.value(metric)).collect();
            let current = scores.get(metric).unwrap_or(value);
            trends.set(metric, trend(&prior, current));
        }

        let recommendations = recommendations(&scores, &trends, validation);

        QualityMetricsSnapshot {
            run_id: Some(run.run_id),
            timestamp: validation.generated_at,
            scores,
            overall: OverallScore {
                value,
                grade: Grade::from_score(value),
                status: QualityStatus::from_score(value),
                trend: trends,
            },
            recommendations,
        }
    }

    /// Append a scored snapshot to the persisted history.
    pub fn record(&mut self, snapshot: QualityMetricsSnapshot) -> anyhow::Result<()> {
        self.repository.append(&snapshot)?;
        if snapshot.overall.trend.overall == Trend::Declining {
            warn!(overall = snapshot.overall.value, grade = %snapshot.overall.grade, "quality trend declining");
        }
        self.history.push(snapshot);
        Ok(())
    }

    pub fn score_and_record(
        &mut self,
        run: &RunResult,
        validation: &ValidationResult,
        signals: &ExternalSignals,
    ) -> anyhow::Result<QualityMetricsSnapshot> {
        let snapshot = self.score(run, validation, signals);
        self.record(snapshot.clone())?;
        info!(
            run_id = %run.run_id,
            engine = %run.engine,
            overall = snapshot.overall.value,
            grade = %snapshot.overall.grade,
            "recorded quality snapshot"
        );
        Ok(snapshot)
    }

    pub fn summary(&self) -> HistorySummary {
        summarize(&self.history)
    }
}

pub fn summarize(history: &[QualityMetricsSnapshot]) -> HistorySummary {
    if history.is_empty() {
        return HistorySummary::default();
    }
    let values: Vec<f64> = history.iter().map(|s| s.overall.value).collect();
    HistorySummary {
        runs: history.len(),
        mean_overall: Some(round2(values.iter().sum::<f64>() / values.len() as f64)),
        best_overall: values.iter().copied().reduce(f64::max),
        worst_overall: values.iter().copied().reduce(f64::min),
        latest_grade: history.last().map(|s| s.overall.grade),
        since: history.iter().map(|s| s.timestamp).min(),
    }
}

fn recommendations(scores: &CategoryScores, trends: &MetricTrends, validation: &ValidationResult) -> Vec<String> {
    let mut out = Vec::new();

    for metric in Metric::CATEGORIES {
        let Some(score) = scores.get(metric) else {
            continue;
        };
        if score >= RECOMMENDATION_FLOOR {
            continue;
        }
        let advice = match metric {
            Metric::Functional => format!(
                "functional score {:.1}: {} sorting errors, longest run {}; review pagination and ordering",
                score,
                validation.sorting_accuracy.incorrect_pairs,
                validation.anomalies.patterns.consecutive_errors
            ),
            Metric::Performance => format!(
                "performance score {:.1}: page load or readiness is slow, check network and engine timeouts",
                score
            ),
            Metric::Security => format!("security score {:.1}: add missing security headers", score),
            Metric::DataQuality => format!(
                "data quality score {:.1}: completeness {:.1}% ({} titles, {} authors, {} scores missing)",
                score,
                validation.data_validation.completeness_ratio,
                validation.data_validation.missing.title,
                validation.data_validation.missing.author,
                validation.data_validation.missing.score
            ),
            Metric::ApiQuality => format!(
                "api quality score {:.1}: rendered listing disagrees with the source API",
                score
            ),
            Metric::Overall => continue,
        };
        out.push(advice);
    }

    for metric in Metric::ALL {
        if trends.get(metric) == Trend::Declining {
            out.push(format!("{} is declining over the last {} runs", metric, TREND_WINDOW));
        }
    }

    out
}
