//! Peripheral signals fed into the quality score.
//!
//! Security probing and the API cross-check run outside the collector. When
//! their results are absent the corresponding category falls back to
//! `NEUTRAL_SCORE` instead of failing the aggregation.

use serde::{Deserialize, Serialize};

use crate::models::PerformanceMetrics;

/// Category score used when a peripheral signal is unavailable.
pub const NEUTRAL_SCORE: f64 = 90.0;

/// Penalty per security finding (reflected input, unsafe inline script, ...).
const SECURITY_FINDING_PENALTY: f64 = 20.0;

/// Result of probing the target for security headers and injection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecuritySignal {
    pub headers_expected: u32,
    pub headers_present: u32,
    #[serde(default)]
    pub findings: u32,
}

impl SecuritySignal {
    pub fn score(&self) -> f64 {
        let header_score = if self.headers_expected == 0 {
            100.0
        } else {
            (self.headers_present.min(self.headers_expected) as f64 / self.headers_expected as f64) * 100.0
        };
        (header_score - self.findings as f64 * SECURITY_FINDING_PENALTY).clamp(0.0, 100.0)
    }
}

/// Comparison of the rendered listing against the source's own API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiCrossCheckSignal {
    /// Records looked up through the API
    pub compared: u32,
    /// Records whose id and timestamp agreed
    pub matched: u32,
    /// Sorting accuracy (%) of the API's own ordering
    pub api_sorting_accuracy: f64,
}

impl ApiCrossCheckSignal {
    pub fn score(&self) -> f64 {
        if self.compared == 0 {
            return NEUTRAL_SCORE;
        }
        let match_ratio = self.matched.min(self.compared) as f64 / self.compared as f64 * 100.0;
        (0.6 * match_ratio + 0.4 * self.api_sorting_accuracy.clamp(0.0, 100.0)).clamp(0.0, 100.0)
    }
}

/// Everything the aggregator needs beyond the run and its validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExternalSignals {
    #[serde(default)]
    pub security: Option<SecuritySignal>,
    #[serde(default)]
    pub api: Option<ApiCrossCheckSignal>,
}

impl ExternalSignals {
    pub fn security_score(&self) -> f64 {
        self.security.as_ref().map_or(NEUTRAL_SCORE, SecuritySignal::score)
    }

    pub fn api_score(&self) -> f64 {
        self.api.as_ref().map_or(NEUTRAL_SCORE, ApiCrossCheckSignal::score)
    }
}

// ===== PERFORMANCE TIERS =====

/// Tiered score for captured page timings, lower is better.
pub fn performance_score(metrics: &PerformanceMetrics) -> f64 {
    let load = tier(metrics.load_time_ms, &[(2_000, 100.0), (5_000, 80.0), (10_000, 60.0)], 40.0);
    let dom = tier(metrics.dom_ready_ms, &[(1_000, 100.0), (3_000, 80.0), (6_000, 60.0)], 40.0);
    let bytes = tier(
        metrics.total_bytes,
        &[(1024 * 1024, 100.0), (3 * 1024 * 1024, 80.0), (6 * 1024 * 1024, 60.0)],
        40.0,
    );
    0.5 * load + 0.3 * dom + 0.2 * bytes
}

#[inline]
fn tier(value: u64, bands: &[(u64, f64)], floor: f64) -> f64 {
    bands
        .iter()
        .find(|(limit, _)| value <= *limit)
        .map_or(floor, |(_, score)| *score)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_signals_are_neutral() {
        let signals = ExternalSignals::default();
        assert_eq!(signals.security_score(), NEUTRAL_SCORE);
        assert_eq!(signals.api_score(), NEUTRAL_SCORE);
    }

    #[test]
    fn test_security_findings_penalised_and_floored() {
        let clean = SecuritySignal {
            headers_expected: 5,
            headers_present: 4,
            findings: 0,
        };
        assert_eq!(clean.score(), 80.0);

        let bad = SecuritySignal {
            findings: 10,
            ..clean
        };
        assert_eq!(bad.score(), 0.0);
    }

    #[test]
    fn test_api_cross_check_blend() {
        let api = ApiCrossCheckSignal {
            compared: 10,
            matched: 5,
            api_sorting_accuracy: 100.0,
        };
        assert_eq!(api.score(), 70.0);
        assert_eq!(ApiCrossCheckSignal::default().score(), NEUTRAL_SCORE);
    }

    #[test]
    fn test_performance_tiers() {
        assert_eq!(performance_score(&PerformanceMetrics::default()), 100.0);

        let slow = PerformanceMetrics {
            load_time_ms: 12_000,
            dom_ready_ms: 2_000,
            total_bytes: 512,
        };
        // 0.5*40 + 0.3*80 + 0.2*100
        assert!((performance_score(&slow) - 64.0).abs() < 1e-9);
    }
}
