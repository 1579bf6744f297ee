//! Audit configuration
//!
//! Loaded from TOML (`SORTWATCH_CONFIG_PATH`, default `sortwatch.toml`) with
//! environment overrides. Every field has a default, so an absent file is not
//! an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::collector::retry::RetryPolicy;
use crate::models::EngineKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_target_url")]
    pub target_url: String,

    #[serde(default)]
    pub collector: CollectorConfig,

    /// Navigation / element / settle budgets per rendering engine
    #[serde(default)]
    pub engines: EngineTimeoutTable,

    /// Externally supplied pass bars
    #[serde(default)]
    pub thresholds: QualityThresholds,

    #[serde(default)]
    pub history: HistoryConfig,
}

fn default_target_url() -> String {
    "https://news.ycombinator.com/newest".to_string()
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            target_url: default_target_url(),
            collector: CollectorConfig::default(),
            engines: EngineTimeoutTable::default(),
            thresholds: QualityThresholds::default(),
            history: HistoryConfig::default(),
        }
    }
}

impl AuditConfig {
    /// Load from TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Load the config file (or defaults), then apply env overrides.
    /// The binary loads `.env` before calling this.
    pub fn from_env() -> anyhow::Result<Self> {
        let path = std::env::var("SORTWATCH_CONFIG_PATH")
            .unwrap_or_else(|_| "sortwatch.toml".to_string());

        let mut config = if Path::new(&path).exists() {
            Self::load(&path)?
        } else {
            tracing::debug!("config file {} not found, using defaults", path);
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SORTWATCH_TARGET_URL") {
            self.target_url = v;
        }
        if let Ok(v) = std::env::var("SORTWATCH_TARGET_COUNT") {
            self.collector.target_count = v.parse().unwrap_or(self.collector.target_count);
        }
        if let Ok(v) = std::env::var("SORTWATCH_MAX_PAGES") {
            self.collector.max_pages = v.parse().unwrap_or(self.collector.max_pages);
        }
        if let Ok(v) = std::env::var("SORTWATCH_RETRY_ATTEMPTS") {
            self.collector.page_retry.max_attempts =
                v.parse().unwrap_or(self.collector.page_retry.max_attempts);
        }
        if let Ok(v) = std::env::var("SORTWATCH_RETRY_BACKOFF_MS") {
            self.collector.page_retry.backoff_ms =
                v.parse().unwrap_or(self.collector.page_retry.backoff_ms);
        }
        if let Ok(v) = std::env::var("SORTWATCH_SORTING_THRESHOLD") {
            self.thresholds.sorting_accuracy = v.parse().unwrap_or(self.thresholds.sorting_accuracy);
        }
        if let Ok(v) = std::env::var("SORTWATCH_COMPLETENESS_THRESHOLD") {
            self.thresholds.completeness = v.parse().unwrap_or(self.thresholds.completeness);
        }
        if let Ok(v) = std::env::var("SORTWATCH_HISTORY_PATH") {
            self.history.path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("SORTWATCH_HISTORY_RETENTION_DAYS") {
            self.history.retention_days = v.parse().unwrap_or(self.history.retention_days);
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.collector.target_count == 0 {
            bail!("collector.target_count must be positive");
        }
        if self.collector.max_pages == 0 {
            bail!("collector.max_pages must be positive");
        }
        if self.collector.page_retry.max_attempts == 0 || self.collector.record_retry.max_attempts == 0 {
            bail!("retry max_attempts must be positive");
        }
        for (name, value) in [
            ("thresholds.sorting_accuracy", self.thresholds.sorting_accuracy),
            ("thresholds.completeness", self.thresholds.completeness),
        ] {
            if !(0.0..=100.0).contains(&value) {
                bail!("{} must be within 0..=100, got {}", name, value);
            }
        }
        if !(1..=MAX_RETENTION_DAYS).contains(&self.history.retention_days) {
            bail!(
                "history.retention_days must be within 1..={}, got {}",
                MAX_RETENTION_DAYS,
                self.history.retention_days
            );
        }
        Ok(())
    }

    /// Save to TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    #[serde(default = "default_target_count")]
    pub target_count: usize,

    /// Hard ceiling on pages visited per run
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    #[serde(default)]
    pub page_retry: RetryPolicy,

    #[serde(default = "RetryPolicy::record_default")]
    pub record_retry: RetryPolicy,
}

fn default_target_count() -> usize {
    100
}

fn default_max_pages() -> u32 {
    5
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            target_count: default_target_count(),
            max_pages: default_max_pages(),
            page_retry: RetryPolicy::default(),
            record_retry: RetryPolicy::record_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineTimeouts {
    pub navigation_ms: u64,
    pub element_ms: u64,
    /// Budget for the post-ready settle check, where the engine needs one
    pub settle_ms: u64,
}

impl EngineTimeouts {
    #[inline]
    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    #[inline]
    pub fn element(&self) -> Duration {
        Duration::from_millis(self.element_ms)
    }

    #[inline]
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineTimeoutTable {
    #[serde(default = "default_chromium")]
    pub chromium: EngineTimeouts,
    #[serde(default = "default_firefox")]
    pub firefox: EngineTimeouts,
    #[serde(default = "default_webkit")]
    pub webkit: EngineTimeouts,
}

fn default_chromium() -> EngineTimeouts {
    EngineTimeouts {
        navigation_ms: 30_000,
        element_ms: 10_000,
        settle_ms: 2_000,
    }
}

fn default_firefox() -> EngineTimeouts {
    EngineTimeouts {
        navigation_ms: 45_000,
        element_ms: 15_000,
        settle_ms: 3_000,
    }
}

fn default_webkit() -> EngineTimeouts {
    EngineTimeouts {
        navigation_ms: 60_000,
        element_ms: 20_000,
        settle_ms: 5_000,
    }
}

impl Default for EngineTimeoutTable {
    fn default() -> Self {
        Self {
            chromium: default_chromium(),
            firefox: default_firefox(),
            webkit: default_webkit(),
        }
    }
}

impl EngineTimeoutTable {
    pub fn for_engine(&self, engine: EngineKind) -> EngineTimeouts {
        match engine {
            EngineKind::Chromium => self.chromium,
            EngineKind::Firefox => self.firefox,
            EngineKind::Webkit => self.webkit,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QualityThresholds {
    /// Minimum sorting accuracy (%) for PASS; the live source is imperfect
    #[serde(default = "default_sorting_threshold")]
    pub sorting_accuracy: f64,

    /// Minimum completeness ratio (%) for PASS
    #[serde(default = "default_completeness_threshold")]
    pub completeness: f64,
}

fn default_sorting_threshold() -> f64 {
    20.0
}

fn default_completeness_threshold() -> f64 {
    90.0
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            sorting_accuracy: default_sorting_threshold(),
            completeness: default_completeness_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_path")]
    pub path: PathBuf,

    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

fn default_history_path() -> PathBuf {
    PathBuf::from("quality-history.json")
}

/// Upper bound on history retention (one century).
pub const MAX_RETENTION_DAYS: i64 = 36_500;

fn default_retention_days() -> i64 {
    30
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: default_history_path(),
            retention_days: default_retention_days(),
        }
    }
}

impl HistoryConfig {
    /// Retention window, clamped to `1..=MAX_RETENTION_DAYS` for unvalidated values.
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days.clamp(1, MAX_RETENTION_DAYS))
    }
}
