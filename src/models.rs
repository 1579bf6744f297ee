use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title assigned when no extraction strategy produced a usable candidate.
pub const UNKNOWN_TITLE: &str = "unknown";

/// Rendering engine a run was collected with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Chromium,
    Firefox,
    Webkit,
}

impl EngineKind {
    pub const ALL: [EngineKind; 3] = [EngineKind::Chromium, EngineKind::Firefox, EngineKind::Webkit];

    pub fn as_str(&self) -> &str {
        match self {
            EngineKind::Chromium => "chromium",
            EngineKind::Firefox => "firefox",
            EngineKind::Webkit => "webkit",
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(EngineKind::Chromium),
            "firefox" => Ok(EngineKind::Firefox),
            "webkit" | "safari" => Ok(EngineKind::Webkit),
            other => Err(format!("unknown engine: {}", other)),
        }
    }
}

/// Browser window size a run was collected at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn desktop() -> Self {
        Self::new("desktop", 1920, 1080)
    }

    pub fn tablet() -> Self {
        Self::new("tablet", 768, 1024)
    }

    pub fn mobile() -> Self {
        Self::new("mobile", 375, 667)
    }

    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::desktop()
    }
}

/// One listing entry as extracted from the source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    /// `UNKNOWN_TITLE` when extraction could not find a valid title
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// `None` when the score element was not rendered (treated as 0)
    #[serde(default)]
    pub score: Option<u32>,
    #[serde(default)]
    pub author: Option<String>,
    pub raw_time_text: String,
    /// Collector output always carries a timestamp; externally supplied
    /// sequences may not.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default = "default_attempt")]
    pub extraction_attempt: u32,
}

fn default_attempt() -> u32 {
    1
}

impl Record {
    pub fn new(id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: UNKNOWN_TITLE.to_string(),
            source_url: None,
            score: None,
            author: None,
            raw_time_text: String::new(),
            timestamp: Some(timestamp),
            extraction_attempt: 1,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_score(mut self, score: u32) -> Self {
        self.score = Some(score);
        self
    }

    pub fn has_title(&self) -> bool {
        let title = self.title.trim();
        !title.is_empty() && title != UNKNOWN_TITLE
    }

    #[inline]
    pub fn score_or_default(&self) -> u32 {
        self.score.unwrap_or(0)
    }
}

/// Page timings captured during collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub load_time_ms: u64,
    pub dom_ready_ms: u64,
    pub total_bytes: u64,
}

/// Ordered records for one (engine × viewport) collection pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub engine: EngineKind,
    pub viewport: Viewport,
    pub records: Vec<Record>,
    pub target_count: usize,
    pub pages_visited: u32,
    #[serde(default)]
    pub skipped_pages: Vec<u32>,
    /// Fewer records than `target_count` were collected
    #[serde(default)]
    pub shortfall: bool,
    pub performance: PerformanceMetrics,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl RunResult {
    /// Share of the requested quota actually collected, 0..=100
    pub fn collection_ratio(&self) -> f64 {
        if self.target_count == 0 {
            return 100.0;
        }
        (self.records.len() as f64 / self.target_count as f64 * 100.0).min(100.0)
    }
}
