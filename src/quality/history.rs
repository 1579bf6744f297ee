//! Persisted quality history
//!
//! An append-only list of snapshots. Entries older than the retention window
//! are pruned when the history is loaded. Concurrent writers are not
//! supported; callers serialise runs.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::{debug, info};

use super::QualityMetricsSnapshot;

pub trait HistoryRepository: Send + Sync {
    /// Snapshots younger than the retention window at `now`, oldest first.
    fn load(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<QualityMetricsSnapshot>>;

    fn append(&self, snapshot: &QualityMetricsSnapshot) -> anyhow::Result<()>;
}

fn retain_window(
    snapshots: Vec<QualityMetricsSnapshot>,
    now: DateTime<Utc>,
    retention: Duration,
) -> (Vec<QualityMetricsSnapshot>, usize) {
    let cutoff = now - retention;
    let before = snapshots.len();
    let mut kept: Vec<QualityMetricsSnapshot> =
        snapshots.into_iter().filter(|s| s.timestamp >= cutoff).collect();
    kept.sort_by_key(|s| s.timestamp);
    let pruned = before - kept.len();
    (kept, pruned)
}

// =============================================================================
// JSON FILE
// =============================================================================

/// History stored as a single JSON array on disk.
pub struct JsonFileHistory {
    path: PathBuf,
    retention: Duration,
    write_lock: Mutex<()>,
}

impl JsonFileHistory {
    pub fn new(path: impl Into<PathBuf>, retention: Duration) -> Self {
        Self {
            path: path.into(),
            retention,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> anyhow::Result<Vec<QualityMetricsSnapshot>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading history {}", self.path.display()))?;
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&contents).with_context(|| format!("parsing history {}", self.path.display()))
    }

    /// Replace the file via a sibling temp file and rename.
    fn write_all(&self, snapshots: &[QualityMetricsSnapshot]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating history dir {}", parent.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(snapshots)?;
        std::fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing history {}", self.path.display()))?;
        Ok(())
    }
}

impl HistoryRepository for JsonFileHistory {
    fn load(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<QualityMetricsSnapshot>> {
        let _guard = self.write_lock.lock();
        let (kept, pruned) = retain_window(self.read_all()?, now, self.retention);
        if pruned > 0 {
            self.write_all(&kept)?;
            info!(pruned, kept = kept.len(), path = %self.path.display(), "pruned quality history");
        }
        Ok(kept)
    }

    fn append(&self, snapshot: &QualityMetricsSnapshot) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock();
        let mut all = self.read_all()?;
        all.push(snapshot.clone());
        self.write_all(&all)?;
        debug!(entries = all.len(), path = %self.path.display(), "appended quality snapshot");
        Ok(())
    }
}

// =============================================================================
// IN MEMORY
// =============================================================================

/// Volatile history for tests and one-shot runs.
pub struct InMemoryHistory {
    entries: Mutex<Vec<QualityMetricsSnapshot>>,
    retention: Duration,
}

impl InMemoryHistory {
    pub fn new(retention: Duration) -> Self {
        Self::with_entries(Vec::new(), retention)
    }

    pub fn with_entries(entries: Vec<QualityMetricsSnapshot>, retention: Duration) -> Self {
        Self {
            entries: Mutex::new(entries),
            retention,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl HistoryRepository for InMemoryHistory {
    fn load(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<QualityMetricsSnapshot>> {
        let mut entries = self.entries.lock();
        let (kept, _) = retain_window(std::mem::take(&mut *entries), now, self.retention);
        *entries = kept.clone();
        Ok(kept)
    }

    fn append(&self, snapshot: &QualityMetricsSnapshot) -> anyhow::Result<()> {
        self.entries.lock().push(snapshot.clone());
        Ok(())
    }
}
