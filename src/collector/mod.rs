//! Resilient Paginated Collector
//!
//! Per page: `Navigate → WaitReady → Extract → Append → DecidePageContinuation`.
//!
//! - Pages are strictly sequential; page N+1's URL comes from page N's
//!   "next" link.
//! - Anchors on a page are extracted concurrently and joined in source order.
//! - Navigation and record extraction retry independently under their own
//!   bounded policies; every attempt runs under a timeout.
//! - A failure on page 1 fails the run. A later failure ends collection with
//!   what was gathered, flagged as a shortfall. Results are never padded.

pub mod extract;
pub mod profile;
pub mod retry;
pub mod selectors;

#[cfg(test)]
mod collector_tests;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use uuid::Uuid;

use crate::browser::{resolve_link, BrowserError, BrowserSession};
use crate::config::{AuditConfig, CollectorConfig};
use crate::events::{CollectorEvent, EventSink};
use crate::models::{EngineKind, PerformanceMetrics, Record, RunResult, Viewport};

use extract::{extract_record, RecordExtraction};
use profile::{profile_for, RenderProfile};
use retry::{retry_with_backoff, RetryExhausted};

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Clone)]
pub enum CollectError {
    /// Navigation exhausted its retry budget
    NavigationFailure {
        url: String,
        attempts: u32,
        source: BrowserError,
    },
    /// No readiness selector resolved
    ReadinessTimeout { url: String, source: BrowserError },
    /// The first page produced no records with a resolvable timestamp
    InsufficientFirstPageData { url: String },
    /// Collector settings that can never produce a run
    InvalidConfig(String),
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NavigationFailure {
                url,
                attempts,
                source,
            } => write!(f, "navigation to {} failed after {} attempts: {}", url, attempts, source),
            Self::ReadinessTimeout { url, source } => {
                write!(f, "{} never became ready: {}", url, source)
            }
            Self::InsufficientFirstPageData { url } => {
                write!(f, "first page {} yielded no usable records", url)
            }
            Self::InvalidConfig(reason) => write!(f, "invalid collector config: {}", reason),
        }
    }
}

impl std::error::Error for CollectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::NavigationFailure { source, .. } | Self::ReadinessTimeout { source, .. } => {
                Some(source)
            }
            Self::InsufficientFirstPageData { .. } | Self::InvalidConfig(_) => None,
        }
    }
}

// =============================================================================
// COLLECTOR
// =============================================================================

/// Timings for one loaded page.
#[derive(Debug, Clone, Copy)]
struct LoadedPage {
    navigation_ms: u64,
    ready_ms: u64,
}

pub struct PaginatedCollector {
    session: Arc<dyn BrowserSession>,
    profile: Box<dyn RenderProfile>,
    config: CollectorConfig,
    events: Arc<dyn EventSink>,
}

impl PaginatedCollector {
    pub fn new(
        session: Arc<dyn BrowserSession>,
        profile: Box<dyn RenderProfile>,
        config: CollectorConfig,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            session,
            profile,
            config,
            events,
        }
    }

    /// Collector for `engine` using the audit config's timeout table.
    pub fn for_engine(
        session: Arc<dyn BrowserSession>,
        engine: EngineKind,
        config: &AuditConfig,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self::new(
            session,
            profile_for(engine, &config.engines),
            config.collector.clone(),
            events,
        )
    }

    pub fn engine(&self) -> EngineKind {
        self.profile.engine()
    }

    /// Collect up to `target_count` unique timestamped records starting at
    /// `start_url`.
    pub async fn collect(&self, start_url: &str, viewport: Viewport) -> Result<RunResult, CollectError> {
        self.check_config()?;
        let started_at = Utc::now();
        let clock = Instant::now();
        let target = self.config.target_count;

        let mut records: Vec<Record> = Vec::with_capacity(target);
        let mut seen: HashSet<String> = HashSet::with_capacity(target);
        let mut performance = PerformanceMetrics::default();
        let mut skipped_pages = Vec::new();
        let mut url = start_url.to_string();
        let mut page: u32 = 1;

        loop {
            self.events.emit(CollectorEvent::PageStarted {
                page,
                url: url.clone(),
            });

            let loaded = match self.load_page(&url, page).await {
                Ok(loaded) => loaded,
                Err(e) if page == 1 => return Err(self.fail(page, e).await),
                Err(e) => {
                    self.events.emit(CollectorEvent::PageSkipped {
                        page,
                        error: e.to_string(),
                    });
                    skipped_pages.push(page);
                    break;
                }
            };
            if page == 1 {
                performance.load_time_ms = loaded.navigation_ms;
                performance.dom_ready_ms = loaded.ready_ms;
            }

            // Extract
            let extracted = self.extract_page(page, Utc::now()).await;
            let extracted_count = extracted.len();

            // Append: dedupe, then cap at the remaining quota, preserving order
            let remaining = target.saturating_sub(records.len());
            let mut appended = 0;
            for record in extracted {
                if appended >= remaining {
                    break;
                }
                if !seen.insert(record.id.clone()) {
                    self.events.emit(CollectorEvent::DuplicateSkipped { id: record.id });
                    continue;
                }
                records.push(record);
                appended += 1;
            }

            self.events.emit(CollectorEvent::PageCompleted {
                page,
                extracted: extracted_count,
                appended,
                collected: records.len(),
            });

            if page == 1 && records.is_empty() {
                return Err(self
                    .fail(page, CollectError::InsufficientFirstPageData { url: url.clone() })
                    .await);
            }

            // DecidePageContinuation
            if records.len() >= target || page >= self.config.max_pages {
                break;
            }
            match self.next_page_url(&url).await {
                Some(next) => url = next,
                None => break,
            }
            page += 1;
        }

        performance.total_bytes = self.session.transferred_bytes().await;
        let shortfall = records.len() < target;
        let pages_visited = page - skipped_pages.len() as u32;
        self.events.emit(CollectorEvent::CollectionFinished {
            collected: records.len(),
            target,
            pages: pages_visited,
            shortfall,
        });

        Ok(RunResult {
            run_id: Uuid::new_v4(),
            engine: self.profile.engine(),
            viewport,
            records,
            target_count: target,
            pages_visited,
            skipped_pages,
            shortfall,
            performance,
            started_at,
            duration_ms: clock.elapsed().as_millis() as u64,
        })
    }

    fn check_config(&self) -> Result<(), CollectError> {
        if self.config.target_count == 0 {
            return Err(CollectError::InvalidConfig("target_count must be > 0".into()));
        }
        if self.config.max_pages == 0 {
            return Err(CollectError::InvalidConfig("max_pages must be > 0".into()));
        }
        if self.config.page_retry.max_attempts == 0 || self.config.record_retry.max_attempts == 0 {
            return Err(CollectError::InvalidConfig("retry attempts must be > 0".into()));
        }
        Ok(())
    }

    /// Navigate (retried) then wait for readiness (fallback chain).
    async fn load_page(&self, url: &str, page: u32) -> Result<LoadedPage, CollectError> {
        let timeouts = self.profile.timeouts();
        let nav_timeout = timeouts.navigation();

        let nav_clock = Instant::now();
        retry_with_backoff(
            &self.config.page_retry,
            nav_timeout,
            "navigate",
            |_| self.session.navigate(url, nav_timeout),
            |attempt, delay, error| {
                self.events.emit(CollectorEvent::NavigationRetry {
                    page,
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    error: error.to_string(),
                })
            },
        )
        .await
        .map_err(|RetryExhausted { attempts, last_error }| CollectError::NavigationFailure {
            url: url.to_string(),
            attempts,
            source: last_error,
        })?;
        let navigation_ms = nav_clock.elapsed().as_millis() as u64;

        let ready_clock = Instant::now();
        let ready = self
            .profile
            .wait_ready(self.session.as_ref())
            .await
            .map_err(|source| CollectError::ReadinessTimeout {
                url: url.to_string(),
                source,
            })?;
        self.events.emit(CollectorEvent::ReadySelectorResolved {
            page,
            selector: ready.selector,
            fallback_index: ready.fallback_index,
        });

        if let Err(e) = self.profile.settle(self.session.as_ref()).await {
            self.events.emit(CollectorEvent::ReadinessDegraded {
                page,
                reason: e.to_string(),
            });
        }

        Ok(LoadedPage {
            navigation_ms,
            ready_ms: ready_clock.elapsed().as_millis() as u64,
        })
    }

    /// All timestamped records on the current page, in source order.
    async fn extract_page(&self, page: u32, now: DateTime<Utc>) -> Vec<Record> {
        let ids = self.anchor_ids(page).await;
        let outcomes = join_all(ids.iter().map(|id| self.extract_with_retry(id, now))).await;
        outcomes.into_iter().flatten().collect()
    }

    async fn anchor_ids(&self, page: u32) -> Vec<String> {
        let anchors = retry_with_backoff(
            &self.config.record_retry,
            self.profile.timeouts().element(),
            "query anchors",
            |_| self.session.query_all(selectors::ANCHOR),
            |_, _, _| {},
        )
        .await;

        let handles = match anchors {
            Ok(attempted) => attempted.value,
            Err(e) => {
                self.events.emit(CollectorEvent::ReadinessDegraded {
                    page,
                    reason: e.to_string(),
                });
                return Vec::new();
            }
        };

        let mut ids = Vec::with_capacity(handles.len());
        for (index, handle) in handles.iter().enumerate() {
            match self.session.read_attribute(handle, "id").await {
                Ok(Some(id)) if !id.trim().is_empty() => ids.push(id.trim().to_string()),
                Ok(_) => {}
                Err(e) => self.events.emit(CollectorEvent::AnchorUnreadable {
                    page,
                    index,
                    error: e.to_string(),
                }),
            }
        }
        ids
    }

    /// Optional-field errors are retried like any other; on the final attempt
    /// the record is kept with those fields absent.
    async fn extract_with_retry(&self, id: &str, now: DateTime<Utc>) -> Option<Record> {
        let max_attempts = self.config.record_retry.max_attempts.max(1);
        let outcome = retry_with_backoff(
            &self.config.record_retry,
            self.profile.timeouts().element(),
            "extract record",
            |attempt| async move {
                let extraction =
                    extract_record(self.session.as_ref(), self.profile.as_ref(), id, now).await?;
                let retry_on = extraction
                    .first_field_error()
                    .filter(|_| attempt < max_attempts)
                    .cloned();
                match retry_on {
                    Some(e) => Err(e),
                    None => Ok(extraction),
                }
            },
            |attempt, _, error| {
                self.events.emit(CollectorEvent::RecordRetry {
                    id: id.to_string(),
                    attempt,
                    error: error.to_string(),
                })
            },
        )
        .await;

        match outcome {
            Ok(attempted) => match attempted.value {
                RecordExtraction::Extracted {
                    mut record,
                    title_fallback,
                    title_unresolved,
                    field_failures,
                } => {
                    record.extraction_attempt = attempted.attempt;
                    for failure in field_failures {
                        self.events.emit(CollectorEvent::FieldUnavailable {
                            id: id.to_string(),
                            field: failure.field.to_string(),
                            error: failure.error.to_string(),
                        });
                    }
                    if let Some(strategy) = title_fallback {
                        self.events.emit(CollectorEvent::TitleFallback {
                            id: id.to_string(),
                            strategy: strategy.name().to_string(),
                        });
                    }
                    if title_unresolved {
                        self.events.emit(CollectorEvent::TitleUnresolved { id: id.to_string() });
                    }
                    Some(record)
                }
                RecordExtraction::TimestampUnresolvable { raw_time_text } => {
                    self.events.emit(CollectorEvent::RecordDropped {
                        id: id.to_string(),
                        raw_time_text,
                    });
                    None
                }
            },
            Err(e) => {
                self.events.emit(CollectorEvent::RecordFailed {
                    id: id.to_string(),
                    error: e.to_string(),
                });
                None
            }
        }
    }

    async fn next_page_url(&self, current: &str) -> Option<String> {
        let handle = self
            .session
            .query_all(selectors::NEXT_PAGE)
            .await
            .ok()?
            .into_iter()
            .next()?;
        let href = self.session.read_attribute(&handle, "href").await.ok()??;
        if href.trim().is_empty() {
            return None;
        }
        Some(resolve_link(current, &href))
    }

    /// Emit the fatal event with a diagnostic screenshot, returning `error`.
    async fn fail(&self, page: u32, error: CollectError) -> CollectError {
        let screenshot = self.session.screenshot().await.ok();
        self.events.emit(CollectorEvent::FatalFailure {
            page,
            error: error.to_string(),
            screenshot,
        });
        error
    }
}

// =============================================================================
// RUN MATRIX
// =============================================================================

/// Opens one browser session per (engine × viewport) combination.
#[async_trait::async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(
        &self,
        engine: EngineKind,
        viewport: &Viewport,
    ) -> Result<Arc<dyn BrowserSession>, BrowserError>;
}

#[derive(Debug)]
pub struct MatrixEntry {
    pub engine: EngineKind,
    pub viewport: Viewport,
    pub outcome: Result<RunResult, String>,
}

/// Collect every combination sequentially; failures are recorded per entry.
pub async fn run_matrix(
    factory: &dyn SessionFactory,
    config: &AuditConfig,
    engines: &[EngineKind],
    viewports: &[Viewport],
    events: Arc<dyn EventSink>,
) -> Vec<MatrixEntry> {
    let mut entries = Vec::with_capacity(engines.len() * viewports.len());

    for &engine in engines {
        for viewport in viewports {
            let outcome = match factory.open(engine, viewport).await {
                Ok(session) => {
                    PaginatedCollector::for_engine(session, engine, config, events.clone())
                        .collect(&config.target_url, viewport.clone())
                        .await
                        .map_err(|e| e.to_string())
                }
                Err(e) => Err(format!("failed to open {} session: {}", engine, e)),
            };
            entries.push(MatrixEntry {
                engine,
                viewport: viewport.clone(),
                outcome,
            });
        }
    }
    entries
}
