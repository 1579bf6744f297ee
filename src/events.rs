//! Collector Event Emission
//!
//! The collector never writes to the console. Every notable step is emitted as
//! a `CollectorEvent` to an injected `EventSink`; sinks decide where it goes
//! (tracing, a channel, an in-memory buffer).

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CollectorEvent {
    PageStarted {
        page: u32,
        url: String,
    },
    NavigationRetry {
        page: u32,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    ReadySelectorResolved {
        page: u32,
        selector: String,
        /// 0 for the primary selector
        fallback_index: usize,
    },
    /// Page proceeds but the engine's settle check did not confirm the DOM
    ReadinessDegraded {
        page: u32,
        reason: String,
    },
    RecordRetry {
        id: String,
        attempt: u32,
        error: String,
    },
    TitleFallback {
        id: String,
        strategy: String,
    },
    TitleUnresolved {
        id: String,
    },
    /// Optional field left absent after its reads failed on the final attempt
    FieldUnavailable {
        id: String,
        field: String,
        error: String,
    },
    /// Anchor row whose id attribute could not be read
    AnchorUnreadable {
        page: u32,
        index: usize,
        error: String,
    },
    RecordDropped {
        id: String,
        raw_time_text: String,
    },
    /// Record-level retries exhausted
    RecordFailed {
        id: String,
        error: String,
    },
    DuplicateSkipped {
        id: String,
    },
    PageCompleted {
        page: u32,
        extracted: usize,
        appended: usize,
        collected: usize,
    },
    PageSkipped {
        page: u32,
        error: String,
    },
    FatalFailure {
        page: u32,
        error: String,
        screenshot: Option<String>,
    },
    CollectionFinished {
        collected: usize,
        target: usize,
        pages: u32,
        shortfall: bool,
    },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: CollectorEvent);
}

/// Forwards events to `tracing` with structured fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: CollectorEvent) {
        match event {
            CollectorEvent::PageStarted { page, url } => {
                info!(page, url = %url, "navigating");
            }
            CollectorEvent::NavigationRetry {
                page,
                attempt,
                delay_ms,
                error,
            } => {
                warn!(page, attempt, delay_ms, error = %error, "navigation failed, retrying");
            }
            CollectorEvent::ReadySelectorResolved {
                page,
                selector,
                fallback_index,
            } => {
                if fallback_index > 0 {
                    info!(page, selector = %selector, fallback_index, "ready via fallback selector");
                } else {
                    debug!(page, selector = %selector, "ready");
                }
            }
            CollectorEvent::ReadinessDegraded { page, reason } => {
                warn!(page, reason = %reason, "readiness degraded");
            }
            CollectorEvent::RecordRetry { id, attempt, error } => {
                debug!(id = %id, attempt, error = %error, "record extraction retry");
            }
            CollectorEvent::TitleFallback { id, strategy } => {
                debug!(id = %id, strategy = %strategy, "title resolved via fallback");
            }
            CollectorEvent::TitleUnresolved { id } => {
                warn!(id = %id, "no valid title candidate");
            }
            CollectorEvent::FieldUnavailable { id, field, error } => {
                debug!(id = %id, field = %field, error = %error, "field unavailable");
            }
            CollectorEvent::AnchorUnreadable { page, index, error } => {
                warn!(page, index, error = %error, "anchor id unreadable");
            }
            CollectorEvent::RecordDropped { id, raw_time_text } => {
                warn!(id = %id, raw_time_text = %raw_time_text, "dropping record without timestamp");
            }
            CollectorEvent::RecordFailed { id, error } => {
                warn!(id = %id, error = %error, "record extraction failed");
            }
            CollectorEvent::DuplicateSkipped { id } => {
                debug!(id = %id, "duplicate record skipped");
            }
            CollectorEvent::PageCompleted {
                page,
                extracted,
                appended,
                collected,
            } => {
                info!(page, extracted, appended, collected, "page complete");
            }
            CollectorEvent::PageSkipped { page, error } => {
                warn!(page, error = %error, "page skipped");
            }
            CollectorEvent::FatalFailure {
                page,
                error,
                screenshot,
            } => {
                warn!(page, error = %error, screenshot = ?screenshot, "collection failed");
            }
            CollectorEvent::CollectionFinished {
                collected,
                target,
                pages,
                shortfall,
            } => {
                if shortfall {
                    warn!(collected, target, pages, "collection finished short of target");
                } else {
                    info!(collected, target, pages, "collection finished");
                }
            }
        }
    }
}

/// Forwards events to an unbounded channel; dropped receivers are ignored.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<CollectorEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CollectorEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: CollectorEvent) {
        let _ = self.tx.send(event);
    }
}

/// Buffers events in memory.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<CollectorEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CollectorEvent> {
        self.events.lock().clone()
    }

    pub fn count_where(&self, pred: impl Fn(&CollectorEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: CollectorEvent) {
        self.events.lock().push(event);
    }
}
