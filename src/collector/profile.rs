//! Rendering-engine capability profiles.
//!
//! Engines differ in latency and in where they settle the title relative to
//! the anchor row. Each engine gets one `RenderProfile` implementation chosen
//! once at collector construction; nothing downstream inspects the engine.

use std::time::Duration;

use tokio::time::{sleep, timeout, Instant};

use super::selectors;
use crate::browser::{BrowserError, BrowserSession};
use crate::config::{EngineTimeoutTable, EngineTimeouts};
use crate::models::EngineKind;

const SETTLE_SAMPLE: usize = 3;
const SETTLE_POLL: Duration = Duration::from_millis(100);

/// One way of locating a record's title relative to its anchor row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleStrategy {
    TitleLine,
    TitleCell,
    StoryLink,
    /// Whole last title cell; text only, no link
    LastTitleCell,
}

impl TitleStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TitleLine => "title_line",
            Self::TitleCell => "title_cell",
            Self::StoryLink => "story_link",
            Self::LastTitleCell => "last_title_cell",
        }
    }

    pub fn selector(&self, id: &str) -> String {
        match self {
            Self::TitleLine => selectors::title_line(id),
            Self::TitleCell => selectors::title_cell(id),
            Self::StoryLink => selectors::story_link(id),
            Self::LastTitleCell => selectors::last_title_cell(id),
        }
    }

    pub fn reads_href(&self) -> bool {
        !matches!(self, Self::LastTitleCell)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Score,
    Author,
    Age,
}

/// Which readiness selector resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadySelector {
    pub selector: String,
    pub fallback_index: usize,
}

#[async_trait::async_trait]
pub trait RenderProfile: Send + Sync {
    fn engine(&self) -> EngineKind;

    fn timeouts(&self) -> EngineTimeouts;

    /// Ordered title strategies for this engine.
    fn title_chain(&self) -> &'static [TitleStrategy];

    /// Ordered selectors for a non-title field: sibling row first, then a
    /// globally scoped selector anchored on the record id.
    fn field_chain(&self, field: Field, id: &str) -> Vec<String> {
        match field {
            Field::Score => vec![selectors::score_sibling(id), selectors::score_by_id(id)],
            Field::Author => vec![selectors::author_sibling(id), selectors::author_scoped(id)],
            Field::Age => vec![selectors::age_sibling(id), selectors::age_scoped(id)],
        }
    }

    /// Poll the primary selector then each fallback, each under the element
    /// timeout; the first to resolve wins.
    async fn wait_ready(&self, session: &dyn BrowserSession) -> Result<ReadySelector, BrowserError> {
        let budget = self.timeouts().element();
        let mut last_error = BrowserError::SelectorNotFound(selectors::READY_CHAIN[0].to_string());

        for (idx, selector) in selectors::READY_CHAIN.iter().enumerate() {
            let outcome = timeout(budget, session.wait_for_selector(selector, budget))
                .await
                .unwrap_or_else(|_| Err(BrowserError::timeout(format!("wait for {}", selector), budget)));
            match outcome {
                Ok(_) => {
                    return Ok(ReadySelector {
                        selector: selector.to_string(),
                        fallback_index: idx,
                    })
                }
                Err(e) => last_error = e,
            }
        }
        Err(last_error)
    }

    /// Secondary readiness check for engines whose DOM settles after the
    /// primary selector resolves. Failure is advisory.
    async fn settle(&self, _session: &dyn BrowserSession) -> Result<(), BrowserError> {
        Ok(())
    }
}

pub struct ChromiumProfile {
    timeouts: EngineTimeouts,
}

pub struct FirefoxProfile {
    timeouts: EngineTimeouts,
}

/// Title rows attach asynchronously after anchors render.
pub struct WebkitProfile {
    timeouts: EngineTimeouts,
}

impl ChromiumProfile {
    pub fn new(timeouts: EngineTimeouts) -> Self {
        Self { timeouts }
    }
}

impl FirefoxProfile {
    pub fn new(timeouts: EngineTimeouts) -> Self {
        Self { timeouts }
    }
}

impl WebkitProfile {
    pub fn new(timeouts: EngineTimeouts) -> Self {
        Self { timeouts }
    }

    async fn sampled_anchor_has_title(&self, session: &dyn BrowserSession) -> Result<bool, BrowserError> {
        let anchors = session.query_all(selectors::ANCHOR).await?;
        for handle in anchors.iter().take(SETTLE_SAMPLE) {
            let Some(id) = session.read_attribute(handle, "id").await? else {
                continue;
            };
            for strategy in self.title_chain() {
                if !session.query_all(&strategy.selector(&id)).await?.is_empty() {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

#[async_trait::async_trait]
impl RenderProfile for ChromiumProfile {
    fn engine(&self) -> EngineKind {
        EngineKind::Chromium
    }

    fn timeouts(&self) -> EngineTimeouts {
        self.timeouts
    }

    fn title_chain(&self) -> &'static [TitleStrategy] {
        &[
            TitleStrategy::TitleLine,
            TitleStrategy::TitleCell,
            TitleStrategy::StoryLink,
            TitleStrategy::LastTitleCell,
        ]
    }
}

#[async_trait::async_trait]
impl RenderProfile for FirefoxProfile {
    fn engine(&self) -> EngineKind {
        EngineKind::Firefox
    }

    fn timeouts(&self) -> EngineTimeouts {
        self.timeouts
    }

    fn title_chain(&self) -> &'static [TitleStrategy] {
        &[
            TitleStrategy::TitleCell,
            TitleStrategy::TitleLine,
            TitleStrategy::StoryLink,
            TitleStrategy::LastTitleCell,
        ]
    }
}

#[async_trait::async_trait]
impl RenderProfile for WebkitProfile {
    fn engine(&self) -> EngineKind {
        EngineKind::Webkit
    }

    fn timeouts(&self) -> EngineTimeouts {
        self.timeouts
    }

    fn title_chain(&self) -> &'static [TitleStrategy] {
        &[
            TitleStrategy::TitleLine,
            TitleStrategy::StoryLink,
            TitleStrategy::TitleCell,
            TitleStrategy::LastTitleCell,
        ]
    }

    async fn settle(&self, session: &dyn BrowserSession) -> Result<(), BrowserError> {
        let budget = self.timeouts.settle();
        let deadline = Instant::now() + budget;

        loop {
            if self.sampled_anchor_has_title(session).await? {
                return Ok(());
            }
            if Instant::now() + SETTLE_POLL > deadline {
                return Err(BrowserError::timeout("title rows to settle", budget));
            }
            sleep(SETTLE_POLL).await;
        }
    }
}

/// Build the profile for `engine` with its configured timeouts.
pub fn profile_for(engine: EngineKind, table: &EngineTimeoutTable) -> Box<dyn RenderProfile> {
    let timeouts = table.for_engine(engine);
    match engine {
        EngineKind::Chromium => Box::new(ChromiumProfile::new(timeouts)),
        EngineKind::Firefox => Box::new(FirefoxProfile::new(timeouts)),
        EngineKind::Webkit => Box::new(WebkitProfile::new(timeouts)),
    }
}
