//! In-memory browser session serving scripted pages.
//!
//! Selectors are matched verbatim: a page answers a query only for selector
//! strings it was built with. Navigation and query failures can be injected
//! per URL / selector to exercise retry paths.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{BrowserError, BrowserSession, ElementHandle};
use crate::collector::selectors;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FixtureNode {
    pub text: Option<String>,
    pub attributes: HashMap<String, String>,
}

impl FixtureNode {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// One listing entry rendered by `FixturePage::listing`.
#[derive(Debug, Clone)]
pub struct FixtureItem {
    pub id: String,
    pub title: String,
    pub url: Option<String>,
    pub score: Option<u32>,
    pub author: Option<String>,
    pub age_text: String,
    pub age_title: Option<String>,
}

impl FixtureItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>, age_text: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            url: Some(format!("https://example.test/story/{}", id)),
            id,
            title: title.into(),
            score: Some(1),
            author: Some("someone".to_string()),
            age_text: age_text.into(),
            age_title: None,
        }
    }

    /// Item whose age element carries an exact machine timestamp.
    pub fn at(id: impl Into<String>, title: impl Into<String>, ts: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let minutes = (now - ts).num_minutes().max(1);
        let mut item = Self::new(id, title, format!("{} minutes ago", minutes));
        item.age_title = Some(format!(
            "{} {}",
            ts.format("%Y-%m-%dT%H:%M:%S"),
            ts.timestamp()
        ));
        item
    }
}

#[derive(Debug, Clone, Default)]
pub struct FixturePage {
    nodes: HashMap<String, Vec<FixtureNode>>,
    bytes: u64,
}

impl FixturePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(mut self, selector: impl Into<String>, node: FixtureNode) -> Self {
        self.nodes.entry(selector.into()).or_default().push(node);
        self
    }

    pub fn with_bytes(mut self, bytes: u64) -> Self {
        self.bytes = bytes;
        self
    }

    /// Render items with the primary layout, optionally linking a next page.
    pub fn listing(items: &[FixtureItem], next_href: Option<&str>) -> Self {
        let mut page = Self::new().with_bytes(2_048 + 512 * items.len() as u64);

        for item in items {
            page = page.with_node(selectors::ANCHOR, FixtureNode::default().with_attr("id", &item.id));

            let mut title = FixtureNode::text(&item.title);
            if let Some(url) = &item.url {
                title = title.with_attr("href", url);
            }
            page = page.with_node(selectors::title_line(&item.id), title);

            if let Some(score) = item.score {
                page = page.with_node(
                    selectors::score_sibling(&item.id),
                    FixtureNode::text(format!("{} points", score)),
                );
            }
            if let Some(author) = &item.author {
                page = page.with_node(selectors::author_sibling(&item.id), FixtureNode::text(author));
            }

            let mut age = FixtureNode::text(&item.age_text);
            if let Some(title) = &item.age_title {
                age = age.with_attr("title", title);
            }
            page = page.with_node(selectors::age_sibling(&item.id), age);
        }

        if let Some(href) = next_href {
            page = page.with_node(selectors::NEXT_PAGE, FixtureNode::text("More").with_attr("href", href));
        }
        page
    }
}

#[derive(Default)]
struct FixtureState {
    pages: HashMap<String, FixturePage>,
    current: Option<String>,
    handles: HashMap<u64, FixtureNode>,
    next_handle: u64,
    navigation_failures: HashMap<String, u32>,
    navigation_delays: HashMap<String, Duration>,
    query_failures: HashMap<String, u32>,
    attribute_failures: HashMap<String, u32>,
    navigations: Vec<String>,
    bytes: u64,
}

#[derive(Default)]
pub struct FixtureBrowser {
    state: Mutex<FixtureState>,
}

impl FixtureBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: impl Into<String>, page: FixturePage) -> Self {
        self.state.lock().pages.insert(url.into(), page);
        self
    }

    /// Fail the next `count` navigations to `url`.
    pub fn fail_navigation(self, url: impl Into<String>, count: u32) -> Self {
        self.state.lock().navigation_failures.insert(url.into(), count);
        self
    }

    /// Fail the next `count` reads of attribute `name` on any element.
    pub fn fail_attribute(self, name: impl Into<String>, count: u32) -> Self {
        self.state.lock().attribute_failures.insert(name.into(), count);
        self
    }

    /// Make navigation to `url` take `delay` (bounded by the caller's timeout).
    pub fn delay_navigation(self, url: impl Into<String>, delay: Duration) -> Self {
        self.state.lock().navigation_delays.insert(url.into(), delay);
        self
    }

    /// Fail the next `count` `query_all` calls for `selector`.
    pub fn fail_query(self, selector: impl Into<String>, count: u32) -> Self {
        self.state.lock().query_failures.insert(selector.into(), count);
        self
    }

    /// `pages` linked pages of `per_page` records each, newest first,
    /// `gap_minutes` apart, starting one minute before `now`.
    pub fn paged_listing(
        base_url: &str,
        pages: usize,
        per_page: usize,
        now: DateTime<Utc>,
        gap_minutes: i64,
    ) -> Self {
        let mut browser = Self::new();
        for p in 0..pages {
            let items: Vec<FixtureItem> = (0..per_page)
                .map(|i| {
                    let n = p * per_page + i;
                    let ts = now - chrono::Duration::minutes(1 + n as i64 * gap_minutes);
                    FixtureItem::at(
                        format!("{}", 1_000_000 - n),
                        format!("Synthetic story number {}", n + 1),
                        ts,
                        now,
                    )
                })
                .collect();
            let next = (p + 1 < pages).then(|| format!("newest?p={}", p + 2));
            browser = browser.with_page(
                Self::page_url(base_url, p + 1),
                FixturePage::listing(&items, next.as_deref()),
            );
        }
        browser
    }

    /// URL of page `n` (1-based) in a `paged_listing`.
    pub fn page_url(base_url: &str, n: usize) -> String {
        let base = base_url.trim_end_matches('/');
        if n <= 1 {
            format!("{}/newest", base)
        } else {
            format!("{}/newest?p={}", base, n)
        }
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().navigations.clone()
    }

    fn current_nodes(state: &FixtureState, selector: &str) -> Vec<FixtureNode> {
        state
            .current
            .as_ref()
            .and_then(|url| state.pages.get(url))
            .and_then(|page| page.nodes.get(selector))
            .cloned()
            .unwrap_or_default()
    }

    fn allocate(state: &mut FixtureState, node: FixtureNode) -> ElementHandle {
        state.next_handle += 1;
        let id = state.next_handle;
        state.handles.insert(id, node);
        ElementHandle(id)
    }
}

#[async_trait::async_trait]
impl BrowserSession for FixtureBrowser {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        let delay = self.state.lock().navigation_delays.get(url).copied();
        if let Some(delay) = delay {
            if delay > timeout {
                tokio::time::sleep(timeout).await;
                return Err(BrowserError::timeout(format!("navigate {}", url), timeout));
            }
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        state.navigations.push(url.to_string());

        if let Some(remaining) = state.navigation_failures.get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BrowserError::Navigation(format!("{} unreachable", url)));
            }
        }

        let bytes = match state.pages.get(url) {
            Some(page) => page.bytes,
            None => return Err(BrowserError::Navigation(format!("{} returned 404", url))),
        };
        state.bytes += bytes;
        state.current = Some(url.to_string());
        state.handles.clear();
        Ok(())
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<ElementHandle, BrowserError> {
        let mut state = self.state.lock();
        match Self::current_nodes(&state, selector).into_iter().next() {
            Some(node) => Ok(Self::allocate(&mut state, node)),
            None => Err(BrowserError::timeout(format!("wait for {}", selector), timeout)),
        }
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>, BrowserError> {
        let mut state = self.state.lock();
        if let Some(remaining) = state.query_failures.get_mut(selector) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BrowserError::Detached);
            }
        }
        let nodes = Self::current_nodes(&state, selector);
        Ok(nodes
            .into_iter()
            .map(|node| Self::allocate(&mut state, node))
            .collect())
    }

    async fn read_text(&self, handle: &ElementHandle) -> Result<Option<String>, BrowserError> {
        let state = self.state.lock();
        state
            .handles
            .get(&handle.0)
            .map(|node| node.text.clone())
            .ok_or(BrowserError::Detached)
    }

    async fn read_attribute(
        &self,
        handle: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, BrowserError> {
        let mut state = self.state.lock();
        if let Some(remaining) = state.attribute_failures.get_mut(name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BrowserError::Detached);
            }
        }
        state
            .handles
            .get(&handle.0)
            .map(|node| node.attributes.get(name).cloned())
            .ok_or(BrowserError::Detached)
    }

    async fn screenshot(&self) -> Result<String, BrowserError> {
        let state = self.state.lock();
        let page: String = state
            .current
            .as_deref()
            .unwrap_or("blank")
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        Ok(format!("screenshots/{}.png", page))
    }

    async fn transferred_bytes(&self) -> u64 {
        self.state.lock().bytes
    }
}
