//! Browser Automation Capability
//!
//! The collector drives a page through this trait only. Real implementations
//! wrap a browser-automation driver; `fixture::FixtureBrowser` serves scripted
//! in-memory pages.

pub mod fixture;

use std::time::Duration;

pub use fixture::{FixtureBrowser, FixtureItem, FixtureNode, FixturePage};

/// Opaque reference to a DOM element inside one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserError {
    /// Operation did not complete within its budget
    Timeout { operation: String, after: Duration },
    /// Navigation was rejected (DNS, HTTP status, crashed tab)
    Navigation(String),
    /// Selector resolved to nothing when something was required
    SelectorNotFound(String),
    /// Handle no longer attached to the document
    Detached,
    Other(String),
}

impl BrowserError {
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }
}

impl std::fmt::Display for BrowserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { operation, after } => {
                write!(f, "{} timed out after {}ms", operation, after.as_millis())
            }
            Self::Navigation(msg) => write!(f, "navigation failed: {}", msg),
            Self::SelectorNotFound(selector) => write!(f, "selector not found: {}", selector),
            Self::Detached => write!(f, "element detached from document"),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for BrowserError {}

#[async_trait::async_trait]
pub trait BrowserSession: Send + Sync {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), BrowserError>;

    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<ElementHandle, BrowserError>;

    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>, BrowserError>;

    async fn read_text(&self, handle: &ElementHandle) -> Result<Option<String>, BrowserError>;

    async fn read_attribute(
        &self,
        handle: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, BrowserError>;

    /// Capture the current page for diagnostics, returning the file path.
    async fn screenshot(&self) -> Result<String, BrowserError>;

    /// Bytes transferred by the session so far.
    async fn transferred_bytes(&self) -> u64 {
        0
    }
}

/// Resolve a (possibly relative) link against the page it was found on.
pub fn resolve_link(base: &str, href: &str) -> String {
    let href = href.trim();
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }

    let (scheme, rest) = match base.split_once("://") {
        Some(parts) => parts,
        None => return href.to_string(),
    };
    let authority = rest.split('/').next().unwrap_or(rest);
    let origin = format!("{}://{}", scheme, authority);

    if let Some(absolute_path) = href.strip_prefix('/') {
        return format!("{}/{}", origin, absolute_path);
    }

    // Relative to the base document's directory
    let path = &rest[authority.len()..];
    let path = path.split(['?', '#']).next().unwrap_or("");
    let dir = match path.rfind('/') {
        Some(idx) => &path[..=idx],
        None => "/",
    };
    format!("{}{}{}", origin, dir, href)
}
