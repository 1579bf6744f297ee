//! Tests for the paginated collector
//!
//! These tests verify:
//! 1. Quota and page-ceiling discipline
//! 2. Title fallback chain order and record-level retry accounting
//! 3. Optional-field failures degrade the field, never the record
//! 4. Page-level retry, skip and fatal-first-page semantics
//! 5. Engine settle check is advisory only

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use super::profile::{ChromiumProfile, FirefoxProfile, RenderProfile, WebkitProfile};
use super::retry::RetryPolicy;
use super::selectors;
use super::*;
use crate::browser::{FixtureBrowser, FixtureItem, FixtureNode, FixturePage};
use crate::config::EngineTimeouts;
use crate::events::RecordingEventSink;
use crate::models::UNKNOWN_TITLE;

const BASE: &str = "https://listing.test";

fn fast_timeouts() -> EngineTimeouts {
    EngineTimeouts {
        navigation_ms: 500,
        element_ms: 500,
        settle_ms: 150,
    }
}

fn fast_config(target_count: usize) -> CollectorConfig {
    CollectorConfig {
        target_count,
        max_pages: 5,
        page_retry: RetryPolicy::linear(3, 1),
        record_retry: RetryPolicy::linear(2, 1),
    }
}

fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn collector(
    browser: Arc<FixtureBrowser>,
    profile: Box<dyn RenderProfile>,
    config: CollectorConfig,
) -> (PaginatedCollector, Arc<RecordingEventSink>) {
    let sink = Arc::new(RecordingEventSink::new());
    let collector = PaginatedCollector::new(browser, profile, config, sink.clone());
    (collector, sink)
}

fn chromium() -> Box<dyn RenderProfile> {
    Box::new(ChromiumProfile::new(fast_timeouts()))
}

fn first_url() -> String {
    FixtureBrowser::page_url(BASE, 1)
}

// =============================================================================
// QUOTA / CEILING
// =============================================================================

#[tokio::test]
async fn test_quota_reached_after_exactly_four_pages() {
    let browser = Arc::new(FixtureBrowser::paged_listing(BASE, 8, 30, now(), 2));
    let (collector, sink) = collector(browser.clone(), chromium(), fast_config(100));

    let run = collector.collect(&first_url(), Viewport::desktop()).await.unwrap();

    assert_eq!(run.records.len(), 100);
    assert_eq!(run.pages_visited, 4);
    assert_eq!(browser.navigations().len(), 4);
    assert!(!run.shortfall);
    assert_eq!(run.engine, EngineKind::Chromium);

    // Source order is preserved and ids are unique
    let ids: HashSet<&str> = run.records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids.len(), 100);
    assert_eq!(run.records[0].id, "1000000");
    assert_eq!(run.records[99].id, "999901");

    assert_eq!(
        sink.count_where(|e| matches!(e, CollectorEvent::PageCompleted { page: 4, appended: 10, .. })),
        1
    );
}

#[tokio::test]
async fn test_page_ceiling_stops_without_error() {
    let browser = Arc::new(FixtureBrowser::paged_listing(BASE, 8, 10, now(), 2));
    let mut config = fast_config(100);
    config.max_pages = 2;
    let (collector, _) = collector(browser.clone(), chromium(), config);

    let run = collector.collect(&first_url(), Viewport::mobile()).await.unwrap();

    assert_eq!(run.records.len(), 20);
    assert_eq!(run.pages_visited, 2);
    assert!(run.shortfall);
    assert_eq!(run.viewport, Viewport::mobile());
}

#[tokio::test]
async fn test_missing_next_link_is_a_short_result_not_an_error() {
    let browser = Arc::new(FixtureBrowser::paged_listing(BASE, 2, 30, now(), 2));
    let (collector, sink) = collector(browser, chromium(), fast_config(100));

    let run = collector.collect(&first_url(), Viewport::desktop()).await.unwrap();

    assert_eq!(run.records.len(), 60);
    assert!(run.shortfall);
    assert!(run.skipped_pages.is_empty());
    assert_eq!(
        sink.count_where(|e| matches!(e, CollectorEvent::CollectionFinished { shortfall: true, .. })),
        1
    );
}

#[tokio::test]
async fn test_duplicates_across_pages_are_skipped() {
    let n = now();
    let page1 = vec![
        FixtureItem::at("a", "First story title", n - ChronoDuration::minutes(1), n),
        FixtureItem::at("b", "Second story title", n - ChronoDuration::minutes(2), n),
    ];
    let page2 = vec![
        FixtureItem::at("b", "Second story title", n - ChronoDuration::minutes(2), n),
        FixtureItem::at("c", "Third story title", n - ChronoDuration::minutes(3), n),
    ];
    let browser = Arc::new(
        FixtureBrowser::new()
            .with_page(first_url(), FixturePage::listing(&page1, Some("newest?p=2")))
            .with_page(FixtureBrowser::page_url(BASE, 2), FixturePage::listing(&page2, None)),
    );
    let (collector, sink) = collector(browser, chromium(), fast_config(10));

    let run = collector.collect(&first_url(), Viewport::desktop()).await.unwrap();

    let ids: Vec<&str> = run.records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(sink.count_where(|e| matches!(e, CollectorEvent::DuplicateSkipped { .. })), 1);
}

// =============================================================================
// EXTRACTION CHAIN
// =============================================================================

fn single_anchor_page(id: &str) -> FixturePage {
    let n = now();
    FixturePage::new()
        .with_node(selectors::ANCHOR, FixtureNode::default().with_attr("id", id))
        .with_node(
            selectors::age_sibling(id),
            FixtureNode::text("5 minutes ago").with_attr(
                "title",
                format!("2024-06-01T11:55:00 {}", (n - ChronoDuration::minutes(5)).timestamp()),
            ),
        )
}

#[tokio::test]
async fn test_title_falls_back_past_invalid_candidate() {
    let page = single_anchor_page("42")
        .with_node(selectors::title_line("42"), FixtureNode::text("2 hours ago"))
        .with_node(
            selectors::title_cell("42"),
            FixtureNode::text("A perfectly valid headline").with_attr("href", "https://x.test/42"),
        );
    let browser = Arc::new(
        FixtureBrowser::new()
            .with_page(first_url(), page)
            // One transient failure on the first strategy's query
            .fail_query(selectors::title_line("42"), 1),
    );
    let (collector, sink) = collector(browser, chromium(), fast_config(10));

    let run = collector.collect(&first_url(), Viewport::desktop()).await.unwrap();

    let record = &run.records[0];
    assert_eq!(record.title, "A perfectly valid headline");
    assert_eq!(record.source_url.as_deref(), Some("https://x.test/42"));
    // Retry count, not the strategy index (which would also be 2)
    assert_eq!(record.extraction_attempt, 2);
    assert_eq!(sink.count_where(|e| matches!(e, CollectorEvent::RecordRetry { .. })), 1);
    assert_eq!(sink.count_where(|e| matches!(e, CollectorEvent::TitleFallback { .. })), 1);
}

#[tokio::test]
async fn test_strategy_index_does_not_inflate_attempt_number() {
    let page = single_anchor_page("7")
        .with_node(selectors::title_line("7"), FixtureNode::text("Comments"))
        .with_node(selectors::story_link("7"), FixtureNode::text("Third strategy wins here"));
    let browser = Arc::new(FixtureBrowser::new().with_page(first_url(), page));
    let (collector, _) = collector(browser, chromium(), fast_config(10));

    let run = collector.collect(&first_url(), Viewport::desktop()).await.unwrap();

    assert_eq!(run.records[0].title, "Third strategy wins here");
    assert_eq!(run.records[0].extraction_attempt, 1);
}

#[tokio::test]
async fn test_unresolved_title_degrades_but_keeps_record() {
    let browser = Arc::new(FixtureBrowser::new().with_page(first_url(), single_anchor_page("9")));
    let (collector, sink) = collector(browser, chromium(), fast_config(10));

    let run = collector.collect(&first_url(), Viewport::desktop()).await.unwrap();

    assert_eq!(run.records.len(), 1);
    assert_eq!(run.records[0].title, UNKNOWN_TITLE);
    assert!(run.records[0].score.is_none());
    assert!(run.records[0].author.is_none());
    assert!(run.records[0].timestamp.is_some());
    assert_eq!(sink.count_where(|e| matches!(e, CollectorEvent::TitleUnresolved { .. })), 1);
}

#[tokio::test]
async fn test_scoped_fallback_selectors_fill_fields() {
    let page = single_anchor_page("11")
        .with_node(selectors::title_line("11"), FixtureNode::text("Scoped selectors story"))
        .with_node(selectors::score_by_id("11"), FixtureNode::text("57 points"))
        .with_node(selectors::author_scoped("11"), FixtureNode::text("pg"));
    let browser = Arc::new(FixtureBrowser::new().with_page(first_url(), page));
    let (collector, _) = collector(browser, chromium(), fast_config(10));

    let run = collector.collect(&first_url(), Viewport::desktop()).await.unwrap();

    assert_eq!(run.records[0].score, Some(57));
    assert_eq!(run.records[0].author.as_deref(), Some("pg"));
}

#[tokio::test]
async fn test_relative_text_used_when_attribute_absent() {
    let page = FixturePage::new()
        .with_node(selectors::ANCHOR, FixtureNode::default().with_attr("id", "5"))
        .with_node(selectors::title_line("5"), FixtureNode::text("Relative timestamp story"))
        .with_node(selectors::age_sibling("5"), FixtureNode::text("3 hours ago"));
    let browser = Arc::new(FixtureBrowser::new().with_page(first_url(), page));
    let (collector, _) = collector(browser, chromium(), fast_config(10));

    let before = Utc::now();
    let run = collector.collect(&first_url(), Viewport::desktop()).await.unwrap();
    let after = Utc::now();

    let ts = run.records[0].timestamp.unwrap();
    assert!(ts >= before - ChronoDuration::hours(3));
    assert!(ts <= after - ChronoDuration::hours(3));
    assert_eq!(run.records[0].raw_time_text, "3 hours ago");
}

#[tokio::test]
async fn test_records_without_timestamp_are_dropped() {
    let n = now();
    let page = FixturePage::listing(
        &[
            FixtureItem::at("1", "Has a timestamp", n - ChronoDuration::minutes(1), n),
            FixtureItem::new("2", "No parseable age", "sometime last week"),
        ],
        None,
    );
    let browser = Arc::new(FixtureBrowser::new().with_page(first_url(), page));
    let (collector, sink) = collector(browser, chromium(), fast_config(10));

    let run = collector.collect(&first_url(), Viewport::desktop()).await.unwrap();

    assert_eq!(run.records.len(), 1);
    assert_eq!(run.records[0].id, "1");
    assert!(sink.events().contains(&CollectorEvent::RecordDropped {
        id: "2".into(),
        raw_time_text: "sometime last week".into(),
    }));
}

#[tokio::test]
async fn test_first_page_without_usable_records_is_fatal() {
    let page = FixturePage::listing(&[FixtureItem::new("2", "No parseable age", "whenever")], None);
    let browser = Arc::new(FixtureBrowser::new().with_page(first_url(), page));
    let (collector, sink) = collector(browser, chromium(), fast_config(10));

    let err = collector.collect(&first_url(), Viewport::desktop()).await.unwrap_err();

    assert!(matches!(err, CollectError::InsufficientFirstPageData { .. }));
    assert_eq!(sink.count_where(|e| matches!(e, CollectorEvent::FatalFailure { .. })), 1);
}

#[tokio::test]
async fn test_failing_optional_field_keeps_record() {
    let n = now();
    let ts = n - ChronoDuration::minutes(3);
    let page = FixturePage::listing(&[FixtureItem::at("31", "Author lookup keeps failing", ts, n)], None);
    let browser = Arc::new(
        FixtureBrowser::new()
            .with_page(first_url(), page)
            .fail_query(selectors::author_sibling("31"), 10),
    );
    let (collector, sink) = collector(browser, chromium(), fast_config(10));

    let run = collector.collect(&first_url(), Viewport::desktop()).await.unwrap();

    assert_eq!(run.records.len(), 1);
    let record = &run.records[0];
    assert_eq!(record.title, "Author lookup keeps failing");
    assert_eq!(record.score, Some(1));
    assert_eq!(record.timestamp, Some(ts));
    assert!(record.author.is_none());
    // Retried once, then kept on the final attempt
    assert_eq!(record.extraction_attempt, 2);
    assert_eq!(sink.count_where(|e| matches!(e, CollectorEvent::RecordRetry { .. })), 1);
    assert_eq!(sink.count_where(|e| matches!(e, CollectorEvent::RecordFailed { .. })), 0);
    assert_eq!(
        sink.count_where(|e| matches!(
            e,
            CollectorEvent::FieldUnavailable { id, field, .. } if id == "31" && field == "author"
        )),
        1
    );
}

#[tokio::test]
async fn test_transient_field_failure_recovers_on_retry() {
    let n = now();
    let page = FixturePage::listing(
        &[FixtureItem::at("32", "Score read flickers once", n - ChronoDuration::minutes(2), n)],
        None,
    );
    let browser = Arc::new(
        FixtureBrowser::new()
            .with_page(first_url(), page)
            .fail_query(selectors::score_sibling("32"), 1),
    );
    let (collector, sink) = collector(browser, chromium(), fast_config(10));

    let run = collector.collect(&first_url(), Viewport::desktop()).await.unwrap();

    assert_eq!(run.records[0].score, Some(1));
    assert_eq!(run.records[0].extraction_attempt, 2);
    assert_eq!(sink.count_where(|e| matches!(e, CollectorEvent::FieldUnavailable { .. })), 0);
}

#[tokio::test]
async fn test_timestamp_chain_falls_back_past_unparseable_element() {
    let n = now();
    let ts = n - ChronoDuration::minutes(4);
    let page = FixturePage::new()
        .with_node(selectors::ANCHOR, FixtureNode::default().with_attr("id", "77"))
        .with_node(selectors::title_line("77"), FixtureNode::text("Scoped age carries the time"))
        .with_node(selectors::age_sibling("77"), FixtureNode::text("on Jun 1"))
        .with_node(
            selectors::age_scoped("77"),
            FixtureNode::text("4 minutes ago")
                .with_attr("title", format!("2024-06-01T11:56:00 {}", ts.timestamp())),
        );
    let browser = Arc::new(FixtureBrowser::new().with_page(first_url(), page));
    let (collector, sink) = collector(browser, chromium(), fast_config(10));

    let run = collector.collect(&first_url(), Viewport::desktop()).await.unwrap();

    assert_eq!(run.records.len(), 1);
    assert_eq!(run.records[0].timestamp, Some(ts));
    assert_eq!(run.records[0].raw_time_text, "4 minutes ago");
    assert_eq!(sink.count_where(|e| matches!(e, CollectorEvent::RecordDropped { .. })), 0);
}

#[tokio::test]
async fn test_dropped_record_reports_first_rendered_age_text() {
    let n = now();
    let page = FixturePage::listing(
        &[FixtureItem::at("1", "Keeps the page usable", n - ChronoDuration::minutes(1), n)],
        None,
    )
    .with_node(selectors::ANCHOR, FixtureNode::default().with_attr("id", "78"))
    .with_node(selectors::title_line("78"), FixtureNode::text("Neither age element parses"))
    .with_node(selectors::age_sibling("78"), FixtureNode::text("on Jun 1"))
    .with_node(selectors::age_scoped("78"), FixtureNode::text("a while back"));
    let browser = Arc::new(FixtureBrowser::new().with_page(first_url(), page));
    let (collector, sink) = collector(browser, chromium(), fast_config(10));

    let run = collector.collect(&first_url(), Viewport::desktop()).await.unwrap();

    assert_eq!(run.records.len(), 1);
    assert!(sink.events().contains(&CollectorEvent::RecordDropped {
        id: "78".into(),
        raw_time_text: "on Jun 1".into(),
    }));
}

#[tokio::test]
async fn test_unreadable_anchor_id_is_reported() {
    let n = now();
    let page = FixturePage::listing(
        &[
            FixtureItem::at("41", "First anchor loses its id", n - ChronoDuration::minutes(1), n),
            FixtureItem::at("40", "Second anchor reads fine", n - ChronoDuration::minutes(2), n),
        ],
        None,
    );
    let browser = Arc::new(
        FixtureBrowser::new()
            .with_page(first_url(), page)
            .fail_attribute("id", 1),
    );
    let (collector, sink) = collector(browser, chromium(), fast_config(10));

    let run = collector.collect(&first_url(), Viewport::desktop()).await.unwrap();

    assert_eq!(run.records.len(), 1);
    assert_eq!(run.records[0].id, "40");
    assert_eq!(
        sink.count_where(|e| matches!(e, CollectorEvent::AnchorUnreadable { page: 1, index: 0, .. })),
        1
    );
}

// =============================================================================
// PAGE-LEVEL FAILURES
// =============================================================================

#[tokio::test]
async fn test_navigation_retried_then_succeeds() {
    let browser = Arc::new(
        FixtureBrowser::paged_listing(BASE, 1, 5, now(), 2).fail_navigation(first_url(), 2),
    );
    let (collector, sink) = collector(browser.clone(), chromium(), fast_config(5));

    let run = collector.collect(&first_url(), Viewport::desktop()).await.unwrap();

    assert_eq!(run.records.len(), 5);
    assert_eq!(browser.navigations().len(), 3);
    assert_eq!(sink.count_where(|e| matches!(e, CollectorEvent::NavigationRetry { .. })), 2);
}

#[tokio::test]
async fn test_first_page_navigation_exhaustion_fails_run() {
    let browser = Arc::new(
        FixtureBrowser::paged_listing(BASE, 1, 5, now(), 2).fail_navigation(first_url(), 10),
    );
    let (collector, sink) = collector(browser.clone(), chromium(), fast_config(5));

    let err = collector.collect(&first_url(), Viewport::desktop()).await.unwrap_err();

    match err {
        CollectError::NavigationFailure { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(browser.navigations().len(), 3);
    let screenshots = sink.count_where(|e| {
        matches!(e, CollectorEvent::FatalFailure { screenshot: Some(_), .. })
    });
    assert_eq!(screenshots, 1);
}

#[tokio::test]
async fn test_navigation_timeout_counts_as_failure() {
    let browser = Arc::new(
        FixtureBrowser::paged_listing(BASE, 1, 5, now(), 2)
            .delay_navigation(first_url(), std::time::Duration::from_secs(30)),
    );
    let mut timeouts = fast_timeouts();
    timeouts.navigation_ms = 20;
    let mut config = fast_config(5);
    config.page_retry = RetryPolicy::linear(2, 1);
    let (collector, _) = collector(browser, Box::new(ChromiumProfile::new(timeouts)), config);

    let err = collector.collect(&first_url(), Viewport::desktop()).await.unwrap_err();

    match err {
        CollectError::NavigationFailure { source, .. } => {
            assert!(matches!(source, BrowserError::Timeout { .. }))
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_later_page_failure_keeps_gathered_records() {
    let browser = Arc::new(
        FixtureBrowser::paged_listing(BASE, 3, 30, now(), 2)
            .fail_navigation(FixtureBrowser::page_url(BASE, 2), 10),
    );
    let (collector, sink) = collector(browser, chromium(), fast_config(100));

    let run = collector.collect(&first_url(), Viewport::desktop()).await.unwrap();

    assert_eq!(run.records.len(), 30);
    assert_eq!(run.skipped_pages, vec![2]);
    assert_eq!(run.pages_visited, 1);
    assert!(run.shortfall);
    assert_eq!(sink.count_where(|e| matches!(e, CollectorEvent::PageSkipped { page: 2, .. })), 1);
}

#[tokio::test]
async fn test_unready_first_page_is_fatal() {
    let browser = Arc::new(FixtureBrowser::new().with_page(first_url(), FixturePage::new()));
    let (collector, _) = collector(browser, chromium(), fast_config(5));

    let err = collector.collect(&first_url(), Viewport::desktop()).await.unwrap_err();
    assert!(matches!(err, CollectError::ReadinessTimeout { .. }));
}

#[tokio::test]
async fn test_zero_target_rejected_before_navigation() {
    let browser = Arc::new(FixtureBrowser::paged_listing(BASE, 1, 5, now(), 1));
    let (collector, _) = collector(browser.clone(), chromium(), fast_config(0));

    let err = collector.collect(&first_url(), Viewport::desktop()).await.unwrap_err();
    assert!(matches!(err, CollectError::InvalidConfig(_)));
    assert!(browser.navigations().is_empty());
}

// =============================================================================
// ENGINE PROFILES
// =============================================================================

#[tokio::test]
async fn test_ready_chain_uses_fallback_selector() {
    let page = FixturePage::new().with_node(".athing", FixtureNode::default());
    let browser = FixtureBrowser::new().with_page(first_url(), page);
    browser
        .navigate(&first_url(), std::time::Duration::from_secs(1))
        .await
        .unwrap();

    let ready = ChromiumProfile::new(fast_timeouts()).wait_ready(&browser).await.unwrap();
    assert_eq!(ready.selector, ".athing");
    assert_eq!(ready.fallback_index, 3);
}

#[tokio::test]
async fn test_webkit_settle_failure_is_advisory() {
    // Anchors and ages render, title rows never attach
    let browser = Arc::new(FixtureBrowser::new().with_page(first_url(), single_anchor_page("3")));
    let profile = Box::new(WebkitProfile::new(fast_timeouts()));
    let (collector, sink) = collector(browser, profile, fast_config(5));

    let run = collector.collect(&first_url(), Viewport::desktop()).await.unwrap();

    assert_eq!(run.records.len(), 1);
    assert_eq!(run.engine, EngineKind::Webkit);
    assert_eq!(sink.count_where(|e| matches!(e, CollectorEvent::ReadinessDegraded { .. })), 1);
}

#[tokio::test]
async fn test_webkit_settle_passes_when_titles_present() {
    let browser = Arc::new(FixtureBrowser::paged_listing(BASE, 1, 3, now(), 2));
    let profile = Box::new(WebkitProfile::new(fast_timeouts()));
    let (collector, sink) = collector(browser, profile, fast_config(3));

    collector.collect(&first_url(), Viewport::desktop()).await.unwrap();
    assert_eq!(sink.count_where(|e| matches!(e, CollectorEvent::ReadinessDegraded { .. })), 0);
}

#[tokio::test]
async fn test_firefox_chain_reaches_title_line_as_fallback() {
    let browser = Arc::new(FixtureBrowser::paged_listing(BASE, 1, 2, now(), 2));
    let profile = Box::new(FirefoxProfile::new(fast_timeouts()));
    let (collector, sink) = collector(browser, profile, fast_config(2));

    let run = collector.collect(&first_url(), Viewport::desktop()).await.unwrap();

    assert!(run.records.iter().all(|r| r.has_title()));
    assert_eq!(sink.count_where(|e| matches!(e, CollectorEvent::TitleFallback { .. })), 2);
}

// =============================================================================
// RUN MATRIX
// =============================================================================

struct FixtureFactory;

#[async_trait::async_trait]
impl SessionFactory for FixtureFactory {
    async fn open(
        &self,
        engine: EngineKind,
        _viewport: &Viewport,
    ) -> Result<Arc<dyn BrowserSession>, BrowserError> {
        if engine == EngineKind::Firefox {
            return Err(BrowserError::Other("firefox not installed".into()));
        }
        Ok(Arc::new(FixtureBrowser::paged_listing(BASE, 2, 10, now(), 2)))
    }
}

#[tokio::test]
async fn test_run_matrix_isolates_failed_combinations() {
    let mut config = AuditConfig::default();
    config.target_url = first_url();
    config.collector = fast_config(15);
    config.engines.chromium = fast_timeouts();
    config.engines.webkit = fast_timeouts();

    let entries = run_matrix(
        &FixtureFactory,
        &config,
        &EngineKind::ALL,
        &[Viewport::desktop(), Viewport::mobile()],
        Arc::new(RecordingEventSink::new()),
    )
    .await;

    assert_eq!(entries.len(), 6);
    for entry in &entries {
        match (&entry.engine, &entry.outcome) {
            (EngineKind::Firefox, outcome) => assert!(outcome.is_err()),
            (_, Ok(run)) => assert_eq!(run.records.len(), 15),
            (engine, Err(e)) => panic!("{} failed: {}", engine, e),
        }
    }
}
