//! Integration tests for the collect → validate → score pipeline
//!
//! These tests drive the public API end-to-end against an in-memory
//! listing, with quality history persisted to a temporary directory.

use std::sync::Arc;

use chrono::{Duration, Utc};

use sortwatch_backend::browser::{BrowserError, BrowserSession, FixtureBrowser, FixtureItem, FixturePage};
use sortwatch_backend::collector::{run_matrix, PaginatedCollector, SessionFactory};
use sortwatch_backend::config::AuditConfig;
use sortwatch_backend::events::{ChannelEventSink, CollectorEvent, RecordingEventSink};
use sortwatch_backend::models::{EngineKind, RunResult, Viewport};
use sortwatch_backend::quality::gates::{evaluate, Verdict};
use sortwatch_backend::quality::history::JsonFileHistory;
use sortwatch_backend::quality::signals::ExternalSignals;
use sortwatch_backend::quality::{Grade, QualityAggregator};
use sortwatch_backend::validation::{validate_run, AnomalyKind};

const BASE: &str = "https://integration.listing.test";

fn config_for(target_count: usize) -> AuditConfig {
    let mut config = AuditConfig::default();
    config.target_url = FixtureBrowser::page_url(BASE, 1);
    config.collector.target_count = target_count;
    config
}

#[tokio::test]
async fn test_sorted_listing_scores_a_plus_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_for(100);
    config.history.path = dir.path().join("quality-history.json");

    let browser = Arc::new(FixtureBrowser::paged_listing(BASE, 4, 30, Utc::now(), 2));
    let collector = PaginatedCollector::for_engine(
        browser,
        EngineKind::Chromium,
        &config,
        Arc::new(RecordingEventSink::new()),
    );
    let run = collector
        .collect(&config.target_url, Viewport::desktop())
        .await
        .unwrap();

    assert_eq!(run.records.len(), 100);
    assert_eq!(run.pages_visited, 4);
    assert!(!run.shortfall);

    let validation = validate_run(&run);
    assert_eq!(validation.sorting_accuracy.accuracy, 100.0);
    assert_eq!(validation.data_validation.completeness_ratio, 100.0);
    assert!(validation.anomalies.anomalies.is_empty());
    assert_eq!(validation.timestamp_distribution.bucket_counts.last_6_hours, 70);

    let repo = JsonFileHistory::new(&config.history.path, config.history.retention());
    let mut aggregator = QualityAggregator::new(Box::new(repo)).unwrap();
    let snapshot = aggregator
        .score_and_record(&run, &validation, &ExternalSignals::default())
        .unwrap();
    assert_eq!(snapshot.overall.grade, Grade::APlus);

    let gates = evaluate(&validation, &snapshot, &config.thresholds);
    assert_eq!(gates.overall, Verdict::Pass);

    let persisted = std::fs::read_to_string(&config.history.path).unwrap();
    assert!(persisted.contains("\"A+\""));
}

#[tokio::test]
async fn test_out_of_order_entries_surface_as_sorting_errors() {
    let now = Utc::now();
    let minutes = [1, 3, 9, 5, 7, 11];
    let items: Vec<FixtureItem> = minutes
        .iter()
        .enumerate()
        .map(|(i, m)| {
            FixtureItem::at(
                format!("{}", 900 - i),
                format!("Out of order entry {}", i),
                now - Duration::minutes(*m),
                now,
            )
        })
        .collect();
    let browser = Arc::new(
        FixtureBrowser::new().with_page(FixtureBrowser::page_url(BASE, 1), FixturePage::listing(&items, None)),
    );

    let config = config_for(10);
    let run = PaginatedCollector::for_engine(
        browser,
        EngineKind::Firefox,
        &config,
        Arc::new(RecordingEventSink::new()),
    )
    .collect(&config.target_url, Viewport::mobile())
    .await
    .unwrap();

    assert_eq!(run.records.len(), 6);
    assert!(run.shortfall);

    let validation = validate_run(&run);
    // pairs: ok ok err ok ok
    assert_eq!(validation.sorting_accuracy.accuracy, 80.0);
    assert_eq!(validation.anomalies.count(AnomalyKind::SortingError), 1);
    assert_eq!(validation.anomalies.anomalies[0].index, 2);

    // 80% clears the configured 20% bar
    let dir = tempfile::tempdir().unwrap();
    let aggregator = QualityAggregator::new(Box::new(JsonFileHistory::new(
        dir.path().join("quality-history.json"),
        config.history.retention(),
    )))
    .unwrap();
    let snapshot = aggregator.score(&run, &validation, &ExternalSignals::default());
    let gates = evaluate(&validation, &snapshot, &config.thresholds);
    assert_eq!(gates.gate("sorting_accuracy").unwrap().verdict, Verdict::Pass);
}

#[tokio::test]
async fn test_channel_sink_streams_collection_events() {
    let (sink, mut rx) = ChannelEventSink::new();
    let config = config_for(20);
    let browser = Arc::new(FixtureBrowser::paged_listing(BASE, 2, 15, Utc::now(), 1));

    let run = PaginatedCollector::for_engine(browser, EngineKind::Webkit, &config, Arc::new(sink))
        .collect(&config.target_url, Viewport::tablet())
        .await
        .unwrap();
    assert_eq!(run.records.len(), 20);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(matches!(events.first(), Some(CollectorEvent::PageStarted { page: 1, .. })));
    assert!(matches!(
        events.last(),
        Some(CollectorEvent::CollectionFinished {
            collected: 20,
            shortfall: false,
            ..
        })
    ));
}

struct ListingFactory;

#[async_trait::async_trait]
impl SessionFactory for ListingFactory {
    async fn open(
        &self,
        engine: EngineKind,
        _viewport: &Viewport,
    ) -> Result<Arc<dyn BrowserSession>, BrowserError> {
        if engine == EngineKind::Webkit {
            return Err(BrowserError::Other("webkit unavailable".to_string()));
        }
        Ok(Arc::new(FixtureBrowser::paged_listing(BASE, 2, 10, Utc::now(), 3)))
    }
}

#[tokio::test]
async fn test_matrix_keeps_going_when_a_session_cannot_open() {
    let config = config_for(12);
    let entries = run_matrix(
        &ListingFactory,
        &config,
        &EngineKind::ALL,
        &[Viewport::desktop(), Viewport::mobile()],
        Arc::new(RecordingEventSink::new()),
    )
    .await;

    assert_eq!(entries.len(), 6);
    let runs: Vec<&RunResult> = entries.iter().filter_map(|e| e.outcome.as_ref().ok()).collect();
    assert_eq!(runs.len(), 4);
    assert!(runs.iter().all(|r| r.records.len() == 12));
    assert!(entries
        .iter()
        .filter(|e| e.engine == EngineKind::Webkit)
        .all(|e| e.outcome.is_err()));
}

#[test]
fn test_serialized_run_validates_identically() {
    let now = Utc::now();
    let run = RunResult {
        run_id: uuid::Uuid::new_v4(),
        engine: EngineKind::Chromium,
        viewport: Viewport::desktop(),
        records: (0..5)
            .map(|i| {
                sortwatch_backend::models::Record::new(format!("{}", 10 - i), now - Duration::minutes(i * 4))
                    .with_title(format!("Serialized entry {}", i))
                    .with_author("writer")
                    .with_score(2)
            })
            .collect(),
        target_count: 5,
        pages_visited: 1,
        skipped_pages: Vec::new(),
        shortfall: false,
        performance: Default::default(),
        started_at: now,
        duration_ms: 1_500,
    };

    let json = serde_json::to_string(&run).unwrap();
    let restored: RunResult = serde_json::from_str(&json).unwrap();
    assert_eq!(validate_run(&restored), validate_run(&run));
}
