// tests/orchestrator_cache.rs
//
// Fetch cycles against the cache: success replaces the snapshot, total failure leaves
// it untouched and serves it stale, the deadline cancels slow adapters.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use infosphere_news::cache::CacheStore;
use infosphere_news::ingest::types::SourceAdapter;
use infosphere_news::ingest::{AdapterStatus, CycleOutcome, FetchOrchestrator, FetchPhase, OrchestratorConfig};

use common::{fixture_adapters, quick_orchestrator_cfg, Down, Slow, Switch};

fn cache() -> Arc<CacheStore> {
    Arc::new(CacheStore::new(Duration::from_secs(120 * 60)))
}

#[tokio::test]
async fn union_of_successful_adapters_in_priority_order() {
    let mut adapters = fixture_adapters();
    adapters.insert(1, Arc::new(Down::new("Broken")));
    let o = FetchOrchestrator::new(adapters, cache(), quick_orchestrator_cfg());

    let out = o.run_cycle(None, 50).await;
    let CycleOutcome::Fresh { entry, report } = out else {
        panic!("expected a fresh cycle");
    };
    // 2 NewsAPI + 2 GNews + 1 NewsData + 2 RSS
    assert_eq!(entry.snapshot.len(), 7);
    assert_eq!(entry.snapshot[0].source_name, "The Hindu");
    assert_eq!(entry.snapshot.last().map(|a| a.source_name.as_str()), Some("National Desk"));
    assert_eq!(report.phase, FetchPhase::Success);
    assert_eq!(report.adapters.len(), 5);
    assert!(matches!(report.adapters[1].status, AdapterStatus::Failed { .. }));
    assert_eq!(o.cache().current().map(|e| e.snapshot.len()), Some(7));
}

#[tokio::test]
async fn total_failure_keeps_previous_snapshot_and_serves_it_stale() {
    let switch = Arc::new(Switch::new("Cabinet approves new rail corridor"));
    let store = cache();
    let o = FetchOrchestrator::new(
        vec![switch.clone() as Arc<dyn SourceAdapter>, Arc::new(Down::new("Other"))],
        store.clone(),
        quick_orchestrator_cfg(),
    );

    let first = o.run_cycle(None, 10).await;
    assert!(matches!(first, CycleOutcome::Fresh { .. }));
    let before = store.current().expect("cached");

    switch.set_up(false);
    let second = o.run_cycle(None, 10).await;
    match &second {
        CycleOutcome::Stale { entry, report } => {
            assert_eq!(entry.fetched_at, before.fetched_at);
            assert_eq!(report.phase, FetchPhase::ServeStaleCache);
            assert!(report.transitions.contains(&FetchPhase::Exhausted));
        }
        other => panic!("expected stale, got {:?}", other.report().phase),
    }
    let after = store.current().expect("still cached");
    assert_eq!(*after, *before, "cache untouched on total failure");
}

#[tokio::test]
async fn total_failure_on_empty_cache_is_fetch_failed() {
    let down = Arc::new(Down::new("Only"));
    let o = FetchOrchestrator::new(vec![down.clone() as Arc<dyn SourceAdapter>], cache(), quick_orchestrator_cfg());
    let out = o.run_cycle(None, 10).await;
    assert!(matches!(out, CycleOutcome::Failed { .. }));
    assert_eq!(out.report().phase, FetchPhase::FetchFailed);
    assert!(o.cache().current().is_none());
    // retries = 0 in the quick config
    assert_eq!(down.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn deadline_cancels_pending_adapters() {
    let cfg = OrchestratorConfig {
        adapter_timeout: Duration::from_secs(60),
        retries: 0,
        retry_backoff: Duration::from_millis(10),
        deadline: Duration::from_secs(5),
        max_parallel: None,
    };
    let o = FetchOrchestrator::new(
        vec![
            Arc::new(Slow {
                delay: Duration::from_secs(30),
            }) as Arc<dyn SourceAdapter>,
            Arc::new(Switch::new("Fast story")),
        ],
        cache(),
        cfg,
    );
    let out = o.run_cycle(None, 10).await;
    let report = out.report();
    assert_eq!(report.phase, FetchPhase::Success);
    assert!(matches!(report.adapters[0].status, AdapterStatus::DeadlineExceeded));
    assert!(report.adapters[1].succeeded());
    assert_eq!(out.entry().map(|e| e.snapshot.len()), Some(1));
}

#[tokio::test(start_paused = true)]
async fn adapter_timeout_counts_as_failure() {
    let cfg = OrchestratorConfig {
        adapter_timeout: Duration::from_secs(1),
        retries: 1,
        retry_backoff: Duration::from_millis(100),
        deadline: Duration::from_secs(20),
        max_parallel: Some(1),
    };
    let o = FetchOrchestrator::new(
        vec![Arc::new(Slow {
            delay: Duration::from_secs(10),
        }) as Arc<dyn SourceAdapter>],
        cache(),
        cfg,
    );
    let out = o.run_cycle(None, 10).await;
    let a = &out.report().adapters[0];
    assert!(matches!(a.status, AdapterStatus::TimedOut));
    assert_eq!(a.attempts, 2, "timeouts are retried once");
}

#[tokio::test]
async fn snapshot_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache/news.json");

    let store = Arc::new(CacheStore::with_persistence(Duration::from_secs(3600), &path));
    let o = FetchOrchestrator::new(fixture_adapters(), store, quick_orchestrator_cfg());
    let written = o.run_cycle(None, 50).await.entry().cloned().expect("fresh");

    let restored = CacheStore::with_persistence(Duration::from_secs(3600), &path);
    let entry = restored.current().expect("restored from disk");
    assert_eq!(entry.snapshot, written.snapshot);
    assert_eq!(entry.fetched_at, written.fetched_at);
}
