// tests/scheduler.rs
//
// The background refresh loop runs on the multi-threaded runtime, so everything it
// awaits has to be `Send`. These tests spawn it for real.

mod common;

use std::time::Duration;

use infosphere_news::ingest::scheduler::spawn_refresh_scheduler;
use infosphere_news::ingest::{CycleOutcome, FetchPhase};

use common::{fixture_adapters, offline_service};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refresh_and_verify_runs_on_a_spawned_task() {
    let service = offline_service(fixture_adapters());
    let task = {
        let service = service.clone();
        tokio::spawn(async move { service.refresh_and_verify().await })
    };
    let outcome = task.await.expect("task completes");
    assert!(matches!(outcome, CycleOutcome::Fresh { .. }));

    let view = service.processed().expect("processed view");
    assert_eq!(view.articles.len(), 4);
    for a in &view.articles {
        assert!(service.trust(&a.id).is_some(), "{} verified", a.id);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn first_tick_fires_immediately() {
    let service = offline_service(fixture_adapters());
    let handle = spawn_refresh_scheduler(service.clone(), Duration::from_secs(3600));

    let mut verified = false;
    for _ in 0..100 {
        if let Some(view) = service.processed() {
            if view.articles.iter().all(|a| service.trust(&a.id).is_some()) {
                verified = true;
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    handle.abort();

    assert!(verified, "scheduler refreshed and verified within 5s");
    assert_eq!(service.last_report().map(|r| r.phase), Some(FetchPhase::Success));
}
