// src/ingest/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::ingest::CycleOutcome;
use crate::pipeline::NewsService;

/// Spawn the periodic refresh + verification loop. The first tick fires immediately.
pub fn spawn_refresh_scheduler(service: Arc<NewsService>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let outcome = service.refresh_and_verify().await;
            let label = match &outcome {
                CycleOutcome::Fresh { .. } => "fresh",
                CycleOutcome::Stale { .. } => "stale",
                CycleOutcome::Failed { .. } => "failed",
            };

            counter!("news_scheduler_ticks_total", "outcome" => label).increment(1);
            gauge!("news_scheduler_last_run_ts").set(chrono::Utc::now().timestamp() as f64);

            tracing::info!(
                target: "ingest",
                outcome = label,
                articles = outcome.report().articles,
                "scheduled refresh tick"
            );
        }
    })
}
