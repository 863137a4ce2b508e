//! # Fetch Orchestrator
//! One fetch cycle: every enabled adapter is tried concurrently (bounded pool), each
//! with its own timeout and transient-failure retry, under an overall deadline.
//! Results of all adapters that succeeded inside the window are unioned in priority
//! order and written to the [`CacheStore`]; on total failure the previous snapshot is
//! served untouched.
//!
//! Phases of a cycle: `Idle → TryingAdapter(i) → {Success, Exhausted}`, and after
//! exhaustion `ServeStaleCache` (non-empty cache) or `FetchFailed`.

pub mod providers;
pub mod rate_limit;
pub mod scheduler;
pub mod types;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::article::{Article, Category};
use crate::cache::{CacheEntry, CacheStore};
use crate::config::PipelineConfig;
use crate::ingest::types::SourceAdapter;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("news_fetch_cycles_total", "Fetch cycles by outcome (success/stale/failed).");
        describe_counter!("news_adapter_errors_total", "Adapter call failures by adapter and kind.");
        describe_counter!("news_malformed_records_total", "Provider records dropped during normalization.");
        describe_counter!("news_articles_fetched_total", "Articles accepted from providers.");
        describe_histogram!("news_adapter_latency_ms", "Adapter call latency including retries.");
        describe_histogram!("news_rss_parse_ms", "RSS feed parse time in milliseconds.");
        describe_gauge!("news_cache_age_secs", "Age of the cached snapshot in seconds.");
        describe_gauge!("news_cache_articles", "Articles in the cached snapshot.");
    });
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub adapter_timeout: Duration,
    /// Extra attempts for transient failures (`Unreachable`, timeout).
    pub retries: u32,
    pub retry_backoff: Duration,
    pub deadline: Duration,
    /// Worker pool size; `None` means one worker per adapter.
    pub max_parallel: Option<usize>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            adapter_timeout: Duration::from_secs(8),
            retries: 1,
            retry_backoff: Duration::from_millis(500),
            deadline: Duration::from_secs(20),
            max_parallel: None,
        }
    }
}

impl From<&PipelineConfig> for OrchestratorConfig {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            adapter_timeout: cfg.adapter_timeout,
            retries: cfg.adapter_retries,
            deadline: cfg.fetch_deadline,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchPhase {
    Idle,
    TryingAdapter(usize),
    Success,
    Exhausted,
    ServeStaleCache,
    FetchFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdapterStatus {
    Succeeded { articles: usize },
    /// Answered, but with nothing usable.
    Empty,
    Failed { kind: String, error: String },
    TimedOut,
    /// Still pending when the cycle deadline hit; cancelled.
    DeadlineExceeded,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdapterOutcome {
    pub adapter: String,
    pub priority: usize,
    pub attempts: u32,
    #[serde(flatten)]
    pub status: AdapterStatus,
    pub elapsed_ms: u64,
}

impl AdapterOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, AdapterStatus::Succeeded { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    /// Final phase.
    pub phase: FetchPhase,
    /// Every transition, in order.
    pub transitions: Vec<FetchPhase>,
    /// Per adapter, in priority order.
    pub adapters: Vec<AdapterOutcome>,
    /// Articles in the merged union (0 unless the cycle succeeded).
    pub articles: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// Cache was replaced with this cycle's union.
    Fresh { entry: Arc<CacheEntry>, report: CycleReport },
    /// Every adapter failed; the previous snapshot is served as-is.
    Stale { entry: Arc<CacheEntry>, report: CycleReport },
    /// Every adapter failed and there is nothing cached.
    Failed { report: CycleReport },
}

impl CycleOutcome {
    pub fn report(&self) -> &CycleReport {
        match self {
            CycleOutcome::Fresh { report, .. }
            | CycleOutcome::Stale { report, .. }
            | CycleOutcome::Failed { report } => report,
        }
    }

    pub fn entry(&self) -> Option<&Arc<CacheEntry>> {
        match self {
            CycleOutcome::Fresh { entry, .. } | CycleOutcome::Stale { entry, .. } => Some(entry),
            CycleOutcome::Failed { .. } => None,
        }
    }
}

pub struct FetchOrchestrator {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    cache: Arc<CacheStore>,
    cfg: OrchestratorConfig,
}

impl FetchOrchestrator {
    /// `adapters` in priority order (index 0 first).
    pub fn new(adapters: Vec<Arc<dyn SourceAdapter>>, cache: Arc<CacheStore>, cfg: OrchestratorConfig) -> Self {
        ensure_metrics_described();
        Self { adapters, cache, cfg }
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn adapter_names(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.name().to_string()).collect()
    }

    pub async fn run_cycle(&self, category: Option<&Category>, limit: usize) -> CycleOutcome {
        let started_at = Utc::now();
        let deadline = tokio::time::Instant::now() + self.cfg.deadline;
        let parallel = self
            .cfg
            .max_parallel
            .unwrap_or(self.adapters.len())
            .max(1);

        let transitions = Mutex::new(vec![FetchPhase::Idle]);
        let mut results: Vec<Option<(AdapterOutcome, Vec<Article>)>> =
            (0..self.adapters.len()).map(|_| None).collect();

        {
            let transitions = &transitions;
            let cfg = &self.cfg;
            // Built eagerly so the stream holds concrete futures; a lazy `map` over
            // borrowed adapters makes the cycle future non-`Send`.
            let calls: Vec<_> = self
                .adapters
                .iter()
                .enumerate()
                .map(|(i, adapter)| async move {
                    transitions
                        .lock()
                        .unwrap_or_else(|p| p.into_inner())
                        .push(FetchPhase::TryingAdapter(i));
                    (i, attempt(adapter.as_ref(), i, category, limit, cfg).await)
                })
                .collect();
            let mut pending = stream::iter(calls).buffer_unordered(parallel);

            loop {
                match tokio::time::timeout_at(deadline, pending.next()).await {
                    Ok(Some((i, result))) => results[i] = Some(result),
                    Ok(None) => break,
                    Err(_) => {
                        tracing::warn!(
                            target: "ingest",
                            deadline_ms = self.cfg.deadline.as_millis() as u64,
                            "fetch cycle deadline reached, cancelling pending adapters"
                        );
                        break;
                    }
                }
            }
            // Dropping the stream cancels whatever is still in flight.
        }

        let mut transitions = transitions.into_inner().unwrap_or_else(|p| p.into_inner());
        let mut adapters = Vec::with_capacity(results.len());
        let mut union = Vec::new();
        for (i, slot) in results.into_iter().enumerate() {
            match slot {
                Some((outcome, articles)) => {
                    union.extend(articles);
                    adapters.push(outcome);
                }
                None => {
                    let name = self.adapters[i].name().to_string();
                    counter!("news_adapter_errors_total", "adapter" => name.clone(), "kind" => "deadline")
                        .increment(1);
                    adapters.push(AdapterOutcome {
                        adapter: name,
                        priority: i,
                        attempts: 0,
                        status: AdapterStatus::DeadlineExceeded,
                        elapsed_ms: self.cfg.deadline.as_millis() as u64,
                    });
                }
            }
        }

        let succeeded = adapters.iter().any(AdapterOutcome::succeeded);
        let finished_at = Utc::now();
        let mut report = CycleReport {
            phase: FetchPhase::Idle,
            transitions: Vec::new(),
            adapters,
            articles: 0,
            started_at,
            finished_at,
        };

        if succeeded {
            transitions.push(FetchPhase::Success);
            report.articles = union.len();
            report.phase = FetchPhase::Success;
            report.transitions = transitions;
            let entry = self.cache.replace(union, finished_at);
            counter!("news_fetch_cycles_total", "outcome" => "success").increment(1);
            tracing::info!(
                target: "ingest",
                articles = report.articles,
                ok = report.adapters.iter().filter(|a| a.succeeded()).count(),
                total = report.adapters.len(),
                "fetch cycle succeeded"
            );
            return CycleOutcome::Fresh { entry, report };
        }

        transitions.push(FetchPhase::Exhausted);
        match self.cache.stale() {
            Some(entry) => {
                transitions.push(FetchPhase::ServeStaleCache);
                report.phase = FetchPhase::ServeStaleCache;
                report.transitions = transitions;
                counter!("news_fetch_cycles_total", "outcome" => "stale").increment(1);
                tracing::warn!(
                    target: "ingest",
                    cached = entry.snapshot.len(),
                    cached_at = %entry.fetched_at,
                    "all adapters failed, serving stale cache"
                );
                CycleOutcome::Stale { entry, report }
            }
            None => {
                transitions.push(FetchPhase::FetchFailed);
                report.phase = FetchPhase::FetchFailed;
                report.transitions = transitions;
                counter!("news_fetch_cycles_total", "outcome" => "failed").increment(1);
                tracing::error!(target: "ingest", "all adapters failed and cache is empty");
                CycleOutcome::Failed { report }
            }
        }
    }
}

/// Call one adapter with timeout and bounded retry of transient failures.
async fn attempt(
    adapter: &dyn SourceAdapter,
    priority: usize,
    category: Option<&Category>,
    limit: usize,
    cfg: &OrchestratorConfig,
) -> (AdapterOutcome, Vec<Article>) {
    let t0 = Instant::now();
    let name = adapter.name().to_string();
    let mut attempts = 0u32;
    let mut backoff = cfg.retry_backoff;

    let (status, articles) = loop {
        attempts += 1;
        let (status, retryable) =
            match tokio::time::timeout(cfg.adapter_timeout, adapter.fetch(category, limit)).await {
                Ok(Ok(articles)) if !articles.is_empty() => {
                    let n = articles.len();
                    break (AdapterStatus::Succeeded { articles: n }, articles);
                }
                Ok(Ok(_)) => break (AdapterStatus::Empty, Vec::new()),
                Ok(Err(e)) => {
                    tracing::warn!(target: "ingest", adapter = %name, attempt = attempts, kind = e.kind(), error = %e, "adapter failed");
                    counter!("news_adapter_errors_total", "adapter" => name.clone(), "kind" => e.kind())
                        .increment(1);
                    let retryable = e.is_transient();
                    (
                        AdapterStatus::Failed {
                            kind: e.kind().to_string(),
                            error: e.to_string(),
                        },
                        retryable,
                    )
                }
                Err(_) => {
                    tracing::warn!(target: "ingest", adapter = %name, attempt = attempts, "adapter timed out");
                    counter!("news_adapter_errors_total", "adapter" => name.clone(), "kind" => "timeout")
                        .increment(1);
                    (AdapterStatus::TimedOut, true)
                }
            };
        if !retryable || attempts > cfg.retries {
            break (status, Vec::new());
        }
        tokio::time::sleep(backoff).await;
        backoff = backoff.saturating_mul(2);
    };

    let elapsed_ms = t0.elapsed().as_millis() as u64;
    histogram!("news_adapter_latency_ms", "adapter" => name.clone()).record(elapsed_ms as f64);
    (
        AdapterOutcome {
            adapter: name,
            priority,
            attempts,
            status,
            elapsed_ms,
        },
        articles,
    )
}
