// tests/common/mod.rs
//
// Shared builders: fixture adapters, scripted adapters and an offline NewsService.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use infosphere_news::cache::CacheStore;
use infosphere_news::categorize::Categorizer;
use infosphere_news::dedup::Deduplicator;
use infosphere_news::flagging::{FlagLog, FlaggingPolicy};
use infosphere_news::ingest::providers::{GNewsAdapter, NewsApiAdapter, NewsDataAdapter, RssAdapter};
use infosphere_news::ingest::rate_limit::RateLimitBook;
use infosphere_news::ingest::types::SourceAdapter;
use infosphere_news::ingest::{FetchOrchestrator, OrchestratorConfig};
use infosphere_news::pipeline::{NewsService, ServiceParts};
use infosphere_news::verify::credibility::CredibilityPrior;
use infosphere_news::verify::{
    CredibilitySignal, CredibilityStore, SignalCheck, SignalWeights, TemporalSignal, VerificationEngine,
    VerifyTiming, WeightsSource,
};
use infosphere_news::{AdapterError, Article, Category};

pub const NEWSAPI_JSON: &str = include_str!("../fixtures/newsapi_top_headlines.json");
pub const GNEWS_JSON: &str = include_str!("../fixtures/gnews_top_headlines.json");
pub const NEWSDATA_JSON: &str = include_str!("../fixtures/newsdata_latest.json");
pub const RSS_XML: &str = include_str!("../fixtures/india_top_stories.xml");

/// All four providers in priority order, served from fixtures.
pub fn fixture_adapters() -> Vec<Arc<dyn SourceAdapter>> {
    vec![
        Arc::new(NewsApiAdapter::from_fixture(NEWSAPI_JSON, RateLimitBook::unmetered())),
        Arc::new(GNewsAdapter::from_fixture(GNEWS_JSON, RateLimitBook::unmetered())),
        Arc::new(NewsDataAdapter::from_fixture(NEWSDATA_JSON, RateLimitBook::unmetered())),
        Arc::new(RssAdapter::from_fixture("National Desk", RSS_XML)),
    ]
}

/// Always fails with a transient error.
pub struct Down {
    pub name: &'static str,
    pub calls: AtomicU32,
}

impl Down {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl SourceAdapter for Down {
    async fn fetch(&self, _c: Option<&Category>, _l: usize) -> Result<Vec<Article>, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AdapterError::Unreachable("connection refused".into()))
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Serves one story while `up`, fails otherwise.
pub struct Switch {
    pub up: AtomicBool,
    pub title: &'static str,
}

impl Switch {
    pub fn new(title: &'static str) -> Self {
        Self {
            up: AtomicBool::new(true),
            title,
        }
    }

    pub fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }
}

#[async_trait]
impl SourceAdapter for Switch {
    async fn fetch(&self, _c: Option<&Category>, _l: usize) -> Result<Vec<Article>, AdapterError> {
        if !self.up.load(Ordering::SeqCst) {
            return Err(AdapterError::Unreachable("upstream down".into()));
        }
        let t = Utc::now();
        Ok(vec![Article::new(
            self.title,
            "Body text of the switchable story.",
            "https://switch.example/story",
            "Switch Wire",
            t,
            t,
            None,
        )])
    }

    fn name(&self) -> &str {
        "Switch"
    }
}

/// Never answers before the given delay.
pub struct Slow {
    pub delay: Duration,
}

#[async_trait]
impl SourceAdapter for Slow {
    async fn fetch(&self, _c: Option<&Category>, _l: usize) -> Result<Vec<Article>, AdapterError> {
        tokio::time::sleep(self.delay).await;
        let t = Utc::now();
        Ok(vec![Article::new("Late story", "", "https://slow.example", "Slow", t, t, None)])
    }

    fn name(&self) -> &str {
        "Slow"
    }
}

pub fn quick_orchestrator_cfg() -> OrchestratorConfig {
    OrchestratorConfig {
        adapter_timeout: Duration::from_secs(2),
        retries: 0,
        retry_backoff: Duration::from_millis(10),
        deadline: Duration::from_secs(5),
        max_parallel: None,
    }
}

/// Offline service: given adapters, in-memory stores, and only the signals that need
/// no network (credibility + temporal).
pub fn offline_service(adapters: Vec<Arc<dyn SourceAdapter>>) -> Arc<NewsService> {
    let cache = Arc::new(CacheStore::new(Duration::from_secs(3600)));
    let credibility = Arc::new(CredibilityStore::new(CredibilityPrior::default_seed()));
    let checks: Vec<Arc<dyn SignalCheck>> = vec![
        Arc::new(CredibilitySignal::new(credibility.clone())),
        Arc::new(TemporalSignal::default()),
    ];
    let engine = VerificationEngine::new(
        checks,
        WeightsSource::fixed(SignalWeights::default()),
        VerifyTiming::default(),
    );
    Arc::new(NewsService::from_parts(ServiceParts {
        orchestrator: FetchOrchestrator::new(adapters, cache, quick_orchestrator_cfg()),
        deduplicator: Deduplicator::default(),
        categorizer: Categorizer::default(),
        engine,
        credibility,
        flag_policy: FlaggingPolicy::default(),
        flag_log: FlagLog::in_memory(),
        verify_concurrency: 4,
        default_limit: 50,
    }))
}
