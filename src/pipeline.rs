//! # News service
//! Glue over the pipeline stages: fetch cycle → cache → dedup + categorize (memoized
//! per snapshot) → verification → flagging. The HTTP layer and the background
//! scheduler both talk to this type only.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use crate::article::Article;
use crate::cache::CacheStore;
use crate::categorize::Categorizer;
use crate::config::PipelineConfig;
use crate::dedup::{CrossReference, DedupParams, Deduplicator};
use crate::error::{ConfigError, PipelineError};
use crate::flagging::{FlagLog, FlagStats, FlaggedArticle, FlaggingPolicy};
use crate::ingest::{providers, CycleOutcome, CycleReport, FetchOrchestrator, OrchestratorConfig};
use crate::verify::credibility::CredibilityPrior;
use crate::verify::{CredibilityStore, CredibilityView, TrustLedger, TrustScore, VerificationEngine};

/// Articles requested from each provider per cycle.
pub const FETCH_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServedFrom {
    /// Fetched for this request.
    Fresh,
    /// Cached snapshot inside its TTL.
    Cache,
    /// Expired snapshot served because every provider failed.
    Stale,
}

/// Deduplicated, categorized view of one cache snapshot.
#[derive(Debug, Clone)]
pub struct ProcessedView {
    pub fetched_at: DateTime<Utc>,
    /// Newest first.
    pub articles: Vec<Article>,
    pub provenance: BTreeMap<String, Vec<String>>,
    pub cross_refs: Vec<CrossReference>,
}

impl ProcessedView {
    fn sources_of(&self, article: &Article) -> Vec<String> {
        self.provenance
            .get(&article.id)
            .cloned()
            .unwrap_or_else(|| vec![article.source_name.clone()])
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewsItem {
    #[serde(flatten)]
    pub article: Article,
    pub provenance: Vec<String>,
    pub trust: Option<TrustScore>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewsPage {
    pub served_from: ServedFrom,
    pub fetched_at: DateTime<Utc>,
    pub total: usize,
    pub articles: Vec<NewsItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifiedArticle {
    #[serde(flatten)]
    pub trust: TrustScore,
    pub flagged: bool,
    pub reasons: Vec<String>,
}

/// Ad-hoc verification input; only the title is required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyRequest {
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub source_name: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Most articles accepted by one batch verification call.
pub const MAX_BATCH: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct BatchVerified {
    pub total_verified: usize,
    pub flagged_count: usize,
    pub verified_count: usize,
    /// Same order as the request.
    pub results: Vec<VerifiedArticle>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub name: String,
    pub count: usize,
    /// Share of the articles in the view; labels overlap, so these need not sum to 100.
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryCounts {
    pub served_from: ServedFrom,
    pub total_articles: usize,
    /// Most common first; configured categories with no article are listed with 0.
    pub categories: Vec<CategoryCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlaggedPage {
    pub articles: Vec<FlaggedArticle>,
    pub stats: FlagStats,
}

fn request_article(req: VerifyRequest, now: DateTime<Utc>) -> Result<Article, PipelineError> {
    if req.title.trim().is_empty() {
        return Err(PipelineError::InvalidRequest("title is required".into()));
    }
    Ok(Article::new(
        &req.title,
        req.body.as_deref().unwrap_or_default(),
        req.url.as_deref().unwrap_or_default(),
        req.source_name.as_deref().filter(|s| !s.trim().is_empty()).unwrap_or("Unknown"),
        req.published_at.unwrap_or(now),
        now,
        req.image_url,
    ))
}

/// Everything a [`NewsService`] is assembled from. Tests build this by hand with
/// fixture adapters and stub signals.
pub struct ServiceParts {
    pub orchestrator: FetchOrchestrator,
    pub deduplicator: Deduplicator,
    pub categorizer: Categorizer,
    pub engine: VerificationEngine,
    pub credibility: Arc<CredibilityStore>,
    pub flag_policy: FlaggingPolicy,
    pub flag_log: FlagLog,
    pub verify_concurrency: usize,
    pub default_limit: usize,
}

pub struct NewsService {
    orchestrator: FetchOrchestrator,
    deduplicator: Deduplicator,
    categorizer: Categorizer,
    engine: VerificationEngine,
    credibility: Arc<CredibilityStore>,
    ledger: TrustLedger,
    flag_policy: FlaggingPolicy,
    flag_log: FlagLog,
    verify_concurrency: usize,
    default_limit: usize,

    processed: RwLock<Option<Arc<ProcessedView>>>,
    last_report: RwLock<Option<CycleReport>>,
    /// Single-flight guard for fetch cycles.
    refresh_lock: tokio::sync::Mutex<()>,
}

impl NewsService {
    pub fn from_parts(parts: ServiceParts) -> Self {
        Self {
            orchestrator: parts.orchestrator,
            deduplicator: parts.deduplicator,
            categorizer: parts.categorizer,
            engine: parts.engine,
            credibility: parts.credibility,
            ledger: TrustLedger::default(),
            flag_policy: parts.flag_policy,
            flag_log: parts.flag_log,
            verify_concurrency: parts.verify_concurrency.max(1),
            default_limit: parts.default_limit.max(1),
            processed: RwLock::new(None),
            last_report: RwLock::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Production wiring from environment-derived settings.
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        let cache = Arc::new(match &cfg.cache_path {
            Some(p) => CacheStore::with_persistence(cfg.cache_ttl, p),
            None => CacheStore::new(cfg.cache_ttl),
        });
        let credibility = Arc::new(match &cfg.credibility_path {
            Some(p) => CredibilityStore::with_persistence(CredibilityPrior::default_seed(), p),
            None => CredibilityStore::new(CredibilityPrior::default_seed()),
        });
        let flag_log = match &cfg.flag_log_path {
            Some(p) => FlagLog::open(p),
            None => FlagLog::in_memory(),
        };

        Self::from_parts(ServiceParts {
            orchestrator: FetchOrchestrator::new(
                providers::from_config(cfg),
                cache,
                OrchestratorConfig::from(cfg),
            ),
            deduplicator: Deduplicator::new(DedupParams::from(cfg)),
            categorizer: Categorizer::from_path(cfg.categories_path.clone()),
            engine: VerificationEngine::from_config(cfg, credibility.clone()),
            credibility,
            flag_policy: FlaggingPolicy::new(cfg.flag_threshold),
            flag_log,
            verify_concurrency: cfg.verify_concurrency,
            default_limit: cfg.default_limit,
        })
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        self.orchestrator.cache()
    }

    pub fn default_limit(&self) -> usize {
        self.default_limit
    }

    pub fn last_report(&self) -> Option<CycleReport> {
        self.last_report.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Run one fetch cycle. Concurrent callers queue behind the running cycle.
    pub async fn refresh(&self) -> CycleOutcome {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> CycleOutcome {
        let outcome = self.orchestrator.run_cycle(None, FETCH_LIMIT).await;
        *self.last_report.write().unwrap_or_else(|p| p.into_inner()) = Some(outcome.report().clone());
        outcome
    }

    /// Dedup + categorize the current snapshot, reusing the previous result while the
    /// snapshot is unchanged.
    pub fn processed(&self) -> Option<Arc<ProcessedView>> {
        let entry = self.cache().current()?;
        {
            let guard = self.processed.read().unwrap_or_else(|p| p.into_inner());
            if let Some(view) = guard.as_ref().filter(|v| v.fetched_at == entry.fetched_at) {
                return Some(view.clone());
            }
        }

        let mut outcome = self.deduplicator.run(entry.snapshot.clone());
        self.categorizer.apply(&mut outcome.articles);
        let view = Arc::new(ProcessedView {
            fetched_at: entry.fetched_at,
            articles: outcome.articles,
            provenance: outcome.provenance,
            cross_refs: outcome.cross_refs,
        });
        tracing::debug!(
            target: "cache",
            raw = entry.snapshot.len(),
            kept = view.articles.len(),
            "snapshot processed"
        );
        *self.processed.write().unwrap_or_else(|p| p.into_inner()) = Some(view.clone());
        Some(view)
    }

    /// Processed view plus where it came from, refreshing when the cache is not fresh.
    async fn current_view(&self) -> Result<(Arc<ProcessedView>, ServedFrom), PipelineError> {
        // Also refreshes the cache age gauge.
        let _ = self.cache().age(Utc::now());
        if self.cache().fresh(Utc::now()).is_some() {
            if let Some(view) = self.processed() {
                return Ok((view, ServedFrom::Cache));
            }
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited.
        if self.cache().fresh(Utc::now()).is_some() {
            if let Some(view) = self.processed() {
                return Ok((view, ServedFrom::Cache));
            }
        }

        let served = match self.refresh_locked().await {
            CycleOutcome::Fresh { .. } => ServedFrom::Fresh,
            CycleOutcome::Stale { .. } => ServedFrom::Stale,
            CycleOutcome::Failed { .. } => return Err(PipelineError::TemporarilyUnavailable),
        };
        let view = self.processed().ok_or(PipelineError::TemporarilyUnavailable)?;
        Ok((view, served))
    }

    fn page<'a>(
        &self,
        view: &ProcessedView,
        served_from: ServedFrom,
        picked: impl Iterator<Item = &'a Article>,
        limit: usize,
    ) -> NewsPage {
        let matching: Vec<&Article> = picked.collect();
        let total = matching.len();
        let articles = matching
            .into_iter()
            .take(limit)
            .map(|a| NewsItem {
                article: a.clone(),
                provenance: view.sources_of(a),
                trust: self.ledger.latest(&a.id),
            })
            .collect();
        NewsPage {
            served_from,
            fetched_at: view.fetched_at,
            total,
            articles,
        }
    }

    /// Deduplicated articles, newest first, optionally narrowed to one category label.
    pub async fn latest(&self, category: Option<&str>, limit: Option<usize>) -> Result<NewsPage, PipelineError> {
        let limit = self.clamp_limit(limit)?;
        let (view, served) = self.current_view().await?;
        let category = category.map(str::trim).filter(|c| !c.is_empty());
        let picked = view
            .articles
            .iter()
            .filter(|a| category.map_or(true, |c| a.categories.iter().any(|x| x.matches(c))));
        Ok(self.page(&view, served, picked, limit))
    }

    /// Newest articles regardless of category.
    pub async fn breaking(&self, limit: Option<usize>) -> Result<NewsPage, PipelineError> {
        self.latest(None, limit).await
    }

    /// Case-insensitive substring search over title and body.
    pub async fn search(&self, query: &str, limit: Option<usize>) -> Result<NewsPage, PipelineError> {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return Err(PipelineError::InvalidRequest("query must not be empty".into()));
        }
        let limit = self.clamp_limit(limit)?;
        let (view, served) = self.current_view().await?;
        let picked = view
            .articles
            .iter()
            .filter(|a| a.title.to_lowercase().contains(&q) || a.body.to_lowercase().contains(&q));
        Ok(self.page(&view, served, picked, limit))
    }

    fn clamp_limit(&self, limit: Option<usize>) -> Result<usize, PipelineError> {
        match limit {
            Some(0) => Err(PipelineError::InvalidRequest("limit must be positive".into())),
            Some(n) => Ok(n.min(500)),
            None => Ok(self.default_limit),
        }
    }

    /// Verify one fetched article: record its score, feed the credibility of every
    /// outlet that reported it and apply the flag policy.
    async fn verify_article(&self, article: &Article, provenance: &[String]) -> VerifiedArticle {
        let trust = self.engine.verify(article).await;

        let sources: Vec<&str> = if provenance.is_empty() {
            vec![article.source_name.as_str()]
        } else {
            provenance.iter().map(String::as_str).collect()
        };
        let weight = 1.0 / sources.len() as f32;
        for s in sources {
            self.credibility.record(s, trust.score, weight);
        }

        self.settle(article, trust)
    }

    /// Ledger + flag log. Credibility is only ever fed from fetched articles, never
    /// from caller-supplied ones.
    fn settle(&self, article: &Article, trust: TrustScore) -> VerifiedArticle {
        self.ledger.record(trust.clone());
        let decision = self.flag_policy.evaluate(&trust);
        self.flag_log.record(article, &trust, &decision);
        VerifiedArticle {
            trust,
            flagged: decision.flagged,
            reasons: decision.reasons,
        }
    }

    /// Verify every article of the current view that has no score yet.
    /// Returns how many were verified.
    pub async fn verify_pending(&self) -> usize {
        let Some(view) = self.processed() else {
            return 0;
        };
        let pending: Vec<&Article> = view
            .articles
            .iter()
            .filter(|a| !self.ledger.contains(&a.id))
            .collect();
        if pending.is_empty() {
            return 0;
        }

        let jobs: Vec<_> = pending
            .into_iter()
            .map(|a| {
                let sources = view.sources_of(a);
                async move { self.verify_article(a, &sources).await }
            })
            .collect();
        let done = stream::iter(jobs)
            .buffer_unordered(self.verify_concurrency)
            .count()
            .await;
        self.credibility.flush();
        tracing::info!(target: "verify", verified = done, "pending articles verified");
        done
    }

    /// Score a caller-supplied article. Read-only for source credibility.
    pub async fn verify_request(&self, req: VerifyRequest) -> Result<VerifiedArticle, PipelineError> {
        let article = request_article(req, Utc::now())?;
        let trust = self.engine.verify(&article).await;
        Ok(self.settle(&article, trust))
    }

    /// Score up to [`MAX_BATCH`] caller-supplied articles with bounded concurrency.
    /// Any entry without a title rejects the whole batch before anything is scored.
    pub async fn verify_batch(&self, reqs: Vec<VerifyRequest>) -> Result<BatchVerified, PipelineError> {
        if reqs.is_empty() {
            return Err(PipelineError::InvalidRequest("batch is empty".into()));
        }
        if reqs.len() > MAX_BATCH {
            return Err(PipelineError::InvalidRequest(format!(
                "batch holds {} articles, at most {MAX_BATCH} allowed",
                reqs.len()
            )));
        }
        let now = Utc::now();
        let articles = reqs
            .into_iter()
            .enumerate()
            .map(|(i, r)| {
                request_article(r, now)
                    .map_err(|_| PipelineError::InvalidRequest(format!("articles[{i}]: title is required")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let jobs: Vec<_> = articles
            .iter()
            .map(|a| async move {
                let trust = self.engine.verify(a).await;
                self.settle(a, trust)
            })
            .collect();
        let results: Vec<VerifiedArticle> = stream::iter(jobs).buffered(self.verify_concurrency).collect().await;

        let flagged_count = results.iter().filter(|r| r.flagged).count();
        tracing::info!(target: "verify", total = results.len(), flagged = flagged_count, "batch verified");
        Ok(BatchVerified {
            total_verified: results.len(),
            flagged_count,
            verified_count: results.len() - flagged_count,
            results,
        })
    }

    /// Article count per category label over the current view.
    pub async fn category_counts(&self) -> Result<CategoryCounts, PipelineError> {
        let (view, served_from) = self.current_view().await?;
        let mut counts: BTreeMap<String, usize> =
            self.categorizer.categories().into_iter().map(|c| (c, 0)).collect();
        for a in &view.articles {
            for c in &a.categories {
                *counts.entry(c.as_str().to_string()).or_default() += 1;
            }
        }

        let total = view.articles.len();
        let mut categories: Vec<CategoryCount> = counts
            .into_iter()
            .map(|(name, count)| CategoryCount {
                name,
                count,
                percentage: if total == 0 {
                    0.0
                } else {
                    (count as f64 * 1000.0 / total as f64).round() / 10.0
                },
            })
            .collect();
        categories.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        Ok(CategoryCounts {
            served_from,
            total_articles: total,
            categories,
        })
    }

    /// Refresh, then verify whatever is new. Used by the background scheduler.
    pub async fn refresh_and_verify(&self) -> CycleOutcome {
        let outcome = self.refresh().await;
        if outcome.entry().is_some() {
            self.verify_pending().await;
        }
        outcome
    }

    pub fn flagged(&self, limit: Option<usize>) -> Result<FlaggedPage, PipelineError> {
        let limit = self.clamp_limit(limit)?;
        Ok(FlaggedPage {
            articles: self.flag_log.active(limit),
            stats: self.flag_log.stats(),
        })
    }

    pub fn trust(&self, article_id: &str) -> Option<TrustScore> {
        self.ledger.latest(article_id)
    }

    pub fn credibility(&self, source: &str) -> CredibilityView {
        self.credibility.view(source, None)
    }

    /// Reload keyword rules and drop the memoized view so new labels apply.
    pub fn reload_categories(&self) -> Result<usize, ConfigError> {
        let n = self.categorizer.reload()?;
        *self.processed.write().unwrap_or_else(|p| p.into_inner()) = None;
        Ok(n)
    }
}
