//! # Verification Engine
//! Five independent signals per article, run concurrently, combined into a composite
//! trust score.
//!
//! - Each signal returns `Result<SignalOutcome, ScrapeError>`; `Err` (or still pending
//!   at the deadline) means "excluded", and the composite is renormalized over the
//!   signals that did execute.
//! - Textual (everything but the image) and media (image only) variants use the same
//!   arithmetic.
//! - With nothing executed the composite is the neutral 0.5.

pub mod credibility;
pub mod fact_check;
pub mod image;
pub mod official;
pub mod temporal;
pub mod weights;

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::article::Article;
use crate::config::PipelineConfig;
use crate::error::ScrapeError;

pub use credibility::{CredibilitySignal, CredibilityStore, CredibilityView};
pub use fact_check::{FactCheckIndex, FactCheckSignal, HttpFactCheckIndex, Verdict};
pub use image::{HttpImageInspector, ImageInspector, ImageMeta, ImageSignal};
pub use official::{HttpPageFetcher, OfficialSourceCheck, PageFetcher};
pub use temporal::TemporalSignal;
pub use weights::{renormalize, SignalWeights, WeightsSource};

/// Neutral composite when no signal could run.
pub const NEUTRAL_SCORE: f32 = 0.5;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("news_verifications_total", "Articles verified.");
        describe_counter!("news_signal_excluded_total", "Signals excluded from a composite, by signal.");
        describe_histogram!("news_verify_duration_ms", "Wall time of one article verification.");
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    OfficialSource,
    FactCheck,
    SourceCredibility,
    ImageAuthenticity,
    Temporal,
}

impl SignalKind {
    pub const ALL: [SignalKind; 5] = [
        SignalKind::OfficialSource,
        SignalKind::FactCheck,
        SignalKind::SourceCredibility,
        SignalKind::ImageAuthenticity,
        SignalKind::Temporal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::OfficialSource => "official_source",
            SignalKind::FactCheck => "fact_check",
            SignalKind::SourceCredibility => "source_credibility",
            SignalKind::ImageAuthenticity => "image_authenticity",
            SignalKind::Temporal => "temporal",
        }
    }

    /// Media signals describe the attached picture, not the claim.
    pub fn is_media(self) -> bool {
        matches!(self, SignalKind::ImageAuthenticity)
    }

    /// Human-readable flag reason when this signal scores low with confidence.
    pub fn failure_reason(self) -> &'static str {
        match self {
            SignalKind::OfficialSource => "No corroborating official source found",
            SignalKind::FactCheck => "Fact-checkers rate this claim false or misleading",
            SignalKind::SourceCredibility => "Source has a poor credibility history",
            SignalKind::ImageAuthenticity => {
                "Image matches known stock photography or has inconsistent capture metadata"
            }
            SignalKind::Temporal => "Publication date is implausible for the story",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one signal check produced, before weighting.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalOutcome {
    pub score: f32,
    pub confidence: f32,
    pub detail: String,
}

impl SignalOutcome {
    pub fn new(score: f32, confidence: f32, detail: impl Into<String>) -> Self {
        Self {
            score: score.clamp(0.0, 1.0),
            confidence: confidence.clamp(0.0, 1.0),
            detail: detail.into(),
        }
    }
}

/// One executed signal inside a [`TrustScore`]; `weight` is the renormalized weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationSignal {
    pub name: SignalKind,
    pub score: f32,
    pub weight: f32,
    pub confidence: f32,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedSignal {
    pub name: SignalKind,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    High,
    Medium,
    Low,
    VeryLow,
}

impl TrustLevel {
    pub fn from_score(score: f32) -> Self {
        if score >= 0.80 {
            TrustLevel::High
        } else if score >= 0.65 {
            TrustLevel::Medium
        } else if score >= 0.50 {
            TrustLevel::Low
        } else {
            TrustLevel::VeryLow
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustScore {
    pub article_id: String,
    pub score: f32,
    pub trust_level: TrustLevel,
    pub signals: Vec<VerificationSignal>,
    pub excluded: Vec<ExcludedSignal>,
    /// Composite over the non-media signals, if any executed.
    pub textual_score: Option<f32>,
    /// Composite over the media signals, if any executed.
    pub media_score: Option<f32>,
    pub computed_at: DateTime<Utc>,
}

impl TrustScore {
    /// Combine executed signal outcomes into a score. Pure; weights are renormalized
    /// over `outcomes`.
    pub fn combine(
        article_id: &str,
        weights: &SignalWeights,
        outcomes: Vec<(SignalKind, SignalOutcome)>,
        excluded: Vec<ExcludedSignal>,
        computed_at: DateTime<Utc>,
    ) -> Self {
        let kinds: Vec<SignalKind> = outcomes.iter().map(|(k, _)| *k).collect();
        let normalized = renormalize(weights, &kinds);
        let signals: Vec<VerificationSignal> = outcomes
            .into_iter()
            .zip(normalized)
            .map(|((kind, o), (_, weight))| VerificationSignal {
                name: kind,
                score: o.score,
                weight,
                confidence: o.confidence,
                detail: o.detail,
            })
            .collect();

        let score = weights::weighted_score(signals.iter().map(|s| (s.weight, s.score)))
            .unwrap_or(NEUTRAL_SCORE);
        let textual_score = subset_score(weights, &signals, |k| !k.is_media());
        let media_score = subset_score(weights, &signals, SignalKind::is_media);

        Self {
            article_id: article_id.to_string(),
            score,
            trust_level: TrustLevel::from_score(score),
            signals,
            excluded,
            textual_score,
            media_score,
            computed_at,
        }
    }

    pub fn signal(&self, kind: SignalKind) -> Option<&VerificationSignal> {
        self.signals.iter().find(|s| s.name == kind)
    }
}

fn subset_score(
    weights: &SignalWeights,
    signals: &[VerificationSignal],
    keep: impl Fn(SignalKind) -> bool,
) -> Option<f32> {
    let picked: Vec<&VerificationSignal> = signals.iter().filter(|s| keep(s.name)).collect();
    let kinds: Vec<SignalKind> = picked.iter().map(|s| s.name).collect();
    let normalized = renormalize(weights, &kinds);
    weights::weighted_score(picked.iter().zip(normalized).map(|(s, (_, w))| (w, s.score)))
}

/// One independent check. `Err` excludes the signal from the composite.
#[async_trait]
pub trait SignalCheck: Send + Sync {
    fn kind(&self) -> SignalKind;

    async fn check(&self, article: &Article, now: DateTime<Utc>) -> Result<SignalOutcome, ScrapeError>;
}

#[derive(Debug, Clone, Copy)]
pub struct VerifyTiming {
    /// Per-signal budget.
    pub signal_timeout: Duration,
    /// Whole-pass budget; pending signals are excluded when it expires.
    pub deadline: Duration,
}

impl Default for VerifyTiming {
    fn default() -> Self {
        Self {
            signal_timeout: Duration::from_secs(10),
            deadline: Duration::from_secs(15),
        }
    }
}

pub struct VerificationEngine {
    checks: Vec<Arc<dyn SignalCheck>>,
    weights: WeightsSource,
    timing: VerifyTiming,
}

impl VerificationEngine {
    pub fn new(checks: Vec<Arc<dyn SignalCheck>>, weights: WeightsSource, timing: VerifyTiming) -> Self {
        ensure_metrics_described();
        Self {
            checks,
            weights,
            timing,
        }
    }

    /// Production wiring: HTTP-backed official/fact-check/image checks.
    pub fn from_config(cfg: &PipelineConfig, credibility: Arc<CredibilityStore>) -> Self {
        let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpPageFetcher::new(cfg.signal_timeout));
        let checks: Vec<Arc<dyn SignalCheck>> = vec![
            Arc::new(OfficialSourceCheck::with_default_outlets(fetcher.clone())),
            Arc::new(FactCheckSignal::new(Arc::new(HttpFactCheckIndex::with_default_sites(
                fetcher,
            )))),
            Arc::new(CredibilitySignal::new(credibility)),
            Arc::new(ImageSignal::new(Arc::new(HttpImageInspector::new(cfg.signal_timeout)))),
            Arc::new(TemporalSignal::default()),
        ];
        Self::new(
            checks,
            WeightsSource::from_path(cfg.verification_path.clone()),
            VerifyTiming {
                signal_timeout: cfg.signal_timeout,
                deadline: cfg.verify_deadline,
            },
        )
    }

    pub fn weights(&self) -> SignalWeights {
        self.weights.current()
    }

    pub async fn verify(&self, article: &Article) -> TrustScore {
        let t0 = Instant::now();
        let now = Utc::now();
        let start = tokio::time::Instant::now();
        let per_signal = (start + self.timing.signal_timeout).min(start + self.timing.deadline);

        let runs = self.checks.iter().map(|check| async move {
            let res = match tokio::time::timeout_at(per_signal, check.check(article, now)).await {
                Ok(r) => r,
                Err(_) => Err(ScrapeError::Timeout),
            };
            (check.kind(), res)
        });
        let results = join_all(runs).await;

        let mut outcomes = Vec::with_capacity(results.len());
        let mut excluded = Vec::new();
        for (kind, res) in results {
            match res {
                Ok(o) => outcomes.push((kind, o)),
                Err(e) => {
                    tracing::debug!(
                        target: "verify",
                        article_id = %article.id,
                        signal = %kind,
                        kind = e.kind(),
                        error = %e,
                        "signal excluded"
                    );
                    counter!("news_signal_excluded_total", "signal" => kind.as_str()).increment(1);
                    excluded.push(ExcludedSignal {
                        name: kind,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let score = TrustScore::combine(&article.id, &self.weights.current(), outcomes, excluded, now);

        counter!("news_verifications_total").increment(1);
        histogram!("news_verify_duration_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        tracing::info!(
            target: "verify",
            article_id = %article.id,
            score = score.score,
            level = ?score.trust_level,
            executed = score.signals.len(),
            "article verified"
        );
        score
    }
}

/// Latest trust score per article plus a capped history. Bounded in both directions:
/// `per_article` scores per id, `max_articles` ids overall (least recently verified
/// evicted first).
#[derive(Debug)]
pub struct TrustLedger {
    inner: RwLock<LedgerState>,
    per_article: usize,
    max_articles: usize,
}

#[derive(Debug, Default)]
struct LedgerState {
    entries: HashMap<String, LedgerEntry>,
    tick: u64,
}

#[derive(Debug)]
struct LedgerEntry {
    history: VecDeque<TrustScore>,
    touched: u64,
}

/// Several refresh cycles worth of deduplicated articles.
pub const DEFAULT_LEDGER_ARTICLES: usize = 5_000;

impl TrustLedger {
    pub fn new(per_article: usize) -> Self {
        Self::with_capacity(per_article, DEFAULT_LEDGER_ARTICLES)
    }

    pub fn with_capacity(per_article: usize, max_articles: usize) -> Self {
        Self {
            inner: RwLock::new(LedgerState::default()),
            per_article: per_article.max(1),
            max_articles: max_articles.max(1),
        }
    }

    pub fn record(&self, score: TrustScore) {
        let mut guard = self.inner.write().unwrap_or_else(|p| p.into_inner());
        let state = &mut *guard;
        state.tick += 1;
        let tick = state.tick;

        if !state.entries.contains_key(&score.article_id) && state.entries.len() >= self.max_articles {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, e)| e.touched)
                .map(|(id, _)| id.clone());
            if let Some(id) = oldest {
                state.entries.remove(&id);
                tracing::debug!(target: "verify", article_id = %id, "trust ledger evicted article");
            }
        }

        let entry = state
            .entries
            .entry(score.article_id.clone())
            .or_insert_with(|| LedgerEntry {
                history: VecDeque::new(),
                touched: tick,
            });
        entry.touched = tick;
        if entry.history.len() == self.per_article {
            entry.history.pop_front();
        }
        entry.history.push_back(score);
    }

    pub fn latest(&self, article_id: &str) -> Option<TrustScore> {
        let guard = self.inner.read().unwrap_or_else(|p| p.into_inner());
        guard.entries.get(article_id).and_then(|e| e.history.back().cloned())
    }

    /// Oldest first.
    pub fn history(&self, article_id: &str) -> Vec<TrustScore> {
        let guard = self.inner.read().unwrap_or_else(|p| p.into_inner());
        guard
            .entries
            .get(article_id)
            .map(|e| e.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, article_id: &str) -> bool {
        let guard = self.inner.read().unwrap_or_else(|p| p.into_inner());
        guard.entries.contains_key(article_id)
    }

    /// Number of articles tracked.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|p| p.into_inner()).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TrustLedger {
    fn default() -> Self {
        Self::new(20)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(score: f32) -> SignalOutcome {
        SignalOutcome::new(score, 0.8, "test")
    }

    #[test]
    fn levels_follow_thresholds() {
        assert_eq!(TrustLevel::from_score(0.80), TrustLevel::High);
        assert_eq!(TrustLevel::from_score(0.79), TrustLevel::Medium);
        assert_eq!(TrustLevel::from_score(0.65), TrustLevel::Medium);
        assert_eq!(TrustLevel::from_score(0.50), TrustLevel::Low);
        assert_eq!(TrustLevel::from_score(0.49), TrustLevel::VeryLow);
    }

    #[test]
    fn no_signals_is_neutral() {
        let s = TrustScore::combine("a", &SignalWeights::default(), vec![], vec![], Utc::now());
        assert_eq!(s.score, NEUTRAL_SCORE);
        assert_eq!(s.textual_score, None);
        assert_eq!(s.media_score, None);
    }

    #[test]
    fn textual_and_media_variants_are_separate() {
        let s = TrustScore::combine(
            "a",
            &SignalWeights::default(),
            vec![
                (SignalKind::OfficialSource, outcome(1.0)),
                (SignalKind::Temporal, outcome(0.5)),
                (SignalKind::ImageAuthenticity, outcome(0.2)),
            ],
            vec![],
            Utc::now(),
        );
        let textual = s.textual_score.unwrap();
        assert!((textual - (0.35 * 1.0 + 0.10 * 0.5) / 0.45).abs() < 1e-5);
        assert!((s.media_score.unwrap() - 0.2).abs() < 1e-6);
        let weight_sum: f32 = s.signals.iter().map(|x| x.weight).sum();
        assert!((weight_sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn ledger_keeps_capped_history() {
        let ledger = TrustLedger::new(2);
        for v in [0.1, 0.2, 0.3] {
            let mut s = TrustScore::combine("x", &SignalWeights::default(), vec![], vec![], Utc::now());
            s.score = v;
            ledger.record(s);
        }
        let h = ledger.history("x");
        assert_eq!(h.len(), 2);
        assert!((ledger.latest("x").unwrap().score - 0.3).abs() < 1e-6);
        assert!(ledger.latest("y").is_none());
    }

    #[test]
    fn ledger_evicts_least_recently_verified_article() {
        let ledger = TrustLedger::with_capacity(2, 3);
        let score = |id: &str| TrustScore::combine(id, &SignalWeights::default(), vec![], vec![], Utc::now());
        for id in ["a", "b", "c"] {
            ledger.record(score(id));
        }
        // Re-verifying "a" makes "b" the oldest.
        ledger.record(score("a"));
        ledger.record(score("d"));

        assert_eq!(ledger.len(), 3);
        assert!(!ledger.contains("b"));
        for id in ["a", "c", "d"] {
            assert!(ledger.contains(id), "{id} kept");
        }

        for i in 0..100 {
            ledger.record(score(&format!("bulk-{i}")));
        }
        assert_eq!(ledger.len(), 3, "never grows past the cap");
    }
}
