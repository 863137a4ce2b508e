//! # Source credibility
//! Per-outlet reliability: a tiered prior blended with a rolling window of past
//! composite scores.
//!
//! score = (prior·K + Σ wᵢ·sᵢ) / (K + Σ wᵢ), K = 5, over the last 50 samples.
//! Sample weights are `1/k` when a story was carried by `k` outlets, so a claim
//! echoed by many sources does not lift each of them at full strength.
//!
//! Lookup order for the prior: aliases → exact → whole-word substring → URL host →
//! default (0.70 over HTTPS, 0.50 otherwise).

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{SignalCheck, SignalKind, SignalOutcome};
use crate::article::Article;
use crate::error::ScrapeError;

/// Pseudo-count of the prior.
const PRIOR_STRENGTH: f32 = 5.0;
const DEFAULT_WINDOW: usize = 50;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CredibilityPrior {
    #[serde(default = "default_https")]
    pub default_https: f32,
    #[serde(default = "default_insecure")]
    pub default_insecure: f32,
    /// Canonical (normalized) source name → prior score.
    #[serde(default)]
    pub weights: HashMap<String, f32>,
    /// Alternative spelling → canonical name.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

fn default_https() -> f32 {
    0.70
}

fn default_insecure() -> f32 {
    0.50
}

impl CredibilityPrior {
    /// Known prior for `source` (and optionally its URL), if any tier lists it.
    pub fn lookup(&self, source: &str, url: Option<&str>) -> Option<f32> {
        let s = normalize(source);

        if let Some(canon) = self.aliases.get(&s) {
            if let Some(&w) = self.weights.get(&normalize(canon)) {
                return Some(w.clamp(0.0, 1.0));
            }
        }
        if let Some(&w) = self.weights.get(&s) {
            return Some(w.clamp(0.0, 1.0));
        }

        let padded = format!(" {s} ");
        let mut best: Option<(&str, f32)> = None;
        for (k, &w) in &self.weights {
            if padded.contains(&format!(" {k} ")) && best.map_or(true, |(bk, _)| k.len() > bk.len()) {
                best = Some((k.as_str(), w));
            }
        }
        if let Some((_, w)) = best {
            return Some(w.clamp(0.0, 1.0));
        }

        let host = url.and_then(host_of)?;
        self.weights
            .iter()
            .map(|(k, w)| (k.replace(' ', ""), *w))
            .filter(|(k, _)| k.len() >= 5 && host.contains(k.as_str()))
            .max_by_key(|(k, _)| k.len())
            .map(|(_, w)| w.clamp(0.0, 1.0))
    }

    /// Prior for any source; unknown ones get the HTTPS-dependent default.
    pub fn prior_for(&self, source: &str, url: Option<&str>) -> (f32, bool) {
        match self.lookup(source, url) {
            Some(w) => (w, true),
            None => {
                let secure = url.map_or(true, |u| u.trim().to_ascii_lowercase().starts_with("https://"));
                let w = if secure { self.default_https } else { self.default_insecure };
                (w.clamp(0.0, 1.0), false)
            }
        }
    }

    /// Built-in tiers for Indian and international outlets.
    pub fn default_seed() -> Self {
        let mut weights = HashMap::new();
        let mut aliases = HashMap::new();

        // Highly trusted.
        for k in [
            "pti", "ani", "reuters", "associated press", "bbc", "the hindu", "indian express",
            "times of india", "hindustan times", "ndtv", "the wire", "scroll in", "the quint",
        ] {
            weights.insert(k.to_string(), 0.92);
        }
        // Generally reliable.
        for k in [
            "india today", "news18", "firstpost", "livemint", "business standard", "economic times",
            "moneycontrol",
        ] {
            weights.insert(k.to_string(), 0.80);
        }
        // Credibility concerns.
        for k in ["opindia", "postcard news", "tfipost"] {
            weights.insert(k.to_string(), 0.35);
        }

        for (a, c) in [
            ("press trust of india", "pti"),
            ("asian news international", "ani"),
            ("ap", "associated press"),
            ("toi", "times of india"),
            ("ht", "hindustan times"),
            ("thehindu", "the hindu"),
            ("the indian express", "indian express"),
            ("indianexpress", "indian express"),
            ("mint", "livemint"),
            ("et", "economic times"),
            ("the economic times", "economic times"),
            ("business_standard", "business standard"),
            ("thequint", "the quint"),
            ("scroll", "scroll in"),
        ] {
            aliases.insert(a.to_string(), c.to_string());
        }

        Self {
            default_https: default_https(),
            default_insecure: default_insecure(),
            weights,
            aliases,
        }
    }
}

impl Default for CredibilityPrior {
    fn default() -> Self {
        Self::default_seed()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Sample {
    score: f32,
    weight: f32,
    at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Persisted {
    sources: HashMap<String, VecDeque<Sample>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CredibilityView {
    pub source: String,
    pub score: f32,
    pub confidence: f32,
    pub samples: usize,
    pub prior: f32,
    /// Prior came from a curated tier rather than the default.
    pub known: bool,
}

#[derive(Debug)]
pub struct CredibilityStore {
    prior: CredibilityPrior,
    window: usize,
    state: RwLock<HashMap<String, VecDeque<Sample>>>,
    path: Option<PathBuf>,
}

impl CredibilityStore {
    pub fn new(prior: CredibilityPrior) -> Self {
        Self {
            prior,
            window: DEFAULT_WINDOW,
            state: RwLock::new(HashMap::new()),
            path: None,
        }
    }

    /// Store backed by a JSON file; existing history is loaded, a broken file is ignored.
    pub fn with_persistence(prior: CredibilityPrior, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let loaded = match fs::read_to_string(&path) {
            Ok(s) => match serde_json::from_str::<Persisted>(&s) {
                Ok(p) => p.sources,
                Err(e) => {
                    tracing::warn!(target: "verify", error = %e, "credibility history unreadable, starting empty");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                tracing::warn!(target: "verify", error = %e, "credibility history unreadable, starting empty");
                HashMap::new()
            }
        };
        Self {
            prior,
            window: DEFAULT_WINDOW,
            state: RwLock::new(loaded),
            path: Some(path),
        }
    }

    pub fn prior(&self) -> &CredibilityPrior {
        &self.prior
    }

    pub fn view(&self, source: &str, url: Option<&str>) -> CredibilityView {
        let (prior, known) = self.prior.prior_for(source, url);
        let key = normalize(source);
        let guard = self.state.read().unwrap_or_else(|p| p.into_inner());
        let (num, den, n) = guard
            .get(&key)
            .map(|samples| {
                samples.iter().fold((0.0f32, 0.0f32, 0usize), |(num, den, n), s| {
                    (num + s.weight * s.score, den + s.weight, n + 1)
                })
            })
            .unwrap_or((0.0, 0.0, 0));

        let score = ((prior * PRIOR_STRENGTH + num) / (PRIOR_STRENGTH + den)).clamp(0.0, 1.0);
        let mut confidence = 0.5 + 0.5 * n as f32 / (n as f32 + PRIOR_STRENGTH);
        if known {
            confidence = confidence.max(0.7);
        }
        CredibilityView {
            source: source.trim().to_string(),
            score,
            confidence,
            samples: n,
            prior,
            known,
        }
    }

    /// Add one composite score for `source` with weight in (0, 1].
    pub fn record(&self, source: &str, score: f32, weight: f32) {
        if !score.is_finite() || !weight.is_finite() || weight <= 0.0 {
            return;
        }
        let key = normalize(source);
        if key.is_empty() {
            return;
        }
        let mut guard = self.state.write().unwrap_or_else(|p| p.into_inner());
        let samples = guard.entry(key).or_default();
        if samples.len() == self.window {
            samples.pop_front();
        }
        samples.push_back(Sample {
            score: score.clamp(0.0, 1.0),
            weight: weight.min(1.0),
            at: Utc::now(),
        });
    }

    /// Write history to disk (no-op without a path).
    pub fn flush(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let snapshot = {
            let guard = self.state.read().unwrap_or_else(|p| p.into_inner());
            Persisted {
                sources: guard.clone(),
            }
        };
        if let Err(e) = write_atomic(path, &snapshot) {
            tracing::warn!(target: "verify", error = %e, "credibility history write failed");
        }
    }
}

fn write_atomic(path: &Path, data: &Persisted) -> io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_vec_pretty(data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut f = fs::File::create(&tmp)?;
    f.write_all(&json)?;
    f.sync_all()?;
    fs::rename(tmp, path)
}

fn host_of(url: &str) -> Option<String> {
    reqwest::Url::parse(url.trim())
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

/// Lowercase, separators to spaces, collapsed.
fn normalize(s: &str) -> String {
    let mut out = s.trim().to_lowercase();
    for ch in ['—', '–', '-', '_', '/', '\\', '.', ',', '\'', '’'] {
        out = out.replace(ch, " ");
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub struct CredibilitySignal {
    store: Arc<CredibilityStore>,
}

impl CredibilitySignal {
    pub fn new(store: Arc<CredibilityStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SignalCheck for CredibilitySignal {
    fn kind(&self) -> SignalKind {
        SignalKind::SourceCredibility
    }

    async fn check(&self, article: &Article, _now: DateTime<Utc>) -> Result<SignalOutcome, ScrapeError> {
        let v = self.store.view(&article.source_name, Some(&article.url));
        Ok(SignalOutcome::new(
            v.score,
            v.confidence,
            format!(
                "Credibility {:.2} from {} verifications (prior {:.2})",
                v.score, v.samples, v.prior
            ),
        ))
    }
}
