use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::official::PageFetcher;
use super::{SignalCheck, SignalKind, SignalOutcome};
use crate::article::{clean_text, normalize_title, Article};
use crate::error::ScrapeError;

/// Minimum Sørensen–Dice similarity between the claim and a fact-check headline.
const HEADLINE_MATCH: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    True,
    False,
    Misleading,
    Unrated,
}

impl Verdict {
    /// Read the verdict off a fact-check headline or rating label.
    pub fn from_label(label: &str) -> Self {
        let padded = format!(" {} ", normalize_title(label));
        let has = |words: &[&str]| words.iter().any(|w| padded.contains(&format!(" {w} ")));
        if has(&["false", "fake", "debunked", "hoax", "fabricated"]) {
            Verdict::False
        } else if has(&["misleading", "misrepresented", "edited", "out of context", "partly false"]) {
            Verdict::Misleading
        } else if has(&["true", "verified", "correct", "accurate"]) {
            Verdict::True
        } else {
            Verdict::Unrated
        }
    }

    fn outcome(self, site: &str) -> SignalOutcome {
        match self {
            Verdict::True => SignalOutcome::new(0.90, 0.8, format!("Rated true by {site}")),
            Verdict::False => SignalOutcome::new(0.05, 0.9, format!("Rated false by {site}")),
            Verdict::Misleading => SignalOutcome::new(0.25, 0.8, format!("Rated misleading by {site}")),
            Verdict::Unrated => SignalOutcome::new(0.5, 0.3, format!("Listed by {site} without a rating")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FactCheckHit {
    pub site: String,
    pub headline: String,
    pub verdict: Verdict,
}

/// Lookup of a claim in an independent fact-checking index.
/// `Ok(None)` means the index answered but has no entry.
#[async_trait]
pub trait FactCheckIndex: Send + Sync {
    async fn lookup(&self, claim: &str) -> Result<Option<FactCheckHit>, ScrapeError>;
}

/// Searches fact-checking sites and matches result headlines against the claim.
pub struct HttpFactCheckIndex {
    fetcher: Arc<dyn PageFetcher>,
    /// Site roots; searched with `?s=<claim>`.
    sites: Vec<String>,
}

impl HttpFactCheckIndex {
    pub fn new(fetcher: Arc<dyn PageFetcher>, sites: Vec<String>) -> Self {
        Self { fetcher, sites }
    }

    pub fn with_default_sites(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self::new(
            fetcher,
            ["https://www.altnews.in/", "https://www.boomlive.in/", "https://factly.in/"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }

    fn search_url(site: &str, claim: &str) -> Option<String> {
        let q: String = claim.chars().take(80).collect();
        reqwest::Url::parse_with_params(site, &[("s", q.as_str())])
            .ok()
            .map(|u| u.to_string())
    }
}

/// Headings on a results page.
fn headlines(page: &str) -> Vec<String> {
    static RE_H: OnceCell<Regex> = OnceCell::new();
    let re = RE_H.get_or_init(|| Regex::new(r"(?is)<h[1-4][^>]*>(.*?)</h[1-4]>").expect("heading regex"));
    re.captures_iter(page)
        .filter_map(|c| c.get(1))
        .map(|m| clean_text(m.as_str()))
        .filter(|h| !h.is_empty())
        .collect()
}

/// Best matching headline on a page, if any clears the similarity bar.
pub fn best_match(claim: &str, page: &str) -> Option<(String, f64)> {
    let claim_norm = normalize_title(claim);
    headlines(page)
        .into_iter()
        .map(|h| {
            let sim = strsim::sorensen_dice(&claim_norm, &normalize_title(&h));
            (h, sim)
        })
        .filter(|(_, sim)| *sim >= HEADLINE_MATCH)
        .max_by(|a, b| a.1.total_cmp(&b.1))
}

#[async_trait]
impl FactCheckIndex for HttpFactCheckIndex {
    async fn lookup(&self, claim: &str) -> Result<Option<FactCheckHit>, ScrapeError> {
        let queries = self
            .sites
            .iter()
            .filter_map(|site| Self::search_url(site, claim).map(|u| (site.as_str(), u)));
        let pages = join_all(queries.map(|(site, url)| async move {
            (site, self.fetcher.fetch_text(&url).await)
        }))
        .await;

        let mut best: Option<(FactCheckHit, f64)> = None;
        let mut answered = false;
        let mut first_err = None;
        for (site, page) in pages {
            match page {
                Ok(html) => {
                    answered = true;
                    if let Some((headline, sim)) = best_match(claim, &html) {
                        if best.as_ref().map_or(true, |(_, s)| sim > *s) {
                            let verdict = Verdict::from_label(&headline);
                            best = Some((
                                FactCheckHit {
                                    site: site.to_string(),
                                    headline,
                                    verdict,
                                },
                                sim,
                            ));
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!(target: "verify", site, error = %e, "fact-check lookup failed");
                    first_err.get_or_insert(e);
                }
            }
        }
        match (answered, first_err) {
            (false, Some(e)) => Err(e),
            _ => Ok(best.map(|(hit, _)| hit)),
        }
    }
}

pub struct FactCheckSignal {
    index: Arc<dyn FactCheckIndex>,
}

impl FactCheckSignal {
    pub fn new(index: Arc<dyn FactCheckIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl SignalCheck for FactCheckSignal {
    fn kind(&self) -> SignalKind {
        SignalKind::FactCheck
    }

    async fn check(&self, article: &Article, _now: DateTime<Utc>) -> Result<SignalOutcome, ScrapeError> {
        match self.index.lookup(&article.title).await? {
            Some(hit) => Ok(hit.verdict.outcome(&hit.site)),
            None => Ok(SignalOutcome::new(0.5, 0.3, "No fact-check found")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OnePage(Result<String, ScrapeError>);

    #[async_trait]
    impl PageFetcher for OnePage {
        async fn fetch_text(&self, _url: &str) -> Result<String, ScrapeError> {
            self.0.clone()
        }
    }

    fn index(page: Result<String, ScrapeError>) -> HttpFactCheckIndex {
        HttpFactCheckIndex::new(Arc::new(OnePage(page)), vec!["https://fc.example/".into()])
    }

    #[test]
    fn verdict_labels() {
        assert_eq!(Verdict::from_label("FAKE: Video of flood is old"), Verdict::False);
        assert_eq!(Verdict::from_label("Misleading claim about fuel prices"), Verdict::Misleading);
        assert_eq!(Verdict::from_label("Fact check: claim is TRUE"), Verdict::True);
        assert_eq!(Verdict::from_label("What we know about the bill"), Verdict::Unrated);
    }

    #[tokio::test]
    async fn matching_headline_yields_verdict() {
        let page = r#"<div><h2 class="t">Fake: Government bans 500 rupee notes from Monday</h2>
                      <h2>Cyclone warning for Odisha coast is genuine</h2></div>"#;
        let hit = index(Ok(page.into()))
            .lookup("Government bans 500 rupee notes from Monday")
            .await
            .unwrap()
            .expect("hit");
        assert_eq!(hit.verdict, Verdict::False);
        assert_eq!(hit.site, "https://fc.example/");
    }

    #[tokio::test]
    async fn no_matching_headline_is_none() {
        let page = "<h2>Unrelated story about elections</h2>";
        let res = index(Ok(page.into())).lookup("Monsoon arrives early in Kerala").await;
        assert_eq!(res, Ok(None));
    }

    #[tokio::test]
    async fn unreachable_index_is_an_error() {
        let res = index(Err(ScrapeError::Timeout)).lookup("anything").await;
        assert_eq!(res, Err(ScrapeError::Timeout));
    }

    #[tokio::test]
    async fn signal_maps_unrated_to_low_confidence() {
        let s = FactCheckSignal::new(Arc::new(index(Ok("<h2>nothing</h2>".into()))));
        let t = Utc::now();
        let a = Article::new("Some claim", "", "https://x", "S", t, t, None);
        let o = s.check(&a, t).await.unwrap();
        assert_eq!(o.score, 0.5);
        assert!(o.confidence < 0.5);
    }
}
