//! Official-source corroboration.
//!
//! Each outlet (press bureau, central bank, health authority) has trigger terms; only
//! outlets whose triggers occur in the article are consulted. Their pages are fetched
//! concurrently and scanned for the claim:
//! - normalized title appears verbatim → 0.95 (confidence 0.9)
//! - ≥ max(2, 60%) of the title's key terms appear → 0.80 (0.7)
//! - otherwise → 0.30 (0.6)
//!
//! No outlet applies → `NotApplicable`. Every fetch failed → the first error.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;

use super::{SignalCheck, SignalKind, SignalOutcome};
use crate::article::{clean_text, normalize_title, title_tokens, Article};
use crate::error::ScrapeError;

/// Plain-text page fetch used by the scraping signals.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String, ScrapeError>;
}

pub struct HttpPageFetcher {
    client: reqwest::Client,
}

impl HttpPageFetcher {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("infosphere-news/0.1 (+verification)")
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "verify", error = %e, "http client build failed, using defaults");
                reqwest::Client::new()
            });
        Self { client }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, ScrapeError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ScrapeError::Http {
                status: status.as_u16(),
            });
        }
        Ok(resp.text().await?)
    }
}

#[derive(Debug, Clone)]
pub struct Outlet {
    pub name: String,
    pub url: String,
    /// Lowercase terms (single or multi-word) that make this outlet relevant.
    pub triggers: Vec<String>,
}

impl Outlet {
    fn new(name: &str, url: &str, triggers: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            triggers: triggers.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn applies_to(&self, padded_text: &str) -> bool {
        self.triggers
            .iter()
            .any(|t| padded_text.contains(&format!(" {t} ")))
    }
}

pub fn default_outlets() -> Vec<Outlet> {
    vec![
        Outlet::new(
            "PIB",
            "https://pib.gov.in/PressReleasePage.aspx",
            &[
                "government", "ministry", "minister", "cabinet", "scheme", "budget", "parliament",
                "pm modi", "policy", "union",
            ],
        ),
        Outlet::new(
            "RBI",
            "https://www.rbi.org.in/Scripts/BS_PressReleaseDisplay.aspx",
            &["rbi", "reserve bank", "repo rate", "monetary policy", "inflation", "rupee"],
        ),
        Outlet::new(
            "WHO",
            "https://www.who.int/news",
            &[
                "world health organization", "health", "vaccine", "covid", "pandemic", "outbreak",
                "disease",
            ],
        ),
    ]
}

const STOPWORDS: [&str; 24] = [
    "the", "and", "for", "with", "from", "that", "this", "into", "over", "after", "amid", "says",
    "said", "will", "have", "has", "are", "was", "were", "its", "new", "not", "but", "all",
];

/// Distinct title terms longer than three characters, minus stopwords.
fn key_terms(title: &str) -> BTreeSet<String> {
    title_tokens(title)
        .into_iter()
        .filter(|t| t.chars().count() > 3 && !STOPWORDS.contains(&t.as_str()))
        .collect()
}

pub struct OfficialSourceCheck {
    fetcher: Arc<dyn PageFetcher>,
    outlets: Vec<Outlet>,
}

impl OfficialSourceCheck {
    pub fn new(fetcher: Arc<dyn PageFetcher>, outlets: Vec<Outlet>) -> Self {
        Self { fetcher, outlets }
    }

    pub fn with_default_outlets(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self::new(fetcher, default_outlets())
    }

    /// Score one outlet page against the article title.
    fn match_page(title: &str, page: &str) -> (f32, f32, Option<&'static str>) {
        let page_norm = format!(" {} ", normalize_title(&clean_text(page)));
        let title_norm = normalize_title(title);
        if !title_norm.is_empty() && page_norm.contains(&format!(" {title_norm} ")) {
            return (0.95, 0.9, Some("verbatim"));
        }
        let terms = key_terms(title);
        let hits = terms
            .iter()
            .filter(|t| page_norm.contains(&format!(" {t} ")))
            .count();
        let needed = 2usize.max((terms.len() as f32 * 0.6).ceil() as usize);
        if hits >= needed {
            return (0.80, 0.7, Some("keywords"));
        }
        (0.30, 0.6, None)
    }
}

#[async_trait]
impl SignalCheck for OfficialSourceCheck {
    fn kind(&self) -> SignalKind {
        SignalKind::OfficialSource
    }

    async fn check(&self, article: &Article, _now: DateTime<Utc>) -> Result<SignalOutcome, ScrapeError> {
        let padded = format!(" {} ", normalize_title(&article.text()));
        let applicable: Vec<&Outlet> = self.outlets.iter().filter(|o| o.applies_to(&padded)).collect();
        if applicable.is_empty() {
            return Err(ScrapeError::NotApplicable("no official outlet covers this topic".into()));
        }

        let pages = join_all(
            applicable
                .iter()
                .map(|o| async move { (o.name.as_str(), self.fetcher.fetch_text(&o.url).await) }),
        )
        .await;

        let mut best: Option<(f32, f32, String)> = None;
        let mut first_err = None;
        for (outlet, page) in pages {
            match page {
                Ok(text) => {
                    let (score, conf, how) = Self::match_page(&article.title, &text);
                    let detail = match how {
                        Some(how) => format!("Matched {outlet} ({how})"),
                        None => format!("No matching claim on {outlet}"),
                    };
                    if best.as_ref().map_or(true, |(s, _, _)| score > *s) {
                        best = Some((score, conf, detail));
                    }
                }
                Err(e) => {
                    tracing::debug!(target: "verify", outlet, error = %e, "official source fetch failed");
                    first_err.get_or_insert(e);
                }
            }
        }

        match (best, first_err) {
            (Some((score, conf, detail)), _) => Ok(SignalOutcome::new(score, conf, detail)),
            (None, Some(e)) => Err(e),
            (None, None) => Err(ScrapeError::NotApplicable("no outlet consulted".into())),
        }
    }
}
