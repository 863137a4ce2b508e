//! Source adapters, one per upstream provider, plus the plumbing they share:
//! HTTP/fixture transport, status → error mapping, record normalization.

pub mod gnews;
pub mod newsapi;
pub mod newsdata;
pub mod rss;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use metrics::counter;
use once_cell::sync::OnceCell;
use regex::Regex;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::article::Article;
use crate::config::PipelineConfig;
use crate::error::AdapterError;
use crate::ingest::rate_limit::RateLimitBook;
use crate::ingest::types::SourceAdapter;

pub use gnews::GNewsAdapter;
pub use newsapi::NewsApiAdapter;
pub use newsdata::NewsDataAdapter;
pub use rss::RssAdapter;

const USER_AGENT: &str = "infosphere-news/0.1 (+news integrity pipeline)";

/// Where an adapter's bytes come from.
pub(crate) enum Transport {
    Http { client: reqwest::Client },
    /// Static body, for offline runs and tests. Still metered by the rate book.
    Fixture(String),
}

impl Transport {
    pub(crate) fn http() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "ingest", error = %e, "http client build failed, using defaults");
                reqwest::Client::new()
            });
        Transport::Http { client }
    }

    /// GET `url` as text, honouring the quota first.
    pub(crate) async fn get_text(
        &self,
        url: &reqwest::Url,
        book: &RateLimitBook,
    ) -> Result<String, AdapterError> {
        let now = Utc::now();
        book.try_acquire(now)?;

        let client = match self {
            Transport::Fixture(body) => return Ok(body.clone()),
            Transport::Http { client } => client,
        };

        let resp = client.get(url.clone()).send().await?;
        let status = resp.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let reset_at = book.exhaust(now, retry_after);
            return Err(AdapterError::RateLimited { reset_at });
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AdapterError::Unauthorized {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(AdapterError::Unreachable(format!("status {status}")));
        }
        Ok(resp.text().await?)
    }
}

/// Longest upstream back-off we honour; larger hints are clamped.
pub(crate) const MAX_RETRY_AFTER_SECS: i64 = 7 * 86_400;

/// `Retry-After` in delta-seconds form, clamped to `0..=MAX_RETRY_AFTER_SECS`.
/// HTTP-date values and garbage yield `None` (block until the window resets).
pub(crate) fn parse_retry_after(raw: &str) -> Option<chrono::Duration> {
    let secs = raw.trim().parse::<i64>().ok()?;
    chrono::Duration::try_seconds(secs.clamp(0, MAX_RETRY_AFTER_SECS))
}

/// Provider record after field mapping, before validation.
#[derive(Debug, Default, Clone)]
pub(crate) struct RawRecord {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub url: Option<String>,
    pub source: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub image: Option<String>,
}

/// Validate and convert records. Invalid ones are dropped with a logged reason.
pub(crate) fn normalize_records<I>(
    provider: &str,
    records: I,
    fetched_at: DateTime<Utc>,
    limit: usize,
) -> Vec<Article>
where
    I: IntoIterator<Item = Result<RawRecord, String>>,
{
    let mut out = Vec::new();
    for rec in records {
        if out.len() >= limit {
            break;
        }
        match rec.and_then(|r| into_article(provider, r, fetched_at)) {
            Ok(a) => out.push(a),
            Err(reason) => {
                tracing::debug!(target: "ingest", provider, %reason, "record dropped");
                counter!("news_malformed_records_total", "adapter" => provider.to_string())
                    .increment(1);
            }
        }
    }
    counter!("news_articles_fetched_total").increment(out.len() as u64);
    out
}

fn into_article(provider: &str, r: RawRecord, fetched_at: DateTime<Utc>) -> Result<Article, String> {
    let title = non_empty(r.title).ok_or("missing title")?;
    if title.eq_ignore_ascii_case("[removed]") {
        return Err("removed placeholder".to_string());
    }
    let url = non_empty(r.url).ok_or("missing url")?;
    let published = r.published.ok_or("missing or unparsable published date")?;
    let source = non_empty(r.source).unwrap_or_else(|| provider.to_string());

    let body = pick_body(r.description, r.content);
    Ok(Article::new(
        &title,
        &body,
        &url,
        &source,
        published,
        fetched_at,
        non_empty(r.image),
    ))
}

/// Longer of description/content, minus NewsAPI-style "[+123 chars]" tails.
fn pick_body(description: Option<String>, content: Option<String>) -> String {
    static RE_TRUNC: OnceCell<Regex> = OnceCell::new();
    let re = RE_TRUNC.get_or_init(|| Regex::new(r"\s*…?\s*\[\+\d+ chars\]\s*$").expect("trunc regex"));
    let content = content.map(|c| re.replace(&c, "").to_string());
    match (non_empty(description), non_empty(content)) {
        (Some(d), Some(c)) if c.chars().count() > d.chars().count() => c,
        (Some(d), _) => d,
        (None, Some(c)) => c,
        (None, None) => String::new(),
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub(crate) fn parse_rfc3339(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// `2025-10-03 09:15:00`, interpreted as UTC.
pub(crate) fn parse_naive_utc(ts: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(ts.trim(), "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|n| Utc.from_utc_datetime(&n))
        .or_else(|| parse_rfc3339(ts))
}

pub(crate) fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .and_then(|dt| Utc.timestamp_opt(dt.unix_timestamp(), 0).single())
}

/// Adapters enabled by the configuration, in fallback-priority order:
/// NewsAPI → GNews → NewsData → RSS feeds. Providers without a key are skipped.
pub fn from_config(cfg: &PipelineConfig) -> Vec<Arc<dyn SourceAdapter>> {
    let mut out: Vec<Arc<dyn SourceAdapter>> = Vec::new();

    match &cfg.newsapi_key {
        Some(key) => out.push(Arc::new(NewsApiAdapter::new(
            key,
            &cfg.country,
            RateLimitBook::daily(cfg.daily_limit("newsapi")),
        ))),
        None => tracing::info!(target: "ingest", provider = "NewsAPI", "no api key, adapter disabled"),
    }
    match &cfg.gnews_key {
        Some(key) => out.push(Arc::new(GNewsAdapter::new(
            key,
            &cfg.country,
            RateLimitBook::daily(cfg.daily_limit("gnews")),
        ))),
        None => tracing::info!(target: "ingest", provider = "GNews", "no api key, adapter disabled"),
    }
    match &cfg.newsdata_key {
        Some(key) => out.push(Arc::new(NewsDataAdapter::new(
            key,
            &cfg.country,
            RateLimitBook::daily(cfg.daily_limit("newsdata")),
        ))),
        None => tracing::info!(target: "ingest", provider = "NewsData", "no api key, adapter disabled"),
    }
    for (name, url) in &cfg.rss_feeds {
        match RssAdapter::from_url(name, url) {
            Ok(a) => out.push(Arc::new(a)),
            Err(e) => tracing::warn!(target: "ingest", feed = %name, error = %e, "invalid feed url"),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 3, 12, 0, 0).unwrap()
    }

    fn rec(title: Option<&str>, url: Option<&str>, published: bool) -> RawRecord {
        RawRecord {
            title: title.map(str::to_string),
            url: url.map(str::to_string),
            published: published.then(now),
            source: Some("PTI".into()),
            ..RawRecord::default()
        }
    }

    #[test]
    fn invalid_records_are_dropped_not_fatal() {
        let records = vec![
            Ok(rec(Some("Kept"), Some("https://a"), true)),
            Ok(rec(None, Some("https://b"), true)),
            Ok(rec(Some("[Removed]"), Some("https://c"), true)),
            Ok(rec(Some("No url"), None, true)),
            Ok(rec(Some("No date"), Some("https://d"), false)),
            Err("type mismatch".to_string()),
            Ok(rec(Some("Also kept"), Some("https://e"), true)),
        ];
        let out = normalize_records("Test", records, now(), 10);
        let titles: Vec<_> = out.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Kept", "Also kept"]);
    }

    #[test]
    fn limit_caps_output() {
        let records = (0..5).map(|i| Ok(rec(Some(&format!("T{i}")), Some("https://a"), true)));
        assert_eq!(normalize_records("Test", records, now(), 3).len(), 3);
    }

    #[test]
    fn missing_source_falls_back_to_provider() {
        let mut r = rec(Some("T"), Some("https://a"), true);
        r.source = None;
        let out = normalize_records("GNews", vec![Ok(r)], now(), 10);
        assert_eq!(out[0].source_name, "GNews");
    }

    #[test]
    fn body_prefers_longer_text_and_strips_truncation_tail() {
        let body = pick_body(
            Some("Short desc".into()),
            Some("A much longer content body here… [+2345 chars]".into()),
        );
        assert_eq!(body, "A much longer content body here");
        assert_eq!(pick_body(Some("Only desc".into()), None), "Only desc");
    }

    #[test]
    fn date_formats() {
        assert_eq!(parse_rfc3339("2025-10-03T12:00:00Z"), Some(now()));
        assert_eq!(parse_naive_utc("2025-10-03 12:00:00"), Some(now()));
        assert_eq!(parse_rfc2822("Fri, 03 Oct 2025 12:00:00 +0000"), Some(now()));
        assert_eq!(parse_rfc2822("Fri, 03 Oct 2025 17:30:00 +0530"), Some(now()));
        assert!(parse_rfc3339("yesterday").is_none());
    }

    #[test]
    fn retry_after_is_clamped() {
        assert_eq!(parse_retry_after(" 120 "), chrono::Duration::try_seconds(120));
        assert_eq!(
            parse_retry_after("10000000000000"),
            chrono::Duration::try_seconds(MAX_RETRY_AFTER_SECS)
        );
        assert_eq!(parse_retry_after(&i64::MAX.to_string()), chrono::Duration::try_seconds(MAX_RETRY_AFTER_SECS));
        assert_eq!(parse_retry_after("-5"), chrono::Duration::try_seconds(0));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn from_config_orders_and_skips_keyless() {
        let cfg = PipelineConfig::from_lookup(|k: &str| match k {
            "GNEWS_API_KEY" => Some("g".to_string()),
            "NEWSDATA_API_KEY" => Some("n".to_string()),
            "NEWS_RSS_FEEDS" => Some("TOI=https://toi.example/rss.cms".to_string()),
            _ => None,
        });
        let names: Vec<String> = from_config(&cfg).iter().map(|a| a.name().to_string()).collect();
        assert_eq!(names, vec!["GNews", "NewsData", "TOI"]);
    }
}
