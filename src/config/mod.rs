//! Runtime configuration.
//!
//! Scalars come from the environment (optionally seeded from `.env` by the binary);
//! structured data (category keywords, signal weights, credibility seeds) lives in
//! files under `config/`, see [`files`].

pub mod files;

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_NEWSAPI_KEY: &str = "NEWSAPI_KEY";
pub const ENV_GNEWS_KEY: &str = "GNEWS_API_KEY";
pub const ENV_NEWSDATA_KEY: &str = "NEWSDATA_API_KEY";
pub const ENV_RSS_FEEDS: &str = "NEWS_RSS_FEEDS";

/// Process-wide pipeline settings with defaults for every knob.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub newsapi_key: Option<String>,
    pub gnews_key: Option<String>,
    pub newsdata_key: Option<String>,
    /// `(display name, feed url)` pairs, in priority order.
    pub rss_feeds: Vec<(String, String)>,
    pub country: String,

    pub cache_ttl: Duration,
    pub adapter_timeout: Duration,
    pub adapter_retries: u32,
    pub fetch_deadline: Duration,

    pub verify_deadline: Duration,
    pub signal_timeout: Duration,
    pub verify_concurrency: usize,
    pub flag_threshold: f32,

    pub dedup_similarity: f32,
    pub dedup_window: Duration,

    pub refresh_interval: Duration,
    pub default_limit: usize,

    /// Requests per day, keyed by lowercase provider name.
    pub daily_limits: HashMap<String, u32>,

    pub categories_path: Option<PathBuf>,
    pub verification_path: Option<PathBuf>,
    pub credibility_path: Option<PathBuf>,
    pub cache_path: Option<PathBuf>,
    pub flag_log_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from any key lookup; unparsable values fall back to defaults.
    pub fn from_lookup<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = |name: &str| get(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let num = |name: &str, default: u64| parse_or(get(name), default);
        let path = |name: &str| key(name).map(PathBuf::from);

        let mut daily_limits = HashMap::new();
        for (provider, default) in [("newsapi", 100u32), ("gnews", 100), ("newsdata", 200)] {
            let env_name = format!("NEWS_DAILY_LIMIT_{}", provider.to_ascii_uppercase());
            daily_limits.insert(provider.to_string(), parse_or(get(&env_name), default));
        }

        Self {
            newsapi_key: key(ENV_NEWSAPI_KEY),
            gnews_key: key(ENV_GNEWS_KEY),
            newsdata_key: key(ENV_NEWSDATA_KEY),
            rss_feeds: get(ENV_RSS_FEEDS)
                .map(|raw| parse_feed_list(&raw))
                .unwrap_or_default(),
            country: key("NEWS_COUNTRY").unwrap_or_else(|| "in".to_string()),

            cache_ttl: Duration::from_secs(num("NEWS_CACHE_DURATION", 120) * 60),
            adapter_timeout: Duration::from_secs(num("NEWS_ADAPTER_TIMEOUT_SECS", 8)),
            adapter_retries: parse_or(get("NEWS_ADAPTER_RETRIES"), 1u32),
            fetch_deadline: Duration::from_secs(num("NEWS_FETCH_DEADLINE_SECS", 20)),

            verify_deadline: Duration::from_secs(num("NEWS_VERIFY_DEADLINE_SECS", 15)),
            signal_timeout: Duration::from_secs(num("NEWS_SIGNAL_TIMEOUT_SECS", 10)),
            verify_concurrency: parse_or(get("NEWS_VERIFY_CONCURRENCY"), 4usize).max(1),
            flag_threshold: parse_or(get("NEWS_FLAG_THRESHOLD"), 0.65f32).clamp(0.0, 1.0),

            dedup_similarity: parse_or(get("NEWS_DEDUP_SIMILARITY"), 0.85f32).clamp(0.0, 1.0),
            dedup_window: Duration::from_secs(num("NEWS_DEDUP_WINDOW_HOURS", 6) * 3600),

            refresh_interval: Duration::from_secs(num("NEWS_REFRESH_INTERVAL_SECS", 900).max(1)),
            default_limit: parse_or(get("NEWS_DEFAULT_LIMIT"), 50usize).max(1),

            daily_limits,

            categories_path: path("NEWS_CATEGORIES_PATH"),
            verification_path: path("NEWS_VERIFICATION_PATH"),
            credibility_path: path("NEWS_CREDIBILITY_PATH"),
            cache_path: path("NEWS_CACHE_PATH"),
            flag_log_path: path("NEWS_FLAG_LOG_PATH"),
        }
    }

    pub fn daily_limit(&self, provider: &str) -> Option<u32> {
        self.daily_limits.get(&provider.to_ascii_lowercase()).copied()
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|s| s.trim().parse::<T>().ok()).unwrap_or(default)
}

/// `"TOI=https://a/rss, https://b/feed"` → `[("TOI", a), ("b", b)]`.
/// Entries without a name are labelled by their host.
pub fn parse_feed_list(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|entry| match entry.split_once('=') {
            Some((name, url)) if url.trim().starts_with("http") => {
                Some((name.trim().to_string(), url.trim().to_string()))
            }
            _ if entry.starts_with("http") => {
                let host = entry
                    .split("://")
                    .nth(1)
                    .and_then(|rest| rest.split('/').next())
                    .unwrap_or(entry);
                Some((host.to_string(), entry.to_string()))
            }
            _ => None,
        })
        .collect()
}
