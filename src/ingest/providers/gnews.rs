use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use super::{normalize_records, parse_rfc3339, RawRecord, Transport};
use crate::article::{Article, Category};
use crate::error::AdapterError;
use crate::ingest::rate_limit::RateLimitBook;
use crate::ingest::types::SourceAdapter;

const ENDPOINT: &str = "https://gnews.io/api/v4/top-headlines";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    articles: Option<Vec<Value>>,
    #[serde(default)]
    errors: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    description: Option<String>,
    content: Option<String>,
    url: Option<String>,
    image: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
    source: Option<Source>,
}

#[derive(Debug, Deserialize)]
struct Source {
    name: Option<String>,
}

pub struct GNewsAdapter {
    api_key: String,
    country: String,
    transport: Transport,
    book: RateLimitBook,
}

impl GNewsAdapter {
    pub fn new(api_key: &str, country: &str, book: RateLimitBook) -> Self {
        Self {
            api_key: api_key.to_string(),
            country: country.to_string(),
            transport: Transport::http(),
            book,
        }
    }

    pub fn from_fixture(body: &str, book: RateLimitBook) -> Self {
        Self {
            api_key: "fixture".to_string(),
            country: "in".to_string(),
            transport: Transport::Fixture(body.to_string()),
            book,
        }
    }

    pub(crate) fn request_url(
        &self,
        category: Option<&Category>,
        limit: usize,
    ) -> Result<reqwest::Url, AdapterError> {
        let max = limit.clamp(1, 100).to_string();
        let topic = category.and_then(topic_for).unwrap_or("general");
        reqwest::Url::parse_with_params(
            ENDPOINT,
            &[
                ("country", self.country.as_str()),
                ("lang", "en"),
                ("max", max.as_str()),
                ("category", topic),
                ("apikey", self.api_key.as_str()),
            ],
        )
        .map_err(|e| AdapterError::Malformed(e.to_string()))
    }

    fn parse(&self, body: &str, limit: usize) -> Result<Vec<Article>, AdapterError> {
        let env: Envelope = serde_json::from_str(body)?;
        let items = match (env.articles, env.errors) {
            (Some(items), _) => items,
            (None, Some(errors)) => {
                return Err(AdapterError::Malformed(format!("provider error: {errors}")))
            }
            (None, None) => return Err(AdapterError::Malformed("missing articles".into())),
        };
        let records = items.into_iter().map(|v| {
            let it: Item = serde_json::from_value(v).map_err(|e| e.to_string())?;
            Ok(RawRecord {
                title: it.title,
                description: it.description,
                content: it.content,
                url: it.url,
                source: it.source.and_then(|s| s.name),
                published: it.published_at.as_deref().and_then(parse_rfc3339),
                image: it.image,
            })
        });
        Ok(normalize_records(self.name(), records, Utc::now(), limit))
    }
}

/// GNews topics: general, world, nation, business, technology, entertainment, sports, science, health.
fn topic_for(c: &Category) -> Option<&'static str> {
    let topic = match c.as_str().to_ascii_lowercase().as_str() {
        "politics" => "nation",
        "international" => "world",
        "business" => "business",
        "technology" => "technology",
        "entertainment" => "entertainment",
        "sports" => "sports",
        "science" => "science",
        "health" => "health",
        _ => return None,
    };
    Some(topic)
}

#[async_trait]
impl SourceAdapter for GNewsAdapter {
    async fn fetch(
        &self,
        category: Option<&Category>,
        limit: usize,
    ) -> Result<Vec<Article>, AdapterError> {
        let url = self.request_url(category, limit)?;
        let body = self.transport.get_text(&url, &self.book).await?;
        self.parse(&body, limit)
    }

    fn name(&self) -> &str {
        "GNews"
    }
}
