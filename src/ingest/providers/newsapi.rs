use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use super::{normalize_records, parse_rfc3339, RawRecord, Transport};
use crate::article::{Article, Category};
use crate::error::AdapterError;
use crate::ingest::rate_limit::RateLimitBook;
use crate::ingest::types::SourceAdapter;

const ENDPOINT: &str = "https://newsapi.org/v2/top-headlines";

#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    description: Option<String>,
    content: Option<String>,
    url: Option<String>,
    #[serde(rename = "urlToImage")]
    url_to_image: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
    source: Option<Source>,
}

#[derive(Debug, Deserialize)]
struct Source {
    name: Option<String>,
}

pub struct NewsApiAdapter {
    api_key: String,
    country: String,
    transport: Transport,
    book: RateLimitBook,
}

impl NewsApiAdapter {
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
        let page_size = limit.clamp(1, 100).to_string();
        let mut params = vec![
            ("country", self.country.as_str()),
            ("pageSize", page_size.as_str()),
            ("apiKey", self.api_key.as_str()),
        ];
        if let Some(topic) = category.and_then(topic_for) {
            params.push(("category", topic));
        }
        reqwest::Url::parse_with_params(ENDPOINT, &params)
            .map_err(|e| AdapterError::Malformed(e.to_string()))
    }

    fn parse(&self, body: &str, limit: usize) -> Result<Vec<Article>, AdapterError> {
        let env: Envelope = serde_json::from_str(body)?;
        if env.status != "ok" {
            let msg = env.message.unwrap_or_else(|| env.status.clone());
            return Err(AdapterError::Malformed(format!("provider error: {msg}")));
        }
        let records = env.articles.into_iter().map(|v| {
            let it: Item = serde_json::from_value(v).map_err(|e| e.to_string())?;
            Ok(RawRecord {
                title: it.title,
                description: it.description,
                content: it.content,
                url: it.url,
                source: it.source.and_then(|s| s.name),
                published: it.published_at.as_deref().and_then(parse_rfc3339),
                image: it.url_to_image,
            })
        });
        Ok(normalize_records(self.name(), records, Utc::now(), limit))
    }
}

/// NewsAPI topics: business, entertainment, general, health, science, sports, technology.
fn topic_for(c: &Category) -> Option<&'static str> {
    let topic = match c.as_str().to_ascii_lowercase().as_str() {
        "business" => "business",
        "entertainment" => "entertainment",
        "health" => "health",
        "sports" => "sports",
        "technology" => "technology",
        "science" => "science",
        "general" => "general",
        _ => return None,
    };
    Some(topic)
}

#[async_trait]
impl SourceAdapter for NewsApiAdapter {
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
        "NewsAPI"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
      "status": "ok",
      "totalResults": 4,
      "articles": [
        {"source": {"id": null, "name": "The Hindu"}, "title": "Budget announced, ₹500cr scheme",
         "description": "Short", "content": "Finance ministry unveils a new scheme for farmers… [+1200 chars]",
         "url": "https://thehindu.example/budget", "urlToImage": "https://img.example/b.jpg",
         "publishedAt": "2025-10-03T06:30:00Z"},
        {"source": {"name": "Removed"}, "title": "[Removed]", "url": "https://removed.com",
         "publishedAt": "2025-10-03T06:30:00Z"},
        {"source": {"name": "X"}, "title": "No date", "url": "https://x.example/a"},
        {"source": {"name": "Y"}, "title": 42, "url": "https://y.example/a", "publishedAt": "2025-10-03T06:30:00Z"}
      ]
    }"#;

    #[tokio::test]
    async fn fixture_keeps_good_records_and_drops_bad_ones() {
        let a = NewsApiAdapter::from_fixture(BODY, RateLimitBook::unmetered());
        let out = a.fetch(None, 10).await.expect("batch survives");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source_name, "The Hindu");
        assert_eq!(out[0].body, "Finance ministry unveils a new scheme for farmers");
        assert_eq!(out[0].image_url.as_deref(), Some("https://img.example/b.jpg"));
    }

    #[tokio::test]
    async fn error_envelope_is_malformed() {
        let body = r#"{"status":"error","code":"apiKeyInvalid","message":"bad key"}"#;
        let a = NewsApiAdapter::from_fixture(body, RateLimitBook::unmetered());
        assert!(matches!(a.fetch(None, 10).await, Err(AdapterError::Malformed(_))));
    }

    #[tokio::test]
    async fn exhausted_quota_fails_fast() {
        let a = NewsApiAdapter::from_fixture(BODY, RateLimitBook::daily(Some(1)));
        assert!(a.fetch(None, 10).await.is_ok());
        assert!(matches!(
            a.fetch(None, 10).await,
            Err(AdapterError::RateLimited { .. })
        ));
    }

    #[test]
    fn url_carries_key_and_mapped_category() {
        let a = NewsApiAdapter::new("k123", "in", RateLimitBook::unmetered());
        let url = a.request_url(Some(&Category::new("Sports")), 500).unwrap();
        let q = url.query().unwrap_or_default();
        assert!(q.contains("apiKey=k123"));
        assert!(q.contains("category=sports"));
        assert!(q.contains("pageSize=100"));

        let url = a.request_url(Some(&Category::new("Crime")), 10).unwrap();
        assert!(!url.query().unwrap_or_default().contains("category="));
    }
}
