use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use super::{normalize_records, parse_naive_utc, RawRecord, Transport};
use crate::article::{Article, Category};
use crate::error::AdapterError;
use crate::ingest::rate_limit::RateLimitBook;
use crate::ingest::types::SourceAdapter;

const ENDPOINT: &str = "https://newsdata.io/api/1/news";

#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    results: Value,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    description: Option<String>,
    content: Option<String>,
    link: Option<String>,
    source_id: Option<String>,
    #[serde(default)]
    source_name: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    image_url: Option<String>,
}

pub struct NewsDataAdapter {
    api_key: String,
    country: String,
    transport: Transport,
    book: RateLimitBook,
}

impl NewsDataAdapter {
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

    pub(crate) fn request_url(&self, category: Option<&Category>) -> Result<reqwest::Url, AdapterError> {
        let mut params = vec![
            ("apikey", self.api_key.as_str()),
            ("country", self.country.as_str()),
            ("language", "en"),
        ];
        if let Some(topic) = category.and_then(topic_for) {
            params.push(("category", topic));
        }
        reqwest::Url::parse_with_params(ENDPOINT, &params)
            .map_err(|e| AdapterError::Malformed(e.to_string()))
    }

    fn parse(&self, body: &str, limit: usize) -> Result<Vec<Article>, AdapterError> {
        let env: Envelope = serde_json::from_str(body)?;
        if env.status != "success" {
            return Err(AdapterError::Malformed(format!("provider error: {}", env.results)));
        }
        let Value::Array(items) = env.results else {
            return Err(AdapterError::Malformed("results is not a list".into()));
        };
        let records = items.into_iter().map(|v| {
            let it: Item = serde_json::from_value(v).map_err(|e| e.to_string())?;
            Ok(RawRecord {
                title: it.title,
                description: it.description,
                // Free tier returns a placeholder instead of the body.
                content: it.content.filter(|c| !c.starts_with("ONLY AVAILABLE IN PAID")),
                url: it.link,
                source: it.source_name.or(it.source_id),
                published: it.pub_date.as_deref().and_then(parse_naive_utc),
                image: it.image_url,
            })
        });
        Ok(normalize_records(self.name(), records, Utc::now(), limit))
    }
}

fn topic_for(c: &Category) -> Option<&'static str> {
    let topic = match c.as_str().to_ascii_lowercase().as_str() {
        "politics" => "politics",
        "sports" => "sports",
        "technology" => "technology",
        "entertainment" => "entertainment",
        "business" => "business",
        "health" => "health",
        "crime" => "crime",
        "international" => "world",
        "weather" => "environment",
        _ => return None,
    };
    Some(topic)
}

#[async_trait]
impl SourceAdapter for NewsDataAdapter {
    async fn fetch(
        &self,
        category: Option<&Category>,
        limit: usize,
    ) -> Result<Vec<Article>, AdapterError> {
        let url = self.request_url(category)?;
        let body = self.transport.get_text(&url, &self.book).await?;
        self.parse(&body, limit)
    }

    fn name(&self) -> &str {
        "NewsData"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn maps_link_source_id_and_naive_date() {
        let body = r#"{"status": "success", "totalResults": 2, "results": [
          {"title": "RBI keeps repo rate unchanged", "link": "https://bs.example/rbi",
           "source_id": "business_standard", "pubDate": "2025-10-01 05:45:00",
           "description": "MPC votes 5-1", "content": "ONLY AVAILABLE IN PAID PLANS",
           "image_url": null},
          {"title": "Broken", "link": "https://bs.example/x", "pubDate": "sometime"}
        ]}"#;
        let a = NewsDataAdapter::from_fixture(body, RateLimitBook::unmetered());
        let out = a.fetch(None, 10).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source_name, "business_standard");
        assert_eq!(out[0].body, "MPC votes 5-1");
        assert_eq!(
            out[0].published_at,
            Utc.with_ymd_and_hms(2025, 10, 1, 5, 45, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn error_status_is_malformed() {
        let body = r#"{"status": "error", "results": {"message": "API key invalid", "code": "Unauthorized"}}"#;
        let a = NewsDataAdapter::from_fixture(body, RateLimitBook::unmetered());
        assert!(matches!(a.fetch(None, 10).await, Err(AdapterError::Malformed(_))));
    }

    #[test]
    fn url_maps_weather_to_environment() {
        let a = NewsDataAdapter::new("nd", "in", RateLimitBook::unmetered());
        let url = a.request_url(Some(&Category::new("weather"))).unwrap();
        let q = url.query().unwrap_or_default();
        assert!(q.contains("category=environment"));
        assert!(q.contains("apikey=nd"));
    }
}
