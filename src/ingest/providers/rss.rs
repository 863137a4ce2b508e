use async_trait::async_trait;
use chrono::Utc;
use metrics::histogram;
use quick_xml::de::from_str;
use serde::Deserialize;

use super::{normalize_records, parse_rfc2822, RawRecord, Transport};
use crate::article::{Article, Category};
use crate::error::AdapterError;
use crate::ingest::rate_limit::RateLimitBook;
use crate::ingest::types::SourceAdapter;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(default)]
    title: Option<String>,
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    enclosure: Option<Enclosure>,
}

#[derive(Debug, Deserialize)]
struct Enclosure {
    #[serde(rename = "@url")]
    url: Option<String>,
}

/// Keyless RSS 2.0 feed. The feed name doubles as the fallback source name.
pub struct RssAdapter {
    name: String,
    url: reqwest::Url,
    transport: Transport,
    book: RateLimitBook,
}

impl RssAdapter {
    pub fn from_url(name: &str, url: &str) -> Result<Self, AdapterError> {
        let url = reqwest::Url::parse(url).map_err(|e| AdapterError::Malformed(e.to_string()))?;
        Ok(Self {
            name: name.to_string(),
            url,
            transport: Transport::http(),
            book: RateLimitBook::unmetered(),
        })
    }

    pub fn from_fixture(name: &str, xml: &str) -> Self {
        Self {
            name: name.to_string(),
            url: reqwest::Url::parse("http://fixture.invalid/rss").expect("static url"),
            transport: Transport::Fixture(xml.to_string()),
            book: RateLimitBook::unmetered(),
        }
    }

    fn parse(&self, xml: &str, category: Option<&Category>, limit: usize) -> Result<Vec<Article>, AdapterError> {
        let t0 = std::time::Instant::now();
        let rss: Rss = from_str(&scrub_html_entities_for_xml(xml))
            .map_err(|e| AdapterError::Malformed(format!("rss: {e}")))?;
        tracing::debug!(
            target: "ingest",
            feed = %self.name,
            channel = rss.channel.title.as_deref().unwrap_or_default(),
            items = rss.channel.item.len(),
            "rss parsed"
        );

        // Feeds have no topic filter upstream; narrow by keyword in the title.
        let wanted = category
            .filter(|c| !c.matches(Category::GENERAL))
            .map(|c| c.as_str().to_lowercase());

        let records = rss
            .channel
            .item
            .into_iter()
            .filter(|it| match (&wanted, &it.title) {
                (Some(w), Some(t)) => t.to_lowercase().contains(w.as_str()),
                _ => true,
            })
            .map(|it| {
                Ok(RawRecord {
                    title: it.title,
                    description: it.description,
                    content: None,
                    url: it.link,
                    source: Some(self.name.clone()),
                    published: it.pub_date.as_deref().and_then(parse_rfc2822),
                    image: it.enclosure.and_then(|e| e.url),
                })
            });
        let out = normalize_records(&self.name, records, Utc::now(), limit);
        histogram!("news_rss_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for RssAdapter {
    async fn fetch(
        &self,
        category: Option<&Category>,
        limit: usize,
    ) -> Result<Vec<Article>, AdapterError> {
        let xml = self.transport.get_text(&self.url, &self.book).await?;
        self.parse(&xml, category, limit)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// XML knows only five named entities; feeds routinely ship HTML ones.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
        .replace("&rupee;", "Rs")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel>
  <title>National Desk</title>
  <item>
    <title>Budget announced&nbsp;- ₹500cr scheme for farmers</title>
    <link>https://feeds.example/budget</link>
    <pubDate>Fri, 03 Oct 2025 11:00:00 +0530</pubDate>
    <description><![CDATA[<p>The <b>finance ministry</b> announced</p>]]></description>
    <enclosure url="https://img.example/budget.jpg" type="image/jpeg" length="0"/>
  </item>
  <item>
    <title>Cricket: India win series</title>
    <link>https://feeds.example/cricket</link>
    <pubDate>not a date</pubDate>
  </item>
</channel></rss>"#;

    #[tokio::test]
    async fn parses_items_with_enclosure_and_drops_undated() {
        let a = RssAdapter::from_fixture("National Desk", FEED);
        let out = a.fetch(None, 10).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source_name, "National Desk");
        assert_eq!(out[0].body, "The finance ministry announced");
        assert_eq!(out[0].image_url.as_deref(), Some("https://img.example/budget.jpg"));
    }

    #[tokio::test]
    async fn category_narrows_by_title_keyword() {
        let a = RssAdapter::from_fixture("Desk", FEED);
        let out = a.fetch(Some(&Category::new("Budget")), 10).await.unwrap();
        assert_eq!(out.len(), 1);
        let out = a.fetch(Some(&Category::new("Weather")), 10).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn garbage_is_malformed() {
        let a = RssAdapter::from_fixture("Desk", "<html>nope");
        assert!(matches!(a.fetch(None, 10).await, Err(AdapterError::Malformed(_))));
    }

    #[test]
    fn invalid_url_is_rejected() {
        assert!(RssAdapter::from_url("x", "not a url").is_err());
    }
}
