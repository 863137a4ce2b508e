//! Image authenticity from cheap evidence: the hosting domain and the capture
//! timestamp embedded in the first bytes of the file.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::OnceCell;
use regex::bytes::Regex;

use super::{SignalCheck, SignalKind, SignalOutcome};
use crate::article::Article;
use crate::error::ScrapeError;

/// Bytes read from the start of an image.
pub const HEAD_BYTES: usize = 256 * 1024;

const STOCK_HOSTS: [&str; 9] = [
    "shutterstock",
    "gettyimages",
    "istockphoto",
    "pexels",
    "unsplash",
    "dreamstime",
    "alamy",
    "depositphotos",
    "stock.adobe",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageMeta {
    pub has_exif: bool,
    pub captured_at: Option<DateTime<Utc>>,
}

impl ImageMeta {
    /// Scan raw image bytes for an EXIF block and its first datetime tag.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        static RE_DT: OnceCell<Regex> = OnceCell::new();
        let re = RE_DT.get_or_init(|| {
            Regex::new(r"(\d{4}):(\d{2}):(\d{2}) (\d{2}):(\d{2}):(\d{2})").expect("exif datetime regex")
        });

        let has_exif = bytes.windows(6).any(|w| w == b"Exif\0\0");
        let captured_at = if has_exif {
            re.find(bytes)
                .and_then(|m| std::str::from_utf8(m.as_bytes()).ok())
                .and_then(|s| NaiveDateTime::parse_from_str(s, "%Y:%m:%d %H:%M:%S").ok())
                .map(|n| n.and_utc())
        } else {
            None
        };
        Self { has_exif, captured_at }
    }
}

#[async_trait]
pub trait ImageInspector: Send + Sync {
    async fn inspect(&self, url: &str) -> Result<ImageMeta, ScrapeError>;
}

pub struct HttpImageInspector {
    client: reqwest::Client,
}

impl HttpImageInspector {
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
impl ImageInspector for HttpImageInspector {
    async fn inspect(&self, url: &str) -> Result<ImageMeta, ScrapeError> {
        let mut resp = self
            .client
            .get(url)
            .header(reqwest::header::RANGE, format!("bytes=0-{}", HEAD_BYTES - 1))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ScrapeError::Http {
                status: status.as_u16(),
            });
        }
        // Servers may ignore Range; stop reading at the cap either way.
        let mut head = Vec::with_capacity(64 * 1024);
        while let Some(chunk) = resp.chunk().await? {
            let room = HEAD_BYTES - head.len();
            head.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if head.len() >= HEAD_BYTES {
                break;
            }
        }
        Ok(ImageMeta::from_bytes(&head))
    }
}

pub fn is_stock_host(url: &str) -> bool {
    let host = reqwest::Url::parse(url.trim())
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()));
    match host {
        Some(h) => STOCK_HOSTS.iter().any(|s| h.contains(s)),
        None => false,
    }
}

pub struct ImageSignal {
    inspector: Arc<dyn ImageInspector>,
    /// Capture may precede publication by at most this much.
    pub max_capture_lead: chrono::Duration,
}

impl ImageSignal {
    pub fn new(inspector: Arc<dyn ImageInspector>) -> Self {
        Self {
            inspector,
            max_capture_lead: chrono::Duration::days(7),
        }
    }

    fn judge(&self, meta: &ImageMeta, published: DateTime<Utc>, now: DateTime<Utc>) -> SignalOutcome {
        match (meta.has_exif, meta.captured_at) {
            (_, Some(at)) if at > now + chrono::Duration::hours(1) => {
                SignalOutcome::new(0.3, 0.6, "Capture time lies in the future")
            }
            (_, Some(at))
                if at >= published - self.max_capture_lead && at <= published + chrono::Duration::hours(1) =>
            {
                SignalOutcome::new(0.9, 0.7, "Capture time consistent with publication")
            }
            (_, Some(at)) => SignalOutcome::new(
                0.3,
                0.6,
                format!(
                    "Captured {} days away from publication",
                    (published - at).num_days().abs()
                ),
            ),
            (true, None) => SignalOutcome::new(0.7, 0.5, "Capture metadata present without a date"),
            (false, None) => SignalOutcome::new(0.55, 0.4, "No capture metadata"),
        }
    }
}

#[async_trait]
impl SignalCheck for ImageSignal {
    fn kind(&self) -> SignalKind {
        SignalKind::ImageAuthenticity
    }

    async fn check(&self, article: &Article, now: DateTime<Utc>) -> Result<SignalOutcome, ScrapeError> {
        let url = article
            .image_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| ScrapeError::NotApplicable("article has no image".into()))?;

        if is_stock_host(url) {
            return Ok(SignalOutcome::new(0.2, 0.8, "Image hosted on a stock photography site"));
        }
        let meta = self.inspector.inspect(url).await?;
        Ok(self.judge(&meta, article.published_at, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct Fixed(Result<ImageMeta, ScrapeError>);

    #[async_trait]
    impl ImageInspector for Fixed {
        async fn inspect(&self, _url: &str) -> Result<ImageMeta, ScrapeError> {
            self.0.clone()
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 3, 12, 0, 0).unwrap()
    }

    fn art(image: Option<&str>) -> Article {
        Article::new("T", "", "https://x", "S", now(), now(), image.map(str::to_string))
    }

    fn jpeg_with(datetime: &str) -> Vec<u8> {
        let mut b = vec![0xFF, 0xD8, 0xFF, 0xE1, 0x00, 0x40];
        b.extend_from_slice(b"Exif\0\0MM\0*");
        b.extend_from_slice(datetime.as_bytes());
        b.push(0);
        b
    }

    #[test]
    fn parses_exif_datetime() {
        let meta = ImageMeta::from_bytes(&jpeg_with("2025:10:02 08:30:00"));
        assert!(meta.has_exif);
        assert_eq!(meta.captured_at, Some(Utc.with_ymd_and_hms(2025, 10, 2, 8, 30, 0).unwrap()));
        assert_eq!(ImageMeta::from_bytes(b"\x89PNG plain"), ImageMeta::default());
    }

    #[test]
    fn stock_hosts() {
        assert!(is_stock_host("https://www.shutterstock.com/image-photo/123"));
        assert!(is_stock_host("https://images.unsplash.com/photo-1"));
        assert!(!is_stock_host("https://cdn.thehindu.com/img.jpg"));
    }

    #[tokio::test]
    async fn stock_photo_skips_download() {
        let s = ImageSignal::new(Arc::new(Fixed(Err(ScrapeError::Timeout))));
        let o = s.check(&art(Some("https://media.gettyimages.com/a.jpg")), now()).await.unwrap();
        assert!((o.score - 0.2).abs() < 1e-6);
    }

    #[tokio::test]
    async fn no_image_is_not_applicable() {
        let s = ImageSignal::new(Arc::new(Fixed(Ok(ImageMeta::default()))));
        let err = s.check(&art(None), now()).await.unwrap_err();
        assert!(matches!(err, ScrapeError::NotApplicable(_)));
    }

    #[tokio::test]
    async fn capture_time_consistency() {
        let meta = |d: DateTime<Utc>| ImageMeta {
            has_exif: true,
            captured_at: Some(d),
        };
        let img = Some("https://cdn.example/a.jpg");

        let ok = ImageSignal::new(Arc::new(Fixed(Ok(meta(now() - chrono::Duration::hours(5))))));
        assert!((ok.check(&art(img), now()).await.unwrap().score - 0.9).abs() < 1e-6);

        let old = ImageSignal::new(Arc::new(Fixed(Ok(meta(now() - chrono::Duration::days(400))))));
        assert!((old.check(&art(img), now()).await.unwrap().score - 0.3).abs() < 1e-6);

        let bare = ImageSignal::new(Arc::new(Fixed(Ok(ImageMeta::default()))));
        assert!((bare.check(&art(img), now()).await.unwrap().score - 0.55).abs() < 1e-6);
    }
}
