//! # Article model
//! Provider-agnostic news item plus the text normalization used for identity.
//!
//! `Article::id` is derived from `(normalized title, source, UTC publish date)`, so a
//! re-fetch of the same story from the same outlet lands on the same id and overwrites
//! the previous copy.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Topical label. Open set: the taxonomy lives in configuration, not in code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    pub const GENERAL: &'static str = "General";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into().trim().to_string())
    }

    pub fn general() -> Self {
        Self(Self::GENERAL.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive label comparison (query params arrive in any case).
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other.trim())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub body: String,
    pub url: String,
    pub source_name: String,
    pub published_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub categories: BTreeSet<Category>,
}

impl Article {
    /// Build an article, deriving its id. Title and body are cleaned of markup.
    pub fn new(
        title: &str,
        body: &str,
        url: &str,
        source_name: &str,
        published_at: DateTime<Utc>,
        fetched_at: DateTime<Utc>,
        image_url: Option<String>,
    ) -> Self {
        let title = clean_text(title);
        let source_name = source_name.trim().to_string();
        let id = article_id(&title, &source_name, published_at);
        Self {
            id,
            title,
            body: clean_text(body),
            url: url.trim().to_string(),
            source_name,
            published_at,
            fetched_at,
            image_url: image_url
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty()),
            categories: BTreeSet::new(),
        }
    }

    /// Title + body, used by the text-scanning signals.
    pub fn text(&self) -> String {
        if self.body.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.title, self.body)
        }
    }
}

/// Deterministic content id: SHA-256 over the identity triple, first 16 bytes as hex.
pub fn article_id(title: &str, source_name: &str, published_at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_title(title).as_bytes());
    hasher.update(b"\x1f");
    hasher.update(source_name.trim().to_lowercase().as_bytes());
    hasher.update(b"\x1f");
    hasher.update(published_at.format("%Y-%m-%d").to_string().as_bytes());
    let digest = hasher.finalize();

    let mut out = String::with_capacity(32);
    for b in digest.iter().take(16) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Clean provider text: decode entities, strip tags, unify quotes, collapse whitespace.
pub fn clean_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("ws regex"));
    re_ws.replace_all(&out, " ").trim().to_string()
}

/// Identity form of a title: lowercase alphanumeric tokens joined by single spaces.
/// Punctuation, dashes and currency signs are separators.
pub fn normalize_title(title: &str) -> String {
    title_tokens(title).join(" ")
}

/// Tokens of the normalized title, in order (duplicates kept).
pub fn title_tokens(title: &str) -> Vec<String> {
    clean_text(title)
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
