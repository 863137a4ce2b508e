//! # Categorizer
//! Deterministic multi-label keyword rules.
//!
//! File shape (`config/categories.toml`):
//! ```toml
//! body_chars = 500
//!
//! [[category]]
//! name = "Sports"
//! keywords = ["cricket", "ipl", "world cup"]
//! ```
//! A category matches when any keyword occurs in the title or the first `body_chars`
//! characters of the body (case-insensitive, whole words). No match → `General`.
//! The file is re-read when its mtime changes; a broken file keeps the last good rules.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::RwLock;

use regex::Regex;
use serde::Deserialize;

use crate::article::{Article, Category};
use crate::config::files::{resolve_path, HotReload};
use crate::error::ConfigError;

const DEFAULT_BODY_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CategoryRule {
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CategoryRules {
    #[serde(default = "default_body_chars")]
    pub body_chars: usize,
    #[serde(rename = "category", default)]
    pub categories: Vec<CategoryRule>,
}

fn default_body_chars() -> usize {
    DEFAULT_BODY_CHARS
}

impl CategoryRules {
    /// Built-in taxonomy, used when no rules file is found.
    pub fn default_seed() -> Self {
        let table: [(&str, &[&str]); 10] = [
            ("Politics", &["election", "government", "minister", "parliament", "pm modi", "congress", "bjp", "policy", "supreme court"]),
            ("Sports", &["cricket", "football", "sports", "player", "match", "ipl", "world cup", "olympics", "fifa"]),
            ("Technology", &["tech", "ai", "smartphone", "app", "google", "apple", "software", "ai/ml", "startup", "innovation"]),
            ("Entertainment", &["film", "actor", "bollywood", "celebrity", "music", "movie", "netflix", "series", "award"]),
            ("Business", &["economy", "market", "stock", "business", "company", "rupee", "gdp", "trade", "investment", "budget"]),
            ("Health", &["health", "hospital", "doctor", "disease", "covid", "vaccine", "medicine", "treatment"]),
            ("Crime", &["crime", "police", "arrest", "murder", "theft", "scam", "fraud", "investigation"]),
            ("Weather", &["rain", "weather", "cyclone", "temperature", "forecast", "flood", "storm", "monsoon"]),
            ("Accident", &["accident", "crash", "collision", "injured", "died", "fatal"]),
            ("International", &["g20", "russia", "china", "usa", "pakistan", "dubai", "international", "global"]),
        ];
        Self {
            body_chars: DEFAULT_BODY_CHARS,
            categories: table
                .iter()
                .map(|(name, kws)| CategoryRule {
                    name: name.to_string(),
                    keywords: kws.iter().map(|k| k.to_string()).collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug)]
struct Compiled {
    source: CategoryRules,
    rules: Vec<(Category, Regex)>,
}

impl Compiled {
    fn build(source: CategoryRules) -> Self {
        let mut rules = Vec::with_capacity(source.categories.len());
        for rule in &source.categories {
            let alts: Vec<String> = rule
                .keywords
                .iter()
                .map(|k| k.trim())
                .filter(|k| !k.is_empty())
                .map(keyword_pattern)
                .collect();
            if alts.is_empty() {
                continue;
            }
            match Regex::new(&format!("(?i)(?:{})", alts.join("|"))) {
                Ok(re) => rules.push((Category::new(&rule.name), re)),
                Err(e) => {
                    tracing::warn!(target: "config", category = %rule.name, error = %e, "category rule skipped")
                }
            }
        }
        Self { source, rules }
    }
}

/// `\b` only on sides that start/end with a word character, so "ai/ml" and "g20" both work.
fn keyword_pattern(kw: &str) -> String {
    let is_word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_');
    let mut p = String::new();
    if is_word(kw.chars().next()) {
        p.push_str(r"\b");
    }
    p.push_str(&regex::escape(kw));
    if is_word(kw.chars().last()) {
        p.push_str(r"\b");
    }
    p
}

pub struct Categorizer {
    file: HotReload<CategoryRules>,
    compiled: RwLock<Compiled>,
}

impl Categorizer {
    /// Fixed rules, no file.
    pub fn with_rules(rules: CategoryRules) -> Self {
        Self {
            file: HotReload::new(None, rules.clone()),
            compiled: RwLock::new(Compiled::build(rules)),
        }
    }

    /// Rules from `path` (or `config/categories.{toml,json}`), falling back to the seed.
    pub fn from_path(path: Option<PathBuf>) -> Self {
        let resolved = resolve_path(
            path.as_deref(),
            &["config/categories.toml", "config/categories.json"],
        );
        let seed = CategoryRules::default_seed();
        let file = HotReload::new(resolved, seed.clone());
        let initial = file.current();
        tracing::info!(
            target: "config",
            path = ?file.path(),
            categories = initial.categories.len(),
            "category rules loaded"
        );
        Self {
            file,
            compiled: RwLock::new(Compiled::build(initial)),
        }
    }

    /// Labels for one article; never empty.
    pub fn classify(&self, article: &Article) -> BTreeSet<Category> {
        self.refresh_if_changed(self.file.current());
        let guard = self.compiled.read().unwrap_or_else(|p| p.into_inner());

        let head: String = article.body.chars().take(guard.source.body_chars).collect();
        let mut out: BTreeSet<Category> = guard
            .rules
            .iter()
            .filter(|(_, re)| re.is_match(&article.title) || re.is_match(&head))
            .map(|(c, _)| c.clone())
            .collect();
        if out.is_empty() {
            out.insert(Category::general());
        }
        out
    }

    /// Set `categories` on every article in place.
    pub fn apply(&self, articles: &mut [Article]) {
        for a in articles.iter_mut() {
            a.categories = self.classify(a);
        }
    }

    /// Forced reload; returns the number of active rules.
    pub fn reload(&self) -> Result<usize, ConfigError> {
        let rules = self.file.reload()?;
        self.refresh_if_changed(rules);
        Ok(self.compiled.read().unwrap_or_else(|p| p.into_inner()).rules.len())
    }

    /// Category names in rule order.
    pub fn categories(&self) -> Vec<String> {
        let guard = self.compiled.read().unwrap_or_else(|p| p.into_inner());
        guard.rules.iter().map(|(c, _)| c.to_string()).collect()
    }

    fn refresh_if_changed(&self, latest: CategoryRules) {
        {
            let guard = self.compiled.read().unwrap_or_else(|p| p.into_inner());
            if guard.source == latest {
                return;
            }
        }
        let rebuilt = Compiled::build(latest);
        let mut guard = self.compiled.write().unwrap_or_else(|p| p.into_inner());
        *guard = rebuilt;
    }
}

impl Default for Categorizer {
    fn default() -> Self {
        Self::with_rules(CategoryRules::default_seed())
    }
}
