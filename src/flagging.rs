//! Flagging of low-trust articles.
//!
//! [`FlaggingPolicy`] is a pure threshold over a [`TrustScore`]. [`FlagLog`] keeps every
//! decision, append-only; a cleared article gets a new entry, nothing is removed.

use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::article::Article;
use crate::verify::TrustScore;

pub const DEFAULT_THRESHOLD: f32 = 0.65;

/// A signal below this score counts against the article.
const SIGNAL_FAIL_SCORE: f32 = 0.5;
/// ...but only when it is at least this sure of itself.
const SIGNAL_MIN_CONFIDENCE: f32 = 0.5;

pub const GENERIC_REASON: &str = "Overall verification score below threshold";

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("news_flagged_total", "Articles flagged below the trust threshold.");
    });
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlagDecision {
    pub flagged: bool,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct FlaggingPolicy {
    pub threshold: f32,
}

impl Default for FlaggingPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl FlaggingPolicy {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn evaluate(&self, score: &TrustScore) -> FlagDecision {
        if score.score >= self.threshold {
            return FlagDecision {
                flagged: false,
                reasons: Vec::new(),
            };
        }
        let mut reasons: Vec<String> = score
            .signals
            .iter()
            .filter(|s| s.score < SIGNAL_FAIL_SCORE && s.confidence >= SIGNAL_MIN_CONFIDENCE)
            .map(|s| s.name.failure_reason().to_string())
            .collect();
        if reasons.is_empty() {
            reasons.push(GENERIC_REASON.to_string());
        }
        FlagDecision {
            flagged: true,
            reasons,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedArticle {
    pub article_id: String,
    pub title: String,
    pub url: String,
    pub flagged_at: DateTime<Utc>,
    pub score: f32,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entry", rename_all = "snake_case")]
pub enum FlagEntry {
    Flagged(FlaggedArticle),
    Cleared {
        article_id: String,
        cleared_at: DateTime<Utc>,
        score: f32,
    },
}

impl FlagEntry {
    pub fn article_id(&self) -> &str {
        match self {
            FlagEntry::Flagged(f) => &f.article_id,
            FlagEntry::Cleared { article_id, .. } => article_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReasonCount {
    pub reason: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlagStats {
    pub total_flagged: usize,
    pub average_score: f32,
    pub common_reasons: Vec<ReasonCount>,
}

/// Append-only log of flag decisions, optionally mirrored to a JSON-lines file.
#[derive(Debug)]
pub struct FlagLog {
    entries: Mutex<Vec<FlagEntry>>,
    path: Option<PathBuf>,
}

impl FlagLog {
    pub fn in_memory() -> Self {
        ensure_metrics_described();
        Self {
            entries: Mutex::new(Vec::new()),
            path: None,
        }
    }

    /// Log backed by a JSON-lines file; existing lines are replayed, unreadable ones skipped.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        ensure_metrics_described();
        let path = path.into();
        let mut entries = Vec::new();
        match fs::File::open(&path) {
            Ok(f) => {
                for (n, line) in BufReader::new(f).lines().enumerate() {
                    let Ok(line) = line else { break };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<FlagEntry>(&line) {
                        Ok(e) => entries.push(e),
                        Err(e) => {
                            tracing::warn!(target: "flagging", line = n + 1, error = %e, "skipping bad flag log line")
                        }
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(target: "flagging", error = %e, "flag log unreadable, starting empty"),
        }
        Self {
            entries: Mutex::new(entries),
            path: Some(path),
        }
    }

    /// Apply a decision: a flag appends a record; a pass appends `Cleared` only if the
    /// article is currently flagged.
    pub fn record(&self, article: &Article, score: &TrustScore, decision: &FlagDecision) -> Option<FlagEntry> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let currently_flagged = entries
            .iter()
            .rev()
            .find(|e| e.article_id() == article.id)
            .is_some_and(|e| matches!(e, FlagEntry::Flagged(_)));

        let entry = if decision.flagged {
            counter!("news_flagged_total").increment(1);
            tracing::info!(
                target: "flagging",
                article_id = %article.id,
                score = score.score,
                reasons = decision.reasons.len(),
                "article flagged"
            );
            FlagEntry::Flagged(FlaggedArticle {
                article_id: article.id.clone(),
                title: article.title.clone(),
                url: article.url.clone(),
                flagged_at: score.computed_at,
                score: score.score,
                reasons: decision.reasons.clone(),
            })
        } else if currently_flagged {
            tracing::info!(target: "flagging", article_id = %article.id, score = score.score, "flag cleared");
            FlagEntry::Cleared {
                article_id: article.id.clone(),
                cleared_at: score.computed_at,
                score: score.score,
            }
        } else {
            return None;
        };

        if let Err(e) = self.append(&entry) {
            tracing::warn!(target: "flagging", error = %e, "flag log append failed");
        }
        entries.push(entry.clone());
        Some(entry)
    }

    fn append(&self, entry: &FlagEntry) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let mut line = serde_json::to_string(entry).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        line.push('\n');
        let mut f = OpenOptions::new().create(true).append(true).open(path)?;
        f.write_all(line.as_bytes())
    }

    /// Latest flag per article whose most recent entry is still a flag, newest first.
    pub fn active(&self, limit: usize) -> Vec<FlaggedArticle> {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for e in entries.iter().rev() {
            if !seen.insert(e.article_id().to_string()) {
                continue;
            }
            if let FlagEntry::Flagged(f) = e {
                out.push(f.clone());
            }
        }
        out.sort_by(|a, b| b.flagged_at.cmp(&a.flagged_at));
        out.truncate(limit);
        out
    }

    pub fn history(&self, article_id: &str) -> Vec<FlagEntry> {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries
            .iter()
            .filter(|e| e.article_id() == article_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Statistics over currently active flags.
    pub fn stats(&self) -> FlagStats {
        let active = self.active(usize::MAX);
        let total_flagged = active.len();
        let average_score = if total_flagged == 0 {
            0.0
        } else {
            active.iter().map(|f| f.score).sum::<f32>() / total_flagged as f32
        };

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for r in active.iter().flat_map(|f| f.reasons.iter()) {
            *counts.entry(r.as_str()).or_default() += 1;
        }
        let mut common: Vec<ReasonCount> = counts
            .into_iter()
            .map(|(reason, count)| ReasonCount {
                reason: reason.to_string(),
                count,
            })
            .collect();
        common.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.reason.cmp(&b.reason)));
        common.truncate(5);

        FlagStats {
            total_flagged,
            average_score,
            common_reasons: common,
        }
    }
}

impl Default for FlagLog {
    fn default() -> Self {
        Self::in_memory()
    }
}
