//! Near-duplicate collapse across providers.
//!
//! Two articles are duplicates if their ids match, or if their normalized titles have
//! token Jaccard similarity ≥ `similarity` AND were published within `window` of each
//! other AND come from different outlets. The richer copy survives; the others become
//! cross-references, and every surviving article carries the list of outlets that
//! reported it (provenance, used to damp circular reporting).
//!
//! Merging is repeated until a pass makes no change, so `run(run(x)) == run(x)`.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use metrics::counter;
use serde::Serialize;

use crate::article::{title_tokens, Article};
use crate::config::PipelineConfig;

#[derive(Clone, Debug)]
pub struct DedupParams {
    /// Token Jaccard threshold in [0.0, 1.0].
    pub similarity: f32,
    /// Max distance between publish times of two near-duplicates.
    pub window: Duration,
}

impl Default for DedupParams {
    fn default() -> Self {
        Self {
            similarity: 0.85,
            window: Duration::from_secs(6 * 3600),
        }
    }
}

impl From<&PipelineConfig> for DedupParams {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            similarity: cfg.dedup_similarity,
            window: cfg.dedup_window,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossReference {
    /// Surviving article.
    pub kept_id: String,
    pub duplicate_id: String,
    pub duplicate_source: String,
}

#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    /// Newest first.
    pub articles: Vec<Article>,
    /// Surviving id → outlets that carried the story (sorted, unique).
    pub provenance: BTreeMap<String, Vec<String>>,
    pub cross_refs: Vec<CrossReference>,
}

#[derive(Debug, Clone)]
pub struct Deduplicator {
    params: DedupParams,
}

#[derive(Debug)]
struct Cluster {
    rep: Article,
    tokens: BTreeSet<String>,
    /// (id, source) of every article folded into this cluster, rep included.
    members: Vec<(String, String)>,
}

impl Cluster {
    fn new(a: Article) -> Self {
        Self {
            tokens: token_set(&a.title),
            members: vec![(a.id.clone(), a.source_name.clone())],
            rep: a,
        }
    }

    fn absorb(&mut self, other: Cluster) {
        self.members.extend(other.members);
        if is_richer(&other.rep, &self.rep) {
            self.rep = other.rep;
            self.tokens = other.tokens;
        }
    }
}

impl Deduplicator {
    pub fn new(mut params: DedupParams) -> Self {
        params.similarity = params.similarity.clamp(0.0, 1.0);
        Self { params }
    }

    pub fn params(&self) -> &DedupParams {
        &self.params
    }

    pub fn run(&self, articles: Vec<Article>) -> DedupOutcome {
        let input_len = articles.len();
        let mut clusters: Vec<Cluster> = articles.into_iter().map(Cluster::new).collect();

        loop {
            clusters.sort_by(|a, b| {
                a.rep
                    .published_at
                    .cmp(&b.rep.published_at)
                    .then_with(|| a.rep.id.cmp(&b.rep.id))
            });
            let before = clusters.len();
            let mut out: Vec<Cluster> = Vec::with_capacity(before);
            for c in clusters {
                match out.iter().position(|o| self.is_duplicate(o, &c)) {
                    Some(k) => out[k].absorb(c),
                    None => out.push(c),
                }
            }
            clusters = out;
            if clusters.len() == before {
                break;
            }
        }

        let merged = input_len - clusters.len();
        if merged > 0 {
            counter!("news_dedup_merged_total").increment(merged as u64);
        }
        tracing::debug!(target: "ingest", input = input_len, kept = clusters.len(), merged, "dedup done");

        clusters.sort_by(|a, b| {
            b.rep
                .published_at
                .cmp(&a.rep.published_at)
                .then_with(|| b.rep.id.cmp(&a.rep.id))
        });

        let mut outcome = DedupOutcome::default();
        for c in clusters {
            let kept_id = c.rep.id.clone();
            let mut sources: Vec<String> = c.members.iter().map(|(_, s)| s.clone()).collect();
            sources.sort();
            sources.dedup();
            for (id, source) in c.members {
                if id != kept_id {
                    outcome.cross_refs.push(CrossReference {
                        kept_id: kept_id.clone(),
                        duplicate_id: id,
                        duplicate_source: source,
                    });
                }
            }
            outcome.provenance.insert(kept_id, sources);
            outcome.articles.push(c.rep);
        }
        outcome
    }

    fn is_duplicate(&self, a: &Cluster, b: &Cluster) -> bool {
        if a.rep.id == b.rep.id {
            return true;
        }
        if a.rep.source_name.eq_ignore_ascii_case(&b.rep.source_name) {
            return false;
        }
        let gap = (a.rep.published_at - b.rep.published_at).abs();
        if gap.to_std().map_or(true, |g| g > self.params.window) {
            return false;
        }
        jaccard(&a.tokens, &b.tokens) >= self.params.similarity
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DedupParams::default())
    }
}

fn token_set(title: &str) -> BTreeSet<String> {
    title_tokens(title).into_iter().collect()
}

/// |A ∩ B| / |A ∪ B|; two empty sets are not similar.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f32 / union as f32
}

/// Longer body, then has image, then published earlier, then source name.
fn is_richer(a: &Article, b: &Article) -> bool {
    let ord = a
        .body
        .chars()
        .count()
        .cmp(&b.body.chars().count())
        .then_with(|| a.image_url.is_some().cmp(&b.image_url.is_some()))
        .then_with(|| b.published_at.cmp(&a.published_at))
        .then_with(|| b.source_name.cmp(&a.source_name))
        .then_with(|| b.id.cmp(&a.id));
    ord == Ordering::Greater
}
