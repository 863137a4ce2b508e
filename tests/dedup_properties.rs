// tests/dedup_properties.rs
//
// Cross-provider dedup on the recorded fixtures, plus idempotence over seeded random
// batches of near-duplicate headlines.

mod common;

use std::time::Duration;

use chrono::{TimeZone, Utc};
use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::{Rng, SeedableRng};

use infosphere_news::article::normalize_title;
use infosphere_news::dedup::{DedupParams, Deduplicator};
use infosphere_news::ingest::types::SourceAdapter;
use infosphere_news::Article;

use common::fixture_adapters;

#[tokio::test]
async fn budget_story_from_every_provider_collapses_to_one() {
    let mut raw = Vec::new();
    for a in fixture_adapters() {
        raw.extend(a.fetch(None, 50).await.expect("fixture parses"));
    }
    assert_eq!(raw.len(), 7);

    let out = Deduplicator::default().run(raw);
    let budget: Vec<&Article> = out
        .articles
        .iter()
        .filter(|a| normalize_title(&a.title) == "budget announced 500cr scheme for farmers")
        .collect();
    assert_eq!(budget.len(), 1, "one budget story survives");

    let kept = budget[0];
    let sources = &out.provenance[&kept.id];
    assert_eq!(
        sources,
        &vec![
            "Indian Express".to_string(),
            "Livemint".to_string(),
            "National Desk".to_string(),
            "The Hindu".to_string(),
        ]
    );
    assert_eq!(out.cross_refs.iter().filter(|c| c.kept_id == kept.id).count(), 3);
    // 7 raw → budget + cricket + rain + robbery
    assert_eq!(out.articles.len(), 4);
}

#[test]
fn punctuation_variants_across_three_providers_merge() {
    let t = Utc.with_ymd_and_hms(2025, 10, 3, 6, 0, 0).unwrap();
    let arts = vec![
        Article::new("Budget announced, ₹500cr scheme", "short", "https://a", "NewsAPI Wire", t, t, None),
        Article::new("Budget announced: ₹500cr scheme", "a much longer body text", "https://b", "GNews Wire", t, t, None),
        Article::new("BUDGET ANNOUNCED — ₹500cr scheme", "mid body", "https://c", "NewsData Wire", t, t, None),
    ];
    let out = Deduplicator::default().run(arts);
    assert_eq!(out.articles.len(), 1);
    assert_eq!(out.articles[0].source_name, "GNews Wire", "longest body wins");
    assert_eq!(out.provenance[&out.articles[0].id].len(), 3);
}

const SUBJECTS: [&str; 6] = ["Budget", "Monsoon", "Election", "Cricket", "Metro", "Vaccine"];
const VERBS: [&str; 4] = ["announced", "delayed", "approved", "reviewed"];
const TAILS: [&str; 4] = ["for farmers", "in Delhi", "after talks", "by cabinet"];
const SOURCES: [&str; 5] = ["PTI", "ANI", "NDTV", "The Hindu", "Livemint"];

fn random_batch(rng: &mut StdRng, n: usize) -> Vec<Article> {
    let base = Utc.with_ymd_and_hms(2025, 10, 3, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let mut title = format!(
                "{} {} {}",
                SUBJECTS.choose(rng).unwrap(),
                VERBS.choose(rng).unwrap(),
                TAILS.choose(rng).unwrap()
            );
            if rng.random_bool(0.3) {
                title = title.to_uppercase();
            }
            if rng.random_bool(0.3) {
                title.push('!');
            }
            let published = base + chrono::Duration::minutes(rng.random_range(0..24 * 60));
            let body = "x".repeat(rng.random_range(0..40));
            Article::new(
                &title,
                &body,
                &format!("https://n.example/{i}"),
                SOURCES.choose(rng).unwrap(),
                published,
                published,
                None,
            )
        })
        .collect()
}

#[test]
fn dedup_is_idempotent_on_random_batches() {
    let mut rng = StdRng::seed_from_u64(0x5eed_2025);
    let dedup = Deduplicator::new(DedupParams {
        similarity: 0.85,
        window: Duration::from_secs(6 * 3600),
    });

    for round in 0..25 {
        let mut batch = random_batch(&mut rng, 60);
        batch.shuffle(&mut rng);

        let once = dedup.run(batch);
        let twice = dedup.run(once.articles.clone());
        let ids = |v: &[Article]| v.iter().map(|a| a.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&twice.articles), ids(&once.articles), "round {round}");
        assert!(twice.cross_refs.is_empty(), "round {round}: second pass merged again");
    }
}

#[test]
fn every_input_is_kept_or_cross_referenced() {
    let mut rng = StdRng::seed_from_u64(7);
    let batch = random_batch(&mut rng, 80);
    let input_ids: Vec<String> = batch.iter().map(|a| a.id.clone()).collect();
    let out = Deduplicator::default().run(batch);
    for id in input_ids {
        let kept = out.articles.iter().any(|a| a.id == id);
        let referenced = out.cross_refs.iter().any(|c| c.duplicate_id == id);
        assert!(kept || referenced, "article {id} vanished");
    }
}
