//! # Cache Store
//! Time-boxed snapshot of the last successful merged fetch.
//!
//! Lifecycle: created once at startup (optionally re-hydrated from disk), written only
//! by the fetch orchestrator after a successful cycle, read by everyone else through
//! [`CacheStore::fresh`] / [`CacheStore::stale`]. Writers take the exclusive lock,
//! readers the shared one; a stale read is always allowed.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::gauge;
use serde::{Deserialize, Serialize};

use crate::article::Article;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub snapshot: Vec<Article>,
    pub fetched_at: DateTime<Utc>,
    #[serde(with = "duration_secs")]
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.fetched_at).to_std().unwrap_or_default()
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.age(now) < self.ttl
    }
}

#[derive(Debug)]
pub struct CacheStore {
    inner: RwLock<Option<Arc<CacheEntry>>>,
    ttl: Duration,
    persist_path: Option<PathBuf>,
}

impl CacheStore {
    /// In-memory store with the given freshness window.
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(None),
            ttl,
            persist_path: None,
        }
    }

    /// Store backed by a JSON snapshot file; an existing snapshot is loaded now.
    /// A corrupt or missing file starts empty.
    pub fn with_persistence(ttl: Duration, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let loaded = match read_snapshot(&path) {
            Ok(entry) => {
                tracing::info!(
                    target: "cache",
                    articles = entry.snapshot.len(),
                    fetched_at = %entry.fetched_at,
                    "cache snapshot restored"
                );
                Some(Arc::new(CacheEntry { ttl, ..entry }))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(target: "cache", error = %e, "cache snapshot unreadable, starting empty");
                None
            }
        };
        Self {
            inner: RwLock::new(loaded),
            ttl,
            persist_path: Some(path),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Replace the snapshot. Only the fetch orchestrator calls this, and only after a
    /// cycle in which at least one adapter succeeded.
    pub(crate) fn replace(&self, snapshot: Vec<Article>, fetched_at: DateTime<Utc>) -> Arc<CacheEntry> {
        let entry = Arc::new(CacheEntry {
            snapshot,
            fetched_at,
            ttl: self.ttl,
        });
        {
            let mut guard = self.inner.write().unwrap_or_else(|p| p.into_inner());
            *guard = Some(entry.clone());
        }
        gauge!("news_cache_articles").set(entry.snapshot.len() as f64);

        if let Some(path) = &self.persist_path {
            if let Err(e) = write_snapshot(path, &entry) {
                tracing::warn!(target: "cache", error = %e, "cache snapshot write failed");
            }
        }
        entry
    }

    /// Snapshot only if still inside its TTL.
    pub fn fresh(&self, now: DateTime<Utc>) -> Option<Arc<CacheEntry>> {
        self.current().filter(|e| e.is_fresh(now))
    }

    /// Any non-empty snapshot, regardless of age.
    pub fn stale(&self) -> Option<Arc<CacheEntry>> {
        self.current().filter(|e| !e.snapshot.is_empty())
    }

    /// Last snapshot as stored (possibly empty).
    pub fn current(&self) -> Option<Arc<CacheEntry>> {
        let guard = self.inner.read().unwrap_or_else(|p| p.into_inner());
        guard.clone()
    }

    pub fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        let age = self.current().map(|e| e.age(now));
        if let Some(a) = age {
            gauge!("news_cache_age_secs").set(a.as_secs_f64());
        }
        age
    }

    pub fn is_empty(&self) -> bool {
        self.stale().is_none()
    }
}

fn read_snapshot(path: &Path) -> io::Result<CacheEntry> {
    let s = fs::read_to_string(path)?;
    serde_json::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Atomic write: temp file + rename.
fn write_snapshot(path: &Path, entry: &CacheEntry) -> io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_vec(entry).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut f = fs::File::create(&tmp)?;
    f.write_all(&json)?;
    f.sync_all()?;
    fs::rename(tmp, path)
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn article(title: &str) -> Article {
        let t = Utc.with_ymd_and_hms(2025, 10, 3, 9, 0, 0).unwrap();
        Article::new(title, "body", "https://example.org/a", "PTI", t, t, None)
    }

    fn at(min: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 3, 10, 0, 0).unwrap() + chrono::Duration::minutes(min)
    }

    #[test]
    fn empty_store_serves_nothing() {
        let c = CacheStore::new(Duration::from_secs(60));
        assert!(c.fresh(at(0)).is_none());
        assert!(c.stale().is_none());
        assert!(c.is_empty());
    }

    #[test]
    fn fresh_until_ttl_then_only_stale() {
        let c = CacheStore::new(Duration::from_secs(120 * 60));
        c.replace(vec![article("a")], at(0));
        assert!(c.fresh(at(119)).is_some());
        assert!(c.fresh(at(120)).is_none());
        let stale = c.stale().expect("stale read always allowed");
        assert_eq!(stale.snapshot.len(), 1);
        assert_eq!(c.age(at(30)), Some(Duration::from_secs(30 * 60)));
    }

    #[test]
    fn empty_snapshot_is_not_served_stale() {
        let c = CacheStore::new(Duration::from_secs(60));
        c.replace(vec![], at(0));
        assert!(c.stale().is_none());
        assert!(c.current().is_some());
    }

    #[test]
    fn snapshot_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/news_cache.json");
        {
            let c = CacheStore::with_persistence(Duration::from_secs(60), &path);
            c.replace(vec![article("kept across restarts")], at(0));
        }
        let c2 = CacheStore::with_persistence(Duration::from_secs(300), &path);
        let e = c2.stale().expect("restored");
        assert_eq!(e.snapshot[0].title, "kept across restarts");
        assert_eq!(e.fetched_at, at(0));
        assert_eq!(e.ttl, Duration::from_secs(300));
    }

    #[test]
    fn corrupt_snapshot_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("news_cache.json");
        fs::write(&path, "{not json").unwrap();
        let c = CacheStore::with_persistence(Duration::from_secs(60), &path);
        assert!(c.is_empty());
    }
}
