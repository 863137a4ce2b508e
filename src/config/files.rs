//! Structured config files (TOML or JSON) with mtime-based hot reload.
//!
//! Format is picked by extension; unknown extensions try TOML, then JSON.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::SystemTime;

use serde::de::DeserializeOwned;

use crate::error::ConfigError;

/// Load and deserialize a config file.
pub fn load_structured<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_structured(&content, &ext).map_err(|message| ConfigError::Parse {
        path: path.display().to_string(),
        message,
    })
}

fn parse_structured<T: DeserializeOwned>(s: &str, hint_ext: &str) -> Result<T, String> {
    match hint_ext {
        "toml" => toml::from_str(s).map_err(|e| e.to_string()),
        "json" => serde_json::from_str(s).map_err(|e| e.to_string()),
        _ => toml::from_str(s)
            .map_err(|e| e.to_string())
            .or_else(|_| serde_json::from_str(s).map_err(|e| e.to_string())),
    }
}

/// Pick the config path: explicit (env) path first, then the first existing fallback.
/// An explicit path is returned even if missing so callers can report it.
pub fn resolve_path(explicit: Option<&Path>, fallbacks: &[&str]) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }
    fallbacks
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

/// Hot-reload wrapper: reloads when the file's modified time changes.
/// A missing or broken file keeps the last good value (initially `fallback`).
#[derive(Debug)]
pub struct HotReload<T> {
    path: Option<PathBuf>,
    inner: RwLock<State<T>>,
}

#[derive(Debug)]
struct State<T> {
    value: T,
    last_modified: Option<SystemTime>,
}

impl<T: DeserializeOwned + Clone> HotReload<T> {
    pub fn new(path: Option<PathBuf>, fallback: T) -> Self {
        Self {
            path,
            inner: RwLock::new(State {
                value: fallback,
                last_modified: None,
            }),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Latest value, reloading first if the file changed.
    pub fn current(&self) -> T {
        let Some(path) = self.path.as_deref() else {
            return self.read_value();
        };

        // Fast path: compare mtime under the read lock.
        let mtime = match fs::metadata(path).and_then(|m| m.modified()) {
            Ok(m) => m,
            Err(_) => return self.read_value(),
        };
        let changed = match self.inner.read() {
            Ok(g) => g.last_modified != Some(mtime),
            Err(p) => p.into_inner().last_modified != Some(mtime),
        };
        if !changed {
            return self.read_value();
        }

        // Slow path: reload under the write lock; double-check for races.
        let mut guard = match self.inner.write() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        if guard.last_modified != Some(mtime) {
            match load_structured::<T>(path) {
                Ok(v) => {
                    guard.value = v;
                    tracing::info!(target: "config", path = %path.display(), "config reloaded");
                }
                Err(e) => {
                    tracing::warn!(target: "config", error = %e, "config reload failed, keeping previous");
                }
            }
            // Remember the mtime even on failure so a broken file isn't re-parsed per call.
            guard.last_modified = Some(mtime);
        }
        guard.value.clone()
    }

    /// Force a reload regardless of mtime. Returns the load error, if any.
    pub fn reload(&self) -> Result<T, ConfigError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(self.read_value());
        };
        let v = load_structured::<T>(path)?;
        let mtime = fs::metadata(path).and_then(|m| m.modified()).ok();
        let mut guard = match self.inner.write() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        guard.value = v.clone();
        guard.last_modified = mtime;
        Ok(v)
    }

    fn read_value(&self) -> T {
        match self.inner.read() {
            Ok(g) => g.value.clone(),
            Err(p) => p.into_inner().value.clone(),
        }
    }
}
