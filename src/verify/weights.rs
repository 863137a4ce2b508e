//! Signal weights and the renormalization arithmetic.
//!
//! JSON shape (`config/verification.json`):
//! {
//!   "weights": {
//!     "official_source": 0.35, "fact_check": 0.25, "source_credibility": 0.15,
//!     "image_authenticity": 0.15, "temporal": 0.10
//!   }
//! }
//!
//! A file with negative, non-finite or all-zero weights is ignored (defaults apply).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::SignalKind;
use crate::config::files::{resolve_path, HotReload};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignalWeights {
    pub official_source: f32,
    pub fact_check: f32,
    pub source_credibility: f32,
    pub image_authenticity: f32,
    pub temporal: f32,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            official_source: 0.35,
            fact_check: 0.25,
            source_credibility: 0.15,
            image_authenticity: 0.15,
            temporal: 0.10,
        }
    }
}

impl SignalWeights {
    pub fn get(&self, kind: SignalKind) -> f32 {
        match kind {
            SignalKind::OfficialSource => self.official_source,
            SignalKind::FactCheck => self.fact_check,
            SignalKind::SourceCredibility => self.source_credibility,
            SignalKind::ImageAuthenticity => self.image_authenticity,
            SignalKind::Temporal => self.temporal,
        }
    }

    pub fn is_valid(&self) -> bool {
        let all = SignalKind::ALL.map(|k| self.get(k));
        all.iter().all(|w| w.is_finite() && *w >= 0.0) && all.iter().sum::<f32>() > 0.0
    }

    /// Self if valid, otherwise the defaults.
    pub fn validated(self) -> Self {
        if self.is_valid() {
            self
        } else {
            tracing::warn!(target: "verify", weights = ?self, "invalid signal weights, using defaults");
            Self::default()
        }
    }
}

/// Weights of the executed signals scaled to sum to 1.0, in input order.
///
/// If every executed signal has weight 0 they share equally. Empty in, empty out.
pub fn renormalize(weights: &SignalWeights, executed: &[SignalKind]) -> Vec<(SignalKind, f32)> {
    if executed.is_empty() {
        return Vec::new();
    }
    let total: f32 = executed.iter().map(|k| weights.get(*k)).sum();
    if total <= 0.0 {
        let even = 1.0 / executed.len() as f32;
        return executed.iter().map(|k| (*k, even)).collect();
    }
    executed.iter().map(|k| (*k, weights.get(*k) / total)).collect()
}

/// Σ weight·score over `(weight, score)` pairs, clamped to [0, 1]; `None` when empty.
pub fn weighted_score<I>(pairs: I) -> Option<f32>
where
    I: IntoIterator<Item = (f32, f32)>,
{
    let mut any = false;
    let mut acc = 0.0f32;
    for (w, s) in pairs {
        any = true;
        acc += w * s;
    }
    any.then_some(acc.clamp(0.0, 1.0))
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
struct WeightsFile {
    weights: SignalWeights,
}

/// Hot-reloaded weights (file optional).
pub struct WeightsSource {
    inner: HotReload<WeightsFile>,
}

impl WeightsSource {
    pub fn fixed(weights: SignalWeights) -> Self {
        Self {
            inner: HotReload::new(None, WeightsFile { weights }),
        }
    }

    /// `path` or `config/verification.json`, defaults when absent.
    pub fn from_path(path: Option<PathBuf>) -> Self {
        let resolved = resolve_path(path.as_deref(), &["config/verification.json"]);
        Self {
            inner: HotReload::new(
                resolved,
                WeightsFile {
                    weights: SignalWeights::default(),
                },
            ),
        }
    }

    pub fn current(&self) -> SignalWeights {
        self.inner.current().weights.validated()
    }
}
