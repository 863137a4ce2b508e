use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::{SignalCheck, SignalKind, SignalOutcome};
use crate::article::{normalize_title, Article};
use crate::error::ScrapeError;

/// Wording that claims immediacy.
const URGENT_MARKERS: [&str; 5] = ["breaking", "just in", "today", "live", "happening now"];

/// Publication-date plausibility. Pure, never fails.
#[derive(Debug, Clone)]
pub struct TemporalSignal {
    /// Allowed clock skew before a date counts as "in the future".
    pub skew: Duration,
}

impl Default for TemporalSignal {
    fn default() -> Self {
        Self {
            skew: Duration::minutes(5),
        }
    }
}

impl TemporalSignal {
    pub fn assess(&self, article: &Article, now: DateTime<Utc>) -> SignalOutcome {
        let published = article.published_at;
        if published > now + self.skew {
            return SignalOutcome::new(0.1, 0.9, "Publication date is in the future");
        }

        let age = now - published;
        let padded = format!(" {} ", normalize_title(&article.title));
        let urgent = URGENT_MARKERS
            .iter()
            .any(|m| padded.contains(&format!(" {m} ")));
        if urgent && age > Duration::days(2) {
            return SignalOutcome::new(
                0.35,
                0.7,
                format!("Presented as breaking but {} days old", age.num_days()),
            );
        }

        if age < Duration::days(1) {
            SignalOutcome::new(0.95, 0.8, "Published within the last day")
        } else if age <= Duration::days(7) {
            SignalOutcome::new(0.85, 0.7, "Published within the last week")
        } else if age <= Duration::days(30) {
            SignalOutcome::new(0.6, 0.6, "Older than a week")
        } else {
            SignalOutcome::new(0.4, 0.6, "Older than a month")
        }
    }
}

#[async_trait]
impl SignalCheck for TemporalSignal {
    fn kind(&self) -> SignalKind {
        SignalKind::Temporal
    }

    async fn check(&self, article: &Article, now: DateTime<Utc>) -> Result<SignalOutcome, ScrapeError> {
        Ok(self.assess(article, now))
    }
}
