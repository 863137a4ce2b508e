//! Per-adapter request quota ("N requests per day") with fail-fast semantics.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use crate::error::AdapterError;

#[derive(Debug)]
pub struct RateLimitBook {
    limit: Option<u32>,
    window: Duration,
    state: Mutex<BookState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookState {
    pub count: u32,
    pub reset_at: Option<DateTime<Utc>>,
    /// Set by an upstream 429; nothing is sent before this instant.
    pub blocked_until: Option<DateTime<Utc>>,
}

impl RateLimitBook {
    /// `limit = None` means unmetered (RSS, fixtures).
    pub fn new(limit: Option<u32>, window: Duration) -> Self {
        Self {
            limit,
            window,
            state: Mutex::new(BookState {
                count: 0,
                reset_at: None,
                blocked_until: None,
            }),
        }
    }

    pub fn daily(limit: Option<u32>) -> Self {
        Self::new(limit, Duration::days(1))
    }

    pub fn unmetered() -> Self {
        Self::new(None, Duration::days(1))
    }

    /// Reserve one request or fail with `RateLimited`.
    pub fn try_acquire(&self, now: DateTime<Utc>) -> Result<(), AdapterError> {
        let mut s = self.state.lock().unwrap_or_else(|p| p.into_inner());

        if let Some(until) = s.blocked_until {
            if now < until {
                return Err(AdapterError::RateLimited {
                    reset_at: Some(until),
                });
            }
            s.blocked_until = None;
        }

        match s.reset_at {
            Some(reset) if now < reset => {}
            _ => {
                s.count = 0;
                s.reset_at = Some(now + self.window);
            }
        }

        if let Some(limit) = self.limit {
            if s.count >= limit {
                return Err(AdapterError::RateLimited {
                    reset_at: s.reset_at,
                });
            }
        }
        s.count = s.count.saturating_add(1);
        Ok(())
    }

    /// Upstream said 429: block until `retry_after`, or until the window resets.
    pub fn exhaust(&self, now: DateTime<Utc>, retry_after: Option<Duration>) -> Option<DateTime<Utc>> {
        let mut s = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let window_end = s
            .reset_at
            .filter(|r| *r > now)
            .or_else(|| now.checked_add_signed(self.window))
            .unwrap_or(now);
        let until = retry_after
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(window_end);
        s.blocked_until = Some(until);
        Some(until)
    }

    pub fn snapshot(&self) -> BookState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}
