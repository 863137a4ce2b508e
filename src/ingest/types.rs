// src/ingest/types.rs
use async_trait::async_trait;

use crate::article::{Article, Category};
use crate::error::AdapterError;

/// One upstream news provider, normalized to [`Article`].
///
/// Implementations own their rate-limit bookkeeping and fail fast with a typed
/// error; retrying is the orchestrator's job. Malformed records are dropped inside
/// the adapter, never failing the whole batch.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch(
        &self,
        category: Option<&Category>,
        limit: usize,
    ) -> Result<Vec<Article>, AdapterError>;

    fn name(&self) -> &str;
}
