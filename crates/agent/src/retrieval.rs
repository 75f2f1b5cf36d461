//! Best-effort retrieval of reference material for a request.
//!
//! Never fails: a missing, failing, or slow index yields an empty context,
//! and the index is given at most the retrieval timeout.

use parley_core::retrieval::{KnowledgeIndex, RetrievedContext};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Looks up reference snippets for a query.
#[derive(Clone)]
pub struct RetrievalAugmenter {
    index: Option<Arc<dyn KnowledgeIndex>>,
    top_k: usize,
    min_score: f32,
    timeout: Duration,
}

impl RetrievalAugmenter {
    pub fn new(index: Arc<dyn KnowledgeIndex>) -> Self {
        Self {
            index: Some(index),
            ..Self::disabled()
        }
    }

    /// An augmenter that always returns an empty context.
    pub fn disabled() -> Self {
        Self {
            index: None,
            top_k: 5,
            min_score: 0.0,
            timeout: Duration::from_millis(2000),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Drop snippets scoring below `min_score`.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn is_enabled(&self) -> bool {
        self.index.is_some()
    }

    /// The `top_k` most relevant snippets for `query`, best first.
    pub async fn augment(&self, query: &str, top_k: usize) -> RetrievedContext {
        let Some(index) = &self.index else {
            return RetrievedContext::empty();
        };
        if top_k == 0 || query.trim().is_empty() {
            return RetrievedContext::empty();
        }

        match tokio::time::timeout(self.timeout, index.search(query, top_k)).await {
            Ok(Ok(snippets)) => {
                let mut kept: Vec<_> = snippets
                    .into_iter()
                    .filter(|s| s.score >= self.min_score)
                    .collect();
                kept.truncate(top_k);
                debug!(index = index.name(), snippets = kept.len(), "Retrieved reference material");
                RetrievedContext::new(kept)
            }
            Ok(Err(e)) => {
                warn!(index = index.name(), error = %e, "Retrieval failed, continuing without context");
                RetrievedContext::empty()
            }
            Err(_) => {
                warn!(
                    index = index.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Retrieval timed out, continuing without context"
                );
                RetrievedContext::empty()
            }
        }
    }
}
