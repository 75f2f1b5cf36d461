//! The external source of reference material.
//!
//! Retrieval is best-effort: callers treat every failure as "no context".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::RetrievalError;

/// One retrieved snippet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedSnippet {
    /// Where the snippet came from (file name, document id, URL ...)
    pub source_id: String,

    pub text: String,

    /// Relevance score, higher is better
    pub score: f32,
}

/// Ordered snippets for one request. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievedContext {
    pub snippets: Vec<RetrievedSnippet>,
}

impl RetrievedContext {
    pub fn new(snippets: Vec<RetrievedSnippet>) -> Self {
        Self { snippets }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.snippets.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RetrievedSnippet> {
        self.snippets.iter()
    }
}

/// The core KnowledgeIndex trait.
///
/// Implementations: in-memory keyword index, remote vector stores.
#[async_trait]
pub trait KnowledgeIndex: Send + Sync {
    /// The index name (e.g., "in_memory").
    fn name(&self) -> &str;

    /// The `top_k` most relevant snippets for `query`, best first.
    async fn search(
        &self,
        query: &str,
        top_k: usize,
    ) -> std::result::Result<Vec<RetrievedSnippet>, RetrievalError>;
}
