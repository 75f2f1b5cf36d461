//! Built-in tool implementations for Parley.
//!
//! Tools the model may call mid-conversation:
//! - `knowledge_lookup` searches the reference knowledge index
//! - `interview_questions` searches an online interview question bank

pub mod interview_questions;
pub mod knowledge_lookup;

use parley_config::ToolsConfig;
use parley_core::retrieval::KnowledgeIndex;
use parley_core::tool::ToolRegistry;
use std::sync::Arc;
use tracing::warn;

pub use interview_questions::InterviewQuestionsTool;
pub use knowledge_lookup::KnowledgeLookupTool;

/// Create a tool registry with the built-in tools enabled in `config`.
///
/// `knowledge_lookup` is skipped when no index is available.
pub fn registry_from_config(
    config: &ToolsConfig,
    index: Option<Arc<dyn KnowledgeIndex>>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    for name in &config.enabled {
        match name.as_str() {
            "knowledge_lookup" => match &index {
                Some(index) => registry.register(Arc::new(KnowledgeLookupTool::new(index.clone()))),
                None => warn!("knowledge_lookup enabled but no knowledge index is configured"),
            },
            "interview_questions" => registry.register(Arc::new(InterviewQuestionsTool::new(
                &config.interview_search_url,
            ))),
            other => warn!(tool = other, "Unknown built-in tool in config, skipping"),
        }
    }

    registry
}
