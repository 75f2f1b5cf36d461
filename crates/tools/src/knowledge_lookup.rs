//! Knowledge lookup tool — lets the model search the knowledge index itself.
//!
//! Complements the automatic retrieval step: the model can issue follow-up
//! queries with its own wording when the injected reference material falls
//! short.

use async_trait::async_trait;
use parley_core::error::ToolError;
use parley_core::retrieval::KnowledgeIndex;
use parley_core::tool::{Tool, ToolResult};
use std::sync::Arc;

const DEFAULT_TOP_K: usize = 3;
const MAX_TOP_K: usize = 10;

pub struct KnowledgeLookupTool {
    index: Arc<dyn KnowledgeIndex>,
}

impl KnowledgeLookupTool {
    pub fn new(index: Arc<dyn KnowledgeIndex>) -> Self {
        Self { index }
    }
}

#[derive(serde::Serialize)]
struct LookupHit<'a> {
    source: &'a str,
    score: f32,
    content: &'a str,
}

#[async_trait]
impl Tool for KnowledgeLookupTool {
    fn name(&self) -> &str {
        "knowledge_lookup"
    }

    fn description(&self) -> &str {
        "Search the reference knowledge base. Returns the most relevant document excerpts, best first."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to look up"
                },
                "top_k": {
                    "type": "integer",
                    "description": "Maximum number of excerpts to return (default 3, at most 10)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        let top_k = arguments["top_k"]
            .as_u64()
            .map_or(DEFAULT_TOP_K, |k| k as usize)
            .clamp(1, MAX_TOP_K);

        let snippets = self
            .index
            .search(query, top_k)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?;

        if snippets.is_empty() {
            return Ok(ToolResult::ok(format!("No reference material found for \"{query}\".")));
        }

        let hits: Vec<LookupHit<'_>> = snippets
            .iter()
            .map(|s| LookupHit {
                source: &s.source_id,
                score: s.score,
                content: &s.text,
            })
            .collect();

        let encode_failed = |e: serde_json::Error| ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: e.to_string(),
        };
        let data = serde_json::to_value(&hits).map_err(encode_failed)?;
        let output = serde_json::to_string_pretty(&hits).map_err(encode_failed)?;
        Ok(ToolResult {
            success: true,
            output,
            data: Some(data),
        })
    }
}
