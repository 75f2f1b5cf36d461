//! Fetches a question-bank search page for a topic.
//!
//! The page is reduced to plain text before it reaches the model.

use async_trait::async_trait;
use parley_core::error::ToolError;
use parley_core::tool::{Tool, ToolResult};
use tracing::debug;

/// Longest page excerpt handed back to the model, in characters.
pub const MAX_OUTPUT_CHARS: usize = 4000;

pub struct InterviewQuestionsTool {
    search_url: String,
    client: reqwest::Client,
}

impl InterviewQuestionsTool {
    pub fn new(search_url: impl Into<String>) -> Self {
        Self {
            search_url: search_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn failed(&self, reason: impl Into<String>) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Tool for InterviewQuestionsTool {
    fn name(&self) -> &str {
        "interview_questions"
    }

    fn description(&self) -> &str {
        "Search an online interview question bank for a topic (e.g. \"computer networks\", \"Java concurrency\"). \
         Returns the matching questions as plain text."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "topic": {
                    "type": "string",
                    "description": "The interview topic to search for"
                }
            },
            "required": ["topic"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let topic = arguments["topic"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'topic' argument".into()))?;

        debug!(topic, url = %self.search_url, "Fetching interview questions");

        let response = self
            .client
            .get(&self.search_url)
            .query(&[("searchText", topic)])
            .send()
            .await
            .map_err(|e| self.failed(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.failed(format!("search page returned HTTP {}", status.as_u16())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.failed(format!("could not read response body: {e}")))?;

        let text = truncate_chars(&strip_markup(&body), MAX_OUTPUT_CHARS);
        if text.is_empty() {
            return Ok(ToolResult::ok(format!("No interview questions found for \"{topic}\".")));
        }
        Ok(ToolResult::ok(text))
    }
}

/// Drop tags, script and style bodies, decode common entities, and collapse
/// whitespace.
fn strip_markup(html: &str) -> String {
    let mut out = String::with_capacity(html.len() / 2);
    let mut rest = html;

    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        out.push(' ');
        let tag = &rest[open..];

        let skip_to = ["script", "style"].iter().find_map(|name| {
            let opens = tag
                .get(1..=name.len())
                .is_some_and(|t| t.eq_ignore_ascii_case(name));
            if !opens {
                return None;
            }
            let close = format!("</{name}");
            let lower = tag.to_ascii_lowercase();
            Some(lower.find(&close).map_or(tag.len(), |i| i + close.len()))
        });

        let tag = match skip_to {
            Some(end) => &tag[end..],
            None => tag,
        };
        rest = match tag.find('>') {
            Some(close) => &tag[close + 1..],
            None => "",
        };
    }
    out.push_str(rest);

    let decoded = out
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}
