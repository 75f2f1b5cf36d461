//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token.
//! Images are billed at a flat rate regardless of resolution.

use parley_core::message::{ContentPart, Turn};
use parley_core::provider::ToolDefinition;

/// Flat cost of one image part.
pub const IMAGE_TOKENS: usize = 85;

/// Per-turn cost of role name, delimiters and formatting markers.
pub const TURN_OVERHEAD: usize = 4;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Estimate tokens for a single turn including per-turn overhead.
pub fn estimate_turn_tokens(turn: &Turn) -> usize {
    let parts: usize = turn
        .parts
        .iter()
        .map(|p| match p {
            ContentPart::Text { text } => estimate_tokens(text),
            ContentPart::Image { .. } => IMAGE_TOKENS,
        })
        .sum();

    let calls: usize = turn
        .tool_calls
        .iter()
        .map(|c| estimate_tokens(&c.name) + estimate_tokens(&c.arguments.to_string()))
        .sum();

    TURN_OVERHEAD + parts + calls
}

/// Estimate tokens for a slice of turns.
pub fn estimate_turns_tokens(turns: &[Turn]) -> usize {
    turns.iter().map(estimate_turn_tokens).sum()
}

/// Estimate tokens for a tool definition (serialized as JSON).
pub fn estimate_tool_tokens(tool: &ToolDefinition) -> usize {
    let json = serde_json::to_string(tool).unwrap_or_default();
    estimate_tokens(&json)
}

/// Estimate tokens for a slice of tool definitions.
pub fn estimate_tools_tokens(tools: &[ToolDefinition]) -> usize {
    tools.iter().map(estimate_tool_tokens).sum()
}
