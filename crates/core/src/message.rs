//! Turn and Session domain types.
//!
//! These are the value objects that flow through the engine:
//! the caller sends a user Turn, the model answers with an assistant Turn
//! (optionally requesting tools), and each tool answers with a Tool Turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier for a conversation session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// A fresh random session id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a Turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The model
    Assistant,
    /// Tool execution result
    Tool,
}

/// One typed piece of a Turn's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    /// An image reference: an http(s) URL or a `data:` URI.
    Image { uri: String },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(uri: impl Into<String>) -> Self {
        Self::Image { uri: uri.into() }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Self::Image { .. })
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Call ID assigned by the model; echoed on the matching Tool Turn
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as decoded JSON. Undecodable arguments are kept as a raw
    /// JSON string so validation can reject them.
    pub arguments: serde_json::Value,
}

/// Metadata attached to a Tool Turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// The call this result answers
    pub call_id: String,

    /// The tool that produced it
    pub name: String,

    /// Whether the content describes a failure
    #[serde(default)]
    pub is_error: bool,
}

/// One message exchanged within a session. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Unique turn ID
    pub id: String,

    /// Who authored this turn
    pub role: Role,

    /// Ordered content parts (text and image references interleaved as authored)
    pub parts: Vec<ContentPart>,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,

    /// Present on Tool Turns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolCallResult>,

    pub timestamp: DateTime<Utc>,
}

impl Turn {
    fn with_role(role: Role, parts: Vec<ContentPart>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            parts,
            tool_calls: Vec::new(),
            tool_result: None,
            timestamp: Utc::now(),
        }
    }

    /// A plain-text user turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self::with_role(Role::User, vec![ContentPart::text(text)])
    }

    /// A multimodal user turn. Parts keep the order given.
    pub fn user_with_parts(parts: Vec<ContentPart>) -> Self {
        Self::with_role(Role::User, parts)
    }

    /// A plain-text assistant turn.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, text_parts(text.into()))
    }

    /// An assistant turn that requests tool calls.
    pub fn assistant_with_tool_calls(text: impl Into<String>, calls: Vec<ToolCallRequest>) -> Self {
        let mut turn = Self::with_role(Role::Assistant, text_parts(text.into()));
        turn.tool_calls = calls;
        turn
    }

    /// A tool result turn.
    pub fn tool_result(
        call_id: impl Into<String>,
        name: impl Into<String>,
        output: impl Into<String>,
        is_error: bool,
    ) -> Self {
        let mut turn = Self::with_role(Role::Tool, vec![ContentPart::text(output)]);
        turn.tool_result = Some(ToolCallResult {
            call_id: call_id.into(),
            name: name.into(),
            is_error,
        });
        turn
    }

    /// All text parts joined by newlines.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn has_images(&self) -> bool {
        self.parts.iter().any(ContentPart::is_image)
    }

    pub fn requests_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

// An empty assistant reply carries no parts rather than one empty text part.
fn text_parts(text: String) -> Vec<ContentPart> {
    if text.is_empty() {
        Vec::new()
    } else {
        vec![ContentPart::Text { text }]
    }
}

/// A bounded, ordered conversation between one user and the assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,

    /// Append-only, ordered by insertion
    pub turns: Vec<Turn>,

    pub created_at: DateTime<Utc>,

    /// Updated on every append
    pub last_active: DateTime<Utc>,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            turns: Vec::new(),
            created_at: now,
            last_active: now,
        }
    }

    /// Append a turn.
    pub fn push(&mut self, turn: Turn) {
        self.last_active = Utc::now();
        self.turns.push(turn);
    }

    /// Mark the session as used without appending.
    pub fn touch(&mut self) {
        self.last_active = Utc::now();
    }

    /// The newest `max_turns` turns, in order.
    pub fn tail(&self, max_turns: usize) -> Vec<Turn> {
        let start = self.turns.len().saturating_sub(max_turns);
        self.turns[start..].to_vec()
    }
}
