//! Error types for the Parley domain.
//!
//! Uses `thiserror` for ergonomic error definitions. Each outbound
//! capability (model, tools, knowledge index) has its own error enum; the
//! top-level [`Error`] carries the kinds a caller of the engine can observe.

use thiserror::Error;

/// The top-level error type for all Parley operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The assembled prompt does not fit the model's input budget even
    /// after history truncation.
    #[error("Prompt too large: ~{estimated_tokens} tokens exceeds the input budget of {budget}")]
    PromptTooLarge { estimated_tokens: usize, budget: usize },

    /// The model requested a tool that is not registered.
    #[error("Unknown tool requested by the model: {0}")]
    UnknownTool(String),

    /// The model called a tool with arguments that do not match its schema.
    #[error("Invalid arguments for tool '{tool_name}': {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    /// The model kept requesting tools past the configured depth.
    #[error("Tool dispatch exceeded the maximum depth of {max_depth} rounds")]
    ToolLoopExceeded { max_depth: u32 },

    /// The model's reply could not be parsed into the requested schema.
    #[error("Response does not match schema '{schema}': {reason}")]
    SchemaValidation { schema: String, reason: String },

    /// A remote call (model or tool) did not finish in time.
    #[error("{operation} timed out after {timeout_ms}ms")]
    RemoteTimeout { operation: String, timeout_ms: u64 },

    /// A remote call failed for a reason other than a timeout.
    #[error("{operation} unavailable: {reason}")]
    RemoteUnavailable { operation: String, reason: String },

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// A flat discriminant of [`Error`] for callers that only need to branch
/// on the kind of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    PromptTooLarge,
    UnknownTool,
    InvalidArguments,
    ToolLoopExceeded,
    SchemaValidation,
    RemoteTimeout,
    RemoteUnavailable,
    Config,
    Serialization,
    Internal,
}

impl Error {
    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PromptTooLarge { .. } => ErrorKind::PromptTooLarge,
            Self::UnknownTool(_) => ErrorKind::UnknownTool,
            Self::InvalidArguments { .. } => ErrorKind::InvalidArguments,
            Self::ToolLoopExceeded { .. } => ErrorKind::ToolLoopExceeded,
            Self::SchemaValidation { .. } => ErrorKind::SchemaValidation,
            Self::RemoteTimeout { .. } => ErrorKind::RemoteTimeout,
            Self::RemoteUnavailable { .. } => ErrorKind::RemoteUnavailable,
            Self::Config { .. } => ErrorKind::Config,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_ms}ms")]
    Timeout { tool_name: String, timeout_ms: u64 },
}

#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("Knowledge index unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),
}
