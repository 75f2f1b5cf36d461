//! # Parley Core
//!
//! Domain types, traits, and error definitions for the Parley conversational
//! session engine. This crate has **zero framework dependencies**: it defines
//! the model that every other crate implements against.
//!
//! The remote chat model, tools, and the knowledge index are all traits here.
//! Implementations live in their own crates so they can be swapped via
//! configuration and replaced by scripted fakes in tests.

pub mod error;
pub mod message;
pub mod persona;
pub mod provider;
pub mod retrieval;
pub mod schema;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ErrorKind, Result};
pub use message::{ContentPart, Role, Session, SessionId, ToolCallRequest, ToolCallResult, Turn};
pub use persona::Persona;
pub use provider::{ModelRequest, Provider, ProviderResponse, ResponseFormat, ToolDefinition, Usage};
pub use retrieval::{KnowledgeIndex, RetrievedContext, RetrievedSnippet};
pub use schema::{OutputSchema, Report, StructuredResult};
pub use tool::{Tool, ToolRegistry, ToolResult};
