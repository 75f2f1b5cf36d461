//! Conversation memory and reference knowledge for Parley.

pub mod knowledge;
pub mod session_store;

pub use knowledge::InMemoryKnowledgeIndex;
pub use session_store::{SessionGuard, SessionStore};
