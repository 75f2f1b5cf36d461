//! The conversational session engine.
//!
//! A [`SessionEngine`] answers one persona's chats:
//!
//! 1. **Load** the session's bounded history
//! 2. **Retrieve** reference material (best effort)
//! 3. **Assemble** a prompt that fits the token budget
//! 4. **Dispatch** to the model, executing requested tools in rounds
//! 5. **Normalize** the final reply to text or a validated object
//! 6. **Commit** every new turn to the session at once
//!
//! Engines for different personas are kept in an [`EngineRegistry`].

pub mod assembler;
pub mod dispatch;
pub mod engine;
pub mod normalizer;
pub mod registry;
pub mod retrieval;
pub mod token;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use assembler::{AssembledPrompt, AssemblyMetadata, PromptAssembler, TokenBudget};
pub use dispatch::{DispatchOutcome, DispatchState, ToolDispatcher};
pub use engine::{ChatReply, ChatRequest, SessionEngine};
pub use normalizer::{NormalizedResponse, normalize, strip_code_fences};
pub use registry::EngineRegistry;
pub use retrieval::RetrievalAugmenter;
