//! Personas — the fixed instruction a session engine speaks with.
//!
//! A persona is selected by name when an engine is registered. Built-in
//! personas can be overridden or extended from configuration.

use serde::{Deserialize, Serialize};

pub const RELATIONSHIP_ADVISOR: &str = "relationship_advisor";
pub const CODE_HELPER: &str = "code_helper";

/// A named system instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    /// Registration name (e.g. "code_helper")
    pub name: String,

    /// The system prompt sent ahead of every request
    pub system_prompt: String,
}

impl Persona {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
        }
    }

    /// Campus relationship coach.
    pub fn relationship_advisor() -> Self {
        Self::new(
            RELATIONSHIP_ADVISOR,
            concat!(
                "You are a campus relationship coach. Help the user with questions ",
                "about their relationships, including but not limited to: dating, ",
                "daily life together, arguments, the ambiguous early stage and the ",
                "honeymoon phase.",
            ),
        )
    }

    /// Programming-learning assistant.
    pub fn code_helper() -> Self {
        Self::new(
            CODE_HELPER,
            concat!(
                "You are a programming learning assistant. Help the user plan their ",
                "learning path, answer questions about programming concepts and ",
                "common interview topics, and give concrete, actionable suggestions. ",
                "Be concise and accurate.",
            ),
        )
    }

    /// All built-in personas.
    pub fn builtins() -> Vec<Self> {
        vec![Self::relationship_advisor(), Self::code_helper()]
    }

    /// Look up a built-in persona by name.
    pub fn builtin(name: &str) -> Option<Self> {
        Self::builtins().into_iter().find(|p| p.name == name)
    }
}
