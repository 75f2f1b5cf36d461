//! Persona-keyed engine registry.

use crate::engine::SessionEngine;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Session engines keyed by persona name.
#[derive(Default)]
pub struct EngineRegistry {
    engines: BTreeMap<String, Arc<SessionEngine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an engine under its persona's name, replacing any previous one.
    pub fn register(&mut self, engine: SessionEngine) -> Arc<SessionEngine> {
        let engine = Arc::new(engine);
        self.engines
            .insert(engine.persona().name.clone(), engine.clone());
        engine
    }

    pub fn get(&self, name: &str) -> Option<Arc<SessionEngine>> {
        self.engines.get(name).cloned()
    }

    /// Registered persona names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.engines.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}
