//! One persona's chat entry point.
//!
//! A request flows through:
//!
//! 1. **Lock** the session (one in-flight request per session)
//! 2. **Load** the bounded history
//! 3. **Retrieve** reference material for the user's text
//! 4. **Assemble** the prompt within the token budget
//! 5. **Dispatch** to the model, running tools until it answers
//! 6. **Normalize** the answer to text or a structured result
//! 7. **Commit** the user turn and every produced turn in one append
//!
//! Any failure before step 7 leaves the session untouched.

use crate::assembler::{PromptAssembler, TokenBudget};
use crate::dispatch::ToolDispatcher;
use crate::normalizer::{NormalizedResponse, normalize};
use crate::retrieval::RetrievalAugmenter;
use parley_core::error::{Error, Result};
use parley_core::message::{ContentPart, SessionId, Turn};
use parley_core::persona::Persona;
use parley_core::provider::{ModelRequest, Provider, ResponseFormat, Usage};
use parley_core::schema::{OutputSchema, Report, StructuredResult};
use parley_core::tool::ToolRegistry;
use parley_memory::SessionStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// One inbound chat request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub text: String,
    /// Extra content parts after the text, in order (images, more text).
    pub attachments: Vec<ContentPart>,
    /// Request a structured reply matching this schema.
    pub schema: Option<OutputSchema>,
}

impl ChatRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<ContentPart>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_schema(mut self, schema: OutputSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    fn user_turn(&self) -> Turn {
        let mut parts = Vec::with_capacity(self.attachments.len() + 1);
        if !self.text.is_empty() || self.attachments.is_empty() {
            parts.push(ContentPart::text(&self.text));
        }
        parts.extend(self.attachments.iter().cloned());
        Turn::user_with_parts(parts)
    }
}

/// The engine's answer to a [`ChatRequest`].
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub output: NormalizedResponse,
    /// Usage summed over every model call made for the request.
    pub usage: Usage,
    pub tool_rounds: u32,
    /// Number of reference snippets injected into the prompt.
    pub retrieved: usize,
}

/// A persona-bound conversational engine over a shared session store.
pub struct SessionEngine {
    persona: Persona,
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    store: Arc<SessionStore>,
    tools: Arc<ToolRegistry>,
    retrieval: RetrievalAugmenter,
    assembler: PromptAssembler,
    max_depth: u32,
    max_history_turns: usize,
    model_timeout: Duration,
    tool_timeout: Duration,
    retrieval_timeout: Option<Duration>,
}

impl SessionEngine {
    /// Create an engine with no tools and no retrieval.
    pub fn new(
        persona: Persona,
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        store: Arc<SessionStore>,
    ) -> Self {
        Self {
            persona,
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            store,
            tools: Arc::new(ToolRegistry::new()),
            retrieval: RetrievalAugmenter::disabled(),
            assembler: PromptAssembler::default(),
            max_depth: 5,
            max_history_turns: 20,
            model_timeout: Duration::from_secs(60),
            tool_timeout: Duration::from_secs(30),
            retrieval_timeout: None,
        }
    }

    /// Tools the model may call.
    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_retrieval(mut self, retrieval: RetrievalAugmenter) -> Self {
        self.retrieval = match self.retrieval_timeout {
            Some(timeout) => retrieval.with_timeout(timeout),
            None => retrieval,
        };
        self
    }

    /// Set the input token budget.
    pub fn with_budget(mut self, budget: TokenBudget) -> Self {
        self.assembler = PromptAssembler::new(budget);
        self
    }

    /// Set the maximum number of tool rounds per request.
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the model, tool and retrieval call timeouts.
    pub fn with_timeouts(mut self, model: Duration, tool: Duration, retrieval: Duration) -> Self {
        self.model_timeout = model;
        self.tool_timeout = tool;
        self.retrieval_timeout = Some(retrieval);
        self.retrieval = self.retrieval.with_timeout(retrieval);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the default max tokens per model response.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Bound how many past turns are loaded for each request.
    pub fn with_max_history_turns(mut self, max_turns: usize) -> Self {
        self.max_history_turns = max_turns;
        self
    }

    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Send a message and get the assistant's text reply.
    pub async fn chat(
        &self,
        session_id: &SessionId,
        text: &str,
        attachments: Vec<ContentPart>,
    ) -> Result<String> {
        let reply = self
            .respond(session_id, ChatRequest::new(text).with_attachments(attachments))
            .await?;
        Ok(reply.output.as_text())
    }

    /// Send a message and get a reply validated against `schema`.
    pub async fn chat_structured(
        &self,
        session_id: &SessionId,
        text: &str,
        attachments: Vec<ContentPart>,
        schema: &OutputSchema,
    ) -> Result<StructuredResult> {
        let request = ChatRequest::new(text)
            .with_attachments(attachments)
            .with_schema(schema.clone());

        match self.respond(session_id, request).await?.output {
            NormalizedResponse::Structured(result) => Ok(result),
            NormalizedResponse::Text(_) => Err(Error::Internal(
                "structured request produced a text reply".into(),
            )),
        }
    }

    /// Ask for a learning report (the user's name and suggestions).
    pub async fn chat_for_report(&self, session_id: &SessionId, text: &str) -> Result<Report> {
        let schema = OutputSchema::report();
        let result = self.chat_structured(session_id, text, Vec::new(), &schema).await?;
        result.deserialize().map_err(|e| Error::SchemaValidation {
            schema: schema.name.clone(),
            reason: e.to_string(),
        })
    }

    /// Handle one request end to end.
    pub async fn respond(&self, session_id: &SessionId, request: ChatRequest) -> Result<ChatReply> {
        let started = Instant::now();
        let user_turn = request.user_turn();

        let guard = self.store.lock(session_id).await;
        let history = guard.history(self.max_history_turns).await;

        let context = self.retrieval.augment(&request.text, self.retrieval.top_k()).await;

        let prompt = self.assembler.build(
            &self.persona,
            &history,
            &user_turn,
            &context,
            &self.tools.definitions(),
            request.schema.as_ref(),
        )?;

        let model_request = ModelRequest {
            model: self.model.clone(),
            system_prompt: prompt.system_prompt,
            messages: prompt.messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: prompt.tools,
            response_format: if request.schema.is_some() {
                ResponseFormat::JsonObject
            } else {
                ResponseFormat::Text
            },
        };

        debug!(
            session = %session_id,
            persona = %self.persona.name,
            history = history.len(),
            snippets = context.len(),
            "Dispatching request"
        );

        let dispatcher = ToolDispatcher::new(self.tools.clone())
            .with_max_depth(self.max_depth)
            .with_model_timeout(self.model_timeout)
            .with_tool_timeout(self.tool_timeout)
            .with_input_budget(self.assembler.budget().total);
        let outcome = dispatcher.run(self.provider.as_ref(), model_request).await?;

        let output = normalize(&outcome.reply.text(), request.schema.as_ref())?;

        let mut turns = Vec::with_capacity(outcome.transcript.len() + 1);
        turns.push(user_turn);
        turns.extend(outcome.transcript);
        guard.commit(turns).await;

        info!(
            session = %session_id,
            persona = %self.persona.name,
            tool_rounds = outcome.rounds,
            tokens = outcome.usage.total_tokens,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Chat turn complete"
        );

        Ok(ChatReply {
            output,
            usage: outcome.usage,
            tool_rounds: outcome.rounds,
            retrieved: context.len(),
        })
    }

    /// The newest `max_turns` turns of a session.
    pub async fn history(&self, session_id: &SessionId, max_turns: usize) -> Vec<Turn> {
        self.store.history(session_id, max_turns).await
    }

    /// End a session. Returns whether it existed.
    pub async fn close(&self, session_id: &SessionId) -> bool {
        self.store.close(session_id).await
    }
}
