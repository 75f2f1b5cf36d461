//! End-to-end integration tests for the Parley session engine.
//!
//! These tests drive full chat requests through session storage, retrieval,
//! prompt assembly, tool dispatch, and normalization against a scripted
//! provider and local tools.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parley_agent::{
    EngineRegistry, NormalizedResponse, RetrievalAugmenter, SessionEngine, TokenBudget, normalize,
};
use parley_config::AppConfig;
use parley_core::error::{Error, ProviderError, RetrievalError, ToolError};
use parley_core::message::{ContentPart, Role, SessionId, ToolCallRequest, Turn};
use parley_core::persona::Persona;
use parley_core::provider::{ModelRequest, Provider, ProviderResponse, Usage};
use parley_core::retrieval::{KnowledgeIndex, RetrievedSnippet};
use parley_core::schema::OutputSchema;
use parley_core::tool::{Tool, ToolRegistry, ToolResult};
use parley_memory::{InMemoryKnowledgeIndex, SessionStore};

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that returns scripted responses in sequence.
struct ScriptedProvider {
    responses: Vec<ProviderResponse>,
    requests: std::sync::Mutex<Vec<ModelRequest>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses,
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn texts(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| text_response(r)).collect())
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, index: usize) -> ModelRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ModelRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let index = requests.len();
        requests.push(request);
        match self.responses.get(index) {
            Some(response) => Ok(response.clone()),
            None => panic!(
                "ScriptedProvider exhausted: call #{index}, have {}",
                self.responses.len()
            ),
        }
    }
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Turn::assistant(text),
        usage: usage(),
        model: "mock".into(),
    }
}

fn tool_response(tool_calls: Vec<ToolCallRequest>) -> ProviderResponse {
    ProviderResponse {
        message: Turn::assistant_with_tool_calls("", tool_calls),
        usage: usage(),
        model: "mock".into(),
    }
}

fn make_tool_call(id: &str, name: &str, args: serde_json::Value) -> ToolCallRequest {
    ToolCallRequest {
        id: id.to_string(),
        name: name.to_string(),
        arguments: args,
    }
}

// ── Local tools and indexes ──────────────────────────────────────────────

/// Counts invocations and echoes its `text` argument.
#[derive(Default)]
struct EchoTool {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "Echoes text back"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }
    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ToolResult::ok(arguments["text"].as_str().unwrap_or_default()))
    }
}

/// Always fails, as a remote search would when the site is down.
struct BrokenSearchTool;

#[async_trait::async_trait]
impl Tool for BrokenSearchTool {
    fn name(&self) -> &str {
        "search"
    }
    fn description(&self) -> &str {
        "Searches the web"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {}, "required": [] })
    }
    async fn execute(&self, _: serde_json::Value) -> Result<ToolResult, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: "search".into(),
            reason: "HTTP 503".into(),
        })
    }
}

struct UnreachableIndex;

#[async_trait::async_trait]
impl KnowledgeIndex for UnreachableIndex {
    fn name(&self) -> &str {
        "unreachable"
    }
    async fn search(&self, _: &str, _: usize) -> Result<Vec<RetrievedSnippet>, RetrievalError> {
        Err(RetrievalError::Unavailable("connection refused".into()))
    }
}

struct SlowIndex;

#[async_trait::async_trait]
impl KnowledgeIndex for SlowIndex {
    fn name(&self) -> &str {
        "slow"
    }
    async fn search(&self, _: &str, _: usize) -> Result<Vec<RetrievedSnippet>, RetrievalError> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok(vec![])
    }
}

fn engine_with(provider: Arc<ScriptedProvider>) -> SessionEngine {
    SessionEngine::new(
        Persona::code_helper(),
        provider,
        "mock-model",
        Arc::new(SessionStore::default()),
    )
}

// ── E2E: Session history ─────────────────────────────────────────────────

#[tokio::test]
async fn e2e_every_chat_appends_one_user_turn_in_order() {
    let provider = Arc::new(ScriptedProvider::texts(&["r1", "r2", "r3", "r4"]));
    let engine = engine_with(provider);
    let id = SessionId::from("ordering");

    let sent = ["first", "second", "third", "fourth"];
    for text in sent {
        engine.chat(&id, text, vec![]).await.unwrap();
    }

    let history = engine.history(&id, 100).await;
    let users: Vec<String> = history
        .iter()
        .filter(|t| t.role == Role::User)
        .map(Turn::text)
        .collect();
    assert_eq!(users, sent);

    // Bounded reads
    assert!(engine.history(&id, 0).await.is_empty());
    assert_eq!(engine.history(&id, 3).await, history[history.len() - 3..].to_vec());
    assert_eq!(engine.history(&id, 1000).await.len(), 8);
}

#[tokio::test]
async fn e2e_fish_remembers_name() {
    let provider = Arc::new(ScriptedProvider::texts(&[
        "Nice to meet you, Fish!",
        "You told me your name is Fish.",
    ]));
    let engine = engine_with(provider.clone());
    let id = SessionId::new();

    engine.chat(&id, "My name is Fish", vec![]).await.unwrap();
    let reply = engine.chat(&id, "What's my name?", vec![]).await.unwrap();
    assert!(reply.contains("Fish"));

    // The second request carried the first exchange.
    let second = provider.request(1);
    assert_eq!(second.messages.len(), 3);
    assert_eq!(second.messages[0].text(), "My name is Fish");
    assert_eq!(second.messages[1].role, Role::Assistant);
    assert_eq!(second.messages[2].text(), "What's my name?");
}

#[tokio::test]
async fn e2e_multimodal_turn_round_trips_through_history() {
    let provider = Arc::new(ScriptedProvider::texts(&["A tabby cat."]));
    let engine = engine_with(provider.clone());
    let id = SessionId::from("images");

    let attachments = vec![
        ContentPart::image("https://example.com/cat.jpg"),
        ContentPart::text("Is it friendly?"),
    ];
    engine.chat(&id, "What is this?", attachments).await.unwrap();

    let history = engine.history(&id, 10).await;
    assert_eq!(history[0], provider.request(0).messages[0]);
    assert_eq!(
        history[0].parts,
        vec![
            ContentPart::text("What is this?"),
            ContentPart::image("https://example.com/cat.jpg"),
            ContentPart::text("Is it friendly?"),
        ]
    );
}

#[tokio::test]
async fn e2e_idle_session_is_evicted() {
    let provider = Arc::new(ScriptedProvider::texts(&["hi", "hello again"]));
    let store = Arc::new(SessionStore::new(Some(Duration::from_millis(20))));
    let engine = SessionEngine::new(Persona::code_helper(), provider.clone(), "mock", store.clone());
    let id = SessionId::from("idle");

    engine.chat(&id, "hello", vec![]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(store.evict_expired().await, 1);

    engine.chat(&id, "hello?", vec![]).await.unwrap();
    assert_eq!(provider.request(1).messages.len(), 1);
}

// ── E2E: Tool dispatch ───────────────────────────────────────────────────

#[tokio::test]
async fn e2e_tool_loop_stops_at_max_depth() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(vec![make_tool_call("c1", "echo", serde_json::json!({"text": "1"}))]),
        tool_response(vec![make_tool_call("c2", "echo", serde_json::json!({"text": "2"}))]),
        tool_response(vec![make_tool_call("c3", "echo", serde_json::json!({"text": "3"}))]),
    ]));
    let echo = Arc::new(EchoTool::default());
    let mut registry = ToolRegistry::new();
    registry.register(echo.clone());

    let engine = engine_with(provider.clone())
        .with_tools(Arc::new(registry))
        .with_max_depth(2);
    let id = SessionId::from("loop");

    let err = engine.chat(&id, "keep going", vec![]).await.unwrap_err();
    assert!(matches!(err, Error::ToolLoopExceeded { max_depth: 2 }));
    assert_eq!(echo.calls.load(Ordering::SeqCst), 2);
    assert_eq!(provider.calls(), 3);
    assert!(engine.history(&id, 10).await.is_empty());
}

#[tokio::test]
async fn e2e_tool_results_reach_model_and_history() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(vec![
            make_tool_call("a", "echo", serde_json::json!({"text": "alpha"})),
            make_tool_call("b", "echo", serde_json::json!({"text": "beta"})),
        ]),
        text_response("alpha and beta"),
    ]));
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(EchoTool::default()));
    let engine = engine_with(provider.clone()).with_tools(Arc::new(registry));
    let id = SessionId::from("tools");

    let reply = engine.chat(&id, "echo twice", vec![]).await.unwrap();
    assert_eq!(reply, "alpha and beta");

    // Results in request order, directly after the tool-call turn.
    let followup = provider.request(1);
    let tail: Vec<String> = followup.messages[2..].iter().map(Turn::text).collect();
    assert_eq!(tail, vec!["alpha", "beta"]);

    let roles: Vec<Role> = engine.history(&id, 10).await.iter().map(|t| t.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::Tool, Role::Tool, Role::Assistant]
    );
}

#[tokio::test]
async fn e2e_tool_failure_is_reported_to_model() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(vec![make_tool_call("s", "search", serde_json::json!({}))]),
        text_response("The question bank is unavailable right now."),
    ]));
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(BrokenSearchTool));
    let engine = engine_with(provider.clone()).with_tools(Arc::new(registry));

    let reply = engine
        .chat(&SessionId::from("broken"), "find interview questions", vec![])
        .await
        .unwrap();
    assert!(reply.contains("unavailable"));

    let followup = provider.request(1);
    let tool_turn = &followup.messages[2];
    assert_eq!(tool_turn.role, Role::Tool);
    assert!(tool_turn.tool_result.as_ref().unwrap().is_error);
    assert!(tool_turn.text().contains("HTTP 503"));
}

#[tokio::test]
async fn e2e_unknown_tool_fails_request() {
    let provider = Arc::new(ScriptedProvider::new(vec![tool_response(vec![make_tool_call(
        "x",
        "delete_everything",
        serde_json::json!({}),
    )])]));
    let engine = engine_with(provider);

    let err = engine
        .chat(&SessionId::from("unknown"), "go", vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownTool(ref name) if name == "delete_everything"));
}

#[tokio::test]
async fn e2e_knowledge_lookup_tool_over_local_index() {
    let index = Arc::new(InMemoryKnowledgeIndex::default());
    index
        .add_document("rust.md", "Ownership: each value has a single owner.")
        .await;
    let index: Arc<dyn KnowledgeIndex> = index;

    let tools = parley_tools::registry_from_config(&AppConfig::default().tools, Some(index));
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(vec![make_tool_call(
            "k",
            "knowledge_lookup",
            serde_json::json!({"query": "ownership owner"}),
        )]),
        text_response("Each value has a single owner."),
    ]));
    let engine = engine_with(provider.clone()).with_tools(Arc::new(tools));

    engine
        .chat(&SessionId::from("kb"), "Explain ownership", vec![])
        .await
        .unwrap();

    let lookup = provider.request(1).messages[2].text();
    assert!(lookup.contains("rust.md"));
    assert!(lookup.contains("single owner"));
}

// ── E2E: Retrieval ───────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_retrieval_injects_reference_material() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("tcp.md"),
        "The TCP three-way handshake: SYN, SYN-ACK, ACK.",
    )
    .unwrap();
    std::fs::write(dir.path().join("dns.md"), "DNS resolves names to addresses.").unwrap();

    let index = Arc::new(InMemoryKnowledgeIndex::default());
    assert_eq!(index.load_dir(dir.path()).await.unwrap(), 2);

    let provider = Arc::new(ScriptedProvider::texts(&["SYN, SYN-ACK, ACK."]));
    let engine = engine_with(provider.clone())
        .with_retrieval(RetrievalAugmenter::new(index).with_top_k(1));

    engine
        .chat(&SessionId::from("rag"), "Describe the TCP handshake", vec![])
        .await
        .unwrap();

    let system = provider.request(0).system_prompt;
    assert!(system.starts_with(&Persona::code_helper().system_prompt));
    assert!(system.contains("tcp.md"));
    assert!(!system.contains("dns.md"));
}

#[tokio::test]
async fn e2e_unreachable_index_still_answers() {
    let provider = Arc::new(ScriptedProvider::texts(&["Answered without references."]));
    let engine = engine_with(provider.clone())
        .with_retrieval(RetrievalAugmenter::new(Arc::new(UnreachableIndex)));

    let reply = engine
        .chat(&SessionId::from("down"), "What is TCP?", vec![])
        .await
        .unwrap();
    assert_eq!(reply, "Answered without references.");
    assert!(!provider.request(0).system_prompt.contains("<reference_material>"));
}

#[tokio::test(start_paused = true)]
async fn e2e_slow_index_bounded_by_retrieval_timeout() {
    let provider = Arc::new(ScriptedProvider::texts(&["Still here."]));
    let engine = engine_with(provider)
        .with_retrieval(RetrievalAugmenter::new(Arc::new(SlowIndex)))
        .with_timeouts(
            Duration::from_secs(60),
            Duration::from_secs(30),
            Duration::from_millis(500),
        );

    let start = tokio::time::Instant::now();
    let reply = engine
        .chat(&SessionId::from("slow"), "What is TCP?", vec![])
        .await
        .unwrap();
    assert_eq!(reply, "Still here.");
    assert!(start.elapsed() < Duration::from_secs(1));
}

// ── E2E: Prompt budget ───────────────────────────────────────────────────

#[tokio::test]
async fn e2e_long_history_is_truncated_oldest_first() {
    let provider = Arc::new(ScriptedProvider::texts(&["ok"; 6]));
    let engine = engine_with(provider.clone())
        .with_budget(TokenBudget::new(250))
        .with_max_history_turns(100);
    let id = SessionId::from("long");

    for i in 0..6 {
        let text = format!("message {i} {}", "padding ".repeat(20));
        engine.chat(&id, &text, vec![]).await.unwrap();
    }

    let last = provider.request(5);
    assert!(last.messages.len() < 11);
    assert!(last.messages.last().unwrap().text().starts_with("message 5"));
    assert!(!last.messages.iter().any(|t| t.text().starts_with("message 0")));
}

#[tokio::test]
async fn e2e_oversized_message_is_rejected_before_model_call() {
    let provider = Arc::new(ScriptedProvider::new(vec![]));
    let engine = engine_with(provider.clone()).with_budget(TokenBudget::new(256));

    let err = engine
        .chat(&SessionId::from("big"), &"x".repeat(10_000), vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PromptTooLarge { .. }));
    assert_eq!(provider.calls(), 0);
}

// ── E2E: Structured output ───────────────────────────────────────────────

#[tokio::test]
async fn e2e_learning_report() {
    let provider = Arc::new(ScriptedProvider::texts(&[
        "Hi Fish! Networking is a great topic.",
        "```json\n{\"name\": \"Fish\", \"suggestion_list\": [\"Learn TCP\", \"Read about DNS\"]}\n```",
    ]));
    let engine = engine_with(provider);
    let id = SessionId::from("report");

    engine
        .chat(&id, "I'm Fish and I'm learning networking", vec![])
        .await
        .unwrap();
    let report = engine
        .chat_for_report(&id, "Please write my learning report")
        .await
        .unwrap();

    assert_eq!(report.name, "Fish");
    assert_eq!(report.suggestion_list.len(), 2);
    assert_eq!(engine.history(&id, 10).await.len(), 4);
}

#[tokio::test]
async fn e2e_structured_output_rejects_prose() {
    let provider = Arc::new(ScriptedProvider::texts(&["Here's your report: you did great!"]));
    let engine = engine_with(provider);
    let id = SessionId::from("prose");

    let err = engine.chat_for_report(&id, "report").await.unwrap_err();
    assert!(matches!(err, Error::SchemaValidation { .. }));
    assert!(engine.history(&id, 10).await.is_empty());
}

#[test]
fn e2e_normalization_is_idempotent() {
    let schema = OutputSchema::report();
    for raw in [
        "{\"name\": \"Fish\", \"suggestion_list\": []}",
        "```json\n{\"name\": \"Fish\", \"suggestion_list\": [\"a\"]}\n```",
        "not json at all",
    ] {
        let first = normalize(raw, Some(&schema));
        let second = normalize(raw, Some(&schema));
        assert_eq!(first.is_ok(), second.is_ok());
        if let (Ok(a), Ok(b)) = (first, second) {
            assert_eq!(a, b);
        }
    }
    assert_eq!(
        normalize(" hi ", None).unwrap(),
        NormalizedResponse::Text("hi".into())
    );
}

// ── E2E: Personas and configuration ──────────────────────────────────────

#[tokio::test]
async fn e2e_personas_are_independent_engines() {
    let provider = Arc::new(ScriptedProvider::texts(&["advice", "code"]));
    let mut engines = EngineRegistry::new();
    for persona in Persona::builtins() {
        engines.register(SessionEngine::new(
            persona,
            provider.clone(),
            "mock",
            Arc::new(SessionStore::default()),
        ));
    }
    assert_eq!(engines.names(), vec!["code_helper", "relationship_advisor"]);

    let id = SessionId::from("same-id");
    engines
        .get("relationship_advisor")
        .unwrap()
        .chat(&id, "hello", vec![])
        .await
        .unwrap();
    engines
        .get("code_helper")
        .unwrap()
        .chat(&id, "hello", vec![])
        .await
        .unwrap();

    assert_eq!(provider.request(1).messages.len(), 1);
    assert_ne!(provider.request(0).system_prompt, provider.request(1).system_prompt);
}

#[tokio::test]
async fn e2e_config_defaults_and_validation() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.default_provider, "dashscope");
    assert_eq!(config.tools.max_depth, 5);
    assert_eq!(config.prompt.input_budget_tokens, 8192);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
default_persona = "tutor"

[[personas]]
name = "tutor"
system_prompt = "You are a patient networking tutor."

[tools]
max_depth = 2
"#,
    )
    .unwrap();

    let config = AppConfig::load_from(&path).unwrap();
    assert_eq!(config.tools.max_depth, 2);
    assert_eq!(
        config.persona("tutor").unwrap().system_prompt,
        "You are a patient networking tutor."
    );
    assert_eq!(config.resolved_personas().len(), 3);
}
