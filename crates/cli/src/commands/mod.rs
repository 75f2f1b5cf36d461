//! CLI subcommands and the shared engine wiring they use.

pub mod chat;
pub mod config_cmd;
pub mod personas;
pub mod report;

use parley_agent::{EngineRegistry, RetrievalAugmenter, SessionEngine, TokenBudget};
use parley_config::AppConfig;
use parley_core::retrieval::KnowledgeIndex;
use parley_memory::{InMemoryKnowledgeIndex, SessionStore};
use std::path::Path;
use std::sync::Arc;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Load config, build every persona's engine, and pick the requested one.
pub async fn load_engine(persona: Option<&str>) -> CliResult<(AppConfig, Arc<SessionEngine>)> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Check for an API key early so the error is clear
    let provider_key = config
        .providers
        .get(&config.default_provider)
        .and_then(|p| p.api_key.as_ref());
    if !config.has_api_key() && provider_key.is_none() && config.default_provider != "ollama" {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    PARLEY_API_KEY     (generic)");
        eprintln!("    DASHSCOPE_API_KEY  (Qwen via DashScope)");
        eprintln!("    OPENAI_API_KEY     (OpenAI direct)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_path().display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let engines = build_engines(&config).await?;
    let name = persona.unwrap_or(&config.default_persona);
    let engine = engines.get(name).ok_or_else(|| {
        format!(
            "Unknown persona '{name}'. Available: {}",
            engines.names().join(", ")
        )
    })?;

    Ok((config, engine))
}

/// Build one engine per resolved persona, each with its own session store.
pub async fn build_engines(config: &AppConfig) -> CliResult<EngineRegistry> {
    let router = parley_providers::build_from_config(config);
    let provider = router.default().ok_or("No default provider configured")?;

    let index = load_index(config).await?;
    let tools = Arc::new(parley_tools::registry_from_config(
        &config.tools,
        index.clone(),
    ));

    let model = config.resolved_model();
    let mut engines = EngineRegistry::new();
    for persona in config.resolved_personas() {
        let store = Arc::new(SessionStore::new(config.session.ttl()));
        if store.ttl().is_some() {
            store.clone().spawn_reaper(config.session.sweep_interval());
        }

        let mut engine = SessionEngine::new(persona, provider.clone(), &model, store)
            .with_tools(tools.clone())
            .with_budget(TokenBudget::new(config.prompt.input_budget_tokens))
            .with_max_depth(config.tools.max_depth)
            .with_timeouts(
                config.timeouts.model(),
                config.timeouts.tool(),
                config.timeouts.retrieval(),
            )
            .with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens)
            .with_max_history_turns(config.session.max_history_turns);

        if let Some(index) = &index {
            engine = engine.with_retrieval(
                RetrievalAugmenter::new(index.clone())
                    .with_top_k(config.retrieval.top_k)
                    .with_min_score(config.retrieval.min_score),
            );
        }

        engines.register(engine);
    }

    Ok(engines)
}

async fn load_index(config: &AppConfig) -> CliResult<Option<Arc<dyn KnowledgeIndex>>> {
    if !config.retrieval.enabled {
        return Ok(None);
    }

    let index = InMemoryKnowledgeIndex::new(config.retrieval.chunk_size, config.retrieval.chunk_overlap);
    if let Some(dir) = &config.retrieval.docs_dir {
        let chunks = index
            .load_dir(Path::new(dir))
            .await
            .map_err(|e| format!("Failed to load documents from {dir}: {e}"))?;
        tracing::info!(dir = %dir, chunks, "Knowledge index loaded");
    }

    Ok(Some(Arc::new(index)))
}
