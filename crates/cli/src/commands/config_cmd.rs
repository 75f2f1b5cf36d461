//! `parley config` — Configuration status and paths.

use parley_config::AppConfig;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let mut warnings = Vec::new();

            if !config.has_api_key() {
                warnings.push("No API key set (set PARLEY_API_KEY or DASHSCOPE_API_KEY env var)");
            }

            if config.retrieval.enabled && config.retrieval.docs_dir.is_none() {
                warnings.push("Retrieval enabled but no docs_dir set; the knowledge index will be empty");
            }

            if config.session.ttl().is_none() {
                warnings.push("session.ttl_secs = 0: idle sessions are never evicted");
            }

            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Provider:  {}", config.default_provider);
            println!("   Model:     {}", config.resolved_model());
            println!("   Persona:   {}", config.default_persona);
            println!("   Budget:    {} tokens", config.prompt.input_budget_tokens);
            println!("   Tools:     {}", config.tools.enabled.join(", "));
            println!("   Depth:     {}", config.tools.max_depth);
            println!(
                "   Retrieval: {}",
                if config.retrieval.enabled { "on" } else { "off" }
            );
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn default() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", AppConfig::default_toml());
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", AppConfig::config_path().display());
    Ok(())
}
