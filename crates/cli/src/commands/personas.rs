//! `parley personas` — List available personas.

use parley_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    println!("🎭 Available Personas");
    println!("=====================");
    println!();
    for persona in config.resolved_personas() {
        let marker = if persona.name == config.default_persona {
            " (default)"
        } else {
            ""
        };
        println!("  {}{marker}", persona.name);
        println!("    {}", summary(&persona.system_prompt, 72));
        println!();
    }
    println!("  Add or override personas with [[personas]] entries in:");
    println!("    {}", AppConfig::config_path().display());

    Ok(())
}

/// First line of a prompt, cut to `max` chars.
fn summary(prompt: &str, max: usize) -> String {
    let first = prompt.lines().next().unwrap_or_default().trim();
    if first.chars().count() <= max {
        return first.to_string();
    }
    let cut: String = first.chars().take(max).collect();
    format!("{cut}…")
}
