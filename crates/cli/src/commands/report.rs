//! `parley report` — Ask a persona for a structured learning report.

use parley_core::message::SessionId;

pub async fn run(
    message: String,
    session: Option<String>,
    persona: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (_config, engine) = super::load_engine(persona.as_deref()).await?;
    let session_id = session.map(SessionId::from).unwrap_or_default();

    eprint!("  Thinking...");
    let report = engine.chat_for_report(&session_id, &message).await;
    eprint!("\r              \r");
    let report = report?;

    println!("📋 Learning report for {}", report.name);
    println!("==============================");
    if report.suggestion_list.is_empty() {
        println!("  (no suggestions)");
    }
    for (i, suggestion) in report.suggestion_list.iter().enumerate() {
        println!("  {}. {suggestion}", i + 1);
    }

    Ok(())
}
