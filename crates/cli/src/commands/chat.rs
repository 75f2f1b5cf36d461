//! `parley chat` — Interactive or single-message chat mode.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use parley_core::message::{ContentPart, SessionId};
use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

const REPORT_PROMPT: &str = "Based on our conversation, write my learning report.";

pub async fn run(
    session: Option<String>,
    persona: Option<String>,
    message: Option<String>,
    images: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (config, engine) = super::load_engine(persona.as_deref()).await?;
    let session_id = session.map(SessionId::from).unwrap_or_default();

    let mut attachments = Vec::with_capacity(images.len());
    for image in &images {
        attachments.push(image_part(image).await?);
    }

    if let Some(msg) = message {
        // Single message mode
        eprint!("  Thinking...");
        let response = engine.chat(&session_id, &msg, attachments).await;
        eprint!("\r              \r");
        println!("{}", response?);
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║         Parley — Interactive Chat            ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", engine.model());
    println!("  Persona:   {}", engine.persona().name);
    println!("  Session:   {session_id}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type '/report' for a learning report, 'exit' to quit.");
    println!();

    // Attachments given on the command line go with the first message.
    let mut pending = attachments;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    print!("  You > ");
    std::io::stdout().flush()?;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == "exit" || line == "quit" {
            break;
        }
        if line.is_empty() {
            print!("  You > ");
            std::io::stdout().flush()?;
            continue;
        }

        eprint!("  ...");
        if line == "/report" {
            match engine.chat_for_report(&session_id, REPORT_PROMPT).await {
                Ok(report) => {
                    eprint!("\r     \r");
                    println!();
                    println!("  Report for {}:", report.name);
                    for (i, suggestion) in report.suggestion_list.iter().enumerate() {
                        println!("    {}. {suggestion}", i + 1);
                    }
                    println!();
                }
                Err(e) => {
                    eprint!("\r     \r");
                    eprintln!("  [Error] {e}");
                    println!();
                }
            }
        } else {
            match engine.chat(&session_id, line, std::mem::take(&mut pending)).await {
                Ok(response) => {
                    eprint!("\r     \r");
                    println!();
                    for line in response.lines() {
                        println!("  Assistant > {line}");
                    }
                    println!();
                }
                Err(e) => {
                    eprint!("\r     \r");
                    eprintln!("  [Error] {e}");
                    println!();
                }
            }
        }

        print!("  You > ");
        std::io::stdout().flush()?;
    }

    engine.close(&session_id).await;
    println!();
    println!("  Goodbye!");
    println!();

    Ok(())
}

/// Turn an `--image` argument into an image part.
///
/// URLs and data URIs pass through; local files are embedded as base64.
async fn image_part(arg: &str) -> Result<ContentPart, Box<dyn std::error::Error>> {
    if arg.starts_with("http://") || arg.starts_with("https://") || arg.starts_with("data:") {
        return Ok(ContentPart::image(arg));
    }

    let path = Path::new(arg);
    let mime = image_mime(path).ok_or_else(|| format!("Unsupported image type: {arg}"))?;
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| format!("Failed to read image {arg}: {e}"))?;

    Ok(ContentPart::image(format!(
        "data:{mime};base64,{}",
        STANDARD.encode(bytes)
    )))
}

fn image_mime(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}
