//! Parley CLI — the main entry point.
//!
//! Commands:
//! - `chat`      — Single message or interactive chat with a persona
//! - `report`    — Ask for a structured learning report
//! - `config`    — Show configuration status or the config file path
//! - `personas`  — List available personas

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "parley",
    about = "Parley — persona-driven conversational session engine",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with a persona
    Chat {
        /// Session ID to continue (a new one is generated if omitted)
        #[arg(short, long)]
        session: Option<String>,

        /// Persona to talk to (defaults to `default_persona`)
        #[arg(short, long)]
        persona: Option<String>,

        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Attach an image (URL, data URI, or local file path); repeatable
        #[arg(long = "image")]
        images: Vec<String>,
    },

    /// Ask for a learning report (name and suggestions)
    Report {
        /// The request text
        #[arg(short, long)]
        message: String,

        #[arg(short, long)]
        session: Option<String>,

        #[arg(short, long)]
        persona: Option<String>,
    },

    /// Show configuration status
    Config {
        /// Print only the config file path
        #[arg(long)]
        path: bool,

        /// Print a default config file
        #[arg(long, conflicts_with = "path")]
        default: bool,
    },

    /// List available personas
    Personas,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Chat {
            session,
            persona,
            message,
            images,
        } => commands::chat::run(session, persona, message, images).await?,
        Commands::Report {
            message,
            session,
            persona,
        } => commands::report::run(message, session, persona).await?,
        Commands::Config { path, default } => {
            if path {
                commands::config_cmd::path().await?
            } else if default {
                commands::config_cmd::default().await?
            } else {
                commands::config_cmd::validate().await?
            }
        }
        Commands::Personas => commands::personas::run().await?,
    }

    Ok(())
}
