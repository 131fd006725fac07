//! Anki Deck Creator CLI
//!
//! Runs one host hook over a chat body read from a file or stdin.

use anki_deck_creator::config::default_config_path;
use anki_deck_creator::{Body, DeckCreatorConfig, Interceptor, StatusEvent};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Anki Deck Creator - trim chat history and turn flashcard blocks into decks
#[derive(Parser, Debug)]
#[command(name = "anki-deck-creator")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose output: debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Print host status events as JSON lines on stderr
    #[arg(long)]
    events: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Trim history and add the flashcard instruction to a request body
    Inlet {
        /// Body JSON file (stdin when omitted)
        #[arg(long)]
        body: Option<PathBuf>,
    },

    /// Count cards in the last reply and annotate it
    Outlet {
        #[arg(long)]
        body: Option<PathBuf>,

        /// Card total reported by the previous outlet call
        #[arg(long)]
        previous_total: Option<usize>,
    },

    /// Build an .apkg from every card in the conversation
    Export {
        #[arg(long)]
        body: Option<PathBuf>,

        /// Output file (defaults to the deck's file name)
        #[arg(long, conflicts_with = "base64")]
        out: Option<PathBuf>,

        /// Print a base64 download payload instead of writing a file
        #[arg(long)]
        base64: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(default_config_path);
    let config = match &config_path {
        Some(path) => DeckCreatorConfig::load(path).await?,
        None => DeckCreatorConfig::default(),
    };

    // Logs go to stderr; stdout carries the transformed body.
    let filter = if cli.verbose || config.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Some(path) = &config_path {
        info!("Config: {:?}", path);
    }

    let interceptor = Interceptor::new(config)?;
    let mut events: Vec<StatusEvent> = Vec::new();

    let result = run(&cli.command, &interceptor, &mut events).await;

    if cli.events {
        for event in &events {
            eprintln!("{}", event.to_host_json());
        }
    }

    result
}

async fn run(
    command: &Command,
    interceptor: &Interceptor,
    events: &mut Vec<StatusEvent>,
) -> anyhow::Result<()> {
    match command {
        Command::Inlet { body } => {
            let body = read_body(body.as_deref()).await?;
            let body = interceptor.inlet(body, events)?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Command::Outlet {
            body,
            previous_total,
        } => {
            let body = read_body(body.as_deref()).await?;
            let outcome = interceptor.outlet(body, *previous_total, events)?;
            match outcome.tally {
                Some(tally) => info!(
                    "Cards: {} new, {} total, {} malformed",
                    tally.new, tally.total, tally.malformed
                ),
                None => info!("No card blocks in the last reply"),
            }
            println!("{}", serde_json::to_string_pretty(&outcome.body)?);
        }
        Command::Export { body, out, base64 } => {
            let body = read_body(body.as_deref()).await?;
            let exported = interceptor.export(&body, events)?;
            if exported.skipped > 0 || exported.malformed > 0 {
                warn!(
                    "{} card(s) skipped, {} malformed entr(y/ies) ignored",
                    exported.skipped, exported.malformed
                );
            }
            if exported.duplicates > 0 {
                info!("{} duplicate card(s) merged", exported.duplicates);
            }

            if *base64 {
                println!("{}", exported.download_payload());
            } else {
                let path = out
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(&exported.file_name));
                tokio::fs::write(&path, &exported.bytes).await?;
                info!(
                    "Wrote {} note(s) / {} card(s) to {:?}",
                    exported.note_count, exported.card_count, path
                );
            }
        }
    }
    Ok(())
}

/// Read a host body from a file, or stdin when no path is given
async fn read_body(path: Option<&Path>) -> anyhow::Result<Body> {
    let raw = match path {
        Some(path) => tokio::fs::read_to_string(path).await?,
        None => {
            let mut raw = String::new();
            tokio::io::stdin().read_to_string(&mut raw).await?;
            raw
        }
    };
    Ok(serde_json::from_str(&raw)?)
}
