//! Main entry point for Doc Translator CLI

#![forbid(unsafe_code)]

use clap::Parser;
use dotenvy::dotenv;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use doc_translator::cli::commands::{self, Commands};
use doc_translator::AppConfig;

/// Doc Translator - chunked long-document translation tool
#[derive(Parser, Debug)]
#[command(name = "doc-translator", version, about, long_about = None)]
struct Args {
    /// Config file (defaults to ./doc-translator.{json,toml,yaml} when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("doc_translator={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load(args.config.as_deref())?;

    // Execute command
    match args.command {
        Some(Commands::Translate(translate)) => {
            commands::handle_translate(config, translate).await?;
        }
        Some(Commands::Chunks {
            file,
            max_tokens,
            source_lang,
        }) => {
            commands::handle_chunks(config, file, max_tokens, source_lang).await?;
        }
        None => {
            println!("Please specify a command. Use --help for more information.");
        }
    }

    Ok(())
}
