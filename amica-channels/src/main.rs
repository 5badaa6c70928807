//! `amica` - companion chat bot.

use std::path::PathBuf;
use std::sync::Arc;

use amica_channels::{run, Channel, CliChannel, CompanionHandler, TelegramChannel};
use amica_common::config::Config;
use amica_common::logging::init_from_config;
use amica_core::SessionManager;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "amica")]
#[command(version)]
#[command(about = "A friendly companion chat bot on top of a Llama-2 chat model.", long_about = None)]
struct Cli {
    /// Path to a config file (default: ~/.amica/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the Telegram bot
    Telegram,

    /// Chat with the bot in this terminal
    Chat,

    /// Validate the configuration and print a summary
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_with_env(cli.config.as_deref())?;

    match cli.command {
        Commands::CheckConfig => check_config(&config),
        Commands::Telegram => {
            init_from_config(&config.observability);
            validate(&config)?;
            run_telegram(&config).await
        }
        Commands::Chat => {
            init_from_config(&config.observability);
            validate(&config)?;
            run_chat(&config).await
        }
    }
}

fn validate(config: &Config) -> Result<()> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("Invalid configuration")
}

async fn run_telegram(config: &Config) -> Result<()> {
    let mut channel = TelegramChannel::from_config(&config.telegram)?;
    channel.init().await?;

    let manager = Arc::new(SessionManager::from_config(config)?);
    let handler = Arc::new(CompanionHandler::new(manager));

    tracing::info!("Amica v{} serving Telegram", env!("CARGO_PKG_VERSION"));

    tokio::select! {
        result = run(Arc::new(channel), handler) => result,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("Shutting down");
            Ok(())
        }
    }
}

async fn run_chat(config: &Config) -> Result<()> {
    let manager = Arc::new(SessionManager::from_config(config)?);
    let handler = Arc::new(CompanionHandler::new(manager));

    println!("Chatting as \"{}\". Type /clear to start over, /quit to leave.", amica_channels::cli::LOCAL_IDENTITY);
    run(Arc::new(CliChannel::new()), handler).await
}

fn check_config(config: &Config) -> Result<()> {
    validate(config)?;

    let generation = &config.generation;
    println!("Configuration OK");
    println!(
        "  generation:  {} at {} (model {}, adapter {})",
        generation.backend,
        generation.base_url,
        generation.model,
        generation.adapter.as_deref().unwrap_or("none")
    );
    println!(
        "  sampling:    top_k {}, top_p {}, temperature {}, max_new_tokens {}, repetition_penalty {}",
        generation.params.top_k,
        generation.params.top_p,
        generation.params.temperature,
        generation.params.max_new_tokens,
        generation.params.repetition_penalty
    );
    println!(
        "  persona:     familiar after {}, intimate after {} exchanges",
        config.persona.familiar_after, config.persona.intimate_after
    );
    println!(
        "  sessions:    {}",
        config
            .storage
            .sessions_db_path()
            .map_or_else(|| "in memory".to_string(), |p| format!("sqlite {}", p.display()))
    );
    println!(
        "  archive:     {}",
        config
            .storage
            .archive_dir_path()
            .map_or_else(|| "disabled".to_string(), |p| p.display().to_string())
    );
    println!(
        "  telegram:    {}",
        if config.telegram.enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}
