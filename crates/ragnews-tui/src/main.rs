use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ragnews_core::ClientConfig;

mod app;
mod commands;
mod logging;
mod ui;

/// Terminal chat client for the RAG news question-answering service
#[derive(Parser, Debug)]
#[command(name = "ragnews", version, about)]
struct Cli {
    /// Backend base URL (overrides config file and RAGNEWS_API_BASE)
    #[arg(long, value_name = "URL")]
    api_base: Option<String>,

    /// Path to the JSON config file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write the interactive session log here
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask one question over the streaming endpoint and print the answer
    Stream {
        /// The question to ask
        query: String,
    },
    /// Check that the backend is reachable
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ClientConfig::resolve(cli.config.as_deref(), cli.api_base)
        .await
        .context("Failed to load configuration")?;
    if let Some(path) = cli.log_file {
        config.log_file = Some(path);
    }

    match cli.command {
        None => {
            let notices = logging::init_for_tui(&config)?;
            app::run(config, notices).await
        }
        Some(Command::Stream { query }) => {
            logging::init_for_command(&config);
            commands::stream(&config, &query).await
        }
        Some(Command::Health) => {
            logging::init_for_command(&config);
            commands::health(&config).await
        }
    }
}
