//! Main entry point for the chatstream CLI.

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use dotenv::dotenv;
use shared::config::{ClientConfig, default_config_path};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::config::ConfigFormat;

mod commands;

/// Chatstream CLI
#[derive(Parser)]
#[command(name = "chatstream")]
#[command(about = "Command-line client for a streaming chat service", long_about = None)]
struct Cli {
    /// Path to the configuration file (optional)
    #[arg(
        long,
        short,
        global = true,
        help = "Path to the configuration file (e.g., config.yaml, config.json or config.toml). Defaults to the per-user configuration file when it exists."
    )]
    config: Option<PathBuf>,

    /// Base URL of the chat service
    #[arg(
        long,
        short,
        global = true,
        help = "Base URL of the chat service (e.g., http://localhost:8888). Overrides the configuration file and environment."
    )]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Subcommands for the chatstream CLI
#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat,

    /// Ask a single question and print the reply
    Ask {
        /// The message to send
        message: String,

        /// Wait for the full reply instead of streaming it
        #[arg(long, help = "Wait for the full reply instead of printing it as it streams")]
        no_stream: bool,
    },

    /// Generate shell completion scripts for the CLI
    Completion {
        /// Shell to generate the completion script for
        #[arg(
            long,
            value_enum,
            help = "The shell type for which to generate the completion script (e.g., bash, zsh, fish, powershell)"
        )]
        shell: Shell,
    },

    /// Generate a configuration file
    Config {
        /// Format of the configuration file to generate. Defaults to yaml.
        #[arg(
            long,
            short,
            value_enum,
            default_value_t = ConfigFormat::Yaml,
            help = "Format of the configuration file to generate (yaml, json or toml)."
        )]
        format: ConfigFormat,

        /// Where to write the file
        #[arg(
            long,
            short,
            help = "Where to write the file. Defaults to config.<format> in the current directory."
        )]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Chat => {
            let config = resolve_config(cli.config, cli.server.as_deref())?;
            commands::chat::run_chat(&config).await?;
        }
        Commands::Ask { message, no_stream } => {
            let config = resolve_config(cli.config, cli.server.as_deref())?;
            commands::chat::ask(&config, &message, !no_stream).await?;
        }
        Commands::Completion { shell } => {
            commands::completion::generate_completion(shell);
        }
        Commands::Config { format, output } => {
            commands::config::generate_config(format, output.as_deref())?;
        }
    }

    Ok(())
}

/// Resolves the configuration and installs the log subscriber it asks for.
fn resolve_config(path: Option<PathBuf>, server: Option<&str>) -> Result<ClientConfig> {
    let path = path.or_else(|| {
        let default = default_config_path();
        default.is_file().then_some(default)
    });
    let config = ClientConfig::load_config(path.as_deref(), server)
        .context("failed to load configuration")?;

    init_tracing(&config.log_level);
    debug!(config_path = ?path, api_base_url = %config.api_base_url, "configuration loaded");
    Ok(config)
}

/// Logs go to stderr; stdout carries the conversation.
fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}
