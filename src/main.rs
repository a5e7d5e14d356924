mod config;
mod gemini_client;
mod web;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dotenv::dotenv;
use eyre::Result;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::{API_KEY_NAME, DEFAULT_SECRETS_PATH};
use crate::gemini_client::{GeminiClient, DEFAULT_MODEL};
use crate::web::chat::session_store::SessionStore;
use crate::web::AppState;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address to serve the chat page on
    #[arg(short, long, default_value = "127.0.0.1:8501")]
    bind: SocketAddr,

    /// TOML file holding GOOGLE_API_KEY
    #[arg(short, long, default_value = DEFAULT_SECRETS_PATH)]
    secrets: PathBuf,

    /// Gemini model to chat with
    #[arg(short, long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Forget a browser's conversation after this many idle seconds
    #[arg(long, default_value_t = 86_400, value_parser = clap::value_parser!(u32).range(1..))]
    session_ttl_secs: u32,

    /// Give up on a Gemini request after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load environment variables from .env file
    dotenv().ok();

    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Gemini Chat");

    run(cli, config::api_key_from_env()).await
}

/// Everything after logging is up. Returns `FAILURE` before binding when no key is configured.
async fn run(cli: Cli, key_from_env: Option<String>) -> Result<ExitCode> {
    let secrets = match config::load_api_key(&cli.secrets, key_from_env) {
        Ok(secrets) => secrets,
        Err(e) => {
            error!("Failed to load API key: {}", e);
            eprintln!("API key is not configured: {}", e);
            eprintln!(
                "Set {} in {} (or in the environment) and restart.",
                API_KEY_NAME,
                cli.secrets.display()
            );
            return Ok(ExitCode::FAILURE);
        }
    };

    let client = GeminiClient::new(
        secrets.into_api_key(),
        &cli.model,
        cli.timeout_secs.map(Duration::from_secs),
    )?;
    info!("Using model {}", client.model());

    let sessions = SessionStore::new(
        Arc::new(client),
        chrono::Duration::seconds(i64::from(cli.session_ttl_secs)),
    );

    web::serve(cli.bind, AppState::new(sessions, &cli.model)).await?;

    Ok(ExitCode::SUCCESS)
}
