use std::sync::Arc;

use agentic_chat::config::Config;
use agentic_chat::session::Model;
use agentic_chat::{repl, App};
use anyhow::Result;
use clap::Parser;
use log::LevelFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(short, long, help = "Enable debug logging")]
    debug: bool,
    #[arg(long, help = "Backend API base URL, e.g. http://localhost:8000/api")]
    api_url: Option<String>,
    #[arg(short, long, help = "Model for new sessions (gemini or groq)")]
    model: Option<Model>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The logger has to exist before config files are read, or their warnings
    // are lost. A config file may still turn debug output on afterwards.
    let rust_log_set = std::env::var_os("RUST_LOG").is_some();
    let early_debug = cli.debug || Config::debug_from_env(|key| std::env::var(key).ok()).unwrap_or(false);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    if !rust_log_set {
        log::set_max_level(if early_debug { LevelFilter::Debug } else { LevelFilter::Info });
    }

    let mut config = Config::load();
    if let Some(url) = cli.api_url.clone() {
        config.api.base_url = Some(url);
    }
    if cli.model.is_some() {
        config.default_model = cli.model;
    }
    if !rust_log_set && config.debug_enabled() {
        log::set_max_level(LevelFilter::Debug);
    }

    log::info!("agentic-chat starting...");
    log::debug!("CLI args: {:?}", cli);
    log::debug!("Loaded configuration: {:?}", config);

    let app = Arc::new(App::new(&config)?);

    match app.health().await {
        Ok(health) => log::info!("Backend at {} is {}", config.api.base_url(), health.status),
        Err(e) => log::warn!("Backend health check failed: {}", e),
    }
    if let Err(e) = app.load_sessions().await {
        log::warn!("Starting with no sessions: {}", e);
    }

    repl::run(app).await?;

    log::info!("Application finished.");
    Ok(())
}
