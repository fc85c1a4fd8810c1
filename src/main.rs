mod assets;
mod chat;
mod cli;
mod config;
mod llm;
mod logging;
mod router;
mod session;
mod tools;
mod web;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use dotenvy::dotenv;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::chat::Assistant;
use crate::config::AppConfig;
use crate::llm::{CompletionClient, OpenAIClient, build_system_prompt};
use crate::router::Router;
use crate::session::SessionStore;
use crate::tools::Toolbox;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "bytechat",
    version,
    about = "Streaming chatbot with live weather, news, cricket and web search tools"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Mode>,

    /// OpenAI-compatible API base URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Model name
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// API key (set via env GROQ_API_KEY recommended)
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// Address for the web server
    #[arg(long, global = true)]
    pub addr: Option<String>,

    /// Log level (error,warn,info,debug,trace); falls back to BYTECHAT_LOG
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub log_json: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Serve the browser chat (default)
    Serve,
    /// Chat in the terminal
    Cli,
}

fn build_assistant(cfg: &AppConfig) -> Result<Assistant> {
    let api_key = cfg.require_api_key()?;
    let client = OpenAIClient::new(cfg.base_url.clone(), api_key.to_string())?
        .with_llm_config(cfg.llm.clone())?;
    let completion = CompletionClient::new(
        Arc::new(client),
        cfg.model.clone(),
        build_system_prompt(cfg),
    );
    let router =
        Router::new(&cfg.router, cfg.search.enabled).context("compile router rules")?;
    let tools = Toolbox::from_config(cfg)?;
    Ok(Assistant::new(router, tools, completion))
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = AppConfig::from_cli(&cli)?;
    info!(
        base_url = %cfg.base_url,
        model = %cfg.model,
        search = ?cfg.search.provider,
        empty_query = %cfg.router.empty_query,
        "app config"
    );
    let assistant = Arc::new(build_assistant(&cfg)?);

    match cli.command.unwrap_or(Mode::Serve) {
        Mode::Serve => {
            let sessions = Arc::new(SessionStore::new(
                cfg.greeting.clone(),
                cfg.server.session_idle_secs,
            ));
            let state = web::AppState::new(assistant, sessions)?;
            web::serve(
                &cfg.server.addr,
                state,
                cfg.server.session_idle_secs,
                CancellationToken::new(),
            )
            .await
        }
        Mode::Cli => {
            let input = BufReader::new(tokio::io::stdin());
            let mut out = tokio::io::stdout();
            let mut err = tokio::io::stderr();
            cli::run_cli_loop(&assistant, &cfg.greeting, input, &mut out, &mut err).await
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    let log_level = cli
        .log_level
        .clone()
        .or_else(|| std::env::var("BYTECHAT_LOG").ok())
        .unwrap_or_else(|| "info".to_string());
    logging::init_logging(&log_level, cli.log_file.as_deref(), cli.log_json)?;

    if let Err(e) = run(cli).await {
        error!("{e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
