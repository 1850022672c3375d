mod config;
mod conversation;
mod http;
mod projects;
mod reasoner;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use qms_observability::{init_process_logging, ProcessKind};
use tracing::info;

use crate::config::EngineConfig;
use crate::state::AppState;

const LOG_RETENTION_DAYS: u64 = 14;

#[derive(Parser, Debug)]
#[command(name = "qms-engine")]
#[command(about = "Headless nursing QI research assistant engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Starts the HTTP server.
    Serve {
        #[arg(long, alias = "host", default_value = "127.0.0.1")]
        hostname: String,
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Creates a project and prints its id, without starting a server.
    CreateProject { title: String },
    /// Sends one message to a project and prints the synthesized reply.
    Ask {
        project_id: String,
        message: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let logs_dir = resolve_logs_dir();
    let _guard = init_process_logging(ProcessKind::Engine, &logs_dir, LOG_RETENTION_DAYS)
        .map(|(guard, info)| {
            info!(logs_dir = %info.logs_dir, "structured logging initialized");
            guard
        })
        .ok();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { hostname, port } => {
            let config = EngineConfig::from_env()?;
            let state = AppState::build(config)?;
            let addr: SocketAddr = format!("{hostname}:{port}")
                .parse()
                .context("invalid hostname or port")?;
            info!("starting qms-engine on http://{addr}");
            http::serve(addr, state).await?;
        }
        Command::CreateProject { title } => {
            let config = EngineConfig::from_env()?;
            let state = AppState::build(config)?;
            let meta = state.projects.create(title).await?;
            println!("{}", serde_json::to_string_pretty(&meta)?);
        }
        Command::Ask { project_id, message } => {
            let config = EngineConfig::from_env()?;
            let state = AppState::build(config)?;
            let response = conversation::handle_message(&state, &project_id, &message).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}

fn resolve_logs_dir() -> PathBuf {
    std::env::var("QMS_LOGS_DIR")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./data/logs"))
}
