//! Command line interface for the reference board backend. Supports
//! initialization, serving the HTTP API and a few read-only inspection
//! commands against the content repository.

mod board;
mod config;
mod contents;
mod error;
mod ids;
#[cfg(test)]
mod mock;
mod model;
mod oauth;
mod server;

use std::{fs, net::SocketAddr, path::Path, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::Settings;
use model::Natureza;
use server::HttpState;
use tracing::info;

/// Command line interface entry point.
#[derive(Parser)]
#[command(
    name = "indica",
    author,
    version,
    about = "Community reference board backed by a repository contents API"
)]
struct Cli {
    /// Path to the `.env` configuration file.
    #[arg(long, default_value = ".env")]
    env: String,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Write a default `.env` file if none exists.
    Init,
    /// Launch the HTTP API.
    Serve,
    /// Print the id the next reference of a polarity would receive.
    NextId {
        /// `positiva` or `negativa`.
        natureza: Natureza,
    },
    /// Print the comments stored for a reference as JSON.
    Comments {
        referencia_id: String,
        natureza: Natureza,
    },
    /// Print the votes stored for a reference as JSON.
    Votes {
        referencia_id: String,
        natureza: Natureza,
    },
}

/// Execute the selected CLI subcommand.
async fn run(cli: Cli) -> anyhow::Result<()> {
    ensure_env_file(&cli.env)?;
    if let Commands::Init = cli.command {
        info!(env = %cli.env, "configuration ready");
        return Ok(());
    }
    let cfg = Settings::from_env(&cli.env)?;
    let state = Arc::new(HttpState::from_settings(&cfg)?);
    match cli.command {
        Commands::Init => {}
        Commands::Serve => {
            let http_addr: SocketAddr = cfg
                .bind_http
                .as_str()
                .parse()
                .with_context(|| format!("invalid BIND_HTTP: {}", cfg.bind_http))?;
            info!(
                owner = %cfg.contents.owner,
                repo = %cfg.contents.repo,
                branch = %cfg.contents.branch,
                "serving reference board"
            );
            server::serve_http(http_addr, state, shutdown_signal()).await?;
        }
        Commands::NextId { natureza } => {
            println!("{}", state.board.next_id(natureza).await?);
        }
        Commands::Comments {
            referencia_id,
            natureza,
        } => {
            let comments = state.board.comments(&referencia_id, natureza).await?;
            println!("{}", serde_json::to_string_pretty(&comments)?);
        }
        Commands::Votes {
            referencia_id,
            natureza,
        } => {
            let votes = state.board.votes(&referencia_id, natureza).await?;
            println!("{}", serde_json::to_string_pretty(&votes)?);
        }
    }
    Ok(())
}

/// Create a default `.env` file if one is not already present at `path`.
fn ensure_env_file(path: &str) -> anyhow::Result<()> {
    let env_path = Path::new(path);
    if env_path.exists() {
        return Ok(());
    }
    if let Some(parent) = env_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut content = String::new();
    content.push_str("BIND_HTTP=127.0.0.1:4001\n");
    content.push_str(&format!("CONTENTS_API_URL={}\n", config::DEFAULT_API_URL));
    content.push_str("CONTENTS_OWNER=qway-tech\n");
    content.push_str("CONTENTS_REPO=qway-indica-dados\n");
    content.push_str(&format!("CONTENTS_BRANCH={}\n", config::DEFAULT_BRANCH));
    content.push_str("GITHUB_TOKEN=\n");
    content.push_str("GOOGLE_CLIENT_ID=\n");
    content.push_str("GOOGLE_CLIENT_SECRET=\n");
    content.push_str("GITHUB_CLIENT_ID=\n");
    content.push_str("GITHUB_CLIENT_SECRET=\n");
    content.push_str(&format!(
        "OAUTH_REDIRECT_URI={}\n",
        config::DEFAULT_REDIRECT_URI
    ));
    content.push_str("# Comma separated; quote the value if it contains spaces.\n");
    content.push_str(&format!(
        "ALLOWED_ORIGINS={}\n",
        config::DEFAULT_ALLOWED_ORIGINS
    ));
    fs::write(env_path, content)?;
    Ok(())
}

/// Resolves on ctrl-c or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

#[cfg(not(test))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    run(cli).await
}
