//! Standalone scenelink host: a command listener over an in-memory scene
//! with a Lua scripting evaluator.

#![allow(clippy::print_stderr, clippy::missing_docs_in_private_items)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use scenelink_host::{Listener, LuaEvaluator, MemoryScene, Registry};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "scenelink-host",
    version,
    about = "Listen for scenelink commands and apply them to a scene"
)]
struct Cli {
    /// Address to listen on. Keep this on loopback or a trusted LAN:
    /// any peer that can connect can execute code.
    #[arg(long, env = "SCENELINK_BIND", default_value = "127.0.0.1:9999")]
    bind: String,

    /// Project directory that `//` render paths resolve against
    /// (default: current directory).
    #[arg(long)]
    base_dir: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("scenelink-host: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let base_dir = match cli.base_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("cannot determine current directory")?,
    };

    let registry = Registry::new(LuaEvaluator);
    let mut listener = Listener::bind(&cli.bind, registry, MemoryScene::new(&base_dir))
        .await
        .with_context(|| format!("failed to bind {}", cli.bind))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        project_dir = %base_dir.display(),
        "command listener ready"
    );

    listener
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await;
    Ok(())
}
