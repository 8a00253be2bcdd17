//! `memnfs` runs an NFSv4.0 server over an in-memory file system.
//!
//! ```bash
//! memnfs server.yaml --debug
//! ```
//!
//! The tree described by the configuration is created at startup and lives only as long as the
//! process. The server stops on SIGINT or SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use memfs::MemFs;
use memnfs::{cli::MemnfsArgs, NfsServer, ServerConfig};
use tracing_subscriber::EnvFilter;

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let args = MemnfsArgs::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig::load(&args.config)
        .await
        .with_context(|| format!("loading {}", args.config.display()))?;

    let fs = MemFs::new();
    config.seed(&fs).await.context("seeding the file system")?;
    tracing::info!(
        inodes = fs.get_store().inode_count(),
        "seeded file system from {}",
        args.config.display()
    );

    NfsServer::new(config, fs).run_until(shutdown_signal()).await?;
    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!(%error, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
