use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use modlift::{LifecycleConfig, LifecycleOrchestrator, web};

#[derive(Parser)]
#[command(name = "modlift")]
#[command(about = "Steam Workshop mod lifecycle orchestrator")]
#[command(version)]
struct Cli {
    /// Address the HTTP API binds to
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// steamcmd install root for workshop downloads
    #[arg(long, default_value = "workshop")]
    content_dir: PathBuf,

    /// Primary deployment tree
    #[arg(long, default_value = "repo/main")]
    primary_tree: PathBuf,

    /// Secondary deployment tree
    #[arg(long, default_value = "repo/dev")]
    secondary_tree: PathBuf,

    /// Path to the steamcmd executable
    #[arg(long, default_value = "steamcmd")]
    steamcmd: PathBuf,

    /// Steam account for steamcmd; the password is read from STEAM_PASSWORD
    #[arg(long)]
    steam_user: Option<String>,

    /// Bounded retry count for workshop downloads
    #[arg(long, default_value_t = 3)]
    download_attempts: u32,

    /// Build server base URL for development build triggers
    #[arg(long)]
    build_endpoint: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = LifecycleConfig::new()
        .with_content_dir(cli.content_dir)
        .with_deployment_trees(cli.primary_tree, cli.secondary_tree)
        .with_steamcmd_path(cli.steamcmd)
        .with_download_attempts(cli.download_attempts);
    if let Some(user) = cli.steam_user {
        let password = std::env::var("STEAM_PASSWORD")
            .context("STEAM_PASSWORD must be set when --steam-user is given")?;
        config = config.with_steam_login(user, password);
    }
    if let Some(endpoint) = cli.build_endpoint {
        config = config.with_build_endpoint(endpoint);
    }

    let orchestrator = Arc::new(LifecycleOrchestrator::new(config)?);
    let router = web::router(orchestrator.clone());

    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .context("failed to bind listener")?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("axum serve error")?;

    orchestrator.shutdown().await?;
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("modlift=debug,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "unable to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "unable to install SIGTERM handler");
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
}
