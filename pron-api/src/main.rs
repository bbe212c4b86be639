//! pron-api - pronunciation practice backend
//!
//! `pron-api` (or `pron-api serve`) runs the HTTP service. Maintenance
//! subcommands generate an encryption key or re-encrypt stored recordings
//! under a new key.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pron_common::db::init_database;
use pron_common::Settings;
use pron_api::services::key_rotation::rotate_all;
use pron_api::services::vault::{generate_key, AudioCipher, StorageRouter};
use pron_api::{build_router, AppState};
use tokio::signal;
use tracing::{error, info, warn};

/// Command-line arguments for pron-api
#[derive(Parser, Debug)]
#[command(name = "pron-api")]
#[command(about = "Pronunciation practice backend")]
#[command(version)]
struct Cli {
    /// TOML config file (defaults to ~/.config/pronielts/config.toml)
    #[arg(short, long, global = true, env = "PRON_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service (default)
    Serve(ServeArgs),

    /// Print a fresh ENCRYPTION_KEY value
    GenerateKey,

    /// Re-encrypt every stored recording under a new key
    RotateKey {
        /// Key the recordings are currently encrypted with (defaults to ENCRYPTION_KEY)
        #[arg(long, env = "OLD_ENCRYPTION_KEY")]
        old_key: Option<String>,

        /// Key to re-encrypt with
        #[arg(long, env = "NEW_ENCRYPTION_KEY")]
        new_key: String,
    },
}

#[derive(clap::Args, Debug, Default)]
struct ServeArgs {
    /// Address to bind (overrides HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Database URL (overrides DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,
}

/// `RUST_LOG` wins over the configured level
fn init_tracing(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Command::GenerateKey) = cli.command {
        println!("{}", generate_key());
        return Ok(());
    }

    // A load failure is reported once tracing is up
    let settings = Settings::load(cli.config.as_deref());
    init_tracing(
        settings
            .as_ref()
            .map(|s| s.log_level.as_str())
            .unwrap_or("info"),
    );

    // Build identification first, before any slow startup work
    info!(
        "Starting pron-api v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let settings = settings.context("Failed to load configuration")?;
    info!("Log level: {}", settings.log_level);

    match cli.command {
        Some(Command::RotateKey { old_key, new_key }) => {
            run_rotate_key(settings, old_key, new_key).await
        }
        Some(Command::Serve(args)) => run_server(settings, args).await,
        Some(Command::GenerateKey) | None => run_server(settings, ServeArgs::default()).await,
    }
}

async fn run_server(mut settings: Settings, args: ServeArgs) -> Result<()> {
    if let Some(host) = args.host {
        settings.host = host;
    }
    if let Some(port) = args.port {
        settings.port = port;
    }
    if let Some(url) = args.database_url {
        settings.database_url = url;
    }

    if let Err(e) = settings.validate() {
        error!("Invalid configuration: {}", e);
        return Err(e.into());
    }

    info!(
        "Mode: {}",
        if settings.mock_mode {
            "mock (local scoring and storage)"
        } else {
            "live (Azure Speech and Blob Storage)"
        }
    );
    info!("Database: {}", settings.redacted_database_url());

    let pool = init_database(&settings.database_url, settings.database_max_connections)
        .await
        .context("Failed to initialize database")?;
    info!("✓ Database ready");

    let bind_address = settings.bind_address();
    let state = AppState::initialize(pool, settings)
        .await
        .context("Failed to initialize services")?;
    info!(
        scorer = state.scorer.name(),
        storage = state.storage.active_name(),
        "✓ Services ready"
    );
    info!("CORS origins: {:?}", state.settings.cors_origins);

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_address))?;

    info!("Listening on http://{}", bind_address);
    info!("Health check: http://{}/health", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn run_rotate_key(settings: Settings, old_key: Option<String>, new_key: String) -> Result<()> {
    let old_key = old_key.unwrap_or_else(|| settings.encryption_key.clone());
    let old = AudioCipher::from_key_str(&old_key).context("Invalid old key")?;
    let new = AudioCipher::from_key_str(&new_key).context("Invalid new key")?;

    let pool = init_database(&settings.database_url, settings.database_max_connections)
        .await
        .context("Failed to initialize database")?;
    let storage = StorageRouter::from_settings(&settings)
        .await
        .context("Failed to initialize blob storage")?;

    let report = rotate_all(&pool, &storage, &old, &new).await?;

    println!(
        "Rotated {} recordings ({} already current, {} failed)",
        report.rotated, report.already_current, report.failed
    );
    if report.failed > 0 {
        warn!("Some recordings were not rotated; rerun after fixing the errors above");
        anyhow::bail!("{} recordings failed to rotate", report.failed);
    }
    info!("Set ENCRYPTION_KEY to the new key before restarting the service");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
