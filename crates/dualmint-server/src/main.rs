//! # dualmint-server
//!
//! Recording service for operator-initiated mint and burn transactions.
//! Submissions are validated, stored once per `(chain, txHash)`, audited,
//! and, for mints with a contact, announced to the recipient.

mod api;
mod auth;
mod cli;
mod logging;

use clap::Parser;
use eyre::{Result, WrapErr};
use tokio::signal;

use dualmint_adapters::{
    AdapterConfig, AuditLogAdapter, MemoryRecordStore, NotifierAdapter, SystemClockAdapter,
};
use dualmint_core::TransactionRecorder;

use crate::api::{create_router, AppState};
use crate::auth::StaticTokenAuth;
use crate::cli::{Commands, DualmintCli, RunArgs};
use crate::logging::{init_logging, LogFormat};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DualmintCli::parse();

    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::CheckConfig => {
            println!("{:#?}", AdapterConfig::from_env());
            Ok(())
        }
        Commands::Version => {
            println!("dualmint-server {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn run(args: RunArgs) -> Result<()> {
    init_logging(&args.log_level, LogFormat::from_str_lossy(&args.log_format));

    let config = AdapterConfig::from_env();
    let auth = StaticTokenAuth::from_pairs(&args.operator_tokens)
        .wrap_err("invalid --operator-token value")?;
    if auth.is_empty() {
        tracing::warn!("no operator tokens configured; every recording request will be rejected");
    }

    let store = match args.store_path.as_ref().or(config.record_store_path.as_ref()) {
        Some(path) => MemoryRecordStore::open(path)
            .await
            .wrap_err_with(|| format!("failed to open record store at {}", path.display()))?,
        None => {
            tracing::warn!("no record store path configured; records are kept in memory only");
            MemoryRecordStore::new()
        }
    };
    let notifier = NotifierAdapter::with_config(&config).wrap_err("failed to build notifier")?;

    let recorder = TransactionRecorder::new(
        store,
        notifier,
        AuditLogAdapter::new(),
        SystemClockAdapter,
        config.recorder_settings(),
    );
    let router = create_router(AppState::new(recorder, auth));

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .wrap_err_with(|| format!("failed to bind {}", args.bind))?;
    tracing::info!(addr = %args.bind, "recording service listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("server error")?;

    tracing::info!("recording service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
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
    tracing::info!("shutdown signal received");
}
