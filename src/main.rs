mod cli;
mod config;
mod downloads;
mod error;
mod fingerprint;
mod handlers;
mod history;
mod manager;
mod progress;
mod state;
mod tasks;
#[cfg(test)]
mod testing;
mod transfer;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use clap::{CommandFactory, Parser};
use std::process::ExitCode;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Level, info, warn};

use crate::config::{Args, Settings};
use crate::handlers::{api, web};
use crate::history::HistoryStore;
use crate::manager::DownloadManager;
use crate::progress::CONSOLE_INTERVAL;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let settings = Settings::new(&args).context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(&settings.log_level)
        .with_writer(std::io::stderr)
        .init();

    std::fs::create_dir_all(&settings.output_dir).with_context(|| {
        format!("Failed to create output directory {:?}", settings.output_dir)
    })?;
    let output_dir = std::fs::canonicalize(&settings.output_dir)?;

    let (history, migrated) = HistoryStore::load(&settings.history_file)
        .await
        .with_context(|| format!("Error loading history from {:?}", settings.history_file))?;
    if migrated && let Err(e) = history.persist().await {
        warn!("Could not save migrated history: {}", e);
    }

    if let Some(addr) = settings.bind_addr() {
        let manager = DownloadManager::new(output_dir, history);
        serve(manager, &addr).await?;
        return Ok(ExitCode::SUCCESS);
    }

    let manager =
        DownloadManager::new(output_dir, history).with_progress_interval(CONSOLE_INTERVAL);

    if args.list {
        cli::list(&manager).await;
        return Ok(ExitCode::SUCCESS);
    }

    let urls = cli::collect_urls(&args.urls).await?;
    if urls.is_empty() {
        println!("No URLs provided");
        Args::command().print_help()?;
        return Ok(ExitCode::FAILURE);
    }

    let outcome = cli::run_batch(&manager, &urls, args.force, shutdown_signal()).await;
    Ok(if outcome.interrupted {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn serve(manager: DownloadManager, addr: &str) -> anyhow::Result<()> {
    let (tx, _) = broadcast::channel(100);
    let shutdown = CancellationToken::new();

    let state = AppState {
        manager: manager.clone(),
        tx,
        shutdown: shutdown.clone(),
    };

    tasks::start_background_tasks(state.clone());

    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", listener.local_addr()?);
    info!("Saving downloads to {:?}", manager.output_dir());

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("Shutting down...");
            shutdown.cancel();
            let cancelled = manager.cancel_all().await;
            if cancelled > 0 {
                info!("Cancelled {} active downloads", cancelled);
            }
        })
        .await?;
    Ok(())
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/api/download", post(api::start_download))
        .route("/api/cancel", post(api::cancel_download))
        .route("/api/progress", get(api::progress))
        .route("/api/history", get(api::history))
        .route("/events", get(api::sse_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(tower_http::trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(tower_http::trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
        .fallback(web::static_handler)
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
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
