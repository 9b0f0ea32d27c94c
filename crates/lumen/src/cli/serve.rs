//! The `lumen serve` command: HTTP API plus background processing queue.

use anyhow::Context;
use clap::Args;
use std::sync::Arc;

use lumen_core::{Config, ImagePipeline, ProcessingQueue};

use crate::api::auth::SupabaseAuth;
use crate::api::{create_router, AppState};

/// Arguments for the `serve` command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind (overrides config and LUMEN_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on (overrides config and LUMEN_PORT)
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// Execute the serve command.
pub async fn execute(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let pipeline = Arc::new(ImagePipeline::from_config(&config)?);
    let auth = SupabaseAuth::from_config(&config.supabase)?;

    let queue = ProcessingQueue::start(pipeline.clone(), &config.queue);
    let state = AppState::new(queue.handle(), pipeline.store(), Arc::new(auth));
    let router = create_router(state, &config.server);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!(
        provider = %config.vision.provider,
        workers = config.queue.workers,
        "Lumen API listening on {addr}"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    let stats = queue.shutdown().await;
    tracing::info!(
        completed = stats.completed,
        failed = stats.failed,
        "Shutdown complete"
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining processing queue");
}
