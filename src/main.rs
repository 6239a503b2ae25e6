use anyhow::{Context, Result};
use clap::Parser;
use nest_gateway::{create_router, AppState, Config, NestBackend, SpeechBackend};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "nest-gateway", about = "Streaming speech-to-transcript gateway")]
struct Args {
    /// Config file (extension optional, e.g. config/nest-gateway)
    #[arg(long, default_value = "config/nest-gateway")]
    config: String,

    /// Override the configured bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the configured port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    let bind = args.bind.unwrap_or_else(|| cfg.service.http.bind.clone());
    let port = args.port.unwrap_or(cfg.service.http.port);

    info!("{} starting", cfg.service.name);
    info!(
        "Audio: {}Hz/{}ch, {}ms frames",
        cfg.audio.sample_rate, cfg.audio.channels, cfg.audio.frame_duration_ms
    );
    info!(
        "Backend: {}:{} (lang={})",
        cfg.backend.host, cfg.backend.port, cfg.backend.language
    );

    let backend: Arc<dyn SpeechBackend> = Arc::new(NestBackend::new(cfg.backend.clone()));

    // Connectivity is surfaced through /health rather than refusing to
    // start: the orchestrator decides what to do with an unhealthy instance
    if let Err(e) = backend.check_connectivity().await {
        warn!("Recognition backend not reachable yet: {}", e);
    }

    let state = AppState::new(Arc::new(cfg), backend);
    let app = create_router(state);

    let addr = format!("{bind}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
