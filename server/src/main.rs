//! cropdoc inference server
//!
//! Serves the plant disease classifier over HTTP: a liveness route, a health
//! route and a multipart `/predict` endpoint returning the predicted label.

mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use cropdoc::inference::ModelLocator;
use cropdoc::model::check_input_size;
use cropdoc::utils::logging::{init_logging, LogConfig, LogLevel};
use tracing::{info, warn};

use crate::state::{AppState, ServerConfig};

/// Plant disease inference server
#[derive(Parser, Debug)]
#[command(name = "cropdoc-server")]
#[command(version)]
#[command(about = "HTTP inference service for the plant disease classifier")]
struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "5001")]
    port: u16,

    /// Host to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Directory holding best_model.mpk or trained_model.mpk
    #[arg(long, env = "CROPDOC_MODEL_DIR", default_value = ".")]
    model_dir: PathBuf,

    /// Square resolution uploads are resized to
    #[arg(long, env = "CROPDOC_IMAGE_SIZE", default_value = "128")]
    image_size: usize,

    /// Maximum upload size in MiB
    #[arg(long, env = "CROPDOC_MAX_UPLOAD_MB", default_value = "16")]
    max_upload_mb: usize,

    /// Load the model at startup instead of on the first request
    #[arg(long, env = "CROPDOC_PRELOAD", default_value = "false")]
    preload: bool,

    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Override the log level (trace, debug, info, warn, error)
    #[arg(long, env = "CROPDOC_LOG")]
    log_level: Option<LogLevel>,

    /// Disable ANSI colors, for log collectors
    #[arg(long, default_value = "false")]
    no_color: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_verbosity(cli.verbose);
    if let Some(level) = cli.log_level {
        log_config.level = level;
    }
    log_config.ansi_colors = !cli.no_color;
    if let Err(e) = init_logging(&log_config) {
        eprintln!("{e}");
    }

    check_input_size(cli.image_size)?;

    let config = ServerConfig {
        model_dir: cli.model_dir,
        image_size: cli.image_size,
        max_upload_bytes: cli.max_upload_mb * 1024 * 1024,
    };

    info!("cropdoc server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Model dir:   {:?}", config.model_dir);
    info!("  Image size:  {}", config.image_size);
    info!("  Max upload:  {} MiB", cli.max_upload_mb);
    info!("  Backend:     {}", cropdoc::backend::backend_name());

    let state = Arc::new(AppState::new(config));

    if cli.preload {
        let model = state.model().await?;
        info!("Preloaded model from {:?}", model.path);
    } else {
        let locator = ModelLocator::new(&state.config.model_dir);
        if locator.find().is_none() {
            warn!(
                "No model artifact in {:?} yet; /predict will fail until one is added",
                locator.dir()
            );
        }
    }

    let app = routes::router(state);

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
