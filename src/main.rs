//! Server binary: wire the pipeline from configuration and serve the batch
//! API and the metrics endpoint on their two listeners.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::try_join;
use tracing::{error, info};

use stratacache::cache::{build_layer_services, LayerController};
use stratacache::config::registry::{layer_bindings, CacheRegistry};
use stratacache::config::{self, Config};
use stratacache::manager::{AsyncAdapter, CacheManager};
use stratacache::origin::OriginService;
use stratacache::resolver::Resolver;
use stratacache::web::{self, AppState};
use stratacache::{logging, Result, ServiceError};

#[derive(Parser)]
#[command(name = "stratacache")]
#[command(about = "Tiered cache coordinator")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Configuration file path.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    logging::init();
    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!(error = %e, "fatal error");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let path = config::loader::resolve_path(args.config);
    let config = config::loader::load(&path)?;

    let (api_router, metrics_router) = build_application(&config).await?;

    let api_addr = ("0.0.0.0", config.server.api_port);
    let metrics_addr = ("0.0.0.0", config.server.metrics_port);
    let api_listener = tokio::net::TcpListener::bind(api_addr).await?;
    let metrics_listener = tokio::net::TcpListener::bind(metrics_addr).await?;

    info!(
        api_port = config.server.api_port,
        metrics_port = config.server.metrics_port,
        "starting servers"
    );

    try_join!(
        axum::serve(api_listener, api_router),
        axum::serve(metrics_listener, metrics_router),
    )
    .map_err(|e| ServiceError::Server(e.to_string()))?;

    Ok(())
}

async fn build_application(
    config: &Config,
) -> Result<(axum::Router, axum::Router)> {
    let registry = CacheRegistry::new(config);

    let bindings = layer_bindings(config);
    let services = build_layer_services(&bindings, registry.clone()).await?;
    let controller = Arc::new(LayerController::new(services));

    let manager = Arc::new(CacheManager::new(
        Resolver::new(registry.clone()),
        controller,
        OriginService::new(registry),
    ));
    let adapter = Arc::new(AsyncAdapter::new(
        manager,
        Duration::from_millis(config.server.put_all_timeout_ms),
        Duration::from_millis(config.server.evict_all_timeout_ms),
    ));

    Ok((
        web::build_api_router(AppState { adapter }),
        web::build_metrics_router(),
    ))
}
