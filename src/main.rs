//! edge-dispatch server binary.
//!
//! Configuration comes from `EDGE_*` environment variables; see
//! [`DispatcherConfig::from_env`].

mod demo;

use edge_dispatch::prelude::*;
use edge_dispatch::runtime::PlatformKind;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = DispatcherConfig::from_env()?;
    let snapshot = Arc::new(ConfigSnapshot::capture());

    tracing::info!("Starting edge dispatcher ({:?} platform)...", config.platform);
    tracing::info!("Configuration snapshot: {:?}", snapshot);

    let platform: Arc<dyn WorkerPlatform> = match config.platform {
        PlatformKind::Process => {
            tracing::info!("Functions root: {}", config.functions_root.display());
            Arc::new(
                ProcessPlatform::new(config.functions_root.clone())
                    .with_output_limit(config.max_body_size),
            )
        }
        PlatformKind::Local => Arc::new(demo::platform()?),
    };

    let dispatcher = Dispatcher::new(&config, snapshot, platform);
    let available = dispatcher.available_functions().await;
    tracing::info!("Available functions: {}", available.join(", "));
    tracing::info!("Health check: curl http://localhost:{}/health", config.port);
    tracing::info!(
        "Try: curl -X POST -d '{{\"name\":\"Ada\"}}' http://localhost:{}{}/hello",
        config.port,
        config.api_prefix
    );

    EdgeServer::new(config, dispatcher).run().await
}
