//! serve command - run the HTTP gateway

use anyhow::Result;
use dcauth_api::{AuthServer, MetricsRecorder};
use dcauth_core::config::ServerConfig;
use dcauth_core::ConfigSource;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn execute(config: Arc<dyn ConfigSource>, server: ServerConfig) -> Result<()> {
    info!("Starting DCAuth gateway...");

    let mut auth_server = AuthServer::new(config, server);
    match MetricsRecorder::install() {
        Ok(metrics) => {
            info!("Prometheus metrics initialized");
            auth_server = auth_server.with_metrics(metrics);
        }
        Err(e) => warn!("Metrics disabled: {}", e),
    }

    auth_server.run().await?;
    Ok(())
}
