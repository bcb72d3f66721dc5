mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use application::ApplicationServices;
use domain::ConfigurationService;
use presentation::InferenceServer;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    tracing::info!("🤖 Initializing translation fabric service");

    let services = ApplicationServices::new().await?;
    let server_config = services.config_service.server_config();

    let server = InferenceServer::new(Arc::new(services), server_config);
    server.start().await?;

    Ok(())
}
