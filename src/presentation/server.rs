use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::application::ApplicationServices;
use crate::infrastructure::config::ServerConfig;
use crate::presentation::create_router;

pub struct InferenceServer {
    app: Router,
    config: ServerConfig,
}

impl InferenceServer {
    pub fn new(services: Arc<ApplicationServices>, config: ServerConfig) -> Self {
        let app = create_router(services).layer(TraceLayer::new_for_http());

        Self { app, config }
    }

    pub async fn start(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        tracing::info!("🚀 Starting Translation Fabric API server");
        tracing::info!("   📍 Address: http://{}", addr);
        tracing::info!("   🎯 Endpoints:");
        tracing::info!("      GET  /health          - Health check");
        tracing::info!("      POST /translate       - Translate text with one model");
        tracing::info!("      POST /pivot           - Translate text through two models");
        tracing::info!("      GET  /cache/stats     - Per-model translation cache stats");

        let listener = TcpListener::bind(&addr).await?;

        tracing::info!("✅ Server listening on http://{}", addr);

        axum::serve(listener, self.app).await?;

        Ok(())
    }
}
