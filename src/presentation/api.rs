use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::application::ApplicationServices;
use crate::domain::response::{Response as TranslationResponse, ResponseOptions};
use crate::infrastructure::cache::CacheStats;

#[derive(Debug, Deserialize)]
pub struct TranslateRequest {
    pub model: String,
    pub text: String,
    #[serde(default)]
    pub options: ResponseOptions,
}

#[derive(Debug, Deserialize)]
pub struct PivotRequest {
    pub model_a: String,
    pub model_b: String,
    pub text: String,
    #[serde(default)]
    pub options: ResponseOptions,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, StatusCode>;

fn handle_result<T>(result: anyhow::Result<T>) -> ApiResult<T> {
    match result {
        Ok(data) => Ok(Json(ApiResponse::success(data))),
        Err(e) => {
            tracing::error!("API error: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub fn create_router(services: Arc<ApplicationServices>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/translate", post(translate))
        .route("/pivot", post(pivot))
        .route("/cache/stats", get(cache_stats))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(services)
}

async fn health_check() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::success("translation fabric is running"))
}

async fn translate(
    State(services): State<Arc<ApplicationServices>>,
    Json(request): Json<TranslateRequest>,
) -> ApiResult<TranslationResponse> {
    let result = services
        .translate_use_case
        .translate(request.model, request.text, request.options)
        .await;
    handle_result(result)
}

async fn pivot(
    State(services): State<Arc<ApplicationServices>>,
    Json(request): Json<PivotRequest>,
) -> ApiResult<TranslationResponse> {
    let result = services
        .translate_use_case
        .pivot(request.model_a, request.model_b, request.text, request.options)
        .await;
    handle_result(result)
}

async fn cache_stats(State(services): State<Arc<ApplicationServices>>) -> Json<ApiResponse<HashMap<String, CacheStats>>> {
    Json(ApiResponse::success(services.model_management_use_case.cache_stats()))
}
