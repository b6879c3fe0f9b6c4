//! REST API router and configuration.

use std::sync::Arc;

use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::handlers::{
    confirm_handler, domains_handler, health_handler, query_handler, ApiState,
};
use crate::config::ServerConfig;
use crate::engine::ReportEngine;

/// REST API configuration.
#[derive(Debug, Clone)]
pub struct RestApiConfig {
    /// Enable CORS.
    pub enable_cors: bool,
    /// API prefix (e.g., "/api/v1").
    pub prefix: String,
}

impl Default for RestApiConfig {
    fn default() -> Self {
        Self {
            enable_cors: true,
            prefix: "/api/v1".to_string(),
        }
    }
}

impl From<&ServerConfig> for RestApiConfig {
    fn from(server: &ServerConfig) -> Self {
        Self {
            enable_cors: server.enable_cors,
            prefix: server.prefix.clone(),
        }
    }
}

/// Create the REST API router.
///
/// Endpoints:
/// - POST /api/v1/reports/query    - Run a question or structured request
/// - POST /api/v1/reports/confirm  - Confirm or decline a returned intent
/// - GET  /api/v1/schema/domains   - List report domains
/// - GET  /api/v1/health           - Health check
pub fn create_rest_router(engine: Arc<ReportEngine>, config: &RestApiConfig) -> Router {
    create_rest_router_with_shutdown(engine, config, CancellationToken::new())
}

/// Like [`create_rest_router`], cancelling in-flight reports when `shutdown`
/// fires.
pub fn create_rest_router_with_shutdown(
    engine: Arc<ReportEngine>,
    config: &RestApiConfig,
    shutdown: CancellationToken,
) -> Router {
    let state = Arc::new(ApiState::new(engine).with_shutdown(shutdown));

    let api_routes = Router::new()
        .route("/reports/query", post(query_handler))
        .route("/reports/confirm", post(confirm_handler))
        .route("/schema/domains", get(domains_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    let router = Router::new()
        .nest(&config.prefix, api_routes)
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_origin(Any);

        router.layer(cors)
    } else {
        router
    }
}
