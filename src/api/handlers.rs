//! REST API request handlers.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::engine::{ReportEngine, ReportRequest};
use crate::error::ReportError;
use crate::schema::{Domain, FieldType, SchemaRegistry};

/// Application state shared across handlers.
pub struct ApiState {
    /// Report pipeline.
    pub engine: Arc<ReportEngine>,
    /// Cancelled on shutdown; aborts in-flight reports.
    pub shutdown: CancellationToken,
}

impl ApiState {
    pub fn new(engine: Arc<ReportEngine>) -> Self {
        Self {
            engine,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Confirmation of a previously returned intent.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmRequest {
    /// The intent exactly as returned with `needs_confirmation`.
    pub intent: Value,
    pub confirmed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSummary {
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub filterable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainSummary {
    pub key: String,
    pub label: String,
    pub description: String,
    pub fields: Vec<FieldSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainsResponse {
    pub domains: Vec<DomainSummary>,
    pub total: usize,
}

impl From<&Domain> for DomainSummary {
    fn from(domain: &Domain) -> Self {
        Self {
            key: domain.key.clone(),
            label: domain.label.clone(),
            description: domain.description.clone(),
            fields: domain
                .fields
                .iter()
                .map(|f| FieldSummary {
                    key: f.key.clone(),
                    label: f.label.clone(),
                    field_type: f.field_type,
                    filterable: f.filterable,
                })
                .collect(),
        }
    }
}

impl DomainsResponse {
    pub fn from_schema(schema: &SchemaRegistry) -> Self {
        let domains: Vec<DomainSummary> = schema.domains().iter().map(DomainSummary::from).collect();
        let total = domains.len();
        Self { domains, total }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub datastore: Option<String>,
    pub model: bool,
}

/// Error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// ============================================================================
// Handler Functions
// ============================================================================

/// POST /api/v1/reports/query - Run a question or structured request.
pub async fn query_handler(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<Value>,
) -> Response {
    let request = match ReportRequest::from_value(&body, state.engine.schema()) {
        Ok(request) => request,
        Err(e) => return error_response(e.into()),
    };

    match state.engine.run_with_cancel(request, &state.shutdown).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/v1/reports/confirm - Execute or decline a returned intent.
pub async fn confirm_handler(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<ConfirmRequest>,
) -> Response {
    match state
        .engine
        .confirm_with_cancel(&request.intent, request.confirmed, &state.shutdown)
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/v1/schema/domains - List report domains.
pub async fn domains_handler(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(DomainsResponse::from_schema(state.engine.schema())),
    )
}

/// GET /api/v1/health - Liveness and wiring.
pub async fn health_handler(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        datastore: state.engine.datastore_name().map(str::to_string),
        model: state.engine.parser().has_model(),
    })
}

/// Map an error to its status code and localized body. The diagnostic
/// detail is logged, never returned.
pub fn error_response(error: ReportError) -> Response {
    let status = match &error {
        ReportError::Validation(_) | ReportError::ParsingFailed(_) => StatusCode::BAD_REQUEST,
        ReportError::Database(_) => StatusCode::BAD_GATEWAY,
        ReportError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        ReportError::Configuration(_) | ReportError::Io(_) | ReportError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    if status.is_server_error() {
        tracing::error!(code = error.code(), "Report request failed: {}", error.detail());
    } else {
        tracing::warn!(code = error.code(), "Report request rejected: {}", error.detail());
    }

    (
        status,
        Json(ErrorResponse {
            error: error.user_message(),
            code: error.code().to_string(),
        }),
    )
        .into_response()
}
