//! HTTP handlers for the orchestrator endpoints.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Json,
};
use http::StatusCode;

use crate::application::stages::discover_capabilities;
use crate::application::{OrchestratorError, RequestOrchestrator};
use crate::domain::foundation::ErrorCode;
use crate::domain::pipeline::PipelineEvent;

use super::dto::{
    CapabilitiesQuery, CapabilityListResponse, ErrorResponse, ProviderHealthResponse,
    SendMessageRequest, SendMessageResponse, SubmitEventRequest,
};

// ════════════════════════════════════════════════════════════════════════════
// Handler state
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct OrchestratorHandlers {
    orchestrator: Arc<RequestOrchestrator>,
}

impl OrchestratorHandlers {
    pub fn new(orchestrator: Arc<RequestOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// HTTP handlers
// ════════════════════════════════════════════════════════════════════════════

/// POST /messages - Route a chat message through the pipeline
pub async fn send_message(
    State(handlers): State<OrchestratorHandlers>,
    Json(req): Json<SendMessageRequest>,
) -> Response {
    let request = match req.into_request() {
        Ok(request) => request,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(ErrorResponse::from(&e))).into_response()
        }
    };

    match handlers.orchestrator.route_message(request).await {
        Ok(result) => (StatusCode::OK, Json(SendMessageResponse::from(result))).into_response(),
        Err(e) => handle_orchestrator_error(e),
    }
}

/// POST /events - Process a non-chat event
pub async fn submit_event(
    State(handlers): State<OrchestratorHandlers>,
    Json(req): Json<SubmitEventRequest>,
) -> Response {
    match handlers
        .orchestrator
        .process_event(PipelineEvent::from(req))
        .await
    {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => handle_orchestrator_error(e),
    }
}

/// GET /capabilities?q= - Search registered capabilities
pub async fn list_capabilities(
    State(handlers): State<OrchestratorHandlers>,
    Query(query): Query<CapabilitiesQuery>,
) -> Response {
    let matches = discover_capabilities(
        handlers.orchestrator.registry(),
        query.q.as_deref().unwrap_or(""),
        query.category.as_deref(),
    );
    (StatusCode::OK, Json(CapabilityListResponse::from(matches))).into_response()
}

/// GET /health/providers - Provider descriptors with breaker state
pub async fn provider_health(State(handlers): State<OrchestratorHandlers>) -> Response {
    let router = handlers.orchestrator.router();
    let response = ProviderHealthResponse::new(router.providers(), router.circuit_states());
    (StatusCode::OK, Json(response)).into_response()
}

// ════════════════════════════════════════════════════════════════════════════
// Error handling
// ════════════════════════════════════════════════════════════════════════════

pub(crate) fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::ValidationFailed => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound
        | ErrorCode::UserNotFound
        | ErrorCode::PersonaNotFound
        | ErrorCode::CapabilityNotFound
        | ErrorCode::ModelNotFound => StatusCode::NOT_FOUND,
        ErrorCode::TaskNotAllowed | ErrorCode::Unauthorized => StatusCode::FORBIDDEN,
        // The caller's stored profile names a plan the catalog lacks.
        ErrorCode::InvalidPlan => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::Timeout | ErrorCode::Cancelled => StatusCode::GATEWAY_TIMEOUT,
        ErrorCode::StorageError | ErrorCode::CacheError | ErrorCode::InternalError => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn handle_orchestrator_error(error: OrchestratorError) -> Response {
    let status = status_for(error.code());
    (status, Json(ErrorResponse::from(&error))).into_response()
}
