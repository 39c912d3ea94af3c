//! HTTP routes for the orchestrator endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    list_capabilities, provider_health, send_message, submit_event, OrchestratorHandlers,
};

/// Creates the orchestrator router with all endpoints.
pub fn orchestrator_routes(handlers: OrchestratorHandlers) -> Router {
    Router::new()
        .route("/messages", post(send_message))
        .route("/events", post(submit_event))
        .route("/capabilities", get(list_capabilities))
        .route("/health/providers", get(provider_health))
        .with_state(handlers)
}
