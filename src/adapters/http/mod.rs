//! HTTP adapters - REST API over the orchestrator.

pub mod orchestrator;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::application::RequestOrchestrator;

pub use orchestrator::{orchestrator_routes, OrchestratorHandlers};

/// Full API router: orchestrator routes behind request-id, tracing and a
/// whole-request timeout.
pub fn api_router(orchestrator: Arc<RequestOrchestrator>, timeout: Duration) -> Router {
    orchestrator_routes(OrchestratorHandlers::new(orchestrator)).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TimeoutLayer::new(timeout)),
    )
}
