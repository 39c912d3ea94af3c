//! HTTP adapter for the request orchestrator.

mod dto;
mod handlers;
mod routes;

pub use dto::{
    CapabilitiesQuery, CapabilityCallRequest, CapabilityListResponse, ErrorResponse,
    ProviderHealthEntry, ProviderHealthResponse, SendMessageRequest, SendMessageResponse,
    SubmitEventRequest, SubmitEventResponse,
};
pub use handlers::OrchestratorHandlers;
pub use routes::orchestrator_routes;
