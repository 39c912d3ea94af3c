//! Capability module - named executable capabilities and their registry.
//!
//! # Module Structure
//!
//! - `definition` - Definitions, execution policies, handlers and patches
//! - `schema` - Parameter schema checks
//! - `execution` - Per-invocation context and result
//! - `history` - Bounded execution history and derived stats
//! - `registry` - Registration, discovery and policy-enforced execution
//! - `errors` - Capability and registry errors

mod definition;
mod errors;
mod execution;
mod history;
mod registry;
mod schema;

pub use definition::{
    CapabilityDefinition, CapabilityHandler, CapabilityMetadata, CapabilityPatch,
    ExecutionPolicy, FnHandler, HandlerError, RateLimitPolicy,
};
pub use errors::{CapabilityError, RegistryError};
pub use execution::{CapabilityExecutionContext, CapabilityExecutionResult};
pub use history::{CapabilityStats, ExecutionHistory, ExecutionRecord, DEFAULT_HISTORY_SIZE};
pub use registry::{CapabilityRegistry, RegistryConfig, DEFAULT_MAX_FALLBACK_DEPTH};
pub use schema::{
    check_parameter_schema, check_return_schema, validate_parameters, SchemaValidationError,
};
