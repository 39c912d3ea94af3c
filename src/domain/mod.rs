//! Domain layer containing the orchestration core's business logic.
//!
//! # Module Organization
//!
//! - `foundation` - Shared primitives (identifiers, timestamps, errors, cancellation)
//! - `catalog` - Plans, personas and models with model selection
//! - `capability` - Capability definitions, registry and policy-enforced execution
//! - `routing` - Provider router with fallback, circuit breaking and retry
//! - `pipeline` - Events, stages, the pipeline engine and persona scoring

pub mod capability;
pub mod catalog;
pub mod foundation;
pub mod pipeline;
pub mod routing;
