//! Adapters - Implementations of port interfaces.
//!
//! - `ai` - scripted provider adapter
//! - `events` - stage observers (tracing, recording)
//! - `history` / `profile` / `memory` - stores (in-memory, Redis)
//! - `rate_limiter` / `resilience` - capability and provider guards
//! - `http` - axum REST surface

pub mod ai;
pub mod events;
pub mod history;
pub mod http;
pub mod memory;
pub mod profile;
pub mod rate_limiter;
pub mod resilience;
