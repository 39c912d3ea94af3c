//! Resilience adapters.
//!
//! - `InMemoryCircuitBreaker` - Mutex-guarded breaker for one provider
//! - `CircuitBreakerRegistry` - `CircuitBreakerFactory` keyed by provider name

mod circuit_breaker;

pub use circuit_breaker::{CircuitBreakerRegistry, InMemoryCircuitBreaker};
